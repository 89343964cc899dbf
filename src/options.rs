//! Request option derivation.
//!
//! Works out which option partitions (`image`, `script`, ...) a request
//! belongs to, from the file name at the end of its URL path and its
//! Referer header.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{FilterOption, Request};

const SCRIPT_SUFFIXES: &[&str] = &[".js", ".js.gz"];

const IMAGE_SUFFIXES: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".tiff", ".psd", ".raw", ".bmp", ".heif", ".indd",
    ".jpeg2000",
];

const STYLESHEET_SUFFIXES: &[&str] = &[".css"];

// Matched anywhere in the file name, not only as a suffix.
const FONT_MARKERS: &[&str] = &[".otf", ".ttf", ".fnt"];

/// How the `thirdparty` flag is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThirdPartyMode {
    /// Any non-empty Referer marks the request third-party
    #[default]
    RefererPresent,
    /// Referer host must differ from the request host
    CrossOrigin,
}

/// Derived option flags for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionFlags {
    flags: [bool; FilterOption::COUNT],
}

impl OptionFlags {
    pub fn get(&self, option: FilterOption) -> bool {
        self.flags[option.index()]
    }

    pub fn set(&mut self, option: FilterOption, active: bool) {
        self.flags[option.index()] = active;
    }

    /// Active options as a bit set, see [`FilterOption`] order
    pub(crate) fn mask(&self) -> u8 {
        self.active().fold(0, |mask, option| mask | option.bit())
    }

    /// Options whose flag is set, in partition order
    pub fn active(&self) -> impl Iterator<Item = FilterOption> + '_ {
        FilterOption::ALL.into_iter().filter(|o| self.get(*o))
    }
}

/// Compute the option flags of a request
pub fn derive_options(req: &Request, third_party: ThirdPartyMode) -> OptionFlags {
    let file_name = req.file_name().to_ascii_lowercase();
    let ends_with_any = |suffixes: &[&str]| suffixes.iter().any(|s| file_name.ends_with(s));

    let mut flags = OptionFlags::default();
    flags.set(FilterOption::Script, ends_with_any(SCRIPT_SUFFIXES));
    flags.set(FilterOption::Image, ends_with_any(IMAGE_SUFFIXES));
    flags.set(FilterOption::Stylesheet, ends_with_any(STYLESHEET_SUFFIXES));
    flags.set(
        FilterOption::Font,
        FONT_MARKERS.iter().any(|m| file_name.contains(m)),
    );
    flags.set(FilterOption::ThirdParty, is_third_party(req, third_party));
    flags
}

fn is_third_party(req: &Request, mode: ThirdPartyMode) -> bool {
    if req.referer.is_empty() {
        return false;
    }
    match mode {
        ThirdPartyMode::RefererPresent => true,
        ThirdPartyMode::CrossOrigin => match Url::parse(&req.referer) {
            Ok(referer) => {
                let referer_host = referer.host_str().unwrap_or("").to_lowercase();
                referer_host != req.hostname()
            }
            // Unparseable referer: fall back to presence.
            Err(_) => true,
        },
    }
}
