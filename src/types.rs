use std::collections::BTreeMap;
use std::fmt;

use url::Url;

use crate::error::Result;
use crate::options::OptionFlags;

/// Request-type option a rule may be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterOption {
    Image,
    Script,
    Stylesheet,
    Font,
    ThirdParty,
}

impl FilterOption {
    pub const COUNT: usize = 5;

    /// Every supported option, in partition order
    pub const ALL: [FilterOption; Self::COUNT] = [
        FilterOption::Image,
        FilterOption::Script,
        FilterOption::Stylesheet,
        FilterOption::Font,
        FilterOption::ThirdParty,
    ];

    /// Look up an option by its filter-list name (already lowercased, no `~`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "image" => Some(FilterOption::Image),
            "script" => Some(FilterOption::Script),
            "stylesheet" => Some(FilterOption::Stylesheet),
            "font" => Some(FilterOption::Font),
            "thirdparty" | "third-party" => Some(FilterOption::ThirdParty),
            _ => None,
        }
    }

    /// Canonical filter-list name
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOption::Image => "image",
            FilterOption::Script => "script",
            FilterOption::Stylesheet => "stylesheet",
            FilterOption::Font => "font",
            FilterOption::ThirdParty => "thirdparty",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Single-bit mask for option sets
    pub(crate) fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for FilterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed filter rule.
///
/// Built once from a single line by [`crate::parser::parse_rule`] and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// The line as it was read
    pub raw: String,
    /// Pattern text with the `@@` prefix and `$options` suffix removed
    pub pattern_text: String,
    /// Regex-syntax translation of `pattern_text` (not yet compiled)
    pub pattern: String,
    /// `@@` exception rule
    pub is_exception: bool,
    /// option -> included (`true`) or excluded via `~` (`false`)
    pub options: BTreeMap<FilterOption, bool>,
    /// hostname substring -> required (`true`) or excluded via `~` (`false`)
    pub domains: BTreeMap<String, bool>,
}

impl Rule {
    /// Whether the rule carries any request-type option
    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    /// Option names declared by the rule, with `domain` appended when the
    /// rule has domain restrictions.
    pub fn option_keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.options.keys().map(|o| o.as_str()).collect();
        if !self.domains.is_empty() {
            keys.push("domain");
        }
        keys
    }

    /// Per-rule option check used by the trie backend.
    ///
    /// Included options are alternatives (any one active suffices); an active
    /// excluded option always vetoes.
    pub fn options_satisfied(&self, flags: &OptionFlags) -> bool {
        let mut any_included = false;
        let mut included_hit = false;
        for (&option, &included) in &self.options {
            let active = flags.get(option);
            if included {
                any_included = true;
                included_hit |= active;
            } else if active {
                return false;
            }
        }
        !any_included || included_hit
    }

    /// Domain restriction check against a lowercased hostname.
    ///
    /// Excluded domains veto; when any required domain is listed, at least
    /// one must be contained in the hostname.
    pub fn domain_allows(&self, hostname: &str) -> bool {
        let mut any_required = false;
        let mut required_hit = false;
        for (domain, &required) in &self.domains {
            let contained = hostname.contains(domain.as_str());
            if required {
                any_required = true;
                required_hit |= contained;
            } else if contained {
                return false;
            }
        }
        !any_required || required_hit
    }
}

/// A network request to check against a filter set
#[derive(Debug, Clone)]
pub struct Request {
    /// Parsed absolute request URL
    pub url: Url,
    /// Value of the Origin header
    pub origin: String,
    /// Value of the Referer header
    pub referer: String,
    /// Whether the request looks like an XMLHttpRequest
    pub is_xhr: bool,
}

impl Request {
    /// Create a request for an already parsed URL
    pub fn new(url: Url) -> Self {
        Self {
            url,
            origin: String::new(),
            referer: String::new(),
            is_xhr: false,
        }
    }

    /// Parse `url` and create a request for it
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_xhr(mut self, is_xhr: bool) -> Self {
        self.is_xhr = is_xhr;
        self
    }

    /// Full URL text as matched by rule patterns
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Lowercased hostname, empty for host-less URLs
    pub fn hostname(&self) -> String {
        self.url.host_str().unwrap_or("").to_lowercase()
    }

    /// Last segment of the URL path, ignoring one trailing slash
    pub fn file_name(&self) -> &str {
        let path = self.url.path();
        let path = path.strip_suffix('/').unwrap_or(path);
        match path.rfind('/') {
            Some(pos) => &path[pos + 1..],
            None => path,
        }
    }
}

/// Cache key for the decision cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub url: String,
    pub referer: String,
}

impl CacheKey {
    pub fn from_request(req: &Request) -> Self {
        Self {
            url: req.url_str().to_string(),
            referer: req.referer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_with(options: &[(FilterOption, bool)], domains: &[(&str, bool)]) -> Rule {
        Rule {
            raw: String::new(),
            pattern_text: String::new(),
            pattern: String::new(),
            is_exception: false,
            options: options.iter().copied().collect(),
            domains: domains.iter().map(|(d, r)| (d.to_string(), *r)).collect(),
        }
    }

    #[test]
    fn test_option_names_round_trip() {
        for option in FilterOption::ALL {
            assert_eq!(FilterOption::from_name(option.as_str()), Some(option));
        }
        assert_eq!(
            FilterOption::from_name("third-party"),
            Some(FilterOption::ThirdParty)
        );
        assert_eq!(FilterOption::from_name("popup"), None);
    }

    #[test]
    fn test_option_keys_include_domain() {
        let rule = rule_with(&[(FilterOption::Script, true)], &[("example.com", true)]);
        assert_eq!(rule.option_keys(), vec!["script", "domain"]);

        let rule = rule_with(&[], &[]);
        assert!(rule.option_keys().is_empty());
    }

    #[test]
    fn test_domain_allows() {
        let rule = rule_with(&[], &[("example.com", true), ("other.org", true)]);
        assert!(rule.domain_allows("www.example.com"));
        assert!(rule.domain_allows("other.org"));
        assert!(!rule.domain_allows("unrelated.net"));

        let rule = rule_with(&[], &[("example.com", false)]);
        assert!(!rule.domain_allows("example.com"));
        assert!(rule.domain_allows("other.org"));
    }

    #[test]
    fn test_options_satisfied() {
        let mut flags = OptionFlags::default();
        flags.set(FilterOption::Image, true);

        let image = rule_with(&[(FilterOption::Image, true)], &[]);
        let script = rule_with(&[(FilterOption::Script, true)], &[]);
        let not_image = rule_with(&[(FilterOption::Image, false)], &[]);
        let none = rule_with(&[], &[]);

        assert!(image.options_satisfied(&flags));
        assert!(!script.options_satisfied(&flags));
        assert!(!not_image.options_satisfied(&flags));
        assert!(none.options_satisfied(&flags));
        assert!(not_image.options_satisfied(&OptionFlags::default()));
    }

    #[test]
    fn test_request_accessors() {
        let req = Request::parse("https://CDN.Example.com/static/app.min.js?v=3")
            .unwrap()
            .with_referer("https://example.com/")
            .with_xhr(true);
        assert_eq!(req.hostname(), "cdn.example.com");
        assert_eq!(req.file_name(), "app.min.js");
        assert_eq!(req.url_str(), "https://cdn.example.com/static/app.min.js?v=3");
        assert!(req.is_xhr);
    }

    #[test]
    fn test_file_name_ignores_trailing_slash() {
        let req = Request::parse("http://a.com/lib.js/").unwrap();
        assert_eq!(req.file_name(), "lib.js");
        let req = Request::parse("http://a.com/").unwrap();
        assert_eq!(req.file_name(), "");
        let req = Request::parse("http://a.com/dir//").unwrap();
        assert_eq!(req.file_name(), "");
    }

    #[test]
    fn test_request_parse_rejects_relative() {
        assert!(Request::parse("/relative/path").is_err());
    }
}
