//! Hostname suffix index for `||domain^` rules.

use std::collections::HashMap;

/// Maps a domain to the ids of the rules anchored on it.
///
/// A hostname matches a domain when it equals it or is one of its
/// subdomains, so lookup walks the hostname one label at a time with one map
/// lookup per level.
#[derive(Debug, Clone, Default)]
pub struct DomainIndex {
    suffixes: HashMap<String, Vec<usize>>,
}

impl DomainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rule `id` under `domain` (lowercased, no leading dot)
    pub fn insert(&mut self, domain: &str, id: usize) {
        let domain = domain.trim_start_matches('.').to_lowercase();
        self.suffixes.entry(domain).or_default().push(id);
    }

    /// Call `accept` with every rule id whose domain covers `hostname`,
    /// stopping at the first accepted id.
    ///
    /// Assumes `hostname` is already lowercased.
    pub fn any_match<F>(&self, hostname: &str, mut accept: F) -> bool
    where
        F: FnMut(usize) -> bool,
    {
        if hostname.is_empty() || self.suffixes.is_empty() {
            return false;
        }

        let mut pos = 0;
        loop {
            let candidate = &hostname[pos..];
            if let Some(ids) = self.suffixes.get(candidate) {
                if ids.iter().any(|&id| accept(id)) {
                    return true;
                }
            }
            match candidate.find('.') {
                Some(dot_pos) => pos += dot_pos + 1,
                None => return false,
            }
        }
    }

    /// Number of distinct domains
    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}
