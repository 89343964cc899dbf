pub mod domain;
pub mod trie;

pub use domain::DomainIndex;
pub use trie::TrieMatcher;

use crate::types::Request;

/// Trait for request matchers.
///
/// Both backends, [`crate::FilterSet`] and [`TrieMatcher`], implement it so
/// the [`crate::Blocker`] can pick one by configuration.
pub trait RequestMatcher: Send + Sync {
    /// Check if the request should be blocked
    fn is_blocked(&self, req: &Request) -> bool;

    /// Check if the request may go through
    fn allow(&self, req: &Request) -> bool {
        !self.is_blocked(req)
    }

    /// Number of rules that contributed to the matcher
    fn rule_count(&self) -> usize;
}
