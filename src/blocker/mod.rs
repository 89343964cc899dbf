//! Blocker module.
//!
//! Front door of the engine: builds the configured backend from a filter
//! list and answers block decisions through an optional LRU cache.

use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use parking_lot::Mutex;

use crate::compile::FilterSet;
use crate::config::{Backend, EngineOptions};
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::matcher::{RequestMatcher, TrieMatcher};
use crate::types::{CacheKey, Request};

/// Blocker answers block decisions for requests.
///
/// The matching backend is chosen by [`EngineOptions::backend`]. Decisions
/// are cached per URL and referer unless the cache size is zero.
pub struct Blocker {
    matcher: Box<dyn RequestMatcher>,
    cache: Option<Mutex<LruCache<CacheKey, bool>>>,
}

impl Blocker {
    /// Create a new blocker from filter-list lines.
    pub fn new<I, S>(
        lines: I,
        options: EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matcher: Box<dyn RequestMatcher> = match options.backend {
            Backend::Alternation => Box::new(FilterSet::build(lines, &options, sink)?),
            Backend::Trie => Box::new(TrieMatcher::build(lines, &options, sink)?),
        };

        log::info!(
            "blocker ready: {:?} backend, {} rules",
            options.backend,
            matcher.rule_count()
        );

        Ok(Self::with_matcher(matcher, options.cache_size))
    }

    /// Create a new blocker from a whole filter-list text.
    pub fn build_from_str(
        text: &str,
        options: EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        Self::new(text.lines(), options, sink)
    }

    /// Create a new blocker from a filter-list file.
    pub fn from_file(
        path: impl AsRef<Path>,
        options: EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::build_from_str(&text, options, sink)
    }

    /// Wrap an already built matcher.
    pub fn with_matcher(matcher: Box<dyn RequestMatcher>, cache_size: usize) -> Self {
        let cache = NonZeroUsize::new(cache_size).map(|size| Mutex::new(LruCache::new(size)));
        Self { matcher, cache }
    }

    /// Whether the request is blocked.
    pub fn is_blocked(&self, req: &Request) -> bool {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return self.matcher.is_blocked(req),
        };

        let key = CacheKey::from_request(req);
        if let Some(&blocked) = cache.lock().get(&key) {
            return blocked;
        }

        // Matched outside the lock; concurrent misses on one key may both
        // match, and both store the same decision.
        let blocked = self.matcher.is_blocked(req);
        cache.lock().put(key, blocked);
        blocked
    }

    /// Whether the request is allowed through.
    pub fn allow(&self, req: &Request) -> bool {
        !self.is_blocked(req)
    }

    /// Number of rules behind the blocker
    pub fn rule_count(&self) -> usize {
        self.matcher.rule_count()
    }

    /// Number of cached decisions
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

impl std::fmt::Debug for Blocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blocker")
            .field("rule_count", &self.rule_count())
            .field("cache_len", &self.cache_len())
            .finish()
    }
}
