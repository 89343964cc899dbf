//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::options::ThirdPartyMode;

/// Default LRU cache size for block decisions
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Default compiled-size limit for a single alternation regex (64 MiB)
pub const DEFAULT_SIZE_LIMIT: usize = 64 << 20;

/// Matching backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Option-partitioned regex alternations
    #[default]
    Alternation,
    /// Character trie with domain and exact-address side lists
    Trie,
}

/// When alternation regexes are compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStrategy {
    /// At build time; compile errors fail the build
    #[default]
    Eager,
    /// On first use of each alternation
    Lazy,
}

/// Engine options.
///
/// All fields have defaults, so a partial JSON object is accepted:
///
/// ```
/// use adblock_engine_r::{Backend, EngineOptions};
///
/// let options = EngineOptions::from_json(r#"{"backend": "trie", "cache_size": 0}"#).unwrap();
/// assert_eq!(options.backend, Backend::Trie);
/// assert!(options.case_insensitive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub backend: Backend,
    pub compile: CompileStrategy,
    /// Match patterns case-insensitively
    pub case_insensitive: bool,
    /// Let `@@` exception rules override blocks. When off, exception rules
    /// are folded into the blocking rules.
    pub honor_exceptions: bool,
    pub third_party: ThirdPartyMode,
    /// Decision cache size; 0 disables the cache
    pub cache_size: usize,
    /// Compiled-size limit passed to the regex builder
    pub size_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            compile: CompileStrategy::default(),
            case_insensitive: true,
            honor_exceptions: true,
            third_party: ThirdPartyMode::default(),
            cache_size: DEFAULT_CACHE_SIZE,
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

impl EngineOptions {
    /// Create default engine options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object and validate them.
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size_limit == 0 {
            return Err(FilterError::ConfigError(
                "size_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compile(mut self, compile: CompileStrategy) -> Self {
        self.compile = compile;
        self
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn with_honor_exceptions(mut self, honor: bool) -> Self {
        self.honor_exceptions = honor;
        self
    }

    pub fn with_third_party(mut self, mode: ThirdPartyMode) -> Self {
        self.third_party = mode;
        self
    }

    /// Set cache size.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }
}
