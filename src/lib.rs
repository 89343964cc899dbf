//! AdBlock Engine - AdBlock filter-list compiler and request matcher for Rust
//!
//! This library turns AdBlock Plus style filter lists into compact matchers:
//! - Rule parsing with soft skips for comments, cosmetic rules and
//!   unsupported options
//! - Pattern translation to regex syntax (anchors, separators, wildcards)
//! - Option-partitioned regex alternations, compiled eagerly or lazily
//! - An alternative trie backend with hostname and exact-address indexes
//! - `@@` exception rules overriding blocks
//! - LRU caching of block decisions
//!
//! # Example
//!
//! ```rust
//! use adblock_engine_r::{Blocker, EngineOptions, LogSink, Request};
//!
//! let rules = "
//! ! Sample list
//! ||ads.example.net^
//! /banner.$image
//! @@||ads.example.net/allowed/
//! ";
//!
//! let blocker = Blocker::build_from_str(rules, EngineOptions::default(), &mut LogSink).unwrap();
//!
//! let req = Request::parse("https://cdn.ads.example.net/track.js").unwrap();
//! assert!(blocker.is_blocked(&req));
//!
//! let req = Request::parse("https://ads.example.net/allowed/ok.js").unwrap();
//! assert!(blocker.allow(&req));
//!
//! let req = Request::parse("https://news.example.com/banner.png").unwrap();
//! assert!(blocker.is_blocked(&req));
//! ```
//!
//! # Rule Syntax
//!
//! ```text
//! [@@]pattern[$option[,option...]]
//! ```
//!
//! | Pattern | Example | Meaning |
//! |---------|---------|---------|
//! | Substring | `/ads/` | Anywhere in the URL |
//! | Wildcard | `/ads/*/banner` | `*` matches any run of characters |
//! | Separator | `/banner^` | `^` matches a separator or the end |
//! | Domain anchor | `\|\|ads.net^` | Host `ads.net` or a subdomain |
//! | Start / end anchor | `\|http://a.com/x\|` | Whole URL |
//! | Regex | `/banner[0-9]+/` | Regex body used as-is |
//!
//! ## Options
//!
//! - `script`, `image`, `stylesheet`, `font` - request type, by file name
//! - `thirdparty` (or `third-party`) - request carries a referer
//! - `~option` - request must not have the option
//! - `domain=a.com|~b.a.com` - hostname restrictions

pub mod blocker;
pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod matcher;
pub mod options;
pub mod parser;
pub mod pattern;
pub mod types;

// Re-export commonly used types
pub use blocker::Blocker;
pub use compile::FilterSet;
pub use config::{Backend, CompileStrategy, EngineOptions, DEFAULT_CACHE_SIZE};
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink};
pub use error::{FilterError, Result, RuleError};
pub use matcher::{RequestMatcher, TrieMatcher};
pub use options::{derive_options, OptionFlags, ThirdPartyMode};
pub use parser::{parse_rule, parse_rules, visit_rules, ParseStats};
pub use pattern::to_pattern;
pub use types::{FilterOption, Request, Rule};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_workflow() {
        let rules = "
[Adblock Plus 2.0]
! Title: test list
||ads.example.net^
|http://exact.example.org/pixel.gif|
/banner.$image
/tracker.js$thirdparty
/fonts/*$font,domain=news.com
example.com##.sidebar-ad
/x.$popup
@@||ads.example.net/allowed/
";

        for backend in [Backend::Alternation, Backend::Trie] {
            let mut sink: Vec<Diagnostic> = Vec::new();
            let options = EngineOptions::default().with_backend(backend);
            let blocker = Blocker::build_from_str(rules, options, &mut sink).unwrap();

            assert_eq!(blocker.rule_count(), 6, "{:?}", backend);
            assert_eq!(sink.len(), 4, "{:?}", backend);
            assert!(matches!(
                sink.last().map(|d| &d.reason),
                Some(RuleError::SkipUnsupportedOption(_))
            ));

            let check = |url: &str, referer: &str| {
                let req = Request::parse(url).unwrap().with_referer(referer);
                blocker.is_blocked(&req)
            };

            assert!(check("https://ads.example.net/x", ""));
            assert!(!check("https://ads.example.net/allowed/x", ""));
            assert!(check("http://exact.example.org/pixel.gif", ""));
            assert!(!check("http://exact.example.org/pixel.gif?x", ""));

            assert!(check("http://a.com/banner.png", ""));
            assert!(!check("http://a.com/banner.html", ""));

            assert!(check("http://a.com/tracker.js", "http://b.com/"));
            assert!(!check("http://a.com/tracker.js", ""));

            assert!(!check("http://a.com/clean.html", ""));
        }
    }
}
