//! Trie matching backend.
//!
//! Plain address rules are stored as character paths in a trie, with `*`
//! as a wildcard edge. `||domain^` rules go into a hostname suffix index and
//! `|address|` rules into an exact-match map. Rules none of these can express
//! (regex literals, start-anchored rules, `||` rules with a path) keep their
//! own compiled regex. Options and domain restrictions are checked per rule.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use super::{DomainIndex, RequestMatcher};
use crate::compile::RegexSettings;
use crate::config::EngineOptions;
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::options::{derive_options, OptionFlags, ThirdPartyMode};
use crate::parser::parse_rules;
use crate::pattern::regex_literal;
use crate::types::{Request, Rule};

/// Edge label matching any run of characters, including none
const WILDCARD: char = '*';

/// Path insertion stops here; the rest of the rule is not indexed
const SEPARATOR: char = '^';

#[derive(Debug, Clone, Copy)]
struct TrieEntry {
    rule: usize,
    end_anchored: bool,
}

#[derive(Debug, Default)]
struct TrieNode {
    next: HashMap<char, TrieNode>,
    entries: Vec<TrieEntry>,
}

impl TrieNode {
    fn insert<P>(&mut self, path: P, entry: TrieEntry)
    where
        P: IntoIterator<Item = char>,
    {
        let mut node = self;
        for ch in path {
            if ch == SEPARATOR {
                break;
            }
            node = node.next.entry(ch).or_default();
        }
        node.entries.push(entry);
    }

    /// Walk `text` from `pos`, offering every reached entry to `accept`
    /// together with the position it was reached at.
    ///
    /// `visited` is shared by every walk over the same text. A `(node, pos)`
    /// state is expanded at most once and a wildcard child never rescans an
    /// offset range, so one lookup is bounded by reached nodes times text
    /// length.
    fn find<F>(&self, text: &[char], pos: usize, accept: &mut F, visited: &mut Visited) -> bool
    where
        F: FnMut(TrieEntry, usize) -> bool,
    {
        if !visited.states.insert((self as *const TrieNode, pos)) {
            return false;
        }

        if self.entries.iter().any(|&entry| accept(entry, pos)) {
            return true;
        }

        if let Some(child) = text.get(pos).and_then(|ch| self.next.get(ch)) {
            if child.find(text, pos + 1, accept, visited) {
                return true;
            }
        }

        let star = match self.next.get(&WILDCARD) {
            Some(star) => star,
            None => return false,
        };
        let key = star as *const TrieNode;
        let end = visited
            .wildcard_from
            .get(&key)
            .copied()
            .unwrap_or(text.len() + 1);
        if pos >= end {
            return false;
        }
        visited.wildcard_from.insert(key, pos);
        (pos..end).any(|next| star.find(text, next, accept, visited))
    }
}

/// Walk state for one lookup
#[derive(Debug, Default)]
struct Visited {
    // Expanded `(node, pos)` states; none of them led to a match
    states: HashSet<(*const TrieNode, usize)>,
    // Lowest offset each wildcard node has been tried from
    wildcard_from: HashMap<*const TrieNode, usize>,
}

/// Where a rule is stored
#[derive(Debug, PartialEq, Eq)]
enum Placement<'a> {
    Domain(&'a str),
    Exact(&'a str),
    Path { body: &'a str, end_anchored: bool },
    Fallback,
}

fn place(pattern_text: &str) -> Placement<'_> {
    if regex_literal(pattern_text).is_some() {
        return Placement::Fallback;
    }

    if let Some(rest) = pattern_text.strip_prefix("||") {
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
            .unwrap_or(rest.len());
        let (host, remainder) = rest.split_at(end);
        if !host.is_empty() && remainder == "^" {
            return Placement::Domain(host);
        }
        return Placement::Fallback;
    }

    if let Some(rest) = pattern_text.strip_prefix('|') {
        if let Some(addr) = rest.strip_suffix('|') {
            if !addr.is_empty() && !addr.contains([WILDCARD, SEPARATOR, '|']) {
                return Placement::Exact(addr);
            }
        }
        return Placement::Fallback;
    }

    match pattern_text.strip_suffix('|') {
        // An end anchor behind a separator is lost with the truncated path.
        Some(body) if !body.contains(SEPARATOR) => Placement::Path {
            body,
            end_anchored: true,
        },
        _ => Placement::Path {
            body: pattern_text,
            end_anchored: false,
        },
    }
}

/// Request data shared by every lookup of one check
struct Lookup<'a> {
    url: &'a str,
    folded: String,
    chars: Vec<char>,
    hostname: String,
    flags: OptionFlags,
}

impl<'a> Lookup<'a> {
    fn new(req: &'a Request, third_party: ThirdPartyMode, case_insensitive: bool) -> Self {
        let url = req.url_str();
        let folded = fold(url, case_insensitive);
        let chars = folded.chars().collect();
        Self {
            url,
            folded,
            chars,
            hostname: req.hostname(),
            flags: derive_options(req, third_party),
        }
    }
}

fn fold(text: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

/// All rules of one kind (blocking or exception) in trie form
#[derive(Debug, Default)]
struct TrieIndex {
    rules: Vec<Rule>,
    paths: TrieNode,
    domains: DomainIndex,
    exact: HashMap<String, Vec<usize>>,
    fallback: Vec<(usize, Regex)>,
}

impl TrieIndex {
    fn insert(&mut self, rule: Rule, settings: &RegexSettings) -> Result<()> {
        let id = self.rules.len();

        match place(&rule.pattern_text) {
            Placement::Domain(host) => self.domains.insert(host, id),
            Placement::Exact(addr) => self
                .exact
                .entry(fold(addr, settings.case_insensitive))
                .or_default()
                .push(id),
            Placement::Path { body, end_anchored } => self.paths.insert(
                fold(body, settings.case_insensitive).chars(),
                TrieEntry {
                    rule: id,
                    end_anchored,
                },
            ),
            Placement::Fallback => {
                let regex = settings.build(&rule.pattern)?;
                self.fallback.push((id, regex));
            }
        }

        self.rules.push(rule);
        Ok(())
    }

    fn applies(&self, id: usize, lookup: &Lookup<'_>) -> bool {
        let rule = &self.rules[id];
        rule.options_satisfied(&lookup.flags) && rule.domain_allows(&lookup.hostname)
    }

    fn matches(&self, lookup: &Lookup<'_>) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        if self
            .domains
            .any_match(&lookup.hostname, |id| self.applies(id, lookup))
        {
            return true;
        }

        if let Some(ids) = self.exact.get(&lookup.folded) {
            if ids.iter().any(|&id| self.applies(id, lookup)) {
                return true;
            }
        }

        if self
            .fallback
            .iter()
            .any(|(id, regex)| regex.is_match(lookup.url) && self.applies(*id, lookup))
        {
            return true;
        }

        let len = lookup.chars.len();
        let mut accept = |entry: TrieEntry, pos: usize| {
            (!entry.end_anchored || pos == len) && self.applies(entry.rule, lookup)
        };
        let mut visited = Visited::default();
        (0..len).any(|start| {
            self.paths
                .find(&lookup.chars, start, &mut accept, &mut visited)
        })
    }

    fn len(&self) -> usize {
        self.rules.len()
    }
}

/// A compiled filter list using the trie backend
#[derive(Debug)]
pub struct TrieMatcher {
    block: TrieIndex,
    exceptions: TrieIndex,
    third_party: ThirdPartyMode,
    case_insensitive: bool,
}

impl TrieMatcher {
    /// Build a trie matcher from raw filter-list lines.
    ///
    /// Line handling is the same as for [`crate::FilterSet::build`]. Rules
    /// that keep their own regex are always compiled here.
    pub fn build<I, S>(
        lines: I,
        options: &EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        options.validate()?;
        let rules = parse_rules(lines, sink)?;
        Self::from_rules(rules, options)
    }

    /// Build a trie matcher from a whole filter-list text.
    pub fn build_from_str(
        text: &str,
        options: &EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        Self::build(text.lines(), options, sink)
    }

    /// Build a trie matcher from already parsed rules.
    pub fn from_rules<I>(rules: I, options: &EngineOptions) -> Result<Self>
    where
        I: IntoIterator<Item = Rule>,
    {
        let settings = RegexSettings::from_options(options);
        let mut matcher = Self {
            block: TrieIndex::default(),
            exceptions: TrieIndex::default(),
            third_party: options.third_party,
            case_insensitive: options.case_insensitive,
        };

        for rule in rules {
            if rule.is_exception && options.honor_exceptions {
                matcher.exceptions.insert(rule, &settings)?;
            } else {
                matcher.block.insert(rule, &settings)?;
            }
        }

        log::debug!(
            "trie matcher built: {} rules ({} exceptions), {} kept as regex",
            matcher.rule_count(),
            matcher.exception_count(),
            matcher.fallback_count()
        );

        Ok(matcher)
    }

    /// Whether the request is blocked.
    pub fn is_blocked(&self, req: &Request) -> bool {
        if self.block.len() == 0 {
            return false;
        }
        let lookup = Lookup::new(req, self.third_party, self.case_insensitive);
        self.block.matches(&lookup) && !self.exceptions.matches(&lookup)
    }

    /// Whether the request is allowed through.
    pub fn allow(&self, req: &Request) -> bool {
        !self.is_blocked(req)
    }

    /// Number of rules that contributed to the matcher
    pub fn rule_count(&self) -> usize {
        self.block.len() + self.exceptions.len()
    }

    /// Number of rules kept as overriding exceptions
    pub fn exception_count(&self) -> usize {
        self.exceptions.len()
    }

    /// Number of rules matched by their own regex instead of the trie
    pub fn fallback_count(&self) -> usize {
        self.block.fallback.len() + self.exceptions.fallback.len()
    }
}

impl RequestMatcher for TrieMatcher {
    fn is_blocked(&self, req: &Request) -> bool {
        TrieMatcher::is_blocked(self, req)
    }

    fn rule_count(&self) -> usize {
        TrieMatcher::rule_count(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;

    fn build(text: &str) -> TrieMatcher {
        build_with(text, &EngineOptions::default())
    }

    fn build_with(text: &str, options: &EngineOptions) -> TrieMatcher {
        let mut sink: Vec<Diagnostic> = Vec::new();
        TrieMatcher::build_from_str(text, options, &mut sink).unwrap()
    }

    fn req(url: &str) -> Request {
        Request::parse(url).unwrap()
    }

    #[test]
    fn test_placement() {
        assert_eq!(place("||ads.net^"), Placement::Domain("ads.net"));
        assert_eq!(place("||ads.net/banner"), Placement::Fallback);
        assert_eq!(place("||ads.net"), Placement::Fallback);
        assert_eq!(place("|http://a.com/x|"), Placement::Exact("http://a.com/x"));
        assert_eq!(place("|http://a.com/*|"), Placement::Fallback);
        assert_eq!(place("|http://"), Placement::Fallback);
        assert_eq!(place("/ads[0-9]/"), Placement::Fallback);
        assert_eq!(
            place("/banner.gif|"),
            Placement::Path {
                body: "/banner.gif",
                end_anchored: true
            }
        );
        assert_eq!(
            place("/banner^|"),
            Placement::Path {
                body: "/banner^|",
                end_anchored: false
            }
        );
    }

    #[test]
    fn test_path_rule_matches_anywhere() {
        let matcher = build("/ads/banner");
        assert!(matcher.is_blocked(&req("http://a.com/ads/banner.gif")));
        assert!(matcher.is_blocked(&req("http://a.com/x/ads/banner")));
        assert!(!matcher.is_blocked(&req("http://a.com/ads/bann")));
    }

    #[test]
    fn test_wildcard_edge() {
        let matcher = build("/ads/*/banner");
        assert!(matcher.is_blocked(&req("http://a.com/ads/123/banner.gif")));
        assert!(matcher.is_blocked(&req("http://a.com/ads/a/b/c/banner")));
        assert!(!matcher.is_blocked(&req("http://a.com/ads/banner")));
    }

    #[test]
    fn test_many_wildcards_stay_bounded() {
        let pattern = "a*a*a*a*a*b";
        let mut root = TrieNode::default();
        root.insert(
            pattern.chars(),
            TrieEntry {
                rule: 0,
                end_anchored: false,
            },
        );

        let text: Vec<char> = format!("http://x.com/{}", "a".repeat(2000)).chars().collect();
        let mut visited = Visited::default();
        let mut accept = |_: TrieEntry, _: usize| true;
        let found = (0..text.len()).any(|start| root.find(&text, start, &mut accept, &mut visited));
        assert!(!found);

        // Each of the trie's nodes is expanded at most once per offset.
        let nodes = pattern.len() + 1;
        assert!(visited.states.len() <= nodes * (text.len() + 1));

        let matcher = build(pattern);
        let started = std::time::Instant::now();
        assert!(!matcher.is_blocked(&req(&format!("http://x.com/{}", "a".repeat(2000)))));
        assert!(matcher.is_blocked(&req(&format!("http://x.com/{}b", "a".repeat(2000)))));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_separator_stops_indexing() {
        let matcher = build("/banner^");
        assert!(matcher.is_blocked(&req("http://a.com/banner/x")));
        assert!(matcher.is_blocked(&req("http://a.com/banner?x=1")));
    }

    #[test]
    fn test_end_anchor() {
        let matcher = build(".swf|");
        assert!(matcher.is_blocked(&req("http://a.com/movie.swf")));
        assert!(!matcher.is_blocked(&req("http://a.com/movie.swf?x=1")));
    }

    #[test]
    fn test_domain_rule() {
        let matcher = build("||ads.net^");
        assert!(matcher.is_blocked(&req("http://ads.net/x")));
        assert!(matcher.is_blocked(&req("https://cdn.ads.net/x")));
        assert!(!matcher.is_blocked(&req("http://badads.net/x")));
        assert!(!matcher.is_blocked(&req("http://example.com/ads.net")));
    }

    #[test]
    fn test_exact_rule() {
        let matcher = build("|http://exact.test/a|");
        assert!(matcher.is_blocked(&req("http://exact.test/a")));
        assert!(matcher.is_blocked(&req("http://exact.test/A")));
        assert!(!matcher.is_blocked(&req("http://exact.test/ab")));
        assert!(!matcher.is_blocked(&req("http://exact.test/")));
    }

    #[test]
    fn test_fallback_rules() {
        let matcher = build("|https://track.\n/banner[0-9]+/\n||ads.net/pixel");
        assert_eq!(matcher.fallback_count(), 3);
        assert!(matcher.is_blocked(&req("https://track.example.com/x")));
        assert!(!matcher.is_blocked(&req("http://track.example.com/x")));
        assert!(matcher.is_blocked(&req("http://a.com/banner42.gif")));
        assert!(matcher.is_blocked(&req("http://sub.ads.net/pixel.gif")));
        assert!(!matcher.is_blocked(&req("http://ads.net/other.gif")));
    }

    #[test]
    fn test_options_per_rule() {
        let matcher = build("||ads.net^$image\n/promo.$~script");
        assert!(matcher.is_blocked(&req("http://ads.net/a.png")));
        assert!(!matcher.is_blocked(&req("http://ads.net/a.html")));
        assert!(matcher.is_blocked(&req("http://a.com/promo.html")));
        assert!(!matcher.is_blocked(&req("http://a.com/promo.js")));
    }

    #[test]
    fn test_domain_restrictions() {
        let matcher = build("/banner$domain=news.com|~sports.news.com");
        assert!(matcher.is_blocked(&req("http://news.com/banner.gif")));
        assert!(!matcher.is_blocked(&req("http://sports.news.com/banner.gif")));
        assert!(!matcher.is_blocked(&req("http://other.org/banner.gif")));
    }

    #[test]
    fn test_exceptions() {
        let matcher = build("||ads.net^\n@@||ads.net/allowed/");
        assert_eq!(matcher.rule_count(), 2);
        assert_eq!(matcher.exception_count(), 1);
        assert!(matcher.is_blocked(&req("http://ads.net/banner")));
        assert!(!matcher.is_blocked(&req("http://ads.net/allowed/x")));

        let options = EngineOptions::default().with_honor_exceptions(false);
        let matcher = build_with("@@||ads.net/allowed/", &options);
        assert_eq!(matcher.exception_count(), 0);
        assert!(matcher.is_blocked(&req("http://ads.net/allowed/x")));
    }

    #[test]
    fn test_case_sensitive_option() {
        let options = EngineOptions::default().with_case_insensitive(false);
        let matcher = build_with("/Banner", &options);
        assert!(matcher.is_blocked(&req("http://a.com/Banner")));
        assert!(!matcher.is_blocked(&req("http://a.com/banner")));

        let matcher = build("/Banner");
        assert!(matcher.is_blocked(&req("http://a.com/BANNER")));
    }

    #[test]
    fn test_empty_matcher() {
        let matcher = build("! only a comment");
        assert_eq!(matcher.rule_count(), 0);
        assert!(matcher.allow(&req("http://a.com/")));
    }
}
