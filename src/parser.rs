use std::collections::BTreeMap;

use regex::Regex;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{FilterError, Result, RuleError};
use crate::pattern::{regex_literal, to_pattern};
use crate::types::{FilterOption, Rule};

/// Markers that make a whole line a comment or list header
const COMMENT_MARKERS: &[&str] = &["!", "[Adblock"];

/// Element-hiding (cosmetic) rule separators
const ELEMENT_HIDING_MARKERS: &[&str] = &["##", "#@#", "#?#"];

/// Line counts from one pass over a filter list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Lines that produced a rule
    pub rules: usize,
    /// Lines reported to the diagnostic sink
    pub skipped: usize,
}

/// Parse filter-list lines one at a time, handing every rule to `visit`.
///
/// Blank lines are ignored. Soft skips go to `sink`; the first hard failure
/// stops the pass and is returned with its 1-based line number.
pub fn visit_rules<I, S, F>(
    lines: I,
    sink: &mut dyn DiagnosticSink,
    mut visit: F,
) -> Result<ParseStats>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(Rule),
{
    let mut stats = ParseStats::default();

    for (line_num, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        match parse_rule(line) {
            Ok(rule) => {
                stats.rules += 1;
                visit(rule);
            }
            Err(reason) if reason.is_skip() => {
                stats.skipped += 1;
                sink.record(Diagnostic {
                    line: line_num + 1,
                    text: line.to_string(),
                    reason,
                });
            }
            Err(reason) => {
                log::debug!("cannot parse rule at line {}: {}", line_num + 1, reason);
                return Err(FilterError::ParseErrorAtLine {
                    line: line_num + 1,
                    text: line.to_string(),
                    message: reason.to_string(),
                });
            }
        }
    }

    Ok(stats)
}

/// Parse filter-list lines into rules.
pub fn parse_rules<I, S>(lines: I, sink: &mut dyn DiagnosticSink) -> Result<Vec<Rule>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut rules = Vec::new();
    visit_rules(lines, sink, |rule| rules.push(rule))?;
    Ok(rules)
}

/// Parse a single filter-list line into a [`Rule`].
///
/// Comments, element-hiding rules and rules with unsupported options come
/// back as soft [`RuleError`] skips. A `domain=` option without any domain,
/// or a `/regex/` rule that does not compile, is a [`RuleError::ParseFailure`].
pub fn parse_rule(line: &str) -> std::result::Result<Rule, RuleError> {
    let text = line.trim();

    if text.is_empty() || COMMENT_MARKERS.iter().any(|m| text.contains(m)) {
        return Err(RuleError::SkipComment);
    }

    if ELEMENT_HIDING_MARKERS.iter().any(|m| text.contains(m)) {
        return Err(RuleError::SkipUnsupportedSyntax);
    }

    let (is_exception, text) = match text.strip_prefix("@@") {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (pattern_text, options_text) = split_rule_options(text);

    let mut options = BTreeMap::new();
    let mut domains = BTreeMap::new();
    if let Some(options_text) = options_text {
        parse_options(options_text, &mut options, &mut domains)?;
    }

    if let Some(body) = regex_literal(pattern_text) {
        Regex::new(body)
            .map_err(|e| RuleError::ParseFailure(format!("invalid regex /{}/: {}", body, e)))?;
    }

    Ok(Rule {
        raw: line.to_string(),
        pattern_text: pattern_text.to_string(),
        pattern: to_pattern(pattern_text),
        is_exception,
        options,
        domains,
    })
}

/// Split `pattern$options`.
///
/// Regex rules may contain `$` themselves, so for them the separator is the
/// `$` directly after the closing slash.
fn split_rule_options(text: &str) -> (&str, Option<&str>) {
    if text.starts_with('/') {
        if let Some(pos) = text.rfind("/$") {
            if pos > 0 {
                return (&text[..=pos], Some(&text[pos + 2..]));
            }
        }
        if regex_literal(text).is_some() {
            return (text, None);
        }
    }

    match text.split_once('$') {
        Some((pattern, options)) => (pattern, Some(options)),
        None => (text, None),
    }
}

fn parse_options(
    text: &str,
    options: &mut BTreeMap<FilterOption, bool>,
    domains: &mut BTreeMap<String, bool>,
) -> std::result::Result<(), RuleError> {
    for raw in text.split(',') {
        let token = raw.trim().to_ascii_lowercase();
        if token.is_empty() {
            continue;
        }

        if let Some(value) = token.strip_prefix("domain=") {
            parse_domain_option(value, domains)?;
            continue;
        }

        let (included, name) = match token.strip_prefix('~') {
            Some(rest) => (false, rest),
            None => (true, token.as_str()),
        };

        let option = FilterOption::from_name(name)
            .ok_or_else(|| RuleError::SkipUnsupportedOption(token.clone()))?;
        options.insert(option, included);
    }

    Ok(())
}

fn parse_domain_option(
    value: &str,
    domains: &mut BTreeMap<String, bool>,
) -> std::result::Result<(), RuleError> {
    let mut parsed = 0;

    for raw in value.split('|') {
        let raw = raw.trim();
        let (required, domain) = match raw.strip_prefix('~') {
            Some(rest) => (false, rest),
            None => (true, raw),
        };
        if domain.is_empty() {
            continue;
        }
        domains.insert(domain.to_string(), required);
        parsed += 1;
    }

    if parsed == 0 {
        return Err(RuleError::ParseFailure(format!(
            "empty domain option: domain={}",
            value
        )));
    }

    Ok(())
}
