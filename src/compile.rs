//! Filter set builder and the alternation matching engine.
//!
//! Rules are partitioned by option: option-free rules go into one
//! unconditional alternation, option-bearing rules into the alternations of
//! the options they include. `~option` exclusions act as a guard on the
//! alternation a rule lands in, and rules made only of exclusions share a
//! separate guarded group. A request is tested against the unconditional
//! alternation first and then only against the alternations of the options
//! it actually carries, so per-request work does not grow with the number of
//! rules.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};

use crate::config::{CompileStrategy, EngineOptions};
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::matcher::RequestMatcher;
use crate::options::{derive_options, OptionFlags, ThirdPartyMode};
use crate::parser::visit_rules;
use crate::types::{FilterOption, Request, Rule};

/// Regex builder settings shared by every alternation of a set
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegexSettings {
    pub case_insensitive: bool,
    pub size_limit: usize,
}

impl RegexSettings {
    pub fn from_options(options: &EngineOptions) -> Self {
        Self {
            case_insensitive: options.case_insensitive,
            size_limit: options.size_limit,
        }
    }

    pub fn build(&self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(self.case_insensitive)
            .size_limit(self.size_limit)
            .build()
    }
}

/// Many rule patterns OR-joined into one regex, compiled at most once
#[derive(Debug, Default)]
struct Alternation {
    source: String,
    count: usize,
    regex: OnceCell<Option<Regex>>,
}

impl Alternation {
    fn push(&mut self, pattern: &str) {
        if !self.source.is_empty() {
            self.source.push('|');
        }
        // Group each rule so inline flags and anchors stay local to it.
        self.source.push_str("(?:");
        self.source.push_str(pattern);
        self.source.push(')');
        self.count += 1;
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn compile(&self, settings: &RegexSettings) -> Result<()> {
        if self.is_empty() || self.regex.get().is_some() {
            return Ok(());
        }
        let regex = settings.build(&self.source)?;
        let _ = self.regex.set(Some(regex));
        Ok(())
    }

    fn is_match(&self, text: &str, settings: &RegexSettings) -> bool {
        if self.is_empty() {
            return false;
        }
        let regex = self.regex.get_or_init(|| match settings.build(&self.source) {
            Ok(regex) => Some(regex),
            Err(e) => {
                log::error!(
                    "alternation of {} rules failed to compile, it will match nothing: {}",
                    self.count,
                    e
                );
                None
            }
        });
        regex.as_ref().is_some_and(|r| r.is_match(text))
    }
}

/// Bit set of the options a rule excludes with `~`
fn excluded_mask(rule: &Rule) -> u8 {
    rule.options
        .iter()
        .filter(|&(_, &included)| !included)
        .fold(0, |mask, (option, _)| mask | option.bit())
}

/// Alternations keyed by the excluded-option mask shared by their rules.
///
/// An alternation is only consulted when none of its excluded options is
/// active on the request. Rules without `~` options live under mask 0.
type Guarded = BTreeMap<u8, Alternation>;

fn guarded_match(group: &Guarded, active: u8, url: &str, settings: &RegexSettings) -> bool {
    group
        .iter()
        .any(|(&mask, alternation)| mask & active == 0 && alternation.is_match(url, settings))
}

/// One group of alternations: unconditional plus per option
#[derive(Debug, Default)]
struct Partition {
    unconditional: Alternation,
    // Rules listing the option as included
    per_option: [Guarded; FilterOption::COUNT],
    // Rules whose options are all `~option`
    negated: Guarded,
}

impl Partition {
    fn add(&mut self, rule: &Rule) {
        if !rule.has_options() {
            self.unconditional.push(&rule.pattern);
            return;
        }

        let excluded = excluded_mask(rule);
        let mut any_included = false;
        for (&option, &included) in &rule.options {
            if included {
                any_included = true;
                self.per_option[option.index()]
                    .entry(excluded)
                    .or_default()
                    .push(&rule.pattern);
            }
        }
        if !any_included {
            self.negated.entry(excluded).or_default().push(&rule.pattern);
        }
    }

    fn alternations(&self) -> impl Iterator<Item = &Alternation> {
        std::iter::once(&self.unconditional)
            .chain(self.per_option.iter().flat_map(|group| group.values()))
            .chain(self.negated.values())
    }

    fn has_option_rules(&self) -> bool {
        !self.negated.is_empty() || self.per_option.iter().any(|group| !group.is_empty())
    }

    fn matches<F>(
        &self,
        url: &str,
        flags: &mut Option<OptionFlags>,
        derive: F,
        settings: &RegexSettings,
    ) -> bool
    where
        F: FnOnce() -> OptionFlags,
    {
        if self.unconditional.is_match(url, settings) {
            return true;
        }
        if !self.has_option_rules() {
            return false;
        }

        let flags = *flags.get_or_insert_with(derive);
        let active = flags.mask();
        flags
            .active()
            .any(|option| guarded_match(&self.per_option[option.index()], active, url, settings))
            || guarded_match(&self.negated, active, url, settings)
    }
}

/// A compiled filter list using option-partitioned alternations
#[derive(Debug)]
pub struct FilterSet {
    block: Partition,
    exceptions: Partition,
    rule_count: usize,
    exception_count: usize,
    third_party: ThirdPartyMode,
    settings: RegexSettings,
}

impl FilterSet {
    /// Build a filter set from raw filter-list lines.
    ///
    /// Soft-skipped lines are reported to `sink`. A hard parse failure aborts
    /// the build. With [`CompileStrategy::Eager`] every alternation is also
    /// compiled here, and a compile failure aborts the build too.
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

        let mut set = Self {
            block: Partition::default(),
            exceptions: Partition::default(),
            rule_count: 0,
            exception_count: 0,
            third_party: options.third_party,
            settings: RegexSettings::from_options(options),
        };

        let stats = visit_rules(lines, sink, |rule| set.add(&rule, options.honor_exceptions))?;

        log::debug!(
            "filter set built: {} rules ({} exceptions), {} lines skipped",
            stats.rules,
            set.exception_count,
            stats.skipped
        );

        if options.compile == CompileStrategy::Eager {
            set.compile_all()?;
        }

        Ok(set)
    }

    /// Build a filter set from a whole filter-list text.
    pub fn build_from_str(
        text: &str,
        options: &EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        Self::build(text.lines(), options, sink)
    }

    /// Build a filter set from a filter-list file.
    pub fn from_file(
        path: impl AsRef<Path>,
        options: &EngineOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::build_from_str(&text, options, sink)
    }

    fn add(&mut self, rule: &Rule, honor_exceptions: bool) {
        self.rule_count += 1;
        if rule.is_exception && honor_exceptions {
            self.exception_count += 1;
            self.exceptions.add(rule);
        } else {
            self.block.add(rule);
        }
    }

    /// Compile every non-empty alternation that is not compiled yet.
    pub fn compile_all(&self) -> Result<()> {
        for alternation in self.block.alternations().chain(self.exceptions.alternations()) {
            alternation.compile(&self.settings)?;
        }
        Ok(())
    }

    /// Whether the request is blocked.
    ///
    /// A request is blocked when a blocking alternation matches its URL and
    /// no exception alternation does.
    pub fn is_blocked(&self, req: &Request) -> bool {
        let url = req.url_str();
        let mut flags = None;
        let derive = || derive_options(req, self.third_party);

        if !self.block.matches(url, &mut flags, derive, &self.settings) {
            return false;
        }
        !self.exceptions.matches(url, &mut flags, derive, &self.settings)
    }

    /// Whether the request is allowed through.
    pub fn allow(&self, req: &Request) -> bool {
        !self.is_blocked(req)
    }

    /// Number of rules that contributed to the set
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// Number of rules kept as overriding exceptions
    pub fn exception_count(&self) -> usize {
        self.exception_count
    }

    /// The merged unconditional blocking pattern
    pub fn unconditional_pattern(&self) -> &str {
        &self.block.unconditional.source
    }

    /// The merged blocking pattern for `option`, over the rules that
    /// include it and exclude nothing
    pub fn option_pattern(&self, option: FilterOption) -> &str {
        self.block.per_option[option.index()]
            .get(&0)
            .map_or("", |alternation| alternation.source.as_str())
    }
}

impl RequestMatcher for FilterSet {
    fn is_blocked(&self, req: &Request) -> bool {
        FilterSet::is_blocked(self, req)
    }

    fn rule_count(&self) -> usize {
        self.rule_count
    }
}
