//! Build-time diagnostics for skipped rules.

use crate::error::RuleError;

/// A line the builder dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number in the input
    pub line: usize,
    /// The raw line
    pub text: String,
    /// Why it was dropped
    pub reason: RuleError,
}

/// Receives a [`Diagnostic`] for every soft-skipped line during a build
pub trait DiagnosticSink {
    fn record(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&mut self, diagnostic: Diagnostic) {
        log::debug!(
            "line {}: {}: {}",
            diagnostic.line,
            diagnostic.reason,
            diagnostic.text
        );
    }
}

/// Collects diagnostics in memory
impl DiagnosticSink for Vec<Diagnostic> {
    fn record(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.record(Diagnostic {
            line: 3,
            text: "! comment".into(),
            reason: RuleError::SkipComment,
        });
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].line, 3);
    }

    #[test]
    fn test_log_sink_accepts_records() {
        let mut sink = LogSink;
        sink.record(Diagnostic {
            line: 1,
            text: "a##b".into(),
            reason: RuleError::SkipUnsupportedSyntax,
        });
    }
}
