//! Structured findings produced by the linear-ownership checker.
//!
//! The checker emits no text. Each finding is a [`Diagnostic`] record that a
//! driver layer can render however it likes; site identifiers resolve back to
//! source locations through the front end that built the program model.

use indexmap::IndexSet;
use lc_span::FileSpan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The exhaustive set of user-visible finding kinds.
///
/// Ordering is used for the deterministic sort of the final diagnostic list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A resource released twice (or possibly twice) with no intervening
    /// reallocation.
    DoubleRelease,
    /// A variable accessed after its resource was (or may have been)
    /// released or transferred away.
    UseAfterRelease,
    /// A still-owned resource overwritten or abandoned on at least one path.
    LeakOnPath,
    /// A resource that is still owned on every path reaching scope exit.
    LeakOnAllPaths,
    /// A released or possibly-released pointer returned from a function that
    /// promises to produce an owned resource.
    DanglingReturn,
}

impl DiagnosticKind {
    /// Severity policy: everything is an error except [`LeakOnPath`], which
    /// is a may-fact weakened by path-insensitivity.
    ///
    /// [`LeakOnPath`]: DiagnosticKind::LeakOnPath
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::DoubleRelease
            | Self::UseAfterRelease
            | Self::LeakOnAllPaths
            | Self::DanglingReturn => Severity::Error,
            Self::LeakOnPath => Severity::Warning,
        }
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// May be a false positive of path-insensitivity.
    Warning,
    /// A definite violation of the linear discipline.
    Error,
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What went wrong.
    pub kind: DiagnosticKind,
    /// Severity derived from the kind.
    pub severity: Severity,
    /// Name of the enclosing function.
    pub function: String,
    /// Name of the linear variable involved.
    pub variable: String,
    /// Declaration site of the variable; together with the name this is the
    /// variable's identity.
    pub decl: FileSpan,
    /// The statement or terminator that triggered the finding.
    pub primary: FileSpan,
    /// Additional sites that explain the finding, e.g. the first release of
    /// a double release.
    pub contributing: Vec<FileSpan>,
}

impl Diagnostic {
    /// Creates a diagnostic with severity derived from the kind.
    #[must_use]
    pub fn new(
        kind: DiagnosticKind,
        function: impl Into<String>,
        variable: impl Into<String>,
        decl: FileSpan,
        primary: FileSpan,
    ) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            function: function.into(),
            variable: variable.into(),
            decl,
            primary,
            contributing: Vec::new(),
        }
    }

    /// Attaches a contributing site.
    #[must_use]
    pub fn with_contributing(mut self, site: FileSpan) -> Self {
        self.contributing.push(site);
        self
    }
}

/// Signals that a part of the input could not be fully analyzed.
///
/// These are kept apart from the diagnostic list so a caller can distinguish
/// "proven safe", "proven unsafe" and "could not fully analyze".
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Incomplete {
    /// The program model failed validation for a function; the function was
    /// skipped and its callers fell back to conservative summaries.
    #[error("malformed model in `{function}`: {detail}")]
    MalformedModel {
        /// Function whose model is malformed.
        function: String,
        /// Human-readable description of the defect.
        detail: String,
    },
    /// The intraprocedural fixpoint iteration cap was exceeded; every tracked
    /// variable in the function degraded to an unknown state.
    #[error("fixpoint iteration cap exceeded in `{function}`")]
    FixpointCap {
        /// Function that failed to converge.
        function: String,
    },
    /// The interprocedural summary fixpoint for a recursive group did not
    /// converge; the group kept its conservative seed summaries.
    #[error("summary fixpoint cap exceeded for recursive group {functions:?}")]
    SummaryCap {
        /// Members of the recursive group.
        functions: Vec<String>,
    },
    /// An event was observed on a variable before any initialization; the
    /// variable degraded to an unknown state at that point.
    #[error("event on uninitialized variable `{variable}` in `{function}`")]
    UndefinedUse {
        /// Enclosing function.
        function: String,
        /// The affected variable.
        variable: String,
        /// Site of the offending event.
        site: FileSpan,
    },
}

/// Identity under which diagnostics are deduplicated. The variable is
/// identified by declaration site and name; macro-expanded code can declare
/// distinct variables at one site, so the span alone is not enough.
type DedupKey = (DiagnosticKind, FileSpan, String, FileSpan);

/// Collects diagnostics, deduplicating by `(kind, variable identity, primary site)`.
///
/// The first report for a key wins; its contributing sites are kept.
/// [`DiagnosticSink::finish`] returns the list in a deterministic order so
/// re-analysis of the same input yields an identical list.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    seen: IndexSet<DedupKey>,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a diagnostic. Duplicates of an already-seen
    /// `(kind, variable identity, primary site)` are dropped.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        let key = (
            diagnostic.kind,
            diagnostic.decl,
            diagnostic.variable.clone(),
            diagnostic.primary,
        );
        if self.seen.insert(key) {
            self.diagnostics.push(diagnostic);
        }
    }

    /// Number of diagnostics collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Whether no diagnostics were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Finalizes the sink, returning diagnostics sorted by
    /// (function, primary site, kind, variable identity).
    #[must_use]
    pub fn finish(mut self) -> Vec<Diagnostic> {
        self.diagnostics.sort_by(|a, b| {
            (&a.function, a.primary, a.kind, a.decl, &a.variable)
                .cmp(&(&b.function, b.primary, b.kind, b.decl, &b.variable))
        });
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_span::{FileId, Span};

    fn site(start: u32) -> FileSpan {
        FileSpan::new(FileId(0), Span::new(start, start + 1))
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(DiagnosticKind::DoubleRelease.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::UseAfterRelease.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::LeakOnAllPaths.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::DanglingReturn.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::LeakOnPath.severity(), Severity::Warning);
    }

    #[test]
    fn dedup_by_kind_variable_and_primary() {
        let mut sink = DiagnosticSink::new();
        let d = Diagnostic::new(DiagnosticKind::DoubleRelease, "f", "p", site(0), site(10));
        sink.report(d.clone());
        sink.report(d.clone());
        // Same kind and variable but a different primary site is distinct.
        sink.report(Diagnostic::new(
            DiagnosticKind::DoubleRelease,
            "f",
            "p",
            site(0),
            site(20),
        ));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn variables_sharing_a_decl_site_stay_distinct() {
        let mut sink = DiagnosticSink::new();
        sink.report(Diagnostic::new(DiagnosticKind::LeakOnAllPaths, "f", "a", site(0), site(9)));
        sink.report(Diagnostic::new(DiagnosticKind::LeakOnAllPaths, "f", "b", site(0), site(9)));
        let out = sink.finish();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].variable, "a");
        assert_eq!(out[1].variable, "b");
    }

    #[test]
    fn first_report_keeps_contributing_sites() {
        let mut sink = DiagnosticSink::new();
        sink.report(
            Diagnostic::new(DiagnosticKind::UseAfterRelease, "f", "p", site(0), site(5))
                .with_contributing(site(3)),
        );
        sink.report(Diagnostic::new(
            DiagnosticKind::UseAfterRelease,
            "f",
            "p",
            site(0),
            site(5),
        ));
        let out = sink.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].contributing, vec![site(3)]);
    }

    #[test]
    fn finish_orders_deterministically() {
        let mut sink = DiagnosticSink::new();
        sink.report(Diagnostic::new(DiagnosticKind::LeakOnPath, "g", "q", site(0), site(9)));
        sink.report(Diagnostic::new(DiagnosticKind::DoubleRelease, "f", "p", site(0), site(7)));
        sink.report(Diagnostic::new(DiagnosticKind::UseAfterRelease, "f", "p", site(0), site(2)));
        let out = sink.finish();
        assert_eq!(out[0].primary, site(2));
        assert_eq!(out[1].primary, site(7));
        assert_eq!(out[2].function, "g");
    }
}
