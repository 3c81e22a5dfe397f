//! End-to-end checker pipeline.
//!
//! [`check_program`] takes a fully built program model through validation,
//! bottom-up summary inference and the final per-function analysis, and
//! returns every finding plus every analysis-incomplete signal. Nothing in
//! the pipeline prints; [`report`] renders an [`Outcome`] to any writer for
//! callers that want text.

use std::io::Write;

use anyhow::Context;
use lc_analysis::{AnalysisConfig, LinearChecker};
use lc_diagnostics::{Diagnostic, DiagnosticSink, Incomplete, Severity};
use lc_model::Program;
use lc_summary::{summarize, SummaryConfig};
use log::debug;
use rustc_hash::FxHashSet;

/// Knobs for both fixpoint layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckConfig {
    /// Intraprocedural worklist cap.
    pub analysis: AnalysisConfig,
    /// Interprocedural round cap.
    pub summary: SummaryConfig,
}

/// Everything one run of the checker produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Findings, deduplicated and deterministically ordered.
    pub diagnostics: Vec<Diagnostic>,
    /// Signals that parts of the input could not be fully analyzed.
    pub incomplete: Vec<Incomplete>,
}

impl Outcome {
    /// Collapses the outcome into a three-way verdict.
    ///
    /// Warnings do not make a program unsafe; they survive in
    /// [`Outcome::diagnostics`] for callers that want to surface them.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
        {
            Verdict::Unsafe
        } else if !self.incomplete.is_empty() {
            Verdict::Incomplete
        } else {
            Verdict::Safe
        }
    }
}

/// Three-way answer of a checker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No errors and nothing left unanalyzed.
    Safe,
    /// At least one definite violation of the linear discipline.
    Unsafe,
    /// No definite violation, but parts of the input were skipped or
    /// degraded, so absence of findings proves nothing there.
    Incomplete,
}

/// Runs the full pipeline over `program`.
#[must_use]
pub fn check_program(program: &Program, config: CheckConfig) -> Outcome {
    let mut incomplete = Vec::new();

    // Functions with a malformed model are skipped entirely; their callers
    // fall back to conservative summaries through the missing map entry.
    let mut excluded: FxHashSet<_> = FxHashSet::default();
    for (func, error) in program.validate() {
        let function = &program.functions[func];
        incomplete.push(Incomplete::MalformedModel {
            function: function.name.clone(),
            detail: error.to_string(),
        });
        excluded.insert(func);
    }

    let summaries = summarize(program, &excluded, config.analysis, config.summary);
    incomplete.extend(summaries.incomplete);

    let mut sink = DiagnosticSink::new();
    for (func, function) in program.functions.iter() {
        if excluded.contains(&func) {
            continue;
        }
        debug!("checking `{}`", function.name);
        let analysis = LinearChecker::run(program, func, &summaries.summaries, config.analysis);
        for finding in analysis.findings {
            sink.report(finding);
        }
        incomplete.extend(analysis.incomplete);
    }

    Outcome {
        diagnostics: sink.finish(),
        incomplete,
    }
}

/// Renders an outcome as one line per finding and per incomplete signal.
pub fn report(outcome: &Outcome, writer: &mut impl Write) -> anyhow::Result<Verdict> {
    for diagnostic in &outcome.diagnostics {
        let severity = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            writer,
            "{severity}[{:?}]: `{}` in `{}` at {}..{}",
            diagnostic.kind,
            diagnostic.variable,
            diagnostic.function,
            diagnostic.primary.span.start,
            diagnostic.primary.span.end,
        )
        .context("failed to write diagnostic")?;
        for site in &diagnostic.contributing {
            write!(writer, " (see {}..{})", site.span.start, site.span.end)
                .context("failed to write diagnostic")?;
        }
        writeln!(writer).context("failed to write diagnostic")?;
    }
    for signal in &outcome.incomplete {
        writeln!(writer, "note: {signal}").context("failed to write note")?;
    }
    Ok(outcome.verdict())
}
