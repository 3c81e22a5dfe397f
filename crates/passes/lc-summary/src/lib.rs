//! Bottom-up inference of per-function ownership summaries.
//!
//! The call graph is condensed into strongly connected components and walked
//! callee-first. Acyclic functions get their summary from a single analysis
//! run. Recursive groups start from optimistic seed summaries and iterate to
//! a fixpoint under a hard round cap; a group that fails to converge falls
//! back to conservative summaries for all of its members.

pub mod graph;

use lc_analysis::{AnalysisConfig, FnAnalysis, LinearChecker, ParamFacts, SummaryMap};
use lc_diagnostics::Incomplete;
use lc_model::{FnSummary, FuncId, Function, ParamEffect, Program, ReturnEffect};
use log::{debug, warn};
use rustc_hash::FxHashSet;

pub use graph::CallGraph;

/// Tuning knobs for the interprocedural fixpoint.
#[derive(Debug, Clone, Copy)]
pub struct SummaryConfig {
    /// A recursive group of `n` functions is re-analyzed for at most
    /// `n * round_cap_factor` rounds before it degrades to conservative
    /// summaries.
    pub round_cap_factor: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self { round_cap_factor: 3 }
    }
}

/// Result of the summary pass.
#[derive(Debug, Default)]
pub struct SummaryOutcome {
    /// Final summary per analyzable function. Functions in `excluded` have
    /// no entry and resolve to the conservative default at call sites.
    pub summaries: SummaryMap,
    /// Groups whose fixpoint did not converge.
    pub incomplete: Vec<Incomplete>,
}

/// Computes ownership summaries for every bodied function.
///
/// `excluded` names functions that failed model validation; they are not
/// analyzed, and calls to them resolve conservatively.
#[must_use]
pub fn summarize(
    program: &Program,
    excluded: &FxHashSet<FuncId>,
    analysis: AnalysisConfig,
    config: SummaryConfig,
) -> SummaryOutcome {
    let call_graph = CallGraph::build(program);
    let mut outcome = SummaryOutcome::default();

    for group in call_graph.bottom_up_groups() {
        let members: Vec<FuncId> = group
            .into_iter()
            .filter(|func| !excluded.contains(func))
            .collect();
        match members.as_slice() {
            [] => {}
            &[func] if !call_graph.is_self_recursive(func) => {
                let result = LinearChecker::run(program, func, &outcome.summaries, analysis);
                let summary = derive_summary(&program.functions[func], &result);
                outcome.summaries.insert(func, summary);
            }
            _ => solve_group(program, &members, analysis, config, &mut outcome),
        }
    }

    outcome
}

/// Iterates a recursive group to a summary fixpoint.
fn solve_group(
    program: &Program,
    members: &[FuncId],
    analysis: AnalysisConfig,
    config: SummaryConfig,
    outcome: &mut SummaryOutcome,
) {
    for &func in members {
        let function = &program.functions[func];
        outcome
            .summaries
            .insert(func, FnSummary::seed(function.params.len(), function.linear_return));
    }

    let rounds = members.len().saturating_mul(config.round_cap_factor).max(1);
    for round in 0..rounds {
        let mut changed = false;
        for &func in members {
            let result = LinearChecker::run(program, func, &outcome.summaries, analysis);
            let summary = derive_summary(&program.functions[func], &result);
            if outcome.summaries.get(func) != Some(&summary) {
                outcome.summaries.insert(func, summary);
                changed = true;
            }
        }
        if !changed {
            debug!("recursive group of {} converged after {} rounds", members.len(), round + 1);
            return;
        }
    }

    // No convergence: keep nothing optimistic.
    let mut functions: Vec<String> = members
        .iter()
        .map(|&func| program.functions[func].name.clone())
        .collect();
    functions.sort();
    warn!("summary fixpoint cap exceeded for recursive group {functions:?}");
    for &func in members {
        let function = &program.functions[func];
        outcome
            .summaries
            .insert(func, FnSummary::conservative(function.params.len()));
    }
    outcome.incomplete.push(Incomplete::SummaryCap { functions });
}

/// Derives the external summary of a function from its analysis result.
fn derive_summary(function: &Function, analysis: &FnAnalysis) -> FnSummary {
    let failed = analysis
        .incomplete
        .iter()
        .any(|signal| matches!(signal, Incomplete::FixpointCap { .. }));
    if failed {
        return FnSummary::conservative(function.params.len());
    }

    FnSummary {
        params: analysis.param_facts.iter().map(param_effect).collect(),
        returns: if function.linear_return {
            ReturnEffect::ProducesOwned
        } else {
            ReturnEffect::ProducesNone
        },
    }
}

fn param_effect(facts: &ParamFacts) -> ParamEffect {
    if !facts.linear || facts.borrowed {
        // Non-linear and borrowed parameters never move ownership; reads
        // still count as passthrough so uses after a caller-side release
        // are caught.
        return if facts.touched { ParamEffect::Passthrough } else { ParamEffect::NoEffect };
    }
    if facts.may_consume || facts.consumed_on_all_paths {
        ParamEffect::Consumes
    } else if facts.touched {
        ParamEffect::Passthrough
    } else {
        ParamEffect::NoEffect
    }
}
