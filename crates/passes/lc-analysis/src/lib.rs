//! Intraprocedural linear-ownership analysis.
//!
//! One function at a time: a worklist dataflow over the function's CFG
//! computes an entry state per basic block, then a reporting pass walks each
//! reachable block once from its fixpoint entry state and emits findings.
//! Call sites are interpreted through summaries supplied by the caller (the
//! interprocedural summarizer), never by descending into callee bodies.

pub mod checker;
pub mod state;

use la_arena::ArenaMap;
use lc_model::{FnSummary, FuncId};

pub use checker::{FnAnalysis, LinearChecker, ParamFacts};
pub use state::{StateMap, VarState};

/// Tuning knobs for the intraprocedural fixpoint.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    /// The worklist may pop at most
    /// `blocks * tracked variables * fixpoint_cap_factor` times before the
    /// function is declared non-convergent and degraded to an all-`Top`
    /// result.
    pub fixpoint_cap_factor: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            // Lattice height plus one straight-line pass; enough for any
            // well-formed graph, a hard stop for malformed ones.
            fixpoint_cap_factor: lc_lattice::LATTICE_HEIGHT + 1,
        }
    }
}

/// Current summaries for bodied functions, keyed by function id.
///
/// Written by the summarizer as the bottom-up schedule resolves; read-only
/// from the analyzer's point of view. A missing entry means the callee has
/// not been summarized (or failed validation) and falls back to the
/// conservative default.
#[derive(Debug, Default)]
pub struct SummaryMap {
    map: ArenaMap<FuncId, FnSummary>,
}

impl SummaryMap {
    /// Creates an empty summary map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the summary for `func`, replacing any previous one.
    pub fn insert(&mut self, func: FuncId, summary: FnSummary) {
        self.map.insert(func, summary);
    }

    /// Looks up a summary.
    #[must_use]
    pub fn get(&self, func: FuncId) -> Option<&FnSummary> {
        self.map.get(func)
    }
}
