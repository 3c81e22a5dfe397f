//! Per-block abstract state vectors.

use lc_lattice::OwnershipState;
use lc_model::LocalId;
use lc_span::FileSpan;
use rustc_hash::FxHashMap;

/// Abstract state of one tracked variable, plus the site where its resource
/// was first consumed (kept for diagnostic attribution, e.g. the call site a
/// use-after-release points back to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarState {
    /// Lattice value.
    pub state: OwnershipState,
    /// Earliest known consumption site on paths reaching this point.
    pub consumed_at: Option<FileSpan>,
    /// Whether some path reaching this point still owns the resource. Only
    /// meaningful for `Conflicted`: it distinguishes an owned-versus-consumed
    /// merge (a possible leak) from a merge of two consumed facts (not one).
    pub maybe_owned: bool,
}

impl VarState {
    /// A state with no consumption site and the owned-bit derived from the
    /// lattice value.
    #[must_use]
    pub fn of(state: OwnershipState) -> Self {
        Self {
            state,
            consumed_at: None,
            maybe_owned: state == OwnershipState::Owned,
        }
    }

    /// Joins two variable states. The consumption site keeps the earliest
    /// known site so attribution stays deterministic across merges; the
    /// owned-bit survives a merge into `Conflicted` from either side.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        let state = self.state.join(other.state);
        let maybe_owned = match state {
            OwnershipState::Owned => true,
            OwnershipState::Conflicted => self.maybe_owned || other.maybe_owned,
            _ => false,
        };
        Self {
            state,
            consumed_at: merge_sites(self.consumed_at, other.consumed_at),
            maybe_owned,
        }
    }
}

fn merge_sites(a: Option<FileSpan>, b: Option<FileSpan>) -> Option<FileSpan> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (site, None) | (None, site) => site,
    }
}

/// Map from tracked variable to its abstract state. Absent variables are
/// `Unseen`, the lattice bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateMap {
    vars: FxHashMap<LocalId, VarState>,
}

impl StateMap {
    /// Creates an empty (all-`Unseen`) state vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `var`, defaulting to `Unseen`.
    #[must_use]
    pub fn get(&self, var: LocalId) -> VarState {
        self.vars.get(&var).copied().unwrap_or_default()
    }

    /// Overwrites the state of `var`.
    pub fn set(&mut self, var: LocalId, state: VarState) {
        self.vars.insert(var, state);
    }

    /// Joins `other` into `self`, returning whether anything changed.
    ///
    /// Variables present only in `self` join with `Unseen` and therefore
    /// never change.
    pub fn join_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (&var, &theirs) in &other.vars {
            let mine = self.get(var);
            let joined = mine.join(theirs);
            if joined != mine {
                self.vars.insert(var, joined);
                changed = true;
            }
        }
        changed
    }
}
