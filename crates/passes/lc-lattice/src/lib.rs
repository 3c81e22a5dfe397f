//! The abstract ownership lattice and its transfer function.
//!
//! Every tracked pointer carries one [`OwnershipState`] per program point.
//! The [`join`] operation merges states at control-flow confluences; the
//! [`transfer`] function maps a state and a statement-level [`Event`] to the
//! next state plus at most one finding.
//!
//! Policy notes (see DESIGN.md for the reasoning):
//! - `Null` is benign for every event: releasing, dereferencing, consuming
//!   or returning a known-null pointer never produces a finding.
//! - `Conflicted` on a release, consume or access always reports; a possible
//!   violation is never silently accepted.
//! - An event on an `Unseen` variable is interpreted as a gap in the model,
//!   not a finding: the state degrades to `Top` and the transition is marked
//!   underdefined so the analyzer can raise an analysis-incomplete signal.
//!
//! [`join`]: OwnershipState::join
//! [`transfer`]: OwnershipState::transfer

use lc_diagnostics::DiagnosticKind;
use serde::{Deserialize, Serialize};

/// Height of the ownership lattice: `Unseen` < definite facts < `Conflicted`
/// < `Top`, with an extra level to spare for the four mutually incomparable
/// definite facts. Bounds every fixpoint iteration in the checker.
pub const LATTICE_HEIGHT: usize = 5;

/// Abstract ownership state of one tracked pointer at one program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OwnershipState {
    /// Bottom: no information yet (pre-declaration).
    #[default]
    Unseen,
    /// Holds an un-consumed resource on every path reaching this point.
    Owned,
    /// Known to hold no resource (explicit null assignment).
    Null,
    /// The resource was released on every path reaching this point.
    Released,
    /// Ownership was handed away on every path reaching this point. Like
    /// `Released` for the origin variable, but not a leak.
    Transferred,
    /// Different incoming paths disagree: a may-fact.
    Conflicted,
    /// Top: no guarantee can be made (e.g. escaped via a non-linear alias).
    Top,
}

impl OwnershipState {
    /// Whether this is one of the four mutually incomparable definite facts.
    #[must_use]
    pub fn is_definite(self) -> bool {
        matches!(self, Self::Owned | Self::Null | Self::Released | Self::Transferred)
    }

    /// Whether the resource is consumed (released or transferred) on every
    /// path reaching this point.
    #[must_use]
    pub fn is_consumed(self) -> bool {
        matches!(self, Self::Released | Self::Transferred)
    }

    /// Least upper bound of two states.
    ///
    /// Commutative, associative and idempotent; `Unseen` is the identity and
    /// `Top` absorbs everything. Any two distinct definite facts merge to
    /// `Conflicted`.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unseen, state) | (state, Self::Unseen) => state,
            (Self::Top, _) | (_, Self::Top) => Self::Top,
            (a, b) if a == b => a,
            // Conflicted already records disagreement; a further definite
            // fact cannot reconcile it.
            (Self::Conflicted, _) | (_, Self::Conflicted) => Self::Conflicted,
            // Two distinct definite facts.
            _ => Self::Conflicted,
        }
    }

    /// Applies one statement-level event, producing the next state, at most
    /// one finding, and whether the transition hit an underdefined input.
    #[must_use]
    pub fn transfer(self, event: Event) -> Transition {
        match event {
            Event::Release => self.on_release(),
            Event::Access => self.on_access(),
            Event::AssignFresh => self.on_assign_fresh(),
            Event::AssignNull => self.on_assign_null(),
            Event::ConsumeByCall => self.on_consume(),
            Event::Escape => self.on_escape(),
            Event::ReturnOwned => self.on_return_owned(),
        }
    }

    fn on_release(self) -> Transition {
        match self {
            Self::Owned => Transition::to(Self::Released),
            Self::Null => Transition::to(Self::Null),
            Self::Released | Self::Transferred => {
                Transition::finding(Self::Released, DiagnosticKind::DoubleRelease)
            }
            // Conservative: a possible double release is reported.
            Self::Conflicted => Transition::finding(Self::Released, DiagnosticKind::DoubleRelease),
            Self::Top => Transition::to(Self::Top),
            Self::Unseen => Transition::underdefined(),
        }
    }

    fn on_access(self) -> Transition {
        match self {
            Self::Owned => Transition::to(Self::Owned),
            Self::Null => Transition::to(Self::Null),
            Self::Released | Self::Transferred | Self::Conflicted => {
                Transition::finding(self, DiagnosticKind::UseAfterRelease)
            }
            Self::Top => Transition::to(Self::Top),
            Self::Unseen => Transition::underdefined(),
        }
    }

    fn on_assign_fresh(self) -> Transition {
        match self {
            // Overwriting a live resource loses it on this path.
            Self::Owned => Transition::finding(Self::Owned, DiagnosticKind::LeakOnPath),
            // Partial ownership under Conflicted is treated as already
            // accounted for by the merge that produced it.
            _ => Transition::to(Self::Owned),
        }
    }

    fn on_assign_null(self) -> Transition {
        match self {
            Self::Owned => Transition::finding(Self::Null, DiagnosticKind::LeakOnPath),
            _ => Transition::to(Self::Null),
        }
    }

    fn on_consume(self) -> Transition {
        match self {
            Self::Owned => Transition::to(Self::Transferred),
            Self::Null => Transition::to(Self::Null),
            Self::Released | Self::Transferred => {
                Transition::finding(self, DiagnosticKind::UseAfterRelease)
            }
            Self::Conflicted => {
                Transition::finding(Self::Transferred, DiagnosticKind::UseAfterRelease)
            }
            Self::Top => Transition::to(Self::Top),
            Self::Unseen => Transition::underdefined(),
        }
    }

    fn on_escape(self) -> Transition {
        match self {
            // The pointer now lives in an untracked alias; no further
            // guarantee can be made.
            Self::Owned => Transition::to(Self::Top),
            Self::Null => Transition::to(Self::Null),
            Self::Released | Self::Transferred | Self::Conflicted => {
                Transition::finding(self, DiagnosticKind::UseAfterRelease)
            }
            Self::Top => Transition::to(Self::Top),
            Self::Unseen => Transition::underdefined(),
        }
    }

    fn on_return_owned(self) -> Transition {
        match self {
            Self::Owned => Transition::to(Self::Transferred),
            Self::Null => Transition::to(Self::Null),
            Self::Released | Self::Transferred | Self::Conflicted => {
                Transition::finding(self, DiagnosticKind::DanglingReturn)
            }
            Self::Top => Transition::to(Self::Top),
            Self::Unseen => Transition::underdefined(),
        }
    }
}

/// A statement-level event applied to one tracked variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The release primitive was called on the variable.
    Release,
    /// Dereference, field access, index, or a read-only pass to a callee.
    Access,
    /// A fresh allocation was assigned to the variable.
    AssignFresh,
    /// A null literal was assigned to the variable.
    AssignNull,
    /// The variable was passed to a callee whose summary consumes that
    /// parameter, or moved into another linear variable.
    ConsumeByCall,
    /// The variable's value was stored into a non-linear alias.
    Escape,
    /// The variable was returned from a function that promises an owned
    /// result.
    ReturnOwned,
}

/// Result of one transfer-function application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The outgoing state.
    pub next: OwnershipState,
    /// A finding to report at the event's site, if any.
    pub finding: Option<DiagnosticKind>,
    /// The event hit an `Unseen` variable; the model is underdefined here
    /// and the state degraded to `Top`.
    pub underdefined: bool,
}

impl Transition {
    fn to(next: OwnershipState) -> Self {
        Self { next, finding: None, underdefined: false }
    }

    fn finding(next: OwnershipState, kind: DiagnosticKind) -> Self {
        Self { next, finding: Some(kind), underdefined: false }
    }

    fn underdefined() -> Self {
        Self { next: OwnershipState::Top, finding: None, underdefined: true }
    }
}
