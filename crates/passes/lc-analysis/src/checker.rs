//! The worklist fixpoint analyzer for one function.

use std::collections::VecDeque;

use la_arena::ArenaMap;
use lc_diagnostics::{Diagnostic, DiagnosticKind, Incomplete};
use lc_lattice::{Event, OwnershipState};
use lc_model::{
    Arg, BlockId, Callee, FnSummary, FuncId, Function, LocalId, LocalKind, Program, Statement,
    Terminator,
};
use lc_span::FileSpan;
use log::warn;
use rustc_hash::FxHashSet;

use crate::{AnalysisConfig, StateMap, SummaryMap, VarState};

/// Result of analyzing one function.
#[derive(Debug, Default)]
pub struct FnAnalysis {
    /// Findings, in block order. Deduplication happens in the sink.
    pub findings: Vec<Diagnostic>,
    /// Analysis-incomplete signals raised for this function.
    pub incomplete: Vec<Incomplete>,
    /// Observed per-parameter facts, parallel to the parameter list. The
    /// summarizer derives parameter effects from these.
    pub param_facts: Vec<ParamFacts>,
}

/// What the analysis observed about one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamFacts {
    /// The parameter is annotated linear.
    pub linear: bool,
    /// The parameter is declared borrowed (caller keeps ownership).
    pub borrowed: bool,
    /// Released or transferred on every path reaching a return.
    pub consumed_on_all_paths: bool,
    /// Released or transferred on at least one path.
    pub may_consume: bool,
    /// Any event touched the parameter.
    pub touched: bool,
}

impl ParamFacts {
    fn untouched(linear: bool, borrowed: bool) -> Self {
        Self {
            linear,
            borrowed,
            consumed_on_all_paths: false,
            may_consume: false,
            touched: false,
        }
    }

    /// Conservative facts used when the fixpoint did not converge: the
    /// parameter looks used but never consumed, i.e. passthrough.
    fn conservative(linear: bool, borrowed: bool) -> Self {
        Self {
            linear,
            borrowed,
            consumed_on_all_paths: false,
            may_consume: false,
            touched: true,
        }
    }
}

/// Mutable output of the reporting pass.
#[derive(Debug, Default)]
struct Pass {
    findings: Vec<Diagnostic>,
    incomplete: Vec<Incomplete>,
    touched: FxHashSet<LocalId>,
    /// Per-parameter accumulators across return sites.
    consumed_on_all: Vec<bool>,
    may_consume: Vec<bool>,
    returns_seen: usize,
}

/// Analyzes one function's CFG against the linear-ownership discipline.
pub struct LinearChecker<'a> {
    program: &'a Program,
    function: &'a Function,
    summaries: &'a SummaryMap,
    config: AnalysisConfig,
    /// Tracked (linear) locals, for membership tests.
    tracked: FxHashSet<LocalId>,
    /// Tracked locals in declaration order, for deterministic iteration.
    tracked_order: Vec<LocalId>,
}

impl<'a> LinearChecker<'a> {
    /// Runs the analysis for `func` using the given call summaries.
    #[must_use]
    pub fn run(
        program: &'a Program,
        func: FuncId,
        summaries: &'a SummaryMap,
        config: AnalysisConfig,
    ) -> FnAnalysis {
        let function = &program.functions[func];
        let tracked_order: Vec<LocalId> = function.linear_locals().collect();
        let tracked: FxHashSet<LocalId> = tracked_order.iter().copied().collect();
        let checker = Self {
            program,
            function,
            summaries,
            config,
            tracked,
            tracked_order,
        };
        checker.check()
    }

    fn check(&self) -> FnAnalysis {
        let Some(entries) = self.solve() else {
            warn!(
                "fixpoint cap exceeded in `{}`; reporting conservatively",
                self.function.name
            );
            let param_facts = self
                .function
                .params
                .iter()
                .map(|&param| {
                    let (linear, borrowed) = self.param_traits(param);
                    ParamFacts::conservative(linear, borrowed)
                })
                .collect();
            return FnAnalysis {
                findings: Vec::new(),
                incomplete: vec![Incomplete::FixpointCap {
                    function: self.function.name.clone(),
                }],
                param_facts,
            };
        };

        self.report(&entries)
    }

    /// Worklist dataflow: computes the fixpoint entry state of every
    /// reachable block, or `None` if the iteration cap was exceeded.
    fn solve(&self) -> Option<ArenaMap<BlockId, StateMap>> {
        let mut entries: ArenaMap<BlockId, StateMap> = ArenaMap::default();
        entries.insert(self.function.entry, self.entry_state());

        let mut worklist: VecDeque<BlockId> = VecDeque::new();
        let mut queued: FxHashSet<BlockId> = FxHashSet::default();
        worklist.push_back(self.function.entry);
        queued.insert(self.function.entry);

        // Scaled by the tracked-variable count: independent variables can
        // stabilize at staggered iterations, each one re-queueing blocks.
        let cap = self
            .function
            .blocks
            .len()
            .saturating_mul(self.tracked_order.len().max(1))
            .saturating_mul(self.config.fixpoint_cap_factor);
        let mut pops = 0_usize;

        while let Some(block) = worklist.pop_front() {
            queued.remove(&block);
            pops += 1;
            if pops > cap {
                return None;
            }

            let mut state = entries
                .get(block)
                .cloned()
                .unwrap_or_default();
            let mut scratch = Pass::default();
            for statement in &self.function.blocks[block].statements {
                self.apply_statement(statement, &mut state, &mut scratch);
            }

            for (successor, successor_state) in self.successor_states(block, &state) {
                let changed = match entries.get_mut(successor) {
                    Some(existing) => existing.join_with(&successor_state),
                    None => {
                        entries.insert(successor, successor_state);
                        true
                    }
                };
                if changed && queued.insert(successor) {
                    worklist.push_back(successor);
                }
            }
        }

        Some(entries)
    }

    /// Walks every reachable block once from its fixpoint entry state,
    /// emitting findings and collecting parameter facts.
    fn report(&self, entries: &ArenaMap<BlockId, StateMap>) -> FnAnalysis {
        let mut pass = Pass {
            consumed_on_all: vec![true; self.function.params.len()],
            may_consume: vec![false; self.function.params.len()],
            ..Pass::default()
        };

        for (block, data) in self.function.blocks.iter() {
            // Unreachable blocks have no entry state and are not analyzed.
            let Some(entry) = entries.get(block) else {
                continue;
            };
            let mut state = entry.clone();
            for statement in &data.statements {
                self.apply_statement(statement, &mut state, &mut pass);
            }
            self.apply_terminator(&data.terminator, &mut state, &mut pass);
        }

        let param_facts = self
            .function
            .params
            .iter()
            .enumerate()
            .map(|(index, &param)| {
                let (linear, borrowed) = self.param_traits(param);
                ParamFacts {
                    linear,
                    borrowed,
                    consumed_on_all_paths: pass.returns_seen > 0 && pass.consumed_on_all[index],
                    may_consume: pass.may_consume[index],
                    touched: pass.touched.contains(&param),
                }
            })
            .collect();

        FnAnalysis {
            findings: pass.findings,
            incomplete: pass.incomplete,
            param_facts,
        }
    }

    /// Entry state of the function: owned linear parameters (unless
    /// borrowed), everything else unseen.
    fn entry_state(&self) -> StateMap {
        let mut state = StateMap::new();
        for &param in &self.function.params {
            if !self.tracked.contains(&param) {
                continue;
            }
            let (_, borrowed) = self.param_traits(param);
            let initial = if borrowed {
                OwnershipState::Top
            } else {
                OwnershipState::Owned
            };
            state.set(param, VarState::of(initial));
        }
        state
    }

    fn param_traits(&self, param: LocalId) -> (bool, bool) {
        let decl = &self.function.locals[param];
        let borrowed = matches!(decl.kind, LocalKind::Param { borrowed: true, .. });
        (decl.linear, borrowed)
    }

    fn is_param(&self, var: LocalId) -> bool {
        matches!(self.function.locals[var].kind, LocalKind::Param { .. })
    }

    /// Successor blocks and the state flowing along each edge. Null tests
    /// refine the tested variable: the null arm sees it as `Null`, and a
    /// statically null variable never flows into the non-null arm.
    fn successor_states(&self, block: BlockId, exit: &StateMap) -> Vec<(BlockId, StateMap)> {
        match &self.function.blocks[block].terminator {
            Terminator::Goto { target } => vec![(*target, exit.clone())],
            Terminator::Branch { targets } => targets
                .iter()
                .map(|&target| (target, exit.clone()))
                .collect(),
            Terminator::NullTest { var, if_null, if_not_null } => {
                if !self.tracked.contains(var) {
                    return vec![(*if_null, exit.clone()), (*if_not_null, exit.clone())];
                }
                let tested = exit.get(*var);
                let mut successors = Vec::with_capacity(2);

                let mut null_state = exit.clone();
                if matches!(
                    tested.state,
                    OwnershipState::Owned | OwnershipState::Conflicted | OwnershipState::Null
                ) {
                    null_state.set(*var, VarState::of(OwnershipState::Null));
                }
                successors.push((*if_null, null_state));

                // A known-null variable cannot take the non-null edge.
                if tested.state != OwnershipState::Null {
                    successors.push((*if_not_null, exit.clone()));
                }
                successors
            }
            Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
        }
    }

    fn apply_statement(&self, statement: &Statement, state: &mut StateMap, pass: &mut Pass) {
        match statement {
            Statement::AssignFresh { dst, span } => {
                self.apply_event(*dst, Event::AssignFresh, *span, state, pass);
            }
            Statement::AssignNull { dst, span } => {
                self.apply_event(*dst, Event::AssignNull, *span, state, pass);
            }
            Statement::Use { var, span } => {
                self.apply_event(*var, Event::Access, *span, state, pass);
            }
            Statement::Release { var, span } => {
                self.apply_event(*var, Event::Release, *span, state, pass);
            }
            Statement::Move { dst, src, span } => {
                if self.tracked.contains(src) {
                    let event = if self.tracked.contains(dst) {
                        Event::ConsumeByCall
                    } else {
                        Event::Escape
                    };
                    self.apply_event(*src, event, *span, state, pass);
                }
                if self.tracked.contains(dst) {
                    if self.tracked.contains(src) {
                        self.apply_event(*dst, Event::AssignFresh, *span, state, pass);
                    } else {
                        self.assign_unknown(*dst, *span, state, pass);
                    }
                }
            }
            Statement::Call { callee, args, dst, span } => {
                let summary = self.callee_summary(callee, args.len());
                for (index, arg) in args.iter().enumerate() {
                    let Arg::Var(var) = arg else { continue };
                    match summary.param_effect(index) {
                        lc_model::ParamEffect::Consumes => {
                            self.apply_event(*var, Event::ConsumeByCall, *span, state, pass);
                        }
                        lc_model::ParamEffect::Passthrough => {
                            self.apply_event(*var, Event::Access, *span, state, pass);
                        }
                        lc_model::ParamEffect::NoEffect => {}
                    }
                }
                if let Some(dst) = dst {
                    if self.tracked.contains(dst) {
                        match summary.returns {
                            lc_model::ReturnEffect::ProducesOwned => {
                                self.apply_event(*dst, Event::AssignFresh, *span, state, pass);
                            }
                            lc_model::ReturnEffect::ProducesNone
                            | lc_model::ReturnEffect::ProducesUnknown => {
                                self.assign_unknown(*dst, *span, state, pass);
                            }
                        }
                    }
                }
            }
        }
    }

    fn apply_terminator(&self, terminator: &Terminator, state: &mut StateMap, pass: &mut Pass) {
        let Terminator::Return { value, span } = terminator else {
            return;
        };

        if let Some(value) = value {
            if self.tracked.contains(value) {
                let event = if self.function.linear_return {
                    Event::ReturnOwned
                } else {
                    Event::Access
                };
                self.apply_event(*value, event, *span, state, pass);
            }
        }

        // Scope-exit leak check. A parameter uniformly `Owned` at exit is
        // passthrough (ownership stays with the caller), but a parameter
        // consumed on one path and still owned on another is a leak on the
        // non-consuming path: its summary says `Consumes`, so no caller will
        // release it. `Conflicted` only counts when some merged-in path
        // still owns; two consumed facts merging is not a leak.
        for &var in &self.tracked_order {
            let at_exit = state.get(var);
            let kind = match at_exit.state {
                OwnershipState::Owned if !self.is_param(var) => {
                    Some(DiagnosticKind::LeakOnAllPaths)
                }
                OwnershipState::Conflicted if at_exit.maybe_owned => {
                    Some(DiagnosticKind::LeakOnPath)
                }
                _ => None,
            };
            if let Some(kind) = kind {
                pass.findings.push(Diagnostic::new(
                    kind,
                    &self.function.name,
                    self.function.local_name(var),
                    self.function.locals[var].span,
                    *span,
                ));
            }
        }

        pass.returns_seen += 1;
        for (index, &param) in self.function.params.iter().enumerate() {
            let (linear, borrowed) = self.param_traits(param);
            if !linear || borrowed {
                continue;
            }
            let at_exit = state.get(param).state;
            pass.consumed_on_all[index] &= at_exit.is_consumed();
            pass.may_consume[index] |=
                at_exit.is_consumed() || at_exit == OwnershipState::Conflicted;
        }
    }

    fn apply_event(
        &self,
        var: LocalId,
        event: Event,
        site: FileSpan,
        state: &mut StateMap,
        pass: &mut Pass,
    ) {
        if !self.tracked.contains(&var) {
            return;
        }
        pass.touched.insert(var);

        let previous = state.get(var);
        let transition = previous.state.transfer(event);

        let consumed_at = if transition.next.is_consumed() {
            previous.consumed_at.or(Some(site))
        } else if matches!(transition.next, OwnershipState::Owned | OwnershipState::Null) {
            None
        } else {
            previous.consumed_at
        };

        if let Some(kind) = transition.finding {
            let mut diagnostic = Diagnostic::new(
                kind,
                &self.function.name,
                self.function.local_name(var),
                self.function.locals[var].span,
                site,
            );
            if let Some(first) = previous.consumed_at {
                diagnostic = diagnostic.with_contributing(first);
            }
            pass.findings.push(diagnostic);
        }

        if transition.underdefined {
            pass.incomplete.push(Incomplete::UndefinedUse {
                function: self.function.name.clone(),
                variable: self.function.local_name(var),
                site,
            });
        }

        let maybe_owned = match transition.next {
            OwnershipState::Owned => true,
            OwnershipState::Conflicted => previous.maybe_owned,
            _ => false,
        };
        state.set(var, VarState { state: transition.next, consumed_at, maybe_owned });
    }

    /// Stores a value of unknown provenance into a tracked variable: any
    /// previously owned resource leaks on this path, and the variable can no
    /// longer be reasoned about.
    fn assign_unknown(&self, dst: LocalId, site: FileSpan, state: &mut StateMap, pass: &mut Pass) {
        self.apply_event(dst, Event::AssignFresh, site, state, pass);
        state.set(dst, VarState::of(OwnershipState::Top));
    }

    fn callee_summary(&self, callee: &Callee, arg_count: usize) -> FnSummary {
        match callee {
            Callee::Fn(id) => {
                let in_range = id.into_raw().into_u32() < self.program.functions.len() as u32;
                if in_range {
                    self.summaries
                        .get(*id)
                        .cloned()
                        .unwrap_or_else(|| FnSummary::conservative(arg_count))
                } else {
                    FnSummary::conservative(arg_count)
                }
            }
            Callee::Extern(name) => self
                .program
                .externals
                .lookup(name)
                .cloned()
                .unwrap_or_else(|| FnSummary::conservative(arg_count)),
            Callee::Unknown => FnSummary::conservative(arg_count),
        }
    }
}
