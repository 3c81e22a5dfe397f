//! Program model consumed by the linear-ownership checker.
//!
//! A [`Program`] is one control-flow graph per function, a call graph implied
//! by the call sites inside the blocks, and the linearity annotations carried
//! on local declarations. Construction of this model from source text is the
//! front end's business; the checker only reads it.
//!
//! Statements are ownership *events*, not general computation: the front end
//! has already classified each source statement into the handful of shapes
//! the checker cares about (fresh allocation, null assignment, access,
//! release, variable-to-variable move, call). Everything else in the source
//! is invisible here.

pub mod builder;
pub mod validate;

use la_arena::{Arena, Idx};
use lc_span::FileSpan;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use builder::FunctionBuilder;
pub use validate::ModelError;

/// Index of a function record in the program arena.
pub type FuncId = Idx<Function>;

/// Index of a local declaration within a function.
pub type LocalId = Idx<LocalDecl>;

/// Index of a basic block within a function.
pub type BlockId = Idx<BlockData>;

/// A whole translation unit, plus annotations for externals without a body.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Function records, arena-allocated so call edges are index pairs and
    /// never ownership cycles.
    pub functions: Arena<Function>,
    /// Effect annotations for functions with no available body.
    pub externals: ExternTable,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function and returns its id.
    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.functions.alloc(function)
    }

    /// Looks up a function by name. Linear scan; only used at the API
    /// boundary, never in the analysis hot path.
    #[must_use]
    pub fn function_named(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .find(|(_, function)| function.name == name)
            .map(|(id, _)| id)
    }
}

/// One function's control-flow graph.
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name, used for diagnostics and call-by-name resolution.
    pub name: String,
    /// Parameter locals in declaration order.
    pub params: Vec<LocalId>,
    /// All local declarations, parameters included.
    pub locals: Arena<LocalDecl>,
    /// Basic blocks.
    pub blocks: Arena<BlockData>,
    /// Entry block.
    pub entry: BlockId,
    /// Whether the return slot is annotated linear: the function promises to
    /// hand an owned resource to its caller.
    pub linear_return: bool,
    /// Span of the function definition.
    pub span: FileSpan,
}

impl Function {
    /// Linear locals (parameters included) in declaration order.
    pub fn linear_locals(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.locals
            .iter()
            .filter(|(_, decl)| decl.linear)
            .map(|(id, _)| id)
    }

    /// Name of a local for diagnostics, falling back to a synthetic name for
    /// compiler temporaries.
    #[must_use]
    pub fn local_name(&self, local: LocalId) -> String {
        let decl = &self.locals[local];
        if decl.name.is_empty() {
            format!("<temp {}>", local.into_raw().into_u32())
        } else {
            decl.name.clone()
        }
    }
}

/// A local declaration.
#[derive(Debug, Clone)]
pub struct LocalDecl {
    /// Source name; empty for temporaries.
    pub name: String,
    /// What kind of local this is.
    pub kind: LocalKind,
    /// Whether the declaration carries the linear annotation.
    pub linear: bool,
    /// Declaration site.
    pub span: FileSpan,
}

/// Kinds of locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// A function parameter.
    Param {
        /// Zero-based position in the parameter list.
        index: usize,
        /// Declared as borrowed: the caller keeps ownership, so the body may
        /// read the pointer but never consume it. Without this flag a linear
        /// parameter is owned by the callee.
        borrowed: bool,
    },
    /// An ordinary local variable.
    Local,
    /// A compiler-introduced temporary.
    Temp,
}

/// A basic block: an ordered list of ownership events plus a terminator.
#[derive(Debug, Clone)]
pub struct BlockData {
    /// Statement events in execution order.
    pub statements: Vec<Statement>,
    /// How control leaves the block. Defaults to [`Terminator::Unreachable`]
    /// until the builder sets it.
    pub terminator: Terminator,
}

impl Default for BlockData {
    fn default() -> Self {
        Self {
            statements: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }
}

/// A statement-level ownership event.
#[derive(Debug, Clone)]
pub enum Statement {
    /// `dst = alloc(...)`: a fresh allocation assigned to `dst`.
    AssignFresh {
        /// Destination variable.
        dst: LocalId,
        /// Source location.
        span: FileSpan,
    },
    /// `dst = NULL`: an explicit null assignment.
    AssignNull {
        /// Destination variable.
        dst: LocalId,
        /// Source location.
        span: FileSpan,
    },
    /// A dereference, field access or index of `var`.
    Use {
        /// Accessed variable.
        var: LocalId,
        /// Source location.
        span: FileSpan,
    },
    /// A call to the release primitive on `var`.
    Release {
        /// Released variable.
        var: LocalId,
        /// Source location.
        span: FileSpan,
    },
    /// `dst = src`: ownership moved from one variable to another.
    Move {
        /// New owner.
        dst: LocalId,
        /// Previous owner.
        src: LocalId,
        /// Source location.
        span: FileSpan,
    },
    /// A function call with optional result binding.
    Call {
        /// The callee, by id, by external name, or unknown.
        callee: Callee,
        /// Argument-to-parameter bindings in parameter order.
        args: Vec<Arg>,
        /// Variable receiving the return value, if any.
        dst: Option<LocalId>,
        /// Source location of the call.
        span: FileSpan,
    },
}

impl Statement {
    /// Source location of the statement.
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::AssignFresh { span, .. }
            | Self::AssignNull { span, .. }
            | Self::Use { span, .. }
            | Self::Release { span, .. }
            | Self::Move { span, .. }
            | Self::Call { span, .. } => *span,
        }
    }
}

/// Call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    /// A function with a body in this program.
    Fn(FuncId),
    /// A function known only by name; its effect comes from the
    /// [`ExternTable`], or the conservative default if unlisted.
    Extern(String),
    /// An indirect call through a function pointer. Modeled as the most
    /// conservative callee rather than resolved.
    Unknown,
}

/// One call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// A tracked (or trackable) variable.
    Var(LocalId),
    /// Anything else: constants, arithmetic, non-pointer values.
    Other,
}

/// Block terminator.
#[derive(Debug, Clone)]
pub enum Terminator {
    /// Unconditional jump.
    Goto {
        /// Target block.
        target: BlockId,
    },
    /// A conditional branch whose condition tells the checker nothing; all
    /// targets are possible.
    Branch {
        /// Possible successor blocks.
        targets: SmallVec<[BlockId; 2]>,
    },
    /// A branch on `var == NULL`. Along `if_null` the tested variable is
    /// known null; the `if_not_null` edge is infeasible when the variable is
    /// statically null. This is how the front end encodes the
    /// `if (p != NULL)` guard idiom.
    NullTest {
        /// Tested variable.
        var: LocalId,
        /// Successor when the variable is null.
        if_null: BlockId,
        /// Successor when the variable is non-null.
        if_not_null: BlockId,
    },
    /// Return from the function.
    Return {
        /// Returned variable, if the return value is a tracked variable.
        value: Option<LocalId>,
        /// Source location of the return.
        span: FileSpan,
    },
    /// Control never leaves this block.
    Unreachable,
}

impl Terminator {
    /// Successor block ids, in a deterministic order.
    #[must_use]
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::Goto { target } => SmallVec::from_slice(&[*target]),
            Self::Branch { targets } => targets.clone(),
            Self::NullTest {
                if_null,
                if_not_null,
                ..
            } => SmallVec::from_slice(&[*if_null, *if_not_null]),
            Self::Return { .. } | Self::Unreachable => SmallVec::new(),
        }
    }
}

/// Effect of a function on one linear parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamEffect {
    /// The parameter's resource is not touched.
    NoEffect,
    /// The parameter is read but ownership stays with the caller.
    Passthrough,
    /// The function takes ownership; the caller may no longer use the
    /// argument.
    Consumes,
}

/// Effect of a function on its return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnEffect {
    /// The caller receives a fresh owned resource.
    ProducesOwned,
    /// The return value carries no ownership.
    ProducesNone,
    /// Nothing is known; a bound result degrades to an unknown state.
    ProducesUnknown,
}

/// Per-function ownership effect, used both for inferred summaries of bodied
/// functions and for external annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnSummary {
    /// Effect per parameter, in parameter order.
    pub params: Vec<ParamEffect>,
    /// Effect on the return value.
    pub returns: ReturnEffect,
}

impl FnSummary {
    /// The conservative summary used for unknown callees: every parameter
    /// passes through, the result is unknown. Never produces a false "safe"
    /// verdict on the caller side.
    #[must_use]
    pub fn conservative(param_count: usize) -> Self {
        Self {
            params: vec![ParamEffect::Passthrough; param_count],
            returns: ReturnEffect::ProducesUnknown,
        }
    }

    /// The optimistic seed used inside a recursive group before its fixpoint
    /// is reached.
    #[must_use]
    pub fn seed(param_count: usize, linear_return: bool) -> Self {
        Self {
            params: vec![ParamEffect::Passthrough; param_count],
            returns: if linear_return {
                ReturnEffect::ProducesOwned
            } else {
                ReturnEffect::ProducesNone
            },
        }
    }

    /// Effect for the argument at `index`, falling back to passthrough for
    /// out-of-range positions (variadic or malformed calls).
    #[must_use]
    pub fn param_effect(&self, index: usize) -> ParamEffect {
        self.params.get(index).copied().unwrap_or(ParamEffect::Passthrough)
    }
}

/// Annotations for functions with no body in the translation unit, e.g. a
/// known allocator or releaser from a system header.
#[derive(Debug, Clone, Default)]
pub struct ExternTable {
    entries: FxHashMap<String, FnSummary>,
}

impl ExternTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or overrides) an annotation for `name`.
    pub fn annotate(&mut self, name: impl Into<String>, summary: FnSummary) {
        self.entries.insert(name.into(), summary);
    }

    /// Looks up an annotation.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&FnSummary> {
        self.entries.get(name)
    }
}
