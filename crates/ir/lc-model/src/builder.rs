//! Incremental construction of function CFGs.
//!
//! Front ends and tests assemble functions through [`FunctionBuilder`] rather
//! than touching the arenas directly.

use la_arena::Arena;
use lc_span::FileSpan;

use crate::{BlockData, BlockId, Function, LocalDecl, LocalId, LocalKind, Statement, Terminator};

/// Builder for a single [`Function`].
pub struct FunctionBuilder {
    function: Function,
    current: BlockId,
}

impl FunctionBuilder {
    /// Starts a function with an empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>, span: FileSpan) -> Self {
        let mut blocks = Arena::new();
        let entry = blocks.alloc(BlockData::default());
        Self {
            function: Function {
                name: name.into(),
                params: Vec::new(),
                locals: Arena::new(),
                blocks,
                entry,
                linear_return: false,
                span,
            },
            current: entry,
        }
    }

    /// Marks the return slot as linear: the function promises an owned
    /// result to its caller.
    pub fn set_linear_return(&mut self, linear: bool) {
        self.function.linear_return = linear;
    }

    /// Declares the next parameter.
    pub fn new_param(&mut self, name: impl Into<String>, linear: bool, span: FileSpan) -> LocalId {
        self.new_param_with(name, linear, false, span)
    }

    /// Declares the next parameter, optionally borrowed (caller keeps
    /// ownership).
    pub fn new_param_with(
        &mut self,
        name: impl Into<String>,
        linear: bool,
        borrowed: bool,
        span: FileSpan,
    ) -> LocalId {
        let index = self.function.params.len();
        let id = self.function.locals.alloc(LocalDecl {
            name: name.into(),
            kind: LocalKind::Param { index, borrowed },
            linear,
            span,
        });
        self.function.params.push(id);
        id
    }

    /// Declares a local variable.
    pub fn new_local(&mut self, name: impl Into<String>, linear: bool, span: FileSpan) -> LocalId {
        self.function.locals.alloc(LocalDecl {
            name: name.into(),
            kind: LocalKind::Local,
            linear,
            span,
        })
    }

    /// Declares a compiler temporary.
    pub fn new_temp(&mut self, span: FileSpan) -> LocalId {
        self.function.locals.alloc(LocalDecl {
            name: String::new(),
            kind: LocalKind::Temp,
            linear: false,
            span,
        })
    }

    /// Creates a new, empty basic block and returns its id. Does not change
    /// the current block.
    pub fn new_block(&mut self) -> BlockId {
        self.function.blocks.alloc(BlockData::default())
    }

    /// Switches statement emission to `block`.
    pub fn set_current_block(&mut self, block: BlockId) {
        self.current = block;
    }

    /// The block statements are currently emitted into.
    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Appends a statement to the current block.
    pub fn add_statement(&mut self, statement: Statement) {
        self.function.blocks[self.current].statements.push(statement);
    }

    /// Sets the terminator of the current block.
    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.function.blocks[self.current].terminator = terminator;
    }

    /// Finishes building and returns the function.
    #[must_use]
    pub fn finish(self) -> Function {
        self.function
    }
}
