//! Structural validation of the program model.
//!
//! Malformed input must neither crash the checker nor silently disappear:
//! the driver maps each [`ModelError`] to an analysis-incomplete signal and
//! skips the affected function, leaving its callers on conservative
//! summaries.

use thiserror::Error;

use crate::{Arg, Callee, FuncId, Function, Program, Statement, Terminator};

/// A structural defect in the program model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A statement or terminator references a local outside the function's
    /// declaration arena.
    #[error("`{function}` references undeclared local {local}")]
    UndeclaredLocal {
        /// Function containing the reference.
        function: String,
        /// Raw index of the bad local.
        local: u32,
    },
    /// A terminator targets a block outside the function's block arena.
    #[error("`{function}` jumps to unknown block {block}")]
    UnknownBlock {
        /// Function containing the jump.
        function: String,
        /// Raw index of the bad block.
        block: u32,
    },
    /// A call site names a function id outside the program arena.
    #[error("`{function}` calls unknown function {callee}")]
    UnknownFunction {
        /// Function containing the call.
        function: String,
        /// Raw index of the bad callee.
        callee: u32,
    },
    /// A call to a bodied function binds the wrong number of arguments.
    #[error("`{function}` calls `{callee}` with {given} arguments, expected {expected}")]
    ArgumentCount {
        /// Function containing the call.
        function: String,
        /// Name of the callee.
        callee: String,
        /// Arguments at the call site.
        given: usize,
        /// Parameters of the callee.
        expected: usize,
    },
}

impl Program {
    /// Validates every function, returning all defects found. An empty list
    /// means the model is structurally sound.
    #[must_use]
    pub fn validate(&self) -> Vec<(FuncId, ModelError)> {
        let mut errors = Vec::new();
        for (id, function) in self.functions.iter() {
            let mut found = validate_function(self, function);
            errors.extend(found.drain(..).map(|error| (id, error)));
        }
        errors
    }
}

fn check_local(function: &Function, raw: u32, errors: &mut Vec<ModelError>) {
    if raw >= function.locals.len() as u32 {
        errors.push(ModelError::UndeclaredLocal {
            function: function.name.clone(),
            local: raw,
        });
    }
}

fn check_block(function: &Function, raw: u32, errors: &mut Vec<ModelError>) {
    if raw >= function.blocks.len() as u32 {
        errors.push(ModelError::UnknownBlock {
            function: function.name.clone(),
            block: raw,
        });
    }
}

fn validate_function(program: &Program, function: &Function) -> Vec<ModelError> {
    let mut errors = Vec::new();

    for (_, block) in function.blocks.iter() {
        for statement in &block.statements {
            match statement {
                Statement::AssignFresh { dst, .. } | Statement::AssignNull { dst, .. } => {
                    check_local(function, dst.into_raw().into_u32(), &mut errors);
                }
                Statement::Use { var, .. } | Statement::Release { var, .. } => {
                    check_local(function, var.into_raw().into_u32(), &mut errors);
                }
                Statement::Move { dst, src, .. } => {
                    check_local(function, dst.into_raw().into_u32(), &mut errors);
                    check_local(function, src.into_raw().into_u32(), &mut errors);
                }
                Statement::Call { callee, args, dst, .. } => {
                    for arg in args {
                        if let Arg::Var(var) = arg {
                            check_local(function, var.into_raw().into_u32(), &mut errors);
                        }
                    }
                    if let Some(dst) = dst {
                        check_local(function, dst.into_raw().into_u32(), &mut errors);
                    }
                    if let Callee::Fn(callee_id) = callee {
                        let raw = callee_id.into_raw().into_u32();
                        if raw >= program.functions.len() as u32 {
                            errors.push(ModelError::UnknownFunction {
                                function: function.name.clone(),
                                callee: raw,
                            });
                        } else {
                            let callee_fn = &program.functions[*callee_id];
                            if args.len() != callee_fn.params.len() {
                                errors.push(ModelError::ArgumentCount {
                                    function: function.name.clone(),
                                    callee: callee_fn.name.clone(),
                                    given: args.len(),
                                    expected: callee_fn.params.len(),
                                });
                            }
                        }
                    }
                }
            }
        }

        match &block.terminator {
            Terminator::Goto { target } => {
                check_block(function, target.into_raw().into_u32(), &mut errors);
            }
            Terminator::Branch { targets } => {
                for target in targets {
                    check_block(function, target.into_raw().into_u32(), &mut errors);
                }
            }
            Terminator::NullTest { var, if_null, if_not_null } => {
                check_block(function, if_null.into_raw().into_u32(), &mut errors);
                check_block(function, if_not_null.into_raw().into_u32(), &mut errors);
                check_local(function, var.into_raw().into_u32(), &mut errors);
            }
            Terminator::Return { value, .. } => {
                if let Some(value) = value {
                    check_local(function, value.into_raw().into_u32(), &mut errors);
                }
            }
            Terminator::Unreachable => {}
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FunctionBuilder;
    use la_arena::{Idx, RawIdx};
    use lc_span::{FileId, FileSpan, Span};

    fn span(at: u32) -> FileSpan {
        FileSpan::new(FileId(0), Span::new(at, at + 1))
    }

    #[test]
    fn well_formed_program_validates() {
        let mut program = Program::new();
        let mut builder = FunctionBuilder::new("f", span(0));
        let ptr = builder.new_local("p", true, span(1));
        builder.add_statement(Statement::AssignFresh { dst: ptr, span: span(2) });
        builder.set_terminator(Terminator::Return { value: None, span: span(3) });
        program.add_function(builder.finish());
        assert!(program.validate().is_empty());
    }

    #[test]
    fn out_of_range_local_is_reported() {
        let mut program = Program::new();
        let mut builder = FunctionBuilder::new("f", span(0));
        let bogus: crate::LocalId = Idx::from_raw(RawIdx::from_u32(99));
        builder.add_statement(Statement::Use { var: bogus, span: span(1) });
        builder.set_terminator(Terminator::Return { value: None, span: span(2) });
        program.add_function(builder.finish());

        let errors = program.validate();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].1,
            ModelError::UndeclaredLocal { local: 99, .. }
        ));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let mut program = Program::new();

        let mut callee = FunctionBuilder::new("g", span(0));
        callee.new_param("p", true, span(1));
        callee.set_terminator(Terminator::Return { value: None, span: span(2) });
        let callee_id = program.add_function(callee.finish());

        let mut caller = FunctionBuilder::new("f", span(3));
        caller.add_statement(Statement::Call {
            callee: Callee::Fn(callee_id),
            args: Vec::new(),
            dst: None,
            span: span(4),
        });
        caller.set_terminator(Terminator::Return { value: None, span: span(5) });
        program.add_function(caller.finish());

        let errors = program.validate();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0].1,
            ModelError::ArgumentCount { given: 0, expected: 1, .. }
        ));
    }
}
