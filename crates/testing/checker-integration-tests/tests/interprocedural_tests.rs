//! End-to-end properties of summary inference across function boundaries.

use lc_diagnostics::{DiagnosticKind, Incomplete};
use lc_driver::{check_program, CheckConfig, Verdict};
use lc_model::{
    Arg, Callee, FnSummary, FunctionBuilder, ParamEffect, Program, ReturnEffect, Statement,
    Terminator,
};
use lc_span::{FileId, FileSpan, Span};

fn span(at: u32) -> FileSpan {
    FileSpan::new(FileId(0), Span::new(at, at + 1))
}

fn check(program: &Program) -> lc_driver::Outcome {
    check_program(program, CheckConfig::default())
}

/// `fn consume(p) { release(p); }`
fn add_consumer(program: &mut Program) -> lc_model::FuncId {
    let mut builder = FunctionBuilder::new("consume", span(100));
    let p = builder.new_param("p", true, span(101));
    builder.add_statement(Statement::Release { var: p, span: span(102) });
    builder.set_terminator(Terminator::Return { value: None, span: span(103) });
    program.add_function(builder.finish())
}

/// `fn make() -> owned { p = alloc(); return p; }`
fn add_producer(program: &mut Program) -> lc_model::FuncId {
    let mut builder = FunctionBuilder::new("make", span(200));
    builder.set_linear_return(true);
    let p = builder.new_local("p", true, span(201));
    builder.add_statement(Statement::AssignFresh { dst: p, span: span(202) });
    builder.set_terminator(Terminator::Return { value: Some(p), span: span(203) });
    program.add_function(builder.finish())
}

#[test]
fn passing_to_an_inferred_consumer_transfers_ownership() {
    // caller: p = alloc(); consume(p);  -- no leak, no other finding
    let mut program = Program::new();
    let consume = add_consumer(&mut program);

    let mut builder = FunctionBuilder::new("caller", span(0));
    let p = builder.new_local("p", true, span(1));
    builder.add_statement(Statement::AssignFresh { dst: p, span: span(2) });
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(consume),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(3),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(4) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(outcome.verdict(), Verdict::Safe);
}

#[test]
fn use_after_consuming_call_points_at_the_call_site() {
    // caller: p = alloc(); consume(p); use(p);
    let mut program = Program::new();
    let consume = add_consumer(&mut program);

    let mut builder = FunctionBuilder::new("caller", span(0));
    let p = builder.new_local("p", true, span(1));
    builder.add_statement(Statement::AssignFresh { dst: p, span: span(2) });
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(consume),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(3),
    });
    builder.add_statement(Statement::Use { var: p, span: span(4) });
    builder.set_terminator(Terminator::Return { value: None, span: span(5) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert_eq!(outcome.diagnostics.len(), 1);
    let finding = &outcome.diagnostics[0];
    assert_eq!(finding.kind, DiagnosticKind::UseAfterRelease);
    assert_eq!(finding.function, "caller");
    assert_eq!(finding.primary, span(4));
    // The consuming call site explains the finding.
    assert_eq!(finding.contributing, vec![span(3)]);
}

#[test]
fn producer_result_must_still_be_released() {
    // caller: p = make(); return;  -- the fresh resource leaks
    let mut program = Program::new();
    let make = add_producer(&mut program);

    let mut builder = FunctionBuilder::new("caller", span(0));
    let p = builder.new_local("p", true, span(1));
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(make),
        args: Vec::new(),
        dst: Some(p),
        span: span(2),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(3) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::LeakOnAllPaths);
    assert_eq!(outcome.diagnostics[0].function, "caller");
}

#[test]
fn producer_then_consumer_round_trip_is_clean() {
    let mut program = Program::new();
    let consume = add_consumer(&mut program);
    let make = add_producer(&mut program);

    let mut builder = FunctionBuilder::new("caller", span(0));
    let p = builder.new_local("p", true, span(1));
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(make),
        args: Vec::new(),
        dst: Some(p),
        span: span(2),
    });
    builder.add_statement(Statement::Use { var: p, span: span(3) });
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(consume),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(4),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(5) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(outcome.verdict(), Verdict::Safe);
}

#[test]
fn annotated_externals_behave_like_bodied_functions() {
    // malloc produces an owned resource, free consumes its argument.
    let mut program = Program::new();
    program.externals.annotate("malloc", FnSummary {
        params: Vec::new(),
        returns: ReturnEffect::ProducesOwned,
    });
    program.externals.annotate("free", FnSummary {
        params: vec![ParamEffect::Consumes],
        returns: ReturnEffect::ProducesNone,
    });

    let mut builder = FunctionBuilder::new("f", span(0));
    let p = builder.new_local("p", true, span(1));
    builder.add_statement(Statement::Call {
        callee: Callee::Extern("malloc".into()),
        args: Vec::new(),
        dst: Some(p),
        span: span(2),
    });
    builder.add_statement(Statement::Call {
        callee: Callee::Extern("free".into()),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(3),
    });
    builder.add_statement(Statement::Call {
        callee: Callee::Extern("free".into()),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(4),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(5) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    // The second free hands over a value that is already gone; at the call
    // boundary that surfaces as a use of the consumed variable.
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::UseAfterRelease);
    assert_eq!(outcome.diagnostics[0].primary, span(4));
    assert_eq!(outcome.diagnostics[0].contributing, vec![span(3)]);
}

#[test]
fn unlisted_externals_are_conservative() {
    // An unknown callee neither consumes nor reallocates: passing a released
    // pointer to it is a use after release, and its bound result degrades
    // the destination instead of inventing ownership.
    let mut program = Program::new();

    let mut builder = FunctionBuilder::new("f", span(0));
    let p = builder.new_local("p", true, span(1));
    let q = builder.new_local("q", true, span(2));
    builder.add_statement(Statement::AssignFresh { dst: p, span: span(3) });
    builder.add_statement(Statement::Release { var: p, span: span(4) });
    builder.add_statement(Statement::Call {
        callee: Callee::Extern("mystery".into()),
        args: vec![Arg::Var(p)],
        dst: Some(q),
        span: span(5),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(6) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    // Exactly the use-after-release; `q` holds an unknown value and is
    // never reported as a leak.
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::UseAfterRelease);
    assert_eq!(outcome.diagnostics[0].primary, span(5));
}

#[test]
fn function_pointer_calls_neither_consume_nor_produce() {
    // An indirect call reads its arguments and yields an unknown result;
    // the caller remains responsible for its own resource.
    let mut program = Program::new();

    let mut builder = FunctionBuilder::new("f", span(0));
    let p = builder.new_local("p", true, span(1));
    builder.add_statement(Statement::AssignFresh { dst: p, span: span(2) });
    builder.add_statement(Statement::Call {
        callee: Callee::Unknown,
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(3),
    });
    builder.add_statement(Statement::Release { var: p, span: span(4) });
    builder.set_terminator(Terminator::Return { value: None, span: span(5) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(outcome.verdict(), Verdict::Safe);
}

#[test]
fn recursive_consumer_is_inferred() {
    // f(p) { if (...) release(p); else f(p); }
    let mut program = Program::new();
    let mut builder = FunctionBuilder::new("f", span(0));
    let p = builder.new_param("p", true, span(1));
    let base = builder.new_block();
    let recurse = builder.new_block();
    let done = builder.new_block();
    builder.set_terminator(Terminator::Branch { targets: [base, recurse].into_iter().collect() });
    builder.set_current_block(base);
    builder.add_statement(Statement::Release { var: p, span: span(2) });
    builder.set_terminator(Terminator::Goto { target: done });
    builder.set_current_block(done);
    builder.set_terminator(Terminator::Return { value: None, span: span(3) });
    let f = program.add_function(builder.finish());

    let function = &mut program.functions[f];
    function.blocks[recurse].statements.push(Statement::Call {
        callee: Callee::Fn(f),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(4),
    });
    function.blocks[recurse].terminator = Terminator::Goto { target: done };

    // A caller handing its resource to `f` is clean.
    let mut builder = FunctionBuilder::new("caller", span(10));
    let q = builder.new_local("q", true, span(11));
    builder.add_statement(Statement::AssignFresh { dst: q, span: span(12) });
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(f),
        args: vec![Arg::Var(q)],
        dst: None,
        span: span(13),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(14) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(outcome.verdict(), Verdict::Safe);
}

#[test]
fn malformed_functions_are_skipped_and_flagged() {
    let mut program = Program::new();
    let consume = add_consumer(&mut program);

    // A call with the wrong arity fails validation.
    let mut builder = FunctionBuilder::new("broken", span(0));
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(consume),
        args: vec![Arg::Other, Arg::Other],
        dst: None,
        span: span(1),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(2) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert!(outcome.diagnostics.is_empty());
    assert!(matches!(
        &outcome.incomplete[0],
        Incomplete::MalformedModel { function, .. } if function == "broken"
    ));
    assert_eq!(outcome.verdict(), Verdict::Incomplete);
}

#[test]
fn conditional_consumer_warns_where_the_leak_is() {
    // maybe(p) { if (...) release(p); }  -- consumes on one path only.
    // The caller hands p over in good faith; the missed release must be
    // reported inside `maybe`, not silently dropped on both sides.
    let mut program = Program::new();
    let mut builder = FunctionBuilder::new("maybe", span(0));
    let p = builder.new_param("p", true, span(1));
    let arm = builder.new_block();
    let done = builder.new_block();
    builder.set_terminator(Terminator::Branch { targets: [arm, done].into_iter().collect() });
    builder.set_current_block(arm);
    builder.add_statement(Statement::Release { var: p, span: span(2) });
    builder.set_terminator(Terminator::Goto { target: done });
    builder.set_current_block(done);
    builder.set_terminator(Terminator::Return { value: None, span: span(3) });
    let maybe = program.add_function(builder.finish());

    let mut builder = FunctionBuilder::new("caller", span(10));
    let x = builder.new_local("x", true, span(11));
    builder.add_statement(Statement::AssignFresh { dst: x, span: span(12) });
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(maybe),
        args: vec![Arg::Var(x)],
        dst: None,
        span: span(13),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(14) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert_eq!(outcome.diagnostics.len(), 1, "{:?}", outcome.diagnostics);
    let finding = &outcome.diagnostics[0];
    assert_eq!(finding.kind, DiagnosticKind::LeakOnPath);
    assert_eq!(finding.function, "maybe");
    assert_eq!(finding.variable, "p");
    assert_eq!(finding.primary, span(3));
    // Only a warning, so the overall verdict stays Safe.
    assert_eq!(outcome.verdict(), Verdict::Safe);
}

#[test]
fn mutually_recursive_consumers_are_inferred() {
    // even(p) { if (...) release(p); else odd(p); }
    // odd(p)  { even(p); }
    let mut program = Program::new();
    let mut builder = FunctionBuilder::new("even", span(0));
    let p = builder.new_param("p", true, span(1));
    let base = builder.new_block();
    let recurse = builder.new_block();
    let done = builder.new_block();
    builder.set_terminator(Terminator::Branch { targets: [base, recurse].into_iter().collect() });
    builder.set_current_block(base);
    builder.add_statement(Statement::Release { var: p, span: span(2) });
    builder.set_terminator(Terminator::Goto { target: done });
    builder.set_current_block(done);
    builder.set_terminator(Terminator::Return { value: None, span: span(3) });
    let even = program.add_function(builder.finish());

    let mut builder = FunctionBuilder::new("odd", span(10));
    let q = builder.new_param("q", true, span(11));
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(even),
        args: vec![Arg::Var(q)],
        dst: None,
        span: span(12),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(13) });
    let odd = program.add_function(builder.finish());

    // Close the cycle: even's second arm hands p to odd.
    let function = &mut program.functions[even];
    function.blocks[recurse].statements.push(Statement::Call {
        callee: Callee::Fn(odd),
        args: vec![Arg::Var(p)],
        dst: None,
        span: span(4),
    });
    function.blocks[recurse].terminator = Terminator::Goto { target: done };

    let mut builder = FunctionBuilder::new("caller", span(20));
    let x = builder.new_local("x", true, span(21));
    builder.add_statement(Statement::AssignFresh { dst: x, span: span(22) });
    builder.add_statement(Statement::Call {
        callee: Callee::Fn(even),
        args: vec![Arg::Var(x)],
        dst: None,
        span: span(23),
    });
    builder.set_terminator(Terminator::Return { value: None, span: span(24) });
    program.add_function(builder.finish());

    let outcome = check(&program);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert!(outcome.incomplete.is_empty(), "{:?}", outcome.incomplete);
    assert_eq!(outcome.verdict(), Verdict::Safe);
}
