#![allow(unused_imports)]
#![allow(unused_variables)]
#![allow(unused_must_use)]

use pretty_assertions::assert_eq;
use taintflow_core::{
    analyze_program,
    builder::ProgramBuilder,
    types::Type,
    values::{BinOp, Expr, Place},
    AnalysisConfig, TaintError, Terminator,
};

#[test]
fn test_function_creation() {
    let mut builder = ProgramBuilder::new();
    let mut func = builder.function("empty");
    func.entry_block().return_void().unwrap();
    func.build().unwrap();

    let program = builder.finish();
    let empty = program.get_function("empty").unwrap();
    assert_eq!(empty.name(), "empty");
    assert_eq!(empty.param_count(), 0);
    assert_eq!(empty.body.blocks.len(), 1);
}

#[test]
fn test_params_and_locals() {
    let mut builder = ProgramBuilder::new();
    let mut func = builder.function("vars");
    let a = func.param("a", Type::int());
    let p = func.param("p", Type::pointer_to(Type::char()));
    let x = func.local("x", Type::long_long());
    func.returns(Type::int());
    func.entry_block().return_value(Expr::var(a)).unwrap();
    func.build().unwrap();

    let program = builder.finish();
    let vars = program.get_function("vars").unwrap();
    assert_eq!(vars.params(), &[a, p]);
    assert_eq!(vars.var_by_name("x"), Some(x));
    assert_eq!(vars.var_name(p), "p");
    assert_eq!(vars.var(p).unwrap().ty.to_string(), "*i8");
}

#[test]
fn test_blocks_and_terminators() {
    let mut builder = ProgramBuilder::new();
    let mut func = builder.function("branchy");
    let n = func.param("n", Type::int());
    func.returns(Type::int());

    let left = func.create_block_id();
    let right = func.create_block_id();

    func.entry_block()
        .branch(
            Expr::binary(BinOp::Lt, Expr::var(n), Expr::constant(0)),
            left,
            right,
        )
        .unwrap();
    func.switch_to_block(left)
        .unwrap()
        .return_value(Expr::constant(0))
        .unwrap();
    func.switch_to_block(right)
        .unwrap()
        .return_value(Expr::var(n))
        .unwrap();

    let entry = func.current_function().entry_block();
    func.build().unwrap();

    let program = builder.finish();
    let branchy = program.get_function("branchy").unwrap();
    let entry_block = branchy.body.get_block(entry).unwrap();
    assert!(matches!(
        entry_block.terminator,
        Terminator::Branch { then_block, else_block, .. } if then_block == left && else_block == right
    ));
}

#[test]
fn test_double_seal_is_rejected() {
    let mut builder = ProgramBuilder::new();
    let mut func = builder.function("twice");
    let mut entry = func.entry_block();
    entry.return_void().unwrap();
    let err = entry.return_void().unwrap_err();
    assert!(matches!(err, TaintError::BuilderError(_)));
}

#[test]
fn test_duplicate_function_is_rejected() {
    let mut builder = ProgramBuilder::new();
    let mut first = builder.function("dup");
    first.entry_block().return_void().unwrap();
    first.build().unwrap();

    let mut second = builder.function("dup");
    second.entry_block().return_void().unwrap();
    assert_eq!(
        second.build().unwrap_err(),
        TaintError::DuplicateFunction("dup".into())
    );
    assert_eq!(builder.program().functions.len(), 1);
}

#[test]
fn test_built_program_analyzes() {
    let mut builder = ProgramBuilder::new();
    let mut func = builder.function("copy");
    let a = func.param("a", Type::int());
    let buf = func.local("buf", Type::array_of(Type::int(), Some(2)));
    let out = func.local("out", Type::int());
    func.returns(Type::int());
    {
        let mut entry = func.entry_block();
        entry.store(Place::var(buf).index(Expr::constant(1)), Expr::var(a));
        entry.load(out, Place::var(buf).index(Expr::constant(1)));
        entry.return_value(Expr::var(out)).unwrap();
    }
    func.build().unwrap();

    let report = analyze_program(&builder.finish(), &AnalysisConfig::default()).unwrap();
    let copy = report.function("copy").unwrap();
    assert_eq!(
        copy.variable("out").unwrap().to_string(),
        "out: Direct taint from a"
    );
}
