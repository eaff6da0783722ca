use super::programs::{analyze, bin, linked_list};
use crate::analysis::{SourceId, TaintKind, Tier};
use crate::builder::ProgramBuilder;
use crate::types::Type;
use crate::values::{BinOp, Expr, Place};
use pretty_assertions::assert_eq;

#[test]
fn test_linked_list_walk() {
    let mut builder = ProgramBuilder::new();
    linked_list(&mut builder);
    let report = analyze(&builder.finish());
    let function = report.function("linked_list").unwrap();

    // The walk's trip count depends on both inputs, so the sum is widened.
    let sum = function.variable("sum").unwrap();
    assert_eq!(sum.tier, Tier::Full);
    assert!(sum.has("a", TaintKind::DIRECT));
    assert!(sum.has("a", TaintKind::FULL));
    assert_eq!(sum.kinds_from("b"), TaintKind::INDIRECT | TaintKind::FULL);

    // The cursor only ever holds addresses.
    let p = function.variable("p").unwrap();
    assert!(!p.has("a", TaintKind::DIRECT));
    assert!(!p.has("b", TaintKind::DIRECT));
    assert!(p.has("b", TaintKind::FULL));

    let ret = function.return_value.as_ref().unwrap();
    assert!(ret.has("a", TaintKind::DIRECT));
    assert_eq!(ret.kinds_from("b"), TaintKind::INDIRECT | TaintKind::FULL);
}

#[test]
fn test_out_parameter_reaches_caller() {
    let mut builder = ProgramBuilder::new();
    {
        let mut set = builder.function("set");
        let out = set.param("out", Type::pointer_to(Type::int()));
        let v = set.param("v", Type::int());
        let mut entry = set.entry_block();
        entry.store(Place::var(out).deref(), Expr::var(v));
        entry.return_void().unwrap();
        set.build().unwrap();
    }
    {
        let mut main = builder.function("main");
        let a = main.param("a", Type::int());
        let x = main.local("x", Type::int());
        main.returns(Type::int());
        let mut entry = main.entry_block();
        entry.assign(x, Expr::constant(0));
        entry.call(
            None,
            "set",
            vec![Expr::addr_of(Place::var(x)), Expr::var(a)],
        );
        entry.return_value(Expr::var(x)).unwrap();
        main.build().unwrap();
    }
    let report = analyze(&builder.finish());

    let set = report.function("set").unwrap();
    assert!(set.return_value.is_none());
    let written = set.summary.out_param(0).unwrap();
    assert!(written.has(SourceId(1), TaintKind::DIRECT));
    assert!(!written.has(SourceId(0), TaintKind::DIRECT));

    let main = report.function("main").unwrap();
    let x = main.variable("x").unwrap();
    assert!(x.has("a", TaintKind::DIRECT));
    assert!(!x.has("a", TaintKind::FULL));
    assert!(main.return_value.as_ref().unwrap().has("a", TaintKind::DIRECT));
}

#[test]
fn test_pointer_parameter_reads_caller_memory() {
    let mut builder = ProgramBuilder::new();
    let mut first = builder.function("first");
    let a = first.param("a", Type::pointer_to(Type::int()));
    let t = first.local("t", Type::int());
    first.returns(Type::int());
    let mut entry = first.entry_block();
    entry.load(t, Place::var(a).index(Expr::constant(0)));
    entry.return_value(Expr::var(t)).unwrap();
    first.build().unwrap();

    let report = analyze(&builder.finish());
    let t = report.function("first").unwrap().variable("t").unwrap();
    assert!(t.has("a", TaintKind::DIRECT));
    assert!(t.has("a", TaintKind::INDIRECT));
}

#[test]
fn test_unresolved_stores_taint_every_read() {
    let mut builder = ProgramBuilder::new();
    {
        let mut f = builder.function("out_of_bounds");
        let a = f.param("a", Type::int());
        let arr = f.local("arr", Type::array_of(Type::int(), Some(4)));
        let t = f.local("t", Type::int());
        f.returns(Type::int());
        let mut entry = f.entry_block();
        entry.store(Place::var(arr).index(Expr::constant(4)), Expr::var(a));
        entry.load(t, Place::var(arr).index(Expr::constant(0)));
        entry.return_value(Expr::var(t)).unwrap();
        f.build().unwrap();
    }
    {
        let mut f = builder.function("wild_pointer");
        let a = f.param("a", Type::int());
        let q = f.local("q", Type::pointer_to(Type::int()));
        let arr = f.local("arr", Type::array_of(Type::int(), Some(4)));
        let t = f.local("t", Type::int());
        f.returns(Type::int());
        let mut entry = f.entry_block();
        entry.store(Place::var(q).deref(), Expr::var(a));
        entry.load(t, Place::var(arr).index(Expr::constant(1)));
        entry.return_value(Expr::var(t)).unwrap();
        f.build().unwrap();
    }
    let report = analyze(&builder.finish());

    for name in ["out_of_bounds", "wild_pointer"] {
        let t = report.function(name).unwrap().variable("t").unwrap();
        assert!(t.has("a", TaintKind::DIRECT), "{}: {}", name, t);
    }
}

#[test]
fn test_distinct_elements_stay_apart() {
    let mut builder = ProgramBuilder::new();
    let mut f = builder.function("elements");
    let a = f.param("a", Type::int());
    let arr = f.local("arr", Type::array_of(Type::int(), Some(4)));
    let t = f.local("t", Type::int());
    let u = f.local("u", Type::int());
    f.returns(Type::int());
    let mut entry = f.entry_block();
    entry.store(Place::var(arr).index(Expr::constant(0)), Expr::var(a));
    entry.store(Place::var(arr).index(Expr::constant(1)), Expr::constant(5));
    entry.load(t, Place::var(arr).index(Expr::constant(1)));
    entry.load(u, Place::var(arr).index(Expr::constant(0)));
    entry.return_value(bin(BinOp::Add, t, 1)).unwrap();
    f.build().unwrap();

    let report = analyze(&builder.finish());
    let function = report.function("elements").unwrap();
    assert_eq!(function.variable("t").unwrap().tier, Tier::None);
    assert_eq!(function.variable("u").unwrap().kinds_from("a"), TaintKind::DIRECT);
    assert_eq!(function.return_value.as_ref().unwrap().tier, Tier::None);
}
