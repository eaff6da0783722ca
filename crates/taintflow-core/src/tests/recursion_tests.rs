use super::programs::{analyze, bin, even_odd, gcd, totient};
use crate::analysis::{
    analyze_program, summarize, SourceId, TaintKind, Tier,
};
use crate::builder::ProgramBuilder;
use crate::config::AnalysisConfig;
use crate::types::Type;
use crate::values::{BinOp, Expr};
use pretty_assertions::assert_eq;

fn gcd_program() -> crate::program::Program {
    let mut builder = ProgramBuilder::new();
    totient(&mut builder);
    gcd(&mut builder);
    builder.finish()
}

#[test]
fn test_self_recursion_converges() {
    let report = analyze(&gcd_program());
    let gcd = report.function("gcd").unwrap();
    let ret = gcd.return_value.as_ref().unwrap();

    // Both arguments flow back in and both decide how deep gcd recurses.
    let all = TaintKind::DIRECT | TaintKind::INDIRECT | TaintKind::FULL;
    assert_eq!(ret.kinds_from("a"), all);
    assert_eq!(ret.kinds_from("b"), all);
    assert_eq!(ret.tier, Tier::Full);
}

#[test]
fn test_recursion_depth_comes_from_the_guard() {
    // count(n, k) = k == 0 ? 0 : count(n, k - 1) + n
    let mut builder = ProgramBuilder::new();
    let mut f = builder.function("count");
    let n = f.param("n", Type::int());
    let k = f.param("k", Type::int());
    let m = f.local("m", Type::int());
    let r = f.local("r", Type::int());
    f.returns(Type::int());

    let base = f.create_block_id();
    let step = f.create_block_id();

    f.entry_block()
        .branch(bin(BinOp::Eq, k, 0), base, step)
        .unwrap();
    f.switch_to_block(base)
        .unwrap()
        .return_value(Expr::constant(0))
        .unwrap();
    {
        let mut step = f.switch_to_block(step).unwrap();
        step.assign(m, bin(BinOp::Sub, k, 1));
        step.call(Some(r), "count", vec![Expr::var(n), Expr::var(m)]);
        step.return_value(Expr::binary(BinOp::Add, Expr::var(r), Expr::var(n)))
            .unwrap();
    }
    f.build().unwrap();

    let report = analyze(&builder.finish());
    let count = report.function("count").unwrap();

    let r = count.variable("r").unwrap();
    assert!(r.has("k", TaintKind::FULL));
    assert!(!r.has("n", TaintKind::FULL));

    let ret = count.return_value.as_ref().unwrap();
    assert_eq!(ret.kinds_from("n"), TaintKind::DIRECT);
    assert!(ret.has("k", TaintKind::FULL));
}

#[test]
fn test_caller_uses_recursive_summary() {
    let report = analyze(&gcd_program());
    let totient = report.function("totient").unwrap();

    let count = totient.variable("count").unwrap();
    assert!(count.has("n", TaintKind::FULL));
    assert_eq!(count.tier, Tier::Full);

    let g = totient.variable("g").unwrap();
    assert!(g.has("n", TaintKind::DIRECT));
}

#[test]
fn test_summary_is_a_fixpoint() {
    let program = gcd_program();
    let config = AnalysisConfig::default().sequential();
    let results = summarize(&program, &config);
    let summary = &results["gcd"].as_ref().unwrap().summary;

    // gcd(b, a % b) feeds both formals back into the return value.
    let a = SourceId(0);
    let b = SourceId(1);
    assert!(summary.return_taint.has(a, TaintKind::DIRECT));
    assert!(summary.return_taint.has(b, TaintKind::DIRECT));
    assert!(summary.out_params.is_empty());
}

#[test]
fn test_mutual_recursion() {
    let mut builder = ProgramBuilder::new();
    even_odd(&mut builder);
    let report = analyze(&builder.finish());

    for name in ["even", "odd"] {
        let ret = report.function(name).unwrap().return_value.clone().unwrap();
        assert_eq!(
            ret.kinds_from("n"),
            TaintKind::INDIRECT | TaintKind::FULL,
            "{}",
            name
        );
    }
}

#[test]
fn test_recursion_cap_fails_only_the_component() {
    let config = AnalysisConfig {
        max_scc_iterations: 1,
        ..AnalysisConfig::default().sequential()
    };
    let report = analyze_program(&gcd_program(), &config).unwrap();

    let message = report.failure("gcd").unwrap();
    assert!(message.contains("did not converge"), "{}", message);

    // Callers of a failed function treat the call as unsupported.
    let totient = report.function("totient").unwrap();
    assert_eq!(totient.variable("g").unwrap().kinds_from("n"), TaintKind::FULL);
    assert!(totient.variable("count").unwrap().has("n", TaintKind::FULL));
}
