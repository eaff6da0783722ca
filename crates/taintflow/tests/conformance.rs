use pretty_assertions::assert_eq;
use taintflow::{analyze_file, analyze_source, AnalysisConfig, ProgramReport, TaintKind, Tier};

const BASIC: &str = include_str!("fixtures/basic.tfir");
const LINKED_LIST: &str = include_str!("fixtures/linked_list.tfir");
const GCD: &str = include_str!("fixtures/gcd.tfir");

fn run(source: &str) -> ProgramReport {
    analyze_source(source, &AnalysisConfig::default().sequential()).unwrap()
}

#[test]
fn test_loop_bound_gives_full_taint() {
    let report = run(BASIC);
    let test0 = report.function("test0").unwrap();

    let x = test0.variable("x").unwrap();
    assert_eq!(x.tier, Tier::Full);
    assert!(x.has("n", TaintKind::FULL));
    assert_eq!(test0.return_value.as_ref().unwrap().tier, Tier::Full);
}

#[test]
fn test_direct_taint() {
    let report = run(BASIC);
    insta::assert_snapshot!(report.function("test1").unwrap(), @r"
    test1 (sources: n)
      n: Direct taint from n
      x: Direct taint from n
      return: Direct taint from n
    ");
}

#[test]
fn test_indirect_taint() {
    let report = run(BASIC);
    let test2 = report.function("test2").unwrap();

    assert_eq!(test2.variable("x").unwrap().kinds_from("n"), TaintKind::INDIRECT);
    assert_eq!(
        test2.return_value.as_ref().unwrap().to_string(),
        "return: Indirect taint from n"
    );
}

#[test]
fn test_unrelated_source_stays_clean() {
    let report = run(BASIC);
    insta::assert_snapshot!(report.function("test3").unwrap(), @r"
    test3 (sources: a, b)
      a: Direct taint from a
      b: Direct taint from b
      x: Direct taint from a
      return: Direct taint from a
    ");
}

#[test]
fn test_mixed_direct_and_indirect() {
    let report = run(BASIC);
    insta::assert_snapshot!(report.function("test4").unwrap(), @r"
    test4 (sources: a, b)
      a: Direct taint from a
      b: Direct taint from b
      x: Direct taint from a; Indirect taint from b
      return: Direct taint from a; Indirect taint from b
    ");
}

#[test]
fn test_designated_sources_from_json_config() {
    let config = AnalysisConfig::from_json_str(
        r#"{ "parallel": false, "sources": { "test4": ["b"] } }"#,
    )
    .unwrap();
    let report = analyze_source(BASIC, &config).unwrap();
    let test4 = report.function("test4").unwrap();

    assert_eq!(test4.sources, vec!["b".to_string()]);
    assert_eq!(
        test4.variable("x").unwrap().to_string(),
        "x: Indirect taint from b"
    );
    // other functions keep every parameter as a source
    assert_eq!(
        report.function("test3").unwrap().sources,
        vec!["a".to_string(), "b".to_string()]
    );
}

#[test]
fn test_linked_list_walk() {
    let report = run(LINKED_LIST);
    let list = report.function("linked_list").unwrap();

    let sum = list.variable("sum").unwrap();
    assert_eq!(sum.tier, Tier::Full);
    assert!(sum.has("a", TaintKind::DIRECT));
    assert_eq!(sum.kinds_from("b"), TaintKind::INDIRECT | TaintKind::FULL);

    let p = list.variable("p").unwrap();
    assert!(!p.has("a", TaintKind::DIRECT));
    assert!(p.has("b", TaintKind::FULL));

    let ret = list.return_value.as_ref().unwrap();
    assert_eq!(ret.kinds_from("b"), TaintKind::INDIRECT | TaintKind::FULL);
}

#[test]
fn test_early_exit_carries_only_control_taint() {
    let source = r"
fn guard(a: i32, b: i32) -> i32 {
entry:
    br b > a, early, late;
early:
    ret 0;
late:
    ret a;
}
";
    let report = run(source);
    let ret = report.function("guard").unwrap().return_value.clone().unwrap();

    assert_eq!(ret.kinds_from("b"), TaintKind::INDIRECT);
    assert!(ret.has("a", TaintKind::DIRECT));
}

#[test]
fn test_recursion_and_callers() {
    let report = run(GCD);

    let gcd = report.function("gcd").unwrap();
    let ret = gcd.return_value.as_ref().unwrap();
    let all = TaintKind::DIRECT | TaintKind::INDIRECT | TaintKind::FULL;
    assert_eq!(ret.kinds_from("a"), all);
    assert_eq!(ret.kinds_from("b"), all);
    assert_eq!(ret.tier, Tier::Full);

    let totient = report.function("totient").unwrap();
    assert!(totient.variable("g").unwrap().has("n", TaintKind::DIRECT));
    assert_eq!(totient.variable("count").unwrap().tier, Tier::Full);
}

#[test]
fn test_out_parameter_through_call() {
    let report = run(GCD);

    let set = report.function("set").unwrap();
    assert!(set.return_value.is_none());

    let caller = report.function("caller").unwrap();
    let x = caller.variable("x").unwrap();
    assert!(x.has("a", TaintKind::DIRECT));
    assert!(!x.has("a", TaintKind::FULL));
}

#[test]
fn test_recursion_cap_isolates_failure() {
    let config = AnalysisConfig {
        max_scc_iterations: 1,
        parallel: false,
        ..AnalysisConfig::default()
    };
    let report = analyze_source(GCD, &config).unwrap();

    assert!(report.failure("gcd").unwrap().contains("did not converge"));
    let totient = report.function("totient").unwrap();
    assert_eq!(totient.variable("g").unwrap().kinds_from("n"), TaintKind::FULL);
    assert!(report.function("caller").is_some());
}

#[test]
fn test_parallel_matches_sequential() {
    let mut source = String::from(BASIC);
    source.push_str(LINKED_LIST);
    source.push_str(GCD);

    let sequential = analyze_source(&source, &AnalysisConfig::default().sequential()).unwrap();
    let parallel = analyze_source(&source, &AnalysisConfig::default()).unwrap();
    assert_eq!(sequential.to_string(), parallel.to_string());
}

#[test]
fn test_analyze_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/basic.tfir");
    let report = analyze_file(path, &AnalysisConfig::default()).unwrap();

    let names: Vec<&str> = report.functions.keys().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["test0", "test1", "test2", "test3", "test4"]);
}
