use super::{
    call_graph::{CallGraph, Component},
    dataflow::{FunctionResult, TaintEngine},
    report::{FunctionOutcome, FunctionReport, ProgramReport},
    summary::{CalleeSummary, FunctionSummary, SummaryTable},
};
use crate::{
    config::AnalysisConfig, program::Program, validate::validate_program, Result, TaintError,
};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

type ComponentResults = Vec<(String, Result<FunctionResult>)>;

/// Validates `program`, then analyzes every function, callees before
/// callers.
///
/// Structural problems reject the whole program. A function whose analysis
/// does not converge is reported as failed while the rest of the program is
/// still analyzed.
#[instrument(skip_all, fields(functions = program.functions.len()))]
pub fn analyze_program(program: &Program, config: &AnalysisConfig) -> Result<ProgramReport> {
    let program = validate_program(program, config)?;
    let results = summarize(&program, config);

    let mut report = ProgramReport::default();
    for (name, function) in &program.functions {
        let outcome = match results.get(name) {
            Some(Ok(result)) => {
                let sources = designated_sources(function, config);
                FunctionOutcome::Analyzed(FunctionReport::build(function, result, &sources))
            }
            Some(Err(err)) => {
                warn!(function = name.as_str(), error = %err, "function analysis failed");
                FunctionOutcome::Failed {
                    message: err.to_string(),
                }
            }
            None => FunctionOutcome::Failed {
                message: TaintError::UnknownFunction(name.clone()).to_string(),
            },
        };
        report.functions.insert(name.clone(), outcome);
    }

    Ok(report)
}

/// Runs the solver over every function of an already validated program.
pub fn summarize(program: &Program, config: &AnalysisConfig) -> HashMap<String, Result<FunctionResult>> {
    let graph = CallGraph::build(program);
    let mut summaries = SummaryTable::new();
    let mut results = HashMap::new();

    for (depth, level) in graph.levels().into_iter().enumerate() {
        debug!(depth, components = level.len(), "analyzing call-graph level");

        let analyzed: Vec<ComponentResults> = if config.parallel {
            level
                .par_iter()
                .map(|component| analyze_component(program, component, config, &summaries))
                .collect()
        } else {
            level
                .iter()
                .map(|component| analyze_component(program, component, config, &summaries))
                .collect()
        };

        for (name, result) in analyzed.into_iter().flatten() {
            let entry = match &result {
                Ok(result) => CalleeSummary::Ready(result.summary.clone()),
                Err(_) => CalleeSummary::Failed,
            };
            summaries.insert(name.clone(), entry);
            results.insert(name, result);
        }
    }

    info!(functions = results.len(), "program analyzed");
    results
}

fn analyze_component(
    program: &Program,
    component: &Component,
    config: &AnalysisConfig,
    summaries: &SummaryTable,
) -> ComponentResults {
    if !component.recursive {
        return component
            .functions
            .iter()
            .filter_map(|name| {
                let function = program.get_function(name)?;
                let result = TaintEngine::new(function, config, summaries).run();
                Some((name.clone(), result))
            })
            .collect();
    }

    match analyze_recursive(program, component, config, summaries) {
        Ok(results) => results.into_iter().map(|(n, r)| (n, Ok(r))).collect(),
        Err(err) => component
            .functions
            .iter()
            .map(|name| (name.clone(), Err(err.clone())))
            .collect(),
    }
}

/// Re-analyzes a recursive component from empty summaries until a full pass
/// changes none of them.
fn analyze_recursive(
    program: &Program,
    component: &Component,
    config: &AnalysisConfig,
    summaries: &SummaryTable,
) -> Result<Vec<(String, FunctionResult)>> {
    let mut table = summaries.clone();
    for name in &component.functions {
        table.insert(name.clone(), CalleeSummary::Ready(FunctionSummary::default()));
    }

    for iteration in 1..=config.max_scc_iterations {
        let mut changed = false;
        let mut results = Vec::with_capacity(component.functions.len());

        for name in &component.functions {
            let Some(function) = program.get_function(name) else {
                continue;
            };
            let result = TaintEngine::new(function, config, &table)
                .with_recursive_peers(&component.functions)
                .run()?;

            let mut summary = table.ready(name).cloned().unwrap_or_default();
            if summary.join(&result.summary) {
                changed = true;
                table.insert(name.clone(), CalleeSummary::Ready(summary));
            }
            results.push((name.clone(), result));
        }

        if !changed {
            debug!(
                functions = ?component.functions,
                iteration,
                "recursive component converged"
            );
            return Ok(results);
        }
    }

    Err(TaintError::NonConvergence {
        scope: component.functions.join(", "),
        iterations: config.max_scc_iterations,
    })
}

/// Parameter indices treated as sources for `function`.
fn designated_sources(function: &crate::function::Function, config: &AnalysisConfig) -> Vec<usize> {
    match config.sources_for(function.name()) {
        Some(names) => names
            .iter()
            .filter_map(|name| function.var_by_name(name))
            .filter_map(|id| function.var(id).and_then(|v| v.param_index()))
            .collect(),
        None => (0..function.param_count()).collect(),
    }
}
