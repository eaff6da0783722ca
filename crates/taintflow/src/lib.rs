/*! Static taint-propagation analysis over control-flow graphs.
 *
 * Single import for the whole pipeline: read a program in the textual CFG format (or build one
 * with the core builders), pick which parameters are untrusted, and get back a per-variable report
 * of direct, indirect and full taint.
 */

pub use taintflow_core as core;
pub use taintflow_parser as parser;

pub use taintflow_core::{
    analyze_program, AnalysisConfig, BasicBlock, BlockId, Function, FunctionOutcome,
    FunctionReport, Instruction, Program, ProgramBuilder, ProgramReport, TaintError, TaintKind,
    Terminator, Tier, Type, VariableReport,
};

pub use taintflow_parser::{parse, parse_program, ParseError};

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Parses `source` and analyzes every function in it.
pub fn analyze_source(source: &str, config: &AnalysisConfig) -> Result<ProgramReport> {
    let program = parse_program(source).context("failed to parse program")?;
    let report = analyze_program(&program, config).context("failed to analyze program")?;
    Ok(report)
}

pub fn analyze_file<P: AsRef<Path>>(path: P, config: &AnalysisConfig) -> Result<ProgramReport> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let report = analyze_source(&source, config)
        .with_context(|| format!("while analyzing {}", path.display()))?;

    info!(
        path = %path.display(),
        functions = report.functions.len(),
        "analyzed file"
    );
    Ok(report)
}

/// Reads an [`AnalysisConfig`] from a JSON file. Missing fields keep their
/// defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AnalysisConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    AnalysisConfig::from_json_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}

/// Renders a report as pretty-printed JSON.
pub fn report_json(report: &ProgramReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report")
}
