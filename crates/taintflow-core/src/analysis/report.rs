//! Four-tier classification of the solver's results.

use super::{
    dataflow::FunctionResult,
    lattice::{SourceId, TaintKind, TaintValue, Tier},
    summary::FunctionSummary,
};
use crate::function::{Function, VarKind};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTaint {
    pub source: String,
    pub tier: Tier,
    pub kinds: TaintKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableReport {
    pub name: String,
    pub tier: Tier,
    pub sources: Vec<SourceTaint>,
}

impl VariableReport {
    fn from_value(name: &str, value: &TaintValue, function: &Function) -> Self {
        let sources = value
            .entries()
            .map(|(source, kinds)| SourceTaint {
                source: source_name(function, source),
                tier: kinds.tier(),
                kinds,
            })
            .collect();

        Self {
            name: name.to_string(),
            tier: value.tier(),
            sources,
        }
    }

    pub fn kinds_from(&self, source: &str) -> TaintKind {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map_or(TaintKind::empty(), |s| s.kinds)
    }

    pub fn has(&self, source: &str, kind: TaintKind) -> bool {
        self.kinds_from(source).contains(kind)
    }

    pub fn is_tainted(&self) -> bool {
        self.tier != Tier::None
    }
}

fn source_name(function: &Function, source: SourceId) -> String {
    function
        .params()
        .get(source.index())
        .map(|&param| function.var_name(param).to_string())
        .unwrap_or_else(|| format!("arg{}", source.0))
}

impl fmt::Display for VariableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        if self.sources.is_empty() {
            return write!(f, "no taint");
        }

        let groups = [
            (TaintKind::DIRECT, "Direct"),
            (TaintKind::INDIRECT, "Indirect"),
            (TaintKind::FULL, "Full"),
        ];
        let mut first = true;
        for (kind, label) in groups {
            let names: Vec<&str> = self
                .sources
                .iter()
                .filter(|s| s.kinds.contains(kind))
                .map(|s| s.source.as_str())
                .collect();
            if names.is_empty() {
                continue;
            }
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{} taint from {}", label, names.join(", "))?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionReport {
    pub function: String,
    /// The parameters that were treated as sources.
    pub sources: Vec<String>,
    /// Parameters and locals in declaration order.
    pub variables: Vec<VariableReport>,
    pub return_value: Option<VariableReport>,
    /// Unfiltered summary over all formals, as used at call sites.
    pub summary: FunctionSummary,
}

impl FunctionReport {
    /// Projects `result` onto the designated source parameters.
    pub fn build(function: &Function, result: &FunctionResult, sources: &[usize]) -> Self {
        let keep = |value: &TaintValue| {
            let mut value = value.clone();
            value.retain_sources(|s| sources.contains(&s.index()));
            value
        };

        let variables = function
            .vars()
            .filter(|v| v.kind != VarKind::Temp)
            .map(|v| {
                let value = result.taint_of(v.id).map(&keep).unwrap_or_default();
                VariableReport::from_value(&v.name, &value, function)
            })
            .collect();

        let return_value = (!matches!(function.signature.returns, crate::types::Type::Void))
            .then(|| {
                VariableReport::from_value("return", &keep(&result.summary.return_taint), function)
            });

        Self {
            function: function.name().to_string(),
            sources: sources
                .iter()
                .map(|&i| source_name(function, SourceId(i as u32)))
                .collect(),
            variables,
            return_value,
            summary: result.summary.clone(),
        }
    }

    pub fn variable(&self, name: &str) -> Option<&VariableReport> {
        self.variables.iter().find(|v| v.name == name)
    }
}

impl fmt::Display for FunctionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (sources: {})", self.function, self.sources.join(", "))?;
        for variable in &self.variables {
            writeln!(f, "  {}", variable)?;
        }
        if let Some(ret) = &self.return_value {
            writeln!(f, "  {}", ret)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FunctionOutcome {
    Analyzed(FunctionReport),
    Failed { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramReport {
    pub functions: IndexMap<String, FunctionOutcome>,
}

impl ProgramReport {
    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        match self.functions.get(name) {
            Some(FunctionOutcome::Analyzed(report)) => Some(report),
            _ => None,
        }
    }

    pub fn failure(&self, name: &str) -> Option<&str> {
        match self.functions.get(name) {
            Some(FunctionOutcome::Failed { message }) => Some(message),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ProgramReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, outcome) in &self.functions {
            match outcome {
                FunctionOutcome::Analyzed(report) => write!(f, "{}", report)?,
                FunctionOutcome::Failed { message } => {
                    writeln!(f, "{}: analysis failed: {}", name, message)?
                }
            }
        }
        Ok(())
    }
}
