use crate::{Result, TaintError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Parameters treated as taint sources, keyed by function name. Functions
    /// without an entry use every parameter.
    pub sources: BTreeMap<String, Vec<String>>,
    /// Drop blocks the entry cannot reach instead of rejecting the program.
    pub prune_unreachable: bool,
    /// Analyze independent call-graph components on the rayon pool.
    pub parallel: bool,
    /// Worklist cap per function, counted in block visits.
    pub max_block_visits: usize,
    /// Cap on re-analysis passes over one recursive component.
    pub max_scc_iterations: usize,
    /// Largest constant index tracked as its own element when the array
    /// length is unknown.
    pub max_tracked_index: u64,
    /// Longest projection chain kept distinct in the location arena.
    pub max_path_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            prune_unreachable: true,
            parallel: true,
            max_block_visits: 10_000,
            max_scc_iterations: 64,
            max_tracked_index: 64,
            max_path_depth: 4,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| TaintError::Config(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| TaintError::Config(e.to_string()))
    }

    pub fn with_sources(mut self, function: &str, params: &[&str]) -> Self {
        self.sources.insert(
            function.to_string(),
            params.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn sources_for(&self, function: &str) -> Option<&[String]> {
        self.sources.get(function).map(|v| v.as_slice())
    }
}
