use super::lattice::TaintValue;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// How a function's parameters flow to its observable effects.
///
/// Values are expressed over the function's own formals: `SourceId(i)` is
/// parameter `i`. Callers rewrite them with [`TaintValue::substitute`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionSummary {
    pub return_taint: TaintValue,
    /// Taint written through pointer parameter `i` into the caller's memory.
    pub out_params: BTreeMap<usize, TaintValue>,
}

impl FunctionSummary {
    pub fn out_param(&self, index: usize) -> Option<&TaintValue> {
        self.out_params.get(&index)
    }

    /// Whether `self` already covers everything `other` says.
    pub fn covers(&self, other: &FunctionSummary) -> bool {
        other.return_taint.leq(&self.return_taint)
            && other.out_params.iter().all(|(index, value)| {
                self.out_params
                    .get(index)
                    .map_or(value.is_bottom(), |mine| value.leq(mine))
            })
    }

    pub fn join(&mut self, other: &FunctionSummary) -> bool {
        let mut changed = self.return_taint.join(&other.return_taint);
        for (&index, value) in &other.out_params {
            if value.is_bottom() {
                continue;
            }
            changed |= self.out_params.entry(index).or_default().join(value);
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeSummary {
    Ready(FunctionSummary),
    /// The callee's analysis failed; call sites treat it as unsupported.
    Failed,
}

/// Summaries visible to the function being analyzed.
#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
    entries: HashMap<String, CalleeSummary>,
}

impl SummaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, function: impl Into<String>, summary: CalleeSummary) {
        self.entries.insert(function.into(), summary);
    }

    /// `None` for functions the table has never heard of.
    pub fn get(&self, function: &str) -> Option<&CalleeSummary> {
        self.entries.get(function)
    }

    pub fn ready(&self, function: &str) -> Option<&FunctionSummary> {
        match self.entries.get(function) {
            Some(CalleeSummary::Ready(summary)) => Some(summary),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
