use crate::function::Function;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A whole translation unit: every function the analysis may see.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub functions: IndexMap<String, Function>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: Function) -> Option<Function> {
        self.functions
            .insert(function.signature.name.clone(), function)
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|k| k.as_str())
    }
}
