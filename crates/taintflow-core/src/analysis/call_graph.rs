//! Call graph over the functions of a program, condensed into strongly
//! connected components.

use crate::program::Program;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Directed graph where an edge `f -> g` means `f` calls `g`. Calls to
/// functions outside the program have no node.
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

/// A group of mutually recursive functions (or a single function).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub functions: Vec<String>,
    pub recursive: bool,
}

impl CallGraph {
    pub fn build(program: &Program) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for name in program.function_names() {
            let idx = graph.add_node(name.to_string());
            node_map.insert(name.to_string(), idx);
        }

        for (caller, function) in &program.functions {
            let from = node_map[caller];
            for callee in function.callees() {
                if let Some(&to) = node_map.get(callee) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        Self { graph, node_map }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn callees(&self, function: &str) -> Vec<String> {
        self.neighbors(function, Direction::Outgoing)
    }

    pub fn callers(&self, function: &str) -> Vec<String> {
        self.neighbors(function, Direction::Incoming)
    }

    fn neighbors(&self, function: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.node_map.get(function) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        names.sort();
        names
    }

    /// Components with callees before callers.
    pub fn components(&self) -> Vec<Component> {
        // tarjan_scc yields components in reverse topological order, which
        // for caller -> callee edges puts callees first.
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|scc| {
                let recursive = scc.len() > 1
                    || self.graph.find_edge(scc[0], scc[0]).is_some();
                let mut functions: Vec<String> =
                    scc.iter().map(|&n| self.graph[n].clone()).collect();
                functions.sort();
                Component {
                    functions,
                    recursive,
                }
            })
            .collect()
    }

    /// Components grouped so that every component only calls into earlier
    /// levels. Components within one level are independent.
    pub fn levels(&self) -> Vec<Vec<Component>> {
        let components = self.components();
        let mut component_of: HashMap<&str, usize> = HashMap::new();
        for (i, component) in components.iter().enumerate() {
            for name in &component.functions {
                component_of.insert(name.as_str(), i);
            }
        }

        let mut level_of = vec![0usize; components.len()];
        for (i, component) in components.iter().enumerate() {
            let mut level = 0;
            for name in &component.functions {
                for callee in self.callees(name) {
                    let j = component_of[callee.as_str()];
                    if j != i {
                        level = level.max(level_of[j] + 1);
                    }
                }
            }
            level_of[i] = level;
        }

        let depth = level_of.iter().copied().max().map_or(0, |m| m + 1);
        let mut levels: Vec<Vec<Component>> = vec![Vec::new(); depth];
        for (component, level) in components.into_iter().zip(level_of) {
            levels[level].push(component);
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::types::Type;
    use crate::values::Expr;
    use pretty_assertions::assert_eq;

    fn program(edges: &[(&str, Vec<&str>)]) -> Program {
        let mut builder = ProgramBuilder::new();
        for (name, callees) in edges {
            let mut f = builder.function(name);
            let mut entry = f.entry_block();
            for callee in callees {
                entry.call(None, callee, vec![]);
            }
            entry.return_value(Expr::constant(0)).unwrap();
            f.returns(Type::int());
            f.build().unwrap();
        }
        builder.finish()
    }

    #[test]
    fn test_components_put_callees_first() {
        let graph = CallGraph::build(&program(&[
            ("main", vec!["helper", "printf"]),
            ("helper", vec![]),
        ]));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.callees("main"), vec!["helper".to_string()]);
        assert_eq!(graph.callers("helper"), vec!["main".to_string()]);

        let order: Vec<Vec<String>> = graph
            .components()
            .into_iter()
            .map(|c| c.functions)
            .collect();
        assert_eq!(order, vec![vec!["helper".to_string()], vec!["main".to_string()]]);
    }

    #[test]
    fn test_recursion_detection() {
        let graph = CallGraph::build(&program(&[
            ("gcd", vec!["gcd"]),
            ("even", vec!["odd"]),
            ("odd", vec!["even"]),
            ("leaf", vec![]),
        ]));

        let components = graph.components();
        let find = |name: &str| {
            components
                .iter()
                .find(|c| c.functions.iter().any(|f| f == name))
                .unwrap()
                .clone()
        };

        assert!(find("gcd").recursive);
        assert_eq!(find("even").functions, vec!["even".to_string(), "odd".to_string()]);
        assert!(find("even").recursive);
        assert!(!find("leaf").recursive);
    }

    #[test]
    fn test_levels() {
        let graph = CallGraph::build(&program(&[
            ("totient", vec!["gcd"]),
            ("gcd", vec!["gcd"]),
            ("other", vec![]),
            ("main", vec!["totient", "other"]),
        ]));

        let levels: Vec<Vec<Vec<String>>> = graph
            .levels()
            .into_iter()
            .map(|level| {
                let mut names: Vec<Vec<String>> =
                    level.into_iter().map(|c| c.functions).collect();
                names.sort();
                names
            })
            .collect();

        assert_eq!(
            levels,
            vec![
                vec![vec!["gcd".to_string()], vec!["other".to_string()]],
                vec![vec!["totient".to_string()]],
                vec![vec!["main".to_string()]],
            ]
        );
    }
}
