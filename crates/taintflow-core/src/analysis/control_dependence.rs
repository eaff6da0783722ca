use super::{cfg::ControlFlowGraph, dominator::DominatorTree};
use crate::block::BlockId;
use std::collections::HashMap;

/// Which conditional branches decide whether each block executes.
///
/// Block `B` depends on branch block `X` when `X` has a successor `S` such
/// that `B` post-dominates `S` but not `X`. A loop header whose exit test
/// sits in the header depends on itself.
#[derive(Debug, Clone, Default)]
pub struct ControlDependence {
    depends_on: HashMap<BlockId, Vec<BlockId>>,
}

impl ControlDependence {
    pub fn build(cfg: &ControlFlowGraph, post_dominators: &DominatorTree) -> Self {
        let mut depends_on: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        for &branch in cfg.blocks() {
            let succs = cfg.successors(branch);
            if succs.len() < 2 {
                continue;
            }

            for &succ in succs {
                let Some(pdoms) = post_dominators.dominators(succ) else {
                    continue;
                };
                for &block in pdoms {
                    if block == branch || !post_dominators.dominates(block, branch) {
                        let deps = depends_on.entry(block).or_default();
                        if !deps.contains(&branch) {
                            deps.push(branch);
                        }
                    }
                }
            }
        }

        for deps in depends_on.values_mut() {
            deps.sort_unstable();
        }

        Self { depends_on }
    }

    /// Branch blocks `block` is control dependent on.
    pub fn dependences(&self, block: BlockId) -> &[BlockId] {
        self.depends_on
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_dependent(&self, block: BlockId, branch: BlockId) -> bool {
        self.dependences(block).contains(&branch)
    }

    /// Blocks whose execution `branch` decides.
    pub fn controlled_by(&self, branch: BlockId) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .depends_on
            .iter()
            .filter(|(_, deps)| deps.contains(&branch))
            .map(|(b, _)| *b)
            .collect();
        blocks.sort_unstable();
        blocks
    }
}
