use super::cfg::ControlFlowGraph;
use crate::block::BlockId;
use std::collections::{HashMap, HashSet};

/// Dominator or post-dominator sets, computed with the classic iterative
/// set intersection.
///
/// For post-dominance every return block is a root, and so is every block
/// that can never reach a return (a virtual exit joins them all). Roots have
/// no immediate post-dominator.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    dominators: HashMap<BlockId, HashSet<BlockId>>,
    idom: HashMap<BlockId, BlockId>,
    children: HashMap<BlockId, Vec<BlockId>>,
}

impl DominatorTree {
    pub fn build(cfg: &ControlFlowGraph) -> Self {
        let roots = HashSet::from([cfg.entry()]);
        let order = cfg.reverse_postorder().to_vec();
        Self::compute(&order, &roots, |b| cfg.predecessors(b))
    }

    pub fn build_post(cfg: &ControlFlowGraph) -> Self {
        let reaching = cfg.blocks_reaching_exit();
        let roots: HashSet<BlockId> = cfg
            .blocks()
            .iter()
            .copied()
            .filter(|b| cfg.exits().contains(b) || !reaching.contains(b))
            .collect();

        let mut order = cfg.reverse_postorder().to_vec();
        order.reverse();
        Self::compute(&order, &roots, |b| cfg.successors(b))
    }

    fn compute<'a>(
        order: &[BlockId],
        roots: &HashSet<BlockId>,
        flow_from: impl Fn(BlockId) -> &'a [BlockId],
    ) -> Self {
        let all: HashSet<BlockId> = order.iter().copied().collect();
        let mut dominators: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();

        for &block in order {
            if roots.contains(&block) {
                dominators.insert(block, HashSet::from([block]));
            } else {
                dominators.insert(block, all.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;

            for &block in order {
                if roots.contains(&block) {
                    continue;
                }

                let mut new_doms: Option<HashSet<BlockId>> = None;
                for &from in flow_from(block) {
                    if let Some(from_doms) = dominators.get(&from) {
                        new_doms = Some(match new_doms {
                            Some(acc) => acc.intersection(from_doms).copied().collect(),
                            None => from_doms.clone(),
                        });
                    }
                }

                let mut new_doms = new_doms.unwrap_or_default();
                new_doms.insert(block);

                if dominators.get(&block) != Some(&new_doms) {
                    dominators.insert(block, new_doms);
                    changed = true;
                }
            }
        }

        let (idom, children) = Self::compute_immediate(&dominators);

        Self {
            dominators,
            idom,
            children,
        }
    }

    fn compute_immediate(
        dominators: &HashMap<BlockId, HashSet<BlockId>>,
    ) -> (HashMap<BlockId, BlockId>, HashMap<BlockId, Vec<BlockId>>) {
        let mut idom = HashMap::new();
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        for (&block, doms) in dominators {
            // The closest strict dominator is the one with the most dominators.
            let closest = doms
                .iter()
                .copied()
                .filter(|&d| d != block)
                .max_by_key(|d| (dominators.get(d).map_or(0, |s| s.len()), *d));

            if let Some(parent) = closest {
                idom.insert(block, parent);
                children.entry(parent).or_default().push(block);
            }
        }

        for kids in children.values_mut() {
            kids.sort_unstable();
        }

        (idom, children)
    }

    pub fn dominates(&self, dominator: BlockId, dominated: BlockId) -> bool {
        self.dominators
            .get(&dominated)
            .map_or(false, |doms| doms.contains(&dominator))
    }

    pub fn dominators(&self, block: BlockId) -> Option<&HashSet<BlockId>> {
        self.dominators.get(&block)
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn dominance_frontier(&self, block: BlockId, cfg: &ControlFlowGraph) -> HashSet<BlockId> {
        let mut frontier = HashSet::new();

        let mut worklist = vec![block];
        let mut visited = HashSet::new();

        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }

            for &succ in cfg.successors(current) {
                if !self.dominates(block, succ) || succ == block {
                    frontier.insert(succ);
                }
            }

            worklist.extend_from_slice(self.children(current));
        }

        frontier
    }
}
