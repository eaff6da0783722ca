use crate::{block::BlockId, function::Function};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    entry: BlockId,
    blocks: Vec<BlockId>,
    exits: Vec<BlockId>,
    predecessors: HashMap<BlockId, Vec<BlockId>>,
    successors: HashMap<BlockId, Vec<BlockId>>,
    reverse_postorder: Vec<BlockId>,
    loops: Vec<Loop>,
    back_edges: Vec<(BlockId, BlockId)>,
}

/// A natural loop found from a DFS back edge.
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: HashSet<BlockId>,
    pub back_edges: Vec<BlockId>,
    /// Blocks inside the loop with a successor outside it.
    pub exiting: Vec<BlockId>,
    pub depth: usize,
}

impl ControlFlowGraph {
    pub fn build(function: &Function) -> Self {
        let entry = function.entry_block();
        let mut predecessors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut successors = HashMap::new();
        let mut exits = Vec::new();
        let mut blocks = Vec::new();

        for (&block_id, block) in &function.body.blocks {
            blocks.push(block_id);
            let succs = block.successors();

            if block.terminator.is_return() {
                exits.push(block_id);
            }

            for &succ in &succs {
                predecessors.entry(succ).or_default().push(block_id);
            }
            successors.insert(block_id, succs);
        }

        let reverse_postorder = Self::compute_reverse_postorder(entry, &successors);
        let (loops, back_edges) = Self::find_loops(entry, &successors, &predecessors);

        Self {
            entry,
            blocks,
            exits,
            predecessors,
            successors,
            reverse_postorder,
            loops,
            back_edges,
        }
    }

    fn compute_reverse_postorder(
        entry: BlockId,
        successors: &HashMap<BlockId, Vec<BlockId>>,
    ) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);

        while let Some((block, next)) = stack.pop() {
            let succs = successors.get(&block).map(|v| v.as_slice()).unwrap_or(&[]);
            if let Some(&succ) = succs.get(next) {
                stack.push((block, next + 1));
                if visited.insert(succ) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        postorder.reverse();
        postorder
    }

    fn find_loops(
        entry: BlockId,
        successors: &HashMap<BlockId, Vec<BlockId>>,
        predecessors: &HashMap<BlockId, Vec<BlockId>>,
    ) -> (Vec<Loop>, Vec<(BlockId, BlockId)>) {
        let mut loops: Vec<Loop> = Vec::new();
        let mut back_edges = Vec::new();

        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);
        on_stack.insert(entry);

        while let Some((block, next)) = stack.pop() {
            let succs = successors.get(&block).map(|v| v.as_slice()).unwrap_or(&[]);
            let Some(&succ) = succs.get(next) else {
                on_stack.remove(&block);
                continue;
            };
            stack.push((block, next + 1));

            if on_stack.contains(&succ) {
                back_edges.push((block, succ));
                let loop_blocks = Self::find_loop_blocks(succ, block, predecessors);

                // Several back edges to one header form a single loop.
                if let Some(existing) = loops.iter_mut().find(|l| l.header == succ) {
                    existing.blocks.extend(loop_blocks);
                    existing.back_edges.push(block);
                } else {
                    loops.push(Loop {
                        header: succ,
                        blocks: loop_blocks,
                        back_edges: vec![block],
                        exiting: Vec::new(),
                        depth: 0,
                    });
                }
            } else if visited.insert(succ) {
                on_stack.insert(succ);
                stack.push((succ, 0));
            }
        }

        for l in loops.iter_mut() {
            l.exiting = Self::find_exiting_blocks(&l.blocks, successors);
        }

        for i in 0..loops.len() {
            let header = loops[i].header;
            loops[i].depth = loops
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && other.blocks.contains(&header))
                .count();
        }

        (loops, back_edges)
    }

    fn find_loop_blocks(
        header: BlockId,
        back_edge_source: BlockId,
        predecessors: &HashMap<BlockId, Vec<BlockId>>,
    ) -> HashSet<BlockId> {
        let mut blocks = HashSet::new();
        blocks.insert(header);

        if back_edge_source == header {
            return blocks;
        }

        blocks.insert(back_edge_source);

        let mut worklist = vec![back_edge_source];

        while let Some(block) = worklist.pop() {
            if let Some(preds) = predecessors.get(&block) {
                for &pred in preds {
                    if pred != header && blocks.insert(pred) {
                        worklist.push(pred);
                    }
                }
            }
        }

        blocks
    }

    fn find_exiting_blocks(
        loop_blocks: &HashSet<BlockId>,
        successors: &HashMap<BlockId, Vec<BlockId>>,
    ) -> Vec<BlockId> {
        let mut exiting: Vec<BlockId> = loop_blocks
            .iter()
            .copied()
            .filter(|b| {
                successors
                    .get(b)
                    .map_or(false, |succs| succs.iter().any(|s| !loop_blocks.contains(s)))
            })
            .collect();
        exiting.sort_unstable();
        exiting
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Blocks ending in a return.
    pub fn exits(&self) -> &[BlockId] {
        &self.exits
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.reverse_postorder
    }

    pub fn is_back_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.back_edges.contains(&(from, to))
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Every loop containing `block`, outermost first.
    pub fn loops_containing(&self, block: BlockId) -> Vec<&Loop> {
        let mut found: Vec<&Loop> = self
            .loops
            .iter()
            .filter(|l| l.blocks.contains(&block))
            .collect();
        found.sort_by_key(|l| l.depth);
        found
    }

    pub fn is_loop_header(&self, block: BlockId) -> bool {
        self.loops.iter().any(|l| l.header == block)
    }

    /// Blocks from which some return is reachable.
    pub fn blocks_reaching_exit(&self) -> HashSet<BlockId> {
        let mut reaching: HashSet<BlockId> = HashSet::new();
        let mut queue: VecDeque<BlockId> = self.exits.iter().copied().collect();

        while let Some(block) = queue.pop_front() {
            if reaching.insert(block) {
                queue.extend(self.predecessors(block).iter().copied());
            }
        }

        reaching
    }

    pub fn has_path(&self, from: BlockId, to: BlockId) -> bool {
        if from == to {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);

        while let Some(block) = queue.pop_front() {
            if !visited.insert(block) {
                continue;
            }

            for &succ in self.successors(block) {
                if succ == to {
                    return true;
                }
                queue.push_back(succ);
            }
        }

        false
    }
}
