//! Intraprocedural worklist solver.
//!
//! Scalars are tracked per program point and updated strongly; memory cells
//! are shared by the whole function and only ever grow. Blocks are visited in
//! reverse postorder and re-queued whenever something they read changed: a
//! predecessor's exit state, the condition of a branch they depend on, the
//! exit test of a loop they sit in, or memory.

use super::{
    alias::{AliasAnalysis, LocId, LocRoot},
    cfg::{ControlFlowGraph, Loop},
    control_dependence::ControlDependence,
    dominator::DominatorTree,
    lattice::{SourceId, TaintKind, TaintState, TaintValue},
    summary::{FunctionSummary, SummaryTable},
};
use crate::{
    block::{BlockId, Terminator},
    config::AnalysisConfig,
    function::Function,
    instructions::{Callee, Instruction},
    values::{Expr, Place, Projection, VarId},
    Result, TaintError,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, instrument, trace, warn};

/// Everything one run of the solver learned about a function.
#[derive(Debug, Clone)]
pub struct FunctionResult {
    pub summary: FunctionSummary,
    /// Per variable: the join over all block exit states, plus the memory
    /// cells of variables that live in memory.
    pub var_taint: Vec<TaintValue>,
    pub block_visits: usize,
}

impl FunctionResult {
    pub fn taint_of(&self, var: VarId) -> Option<&TaintValue> {
        self.var_taint.get(var.0 as usize)
    }
}

pub struct TaintEngine<'a> {
    function: &'a Function,
    config: &'a AnalysisConfig,
    summaries: &'a SummaryTable,
    cfg: ControlFlowGraph,
    control: ControlDependence,
    alias: AliasAnalysis,
    loops: Vec<Loop>,
    order: Vec<BlockId>,
    position: HashMap<BlockId, usize>,
    memory_readers: Vec<BlockId>,
    all_sources: TaintValue,
    /// Functions of the recursive component being analyzed, if any.
    recursive_peers: BTreeSet<String>,

    worklist: BTreeSet<usize>,
    out_states: HashMap<BlockId, TaintState>,
    cells: HashMap<LocId, TaintValue>,
    branch_taint: HashMap<BlockId, TaintValue>,
    control_taint: HashMap<BlockId, TaintValue>,
    param_writes: BTreeMap<usize, TaintValue>,
    return_taint: TaintValue,
    memory_changed: bool,
}

impl<'a> TaintEngine<'a> {
    pub fn new(
        function: &'a Function,
        config: &'a AnalysisConfig,
        summaries: &'a SummaryTable,
    ) -> Self {
        let cfg = ControlFlowGraph::build(function);
        let dominators = DominatorTree::build(&cfg);
        let post_dominators = DominatorTree::build_post(&cfg);
        let control = ControlDependence::build(&cfg, &post_dominators);
        let alias = AliasAnalysis::analyze(function, config);

        for l in cfg.loops() {
            if !l.back_edges.iter().all(|&tail| dominators.dominates(l.header, tail)) {
                debug!(
                    function = function.name(),
                    header = %l.header,
                    "irreducible loop, header does not dominate its back edges"
                );
            }
        }

        let order = cfg.reverse_postorder().to_vec();
        let position = order.iter().enumerate().map(|(i, b)| (*b, i)).collect();
        let memory_readers = Self::find_memory_readers(function, &alias);
        let all_sources = TaintValue::top((0..function.param_count()).map(|i| SourceId(i as u32)));
        let loops = cfg.loops().to_vec();

        Self {
            function,
            config,
            summaries,
            cfg,
            control,
            alias,
            loops,
            order,
            position,
            memory_readers,
            all_sources,
            recursive_peers: BTreeSet::new(),
            worklist: BTreeSet::new(),
            out_states: HashMap::new(),
            cells: HashMap::new(),
            branch_taint: HashMap::new(),
            control_taint: HashMap::new(),
            param_writes: BTreeMap::new(),
            return_taint: TaintValue::bottom(),
            memory_changed: false,
        }
    }

    /// Calls to `peers` go back into the component this function belongs
    /// to, so their results also carry the recursion depth.
    pub fn with_recursive_peers(mut self, peers: &[String]) -> Self {
        self.recursive_peers = peers.iter().cloned().collect();
        self
    }

    /// Blocks whose transfer reads memory cells.
    fn find_memory_readers(function: &Function, alias: &AliasAnalysis) -> Vec<BlockId> {
        function
            .body
            .blocks
            .iter()
            .filter(|(_, block)| {
                let touches_memory = block.instructions.iter().any(|inst| match inst {
                    Instruction::Load { .. }
                    | Instruction::Call { .. }
                    | Instruction::Store { .. } => true,
                    other => other
                        .mentioned_vars()
                        .into_iter()
                        .any(|v| alias.is_memory_resident(v)),
                });
                let terminator_reads = match &block.terminator {
                    Terminator::Branch { condition: e, .. } | Terminator::Return(Some(e)) => e
                        .mentioned_vars()
                        .into_iter()
                        .any(|v| alias.is_memory_resident(v)),
                    _ => false,
                };
                touches_memory || terminator_reads
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn run(&mut self) -> Result<FunctionResult> {
        self.run_with_observer(|_, _| {})
    }

    /// Runs to a fixpoint, handing each block's exit state to `observer`
    /// after every visit.
    #[instrument(level = "debug", skip_all, fields(function = self.function.name()))]
    pub fn run_with_observer(
        &mut self,
        mut observer: impl FnMut(BlockId, &TaintState),
    ) -> Result<FunctionResult> {
        let var_count = self.function.body.vars.len();
        let entry_state = self.seed(var_count);

        self.worklist = (0..self.order.len()).collect();
        let mut visits = 0;

        while let Some(position) = self.worklist.pop_first() {
            if visits >= self.config.max_block_visits {
                warn!(visits, "block visit limit reached");
                return Err(TaintError::NonConvergence {
                    scope: self.function.name().to_string(),
                    iterations: visits,
                });
            }
            visits += 1;

            let block_id = self.order[position];
            self.visit(block_id, &entry_state, var_count);

            if let Some(state) = self.out_states.get(&block_id) {
                observer(block_id, state);
            }

            if std::mem::take(&mut self.memory_changed) {
                for reader in self.memory_readers.clone() {
                    self.enqueue(reader);
                }
            }
        }

        debug!(visits, cells = self.cells.len(), "fixpoint reached");
        Ok(self.finish(&entry_state, var_count, visits))
    }

    fn seed(&mut self, var_count: usize) -> TaintState {
        let mut state = TaintState::new(var_count);
        for (index, &param) in self.function.params().iter().enumerate() {
            let source = TaintValue::single(SourceId(index as u32), TaintKind::DIRECT);
            state.set(param, source.clone());

            if let Some(target) = self.alias.arena().lookup_root(&LocRoot::ParamTarget(index)) {
                self.cells.insert(target, source.clone());
            }
            if self.alias.is_memory_resident(param) {
                let cell = self.alias.var_location(param);
                self.cells.insert(cell, source);
            }
        }
        state
    }

    fn enqueue(&mut self, block: BlockId) {
        if let Some(&position) = self.position.get(&block) {
            self.worklist.insert(position);
        }
    }

    fn visit(&mut self, block_id: BlockId, entry_state: &TaintState, var_count: usize) {
        let function = self.function;
        let Some(block) = function.body.get_block(block_id) else {
            return;
        };

        let mut state = if block_id == self.cfg.entry() {
            entry_state.clone()
        } else {
            TaintState::new(var_count)
        };
        for pred in self.cfg.predecessors(block_id) {
            if let Some(out) = self.out_states.get(pred) {
                state.join(out);
            }
        }

        let control = self.control_taint_of(block_id);
        let widening = self.loop_widening(block_id);
        let depth = if self.recursive_peers.is_empty() {
            TaintValue::bottom()
        } else {
            self.recursion_widening(block_id)
        };

        for inst in &block.instructions {
            self.transfer(inst, &mut state, &control, &widening, &depth);
        }

        match &block.terminator {
            Terminator::Branch { condition, .. } => {
                let data = self.eval(condition, &state);
                if self.branch_taint.entry(block_id).or_default().join(&data) {
                    trace!(block = %block_id, "branch condition taint grew");
                    self.branch_changed(block_id);
                }
            }
            Terminator::Return(Some(value)) => {
                let value = self.eval(value, &state).joined(&control);
                self.return_taint.join(&value);
            }
            _ => {}
        }

        if self.control_taint.entry(block_id).or_default().join(&control) {
            for dependent in self.control.controlled_by(block_id) {
                self.enqueue(dependent);
            }
        }

        let out = self
            .out_states
            .entry(block_id)
            .or_insert_with(|| TaintState::new(var_count));
        if out.join(&state) {
            for succ in self.cfg.successors(block_id).to_vec() {
                self.enqueue(succ);
            }
        }
    }

    fn branch_changed(&mut self, branch: BlockId) {
        for dependent in self.control.controlled_by(branch) {
            self.enqueue(dependent);
        }
        let loop_blocks: Vec<BlockId> = self
            .loops
            .iter()
            .filter(|l| l.exiting.contains(&branch))
            .flat_map(|l| l.blocks.iter().copied())
            .collect();
        for block in loop_blocks {
            self.enqueue(block);
        }
    }

    /// Taint carried by the branches deciding whether `block` runs.
    fn control_taint_of(&self, block: BlockId) -> TaintValue {
        let mut control = TaintValue::bottom();
        for branch in self.control.dependences(block) {
            let mut decided_by = self
                .branch_taint
                .get(branch)
                .cloned()
                .unwrap_or_default();
            if let Some(outer) = self.control_taint.get(branch) {
                decided_by.join(outer);
            }
            control.join(&decided_by.to_indirect());
        }
        control
    }

    /// Full taint from every source that decides how many times an
    /// enclosing loop runs.
    fn loop_widening(&self, block: BlockId) -> TaintValue {
        let mut widening = TaintValue::bottom();
        for l in self.loops.iter().filter(|l| l.blocks.contains(&block)) {
            for exiting in &l.exiting {
                if let Some(trip) = self.branch_taint.get(exiting) {
                    widening.join(&trip.to_full());
                }
            }
        }
        widening
    }

    /// Full taint from the branches guarding `block`, applied to calls back
    /// into the recursive component: they decide the recursion depth.
    fn recursion_widening(&self, block: BlockId) -> TaintValue {
        let mut depth = TaintValue::bottom();
        for branch in self.control.dependences(block) {
            if let Some(guard) = self.branch_taint.get(branch) {
                depth.join(&guard.to_full());
            }
            if let Some(outer) = self.control_taint.get(branch) {
                depth.join(&outer.to_full());
            }
        }
        depth
    }

    fn transfer(
        &mut self,
        inst: &Instruction,
        state: &mut TaintState,
        control: &TaintValue,
        widening: &TaintValue,
        depth: &TaintValue,
    ) {
        match inst {
            Instruction::Assign { dst, expr } => {
                let value = self.eval(expr, state).joined(control).joined(widening);
                self.define(*dst, value, state);
            }
            // Narrowing keeps the low bits, which still depend on the source.
            Instruction::Cast { dst, src, .. } => {
                let value = self.eval(src, state).joined(control).joined(widening);
                self.define(*dst, value, state);
            }
            Instruction::Load { dst, place } => {
                let resolution = self.alias.resolve(place);
                let address = self.address_taint(place, resolution.derefs_base, &resolution.pointer_cells, state);
                let value = self
                    .read_cells(&resolution.targets)
                    .joined(&address.to_indirect())
                    .joined(control)
                    .joined(widening);
                self.define(*dst, value, state);
            }
            Instruction::Store { place, src } => {
                let resolution = self.alias.resolve(place);
                let address = self.address_taint(place, resolution.derefs_base, &resolution.pointer_cells, state);
                let value = self
                    .eval(src, state)
                    .joined(&address.to_indirect())
                    .joined(control);
                for &loc in &resolution.targets {
                    self.write_cell(loc, &value);
                }
            }
            Instruction::Call { dst, callee, args } => {
                self.transfer_call(*dst, callee, args, state, control, widening, depth);
            }
            Instruction::Opaque { touched, reason } => {
                debug!(reason = reason.as_str(), "opaque instruction, assuming full taint");
                let full = self.all_sources.clone();
                for &var in touched {
                    self.define(var, full.clone(), state);
                    for loc in self.alias.expr_targets(&Expr::Var(var)) {
                        self.write_cell(loc, &full);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer_call(
        &mut self,
        dst: Option<VarId>,
        callee: &Callee,
        args: &[Expr],
        state: &mut TaintState,
        control: &TaintValue,
        widening: &TaintValue,
        depth: &TaintValue,
    ) {
        let actuals: Vec<TaintValue> = args
            .iter()
            .map(|arg| {
                let targets = self.alias.expr_targets(arg);
                self.eval(arg, state).joined(&self.read_cells(&targets))
            })
            .collect();

        let summaries = self.summaries;
        let summary = match callee {
            Callee::Direct(name) => summaries.ready(name),
            Callee::Indirect(_) => None,
        };

        let Some(summary) = summary else {
            debug!(callee = ?callee, "unsupported call, assuming full taint");
            let full = self.all_sources.clone();
            if let Some(dst) = dst {
                self.define(dst, full.clone(), state);
            }
            for arg in args {
                for loc in self.alias.expr_targets(arg) {
                    self.write_cell(loc, &full);
                }
            }
            return;
        };

        if let Some(dst) = dst {
            let mut value = summary
                .return_taint
                .substitute(&actuals)
                .joined(control)
                .joined(widening);
            if matches!(callee, Callee::Direct(name) if self.recursive_peers.contains(name)) {
                value.join(depth);
            }
            self.define(dst, value, state);
        }

        for (&index, written) in &summary.out_params {
            let Some(arg) = args.get(index) else {
                continue;
            };
            let value = written.substitute(&actuals).joined(control);
            for loc in self.alias.expr_targets(arg) {
                self.write_cell(loc, &value);
            }
        }
    }

    fn define(&mut self, var: VarId, value: TaintValue, state: &mut TaintState) {
        if self.lives_in_memory(var) {
            let cell = self.alias.var_location(var);
            self.write_cell(cell, &value);
        }
        state.set(var, value);
    }

    /// Scalars whose storage is also reachable through memory.
    fn lives_in_memory(&self, var: VarId) -> bool {
        self.alias.is_memory_resident(var)
            && self
                .function
                .var(var)
                .map_or(false, |v| !v.ty.is_aggregate())
    }

    fn eval(&mut self, expr: &Expr, state: &TaintState) -> TaintValue {
        match expr {
            Expr::Var(var) => {
                let mut value = state.get(*var).clone();
                if self.lives_in_memory(*var) {
                    let cell = self.alias.var_location(*var);
                    value.join(&self.read_cells(&BTreeSet::from([cell])));
                }
                value
            }
            Expr::Const(_) => TaintValue::bottom(),
            Expr::Unary(_, inner) => self.eval(inner, state),
            Expr::Binary(_, left, right) => {
                let left = self.eval(left, state);
                left.joined(&self.eval(right, state))
            }
            Expr::AddrOf(place) => {
                let resolution = self.alias.resolve(place);
                self.address_taint(place, resolution.derefs_base, &resolution.pointer_cells, state)
                    .to_indirect()
            }
        }
    }

    /// Taint of everything read to compute the address of `place`.
    fn address_taint(
        &mut self,
        place: &Place,
        derefs_base: bool,
        pointer_cells: &BTreeSet<LocId>,
        state: &TaintState,
    ) -> TaintValue {
        let mut address = if derefs_base {
            self.eval(&Expr::Var(place.base), state)
        } else {
            TaintValue::bottom()
        };
        address.join(&self.read_cells(pointer_cells));
        for projection in &place.projections {
            if let Projection::Index(index) = projection {
                let index = self.eval(index, state);
                address.join(&index);
            }
        }
        address
    }

    fn read_cells(&self, locations: &BTreeSet<LocId>) -> TaintValue {
        let arena = self.alias.arena();
        let mut value = TaintValue::bottom();
        for (cell, taint) in &self.cells {
            if locations.iter().any(|&loc| arena.overlaps(*cell, loc)) {
                value.join(taint);
            }
        }
        value
    }

    fn write_cell(&mut self, loc: LocId, value: &TaintValue) {
        if value.is_bottom() {
            return;
        }
        if self.cells.entry(loc).or_default().join(value) {
            self.memory_changed = true;
        }

        let location = self.alias.arena().get(loc);
        if let Some(index) = location.param_root() {
            self.param_writes.entry(index).or_default().join(value);
        } else if location.is_unknown() {
            // The caller's memory may be anywhere behind an unknown pointer.
            for (index, &param) in self.function.params().iter().enumerate() {
                if self.alias.points_to(param).is_some() {
                    self.param_writes.entry(index).or_default().join(value);
                }
            }
        }
    }

    fn finish(&mut self, entry_state: &TaintState, var_count: usize, visits: usize) -> FunctionResult {
        let mut var_taint = vec![TaintValue::bottom(); var_count];
        for (var, value) in entry_state.iter() {
            var_taint[var.0 as usize].join(value);
        }
        for state in self.out_states.values() {
            for (var, value) in state.iter() {
                if let Some(slot) = var_taint.get_mut(var.0 as usize) {
                    slot.join(value);
                }
            }
        }

        for index in 0..var_count {
            let var = VarId(index as u32);
            if self.alias.is_memory_resident(var) {
                let cell = self.alias.var_location(var);
                var_taint[index].join(&self.read_cells(&BTreeSet::from([cell])));
            }
        }

        let out_params = std::mem::take(&mut self.param_writes)
            .into_iter()
            .filter(|(_, value)| !value.is_bottom())
            .collect();

        FunctionResult {
            summary: FunctionSummary {
                return_taint: self.return_taint.clone(),
                out_params,
            },
            var_taint,
            block_visits: visits,
        }
    }
}
