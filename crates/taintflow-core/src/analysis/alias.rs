//! Abstract memory locations and flow-insensitive points-to sets.
//!
//! Every access path in a function resolves to a set of [`LocId`]s in a
//! per-function [`LocationArena`]. Locations are rooted at a variable, at the
//! object a pointer parameter refers to, or at the single `Unknown` location,
//! and refined by index and field projections. Array elements are kept apart
//! only for constant indices; everything else falls into the array's summary
//! element.

use crate::{
    block::Terminator,
    config::AnalysisConfig,
    function::Function,
    instructions::{Callee, Instruction},
    types::Type,
    values::{Expr, Place, Projection, VarId},
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocId(u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocRoot {
    Var(VarId),
    /// Whatever pointer parameter `i` points to on entry.
    ParamTarget(usize),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocProjection {
    /// `None` is the summary element standing for every non-constant index.
    Index(Option<u64>),
    Field(String),
}

impl LocProjection {
    fn compatible(&self, other: &LocProjection) -> bool {
        match (self, other) {
            (LocProjection::Index(a), LocProjection::Index(b)) => {
                a.is_none() || b.is_none() || a == b
            }
            (LocProjection::Field(a), LocProjection::Field(b)) => a == b,
            // Same bytes reached through a differently typed path.
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryLocation {
    pub root: LocRoot,
    pub path: Vec<LocProjection>,
    pub parent: Option<LocId>,
    pub ty: Option<Type>,
}

impl MemoryLocation {
    pub fn is_unknown(&self) -> bool {
        self.root == LocRoot::Unknown
    }

    pub fn param_root(&self) -> Option<usize> {
        match self.root {
            LocRoot::ParamTarget(index) => Some(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationArena {
    locations: Vec<MemoryLocation>,
    index: HashMap<(LocRoot, Vec<LocProjection>), LocId>,
    max_depth: usize,
}

impl LocationArena {
    pub fn new(max_depth: usize) -> Self {
        let mut arena = Self {
            locations: Vec::new(),
            index: HashMap::new(),
            max_depth,
        };
        arena.intern(LocRoot::Unknown, Vec::new(), None, None);
        arena
    }

    pub fn unknown(&self) -> LocId {
        LocId(0)
    }

    pub fn get(&self, id: LocId) -> &MemoryLocation {
        &self.locations[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = LocId> {
        (0..self.locations.len() as u32).map(LocId)
    }

    pub fn lookup_root(&self, root: &LocRoot) -> Option<LocId> {
        self.index.get(&(root.clone(), Vec::new())).copied()
    }

    pub fn root(&mut self, root: LocRoot, ty: Option<Type>) -> LocId {
        if root == LocRoot::Unknown {
            return self.unknown();
        }
        self.intern(root, Vec::new(), None, ty)
    }

    /// Projection of `parent`. Paths past the depth limit fold into the
    /// parent, and nothing below `Unknown` is distinguished.
    pub fn child(&mut self, parent: LocId, projection: LocProjection, ty: Option<Type>) -> LocId {
        let location = self.get(parent);
        if location.is_unknown() || location.path.len() >= self.max_depth {
            return parent;
        }
        let root = location.root.clone();
        let mut path = location.path.clone();
        path.push(projection);
        self.intern(root, path, Some(parent), ty)
    }

    fn intern(
        &mut self,
        root: LocRoot,
        path: Vec<LocProjection>,
        parent: Option<LocId>,
        ty: Option<Type>,
    ) -> LocId {
        let key = (root, path);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = LocId(self.locations.len() as u32);
        self.locations.push(MemoryLocation {
            root: key.0.clone(),
            path: key.1.clone(),
            parent,
            ty,
        });
        self.index.insert(key, id);
        id
    }

    pub fn overlaps(&self, a: LocId, b: LocId) -> bool {
        if a == b {
            return true;
        }
        let (la, lb) = (self.get(a), self.get(b));
        if la.is_unknown() || lb.is_unknown() {
            return true;
        }
        la.root == lb.root
            && la
                .path
                .iter()
                .zip(&lb.path)
                .all(|(pa, pb)| pa.compatible(pb))
    }

    /// Human readable access path, e.g. `nodes[*].next`.
    pub fn describe(&self, id: LocId, function: &Function) -> String {
        let location = self.get(id);
        let mut text = match &location.root {
            LocRoot::Var(var) => function.var_name(*var).to_string(),
            LocRoot::ParamTarget(index) => {
                let name = function
                    .params()
                    .get(*index)
                    .map(|&p| function.var_name(p))
                    .unwrap_or("?");
                format!("*{}", name)
            }
            LocRoot::Unknown => "<unknown>".to_string(),
        };
        for projection in &location.path {
            match projection {
                LocProjection::Index(Some(i)) => text.push_str(&format!("[{}]", i)),
                LocProjection::Index(None) => text.push_str("[*]"),
                LocProjection::Field(name) => text.push_str(&format!(".{}", name)),
            }
        }
        text
    }
}

impl fmt::Display for LocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc{}", self.0)
    }
}

/// Where an access path lands, plus what was read to compute the address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub targets: BTreeSet<LocId>,
    /// Memory cells holding pointers that were followed on the way.
    pub pointer_cells: BTreeSet<LocId>,
    /// The base variable's value was used as a pointer.
    pub derefs_base: bool,
}

enum Cursor {
    Scalar(VarId),
    Locations(BTreeSet<LocId>),
}

#[derive(Debug, Clone)]
pub struct AliasAnalysis {
    arena: LocationArena,
    var_points_to: HashMap<VarId, BTreeSet<LocId>>,
    cell_points_to: HashMap<LocId, BTreeSet<LocId>>,
    var_types: Vec<Type>,
    max_tracked_index: u64,
}

impl AliasAnalysis {
    /// Runs subset propagation over every instruction of `function` until the
    /// points-to sets stop growing.
    pub fn analyze(function: &Function, config: &AnalysisConfig) -> Self {
        let mut analysis = Self {
            arena: LocationArena::new(config.max_path_depth),
            var_points_to: HashMap::new(),
            cell_points_to: HashMap::new(),
            var_types: function.vars().map(|v| v.ty.clone()).collect(),
            max_tracked_index: config.max_tracked_index,
        };

        for (index, &param) in function.params().iter().enumerate() {
            let ty = analysis.var_type(param).cloned();
            let pointee = match ty {
                Some(Type::Pointer(inner)) => Some(*inner),
                Some(Type::Array(inner, _)) => Some(*inner),
                _ => continue,
            };
            let target = analysis.arena.root(LocRoot::ParamTarget(index), pointee);
            analysis
                .var_points_to
                .entry(param)
                .or_default()
                .insert(target);
        }

        analysis.register_places(function);

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for block in function.body.blocks.values() {
                for inst in &block.instructions {
                    changed |= analysis.propagate(inst);
                }
            }
            if !changed {
                break;
            }
        }

        trace!(
            function = function.name(),
            rounds,
            locations = analysis.arena.len(),
            "points-to sets stable"
        );
        analysis
    }

    /// Names the storage of every place the function mentions, so the set of
    /// memory-resident variables is known before any taint flows.
    fn register_places(&mut self, function: &Function) {
        for block in function.body.blocks.values() {
            for inst in &block.instructions {
                match inst {
                    Instruction::Load { place, .. } => {
                        self.resolve(place);
                    }
                    Instruction::Store { place, src } => {
                        self.resolve(place);
                        self.register_addr_of(src);
                    }
                    Instruction::Assign { expr, .. } | Instruction::Cast { src: expr, .. } => {
                        self.register_addr_of(expr);
                    }
                    Instruction::Call { callee, args, .. } => {
                        if let Callee::Indirect(target) = callee {
                            self.register_addr_of(target);
                        }
                        for arg in args {
                            self.register_addr_of(arg);
                        }
                    }
                    Instruction::Opaque { .. } => {}
                }
            }
            if let Terminator::Branch { condition: e, .. } | Terminator::Return(Some(e)) =
                &block.terminator
            {
                self.register_addr_of(e);
            }
        }
    }

    fn register_addr_of(&mut self, expr: &Expr) {
        match expr {
            Expr::AddrOf(place) => {
                self.resolve(place);
            }
            Expr::Unary(_, inner) => self.register_addr_of(inner),
            Expr::Binary(_, left, right) => {
                self.register_addr_of(left);
                self.register_addr_of(right);
            }
            Expr::Var(_) | Expr::Const(_) => {}
        }
    }

    fn propagate(&mut self, inst: &Instruction) -> bool {
        match inst {
            Instruction::Assign { dst, expr } | Instruction::Cast { dst, src: expr, .. } => {
                if !self.is_pointer_var(*dst) {
                    return false;
                }
                let targets = self.expr_targets(expr);
                self.add_var_targets(*dst, targets)
            }
            Instruction::Load { dst, place } => {
                if !self.is_pointer_var(*dst) {
                    return false;
                }
                let resolution = self.resolve(place);
                let mut targets = BTreeSet::new();
                for loc in resolution.targets {
                    targets.extend(self.stored_targets(loc, false));
                }
                self.add_var_targets(*dst, targets)
            }
            Instruction::Store { place, src } => {
                let stored = self.expr_targets(src);
                if stored.is_empty() {
                    return false;
                }
                let resolution = self.resolve(place);
                let mut changed = false;
                for loc in resolution.targets {
                    let cell = self.cell_points_to.entry(loc).or_default();
                    let before = cell.len();
                    cell.extend(stored.iter().copied());
                    changed |= cell.len() != before;
                }
                changed
            }
            Instruction::Call { dst: Some(dst), .. } if self.is_pointer_var(*dst) => {
                let unknown = self.arena.unknown();
                self.add_var_targets(*dst, BTreeSet::from([unknown]))
            }
            Instruction::Opaque { touched, .. } => {
                let unknown = self.arena.unknown();
                let mut changed = false;
                for &var in touched {
                    if self.is_pointer_var(var) {
                        changed |= self.add_var_targets(var, BTreeSet::from([unknown]));
                    }
                }
                changed
            }
            Instruction::Call { .. } => false,
        }
    }

    fn add_var_targets(&mut self, var: VarId, targets: BTreeSet<LocId>) -> bool {
        if targets.is_empty() {
            return false;
        }
        let set = self.var_points_to.entry(var).or_default();
        let before = set.len();
        set.extend(targets);
        set.len() != before
    }

    pub fn arena(&self) -> &LocationArena {
        &self.arena
    }

    fn var_type(&self, var: VarId) -> Option<&Type> {
        self.var_types.get(var.0 as usize)
    }

    fn is_pointer_var(&self, var: VarId) -> bool {
        self.var_type(var).map_or(false, Type::is_pointer)
    }

    fn is_array_var(&self, var: VarId) -> bool {
        matches!(self.var_type(var), Some(Type::Array(_, _)))
    }

    pub fn var_location(&mut self, var: VarId) -> LocId {
        let ty = self.var_type(var).cloned();
        self.arena.root(LocRoot::Var(var), ty)
    }

    /// A scalar lives in memory once its storage is named by some access
    /// path (its address is taken, or it is loaded or stored directly).
    pub fn is_memory_resident(&self, var: VarId) -> bool {
        self.arena.lookup_root(&LocRoot::Var(var)).is_some()
    }

    pub fn points_to(&self, var: VarId) -> Option<&BTreeSet<LocId>> {
        self.var_points_to.get(&var)
    }

    /// Locations a pointer-valued expression may refer to. Empty when the
    /// expression carries no known address.
    pub fn expr_targets(&mut self, expr: &Expr) -> BTreeSet<LocId> {
        match expr {
            Expr::Var(var) if self.is_array_var(*var) => {
                BTreeSet::from([self.var_location(*var)])
            }
            Expr::Var(var) => self.var_points_to.get(var).cloned().unwrap_or_default(),
            Expr::AddrOf(place) => self.resolve(place).targets,
            Expr::Binary(op, left, right) if op.is_pointer_arithmetic() => {
                let mut bases = self.expr_targets(left);
                bases.extend(self.expr_targets(right));
                bases
                    .into_iter()
                    .map(|loc| self.shifted(loc))
                    .collect()
            }
            Expr::Binary(..) | Expr::Unary(..) | Expr::Const(_) => BTreeSet::new(),
        }
    }

    /// Pointer stored in `loc`. Memory reached through a pointer parameter
    /// stays inside that parameter's object when nothing better is known.
    fn stored_targets(&mut self, loc: LocId, or_unknown: bool) -> BTreeSet<LocId> {
        let location = self.arena.get(loc).clone();
        if location.is_unknown() {
            return BTreeSet::from([self.arena.unknown()]);
        }

        let mut targets = BTreeSet::new();
        for (cell, pointees) in &self.cell_points_to {
            if self.arena.overlaps(*cell, loc) {
                targets.extend(pointees.iter().copied());
            }
        }

        if targets.is_empty() {
            if let Some(index) = location.param_root() {
                targets.insert(self.arena.root(LocRoot::ParamTarget(index), None));
            } else if or_unknown {
                targets.insert(self.arena.unknown());
            }
        }
        targets
    }

    fn deref_var(&mut self, var: VarId) -> BTreeSet<LocId> {
        let targets = self.expr_targets(&Expr::Var(var));
        if targets.is_empty() {
            BTreeSet::from([self.arena.unknown()])
        } else {
            targets
        }
    }

    /// The summary element next to `loc`, as reached by pointer arithmetic.
    fn shifted(&mut self, loc: LocId) -> LocId {
        let location = self.arena.get(loc);
        let ty = location.ty.clone();
        match (location.path.last().cloned(), location.parent) {
            (Some(LocProjection::Index(_)), Some(parent)) => {
                self.arena.child(parent, LocProjection::Index(None), ty)
            }
            _ => self.index_child(loc, None),
        }
    }

    /// `target[index]` where `target` is what a pointer refers to.
    fn offset(&mut self, target: LocId, index: &Expr) -> LocId {
        let location = self.arena.get(target);
        let ty = location.ty.clone();
        let constant = index.as_const();
        match (location.path.last().cloned(), location.parent) {
            (Some(LocProjection::Index(current)), Some(parent)) => match (current, constant) {
                (_, Some(0)) => target,
                (Some(current), Some(delta)) => {
                    let element = (current as i64).checked_add(delta);
                    self.index_child(parent, element)
                }
                _ => self.arena.child(parent, LocProjection::Index(None), ty),
            },
            _ => self.index_child(target, constant),
        }
    }

    fn index_child(&mut self, parent: LocId, constant: Option<i64>) -> LocId {
        let parent_ty = self.arena.get(parent).ty.clone();
        let bound = parent_ty.as_ref().and_then(Type::array_len);
        let element_ty = match parent_ty {
            Some(Type::Array(inner, _)) => Some(*inner),
            _ => None,
        };

        let projection = match constant {
            Some(c) if c < 0 => return self.arena.unknown(),
            Some(c) => match bound {
                Some(len) if c as u64 >= len as u64 => return self.arena.unknown(),
                None if c as u64 >= self.max_tracked_index => LocProjection::Index(None),
                _ => LocProjection::Index(Some(c as u64)),
            },
            None => LocProjection::Index(None),
        };
        self.arena.child(parent, projection, element_ty)
    }

    pub fn resolve(&mut self, place: &Place) -> Resolution {
        let mut resolution = Resolution::default();
        let mut cursor = Cursor::Scalar(place.base);

        for projection in &place.projections {
            cursor = match (cursor, projection) {
                (Cursor::Scalar(var), Projection::Deref) => {
                    resolution.derefs_base = true;
                    Cursor::Locations(self.deref_var(var))
                }
                (Cursor::Scalar(var), Projection::Index(index)) if self.is_pointer_var(var) => {
                    resolution.derefs_base = true;
                    let targets = self.deref_var(var);
                    Cursor::Locations(
                        targets
                            .into_iter()
                            .map(|t| self.offset(t, index))
                            .collect(),
                    )
                }
                (Cursor::Scalar(var), Projection::Index(index)) => {
                    let base = self.var_location(var);
                    Cursor::Locations(BTreeSet::from([self.index_child(base, index.as_const())]))
                }
                (Cursor::Scalar(var), Projection::Field(name)) => {
                    let base = self.var_location(var);
                    let field = self
                        .arena
                        .child(base, LocProjection::Field(name.clone()), None);
                    Cursor::Locations(BTreeSet::from([field]))
                }
                (Cursor::Locations(locs), Projection::Deref) => {
                    let mut targets = BTreeSet::new();
                    for loc in locs {
                        resolution.pointer_cells.insert(loc);
                        targets.extend(self.stored_targets(loc, true));
                    }
                    Cursor::Locations(targets)
                }
                (Cursor::Locations(locs), Projection::Index(index)) => {
                    let mut targets = BTreeSet::new();
                    for loc in locs {
                        let holds_pointer =
                            self.arena.get(loc).ty.as_ref().map_or(false, Type::is_pointer);
                        if holds_pointer {
                            resolution.pointer_cells.insert(loc);
                            for target in self.stored_targets(loc, true) {
                                targets.insert(self.offset(target, index));
                            }
                        } else {
                            targets.insert(self.index_child(loc, index.as_const()));
                        }
                    }
                    Cursor::Locations(targets)
                }
                (Cursor::Locations(locs), Projection::Field(name)) => Cursor::Locations(
                    locs.into_iter()
                        .map(|loc| {
                            self.arena
                                .child(loc, LocProjection::Field(name.clone()), None)
                        })
                        .collect(),
                ),
            };
        }

        resolution.targets = match cursor {
            Cursor::Scalar(var) => BTreeSet::from([self.var_location(var)]),
            Cursor::Locations(locs) => locs,
        };
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::values::BinOp;
    use pretty_assertions::assert_eq;

    fn describe_all(analysis: &AliasAnalysis, function: &Function, locs: &BTreeSet<LocId>) -> Vec<String> {
        let mut names: Vec<String> = locs
            .iter()
            .map(|&l| analysis.arena().describe(l, function))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_constant_and_summary_elements() {
        let mut arena = LocationArena::new(4);
        let arr = arena.root(LocRoot::Var(VarId(0)), Some(Type::array_of(Type::int(), Some(4))));
        let e0 = arena.child(arr, LocProjection::Index(Some(0)), None);
        let e1 = arena.child(arr, LocProjection::Index(Some(1)), None);
        let any = arena.child(arr, LocProjection::Index(None), None);
        let other = arena.root(LocRoot::Var(VarId(1)), None);

        assert!(!arena.overlaps(e0, e1));
        assert!(arena.overlaps(e0, any));
        assert!(arena.overlaps(arr, e1));
        assert!(!arena.overlaps(arr, other));
        assert!(arena.overlaps(arena.unknown(), other));
        assert_eq!(arena.child(arena.unknown(), LocProjection::Index(Some(2)), None), arena.unknown());
    }

    #[test]
    fn test_fields_are_distinct() {
        let mut arena = LocationArena::new(4);
        let s = arena.root(LocRoot::Var(VarId(0)), None);
        let val = arena.child(s, LocProjection::Field("val".into()), None);
        let next = arena.child(s, LocProjection::Field("next".into()), None);
        assert!(!arena.overlaps(val, next));
        assert!(arena.overlaps(s, next));
    }

    #[test]
    fn test_depth_limit_folds_into_parent() {
        let mut arena = LocationArena::new(1);
        let s = arena.root(LocRoot::Var(VarId(0)), None);
        let f = arena.child(s, LocProjection::Field("a".into()), None);
        let g = arena.child(f, LocProjection::Field("b".into()), None);
        assert_eq!(f, g);
    }

    #[test]
    fn test_points_to_through_memory() {
        // nodes: [node; 4]; p: *node
        // store nodes[i].next, &nodes[i + 1]
        // p = &nodes[0]
        // p = load p->next
        let mut builder = ProgramBuilder::new();
        let mut f = builder.function("walk");
        let i = f.param("i", Type::int());
        let nodes = f.local(
            "nodes",
            Type::array_of(Type::Struct("node".into()), Some(4)),
        );
        let node_ptr = Type::pointer_to(Type::Struct("node".into()));
        let p = f.local("p", node_ptr);

        let mut entry = f.entry_block();
        entry.store(
            Place::var(nodes).index(Expr::var(i)).field("next"),
            Expr::addr_of(Place::var(nodes).index(Expr::binary(
                BinOp::Add,
                Expr::var(i),
                Expr::constant(1),
            ))),
        );
        entry.assign(p, Expr::addr_of(Place::var(nodes).index(Expr::constant(0))));
        entry.load(p, Place::var(p).arrow("next"));
        entry.return_void().unwrap();

        let function = f.current_function().clone();
        let analysis = AliasAnalysis::analyze(&function, &AnalysisConfig::default());

        assert_eq!(
            describe_all(&analysis, &function, analysis.points_to(p).unwrap()),
            vec!["nodes[*]".to_string(), "nodes[0]".to_string()]
        );
        assert!(analysis.is_memory_resident(nodes));
        assert!(!analysis.is_memory_resident(i));
    }

    #[test]
    fn test_out_of_bounds_index_is_unknown() {
        let mut builder = ProgramBuilder::new();
        let mut f = builder.function("f");
        let arr = f.local("arr", Type::array_of(Type::int(), Some(4)));
        f.entry_block().return_void().unwrap();
        let function = f.current_function().clone();

        let mut analysis = AliasAnalysis::analyze(&function, &AnalysisConfig::default());
        let inside = analysis.resolve(&Place::var(arr).index(Expr::constant(3)));
        let outside = analysis.resolve(&Place::var(arr).index(Expr::constant(4)));

        assert_eq!(
            describe_all(&analysis, &function, &inside.targets),
            vec!["arr[3]".to_string()]
        );
        assert_eq!(
            outside.targets,
            BTreeSet::from([analysis.arena().unknown()])
        );
    }

    #[test]
    fn test_pointer_parameter_indexing() {
        let mut builder = ProgramBuilder::new();
        let mut f = builder.function("sum");
        let a = f.param("a", Type::pointer_to(Type::int()));
        let i = f.local("i", Type::int());
        f.entry_block().return_void().unwrap();
        let function = f.current_function().clone();

        let mut analysis = AliasAnalysis::analyze(&function, &AnalysisConfig::default());
        let element = analysis.resolve(&Place::var(a).index(Expr::var(i)));
        assert!(element.derefs_base);
        assert_eq!(
            describe_all(&analysis, &function, &element.targets),
            vec!["*a[*]".to_string()]
        );

        let field = analysis.resolve(&Place::var(a).arrow("next").deref());
        assert_eq!(field.pointer_cells.len(), 1);
        assert_eq!(
            describe_all(&analysis, &function, &field.targets),
            vec!["*a".to_string()]
        );
    }
}
