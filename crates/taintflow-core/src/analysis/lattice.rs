//! The taint value domain.
//!
//! A [`TaintValue`] maps each source to the kinds of dependence observed on
//! it. Join is pointwise union, so a variable can be directly tainted by one
//! source and only indirectly by another. The four-tier view used in reports
//! is the projection [`TaintValue::tier`].

use crate::values::VarId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct TaintKind: u8 {
        /// Reached through expression evaluation.
        const DIRECT = 0b001;
        /// Reached because execution depended on the source.
        const INDIRECT = 0b010;
        /// The source controls how many times the value was recomputed.
        const FULL = 0b100;
    }
}

impl TaintKind {
    pub fn tier(self) -> Tier {
        if self.contains(TaintKind::FULL) {
            Tier::Full
        } else if self.contains(TaintKind::INDIRECT) {
            Tier::Indirect
        } else if self.contains(TaintKind::DIRECT) {
            Tier::Direct
        } else {
            Tier::None
        }
    }

    /// Control or address dependence on a value of this kind.
    pub fn to_indirect(self) -> TaintKind {
        let mut out = TaintKind::empty();
        if self.intersects(TaintKind::DIRECT | TaintKind::INDIRECT) {
            out |= TaintKind::INDIRECT;
        }
        if self.contains(TaintKind::FULL) {
            out |= TaintKind::FULL;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    None,
    Direct,
    Indirect,
    Full,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Tier::None => "None",
            Tier::Direct => "Direct",
            Tier::Indirect => "Indirect",
            Tier::Full => "Full",
        };
        write!(f, "{}", text)
    }
}

/// Index of a formal parameter of the function being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl SourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintValue {
    sources: BTreeMap<SourceId, TaintKind>,
}

impl TaintValue {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn single(source: SourceId, kind: TaintKind) -> Self {
        let mut value = Self::bottom();
        if !kind.is_empty() {
            value.sources.insert(source, kind);
        }
        value
    }

    /// Every listed source at `FULL`.
    pub fn top(sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|s| (s, TaintKind::FULL))
                .collect(),
        }
    }

    pub fn is_bottom(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn kind_of(&self, source: SourceId) -> TaintKind {
        self.sources
            .get(&source)
            .copied()
            .unwrap_or_else(TaintKind::empty)
    }

    pub fn has(&self, source: SourceId, kind: TaintKind) -> bool {
        self.kind_of(source).contains(kind)
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (SourceId, TaintKind)> + '_ {
        self.sources.iter().map(|(s, k)| (*s, *k))
    }

    pub fn tier(&self) -> Tier {
        self.sources
            .values()
            .map(|k| k.tier())
            .max()
            .unwrap_or(Tier::None)
    }

    pub fn add(&mut self, source: SourceId, kind: TaintKind) -> bool {
        if kind.is_empty() {
            return false;
        }
        let entry = self.sources.entry(source).or_insert_with(TaintKind::empty);
        let before = *entry;
        *entry |= kind;
        *entry != before
    }

    /// Least upper bound, in place. Returns whether `self` grew.
    pub fn join(&mut self, other: &TaintValue) -> bool {
        let mut changed = false;
        for (&source, &kind) in &other.sources {
            changed |= self.add(source, kind);
        }
        changed
    }

    pub fn joined(mut self, other: &TaintValue) -> TaintValue {
        self.join(other);
        self
    }

    /// Partial order of the lattice.
    pub fn leq(&self, other: &TaintValue) -> bool {
        self.sources
            .iter()
            .all(|(s, k)| other.kind_of(*s).contains(*k))
    }

    pub fn to_indirect(&self) -> TaintValue {
        self.map_kinds(TaintKind::to_indirect)
    }

    pub fn to_full(&self) -> TaintValue {
        self.map_kinds(|_| TaintKind::FULL)
    }

    pub fn retain_sources(&mut self, mut keep: impl FnMut(SourceId) -> bool) {
        self.sources.retain(|s, _| keep(*s));
    }

    /// Rewrites a value expressed over a callee's formals into the caller's
    /// sources, given the taint of each actual argument.
    pub fn substitute(&self, actuals: &[TaintValue]) -> TaintValue {
        let mut out = TaintValue::bottom();
        for (&formal, &kind) in &self.sources {
            let Some(actual) = actuals.get(formal.index()) else {
                continue;
            };
            if kind.contains(TaintKind::DIRECT) {
                out.join(actual);
            }
            if kind.contains(TaintKind::INDIRECT) {
                out.join(&actual.to_indirect());
            }
            if kind.contains(TaintKind::FULL) {
                out.join(&actual.to_full());
            }
        }
        out
    }

    fn map_kinds(&self, f: impl Fn(TaintKind) -> TaintKind) -> TaintValue {
        Self {
            sources: self
                .sources
                .iter()
                .map(|(s, k)| (*s, f(*k)))
                .filter(|(_, k)| !k.is_empty())
                .collect(),
        }
    }
}

/// Taint of every scalar variable at one program point, indexed by [`VarId`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaintState {
    vars: Vec<TaintValue>,
}

impl TaintState {
    pub fn new(var_count: usize) -> Self {
        Self {
            vars: vec![TaintValue::bottom(); var_count],
        }
    }

    pub fn get(&self, var: VarId) -> &TaintValue {
        static BOTTOM: TaintValue = TaintValue {
            sources: BTreeMap::new(),
        };
        self.vars.get(var.0 as usize).unwrap_or(&BOTTOM)
    }

    pub fn set(&mut self, var: VarId, value: TaintValue) {
        if let Some(slot) = self.vars.get_mut(var.0 as usize) {
            *slot = value;
        }
    }

    pub fn join(&mut self, other: &TaintState) -> bool {
        if self.vars.len() < other.vars.len() {
            self.vars.resize(other.vars.len(), TaintValue::bottom());
        }
        let mut changed = false;
        for (slot, value) in self.vars.iter_mut().zip(&other.vars) {
            changed |= slot.join(value);
        }
        changed
    }

    pub fn leq(&self, other: &TaintState) -> bool {
        self.vars
            .iter()
            .enumerate()
            .all(|(i, v)| v.leq(other.get(VarId(i as u32))))
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &TaintValue)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId(i as u32), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: SourceId = SourceId(0);
    const B: SourceId = SourceId(1);

    #[test]
    fn test_join_is_pointwise_union() {
        let mut x = TaintValue::single(A, TaintKind::DIRECT);
        assert!(x.join(&TaintValue::single(B, TaintKind::INDIRECT)));
        assert!(!x.join(&TaintValue::single(A, TaintKind::DIRECT)));

        assert!(x.has(A, TaintKind::DIRECT));
        assert!(!x.has(A, TaintKind::INDIRECT));
        assert!(x.has(B, TaintKind::INDIRECT));
        assert_eq!(x.tier(), Tier::Indirect);
    }

    #[test]
    fn test_tier_order() {
        assert!(Tier::None < Tier::Direct);
        assert!(Tier::Direct < Tier::Indirect);
        assert!(Tier::Indirect < Tier::Full);
        assert_eq!(TaintValue::bottom().tier(), Tier::None);
        assert_eq!((TaintKind::DIRECT | TaintKind::FULL).tier(), Tier::Full);
    }

    #[test]
    fn test_control_conversion_keeps_full() {
        let v = TaintValue::single(A, TaintKind::DIRECT)
            .joined(&TaintValue::single(B, TaintKind::FULL));
        let c = v.to_indirect();
        assert_eq!(c.kind_of(A), TaintKind::INDIRECT);
        assert_eq!(c.kind_of(B), TaintKind::FULL);
    }

    #[test]
    fn test_full_promotes_every_kind() {
        let v = TaintValue::single(A, TaintKind::INDIRECT)
            .joined(&TaintValue::single(B, TaintKind::DIRECT));
        let f = v.to_full();
        assert_eq!(f.kind_of(A), TaintKind::FULL);
        assert_eq!(f.kind_of(B), TaintKind::FULL);
    }

    #[test]
    fn test_substitute_maps_formals_to_actuals() {
        // summary: return = Direct(formal 0) + Indirect(formal 1)
        let summary = TaintValue::single(SourceId(0), TaintKind::DIRECT)
            .joined(&TaintValue::single(SourceId(1), TaintKind::INDIRECT));
        let caller_n = SourceId(5);
        let actuals = vec![
            TaintValue::single(caller_n, TaintKind::DIRECT),
            TaintValue::single(caller_n, TaintKind::DIRECT),
        ];
        let result = summary.substitute(&actuals);
        assert_eq!(
            result.kind_of(caller_n),
            TaintKind::DIRECT | TaintKind::INDIRECT
        );

        let untainted_actuals = vec![TaintValue::bottom(), TaintValue::bottom()];
        assert!(summary.substitute(&untainted_actuals).is_bottom());
    }

    #[test]
    fn test_leq() {
        let small = TaintValue::single(A, TaintKind::DIRECT);
        let big = small.clone().joined(&TaintValue::single(A, TaintKind::FULL));
        assert!(small.leq(&big));
        assert!(!big.leq(&small));
        assert!(TaintValue::bottom().leq(&small));
    }

    #[test]
    fn test_state_join() {
        let mut s1 = TaintState::new(2);
        let mut s2 = TaintState::new(2);
        s2.set(VarId(1), TaintValue::single(A, TaintKind::DIRECT));
        assert!(s1.join(&s2));
        assert!(!s1.join(&s2));
        assert!(s2.leq(&s1));
        assert!(s1.get(VarId(9)).is_bottom());
    }
}
