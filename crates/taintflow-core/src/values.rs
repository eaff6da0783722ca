use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    /// Offsetting a pointer keeps it inside the same object class.
    pub fn is_pointer_arithmetic(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
    }
}

/// Side-effect free expression tree evaluated by a single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Var(VarId),
    Const(i64),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    AddrOf(Place),
}

impl Expr {
    pub fn var(id: VarId) -> Self {
        Expr::Var(id)
    }

    pub fn constant(value: i64) -> Self {
        Expr::Const(value)
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn addr_of(place: Place) -> Self {
        Expr::AddrOf(place)
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Expr::Const(c) => Some(*c),
            Expr::Unary(UnOp::Neg, inner) => inner.as_const().map(i64::wrapping_neg),
            Expr::Binary(op, l, r) => {
                let (l, r) = (l.as_const()?, r.as_const()?);
                match op {
                    BinOp::Add => Some(l.wrapping_add(r)),
                    BinOp::Sub => Some(l.wrapping_sub(r)),
                    BinOp::Mul => Some(l.wrapping_mul(r)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Every variable whose value is read while evaluating the expression.
    /// Taking an address reads only its index operands.
    pub fn reads(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_reads(&mut out);
        out
    }

    /// Reads plus the root variables of any address taken.
    pub fn mentioned_vars(&self) -> Vec<VarId> {
        let mut out = self.reads();
        self.collect_addr_roots(&mut out);
        out
    }

    fn collect_addr_roots(&self, out: &mut Vec<VarId>) {
        match self {
            Expr::AddrOf(place) => out.push(place.base),
            Expr::Unary(_, e) => e.collect_addr_roots(out),
            Expr::Binary(_, l, r) => {
                l.collect_addr_roots(out);
                r.collect_addr_roots(out);
            }
            Expr::Var(_) | Expr::Const(_) => {}
        }
    }

    fn collect_reads(&self, out: &mut Vec<VarId>) {
        match self {
            Expr::Var(v) => out.push(*v),
            Expr::Const(_) => {}
            Expr::Unary(_, e) => e.collect_reads(out),
            Expr::Binary(_, l, r) => {
                l.collect_reads(out);
                r.collect_reads(out);
            }
            Expr::AddrOf(place) => place.collect_index_reads(out),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Unary(op, e) => write!(f, "{}{}", op.symbol(), e),
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::AddrOf(place) => write!(f, "&{}", place),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    Deref,
    Index(Expr),
    Field(String),
}

/// A memory access path rooted at a variable, e.g. `nodes[i].val` or `p->next`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub base: VarId,
    pub projections: Vec<Projection>,
}

impl Place {
    pub fn var(base: VarId) -> Self {
        Self {
            base,
            projections: Vec::new(),
        }
    }

    pub fn deref(mut self) -> Self {
        self.projections.push(Projection::Deref);
        self
    }

    pub fn index(mut self, index: Expr) -> Self {
        self.projections.push(Projection::Index(index));
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.projections.push(Projection::Field(name.into()));
        self
    }

    /// `p->name`
    pub fn arrow(self, name: impl Into<String>) -> Self {
        self.deref().field(name)
    }

    pub fn is_plain_var(&self) -> bool {
        self.projections.is_empty()
    }

    /// Variables read to compute the address: the base pointer when the path
    /// dereferences, plus every index expression.
    pub fn address_reads(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        if self
            .projections
            .iter()
            .any(|p| matches!(p, Projection::Deref))
        {
            out.push(self.base);
        }
        self.collect_index_reads(&mut out);
        out
    }

    fn collect_index_reads(&self, out: &mut Vec<VarId>) {
        for proj in &self.projections {
            if let Projection::Index(e) = proj {
                e.collect_reads(out);
            }
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = self.base.to_string();
        for proj in &self.projections {
            match proj {
                Projection::Deref => text = format!("(*{})", text),
                Projection::Index(e) => text = format!("{}[{}]", text, e),
                Projection::Field(name) => text = format!("{}.{}", text, name),
            }
        }
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = Expr::binary(BinOp::Add, Expr::constant(4), Expr::constant(5));
        assert_eq!(e.as_const(), Some(9));
        let e = Expr::binary(BinOp::Add, Expr::var(VarId(0)), Expr::constant(5));
        assert_eq!(e.as_const(), None);
        assert_eq!(Expr::unary(UnOp::Neg, Expr::constant(1)).as_const(), Some(-1));
    }

    #[test]
    fn test_reads_include_index_operands() {
        let place = Place::var(VarId(0))
            .index(Expr::var(VarId(1)))
            .field("val");
        let e = Expr::binary(BinOp::Add, Expr::addr_of(place.clone()), Expr::var(VarId(2)));
        assert_eq!(e.reads(), vec![VarId(1), VarId(2)]);
        assert_eq!(place.address_reads(), vec![VarId(1)]);
        assert_eq!(
            Place::var(VarId(3)).arrow("next").address_reads(),
            vec![VarId(3)]
        );
    }
}
