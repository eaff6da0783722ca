use crate::types::Type;
use crate::values::{Expr, Place, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    Direct(String),
    /// Call through a function pointer; never resolved.
    Indirect(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Assign {
        dst: VarId,
        expr: Expr,
    },
    Load {
        dst: VarId,
        place: Place,
    },
    Store {
        place: Place,
        src: Expr,
    },
    Cast {
        dst: VarId,
        src: Expr,
        ty: Type,
    },
    Call {
        dst: Option<VarId>,
        callee: Callee,
        args: Vec<Expr>,
    },
    /// A construct the front end could not lower (variable-length array
    /// sizing, inline assembly, ...). Everything it touches is assumed
    /// fully tainted.
    Opaque {
        touched: Vec<VarId>,
        reason: String,
    },
}

impl Instruction {
    /// The scalar variable this instruction defines, if any.
    pub fn defined_var(&self) -> Option<VarId> {
        match self {
            Instruction::Assign { dst, .. }
            | Instruction::Load { dst, .. }
            | Instruction::Cast { dst, .. } => Some(*dst),
            Instruction::Call { dst, .. } => *dst,
            Instruction::Store { .. } | Instruction::Opaque { .. } => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Instruction::Call { .. })
    }

    pub fn direct_callee(&self) -> Option<&str> {
        match self {
            Instruction::Call {
                callee: Callee::Direct(name),
                ..
            } => Some(name),
            _ => None,
        }
    }

    /// Every variable mentioned by the instruction, read or written.
    pub fn mentioned_vars(&self) -> Vec<VarId> {
        let mut vars = Vec::new();
        match self {
            Instruction::Assign { dst, expr } | Instruction::Cast { dst, src: expr, .. } => {
                vars.push(*dst);
                vars.extend(expr.mentioned_vars());
            }
            Instruction::Load { dst, place } => {
                vars.push(*dst);
                vars.push(place.base);
                vars.extend(place.address_reads());
            }
            Instruction::Store { place, src } => {
                vars.push(place.base);
                vars.extend(place.address_reads());
                vars.extend(src.mentioned_vars());
            }
            Instruction::Call { dst, callee, args } => {
                vars.extend(dst.iter().copied());
                if let Callee::Indirect(target) = callee {
                    vars.extend(target.mentioned_vars());
                }
                for arg in args {
                    vars.extend(arg.mentioned_vars());
                }
            }
            Instruction::Opaque { touched, .. } => vars.extend(touched.iter().copied()),
        }
        vars
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Assign { dst, expr } => write!(f, "{} = {}", dst, expr),
            Instruction::Load { dst, place } => write!(f, "{} = load {}", dst, place),
            Instruction::Store { place, src } => write!(f, "store {}, {}", place, src),
            Instruction::Cast { dst, src, ty } => write!(f, "{} = cast<{}> {}", dst, ty, src),
            Instruction::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    write!(f, "{} = ", dst)?;
                }
                match callee {
                    Callee::Direct(name) => write!(f, "call {}(", name)?,
                    Callee::Indirect(target) => write!(f, "call *{}(", target)?,
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Instruction::Opaque { reason, .. } => write!(f, "opaque \"{}\"", reason),
        }
    }
}
