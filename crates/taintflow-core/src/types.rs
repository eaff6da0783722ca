use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int(u16),
    Pointer(Box<Type>),
    Array(Box<Type>, Option<usize>),
    Struct(String),
    Void,
}

impl Type {
    pub fn char() -> Self {
        Type::Int(8)
    }

    pub fn short() -> Self {
        Type::Int(16)
    }

    pub fn int() -> Self {
        Type::Int(32)
    }

    pub fn long_long() -> Self {
        Type::Int(64)
    }

    pub fn pointer_to(ty: Type) -> Self {
        Type::Pointer(Box::new(ty))
    }

    pub fn array_of(ty: Type, len: Option<usize>) -> Self {
        Type::Array(Box::new(ty), len)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Array(_, _) | Type::Struct(_))
    }

    pub fn array_len(&self) -> Option<usize> {
        match self {
            Type::Array(_, len) => *len,
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Pointer(inner) => write!(f, "*{}", inner),
            Type::Array(inner, Some(len)) => write!(f, "[{}; {}]", inner, len),
            Type::Array(inner, None) => write!(f, "[{}]", inner),
            Type::Struct(name) => write!(f, "struct {}", name),
            Type::Void => write!(f, "void"),
        }
    }
}
