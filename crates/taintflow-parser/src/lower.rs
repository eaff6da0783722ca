//! Lowering from the pest parse tree to a [`Program`].

use crate::Rule;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use std::collections::HashMap;
use std::sync::OnceLock;
use taintflow_core::{
    builder::{BlockBuilder, ProgramBuilder},
    BinOp, BlockId, Expr, Place, Program, TaintError, Type, UnOp, VarId,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LowerError {
    #[error("{function}: line {line}: unknown variable {name}")]
    UnknownVariable {
        function: String,
        name: String,
        line: usize,
    },
    #[error("{function}: line {line}: unknown block {label}")]
    UnknownBlock {
        function: String,
        label: String,
        line: usize,
    },
    #[error("{function}: {name} is declared more than once")]
    DuplicateVariable { function: String, name: String },
    #[error("{function}: block {label} is defined more than once")]
    DuplicateBlock { function: String, label: String },
    #[error("line {line}: integer literal {text} is out of range")]
    IntegerOutOfRange { text: String, line: usize },
    #[error("line {line}: unexpected {rule:?}")]
    Unexpected { rule: Rule, line: usize },
    #[error(transparent)]
    Ir(#[from] TaintError),
}

pub type LowerResult<T> = Result<T, LowerError>;

fn unexpected(pair: &Pair<'_, Rule>) -> LowerError {
    LowerError::Unexpected {
        rule: pair.as_rule(),
        line: pair.line_col().0,
    }
}

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::lor, Assoc::Left))
            .op(Op::infix(Rule::land, Assoc::Left))
            .op(Op::infix(Rule::bor, Assoc::Left))
            .op(Op::infix(Rule::bxor, Assoc::Left))
            .op(Op::infix(Rule::band, Assoc::Left))
            .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
            .op(Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left))
            .op(Op::infix(Rule::shl, Assoc::Left) | Op::infix(Rule::shr, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left))
            .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not) | Op::prefix(Rule::bitnot))
    })
}

fn binary_op(rule: Rule) -> Option<BinOp> {
    Some(match rule {
        Rule::lor => BinOp::LogicalOr,
        Rule::land => BinOp::LogicalAnd,
        Rule::bor => BinOp::Or,
        Rule::bxor => BinOp::Xor,
        Rule::band => BinOp::And,
        Rule::eq => BinOp::Eq,
        Rule::ne => BinOp::Ne,
        Rule::lt => BinOp::Lt,
        Rule::le => BinOp::Le,
        Rule::gt => BinOp::Gt,
        Rule::ge => BinOp::Ge,
        Rule::shl => BinOp::Shl,
        Rule::shr => BinOp::Shr,
        Rule::add => BinOp::Add,
        Rule::sub => BinOp::Sub,
        Rule::mul => BinOp::Mul,
        Rule::div => BinOp::Div,
        Rule::rem => BinOp::Rem,
        _ => return None,
    })
}

fn unary_op(rule: Rule) -> Option<UnOp> {
    match rule {
        Rule::neg => Some(UnOp::Neg),
        Rule::not => Some(UnOp::Not),
        Rule::bitnot => Some(UnOp::BitNot),
        _ => None,
    }
}

/// Lowers a `program` pair into a [`Program`].
pub fn lower_program(pair: Pair<'_, Rule>) -> LowerResult<Program> {
    let mut builder = ProgramBuilder::new();
    for function in pair.into_inner() {
        match function.as_rule() {
            Rule::function => lower_function(&mut builder, function)?,
            Rule::EOI => {}
            _ => return Err(unexpected(&function)),
        }
    }
    Ok(builder.finish())
}

fn lower_type(pair: Pair<'_, Rule>) -> LowerResult<Type> {
    let inner = match pair.as_rule() {
        Rule::ty => next_part(&mut pair.clone().into_inner(), &pair)?,
        _ => pair,
    };

    match inner.as_rule() {
        Rule::int_ty => {
            let bits = inner.as_str().trim_start_matches('i');
            bits.parse::<u16>()
                .map(Type::Int)
                .map_err(|_| unexpected(&inner))
        }
        Rule::void_ty => Ok(Type::Void),
        Rule::struct_ty => {
            let name = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::ident)
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            Ok(Type::Struct(name))
        }
        Rule::ptr_ty => {
            let target = next_part(&mut inner.clone().into_inner(), &inner)?;
            Ok(Type::pointer_to(lower_type(target)?))
        }
        Rule::array_ty => {
            let mut parts = inner.clone().into_inner();
            let element = next_part(&mut parts, &inner)?;
            let len = match parts.next() {
                Some(len) => Some(
                    len.as_str()
                        .parse::<usize>()
                        .map_err(|_| LowerError::IntegerOutOfRange {
                            text: len.as_str().to_string(),
                            line: len.line_col().0,
                        })?,
                ),
                None => None,
            };
            Ok(Type::array_of(lower_type(element)?, len))
        }
        _ => Err(unexpected(&inner)),
    }
}

/// Names visible while lowering one function body.
struct Scope {
    function: String,
    vars: HashMap<String, VarId>,
    blocks: HashMap<String, BlockId>,
}

impl Scope {
    fn var(&self, pair: &Pair<'_, Rule>) -> LowerResult<VarId> {
        self.vars
            .get(pair.as_str())
            .copied()
            .ok_or_else(|| LowerError::UnknownVariable {
                function: self.function.clone(),
                name: pair.as_str().to_string(),
                line: pair.line_col().0,
            })
    }

    fn block(&self, pair: &Pair<'_, Rule>) -> LowerResult<BlockId> {
        self.blocks
            .get(pair.as_str())
            .copied()
            .ok_or_else(|| LowerError::UnknownBlock {
                function: self.function.clone(),
                label: pair.as_str().to_string(),
                line: pair.line_col().0,
            })
    }

    fn declare(&mut self, name: &str, id: VarId) -> LowerResult<()> {
        if self.vars.insert(name.to_string(), id).is_some() {
            return Err(LowerError::DuplicateVariable {
                function: self.function.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn expr(&self, pair: Pair<'_, Rule>) -> LowerResult<Expr> {
        pratt()
            .map_primary(|primary| self.primary(primary))
            .map_prefix(|op, operand| {
                let un = unary_op(op.as_rule()).ok_or_else(|| unexpected(&op))?;
                Ok(Expr::unary(un, operand?))
            })
            .map_infix(|left, op, right| {
                let bin = binary_op(op.as_rule()).ok_or_else(|| unexpected(&op))?;
                Ok(Expr::binary(bin, left?, right?))
            })
            .parse(pair.into_inner())
    }

    fn primary(&self, pair: Pair<'_, Rule>) -> LowerResult<Expr> {
        match pair.as_rule() {
            Rule::int => pair
                .as_str()
                .parse::<i64>()
                .map(Expr::constant)
                .map_err(|_| LowerError::IntegerOutOfRange {
                    text: pair.as_str().to_string(),
                    line: pair.line_col().0,
                }),
            Rule::ident => Ok(Expr::var(self.var(&pair)?)),
            Rule::addr_of => {
                let place = next_part(&mut pair.clone().into_inner(), &pair)?;
                Ok(Expr::addr_of(self.place(place)?))
            }
            Rule::expr => self.expr(pair),
            _ => Err(unexpected(&pair)),
        }
    }

    fn place(&self, pair: Pair<'_, Rule>) -> LowerResult<Place> {
        let line = pair.line_col().0;
        let mut derefs = 0;
        let mut place: Option<Place> = None;

        for part in pair.into_inner() {
            match (part.as_rule(), place.take()) {
                (Rule::deref, None) => derefs += 1,
                (Rule::ident, None) => place = Some(Place::var(self.var(&part)?)),
                (Rule::place, None) => place = Some(self.place(part)?),
                (Rule::index, Some(base)) => {
                    let index = next_part(&mut part.clone().into_inner(), &part)?;
                    place = Some(base.index(self.expr(index)?));
                }
                (Rule::field, Some(base)) => place = Some(base.field(inner_str(&part))),
                (Rule::arrow, Some(base)) => place = Some(base.arrow(inner_str(&part))),
                _ => return Err(unexpected(&part)),
            }
        }

        let mut place = place.ok_or(LowerError::Unexpected {
            rule: Rule::place,
            line,
        })?;
        for _ in 0..derefs {
            place = place.deref();
        }
        Ok(place)
    }
}

/// Text of the first child, e.g. the name after `.` or the body of a string.
fn inner_str(pair: &Pair<'_, Rule>) -> String {
    pair.clone()
        .into_inner()
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn next_part<'i>(
    parts: &mut impl Iterator<Item = Pair<'i, Rule>>,
    parent: &Pair<'i, Rule>,
) -> LowerResult<Pair<'i, Rule>> {
    parts.next().ok_or_else(|| unexpected(parent))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_fn
            | Rule::kw_let
            | Rule::kw_load
            | Rule::kw_store
            | Rule::kw_cast
            | Rule::kw_call
            | Rule::kw_opaque
            | Rule::kw_br
            | Rule::kw_jump
            | Rule::kw_ret
            | Rule::kw_struct
    )
}

/// Children of `pair` without the keyword tokens.
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn lower_function(builder: &mut ProgramBuilder, pair: Pair<'_, Rule>) -> LowerResult<()> {
    let mut parts = significant(pair.clone());
    let name = next_part(&mut parts, &pair)?;
    let mut f = builder.function(name.as_str());

    let mut scope = Scope {
        function: name.as_str().to_string(),
        vars: HashMap::new(),
        blocks: HashMap::new(),
    };
    let mut blocks = Vec::new();

    for part in parts {
        match part.as_rule() {
            Rule::param | Rule::local => {
                let mut decl = significant(part.clone());
                let var = next_part(&mut decl, &part)?;
                let ty = lower_type(next_part(&mut decl, &part)?)?;
                let id = if part.as_rule() == Rule::param {
                    f.param(var.as_str(), ty)
                } else {
                    f.local(var.as_str(), ty)
                };
                scope.declare(var.as_str(), id)?;
            }
            Rule::ret_ty => {
                let ty = next_part(&mut part.clone().into_inner(), &part)?;
                f.returns(lower_type(ty)?);
            }
            Rule::block => {
                let label = next_part(&mut part.clone().into_inner(), &part)?;
                let id = if blocks.is_empty() {
                    f.current_function().entry_block()
                } else {
                    f.create_block_id()
                };
                if scope.blocks.insert(label.as_str().to_string(), id).is_some() {
                    return Err(LowerError::DuplicateBlock {
                        function: scope.function.clone(),
                        label: label.as_str().to_string(),
                    });
                }
                blocks.push((id, part));
            }
            _ => return Err(unexpected(&part)),
        }
    }

    for (index, (id, block)) in blocks.into_iter().enumerate() {
        let mut bb = if index == 0 {
            f.entry_block()
        } else {
            f.switch_to_block(id)?
        };
        lower_block(&scope, &mut bb, block)?;
    }

    f.build()?;
    Ok(())
}

fn lower_block(scope: &Scope, bb: &mut BlockBuilder<'_>, pair: Pair<'_, Rule>) -> LowerResult<()> {
    // The first child is the label.
    for stmt in pair.into_inner().skip(1) {
        let rule = stmt.as_rule();
        let parts = &mut significant(stmt.clone());

        match rule {
            Rule::assign_stmt => {
                let dst = scope.var(&next_part(parts, &stmt)?)?;
                let expr = scope.expr(next_part(parts, &stmt)?)?;
                bb.assign(dst, expr);
            }
            Rule::load_stmt => {
                let dst = scope.var(&next_part(parts, &stmt)?)?;
                let place = scope.place(next_part(parts, &stmt)?)?;
                bb.load(dst, place);
            }
            Rule::store_stmt => {
                let place = scope.place(next_part(parts, &stmt)?)?;
                let src = scope.expr(next_part(parts, &stmt)?)?;
                bb.store(place, src);
            }
            Rule::cast_stmt => {
                let dst = scope.var(&next_part(parts, &stmt)?)?;
                let ty = lower_type(next_part(parts, &stmt)?)?;
                let src = scope.expr(next_part(parts, &stmt)?)?;
                bb.cast(dst, src, ty);
            }
            Rule::call_stmt => lower_call(scope, bb, &stmt, parts)?,
            Rule::opaque_stmt => {
                let mut touched = Vec::new();
                let mut reason = String::new();
                for part in parts {
                    match part.as_rule() {
                        Rule::ident => touched.push(scope.var(&part)?),
                        Rule::string => reason = inner_str(&part),
                        _ => return Err(unexpected(&part)),
                    }
                }
                bb.opaque(touched, &reason);
            }
            Rule::branch => {
                let condition = scope.expr(next_part(parts, &stmt)?)?;
                let then_block = scope.block(&next_part(parts, &stmt)?)?;
                let else_block = scope.block(&next_part(parts, &stmt)?)?;
                bb.branch(condition, then_block, else_block)?;
            }
            Rule::jump => {
                let target = scope.block(&next_part(parts, &stmt)?)?;
                bb.jump(target)?;
            }
            Rule::ret => match parts.next() {
                Some(value) => bb.return_value(scope.expr(value)?)?,
                None => bb.return_void()?,
            },
            _ => return Err(unexpected(&stmt)),
        }
    }
    Ok(())
}

fn lower_call<'i>(
    scope: &Scope,
    bb: &mut BlockBuilder<'_>,
    stmt: &Pair<'i, Rule>,
    parts: impl Iterator<Item = Pair<'i, Rule>>,
) -> LowerResult<()> {
    let mut dst = None;
    let mut direct = None;
    let mut indirect = None;
    let mut args = Vec::new();

    for part in parts {
        match part.as_rule() {
            Rule::dst => {
                let var = next_part(&mut part.clone().into_inner(), &part)?;
                dst = Some(scope.var(&var)?);
            }
            Rule::ident => direct = Some(part.as_str().to_string()),
            Rule::indirect => {
                let target = next_part(&mut part.clone().into_inner(), &part)?;
                indirect = Some(scope.primary(target)?);
            }
            Rule::expr => args.push(scope.expr(part)?),
            _ => return Err(unexpected(&part)),
        }
    }

    match (direct, indirect) {
        (Some(callee), _) => bb.call(dst, &callee, args),
        (None, Some(target)) => bb.call_indirect(dst, target, args),
        (None, None) => return Err(unexpected(stmt)),
    }
    Ok(())
}
