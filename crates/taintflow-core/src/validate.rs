//! Structural checks run before any analysis.
//!
//! A program that fails here is rejected as a whole; the analyses never see a
//! partially valid CFG.

use crate::{
    block::{BlockId, Terminator},
    config::AnalysisConfig,
    function::Function,
    program::Program,
    values::VarId,
    Result, TaintError,
};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Validates every function and returns the program with unreachable blocks
/// removed (when the configuration allows pruning).
pub fn validate_program(program: &Program, config: &AnalysisConfig) -> Result<Program> {
    let mut checked = program.clone();

    for function in checked.functions.values_mut() {
        check_blocks(function)?;
        prune_unreachable(function, config.prune_unreachable)?;
    }

    for function in checked.functions.values() {
        check_variables(function)?;
        check_calls(function, &checked)?;
    }

    check_sources(&checked, config)?;

    debug!(functions = checked.functions.len(), "program validated");
    Ok(checked)
}

fn check_blocks(function: &Function) -> Result<()> {
    let name = function.name();
    if !function.body.blocks.contains_key(&function.entry_block()) {
        return Err(TaintError::UnknownBlock {
            function: name.to_string(),
            from: function.entry_block(),
            block: function.entry_block(),
        });
    }

    for (&block_id, block) in &function.body.blocks {
        if !block.is_terminated() {
            return Err(TaintError::MissingTerminator {
                function: name.to_string(),
                block: block_id,
            });
        }

        for succ in block.successors() {
            if !function.body.blocks.contains_key(&succ) {
                return Err(TaintError::UnknownBlock {
                    function: name.to_string(),
                    from: block_id,
                    block: succ,
                });
            }
        }
    }

    Ok(())
}

pub fn reachable_blocks(function: &Function) -> HashSet<BlockId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(function.entry_block());

    while let Some(current) = queue.pop_front() {
        if visited.insert(current) {
            if let Some(block) = function.body.get_block(current) {
                queue.extend(block.successors());
            }
        }
    }

    visited
}

fn prune_unreachable(function: &mut Function, prune: bool) -> Result<()> {
    let reachable = reachable_blocks(function);
    let unreachable: Vec<BlockId> = function
        .body
        .blocks
        .keys()
        .copied()
        .filter(|id| !reachable.contains(id))
        .collect();

    if unreachable.is_empty() {
        return Ok(());
    }

    if !prune {
        return Err(TaintError::UnreachableBlock {
            function: function.name().to_string(),
            block: unreachable[0],
        });
    }

    warn!(
        function = function.name(),
        blocks = ?unreachable,
        "dropping unreachable blocks"
    );
    function
        .body
        .blocks
        .retain(|id, _| reachable.contains(id));
    Ok(())
}

fn check_variables(function: &Function) -> Result<()> {
    let declared = function.body.vars.len();
    let check = |var: VarId| -> Result<()> {
        if (var.0 as usize) < declared {
            Ok(())
        } else {
            Err(TaintError::UnknownVariable {
                function: function.name().to_string(),
                var,
            })
        }
    };

    for block in function.body.blocks.values() {
        for inst in &block.instructions {
            for var in inst.mentioned_vars() {
                check(var)?;
            }
        }
        match &block.terminator {
            Terminator::Branch { condition, .. } => {
                for var in condition.mentioned_vars() {
                    check(var)?;
                }
            }
            Terminator::Return(Some(value)) => {
                for var in value.mentioned_vars() {
                    check(var)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_calls(function: &Function, program: &Program) -> Result<()> {
    for block in function.body.blocks.values() {
        for inst in &block.instructions {
            if let crate::instructions::Instruction::Call {
                callee: crate::instructions::Callee::Direct(callee),
                args,
                ..
            } = inst
            {
                if let Some(target) = program.get_function(callee) {
                    if target.param_count() != args.len() {
                        return Err(TaintError::ArityMismatch {
                            function: function.name().to_string(),
                            callee: callee.clone(),
                            expected: target.param_count(),
                            found: args.len(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_sources(program: &Program, config: &AnalysisConfig) -> Result<()> {
    for (function_name, sources) in &config.sources {
        let function = program
            .get_function(function_name)
            .ok_or_else(|| TaintError::UnknownFunction(function_name.clone()))?;

        for source in sources {
            let is_param = function
                .var_by_name(source)
                .and_then(|id| function.var(id))
                .and_then(|v| v.param_index())
                .is_some();
            if !is_param {
                return Err(TaintError::UnknownSource {
                    function: function_name.clone(),
                    name: source.clone(),
                });
            }
        }
    }
    Ok(())
}
