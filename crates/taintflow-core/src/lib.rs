/*! Control-flow graph model and taint-propagation analyses.
 *
 * A front end hands over one CFG per function and names the parameters that carry untrusted
 * input. The analyses here decide, for every variable, whether its value depends on those inputs
 * through data flow, through control flow, or through a loop whose trip count the input decides.
 */

pub mod analysis;
pub mod block;
pub mod builder;
pub mod config;
pub mod function;
pub mod instructions;
pub mod program;
pub mod types;
pub mod validate;
pub mod values;

pub use analysis::{
    analyze_program, FunctionOutcome, FunctionReport, FunctionSummary, ProgramReport, SourceId,
    TaintKind, TaintValue, Tier, VariableReport,
};
pub use block::{BasicBlock, BlockId, Terminator};
pub use builder::{BlockBuilder, FunctionBuilder, ProgramBuilder};
pub use config::AnalysisConfig;
pub use function::{Function, FunctionBody, FunctionSignature, VarKind, Variable};
pub use instructions::{Callee, Instruction};
pub use program::Program;
pub use types::Type;
pub use values::{BinOp, Expr, Place, Projection, UnOp, VarId};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaintError {
    #[error("Builder error: {0}")]
    BuilderError(String),
    #[error("Function {0} is defined more than once")]
    DuplicateFunction(String),
    #[error("Function not found: {0}")]
    UnknownFunction(String),
    #[error("{function}: block {block} has no terminator")]
    MissingTerminator { function: String, block: BlockId },
    #[error("{function}: block {from} jumps to missing block {block}")]
    UnknownBlock {
        function: String,
        from: BlockId,
        block: BlockId,
    },
    #[error("{function}: block {block} is unreachable from the entry block")]
    UnreachableBlock { function: String, block: BlockId },
    #[error("{function}: reference to undeclared variable {var}")]
    UnknownVariable { function: String, var: VarId },
    #[error("{function}: call to {callee} passes {found} arguments, expected {expected}")]
    ArityMismatch {
        function: String,
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("{function}: source {name} is not a parameter")]
    UnknownSource { function: String, name: String },
    #[error("{scope}: analysis did not converge after {iterations} iterations")]
    NonConvergence { scope: String, iterations: usize },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TaintError>;

#[cfg(test)]
mod tests;
