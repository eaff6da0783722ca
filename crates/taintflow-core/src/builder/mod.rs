/*! Fluent API for constructing CFGs programmatically.
 *
 * Front ends and tests describe functions block by block. The builders hand out block ids up
 * front so forward jumps and loop back-edges can be written in any order, and refuse to seal a
 * block twice.
 */

pub mod block_builder;
pub mod function_builder;

pub use block_builder::BlockBuilder;
pub use function_builder::FunctionBuilder;

use crate::program::Program;

pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
        }
    }

    pub fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        FunctionBuilder::new(name, &mut self.program)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn finish(self) -> Program {
        self.program
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
