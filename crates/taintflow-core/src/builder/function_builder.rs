use super::BlockBuilder;
use crate::{
    block::BlockId, function::Function, program::Program, types::Type, values::VarId, Result,
    TaintError,
};
use std::collections::HashSet;

pub struct FunctionBuilder<'a> {
    function: Function,
    program: &'a mut Program,
    created_blocks: HashSet<BlockId>,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(name: &str, program: &'a mut Program) -> Self {
        let function = Function::new(name);
        let mut created_blocks = HashSet::new();
        created_blocks.insert(function.entry_block());

        Self {
            function,
            program,
            created_blocks,
        }
    }

    pub fn param(&mut self, name: &str, ty: Type) -> VarId {
        self.function.add_param(name, ty)
    }

    pub fn local(&mut self, name: &str, ty: Type) -> VarId {
        self.function.add_local(name, ty)
    }

    pub fn temp(&mut self, ty: Type) -> VarId {
        self.function.body.new_temp(ty)
    }

    pub fn returns(&mut self, ty: Type) -> &mut Self {
        self.function.signature.returns = ty;
        self
    }

    pub fn create_block_id(&mut self) -> BlockId {
        let block_id = self.function.body.create_block();
        self.created_blocks.insert(block_id);
        block_id
    }

    pub fn entry_block(&mut self) -> BlockBuilder<'_> {
        let block_id = self.function.entry_block();
        BlockBuilder::new(block_id, &mut self.function)
    }

    pub fn switch_to_block(&mut self, block_id: BlockId) -> Result<BlockBuilder<'_>> {
        if !self.created_blocks.contains(&block_id) {
            return Err(TaintError::BuilderError(format!(
                "Block {} does not exist in function {}",
                block_id,
                self.function.name()
            )));
        }

        Ok(BlockBuilder::new(block_id, &mut self.function))
    }

    /// Creates a fresh block and returns a builder positioned on it.
    pub fn block(&mut self) -> BlockBuilder<'_> {
        let block_id = self.create_block_id();
        BlockBuilder::new(block_id, &mut self.function)
    }

    pub fn current_function(&self) -> &Function {
        &self.function
    }

    pub fn build(self) -> Result<()> {
        let name = self.function.name().to_string();
        if self.program.contains(&name) {
            return Err(TaintError::DuplicateFunction(name));
        }
        self.program.add_function(self.function);
        Ok(())
    }
}
