use crate::{
    block::{BlockId, Terminator},
    function::Function,
    instructions::{Callee, Instruction},
    types::Type,
    values::{Expr, Place, VarId},
    Result, TaintError,
};

pub struct BlockBuilder<'a> {
    pub block_id: BlockId,
    function: &'a mut Function,
    instructions: Vec<Instruction>,
    is_sealed: bool,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(block_id: BlockId, function: &'a mut Function) -> Self {
        Self {
            block_id,
            function,
            instructions: Vec::new(),
            is_sealed: false,
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    fn push_instruction(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn assign(&mut self, dst: VarId, expr: Expr) {
        self.push_instruction(Instruction::Assign { dst, expr });
    }

    /// Evaluates `expr` into a fresh temporary.
    pub fn compute(&mut self, expr: Expr, ty: Type) -> VarId {
        let dst = self.function.body.new_temp(ty);
        self.assign(dst, expr);
        dst
    }

    pub fn load(&mut self, dst: VarId, place: Place) {
        self.push_instruction(Instruction::Load { dst, place });
    }

    pub fn store(&mut self, place: Place, src: Expr) {
        self.push_instruction(Instruction::Store { place, src });
    }

    pub fn cast(&mut self, dst: VarId, src: Expr, ty: Type) {
        self.push_instruction(Instruction::Cast { dst, src, ty });
    }

    pub fn call(&mut self, dst: Option<VarId>, callee: &str, args: Vec<Expr>) {
        self.push_instruction(Instruction::Call {
            dst,
            callee: Callee::Direct(callee.to_string()),
            args,
        });
    }

    pub fn call_indirect(&mut self, dst: Option<VarId>, target: Expr, args: Vec<Expr>) {
        self.push_instruction(Instruction::Call {
            dst,
            callee: Callee::Indirect(target),
            args,
        });
    }

    pub fn opaque(&mut self, touched: Vec<VarId>, reason: &str) {
        self.push_instruction(Instruction::Opaque {
            touched,
            reason: reason.to_string(),
        });
    }

    pub fn jump(&mut self, target: BlockId) -> Result<()> {
        self.seal_with_terminator(Terminator::Jump(target))
    }

    pub fn branch(&mut self, condition: Expr, then_block: BlockId, else_block: BlockId) -> Result<()> {
        self.seal_with_terminator(Terminator::Branch {
            condition,
            then_block,
            else_block,
        })
    }

    pub fn return_value(&mut self, value: Expr) -> Result<()> {
        self.seal_with_terminator(Terminator::Return(Some(value)))
    }

    pub fn return_void(&mut self) -> Result<()> {
        self.seal_with_terminator(Terminator::Return(None))
    }

    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    pub fn seal_with_terminator(&mut self, terminator: Terminator) -> Result<()> {
        if self.is_sealed {
            return Err(TaintError::BuilderError(format!(
                "Block {} already sealed",
                self.block_id
            )));
        }

        let function_name = self.function.name().to_string();
        let block = self
            .function
            .body
            .get_block_mut(self.block_id)
            .ok_or_else(|| {
                TaintError::BuilderError(format!(
                    "Block {} does not exist in function {}",
                    self.block_id, function_name
                ))
            })?;

        if block.is_terminated() {
            return Err(TaintError::BuilderError(format!(
                "Block {} already sealed",
                self.block_id
            )));
        }

        block.instructions.append(&mut self.instructions);
        block.set_terminator(terminator);
        self.is_sealed = true;
        Ok(())
    }
}
