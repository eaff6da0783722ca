use crate::block::{BasicBlock, BlockId};
use crate::types::Type;
use crate::values::VarId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub signature: FunctionSignature,
    pub body: FunctionBody,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            signature: FunctionSignature {
                name: name.into(),
                params: Vec::new(),
                returns: Type::Void,
            },
            body: FunctionBody::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn entry_block(&self) -> BlockId {
        self.body.entry_block()
    }

    pub fn add_param(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        let index = self.signature.params.len();
        let id = self.body.add_var(name, ty, VarKind::Param(index));
        self.signature.params.push(id);
        id
    }

    pub fn add_local(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        self.body.add_var(name, ty, VarKind::Local)
    }

    pub fn params(&self) -> &[VarId] {
        &self.signature.params
    }

    pub fn param_count(&self) -> usize {
        self.signature.params.len()
    }

    pub fn var(&self, id: VarId) -> Option<&Variable> {
        self.body.vars.get(id.0 as usize)
    }

    pub fn var_name(&self, id: VarId) -> &str {
        self.var(id).map(|v| v.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn var_by_name(&self, name: &str) -> Option<VarId> {
        self.body
            .vars
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.id)
    }

    pub fn vars(&self) -> impl Iterator<Item = &Variable> {
        self.body.vars.iter()
    }

    /// Names of the direct callees, in first-call order.
    pub fn callees(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for block in self.body.blocks.values() {
            for inst in &block.instructions {
                if let Some(name) = inst.direct_callee() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<VarId>,
    pub returns: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Param(usize),
    Local,
    Temp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
}

impl Variable {
    pub fn param_index(&self) -> Option<usize> {
        match self.kind {
            VarKind::Param(index) => Some(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionBody {
    pub entry_block: BlockId,
    pub blocks: IndexMap<BlockId, BasicBlock>,
    pub vars: Vec<Variable>,
    next_block_id: u32,
    next_temp_id: u32,
}

impl FunctionBody {
    pub fn new() -> Self {
        let entry_block = BlockId(0);
        let mut blocks = IndexMap::new();
        blocks.insert(entry_block, BasicBlock::new(entry_block));

        Self {
            entry_block,
            blocks,
            vars: Vec::new(),
            next_block_id: 1,
            next_temp_id: 0,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    /// Inserts a block with a caller-chosen id, as produced by a front end.
    pub fn insert_block(&mut self, block: BasicBlock) {
        self.next_block_id = self.next_block_id.max(block.id.0 + 1);
        self.blocks.insert(block.id, block);
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry_block
    }

    pub fn add_var(&mut self, name: impl Into<String>, ty: Type, kind: VarKind) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Variable {
            id,
            name: name.into(),
            ty,
            kind,
        });
        id
    }

    pub fn new_temp(&mut self, ty: Type) -> VarId {
        let name = format!("%t{}", self.next_temp_id);
        self.next_temp_id += 1;
        self.add_var(name, ty, VarKind::Temp)
    }
}

impl Default for FunctionBody {
    fn default() -> Self {
        Self::new()
    }
}
