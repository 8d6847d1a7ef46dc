//! SSA construction
//!
//! Converts a control-flow graph into SSA form following Braun et al.,
//! "Simple and Efficient Construction of Static Single Assignment Form".
//! Each block gets a list of φ-nodes at its head and a rewritten copy of
//! its instructions in which every definition receives a freshly minted
//! name (`%1`, `%2`, ...) and every use reads the reaching definition.
//!
//! A block is sealed once its predecessor set is final and every
//! predecessor has been filled. Reads in unsealed blocks (loop headers
//! while their back edges are pending) place φ-nodes with empty operand
//! lists; sealing completes them from the then-known predecessors. The
//! driver fills blocks in reverse post-order, seals eagerly where
//! possible, and finishes with a deferred sealing pass for the rest.
//!
//! Names that do not start with `%` (globals, function designators) pass
//! through reads untouched and are never redefined. Trivial φ-nodes are
//! kept; nothing downstream requires their elimination.

use std::fmt;

use hashbrown::HashMap;
use log::debug;
use smallvec::SmallVec;

use crate::cfg::{BlockId, Cfg};
use crate::instr::Instruction;
use crate::module::FunctionDef;
use crate::types::{Type, TypeStore};
use crate::value::Var;

/// One incoming value of a φ-node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiOperand {
    /// Name of the variable carrying the value.
    pub value: String,
    /// The predecessor block control arrives from.
    pub pred: BlockId,
}

/// A φ-node at a block head.
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    pub result: Var,
    pub operands: SmallVec<[PhiOperand; 2]>,
}

/// A basic block in SSA form. Owns its instructions.
#[derive(Debug, Clone)]
pub struct SsaBlock {
    pub id: BlockId,
    pub label: Option<String>,
    pub phis: Vec<Phi>,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

/// The SSA form of one function.
#[derive(Debug, Clone)]
pub struct SsaCfg {
    blocks: Vec<SsaBlock>,
    pub entry: BlockId,
    order: Vec<BlockId>,
}

impl SsaCfg {
    pub fn block(&self, id: BlockId) -> &SsaBlock {
        &self.blocks[id.index()]
    }

    /// Blocks in reverse post-order of the source graph.
    pub fn blocks(&self) -> impl Iterator<Item = &SsaBlock> {
        self.order.iter().map(|&id| &self.blocks[id.index()])
    }

    pub fn display<'a>(&'a self, store: &'a TypeStore) -> SsaCfgDisplay<'a> {
        SsaCfgDisplay { store, ssa: self }
    }
}

/// Builds the CFG for a function, prunes unreachable blocks, and converts
/// the result to SSA.
pub fn build_ssa(function: &FunctionDef) -> SsaCfg {
    let mut cfg = Cfg::build(function);
    cfg.prune();
    cfg_to_ssa(&cfg)
}

/// Converts a (pruned) CFG into SSA form.
pub fn cfg_to_ssa(cfg: &Cfg) -> SsaCfg {
    let mut builder = SsaBuilder::new(cfg);
    let order = cfg.reverse_postorder();

    for &block in &order {
        builder.try_seal(block);
        builder.fill_block(block);
    }
    // Loop headers stay unsealed until their back-edge sources are filled;
    // everything is filled now, so finish them off.
    for &block in &order {
        builder.seal_block(block);
    }

    debug!(
        "ssa for '{}': {} blocks, {} fresh names",
        cfg.function.name,
        order.len(),
        builder.next_name - 1
    );
    SsaCfg {
        blocks: builder.blocks,
        entry: cfg.entry,
        order,
    }
}

struct SsaBuilder<'c, 'f> {
    cfg: &'c Cfg<'f>,
    blocks: Vec<SsaBlock>,
    /// variable name -> block -> name of the reaching definition.
    current_def: HashMap<String, HashMap<BlockId, String>>,
    /// Variable table: every minted or parameter name, with its type.
    vars: HashMap<String, Var>,
    /// φ result name -> the original variable the φ stands in for.
    incomplete_phis: HashMap<String, String>,
    sealed: Vec<bool>,
    filled: Vec<bool>,
    next_name: u32,
}

impl<'c, 'f> SsaBuilder<'c, 'f> {
    fn new(cfg: &'c Cfg<'f>) -> Self {
        let count = cfg.num_blocks();
        let blocks = (0..count)
            .map(|i| {
                let id = BlockId(i as u32);
                let src = cfg.block(id);
                SsaBlock {
                    id,
                    label: src.label.clone(),
                    phis: Vec::new(),
                    instructions: Vec::new(),
                    predecessors: src.predecessors.clone(),
                    successors: src.successors.clone(),
                }
            })
            .collect();
        Self {
            cfg,
            blocks,
            current_def: HashMap::new(),
            vars: HashMap::new(),
            incomplete_phis: HashMap::new(),
            sealed: vec![false; count],
            filled: vec![false; count],
            next_name: 1,
        }
    }

    fn fresh(&mut self, ty: Type) -> Var {
        let var = Var::new(format!("%{}", self.next_name), ty);
        self.next_name += 1;
        var
    }

    fn write_variable(&mut self, name: &str, block: BlockId, value: &Var) {
        if name.starts_with('@') {
            return;
        }
        self.current_def
            .entry(name.to_owned())
            .or_default()
            .insert(block, value.name.clone());
        self.vars
            .entry(value.name.clone())
            .or_insert_with(|| value.clone());
    }

    fn read_variable(&mut self, var: &Var, block: BlockId) -> Var {
        if !var.name.starts_with('%') {
            // Globals and function designators are never renamed.
            return var.clone();
        }
        if let Some(name) = self.current_def.get(&var.name).and_then(|defs| defs.get(&block)) {
            return self.vars[name].clone();
        }
        self.read_variable_recursive(var, block)
    }

    fn read_variable_recursive(&mut self, var: &Var, block: BlockId) -> Var {
        if !self.sealed[block.index()] {
            // The predecessor set is still growing; placeholder φ, completed
            // when the block is sealed.
            let fresh = self.fresh(var.ty);
            self.blocks[block.index()].phis.push(Phi {
                result: fresh.clone(),
                operands: SmallVec::new(),
            });
            self.incomplete_phis
                .insert(fresh.name.clone(), var.name.clone());
            self.write_variable(&var.name, block, &fresh);
            return fresh;
        }

        let predecessors = self.blocks[block.index()].predecessors.clone();
        if predecessors.len() == 1 {
            let value = self.read_variable(var, predecessors[0]);
            self.write_variable(&var.name, block, &value);
            return value;
        }

        // Writing the φ result before recursing breaks read cycles through
        // loops.
        let fresh = self.fresh(var.ty);
        self.write_variable(&var.name, block, &fresh);
        let operands = self.phi_operands(var, &predecessors);
        self.blocks[block.index()].phis.push(Phi {
            result: fresh.clone(),
            operands,
        });
        fresh
    }

    fn phi_operands(
        &mut self,
        var: &Var,
        predecessors: &[BlockId],
    ) -> SmallVec<[PhiOperand; 2]> {
        predecessors
            .iter()
            .map(|&pred| PhiOperand {
                value: self.read_variable(var, pred).name,
                pred,
            })
            .collect()
    }

    fn try_seal(&mut self, block: BlockId) {
        let all_filled = self.blocks[block.index()]
            .predecessors
            .iter()
            .all(|p| self.filled[p.index()]);
        if all_filled {
            self.seal_block(block);
        }
    }

    fn seal_block(&mut self, block: BlockId) {
        if self.sealed[block.index()] {
            return;
        }
        self.sealed[block.index()] = true;

        let pending: Vec<(usize, Var)> = self.blocks[block.index()]
            .phis
            .iter()
            .enumerate()
            .filter(|(_, phi)| phi.operands.is_empty())
            .map(|(i, phi)| (i, phi.result.clone()))
            .collect();
        for (index, result) in pending {
            let original = self
                .incomplete_phis
                .get(&result.name)
                .cloned()
                .expect("empty operands only on recorded incomplete phis");
            let var = Var::new(original, result.ty);
            let predecessors = self.blocks[block.index()].predecessors.clone();
            let operands = self.phi_operands(&var, &predecessors);
            self.blocks[block.index()].phis[index].operands = operands;
        }
    }

    fn fill_block(&mut self, block: BlockId) {
        if self.filled[block.index()] {
            return;
        }
        if block == self.cfg.entry {
            // Parameters are the entry's initial definitions and keep their
            // names until redefined.
            let params = self.cfg.function.params.clone();
            for param in &params {
                self.write_variable(&param.name, block, param);
            }
        }

        let source: Vec<Instruction> = self
            .cfg
            .block(block)
            .instructions
            .iter()
            .map(|&instr| instr.clone())
            .collect();
        for mut instr in source {
            instr.for_each_use_mut(|use_var| {
                *use_var = self.read_variable(use_var, block);
            });
            let def = instr.def().map(|d| (d.name.clone(), d.ty));
            if let Some((name, ty)) = def {
                let fresh = self.fresh(ty);
                if let Some(result) = instr.def_mut() {
                    *result = fresh.clone();
                }
                self.write_variable(&name, block, &fresh);
            }
            self.blocks[block.index()].instructions.push(instr);
        }
        self.filled[block.index()] = true;
    }
}

pub struct SsaCfgDisplay<'a> {
    store: &'a TypeStore,
    ssa: &'a SsaCfg,
}

impl fmt::Display for SsaCfgDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.ssa.blocks() {
            match &block.label {
                Some(label) => writeln!(f, "{} ({}):", block.id, label)?,
                None => writeln!(f, "{}:", block.id)?,
            }
            for phi in &block.phis {
                write!(f, "    {} = phi", phi.result.name)?;
                for (i, op) in phi.operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}[ {}, {} ]", sep, op.value, op.pred)?;
                }
                writeln!(f)?;
            }
            for instr in &block.instructions {
                writeln!(f, "    {}", instr.display(self.store))?;
            }
        }
        Ok(())
    }
}
