//! Control-flow graph construction
//!
//! [`Cfg::build`] splits a function's flat instruction stream into basic
//! blocks. A block ends after `br`, `br_cond` and `ret`, and before any
//! labeled instruction. Blocks that can continue linearly keep a
//! `fall_through` link in addition to the predecessor/successor edges; a
//! second pass resolves branch and switch targets through the label map.
//!
//! The graph references instructions in the function body; it copies
//! nothing and must not outlive the function.

use std::fmt;

use hashbrown::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::instr::{Instruction, Opcode, Operands};
use crate::module::FunctionDef;

/// Identifier of a basic block, unique within one function's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// A maximal straight-line run of instructions.
#[derive(Debug)]
pub struct BasicBlock<'f> {
    pub id: BlockId,
    /// Label of the first instruction, if it has one.
    pub label: Option<String>,
    pub is_entry: bool,
    pub instructions: Vec<&'f Instruction>,
    /// The block control reaches linearly when the last instruction is
    /// neither `br` nor `ret`.
    pub fall_through: Option<BlockId>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    removed: bool,
}

impl<'f> BasicBlock<'f> {
    fn new(id: BlockId, is_entry: bool) -> Self {
        Self {
            id,
            label: None,
            is_entry,
            instructions: Vec::new(),
            fall_through: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            removed: false,
        }
    }

    pub fn last(&self) -> Option<&'f Instruction> {
        self.instructions.last().copied()
    }
}

/// Per-function control-flow graph.
#[derive(Debug)]
pub struct Cfg<'f> {
    pub function: &'f FunctionDef,
    blocks: Vec<BasicBlock<'f>>,
    pub entry: BlockId,
    pub labels: HashMap<String, BlockId>,
}

/// Convenience alias for [`Cfg::build`].
pub fn build_cfg(function: &FunctionDef) -> Cfg<'_> {
    Cfg::build(function)
}

impl<'f> Cfg<'f> {
    pub fn build(function: &'f FunctionDef) -> Cfg<'f> {
        let entry = BlockId(0);
        let mut cfg = Cfg {
            function,
            blocks: vec![BasicBlock::new(entry, true)],
            entry,
            labels: HashMap::new(),
        };

        let mut current = entry;
        for (i, instr) in function.body.iter().enumerate() {
            cfg.append(current, instr);

            let split_after = instr.opcode.ends_block();
            let next_is_labeled = function
                .body
                .get(i + 1)
                .is_some_and(|next| next.label.is_some());
            if split_after || next_is_labeled {
                let next = cfg.alloc_block();
                if instr.opcode.falls_through() {
                    cfg.add_edge(current, next);
                    cfg.block_mut(current).fall_through = Some(next);
                }
                current = next;
            }
        }

        // A split after the final instruction leaves an empty trailing block.
        let trailing = cfg.block(current);
        if trailing.instructions.is_empty() && !trailing.is_entry {
            cfg.detach(current);
        }

        cfg.link_branches();
        debug!(
            "built cfg for '{}': {} blocks",
            function.name,
            cfg.blocks().count()
        );
        cfg
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock<'f> {
        &self.blocks[id.index()]
    }

    /// Total number of allocated block slots, including pruned ones.
    /// Block ids index into this range.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock<'f> {
        &mut self.blocks[id.index()]
    }

    /// Live blocks, in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock<'f>> {
        self.blocks.iter().filter(|b| !b.removed)
    }

    pub fn block_by_label(&self, label: &str) -> Option<&BasicBlock<'f>> {
        self.labels.get(label).map(|&id| self.block(id))
    }

    fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, false));
        id
    }

    fn append(&mut self, id: BlockId, instr: &'f Instruction) {
        if let Some(label) = &instr.label {
            self.labels.insert(label.clone(), id);
            let block = self.block_mut(id);
            if block.instructions.is_empty() {
                block.label = Some(label.clone());
            }
        }
        self.block_mut(id).instructions.push(instr);
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let succs = &mut self.block_mut(from).successors;
        if !succs.contains(&to) {
            succs.push(to);
        }
        let preds = &mut self.block_mut(to).predecessors;
        if !preds.contains(&from) {
            preds.push(from);
        }
    }

    /// Unlinks a block from the graph and tombstones it.
    fn detach(&mut self, id: BlockId) {
        let predecessors = std::mem::take(&mut self.block_mut(id).predecessors);
        for pred in predecessors {
            let block = self.block_mut(pred);
            block.successors.retain(|&s| s != id);
            if block.fall_through == Some(id) {
                block.fall_through = None;
            }
        }
        let successors = std::mem::take(&mut self.block_mut(id).successors);
        for succ in successors {
            self.block_mut(succ).predecessors.retain(|&p| p != id);
        }
        if let Some(label) = self.block_mut(id).label.take() {
            self.labels.remove(&label);
        }
        self.block_mut(id).removed = true;
    }

    fn link_branches(&mut self) {
        let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
        for block in self.blocks() {
            let Some(last) = block.last() else { continue };
            match (last.opcode, &last.operands) {
                (Opcode::Br | Opcode::BrCond, Operands::Branch { target, .. }) => {
                    edges.push((block.id, self.target(target)));
                }
                (Opcode::Switch, Operands::Switch { cases, default, .. }) => {
                    for case in cases {
                        edges.push((block.id, self.target(&case.target)));
                    }
                    edges.push((block.id, self.target(default)));
                }
                _ => {}
            }
        }
        for (from, to) in edges {
            self.add_edge(from, to);
        }
    }

    fn target(&self, label: &str) -> BlockId {
        match self.labels.get(label) {
            Some(&id) => id,
            // The validator rejects unknown targets; reaching this is a bug
            // in the caller's pipeline.
            None => panic!("unknown branch target '{}'", label),
        }
    }

    /// Repeatedly removes non-entry blocks that have no predecessors until
    /// the graph stops changing. Idempotent.
    pub fn prune(&mut self) {
        loop {
            let dead: Vec<BlockId> = self
                .blocks()
                .filter(|b| !b.is_entry && b.predecessors.is_empty())
                .map(|b| b.id)
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                debug!("pruning unreachable {}", id);
                self.detach(id);
            }
        }
    }

    /// Flattens the graph back into one instruction stream.
    ///
    /// The order is a depth-first walk from the entry in which a block's
    /// fall-through successor is emitted immediately after it; when a block
    /// is reached by a branch edge while an unvisited predecessor falls
    /// through into it, that predecessor (and its chain) is emitted first.
    pub fn linearize(&self) -> Vec<Instruction> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order: Vec<BlockId> = Vec::new();
        self.emit(self.entry, &mut visited, &mut order);

        order
            .into_iter()
            .flat_map(|id| self.block(id).instructions.iter().map(|&instr| instr.clone()))
            .collect()
    }

    fn emit(&self, id: BlockId, visited: &mut [bool], order: &mut Vec<BlockId>) {
        if visited[id.index()] {
            return;
        }
        // A fall-through predecessor must be emitted directly above us.
        let pending: Vec<BlockId> = self
            .block(id)
            .predecessors
            .iter()
            .copied()
            .filter(|&p| !visited[p.index()] && self.block(p).fall_through == Some(id))
            .collect();
        for pred in pending {
            self.emit(pred, visited, order);
            if visited[id.index()] {
                return;
            }
        }

        visited[id.index()] = true;
        order.push(id);

        let block = self.block(id);
        if let Some(fall_through) = block.fall_through {
            self.emit(fall_through, visited, order);
        }
        for &succ in &block.successors {
            if block.fall_through != Some(succ) {
                self.emit(succ, visited, order);
            }
        }
    }

    /// Block ids in reverse post-order of a depth-first walk from the entry.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::new();
        self.postorder(self.entry, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    fn postorder(&self, id: BlockId, visited: &mut [bool], out: &mut Vec<BlockId>) {
        if visited[id.index()] {
            return;
        }
        visited[id.index()] = true;
        for &succ in &self.block(id).successors {
            self.postorder(succ, visited, out);
        }
        out.push(id);
    }
}
