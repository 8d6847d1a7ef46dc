//! Instructions and operand records
//!
//! Every [`Instruction`] carries an opcode, an optional label that makes it
//! a branch target, and one of a small set of operand records. The opcode
//! and record are separate enums; the validator rejects combinations
//! outside the table implemented by [`Instruction::expects`]-style matching
//! in the validate module. The [`Instruction::uses`] and
//! [`Instruction::def`] accessors dispatch on the record shape once, and
//! every other pass goes through them.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::Type;
use crate::value::{Const, Value, Var};

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Nop,
    Assign,
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // bitwise
    And,
    Or,
    Shl,
    Shr,
    Xor,
    Not,
    // comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // control
    Br,
    BrCond,
    Call,
    Ret,
    Switch,
    // memory
    Alloca,
    Load,
    Store,
    Memcpy,
    Memset,
    GetArrayElementPtr,
    GetStructMemberPtr,
    // conversion
    Trunc,
    Ext,
    Ftoi,
    Itof,
    Ptoi,
    Itop,
    Bitcast,
    // varargs
    VaStart,
    VaEnd,
    VaArg,
    VaCopy,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Assign => "assign",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Gt => "gt",
            Opcode::Ge => "ge",
            Opcode::Br => "br",
            Opcode::BrCond => "br",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Switch => "switch",
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Memcpy => "memcpy",
            Opcode::Memset => "memset",
            Opcode::GetArrayElementPtr => "get_array_element_ptr",
            Opcode::GetStructMemberPtr => "get_struct_member_ptr",
            Opcode::Trunc => "trunc",
            Opcode::Ext => "ext",
            Opcode::Ftoi => "ftoi",
            Opcode::Itof => "itof",
            Opcode::Ptoi => "ptoi",
            Opcode::Itop => "itop",
            Opcode::Bitcast => "bitcast",
            Opcode::VaStart => "va_start",
            Opcode::VaEnd => "va_end",
            Opcode::VaArg => "va_arg",
            Opcode::VaCopy => "va_copy",
        }
    }

    /// A basic block ends after this instruction.
    pub fn ends_block(self) -> bool {
        matches!(self, Opcode::Br | Opcode::BrCond | Opcode::Ret)
    }

    /// Control may continue to the textually next instruction.
    pub fn falls_through(self) -> bool {
        !matches!(self, Opcode::Br | Opcode::Ret)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge
        )
    }
}

/// One case of a `switch` instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Const,
    pub target: String,
}

/// Per-opcode operand records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operands {
    None,
    Assign { value: Value, result: Var },
    Binary { left: Value, right: Value, result: Var },
    Unary { operand: Value, result: Var },
    Branch { target: String, cond: Option<Value> },
    Call { function: Var, args: Vec<Value>, result: Option<Var> },
    Ret { value: Option<Value> },
    Alloca { allocated: Type, result: Var },
    Store { ptr: Value, value: Value },
    Memset { ptr: Value, value: Value, len: Value },
    Memcpy { dest: Value, src: Value, len: Value },
    Switch { value: Value, cases: Vec<SwitchCase>, default: String },
    VaStart { list: Value },
    VaEnd { list: Value },
    VaArg { list: Value, result: Var },
    VaCopy { dest: Value, src: Value },
}

/// A single three-address instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Label making this instruction a branch target.
    pub label: Option<String>,
    pub opcode: Opcode,
    pub operands: Operands,
}

/// Variables read by an instruction. Two inline slots cover everything but
/// calls and memcpy/memset.
pub type Uses<'a> = SmallVec<[&'a Var; 2]>;

impl Instruction {
    pub fn new(opcode: Opcode, operands: Operands) -> Self {
        Self { label: None, opcode, operands }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn nop() -> Self {
        Self::new(Opcode::Nop, Operands::None)
    }

    pub fn assign(value: Value, result: Var) -> Self {
        Self::new(Opcode::Assign, Operands::Assign { value, result })
    }

    pub fn binary(opcode: Opcode, left: Value, right: Value, result: Var) -> Self {
        Self::new(opcode, Operands::Binary { left, right, result })
    }

    pub fn unary(opcode: Opcode, operand: Value, result: Var) -> Self {
        Self::new(opcode, Operands::Unary { operand, result })
    }

    pub fn br(target: impl Into<String>) -> Self {
        Self::new(Opcode::Br, Operands::Branch { target: target.into(), cond: None })
    }

    pub fn br_cond(cond: Value, target: impl Into<String>) -> Self {
        Self::new(
            Opcode::BrCond,
            Operands::Branch { target: target.into(), cond: Some(cond) },
        )
    }

    pub fn call(function: Var, args: Vec<Value>, result: Option<Var>) -> Self {
        Self::new(Opcode::Call, Operands::Call { function, args, result })
    }

    pub fn ret(value: Option<Value>) -> Self {
        Self::new(Opcode::Ret, Operands::Ret { value })
    }

    pub fn alloca(allocated: Type, result: Var) -> Self {
        Self::new(Opcode::Alloca, Operands::Alloca { allocated, result })
    }

    pub fn load(ptr: Value, result: Var) -> Self {
        Self::new(Opcode::Load, Operands::Unary { operand: ptr, result })
    }

    pub fn store(ptr: Value, value: Value) -> Self {
        Self::new(Opcode::Store, Operands::Store { ptr, value })
    }

    pub fn memcpy(dest: Value, src: Value, len: Value) -> Self {
        Self::new(Opcode::Memcpy, Operands::Memcpy { dest, src, len })
    }

    pub fn memset(ptr: Value, value: Value, len: Value) -> Self {
        Self::new(Opcode::Memset, Operands::Memset { ptr, value, len })
    }

    pub fn switch(value: Value, cases: Vec<SwitchCase>, default: impl Into<String>) -> Self {
        Self::new(Opcode::Switch, Operands::Switch { value, cases, default: default.into() })
    }

    /// Variables this instruction reads.
    pub fn uses(&self) -> Uses<'_> {
        fn push<'a>(out: &mut Uses<'a>, value: &'a Value) {
            if let Value::Var(v) = value {
                out.push(v);
            }
        }

        let mut out = Uses::new();
        match &self.operands {
            Operands::None => {}
            Operands::Assign { value, .. } => push(&mut out, value),
            Operands::Binary { left, right, .. } => {
                push(&mut out, left);
                push(&mut out, right);
            }
            Operands::Unary { operand, .. } => push(&mut out, operand),
            Operands::Branch { cond, .. } => {
                if let Some(cond) = cond {
                    push(&mut out, cond);
                }
            }
            Operands::Call { function, args, .. } => {
                out.push(function);
                for arg in args {
                    push(&mut out, arg);
                }
            }
            Operands::Ret { value } => {
                if let Some(value) = value {
                    push(&mut out, value);
                }
            }
            Operands::Alloca { .. } => {}
            Operands::Store { ptr, value } => {
                push(&mut out, value);
                push(&mut out, ptr);
            }
            Operands::Memset { ptr, value, len } => {
                push(&mut out, ptr);
                push(&mut out, value);
                push(&mut out, len);
            }
            Operands::Memcpy { dest, src, len } => {
                push(&mut out, dest);
                push(&mut out, src);
                push(&mut out, len);
            }
            Operands::Switch { value, .. } => push(&mut out, value),
            Operands::VaStart { list } | Operands::VaEnd { list } => push(&mut out, list),
            Operands::VaArg { list, .. } => push(&mut out, list),
            Operands::VaCopy { dest, src } => {
                push(&mut out, dest);
                push(&mut out, src);
            }
        }
        out
    }

    /// The variable this instruction writes, if any.
    pub fn def(&self) -> Option<&Var> {
        match &self.operands {
            Operands::Assign { result, .. }
            | Operands::Binary { result, .. }
            | Operands::Unary { result, .. }
            | Operands::Alloca { result, .. }
            | Operands::VaArg { result, .. } => Some(result),
            Operands::Call { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// Mutable access to the written variable, for renaming passes.
    pub fn def_mut(&mut self) -> Option<&mut Var> {
        match &mut self.operands {
            Operands::Assign { result, .. }
            | Operands::Binary { result, .. }
            | Operands::Unary { result, .. }
            | Operands::Alloca { result, .. }
            | Operands::VaArg { result, .. } => Some(result),
            Operands::Call { result, .. } => result.as_mut(),
            _ => None,
        }
    }

    /// Applies `f` to every variable in a use position, mirroring [`uses`].
    ///
    /// [`uses`]: Instruction::uses
    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut Var)) {
        fn apply(value: &mut Value, f: &mut impl FnMut(&mut Var)) {
            if let Value::Var(v) = value {
                f(v);
            }
        }

        match &mut self.operands {
            Operands::None => {}
            Operands::Assign { value, .. } => apply(value, &mut f),
            Operands::Binary { left, right, .. } => {
                apply(left, &mut f);
                apply(right, &mut f);
            }
            Operands::Unary { operand, .. } => apply(operand, &mut f),
            Operands::Branch { cond, .. } => {
                if let Some(cond) = cond {
                    apply(cond, &mut f);
                }
            }
            Operands::Call { function, args, .. } => {
                f(function);
                for arg in args {
                    apply(arg, &mut f);
                }
            }
            Operands::Ret { value } => {
                if let Some(value) = value {
                    apply(value, &mut f);
                }
            }
            Operands::Alloca { .. } => {}
            Operands::Store { ptr, value } => {
                apply(value, &mut f);
                apply(ptr, &mut f);
            }
            Operands::Memset { ptr, value, len } => {
                apply(ptr, &mut f);
                apply(value, &mut f);
                apply(len, &mut f);
            }
            Operands::Memcpy { dest, src, len } => {
                apply(dest, &mut f);
                apply(src, &mut f);
                apply(len, &mut f);
            }
            Operands::Switch { value, .. } => apply(value, &mut f),
            Operands::VaStart { list } | Operands::VaEnd { list } => apply(list, &mut f),
            Operands::VaArg { list, .. } => apply(list, &mut f),
            Operands::VaCopy { dest, src } => {
                apply(dest, &mut f);
                apply(src, &mut f);
            }
        }
    }

    /// Labels this instruction may transfer control to.
    pub fn branch_targets(&self) -> Vec<&str> {
        match &self.operands {
            Operands::Branch { target, .. } => vec![target.as_str()],
            Operands::Switch { cases, default, .. } => {
                let mut targets: Vec<&str> = cases.iter().map(|c| c.target.as_str()).collect();
                targets.push(default.as_str());
                targets
            }
            _ => Vec::new(),
        }
    }
}
