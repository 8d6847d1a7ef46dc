//! Textual IR formatting
//!
//! Formatting is best-effort and human-oriented; the textual form is not a
//! data interchange format and does not round-trip. Types are printed as
//! `*T`, `[T;N]`, `struct.ID`, `(T1, T2) -> R`; constants as
//! `<type> <literal>`; instructions in the three-address grammar
//! (`%r = add i32 %a, i32 %b`, `br bool %c, exit`, ...).
//!
//! Because types are handles into a [`TypeStore`], every adapter carries a
//! store reference; [`Type::display`] and friends construct them.

use std::fmt;

use crate::instr::{Instruction, Operands};
use crate::module::{FunctionDef, Global, Module};
use crate::types::{Type, TypeKind, TypeStore};
use crate::value::{Const, ConstKind, Value, Var};

pub struct TypeDisplay<'a> {
    store: &'a TypeStore,
    ty: Type,
}

impl Type {
    pub fn display(self, store: &TypeStore) -> TypeDisplay<'_> {
        TypeDisplay { store, ty: self }
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.store.kind(self.ty) {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::I8 => write!(f, "i8"),
            TypeKind::I16 => write!(f, "i16"),
            TypeKind::I32 => write!(f, "i32"),
            TypeKind::I64 => write!(f, "i64"),
            TypeKind::U8 => write!(f, "u8"),
            TypeKind::U16 => write!(f, "u16"),
            TypeKind::U32 => write!(f, "u32"),
            TypeKind::U64 => write!(f, "u64"),
            TypeKind::F32 => write!(f, "f32"),
            TypeKind::F64 => write!(f, "f64"),
            TypeKind::Ptr(pointee) => write!(f, "*{}", pointee.display(self.store)),
            TypeKind::Array { elem, len } => {
                write!(f, "[{};{}]", elem.display(self.store), len)
            }
            TypeKind::Struct(s) => {
                let keyword = if s.is_union { "union" } else { "struct" };
                write!(f, "{}.{}", keyword, s.id)
            }
            TypeKind::Function(func) => {
                write!(f, "(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param.display(self.store))?;
                }
                if func.variadic {
                    if !func.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ") -> {}", func.ret.display(self.store))
            }
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

/// The literal part of a constant, without its type.
pub struct ConstLiteral<'a> {
    store: &'a TypeStore,
    value: &'a Const,
}

impl fmt::Display for ConstLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value.kind {
            ConstKind::Int(v) => write!(f, "{}", v),
            ConstKind::Float(v) => write!(f, "{}", v),
            ConstKind::Str(s) => write_escaped(f, s),
            ConstKind::Array(elems) | ConstKind::Struct { elems, .. } => {
                write!(f, "{{ ")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem.literal(self.store))?;
                }
                write!(f, " }}")
            }
            ConstKind::GlobalPtr(name) => write!(f, "@{}", name.trim_start_matches('@')),
        }
    }
}

pub struct ConstDisplay<'a> {
    store: &'a TypeStore,
    value: &'a Const,
}

impl Const {
    pub fn display<'a>(&'a self, store: &'a TypeStore) -> ConstDisplay<'a> {
        ConstDisplay { store, value: self }
    }

    pub fn literal<'a>(&'a self, store: &'a TypeStore) -> ConstLiteral<'a> {
        ConstLiteral { store, value: self }
    }
}

impl fmt::Display for ConstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.value.ty.display(self.store),
            self.value.literal(self.store)
        )
    }
}

pub struct VarDisplay<'a> {
    store: &'a TypeStore,
    var: &'a Var,
}

impl Var {
    pub fn display<'a>(&'a self, store: &'a TypeStore) -> VarDisplay<'a> {
        VarDisplay { store, var: self }
    }
}

impl fmt::Display for VarDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.var.ty.display(self.store), self.var.name)
    }
}

pub struct ValueDisplay<'a> {
    store: &'a TypeStore,
    value: &'a Value,
}

impl Value {
    pub fn display<'a>(&'a self, store: &'a TypeStore) -> ValueDisplay<'a> {
        ValueDisplay { store, value: self }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Const(c) => write!(f, "{}", c.display(self.store)),
            Value::Var(v) => write!(f, "{}", v.display(self.store)),
        }
    }
}

pub struct InstrDisplay<'a> {
    store: &'a TypeStore,
    instr: &'a Instruction,
}

impl Instruction {
    pub fn display<'a>(&'a self, store: &'a TypeStore) -> InstrDisplay<'a> {
        InstrDisplay { store, instr: self }
    }
}

impl fmt::Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store;
        let instr = self.instr;

        if let Some(label) = &instr.label {
            write!(f, "{}: ", label)?;
        }

        let mnemonic = instr.opcode.mnemonic();
        match &instr.operands {
            Operands::None => write!(f, "{}", mnemonic),
            Operands::Assign { value, result } => {
                write!(f, "{} = {} {}", result.name, mnemonic, value.display(store))
            }
            Operands::Binary { left, right, result } => {
                write!(
                    f,
                    "{} = {} {}, {}",
                    result.name,
                    mnemonic,
                    left.display(store),
                    right.display(store)
                )
            }
            Operands::Unary { operand, result } => {
                write!(f, "{} = {} {}", result.name, mnemonic, operand.display(store))
            }
            Operands::Branch { target, cond } => match cond {
                Some(cond) => write!(f, "br {}, {}", cond.display(store), target),
                None => write!(f, "br {}", target),
            },
            Operands::Call { function, args, result } => {
                if let Some(result) = result {
                    write!(f, "{} = ", result.name)?;
                }
                write!(f, "call {}(", function.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg.display(store))?;
                }
                write!(f, ")")
            }
            Operands::Ret { value } => match value {
                Some(value) => write!(f, "ret {}", value.display(store)),
                None => write!(f, "ret"),
            },
            Operands::Alloca { allocated, result } => {
                write!(f, "{} = alloca {}", result.name, allocated.display(store))
            }
            Operands::Store { ptr, value } => {
                write!(f, "store {}, {}", ptr.display(store), value.display(store))
            }
            Operands::Memset { ptr, value, len } => {
                write!(
                    f,
                    "memset {}, {}, {}",
                    ptr.display(store),
                    value.display(store),
                    len.display(store)
                )
            }
            Operands::Memcpy { dest, src, len } => {
                write!(
                    f,
                    "memcpy {}, {}, {}",
                    dest.display(store),
                    src.display(store),
                    len.display(store)
                )
            }
            Operands::Switch { value, cases, default } => {
                write!(f, "switch {}, {}, {{ ", value.display(store), default)?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", case.value.literal(store), case.target)?;
                }
                write!(f, " }}")
            }
            Operands::VaStart { list } => write!(f, "va_start {}", list.display(store)),
            Operands::VaEnd { list } => write!(f, "va_end {}", list.display(store)),
            Operands::VaArg { list, result } => {
                write!(f, "{} = va_arg {}", result.name, list.display(store))
            }
            Operands::VaCopy { dest, src } => {
                write!(f, "va_copy {}, {}", dest.display(store), src.display(store))
            }
        }
    }
}

pub struct GlobalDisplay<'a> {
    store: &'a TypeStore,
    global: &'a Global,
}

impl Global {
    pub fn display<'a>(&'a self, store: &'a TypeStore) -> GlobalDisplay<'a> {
        GlobalDisplay { store, global: self }
    }
}

impl fmt::Display for GlobalDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "global {} {}",
            self.global.init.ty.display(self.store),
            self.global.name
        )?;
        if self.global.initialized {
            write!(f, " = {}", self.global.init.literal(self.store))?;
        }
        Ok(())
    }
}

pub struct FunctionDisplay<'a> {
    store: &'a TypeStore,
    function: &'a FunctionDef,
}

impl FunctionDef {
    pub fn display<'a>(&'a self, store: &'a TypeStore) -> FunctionDisplay<'a> {
        FunctionDisplay { store, function: self }
    }
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function {} {} {{",
            self.function.name,
            self.function.ty.display(self.store)
        )?;
        for instr in &self.function.body {
            writeln!(f, "    {}", instr.display(self.store))?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in &self.globals {
            writeln!(f, "{}", global.display(&self.types))?;
        }
        let mut first = self.globals.is_empty();
        for function in &self.functions {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "{}", function.display(&self.types))?;
        }
        Ok(())
    }
}

pub fn format_type(store: &TypeStore, ty: Type) -> String {
    ty.display(store).to_string()
}

pub fn format_const(store: &TypeStore, value: &Const) -> String {
    value.display(store).to_string()
}

pub fn format_var(store: &TypeStore, var: &Var) -> String {
    var.display(store).to_string()
}

pub fn format_value(store: &TypeStore, value: &Value) -> String {
    value.display(store).to_string()
}

pub fn format_instr(store: &TypeStore, instr: &Instruction) -> String {
    instr.display(store).to_string()
}

pub fn format_module(module: &Module) -> String {
    module.to_string()
}
