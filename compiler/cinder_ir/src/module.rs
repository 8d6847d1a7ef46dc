//! Module, function and global definitions
//!
//! A [`Module`] owns the type store, the globals (whose order is
//! semantically meaningful: definition must precede use), and the
//! functions. The AST translator drives the append API here; instructions
//! are appended to a function body once and never mutated afterwards.

use crate::arch::ArchDesc;
use crate::instr::Instruction;
use crate::types::{Type, TypeStore};
use crate::value::{Const, Var};

/// A module-level global variable.
///
/// The type is a pointer to the stored value; the initializer carries the
/// value type itself.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub initialized: bool,
    pub init: Const,
}

impl Global {
    pub fn new(name: impl Into<String>, ty: Type, init: Const) -> Self {
        Self { name: name.into(), ty, initialized: true, init }
    }

    pub fn uninitialized(name: impl Into<String>, ty: Type, zero: Const) -> Self {
        Self { name: name.into(), ty, initialized: false, init: zero }
    }
}

/// A function definition holding the flat (pre-CFG) instruction stream.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    /// The function's signature type.
    pub ty: Type,
    pub params: Vec<Var>,
    pub variadic: bool,
    pub body: Vec<Instruction>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, ty: Type, params: Vec<Var>, variadic: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            params,
            variadic,
            body: Vec::new(),
        }
    }

    pub fn append_instruction(&mut self, instr: Instruction) {
        self.body.push(instr);
    }

    /// The declared return type, from the signature in the store.
    pub fn return_type(&self, types: &TypeStore) -> Type {
        types
            .as_function(self.ty)
            .map(|f| f.ret)
            .unwrap_or(Type::VOID)
    }
}

/// A compilation unit: globals, struct types and functions for one target.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub arch: &'static ArchDesc,
    pub types: TypeStore,
    pub globals: Vec<Global>,
    pub functions: Vec<FunctionDef>,
}

impl Module {
    pub fn new(name: impl Into<String>, arch: &'static ArchDesc) -> Self {
        Self {
            name: name.into(),
            arch,
            types: TypeStore::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn append_global(&mut self, global: Global) {
        self.globals.push(global);
    }

    /// Registers a struct or union type under its id.
    pub fn insert_type(
        &mut self,
        id: impl Into<String>,
        fields: Vec<(String, Type)>,
        is_union: bool,
    ) -> Type {
        self.types.structure(id, fields, is_union)
    }

    pub fn append_function(&mut self, function: FunctionDef) {
        self.functions.push(function);
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;

    #[test]
    fn append_and_lookup() {
        let mut module = Module::new("unit", &arch::X86_64);
        let i32_ptr = module.types.ptr_to(Type::I32);
        module.append_global(Global::new("@x", i32_ptr, Const::int(Type::I32, 0)));

        let sig = module.types.function(Type::I32, vec![Type::I32], false);
        let mut main = FunctionDef::new("main", sig, vec![Var::new("%argc", Type::I32)], false);
        main.append_instruction(Instruction::ret(Some(crate::value::Value::int(Type::I32, 0))));
        module.append_function(main);

        assert!(module.global("@x").is_some());
        let f = module.function("main").unwrap();
        assert_eq!(f.return_type(&module.types), Type::I32);
        assert_eq!(f.body.len(), 1);
    }
}
