//! Per-function well-formedness checking
//!
//! Two passes over the flat instruction stream. Pass one enforces operand
//! shapes and types per opcode and records labels and variable types; pass
//! two resolves every branch and switch target against the label map. All
//! diagnostics are accumulated and returned; nothing stops at the first
//! problem and nothing is mutated.

use hashbrown::HashMap;
use log::debug;

use cinder_common::Diagnostics;

use crate::module::{FunctionDef, Module};
use crate::instr::{Instruction, Opcode, Operands};
use crate::types::{Type, TypeStore};
use crate::value::Value;

/// Validates every function in the module and merges the diagnostics.
pub fn validate_module(module: &Module) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for function in &module.functions {
        diags.extend(validate_function(module, function));
    }
    diags
}

/// Validates a single function, returning all diagnostics found.
///
/// Duplicate `switch` case values are currently not rejected; only the case
/// constants' types and targets are checked.
pub fn validate_function(module: &Module, function: &FunctionDef) -> Diagnostics {
    let mut validator = Validator {
        types: &module.types,
        function,
        labels: HashMap::new(),
        var_types: HashMap::new(),
        diags: Diagnostics::new(),
    };
    validator.run();
    debug!(
        "validated function '{}': {} diagnostics",
        function.name,
        validator.diags.len()
    );
    validator.diags
}

struct Validator<'a> {
    types: &'a TypeStore,
    function: &'a FunctionDef,
    labels: HashMap<&'a str, usize>,
    var_types: HashMap<&'a str, Type>,
    diags: Diagnostics,
}

impl<'a> Validator<'a> {
    fn run(&mut self) {
        for (i, instr) in self.function.body.iter().enumerate() {
            self.collect_label(i, instr);
            self.collect_var_types(i, instr);
            self.check_shape(i, instr);
        }
        for (i, instr) in self.function.body.iter().enumerate() {
            self.check_targets(i, instr);
        }
    }

    fn error(&mut self, i: usize, message: impl Into<String>) {
        self.diags.error(message, i);
    }

    fn eq(&self, a: Type, b: Type) -> bool {
        self.types.equals(a, b)
    }

    fn collect_label(&mut self, i: usize, instr: &'a Instruction) {
        if let Some(label) = &instr.label {
            if self.labels.insert(label.as_str(), i).is_some() {
                self.error(i, format!("Duplicate label '{}'", label));
            }
        }
    }

    fn collect_var_types(&mut self, i: usize, instr: &'a Instruction) {
        let vars = instr.uses().into_iter().chain(instr.def());
        let mut conflicts = Vec::new();
        for var in vars {
            match self.var_types.get(var.name.as_str()) {
                Some(&seen) if !self.eq(seen, var.ty) => conflicts.push(var.name.clone()),
                Some(_) => {}
                None => {
                    self.var_types.insert(var.name.as_str(), var.ty);
                }
            }
        }
        for name in conflicts {
            self.error(i, format!("Variable '{}' redefined with a different type", name));
        }
    }

    fn check_shape(&mut self, i: usize, instr: &'a Instruction) {
        use Opcode::*;

        let types = self.types;
        match (instr.opcode, &instr.operands) {
            (Nop, Operands::None) => {}

            (Assign, Operands::Assign { value, result }) => {
                if !self.eq(value.ty(), result.ty) {
                    self.error(i, "Assigned value type does not match the result type");
                }
            }

            (
                Add | Sub | Mul | Div | Mod | And | Or | Shl | Shr | Xor,
                Operands::Binary { left, right, result },
            ) => {
                if !self.eq(left.ty(), right.ty()) {
                    self.error(i, "Operands of a binary operation must have the same type");
                }
                if !self.eq(result.ty, left.ty()) {
                    self.error(i, "Result type of a binary operation must match its operand types");
                }
            }

            (Not, Operands::Unary { operand, result }) => {
                if !self.eq(result.ty, operand.ty()) {
                    self.error(i, "Result type of not must match its operand type");
                }
            }

            (Eq | Ne | Lt | Le | Gt | Ge, Operands::Binary { left, right, result }) => {
                if !self.eq(left.ty(), right.ty()) {
                    self.error(i, "Comparison operands must have the same type");
                }
                if !self.eq(result.ty, Type::BOOL) {
                    self.error(i, "Comparison result must be bool");
                }
            }

            (Br, Operands::Branch { cond: None, .. }) => {}
            (Br, Operands::Branch { cond: Some(_), .. }) => {
                self.error(i, "Unconditional branch must not carry a condition");
            }
            (BrCond, Operands::Branch { cond: Some(cond), .. }) => {
                if !self.eq(cond.ty(), Type::BOOL) {
                    self.error(i, "Branch condition must be bool");
                }
            }
            (BrCond, Operands::Branch { cond: None, .. }) => {
                self.error(i, "Conditional branch requires a condition");
            }

            (Call, Operands::Call { function, result, .. }) => {
                if let (Some(sig), Some(result)) = (types.as_function(function.ty), result) {
                    if !self.eq(result.ty, sig.ret) {
                        self.error(i, "Call result type does not match the function return type");
                    }
                }
            }

            (Ret, Operands::Ret { value }) => {
                let ret_ty = self.function.return_type(types);
                match value {
                    Some(value) => {
                        if !self.eq(value.ty(), ret_ty) {
                            self.error(i, "Return value type does not match function return type");
                        }
                    }
                    None => {
                        if !self.eq(ret_ty, Type::VOID) {
                            self.error(i, "Function with a non-void return type must return a value");
                        }
                    }
                }
            }

            (Alloca, Operands::Alloca { allocated, result }) => {
                match types.pointee(result.ty) {
                    Some(pointee) if self.eq(pointee, *allocated) => {}
                    _ => self.error(i, "Alloca result must be a pointer to the allocated type"),
                }
            }

            (Load, Operands::Unary { operand, result }) => match types.pointee(operand.ty()) {
                None => self.error(i, "Load operand must be a pointer"),
                Some(pointee) => {
                    if !self.eq(result.ty, pointee) {
                        self.error(i, "Load result type must match the pointee type");
                    }
                }
            },

            (Store, Operands::Store { ptr, value }) => match types.pointee(ptr.ty()) {
                None => self.error(i, "Store destination must be a pointer"),
                Some(pointee) => {
                    if !self.eq(value.ty(), pointee) {
                        self.error(i, "Stored value type must match the pointee type");
                    }
                }
            },

            (Memcpy, Operands::Memcpy { dest, src, .. }) => {
                if !types.is_pointer(dest.ty()) && !types.is_array(dest.ty()) {
                    self.error(i, "Memcpy destination must be a pointer or an array");
                }
                if !types.is_pointer(src.ty()) && !types.is_array(src.ty()) {
                    self.error(i, "Memcpy source must be a pointer or an array");
                }
            }

            (Memset, Operands::Memset { ptr, .. }) => {
                if !types.is_pointer(ptr.ty()) && !types.is_array(ptr.ty()) {
                    self.error(i, "Memset destination must be a pointer or an array");
                }
            }

            (GetArrayElementPtr, Operands::Binary { left, right, result }) => {
                if !types.is_integer(right.ty()) {
                    self.error(i, "get_array_element_ptr index must be an integer");
                }
                match types.pointee(left.ty()) {
                    None => self.error(i, "get_array_element_ptr base must be a pointer"),
                    Some(base) => {
                        let elem = types.element(base).unwrap_or(base);
                        match types.pointee(result.ty) {
                            Some(res) if self.eq(res, elem) => {}
                            _ => self.error(
                                i,
                                "get_array_element_ptr result must be a pointer to the element type",
                            ),
                        }
                    }
                }
            }

            (GetStructMemberPtr, Operands::Binary { left, right, result }) => {
                let strukt = types.pointee(left.ty()).and_then(|p| types.as_struct(p));
                let Some(strukt) = strukt else {
                    self.error(i, "get_struct_member_ptr base must be a pointer to a struct");
                    return;
                };
                let index = match right {
                    Value::Const(c) => c.as_int(),
                    Value::Var(_) => None,
                };
                let Some(index) = index else {
                    self.error(i, "get_struct_member_ptr index must be a constant integer");
                    return;
                };
                let Some(field) = usize::try_from(index).ok().and_then(|n| strukt.field(n)) else {
                    self.error(i, "get_struct_member_ptr field index is out of range");
                    return;
                };
                match types.pointee(result.ty) {
                    Some(res) if self.eq(res, field.ty) => {}
                    _ => self.error(
                        i,
                        "get_struct_member_ptr result must be a pointer to the field type",
                    ),
                }
            }

            (Trunc, Operands::Unary { operand, result }) => {
                if !self.same_numeric_kind(operand.ty(), result.ty) {
                    self.error(i, "Truncation operands must both be integers or both be floats");
                } else if self.width(result.ty) >= self.width(operand.ty()) {
                    self.error(
                        i,
                        "Truncation result type must be smaller than the value being truncated",
                    );
                }
            }

            (Ext, Operands::Unary { operand, result }) => {
                if !self.same_numeric_kind(operand.ty(), result.ty) {
                    self.error(i, "Extension operands must both be integers or both be floats");
                } else if self.width(result.ty) <= self.width(operand.ty()) {
                    self.error(
                        i,
                        "Extension result type must be larger than the value being extended",
                    );
                }
            }

            (Ftoi, Operands::Unary { operand, result }) => {
                if !types.is_float(operand.ty()) || !types.is_integer(result.ty) {
                    self.error(i, "ftoi requires a float operand and an integer result");
                }
            }

            (Itof, Operands::Unary { operand, result }) => {
                if !types.is_integer(operand.ty()) || !types.is_float(result.ty) {
                    self.error(i, "itof requires an integer operand and a float result");
                }
            }

            (Ptoi, Operands::Unary { operand, result }) => {
                if !types.is_pointer(operand.ty()) || !types.is_integer(result.ty) {
                    self.error(i, "ptoi requires a pointer operand and an integer result");
                }
            }

            (Itop, Operands::Unary { operand, result }) => {
                if !types.is_integer(operand.ty()) || !types.is_pointer(result.ty) {
                    self.error(i, "itop requires an integer operand and a pointer result");
                }
            }

            (Bitcast, Operands::Unary { .. }) => {}

            (Switch, Operands::Switch { value, cases, .. }) => {
                if !types.is_integer(value.ty()) {
                    self.error(i, "Switch value must be an integer");
                }
                let bad_cases = cases
                    .iter()
                    .any(|case| !types.is_integer(case.value.ty));
                if bad_cases {
                    self.error(i, "Switch case values must be integer constants");
                }
            }

            (VaStart, Operands::VaStart { .. })
            | (VaEnd, Operands::VaEnd { .. })
            | (VaArg, Operands::VaArg { .. })
            | (VaCopy, Operands::VaCopy { .. }) => {}

            _ => self.error(i, "Invalid opcode"),
        }
    }

    fn check_targets(&mut self, i: usize, instr: &'a Instruction) {
        let missing: Vec<String> = instr
            .branch_targets()
            .into_iter()
            .filter(|target| !self.labels.contains_key(*target))
            .map(str::to_owned)
            .collect();
        for target in missing {
            self.error(i, format!("Invalid branch target '{}'", target));
        }
    }

    fn same_numeric_kind(&self, a: Type, b: Type) -> bool {
        (self.types.is_integer(a) && self.types.is_integer(b))
            || (self.types.is_float(a) && self.types.is_float(b))
    }

    fn width(&self, ty: Type) -> u64 {
        // Primitive widths do not depend on the descriptor; x86_64 stands in.
        self.types.size_in_bits(&crate::arch::X86_64, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::instr::SwitchCase;
    use crate::module::Module;
    use crate::value::{Const, Var};

    fn module() -> Module {
        Module::new("unit", &arch::X86_64)
    }

    fn function(module: &mut Module, ret: Type, body: Vec<Instruction>) -> FunctionDef {
        let sig = module.types.function(ret, vec![], false);
        let mut f = FunctionDef::new("f", sig, vec![], false);
        for instr in body {
            f.append_instruction(instr);
        }
        f
    }

    #[test]
    fn return_type_mismatch_is_reported() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::I32,
            vec![Instruction::ret(Some(Value::int(Type::I64, 0)))],
        );
        let diags = validate_function(&m, &f);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.messages[0].message,
            "Return value type does not match function return type"
        );
    }

    #[test]
    fn trunc_to_same_width_is_reported() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::unary(
                    Opcode::Trunc,
                    Value::var("%a", Type::I32),
                    Var::new("%b", Type::I32),
                ),
                Instruction::ret(None),
            ],
        );
        let diags = validate_function(&m, &f);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.messages[0].message,
            "Truncation result type must be smaller than the value being truncated"
        );
        assert_eq!(diags.messages[0].instr, Some(0));
    }

    #[test]
    fn clean_function_validates_twice() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::I32,
            vec![
                Instruction::binary(
                    Opcode::Add,
                    Value::int(Type::I32, 1),
                    Value::int(Type::I32, 2),
                    Var::new("%x", Type::I32),
                ),
                Instruction::ret(Some(Value::var("%x", Type::I32))),
            ],
        );
        assert!(validate_function(&m, &f).is_empty());
        // No false positives on a second run over the same input.
        assert!(validate_function(&m, &f).is_empty());
    }

    #[test]
    fn duplicate_labels_and_unknown_targets() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::nop().with_label("top"),
                Instruction::nop().with_label("top"),
                Instruction::br("nowhere"),
                Instruction::ret(None).with_label("end"),
            ],
        );
        let diags = validate_function(&m, &f);
        let messages: Vec<&str> = diags.messages.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.contains(&"Duplicate label 'top'"));
        assert!(messages.contains(&"Invalid branch target 'nowhere'"));
    }

    #[test]
    fn branch_condition_must_be_bool() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::br_cond(Value::var("%c", Type::I32), "end"),
                Instruction::ret(None).with_label("end"),
            ],
        );
        let diags = validate_function(&m, &f);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.messages[0].message, "Branch condition must be bool");
    }

    #[test]
    fn comparison_result_must_be_bool() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::binary(
                    Opcode::Lt,
                    Value::var("%a", Type::I32),
                    Value::var("%b", Type::I32),
                    Var::new("%c", Type::I32),
                ),
                Instruction::ret(None),
            ],
        );
        let diags = validate_function(&m, &f);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.messages[0].message, "Comparison result must be bool");
    }

    #[test]
    fn load_store_pointer_discipline() {
        let mut m = module();
        let i32_ptr = m.types.ptr_to(Type::I32);
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::alloca(Type::I32, Var::new("%p", i32_ptr)),
                Instruction::store(Value::var("%p", i32_ptr), Value::int(Type::I64, 1)),
                Instruction::load(Value::var("%x", Type::I32), Var::new("%y", Type::I32)),
                Instruction::ret(None),
            ],
        );
        let diags = validate_function(&m, &f);
        let messages: Vec<&str> = diags.messages.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.contains(&"Stored value type must match the pointee type"));
        assert!(messages.contains(&"Load operand must be a pointer"));
    }

    #[test]
    fn struct_member_access_is_checked() {
        let mut m = module();
        let s = m.insert_type(
            "pair",
            vec![("a".into(), Type::I32), ("b".into(), Type::F64)],
            false,
        );
        let s_ptr = m.types.ptr_to(s);
        let f64_ptr = m.types.ptr_to(Type::F64);
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::binary(
                    Opcode::GetStructMemberPtr,
                    Value::var("%s", s_ptr),
                    Value::Const(Const::int(Type::I32, 1)),
                    Var::new("%f", f64_ptr),
                ),
                Instruction::binary(
                    Opcode::GetStructMemberPtr,
                    Value::var("%s", s_ptr),
                    Value::Const(Const::int(Type::I32, 9)),
                    Var::new("%g", f64_ptr),
                ),
                Instruction::ret(None),
            ],
        );
        let diags = validate_function(&m, &f);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.messages[0].message,
            "get_struct_member_ptr field index is out of range"
        );
    }

    #[test]
    fn opcode_operand_mismatch_is_invalid_opcode() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::new(
                    Opcode::Add,
                    Operands::Ret { value: None },
                ),
                Instruction::ret(None),
            ],
        );
        let diags = validate_function(&m, &f);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.messages[0].message, "Invalid opcode");
    }

    #[test]
    fn switch_scrutinee_and_cases_must_be_integers() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::switch(
                    Value::var("%x", Type::F32),
                    vec![SwitchCase {
                        value: Const::float(Type::F32, 1.0),
                        target: "one".into(),
                    }],
                    "other",
                )
                .with_label("one"),
                Instruction::ret(None).with_label("other"),
            ],
        );
        let diags = validate_function(&m, &f);
        let messages: Vec<&str> = diags.messages.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.contains(&"Switch value must be an integer"));
        assert!(messages.contains(&"Switch case values must be integer constants"));
    }

    #[test]
    fn conflicting_variable_types_are_reported() {
        let mut m = module();
        let f = function(
            &mut m,
            Type::VOID,
            vec![
                Instruction::assign(Value::int(Type::I32, 1), Var::new("%x", Type::I32)),
                Instruction::assign(Value::int(Type::I64, 2), Var::new("%x", Type::I64)),
                Instruction::ret(None),
            ],
        );
        let diags = validate_function(&m, &f);
        assert!(diags
            .messages
            .iter()
            .any(|d| d.message == "Variable '%x' redefined with a different type"));
    }
}
