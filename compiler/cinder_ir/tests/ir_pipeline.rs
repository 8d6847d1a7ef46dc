//! End-to-end pipeline tests: translate-by-hand, validate, sort globals,
//! build the CFG and convert to SSA, the way the compiler driver strings
//! the passes together.

use pretty_assertions::assert_eq;

use cinder_ir::arch;
use cinder_ir::cfg::Cfg;
use cinder_ir::display::format_module;
use cinder_ir::globals::sort_globals;
use cinder_ir::instr::{Instruction, Opcode};
use cinder_ir::module::{FunctionDef, Global, Module};
use cinder_ir::ssa::build_ssa;
use cinder_ir::types::Type;
use cinder_ir::validate::validate_module;
use cinder_ir::value::{Const, Value, Var};

/// int counter = 0;
/// int *pcounter = &counter;
/// int max(int a, int b) { int r; if (a < b) r = b; else r = a; return r; }
fn build_module() -> Module {
    let mut module = Module::new("pipeline", &arch::X86_64);

    let i32_ptr = module.types.ptr_to(Type::I32);
    let i32_ptr_ptr = module.types.ptr_to(i32_ptr);
    // Deliberately out of dependency order; sort_globals fixes it up.
    module.append_global(Global::new(
        "pcounter",
        i32_ptr_ptr,
        Const::global_ptr(i32_ptr, "counter"),
    ));
    module.append_global(Global::new("counter", i32_ptr, Const::int(Type::I32, 0)));

    let sig = module.types.function(Type::I32, vec![Type::I32, Type::I32], false);
    let mut max = FunctionDef::new(
        "max",
        sig,
        vec![Var::new("%a", Type::I32), Var::new("%b", Type::I32)],
        false,
    );
    max.append_instruction(Instruction::binary(
        Opcode::Lt,
        Value::var("%a", Type::I32),
        Value::var("%b", Type::I32),
        Var::new("%c", Type::BOOL),
    ));
    max.append_instruction(Instruction::br_cond(Value::var("%c", Type::BOOL), "take_b"));
    max.append_instruction(Instruction::assign(
        Value::var("%a", Type::I32),
        Var::new("%r", Type::I32),
    ));
    max.append_instruction(Instruction::br("done"));
    max.append_instruction(
        Instruction::assign(Value::var("%b", Type::I32), Var::new("%r", Type::I32))
            .with_label("take_b"),
    );
    max.append_instruction(Instruction::br("done"));
    max.append_instruction(
        Instruction::ret(Some(Value::var("%r", Type::I32))).with_label("done"),
    );
    module.append_function(max);

    module
}

#[test]
fn module_validates_cleanly() {
    let module = build_module();
    let diags = validate_module(&module);
    assert!(diags.is_empty(), "unexpected diagnostics:\n{}", diags);
}

#[test]
fn globals_are_ordered_definition_first() {
    let mut module = build_module();
    sort_globals(&mut module);
    let names: Vec<&str> = module.globals.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["counter", "pcounter"]);
}

#[test]
fn cfg_shape_of_max() {
    let module = build_module();
    let max = module.function("max").unwrap();
    let mut cfg = Cfg::build(max);
    cfg.prune();

    assert_eq!(cfg.blocks().count(), 4);
    let entry = cfg.block(cfg.entry);
    assert_eq!(entry.successors.len(), 2);

    let done = cfg.block_by_label("done").unwrap();
    assert_eq!(done.predecessors.len(), 2);
    assert!(done.successors.is_empty());

    // Fall-through links agree with the edge lists.
    for block in cfg.blocks() {
        if let Some(fall_through) = block.fall_through {
            assert!(block.successors.contains(&fall_through));
            assert!(block.last().is_some_and(|i| i.opcode.falls_through()));
        }
    }
}

#[test]
fn linearize_covers_every_reachable_instruction() {
    let module = build_module();
    let max = module.function("max").unwrap();
    let mut cfg = Cfg::build(max);
    cfg.prune();

    let flat = cfg.linearize();
    assert_eq!(flat.len(), max.body.len());
    // The entry instructions come first.
    assert_eq!(flat[0].opcode, Opcode::Lt);
}

#[test]
fn ssa_of_max_places_one_phi_at_the_join() {
    let module = build_module();
    let max = module.function("max").unwrap();
    let ssa = build_ssa(max);

    let done = ssa
        .blocks()
        .find(|b| b.label.as_deref() == Some("done"))
        .unwrap();
    assert_eq!(done.phis.len(), 1);
    let phi = &done.phis[0];
    assert_eq!(phi.operands.len(), done.predecessors.len());
    assert_eq!(phi.result.ty, Type::I32);

    // The return consumes the merged value.
    let ret = &done.instructions[0];
    assert_eq!(ret.opcode, Opcode::Ret);
    assert_eq!(ret.uses()[0].name, phi.result.name);

    // Parameters survive under their own names in the entry.
    let entry = ssa.block(ssa.entry);
    let compare_uses: Vec<&str> = entry.instructions[0]
        .uses()
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    assert_eq!(compare_uses, vec!["%a", "%b"]);
}

#[test]
fn ssa_names_are_written_once() {
    let module = build_module();
    let max = module.function("max").unwrap();
    let ssa = build_ssa(max);

    let mut names = Vec::new();
    for block in ssa.blocks() {
        names.extend(block.phis.iter().map(|p| p.result.name.clone()));
        for instr in &block.instructions {
            if let Some(def) = instr.def() {
                names.push(def.name.clone());
            }
        }
    }
    let mut deduped = names.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(names.len(), deduped.len(), "duplicate definition in {:?}", names);
}

#[test]
fn module_text_lists_globals_then_functions() {
    let mut module = build_module();
    sort_globals(&mut module);
    let text = format_module(&module);

    assert!(text.starts_with("global i32 counter = 0\n"));
    assert!(text.contains("global *i32 pcounter = @counter"));
    assert!(text.contains("function max (i32, i32) -> i32 {"));
    assert!(text.contains("    %c = lt i32 %a, i32 %b"));
    assert!(text.contains("    br bool %c, take_b"));
    assert!(text.contains("    take_b: %r = assign i32 %b"));

    let globals_at = text.find("global").unwrap();
    let function_at = text.find("function").unwrap();
    assert!(globals_at < function_at);
}

#[test]
fn validation_reports_are_positional_and_complete() {
    let mut module = Module::new("broken", &arch::X86_64);
    let sig = module.types.function(Type::I32, vec![], false);
    let mut f = FunctionDef::new("f", sig, vec![], false);
    // Two independent problems; both must be reported.
    f.append_instruction(Instruction::br("missing"));
    f.append_instruction(Instruction::ret(Some(Value::int(Type::I64, 0))));
    module.append_function(f);

    let diags = validate_module(&module);
    assert_eq!(diags.error_count(), 2);
    let by_instr: Vec<Option<usize>> = diags.iter().map(|d| d.instr).collect();
    assert!(by_instr.contains(&Some(0)));
    assert!(by_instr.contains(&Some(1)));
}
