//! Typed three-address intermediate representation for the cinder C compiler
//!
//! This crate is the pivot between the front end and the back end. The
//! AST translator appends instructions into a [`Module`]; the validator
//! checks well-formedness without mutating anything; globals are
//! topologically ordered by initializer references; each function is then
//! lifted into a control-flow graph and converted to SSA form for the
//! native code generator.
//!
//! Pipeline: `Module` → [`validate::validate_module`] →
//! [`globals::sort_globals`] → [`cfg::Cfg::build`] + [`Cfg::prune`] →
//! [`ssa::cfg_to_ssa`].
//!
//! [`Module`]: module::Module
//! [`Cfg::prune`]: cfg::Cfg::prune

pub mod arch;
pub mod cfg;
pub mod display;
pub mod globals;
pub mod instr;
pub mod module;
pub mod ssa;
pub mod types;
pub mod validate;
pub mod value;

pub use arch::{ArchDesc, CPrimitive};
pub use cfg::{build_cfg, BasicBlock, BlockId, Cfg};
pub use display::{format_const, format_instr, format_module, format_type, format_value, format_var};
pub use globals::sort_globals;
pub use instr::{Instruction, Opcode, Operands, SwitchCase};
pub use module::{FunctionDef, Global, Module};
pub use ssa::{build_ssa, cfg_to_ssa, Phi, PhiOperand, SsaBlock, SsaCfg};
pub use types::{FunctionType, StructField, StructType, Type, TypeKind, TypeStore};
pub use validate::{validate_function, validate_module};
pub use value::{Const, ConstKind, Value, Var};
