//! Values, variables and constants
//!
//! A [`Value`] is either a [`Const`] or a [`Var`]. Variable names follow the
//! textual IR convention: a leading `%` marks a function-local variable, a
//! leading `@` marks a global, and any other name designates a function with
//! external linkage.

use serde::{Deserialize, Serialize};

use crate::types::Type;

/// A named, typed variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    pub ty: Type,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }

    /// Function-local variable (`%` prefix).
    pub fn is_local(&self) -> bool {
        self.name.starts_with('%')
    }

    /// Module global (`@` prefix).
    pub fn is_global(&self) -> bool {
        self.name.starts_with('@')
    }

    /// Neither local nor global: a function designator.
    pub fn is_designator(&self) -> bool {
        !self.is_local() && !self.is_global()
    }
}

/// Payload of a constant, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstKind {
    /// Integer payload, reinterpreted according to the constant's type.
    Int(i64),
    Float(f64),
    /// Immutable byte string; the formatter renders it quoted and escaped.
    Str(String),
    Array(Vec<Const>),
    Struct {
        is_union: bool,
        /// Index of the initialized field, for unions.
        union_field: Option<usize>,
        elems: Vec<Const>,
    },
    /// Reference to another global by name (without the `@` sigil).
    GlobalPtr(String),
}

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Const {
    pub ty: Type,
    pub kind: ConstKind,
}

impl Const {
    pub fn int(ty: Type, value: i64) -> Self {
        Self { ty, kind: ConstKind::Int(value) }
    }

    pub fn float(ty: Type, value: f64) -> Self {
        Self { ty, kind: ConstKind::Float(value) }
    }

    pub fn string(ty: Type, value: impl Into<String>) -> Self {
        Self { ty, kind: ConstKind::Str(value.into()) }
    }

    pub fn array(ty: Type, elems: Vec<Const>) -> Self {
        Self { ty, kind: ConstKind::Array(elems) }
    }

    pub fn structure(ty: Type, elems: Vec<Const>) -> Self {
        Self {
            ty,
            kind: ConstKind::Struct { is_union: false, union_field: None, elems },
        }
    }

    pub fn union(ty: Type, field: usize, elems: Vec<Const>) -> Self {
        Self {
            ty,
            kind: ConstKind::Struct { is_union: true, union_field: Some(field), elems },
        }
    }

    pub fn global_ptr(ty: Type, name: impl Into<String>) -> Self {
        Self { ty, kind: ConstKind::GlobalPtr(name.into()) }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            ConstKind::Int(v) => Some(v),
            _ => None,
        }
    }
}

/// Either a constant or a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Const(Const),
    Var(Var),
}

impl Value {
    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Value::Var(Var::new(name, ty))
    }

    pub fn int(ty: Type, value: i64) -> Self {
        Value::Const(Const::int(ty, value))
    }

    pub fn float(ty: Type, value: f64) -> Self {
        Value::Const(Const::float(ty, value))
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Const(c) => c.ty,
            Value::Var(v) => v.ty,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Value::Var(v) => Some(v),
            Value::Const(_) => None,
        }
    }

    pub fn as_var_mut(&mut self) -> Option<&mut Var> {
        match self {
            Value::Var(v) => Some(v),
            Value::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Value::Const(c) => Some(c),
            Value::Var(_) => None,
        }
    }
}

impl From<Var> for Value {
    fn from(var: Var) -> Self {
        Value::Var(var)
    }
}

impl From<Const> for Value {
    fn from(c: Const) -> Self {
        Value::Const(c)
    }
}
