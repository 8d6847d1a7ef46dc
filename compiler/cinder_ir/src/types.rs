//! IR types and the interned type store
//!
//! Types are interned in a [`TypeStore`] and referred to by the `Copy`
//! handle [`Type`]. The twelve primitive types are pre-interned at fixed
//! indices so they are usable without a store in hand. Struct types are
//! registered by id; a struct field may point back at its own struct
//! through a pointer, which the handle representation expresses without
//! ownership cycles.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::arch::ArchDesc;

/// Handle to an interned IR type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Type(u32);

impl Type {
    pub const VOID: Type = Type(0);
    pub const BOOL: Type = Type(1);
    pub const I8: Type = Type(2);
    pub const I16: Type = Type(3);
    pub const I32: Type = Type(4);
    pub const I64: Type = Type(5);
    pub const U8: Type = Type(6);
    pub const U16: Type = Type(7);
    pub const U32: Type = Type(8);
    pub const U64: Type = Type(9);
    pub const F32: Type = Type(10);
    pub const F64: Type = Type(11);

    const FIRST_NON_PRIMITIVE: u32 = 12;

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The structure of a type, stored behind a [`Type`] handle.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Ptr(Type),
    Array { elem: Type, len: u64 },
    Struct(StructType),
    Function(FunctionType),
}

/// One field of a struct or union.
#[derive(Debug, Clone)]
pub struct StructField {
    pub index: usize,
    pub name: String,
    pub ty: Type,
}

/// A struct or union definition. The id is the unique identity; structural
/// equality between struct types compares ids only.
#[derive(Debug, Clone)]
pub struct StructType {
    pub id: String,
    pub fields: Vec<StructField>,
    by_name: HashMap<String, usize>,
    pub is_union: bool,
}

impl StructType {
    fn new(id: String, fields: Vec<(String, Type)>, is_union: bool) -> Self {
        let fields: Vec<StructField> = fields
            .into_iter()
            .enumerate()
            .map(|(index, (name, ty))| StructField { index, name, ty })
            .collect();
        let by_name = fields
            .iter()
            .map(|f| (f.name.clone(), f.index))
            .collect();
        Self { id, fields, by_name, is_union }
    }

    pub fn field(&self, index: usize) -> Option<&StructField> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&StructField> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }
}

/// A function signature type.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

/// Interner and owner of all types in a module.
#[derive(Debug, Clone)]
pub struct TypeStore {
    kinds: Vec<TypeKind>,
    ptrs: HashMap<Type, Type>,
    arrays: HashMap<(Type, u64), Type>,
    structs: HashMap<String, Type>,
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeStore {
    pub fn new() -> Self {
        let kinds = vec![
            TypeKind::Void,
            TypeKind::Bool,
            TypeKind::I8,
            TypeKind::I16,
            TypeKind::I32,
            TypeKind::I64,
            TypeKind::U8,
            TypeKind::U16,
            TypeKind::U32,
            TypeKind::U64,
            TypeKind::F32,
            TypeKind::F64,
        ];
        debug_assert_eq!(kinds.len() as u32, Type::FIRST_NON_PRIMITIVE);
        Self {
            kinds,
            ptrs: HashMap::new(),
            arrays: HashMap::new(),
            structs: HashMap::new(),
        }
    }

    fn push(&mut self, kind: TypeKind) -> Type {
        let handle = Type(self.kinds.len() as u32);
        self.kinds.push(kind);
        handle
    }

    pub fn kind(&self, ty: Type) -> &TypeKind {
        &self.kinds[ty.index()]
    }

    /// Interns a pointer to `pointee`.
    pub fn ptr_to(&mut self, pointee: Type) -> Type {
        if let Some(&existing) = self.ptrs.get(&pointee) {
            return existing;
        }
        let handle = self.push(TypeKind::Ptr(pointee));
        self.ptrs.insert(pointee, handle);
        handle
    }

    /// Interns a fixed-length array of `elem`.
    pub fn array_of(&mut self, elem: Type, len: u64) -> Type {
        if let Some(&existing) = self.arrays.get(&(elem, len)) {
            return existing;
        }
        let handle = self.push(TypeKind::Array { elem, len });
        self.arrays.insert((elem, len), handle);
        handle
    }

    /// Creates a function signature type. Signatures are not deduplicated.
    pub fn function(&mut self, ret: Type, params: Vec<Type>, variadic: bool) -> Type {
        self.push(TypeKind::Function(FunctionType { ret, params, variadic }))
    }

    /// Declares a struct or union by id with no fields yet, or returns the
    /// existing handle. Forward declaration is what lets a field point back
    /// at its own struct through `ptr_to`.
    pub fn declare_struct(&mut self, id: impl Into<String>, is_union: bool) -> Type {
        let id = id.into();
        if let Some(&existing) = self.structs.get(&id) {
            return existing;
        }
        let handle = self.push(TypeKind::Struct(StructType::new(id.clone(), Vec::new(), is_union)));
        self.structs.insert(id, handle);
        handle
    }

    /// Registers a struct or union with the given fields, completing a
    /// forward declaration if one exists.
    pub fn structure(
        &mut self,
        id: impl Into<String>,
        fields: Vec<(String, Type)>,
        is_union: bool,
    ) -> Type {
        let id = id.into();
        let handle = self.declare_struct(id.clone(), is_union);
        self.kinds[handle.index()] = TypeKind::Struct(StructType::new(id, fields, is_union));
        handle
    }

    pub fn struct_by_id(&self, id: &str) -> Option<Type> {
        self.structs.get(id).copied()
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self, ty: Type) -> Option<Type> {
        match self.kind(ty) {
            TypeKind::Ptr(pointee) => Some(*pointee),
            _ => None,
        }
    }

    /// The element type of an array type.
    pub fn element(&self, ty: Type) -> Option<Type> {
        match self.kind(ty) {
            TypeKind::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    pub fn as_struct(&self, ty: Type) -> Option<&StructType> {
        match self.kind(ty) {
            TypeKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self, ty: Type) -> Option<&FunctionType> {
        match self.kind(ty) {
            TypeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_integer(&self, ty: Type) -> bool {
        matches!(
            self.kind(ty),
            TypeKind::I8
                | TypeKind::I16
                | TypeKind::I32
                | TypeKind::I64
                | TypeKind::U8
                | TypeKind::U16
                | TypeKind::U32
                | TypeKind::U64
        )
    }

    pub fn is_signed(&self, ty: Type) -> bool {
        matches!(
            self.kind(ty),
            TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::I64
        )
    }

    pub fn is_float(&self, ty: Type) -> bool {
        matches!(self.kind(ty), TypeKind::F32 | TypeKind::F64)
    }

    pub fn is_pointer(&self, ty: Type) -> bool {
        matches!(self.kind(ty), TypeKind::Ptr(_))
    }

    pub fn is_array(&self, ty: Type) -> bool {
        matches!(self.kind(ty), TypeKind::Array { .. })
    }

    pub fn is_scalar(&self, ty: Type) -> bool {
        self.is_integer(ty)
            || self.is_float(ty)
            || self.is_pointer(ty)
            || matches!(self.kind(ty), TypeKind::Bool)
    }

    /// Structural equality. Struct and union types compare by id only, which
    /// keeps the comparison terminating in the presence of
    /// pointer-to-own-struct fields.
    pub fn equals(&self, a: Type, b: Type) -> bool {
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (TypeKind::Ptr(x), TypeKind::Ptr(y)) => self.equals(*x, *y),
            (
                TypeKind::Array { elem: ea, len: la },
                TypeKind::Array { elem: eb, len: lb },
            ) => la == lb && self.equals(*ea, *eb),
            (TypeKind::Struct(sa), TypeKind::Struct(sb)) => sa.id == sb.id,
            (TypeKind::Function(fa), TypeKind::Function(fb)) => {
                fa.variadic == fb.variadic
                    && fa.params.len() == fb.params.len()
                    && self.equals(fa.ret, fb.ret)
                    && fa
                        .params
                        .iter()
                        .zip(&fb.params)
                        .all(|(&pa, &pb)| self.equals(pa, pb))
            }
            (ka, kb) => std::mem::discriminant(ka) == std::mem::discriminant(kb),
        }
    }

    /// Size of a type in bits on the given architecture.
    ///
    /// Void and function types have no size and report 0.
    pub fn size_in_bits(&self, arch: &ArchDesc, ty: Type) -> u64 {
        match self.kind(ty) {
            TypeKind::Void | TypeKind::Function(_) => 0,
            TypeKind::Bool => 1,
            TypeKind::I8 | TypeKind::U8 => 8,
            TypeKind::I16 | TypeKind::U16 => 16,
            TypeKind::I32 | TypeKind::U32 | TypeKind::F32 => 32,
            TypeKind::I64 | TypeKind::U64 | TypeKind::F64 => 64,
            TypeKind::Ptr(_) => self.size_in_bits(arch, arch.ptr_int_type()),
            TypeKind::Array { elem, len } => len * self.size_in_bits(arch, *elem),
            TypeKind::Struct(s) if s.is_union => s
                .fields
                .iter()
                .map(|f| self.size_in_bytes(arch, f.ty))
                .max()
                .unwrap_or(0)
                .checked_mul(8)
                .unwrap_or(0),
            TypeKind::Struct(s) => s
                .fields
                .iter()
                .map(|f| self.size_in_bytes(arch, f.ty))
                .sum::<u64>()
                .checked_mul(8)
                .unwrap_or(0),
        }
    }

    /// Size of a type in whole bytes (bits rounded up).
    pub fn size_in_bytes(&self, arch: &ArchDesc, ty: Type) -> u64 {
        self.size_in_bits(arch, ty).div_ceil(8)
    }

    /// Alignment of a type in bytes.
    ///
    /// Scalars are self-aligned through the architecture descriptor. Arrays
    /// inherit their element alignment; structs and unions inherit their
    /// first field's alignment (1 when empty).
    pub fn alignment(&self, arch: &ArchDesc, ty: Type) -> u64 {
        match self.kind(ty) {
            TypeKind::Void | TypeKind::Function(_) => 1,
            TypeKind::Ptr(_) => self.alignment(arch, arch.ptr_int_type()),
            TypeKind::Array { elem, .. } => self.alignment(arch, *elem),
            TypeKind::Struct(s) => s
                .fields
                .first()
                .map(|f| self.alignment(arch, f.ty))
                .unwrap_or(1),
            _ => arch.scalar_alignment(self.size_in_bytes(arch, ty)),
        }
    }

    /// Returns a copy of `src` with synthetic `[u8; n]` fields named
    /// `__padding_<k>` inserted so every field lands on its natural
    /// alignment. The padded type keeps the source id; it is a distinct
    /// handle and is not registered in the by-id map. Must not be applied
    /// to unions.
    pub fn pad_struct(&mut self, arch: &ArchDesc, src: Type) -> Type {
        let source = match self.kind(src) {
            TypeKind::Struct(s) => {
                assert!(!s.is_union, "unions are not padded");
                s.clone()
            }
            _ => panic!("pad_struct applied to a non-struct type"),
        };

        let mut fields: Vec<(String, Type)> = Vec::with_capacity(source.fields.len());
        let mut offset: u64 = 0;
        let mut padding_count = 0usize;
        for field in &source.fields {
            let align = self.alignment(arch, field.ty);
            let over = offset % align;
            if over != 0 {
                let pad = align - over;
                let pad_ty = self.array_of(Type::U8, pad);
                fields.push((format!("__padding_{}", padding_count), pad_ty));
                padding_count += 1;
                offset += pad;
            }
            offset += self.size_in_bytes(arch, field.ty);
            fields.push((field.name.clone(), field.ty));
        }

        self.push(TypeKind::Struct(StructType::new(source.id, fields, false)))
    }

    /// Byte offset of each field of a struct, in field order. For padded
    /// structs these are the offsets the back end will see.
    pub fn field_offsets(&self, arch: &ArchDesc, ty: Type) -> Vec<u64> {
        let s = match self.kind(ty) {
            TypeKind::Struct(s) => s,
            _ => return Vec::new(),
        };
        if s.is_union {
            return vec![0; s.fields.len()];
        }
        let mut offsets = Vec::with_capacity(s.fields.len());
        let mut offset = 0;
        for field in &s.fields {
            offsets.push(offset);
            offset += self.size_in_bytes(arch, field.ty);
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;

    #[test]
    fn primitive_handles_are_stable() {
        let store = TypeStore::new();
        assert!(matches!(store.kind(Type::VOID), TypeKind::Void));
        assert!(matches!(store.kind(Type::I32), TypeKind::I32));
        assert!(matches!(store.kind(Type::F64), TypeKind::F64));
    }

    #[test]
    fn pointer_and_array_interning_dedups() {
        let mut store = TypeStore::new();
        let p1 = store.ptr_to(Type::I32);
        let p2 = store.ptr_to(Type::I32);
        assert_eq!(p1, p2);

        let a1 = store.array_of(Type::U8, 3);
        let a2 = store.array_of(Type::U8, 3);
        let a3 = store.array_of(Type::U8, 4);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);
    }

    #[test]
    fn struct_equality_is_by_id() {
        let mut store = TypeStore::new();
        let s1 = store.structure("point", vec![("x".into(), Type::I32)], false);
        // A padded clone keeps the id and stays equal to the source.
        let s2 = store.pad_struct(&arch::X86_64, s1);
        assert_ne!(s1, s2);
        assert!(store.equals(s1, s2));

        let other = store.structure("rect", vec![("x".into(), Type::I32)], false);
        assert!(!store.equals(s1, other));
    }

    #[test]
    fn function_equality_is_structural() {
        let mut store = TypeStore::new();
        let f1 = store.function(Type::I32, vec![Type::I32, Type::F64], false);
        let f2 = store.function(Type::I32, vec![Type::I32, Type::F64], false);
        let f3 = store.function(Type::I32, vec![Type::I32, Type::F64], true);
        assert_ne!(f1, f2);
        assert!(store.equals(f1, f2));
        assert!(!store.equals(f1, f3));
    }

    #[test]
    fn self_referential_struct_terminates() {
        let mut store = TypeStore::new();
        let node = store.declare_struct("node", false);
        let link = store.ptr_to(node);
        let node = store.structure(
            "node",
            vec![("value".into(), Type::I32), ("next".into(), link)],
            false,
        );
        assert!(store.equals(node, node));
        let s = store.as_struct(node).unwrap();
        assert_eq!(s.field_by_name("next").unwrap().ty, link);
    }

    #[test]
    fn sizes_follow_the_descriptor() {
        let mut store = TypeStore::new();
        let p = store.ptr_to(Type::I8);
        assert_eq!(store.size_in_bits(&arch::X86, p), 32);
        assert_eq!(store.size_in_bits(&arch::X86_64, p), 64);

        let a = store.array_of(Type::I16, 5);
        assert_eq!(store.size_in_bits(&arch::X86_64, a), 80);
        assert_eq!(store.size_in_bytes(&arch::X86_64, a), 10);

        assert_eq!(store.size_in_bits(&arch::X86_64, Type::BOOL), 1);
        assert_eq!(store.size_in_bytes(&arch::X86_64, Type::BOOL), 1);
    }

    #[test]
    fn union_size_is_max_of_fields() {
        let mut store = TypeStore::new();
        let u = store.structure(
            "either",
            vec![("a".into(), Type::I64), ("b".into(), Type::I8)],
            true,
        );
        assert_eq!(store.size_in_bytes(&arch::X86_64, u), 8);
        assert_eq!(store.alignment(&arch::X86_64, u), 8);
    }

    #[test]
    fn pad_struct_inserts_byte_arrays() {
        let mut store = TypeStore::new();
        let s = store.structure(
            "s",
            vec![("a".into(), Type::I8), ("b".into(), Type::I32)],
            false,
        );
        let padded = store.pad_struct(&arch::X86_64, s);

        let def = store.as_struct(padded).unwrap().clone();
        let names: Vec<&str> = def.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "__padding_0", "b"]);
        let pad_ty = def.fields[1].ty;
        assert_eq!(store.element(pad_ty), Some(Type::U8));
        assert_eq!(store.size_in_bytes(&arch::X86_64, pad_ty), 3);

        assert_eq!(store.field_offsets(&arch::X86_64, padded), vec![0, 1, 4]);
        assert_eq!(store.size_in_bytes(&arch::X86_64, padded), 8);
    }

    #[test]
    fn pad_struct_aligned_input_is_unchanged_in_shape() {
        let mut store = TypeStore::new();
        let s = store.structure(
            "s",
            vec![("a".into(), Type::I32), ("b".into(), Type::I32)],
            false,
        );
        let padded = store.pad_struct(&arch::X86_64, s);
        assert_eq!(store.as_struct(padded).unwrap().fields.len(), 2);
    }
}
