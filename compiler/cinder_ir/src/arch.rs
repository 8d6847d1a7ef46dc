//! Target architecture descriptors
//!
//! An [`ArchDesc`] fixes everything about the IR that depends on the target:
//! which IR type each C primitive lowers to, which integer type has pointer
//! width, and the alignment of each scalar width. The descriptor is the only
//! place ABI width decisions live; notably `long` is 32-bit on x86/arm32 and
//! 64-bit on x86_64/arm64.

use cinder_common::{CinderError, CinderResult};
use serde::{Deserialize, Serialize};

use crate::types::Type;

/// C primitive types as classified by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CPrimitive {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
}

/// Immutable description of a target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchDesc {
    name: &'static str,
    ptr_int: Type,
    long_int: Type,
    unsigned_long_int: Type,
}

/// 32-bit x86.
pub const X86: ArchDesc = ArchDesc {
    name: "x86",
    ptr_int: Type::U32,
    long_int: Type::I32,
    unsigned_long_int: Type::U32,
};

/// 64-bit x86.
pub const X86_64: ArchDesc = ArchDesc {
    name: "x86_64",
    ptr_int: Type::U64,
    long_int: Type::I64,
    unsigned_long_int: Type::U64,
};

/// 32-bit ARM.
pub const ARM32: ArchDesc = ArchDesc {
    name: "arm32",
    ptr_int: Type::U32,
    long_int: Type::I32,
    unsigned_long_int: Type::U32,
};

/// 64-bit ARM.
pub const ARM64: ArchDesc = ArchDesc {
    name: "arm64",
    ptr_int: Type::U64,
    long_int: Type::I64,
    unsigned_long_int: Type::U64,
};

impl ArchDesc {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The IR type a C primitive lowers to on this architecture.
    pub fn prim_type(&self, prim: CPrimitive) -> Type {
        match prim {
            CPrimitive::Void => Type::VOID,
            CPrimitive::Bool => Type::BOOL,
            CPrimitive::Char | CPrimitive::SignedChar => Type::I8,
            CPrimitive::UnsignedChar => Type::U8,
            CPrimitive::Short => Type::I16,
            CPrimitive::UnsignedShort => Type::U16,
            CPrimitive::Int => Type::I32,
            CPrimitive::UnsignedInt => Type::U32,
            CPrimitive::Long => self.long_int,
            CPrimitive::UnsignedLong => self.unsigned_long_int,
            CPrimitive::LongLong => Type::I64,
            CPrimitive::UnsignedLongLong => Type::U64,
            CPrimitive::Float => Type::F32,
            CPrimitive::Double => Type::F64,
        }
    }

    /// The integer type with the same width as a pointer.
    pub fn ptr_int_type(&self) -> Type {
        self.ptr_int
    }

    /// Alignment in bytes of a scalar of the given byte size.
    ///
    /// All supported architectures self-align scalars.
    pub fn scalar_alignment(&self, size_bytes: u64) -> u64 {
        size_bytes.max(1)
    }

    /// Selects the descriptor matching the architecture component of a
    /// target name (e.g. `x86_64` for `x86_64-unknown-linux-gnu`).
    pub fn from_arch_name(arch: &str) -> Option<&'static ArchDesc> {
        match arch {
            "i386" | "x86" => Some(&X86),
            "amd64" | "x86_64" => Some(&X86_64),
            "arm32" | "aarch32" => Some(&ARM32),
            "arm64" | "aarch64" => Some(&ARM64),
            _ => None,
        }
    }

    /// Resolves a full target triple, matching on the text before the
    /// first `-`.
    pub fn for_target(triple: &str) -> CinderResult<&'static ArchDesc> {
        let arch = triple.split('-').next().unwrap_or(triple);
        Self::from_arch_name(arch).ok_or_else(|| CinderError::unsupported_target(triple))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_resolution() {
        let arch = ArchDesc::for_target("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(arch.name(), "x86_64");

        let arch = ArchDesc::for_target("aarch64-apple-darwin").unwrap();
        assert_eq!(arch.name(), "arm64");

        assert!(ArchDesc::for_target("riscv64-unknown-elf").is_err());
    }

    #[test]
    fn long_width_is_per_arch() {
        assert_eq!(X86.prim_type(CPrimitive::Long), Type::I32);
        assert_eq!(ARM32.prim_type(CPrimitive::Long), Type::I32);
        assert_eq!(X86_64.prim_type(CPrimitive::Long), Type::I64);
        assert_eq!(ARM64.prim_type(CPrimitive::Long), Type::I64);
    }

    #[test]
    fn pointer_int_width() {
        assert_eq!(X86.ptr_int_type(), Type::U32);
        assert_eq!(X86_64.ptr_int_type(), Type::U64);
    }
}
