//! Type system representation used during resolution.
//!
//! These are registry-internal types addressed by [`TypeRef`]; they become
//! self-contained [`crate::type_node::TypeNode`]s only when exported.

use std::{fmt::Display, num::NonZeroU32};

use bitflags::bitflags;
use serde::Serialize;

use crate::ast::NameId;
use crate::source::SourceSpan;
use crate::type_node::PrimitiveKind;

/// Canonical type stored in the registry arena
#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
}

impl Type {
    /// can only be called by TypeRegistry
    pub(crate) fn new(kind: TypeKind) -> Self {
        Type { kind }
    }
}

/// Opaque reference to a canonical type.
/// Internally index + 1 (NonZeroU32 for niche optimization).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypeRef(NonZeroU32);

impl TypeRef {
    #[inline]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(TypeRef)
    }

    /// Reference for arena slot `index`
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        TypeRef(NonZeroU32::MIN.saturating_add(index as u32))
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeRef({})", self.get())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QualType {
    pub ty: TypeRef,
    pub qualifiers: TypeQualifiers,
}

impl QualType {
    #[inline]
    pub fn new(ty: TypeRef, qualifiers: TypeQualifiers) -> Self {
        Self { ty, qualifiers }
    }

    #[inline]
    pub fn unqualified(ty: TypeRef) -> Self {
        Self {
            ty,
            qualifiers: TypeQualifiers::empty(),
        }
    }

    #[inline]
    pub fn with_qualifiers(self, add: TypeQualifiers) -> Self {
        Self {
            ty: self.ty,
            qualifiers: self.qualifiers | add,
        }
    }
}

/// The kind of type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Pointer {
        pointee: QualType,
    },
    Array {
        element: QualType,
        len: Option<u64>,
    },
    Function {
        return_type: QualType,
        parameters: Vec<FunctionParameter>,
        is_variadic: bool,
    },
    Record {
        tag: NameId,
        is_anonymous: bool,
        is_union: bool,
        members: Vec<StructMember>,
        is_complete: bool,
        packed: bool,
        span: SourceSpan,
    },
    Enum {
        tag: NameId,
        is_anonymous: bool,
        underlying: PrimitiveKind,
        enumerators: Vec<EnumConstant>,
        is_complete: bool,
        span: SourceSpan,
    },
    /// Typedef alias. Only ever reached through the symbol table; uses are flattened.
    Typedef {
        name: NameId,
        target: QualType,
    },
}

impl TypeKind {
    pub fn is_record(&self) -> bool {
        matches!(self, TypeKind::Record { .. })
    }
}

bitflags! {
    /// Type qualifiers (using bitflags for efficient storage)
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Default)]
    pub struct TypeQualifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const ATOMIC = 1 << 3; // C11 _Atomic
    }
}

impl Display for TypeQualifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (flag, text) in [
            (TypeQualifiers::CONST, "const"),
            (TypeQualifiers::VOLATILE, "volatile"),
            (TypeQualifiers::RESTRICT, "restrict"),
            (TypeQualifiers::ATOMIC, "_Atomic"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{text}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Function parameter information
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub param_type: QualType,
    pub name: Option<NameId>,
}

/// Struct/union member information
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    /// `None` for anonymous members and unnamed bit-fields
    pub name: Option<NameId>,
    pub member_type: QualType,
    pub bit_width: Option<u32>,
    pub span: SourceSpan, // for diagnostic
}

/// Enum constant information
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstant {
    pub name: NameId,
    pub value: i64,
    pub span: SourceSpan,
}
