//! Self-contained resolved types handed out with descriptors.
//!
//! A [`TypeNode`] owns everything it needs: typedefs are already flattened, records and
//! enums are shared through `Arc`, and any edge from a pointer to a tagged record is a
//! by-name [`TypeNode::RecordRef`], so recursive structures never form ownership cycles.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::semantic::TypeQualifiers;

/// C primitive types. The fixed-width and pointer-sized names are first-class kinds
/// rather than typedefs so that descriptors keep the spelling the header used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PrimitiveKind {
    Void,
    Bool,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Size,
    SSize,
    IntPtr,
    UIntPtr,
    PtrDiff,
}

impl PrimitiveKind {
    /// Map a builtin type name such as `int32_t` to its kind
    pub fn from_builtin_name(name: &str) -> Option<Self> {
        let kind = match name {
            "int8_t" => PrimitiveKind::Int8,
            "uint8_t" => PrimitiveKind::UInt8,
            "int16_t" => PrimitiveKind::Int16,
            "uint16_t" => PrimitiveKind::UInt16,
            "int32_t" => PrimitiveKind::Int32,
            "uint32_t" => PrimitiveKind::UInt32,
            "int64_t" => PrimitiveKind::Int64,
            "uint64_t" => PrimitiveKind::UInt64,
            "size_t" => PrimitiveKind::Size,
            "ssize_t" => PrimitiveKind::SSize,
            "intptr_t" => PrimitiveKind::IntPtr,
            "uintptr_t" => PrimitiveKind::UIntPtr,
            "ptrdiff_t" => PrimitiveKind::PtrDiff,
            _ => return None,
        };
        Some(kind)
    }

    pub const BUILTIN_NAMES: [&'static str; 13] = [
        "int8_t",
        "uint8_t",
        "int16_t",
        "uint16_t",
        "int32_t",
        "uint32_t",
        "int64_t",
        "uint64_t",
        "size_t",
        "ssize_t",
        "intptr_t",
        "uintptr_t",
        "ptrdiff_t",
    ];

    /// C spelling of the type
    pub fn c_name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Bool => "_Bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::SChar => "signed char",
            PrimitiveKind::UChar => "unsigned char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::UShort => "unsigned short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::UInt => "unsigned int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::ULong => "unsigned long",
            PrimitiveKind::LongLong => "long long",
            PrimitiveKind::ULongLong => "unsigned long long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::LongDouble => "long double",
            PrimitiveKind::Int8 => "int8_t",
            PrimitiveKind::UInt8 => "uint8_t",
            PrimitiveKind::Int16 => "int16_t",
            PrimitiveKind::UInt16 => "uint16_t",
            PrimitiveKind::Int32 => "int32_t",
            PrimitiveKind::UInt32 => "uint32_t",
            PrimitiveKind::Int64 => "int64_t",
            PrimitiveKind::UInt64 => "uint64_t",
            PrimitiveKind::Size => "size_t",
            PrimitiveKind::SSize => "ssize_t",
            PrimitiveKind::IntPtr => "intptr_t",
            PrimitiveKind::UIntPtr => "uintptr_t",
            PrimitiveKind::PtrDiff => "ptrdiff_t",
        }
    }

    pub fn is_void(self) -> bool {
        self == PrimitiveKind::Void
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double | PrimitiveKind::LongDouble)
    }

    /// Integer kinds, including `_Bool` and the character types
    pub fn is_integer(self) -> bool {
        !self.is_void() && !self.is_floating()
    }

    pub fn is_char_like(self) -> bool {
        matches!(self, PrimitiveKind::Char | PrimitiveKind::SChar | PrimitiveKind::UChar)
    }

    /// Signedness; `None` for plain `char`, whose signedness is target-defined.
    pub fn is_signed(self) -> Option<bool> {
        let signed = match self {
            PrimitiveKind::Char => return None,
            PrimitiveKind::SChar
            | PrimitiveKind::Short
            | PrimitiveKind::Int
            | PrimitiveKind::Long
            | PrimitiveKind::LongLong
            | PrimitiveKind::Int8
            | PrimitiveKind::Int16
            | PrimitiveKind::Int32
            | PrimitiveKind::Int64
            | PrimitiveKind::SSize
            | PrimitiveKind::IntPtr
            | PrimitiveKind::PtrDiff
            | PrimitiveKind::Float
            | PrimitiveKind::Double
            | PrimitiveKind::LongDouble => true,
            _ => false,
        };
        Some(signed)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    Struct,
    Union,
}

impl RecordKind {
    pub fn keyword(self) -> &'static str {
        match self {
            RecordKind::Struct => "struct",
            RecordKind::Union => "union",
        }
    }
}

/// A resolved, self-contained C type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TypeNode {
    Primitive(PrimitiveKind),
    Pointer {
        pointee: Box<TypeNode>,
        qualifiers: TypeQualifiers,
    },
    Array {
        element: Box<TypeNode>,
        qualifiers: TypeQualifiers,
        len: Option<u64>,
    },
    Function {
        ret: Box<TypeNode>,
        params: Vec<TypeNode>,
        is_variadic: bool,
    },
    Record(Arc<RecordType>),
    /// By-name edge to a tagged record, used behind pointers
    RecordRef {
        kind: RecordKind,
        tag: String,
    },
    Enum(Arc<EnumType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordType {
    pub kind: RecordKind,
    pub tag: Option<String>,
    /// `None` while the record is opaque (declared but never defined)
    pub fields: Option<Vec<Field>>,
    pub packed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Field {
    /// `None` for anonymous struct/union members and unnamed bit-fields
    pub name: Option<String>,
    pub ty: TypeNode,
    pub qualifiers: TypeQualifiers,
    pub bit_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnumType {
    pub tag: Option<String>,
    pub underlying: PrimitiveKind,
    /// `None` for an enum that is referenced but never defined
    pub members: Option<Vec<EnumMember>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

impl RecordType {
    /// `struct tag` / `union tag`, or `struct <anonymous>`
    pub fn display_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{} {}", self.kind.keyword(), tag),
            None => format!("{} <anonymous>", self.kind.keyword()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fields.is_some()
    }

    /// Find a named field, looking through anonymous members.
    /// Returns the chain of fields from this record down to the match.
    pub fn find_field(&self, name: &str) -> Option<Vec<&Field>> {
        for field in self.fields.as_deref()? {
            match (&field.name, &field.ty) {
                (Some(n), _) if n == name => return Some(vec![field]),
                (None, TypeNode::Record(inner)) => {
                    if let Some(mut path) = inner.find_field(name) {
                        path.insert(0, field);
                        return Some(path);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl TypeNode {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeNode::Primitive(kind)
    }

    pub fn pointer_to(pointee: TypeNode, qualifiers: TypeQualifiers) -> Self {
        TypeNode::Pointer {
            pointee: Box::new(pointee),
            qualifiers,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeNode::Primitive(PrimitiveKind::Void))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, TypeNode::Function { .. })
    }

    /// Function type, or pointer to function type
    pub fn as_function(&self) -> Option<&TypeNode> {
        match self {
            TypeNode::Function { .. } => Some(self),
            TypeNode::Pointer { pointee, .. } if pointee.is_function() => Some(pointee),
            _ => None,
        }
    }

    /// Scalars are primitives (except void), pointers and enums
    pub fn is_scalar(&self) -> bool {
        match self {
            TypeNode::Primitive(kind) => !kind.is_void(),
            TypeNode::Pointer { .. } | TypeNode::Enum(_) => true,
            _ => false,
        }
    }

    /// Whether an object of this type has a known size
    pub fn is_complete(&self) -> bool {
        match self {
            TypeNode::Primitive(kind) => !kind.is_void(),
            TypeNode::Pointer { .. } => true,
            TypeNode::Array { element, len, .. } => len.is_some() && element.is_complete(),
            TypeNode::Function { .. } | TypeNode::RecordRef { .. } => false,
            TypeNode::Record(record) => record.is_complete(),
            TypeNode::Enum(e) => e.members.is_some(),
        }
    }

    /// Whether a struct or union appears anywhere in this type, including behind pointers
    pub fn contains_record(&self) -> bool {
        match self {
            TypeNode::Primitive(_) | TypeNode::Enum(_) => false,
            TypeNode::Record(_) | TypeNode::RecordRef { .. } => true,
            TypeNode::Pointer { pointee, .. } => pointee.contains_record(),
            TypeNode::Array { element, .. } => element.contains_record(),
            TypeNode::Function { ret, params, .. } => {
                ret.contains_record() || params.iter().any(TypeNode::contains_record)
            }
        }
    }
}
