//! Type Registry
//!
//! Arena + canonicalization layer for semantic types.
//! All TypeRef creation and mutation MUST go through this context.

use hashbrown::HashMap;
use log::trace;

use crate::ast::NameId;
use crate::source::SourceSpan;
use crate::type_node::PrimitiveKind;

use super::{EnumConstant, FunctionParameter, QualType, StructMember, Type, TypeKind, TypeQualifiers, TypeRef};

/// Central arena & factory for semantic types.
///
/// Invariants:
/// - All TypeRef come from this context
/// - Types are never removed
/// - Derived types (pointer, array, function) are canonical: structurally equal
///   requests return the same TypeRef, so QualType equality is type identity
/// - Records and enums are nominal: one entry per tag declaration
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<Type>,

    // --- Canonicalization caches ---
    primitive_cache: HashMap<PrimitiveKind, TypeRef>,
    pointer_cache: HashMap<QualType, TypeRef>,
    array_cache: HashMap<(QualType, Option<u64>), TypeRef>,
    function_cache: HashMap<FnSigKey, TypeRef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Allocate a new canonical type and return its TypeRef.
    fn alloc(&mut self, ty: Type) -> TypeRef {
        let r = TypeRef::from_index(self.types.len());
        self.types.push(ty);
        r
    }

    /// Resolve a TypeRef to a Type.
    #[inline]
    pub fn get(&self, r: TypeRef) -> &Type {
        &self.types[r.index()]
    }

    #[inline]
    pub fn kind(&self, r: TypeRef) -> &TypeKind {
        &self.types[r.index()].kind
    }

    fn get_mut(&mut self, r: TypeRef) -> &mut Type {
        &mut self.types[r.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ============================================================
    // Canonical type constructors
    // ============================================================

    pub fn primitive(&mut self, kind: PrimitiveKind) -> TypeRef {
        if let Some(&r) = self.primitive_cache.get(&kind) {
            return r;
        }
        let r = self.alloc(Type::new(TypeKind::Primitive(kind)));
        self.primitive_cache.insert(kind, r);
        r
    }

    pub fn pointer_to(&mut self, pointee: QualType) -> TypeRef {
        if let Some(&ptr) = self.pointer_cache.get(&pointee) {
            return ptr;
        }
        let ptr = self.alloc(Type::new(TypeKind::Pointer { pointee }));
        self.pointer_cache.insert(pointee, ptr);
        ptr
    }

    pub fn array_of(&mut self, element: QualType, len: Option<u64>) -> TypeRef {
        let key = (element, len);
        if let Some(&arr) = self.array_cache.get(&key) {
            return arr;
        }
        let arr = self.alloc(Type::new(TypeKind::Array { element, len }));
        self.array_cache.insert(key, arr);
        arr
    }

    /// Function types ignore top-level qualifiers on the return type and parameters.
    pub fn function_type(
        &mut self,
        return_type: QualType,
        params: Vec<FunctionParameter>,
        is_variadic: bool,
    ) -> TypeRef {
        let key = FnSigKey {
            return_type: return_type.ty,
            params: params.iter().map(|p| p.param_type.ty).collect(),
            is_variadic,
        };

        if let Some(&f) = self.function_cache.get(&key) {
            return f;
        }

        let f = self.alloc(Type::new(TypeKind::Function {
            return_type: QualType::unqualified(return_type.ty),
            parameters: params
                .into_iter()
                .map(|p| FunctionParameter {
                    param_type: QualType::unqualified(p.param_type.ty),
                    name: p.name,
                })
                .collect(),
            is_variadic,
        }));

        self.function_cache.insert(key, f);
        f
    }

    pub fn typedef_alias(&mut self, name: NameId, target: QualType) -> TypeRef {
        self.alloc(Type::new(TypeKind::Typedef { name, target }))
    }

    // ============================================================
    // Record / enum handling
    // ============================================================

    pub fn declare_record(&mut self, tag: NameId, is_anonymous: bool, is_union: bool, span: SourceSpan) -> TypeRef {
        trace!("declare_record: {} {tag}", if is_union { "union" } else { "struct" });
        self.alloc(Type::new(TypeKind::Record {
            tag,
            is_anonymous,
            is_union,
            members: Vec::new(),
            is_complete: false,
            packed: false,
            span,
        }))
    }

    pub fn complete_record(&mut self, record: TypeRef, new_members: Vec<StructMember>, is_packed: bool, def_span: SourceSpan) {
        let ty = self.get_mut(record);
        match &mut ty.kind {
            TypeKind::Record {
                is_complete,
                members,
                packed,
                span,
                ..
            } => {
                *members = new_members;
                *is_complete = true;
                *packed = is_packed;
                *span = def_span;
            }
            _ => unreachable!("complete_record on non-record"),
        }
    }

    pub fn declare_enum(&mut self, tag: NameId, is_anonymous: bool, span: SourceSpan) -> TypeRef {
        trace!("declare_enum: enum {tag}");
        self.alloc(Type::new(TypeKind::Enum {
            tag,
            is_anonymous,
            underlying: PrimitiveKind::Int,
            enumerators: Vec::new(),
            is_complete: false,
            span,
        }))
    }

    pub fn complete_enum(
        &mut self,
        enum_ty: TypeRef,
        base: PrimitiveKind,
        constants: Vec<EnumConstant>,
        def_span: SourceSpan,
    ) {
        let ty = self.get_mut(enum_ty);
        match &mut ty.kind {
            TypeKind::Enum {
                is_complete,
                enumerators,
                underlying,
                span,
                ..
            } => {
                *enumerators = constants;
                *underlying = base;
                *is_complete = true;
                *span = def_span;
            }
            _ => unreachable!("complete_enum on non-enum"),
        }
    }

    // ============================================================
    // Queries
    // ============================================================

    /// Follow typedef aliases to the ultimate target, accumulating qualifiers
    pub fn strip_typedefs(&self, qt: QualType) -> QualType {
        let mut current = qt;
        while let TypeKind::Typedef { target, .. } = self.kind(current.ty) {
            current = target.with_qualifiers(current.qualifiers);
        }
        current
    }

    /// Array-to-pointer and function-to-pointer conversion for parameters
    pub fn decay(&mut self, qt: QualType) -> QualType {
        let qt = self.strip_typedefs(qt);
        match self.kind(qt.ty).clone() {
            TypeKind::Array { element, .. } => {
                let ptr = self.pointer_to(element);
                QualType::new(ptr, qt.qualifiers)
            }
            TypeKind::Function { .. } => {
                let ptr = self.pointer_to(QualType::unqualified(qt.ty));
                QualType::new(ptr, qt.qualifiers)
            }
            _ => qt,
        }
    }

    /// Whether an object of this type has a known size
    pub fn is_complete(&self, r: TypeRef) -> bool {
        match self.kind(r) {
            TypeKind::Primitive(kind) => !kind.is_void(),
            TypeKind::Pointer { .. } => true,
            TypeKind::Array { element, len } => len.is_some() && self.is_complete(element.ty),
            TypeKind::Function { .. } => false,
            TypeKind::Record { is_complete, .. } | TypeKind::Enum { is_complete, .. } => *is_complete,
            TypeKind::Typedef { target, .. } => self.is_complete(target.ty),
        }
    }

    /// Human readable name for diagnostics
    pub fn display_name(&self, r: TypeRef) -> String {
        match self.kind(r) {
            TypeKind::Primitive(kind) => kind.c_name().to_string(),
            TypeKind::Pointer { pointee } => format!("{} *", self.display_qual(*pointee)),
            TypeKind::Array { element, len: Some(n) } => format!("{}[{n}]", self.display_qual(*element)),
            TypeKind::Array { element, len: None } => format!("{}[]", self.display_qual(*element)),
            TypeKind::Function { return_type, .. } => format!("{}(...)", self.display_qual(*return_type)),
            TypeKind::Record {
                tag,
                is_anonymous,
                is_union,
                ..
            } => {
                let keyword = if *is_union { "union" } else { "struct" };
                if *is_anonymous {
                    format!("{keyword} <anonymous>")
                } else {
                    format!("{keyword} {tag}")
                }
            }
            TypeKind::Enum { tag, is_anonymous, .. } => {
                if *is_anonymous {
                    "enum <anonymous>".to_string()
                } else {
                    format!("enum {tag}")
                }
            }
            TypeKind::Typedef { name, .. } => name.to_string(),
        }
    }

    fn display_qual(&self, qt: QualType) -> String {
        if qt.qualifiers == TypeQualifiers::empty() {
            self.display_name(qt.ty)
        } else {
            format!("{} {}", qt.qualifiers, self.display_name(qt.ty))
        }
    }
}

// ================================================================
// Helper types
// ================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FnSigKey {
    return_type: TypeRef,
    params: Vec<TypeRef>,
    is_variadic: bool,
}
