//! Export of registry types into self-contained [`TypeNode`]s.
//!
//! Records and enums are exported once per registry entry and shared through `Arc`.
//! A pointer to a tagged record becomes a [`TypeNode::RecordRef`] edge, which is what
//! keeps recursive structures acyclic.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::type_node::{EnumMember, EnumType, Field, PrimitiveKind, RecordKind, RecordType, TypeNode};

use super::{QualType, TypeKind, TypeQualifiers, TypeRef, TypeRegistry};

pub struct TypeExporter<'a> {
    registry: &'a TypeRegistry,
    records: HashMap<TypeRef, Arc<RecordType>>,
    enums: HashMap<TypeRef, Arc<EnumType>>,
    in_progress: Vec<TypeRef>,
}

impl<'a> TypeExporter<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        TypeExporter {
            registry,
            records: HashMap::new(),
            enums: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Export a qualified type. Qualifiers on an array type move to its elements.
    pub fn export(&mut self, qt: QualType) -> (TypeNode, TypeQualifiers) {
        let registry = self.registry;
        let qt = registry.strip_typedefs(qt);
        match registry.kind(qt.ty) {
            TypeKind::Array { element, len } if !qt.qualifiers.is_empty() => {
                let (element, qualifiers) = self.export(element.with_qualifiers(qt.qualifiers));
                let node = TypeNode::Array {
                    element: Box::new(element),
                    qualifiers,
                    len: *len,
                };
                (node, TypeQualifiers::empty())
            }
            _ => (self.export_type(qt.ty, false), qt.qualifiers),
        }
    }

    fn export_type(&mut self, r: TypeRef, behind_pointer: bool) -> TypeNode {
        let registry = self.registry;
        match registry.kind(r) {
            TypeKind::Primitive(kind) => TypeNode::Primitive(*kind),
            TypeKind::Pointer { pointee } => {
                let pointee = registry.strip_typedefs(*pointee);
                TypeNode::Pointer {
                    pointee: Box::new(self.export_type(pointee.ty, true)),
                    qualifiers: pointee.qualifiers,
                }
            }
            TypeKind::Array { element, len } => {
                let element = registry.strip_typedefs(*element);
                TypeNode::Array {
                    element: Box::new(self.export_type(element.ty, behind_pointer)),
                    qualifiers: element.qualifiers,
                    len: *len,
                }
            }
            TypeKind::Function {
                return_type,
                parameters,
                is_variadic,
            } => TypeNode::Function {
                ret: Box::new(self.export_type(return_type.ty, false)),
                params: parameters
                    .iter()
                    .map(|param| self.export_type(param.param_type.ty, false))
                    .collect(),
                is_variadic: *is_variadic,
            },
            TypeKind::Record {
                tag,
                is_anonymous,
                is_union,
                ..
            } => {
                let kind = if *is_union { RecordKind::Union } else { RecordKind::Struct };
                // a record met again while its own fields are exported, e.g. as a
                // by-value parameter of a callback field, is referenced by name
                if (behind_pointer || self.in_progress.contains(&r)) && !*is_anonymous {
                    return TypeNode::RecordRef {
                        kind,
                        tag: tag.to_string(),
                    };
                }
                TypeNode::Record(self.export_record(r))
            }
            TypeKind::Enum { .. } => TypeNode::Enum(self.export_enum(r)),
            TypeKind::Typedef { target, .. } => self.export_type(target.ty, behind_pointer),
        }
    }

    pub fn export_record(&mut self, r: TypeRef) -> Arc<RecordType> {
        if let Some(record) = self.records.get(&r) {
            return Arc::clone(record);
        }
        let registry = self.registry;
        let TypeKind::Record {
            tag,
            is_anonymous,
            is_union,
            members,
            is_complete,
            packed,
            ..
        } = registry.kind(r)
        else {
            return Arc::new(RecordType {
                kind: RecordKind::Struct,
                tag: None,
                fields: None,
                packed: false,
            });
        };

        self.in_progress.push(r);
        let fields = is_complete.then(|| {
            members
                .iter()
                .map(|member| {
                    let (ty, qualifiers) = self.export(member.member_type);
                    Field {
                        name: member.name.map(|name| name.to_string()),
                        ty,
                        qualifiers,
                        bit_width: member.bit_width,
                    }
                })
                .collect()
        });
        self.in_progress.pop();
        let record = Arc::new(RecordType {
            kind: if *is_union { RecordKind::Union } else { RecordKind::Struct },
            tag: (!is_anonymous).then(|| tag.to_string()),
            fields,
            packed: *packed,
        });
        self.records.insert(r, Arc::clone(&record));
        record
    }

    fn export_enum(&mut self, r: TypeRef) -> Arc<EnumType> {
        if let Some(enum_type) = self.enums.get(&r) {
            return Arc::clone(enum_type);
        }
        let enum_type = match self.registry.kind(r) {
            TypeKind::Enum {
                tag,
                is_anonymous,
                underlying,
                enumerators,
                is_complete,
                ..
            } => EnumType {
                tag: (!is_anonymous).then(|| tag.to_string()),
                underlying: *underlying,
                members: is_complete.then(|| {
                    enumerators
                        .iter()
                        .map(|constant| EnumMember {
                            name: constant.name.to_string(),
                            value: constant.value,
                        })
                        .collect()
                }),
            },
            _ => EnumType {
                tag: None,
                underlying: PrimitiveKind::Int,
                members: None,
            },
        };
        let enum_type = Arc::new(enum_type);
        self.enums.insert(r, Arc::clone(&enum_type));
        enum_type
    }
}
