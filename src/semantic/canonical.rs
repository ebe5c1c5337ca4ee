//! Canonical declaration text.
//!
//! Re-serializes a resolved declaration as C source that parses back to the same
//! type. Typedefs are already flattened, so the text only uses builtin types and tags.
//! The first by-value occurrence of a record or enum prints its full definition;
//! later occurrences and pointers use the tag alone. `extern` and `static` lead the
//! text of variables and functions, so they are part of the descriptor key.

use hashbrown::HashSet;
use itertools::Itertools;

use crate::ast::StorageClass;
use crate::type_node::{EnumType, PrimitiveKind, RecordType, TypeNode};

use super::{TypeQualifiers, type_resolver::DeclKind};

/// Text of a whole declaration, terminated by `;` except for type names
pub fn declaration_text(
    name: Option<&str>,
    kind: DeclKind,
    storage: Option<StorageClass>,
    ty: &TypeNode,
    qualifiers: TypeQualifiers,
) -> String {
    let mut printer = CanonicalPrinter::default();
    match kind {
        DeclKind::Tag => format!("{};", printer.base_text(ty)),
        DeclKind::TypeName => printer.declarator(ty, qualifiers, String::new()),
        DeclKind::Typedef => format!(
            "typedef {};",
            printer.declarator(ty, qualifiers, name.unwrap_or_default().to_string())
        ),
        DeclKind::Function | DeclKind::Variable => {
            let declaration = printer.declarator(ty, qualifiers, name.unwrap_or_default().to_string());
            match storage {
                Some(storage @ (StorageClass::Extern | StorageClass::Static)) => {
                    format!("{} {declaration};", storage.keyword())
                }
                _ => format!("{declaration};"),
            }
        }
    }
}

/// Abstract spelling of a type, e.g. `int (*)(const void *)`
pub fn type_text(ty: &TypeNode, qualifiers: TypeQualifiers) -> String {
    declaration_text(None, DeclKind::TypeName, None, ty, qualifiers)
}

/// The type a declarator chain ends in, with the qualifiers that apply to it
fn innermost(ty: &TypeNode, qualifiers: TypeQualifiers) -> (&TypeNode, TypeQualifiers) {
    match ty {
        TypeNode::Pointer {
            pointee,
            qualifiers: pointee_qualifiers,
        } => innermost(pointee, *pointee_qualifiers),
        TypeNode::Array {
            element,
            qualifiers: element_qualifiers,
            ..
        } => innermost(element, *element_qualifiers | qualifiers),
        TypeNode::Function { ret, .. } => innermost(ret, TypeQualifiers::empty()),
        base => (base, qualifiers),
    }
}

#[derive(Debug, Default)]
struct CanonicalPrinter {
    /// `struct S`, `enum E` already printed with a body
    defined: HashSet<String>,
}

impl CanonicalPrinter {
    /// Full declaration of `inner` (a name or nothing) with type `ty`.
    /// The base type is printed first since it comes first in the text.
    fn declarator(&mut self, ty: &TypeNode, qualifiers: TypeQualifiers, inner: String) -> String {
        let (base, base_qualifiers) = innermost(ty, qualifiers);
        let mut text = String::new();
        if !base_qualifiers.is_empty() {
            text.push_str(&base_qualifiers.to_string());
            text.push(' ');
        }
        text.push_str(&self.base_text(base));

        let derived = self.derive(ty, qualifiers, inner);
        if !derived.is_empty() {
            text.push(' ');
            text.push_str(&derived);
        }
        text
    }

    /// Wrap `inner` (the declarator text so far) in the derivations of `ty`
    fn derive(&mut self, ty: &TypeNode, qualifiers: TypeQualifiers, inner: String) -> String {
        match ty {
            TypeNode::Pointer {
                pointee,
                qualifiers: pointee_qualifiers,
            } => {
                let mut text = String::from("*");
                if !qualifiers.is_empty() {
                    text.push_str(&qualifiers.to_string());
                    if !inner.is_empty() {
                        text.push(' ');
                    }
                }
                text.push_str(&inner);
                if matches!(**pointee, TypeNode::Array { .. } | TypeNode::Function { .. }) {
                    text = format!("({text})");
                }
                self.derive(pointee, *pointee_qualifiers, text)
            }
            TypeNode::Array {
                element,
                qualifiers: element_qualifiers,
                len,
            } => {
                let len = len.map(|len| len.to_string()).unwrap_or_default();
                self.derive(element, *element_qualifiers | qualifiers, format!("{inner}[{len}]"))
            }
            TypeNode::Function {
                ret,
                params,
                is_variadic,
            } => {
                let params = if params.is_empty() && !is_variadic {
                    "void".to_string()
                } else {
                    params
                        .iter()
                        .map(|param| self.declarator(param, TypeQualifiers::empty(), String::new()))
                        .chain(is_variadic.then(|| "...".to_string()))
                        .join(", ")
                };
                self.derive(ret, TypeQualifiers::empty(), format!("{inner}({params})"))
            }
            _ => inner,
        }
    }

    fn base_text(&mut self, ty: &TypeNode) -> String {
        match ty {
            TypeNode::Primitive(kind) => kind.c_name().to_string(),
            TypeNode::RecordRef { kind, tag } => format!("{} {tag}", kind.keyword()),
            TypeNode::Record(record) => self.record_text(record),
            TypeNode::Enum(enum_type) => self.enum_text(enum_type),
            derived => self.declarator(derived, TypeQualifiers::empty(), String::new()),
        }
    }

    fn record_text(&mut self, record: &RecordType) -> String {
        let keyword = record.kind.keyword();
        let Some(fields) = &record.fields else {
            return record.display_name();
        };
        if let Some(tag) = &record.tag
            && !self.defined.insert(format!("{keyword} {tag}"))
        {
            return format!("{keyword} {tag}");
        }

        let mut text = String::from(keyword);
        if record.packed {
            text.push_str(" __attribute__((packed))");
        }
        if let Some(tag) = &record.tag {
            text.push(' ');
            text.push_str(tag);
        }
        text.push_str(" {");
        for field in fields {
            let mut member = self.declarator(&field.ty, field.qualifiers, field.name.clone().unwrap_or_default());
            if let Some(width) = field.bit_width {
                member.push_str(&format!(" : {width}"));
            }
            text.push(' ');
            text.push_str(&member);
            text.push(';');
        }
        text.push_str(" }");
        text
    }

    fn enum_text(&mut self, enum_type: &EnumType) -> String {
        let Some(members) = &enum_type.members else {
            return format!("enum {}", enum_type.tag.as_deref().unwrap_or_default());
        };
        if let Some(tag) = &enum_type.tag
            && !self.defined.insert(format!("enum {tag}"))
        {
            return format!("enum {tag}");
        }

        let mut text = String::from("enum");
        if let Some(tag) = &enum_type.tag {
            text.push(' ');
            text.push_str(tag);
        }
        if enum_type.underlying != PrimitiveKind::Int {
            text.push_str(" : ");
            text.push_str(enum_type.underlying.c_name());
        }
        let body = members
            .iter()
            .map(|member| format!("{} = {}", member.name, member.value))
            .join(", ");
        text.push_str(&format!(" {{ {body} }}"));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_node::{Field, RecordKind};
    use std::sync::Arc;

    fn int() -> TypeNode {
        TypeNode::Primitive(PrimitiveKind::Int)
    }

    #[test]
    fn test_pointer_to_function() {
        let void_ptr = TypeNode::pointer_to(TypeNode::Primitive(PrimitiveKind::Void), TypeQualifiers::CONST);
        let function = TypeNode::Function {
            ret: Box::new(int()),
            params: vec![void_ptr.clone(), void_ptr],
            is_variadic: false,
        };
        let ty = TypeNode::pointer_to(function, TypeQualifiers::empty());
        assert_eq!(
            declaration_text(Some("cmp"), DeclKind::Variable, None, &ty, TypeQualifiers::empty()),
            "int (*cmp)(const void *, const void *);"
        );
        assert_eq!(type_text(&ty, TypeQualifiers::empty()), "int (*)(const void *, const void *)");
    }

    #[test]
    fn test_const_pointer_and_array() {
        let ptr = TypeNode::pointer_to(TypeNode::Primitive(PrimitiveKind::Char), TypeQualifiers::empty());
        assert_eq!(
            declaration_text(Some("p"), DeclKind::Variable, None, &ptr, TypeQualifiers::CONST),
            "char *const p;"
        );

        let matrix = TypeNode::Array {
            element: Box::new(TypeNode::Array {
                element: Box::new(int()),
                qualifiers: TypeQualifiers::empty(),
                len: Some(3),
            }),
            qualifiers: TypeQualifiers::empty(),
            len: Some(2),
        };
        assert_eq!(
            declaration_text(Some("m"), DeclKind::Variable, None, &matrix, TypeQualifiers::empty()),
            "int m[2][3];"
        );
    }

    #[test]
    fn test_storage_class_leads_the_text() {
        let function = TypeNode::Function {
            ret: Box::new(int()),
            params: vec![],
            is_variadic: false,
        };
        let cases = [
            (Some(StorageClass::Extern), DeclKind::Variable, "extern int count;"),
            (Some(StorageClass::Static), DeclKind::Variable, "static int count;"),
            (None, DeclKind::Variable, "int count;"),
        ];
        for (storage, kind, expected) in cases {
            assert_eq!(declaration_text(Some("count"), kind, storage, &int(), TypeQualifiers::empty()), expected);
        }
        assert_eq!(
            declaration_text(Some("tick"), DeclKind::Function, Some(StorageClass::Static), &function, TypeQualifiers::empty()),
            "static int tick(void);"
        );
    }

    #[test]
    fn test_record_definition_printed_once() {
        let record = Arc::new(RecordType {
            kind: RecordKind::Struct,
            tag: Some("Pair".to_string()),
            fields: Some(vec![
                Field {
                    name: Some("a".to_string()),
                    ty: int(),
                    qualifiers: TypeQualifiers::empty(),
                    bit_width: Some(3),
                },
                Field {
                    name: None,
                    ty: int(),
                    qualifiers: TypeQualifiers::empty(),
                    bit_width: Some(0),
                },
            ]),
            packed: true,
        });
        let function = TypeNode::Function {
            ret: Box::new(TypeNode::Record(record.clone())),
            params: vec![TypeNode::Record(record)],
            is_variadic: true,
        };
        assert_eq!(
            declaration_text(Some("swap"), DeclKind::Function, None, &function, TypeQualifiers::empty()),
            "struct __attribute__((packed)) Pair { int a : 3; int : 0; } swap(struct Pair, ...);"
        );
    }
}
