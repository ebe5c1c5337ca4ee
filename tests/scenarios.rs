//! End-to-end declaration scenarios through the public API
mod common;

use common::{process, process_ok, record_layout};
use cffi_decl::diagnostic::SemanticError;
use cffi_decl::semantic::TypeQualifiers;
use cffi_decl::type_node::{PrimitiveKind, RecordKind};
use cffi_decl::{AbiConfig, DeclKind, ErrorKind, FfiError, TypeNode};
use pretty_assertions::assert_eq;

#[test]
fn test_anonymous_struct_typedef_layout() {
    let unit = process_ok("typedef struct { int x; char y; } Point;");
    let point = unit.find("Point").expect("Point");
    assert_eq!(point.kind, DeclKind::Typedef);

    let layout = point.layout.as_ref().expect("layout");
    assert_eq!((layout.size, layout.align), (8, 4));
    let record = record_layout(layout);
    let offsets: Vec<_> = record
        .fields
        .iter()
        .map(|field| (field.name.as_deref().unwrap_or_default(), field.offset))
        .collect();
    assert_eq!(offsets, [("x", 0), ("y", 4)]);
    assert_eq!(record.trailing_padding, 3);
}

#[test]
fn test_pointer_to_function_type() {
    let unit = process_ok("int (*cmp)(const void*, const void*);");
    let cmp = unit.find("cmp").expect("cmp");
    assert_eq!(cmp.kind, DeclKind::Variable);

    let const_void_ptr = TypeNode::pointer_to(TypeNode::Primitive(PrimitiveKind::Void), TypeQualifiers::CONST);
    let expected = TypeNode::pointer_to(
        TypeNode::Function {
            ret: Box::new(TypeNode::Primitive(PrimitiveKind::Int)),
            params: vec![const_void_ptr.clone(), const_void_ptr],
            is_variadic: false,
        },
        TypeQualifiers::empty(),
    );
    assert_eq!(cmp.ty, expected);
    assert_eq!(cmp.canonical(), "int (*cmp)(const void *, const void *);");
    assert!(cmp.call.is_some());
}

#[test]
fn test_self_referential_list_node() {
    let unit = process_ok("struct Node { struct Node* next; int val; };");
    let node = unit.record(RecordKind::Struct, "Node").expect("struct Node");
    let next = node.find_field("next").expect("next");
    match &next[0].ty {
        TypeNode::Pointer { pointee, .. } => {
            assert_eq!(
                **pointee,
                TypeNode::RecordRef {
                    kind: RecordKind::Struct,
                    tag: "Node".to_string()
                }
            );
            let target = unit.resolve_ref(pointee).expect("resolvable");
            assert_eq!(target.tag.as_deref(), Some("Node"));
        }
        other => panic!("expected a pointer, got {other:?}"),
    }
    let layout = unit.find("Node").and_then(|d| d.layout.clone()).expect("layout");
    assert_eq!((layout.size, layout.align), (16, 8));
}

#[test]
fn test_struct_containing_itself_is_rejected() {
    let error = process("struct Bad { struct Bad inner; };", AbiConfig::lp64_sysv()).expect_err("must fail");
    assert_eq!(error.kind(), Some(ErrorKind::UnsupportedConstruct));
    match &error.errors[0] {
        FfiError::Semantic(SemanticError::SelfReference { field, .. }) => assert_eq!(field, "inner"),
        other => panic!("expected a self reference, got {other:?}"),
    }
    assert!(error.to_string().contains("inner"));
}

#[test]
fn test_conflicting_typedef_cites_both_positions() {
    let error = process("typedef int Id;\ntypedef long Id;", AbiConfig::lp64_sysv()).expect_err("must fail");
    assert_eq!(error.kind(), Some(ErrorKind::Conflict));

    let diagnostics = error.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.span.start.line, 2);
    let related: Vec<_> = diagnostic.related.iter().map(|span| span.start.line).collect();
    assert_eq!(related, [1]);
}

#[test]
fn test_same_header_under_each_abi() {
    let header = "struct Record { char tag; long value; long double precise; void *next; };";
    let expected = [
        (AbiConfig::lp64_sysv(), 48, 16),
        (AbiConfig::llp64_win64(), 24, 8),
        (AbiConfig::ilp32_cdecl(), 24, 4),
        (AbiConfig::aapcs64(), 48, 16),
    ];
    for (abi, size, align) in expected {
        let name = format!("{abi:?}");
        let unit = process(header, abi).unwrap_or_else(|error| panic!("{name}: {error}"));
        let layout = unit.find("Record").and_then(|d| d.layout.clone()).expect("layout");
        assert_eq!((layout.size, layout.align), (size, align), "{name}");
    }
}

#[test]
fn test_lex_error_fails_the_unit() {
    let error = process("int a;\nint b = 'x;", AbiConfig::lp64_sysv()).expect_err("must fail");
    assert_eq!(error.kind(), Some(ErrorKind::Lex));
    assert_eq!(error.errors[0].span().start.line, 2);
}
