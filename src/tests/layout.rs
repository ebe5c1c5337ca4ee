use pretty_assertions::assert_eq;

use crate::abi::{AbiConfig, Packing};
use crate::diagnostic::ErrorKind;
use crate::layout::{ArgClass, LayoutCalculator, LayoutError, LayoutKind, TypeLayout};
use crate::semantic::TypeQualifiers;
use crate::tests::test_utils::{compile, compile_with, layout_of};
use crate::type_node::{PrimitiveKind, RecordKind, TypeNode};

/// (name, offset, size) of every direct field
fn offsets(layout: &TypeLayout) -> Vec<(String, u64, u64)> {
    let record = layout.as_record().expect("record layout");
    record
        .fields
        .iter()
        .map(|field| (field.name.clone().unwrap_or_default(), field.offset, field.size))
        .collect()
}

fn assert_consistent(layout: &TypeLayout) {
    assert_eq!(layout.size % layout.align, 0, "size must be a multiple of alignment");
    if let Some(record) = layout.as_record()
        && !record.is_union
    {
        let accounted: u64 = record
            .fields
            .iter()
            .map(|field| field.padding_before + field.size)
            .sum();
        assert_eq!(accounted + record.trailing_padding, layout.size);
    }
}

#[test]
fn test_struct_padding_lp64() {
    let unit = compile("struct Mixed { char c; double d; short s; };");
    let layout = layout_of(&unit, "Mixed");
    assert_eq!((layout.size, layout.align), (24, 8));
    assert_eq!(
        offsets(&layout),
        [
            ("c".to_string(), 0, 1),
            ("d".to_string(), 8, 8),
            ("s".to_string(), 16, 2)
        ]
    );
    assert_eq!(layout.as_record().map(|r| r.trailing_padding), Some(6));
    assert_consistent(&layout);
}

#[test]
fn test_struct_padding_ilp32() {
    let unit = compile_with("struct Mixed { char c; double d; short s; };", AbiConfig::ilp32_cdecl())
        .unwrap_or_else(|e| panic!("{e}"));
    let layout = layout_of(&unit, "Mixed");
    assert_eq!((layout.size, layout.align), (16, 4));
    assert_eq!(
        offsets(&layout),
        [
            ("c".to_string(), 0, 1),
            ("d".to_string(), 4, 8),
            ("s".to_string(), 12, 2)
        ]
    );
    assert_consistent(&layout);
}

#[test]
fn test_abi_dependent_primitives() {
    let source = "long l; long double ld; size_t n; void *p;";
    let sizes = |abi: AbiConfig| {
        let unit = compile_with(source, abi).unwrap_or_else(|e| panic!("{e}"));
        ["l", "ld", "n", "p"]
            .iter()
            .map(|name| {
                let layout = layout_of(&unit, name);
                (layout.size, layout.align)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(sizes(AbiConfig::lp64_sysv()), [(8, 8), (16, 16), (8, 8), (8, 8)]);
    assert_eq!(sizes(AbiConfig::llp64_win64()), [(4, 4), (8, 8), (8, 8), (8, 8)]);
    assert_eq!(sizes(AbiConfig::ilp32_cdecl()), [(4, 4), (12, 4), (4, 4), (4, 4)]);
}

#[test]
fn test_packed_attribute() {
    let unit = compile("struct __attribute__((packed)) P { char c; int i; short s; };");
    let layout = layout_of(&unit, "P");
    assert_eq!((layout.size, layout.align), (7, 1));
    assert_eq!(
        offsets(&layout),
        [
            ("c".to_string(), 0, 1),
            ("i".to_string(), 1, 4),
            ("s".to_string(), 5, 2)
        ]
    );
    assert_consistent(&layout);
}

#[test]
fn test_alignment_attribute_fails_the_unit() {
    let error = compile_with(
        "int before; struct __attribute__((aligned(16))) A { char c; }; int after;",
        AbiConfig::lp64_sysv(),
    )
    .expect_err("aligned is not modelled");
    assert_eq!(error.kind(), Some(ErrorKind::UnsupportedConstruct));
    assert!(error.to_string().contains("'aligned' attribute"), "{error}");
}

#[test]
fn test_packing_modes() {
    let source = "struct S { char c; int i; };";
    let layout_with = |packing: Packing| {
        let unit = compile_with(source, AbiConfig::lp64_sysv().with_packing(packing)).unwrap_or_else(|e| panic!("{e}"));
        layout_of(&unit, "S")
    };

    let natural = layout_with(Packing::Natural);
    assert_eq!((natural.size, natural.align), (8, 4));

    let packed = layout_with(Packing::Packed);
    assert_eq!((packed.size, packed.align), (5, 1));

    let max2 = layout_with(Packing::Max(2));
    assert_eq!((max2.size, max2.align), (6, 2));
    assert_eq!(offsets(&max2)[1], ("i".to_string(), 2, 4));
    assert_consistent(&max2);
}

#[test]
fn test_union_layout() {
    let unit = compile("union Number { char c; int i; double d; }; union Bytes { char raw[5]; int word; };");
    let number = layout_of(&unit, "Number");
    assert_eq!((number.size, number.align), (8, 8));
    assert!(offsets(&number).iter().all(|(_, offset, _)| *offset == 0));

    let bytes = layout_of(&unit, "Bytes");
    assert_eq!((bytes.size, bytes.align), (8, 4));
    assert_eq!(bytes.as_record().map(|r| r.trailing_padding), Some(3));
}

#[test]
fn test_array_layout() {
    let unit = compile("int m[2][3]; struct Pair { short a; char b; } pairs[4];");
    let matrix = layout_of(&unit, "m");
    assert_eq!((matrix.size, matrix.align), (24, 4));
    assert!(matches!(matrix.kind, LayoutKind::Array { len: 2, .. }));

    let pairs = layout_of(&unit, "pairs");
    assert_eq!((pairs.size, pairs.align), (16, 2));
}

#[test]
fn test_nested_and_anonymous_members() {
    let unit = compile("struct Value { char kind; union { int i; double d; }; struct { char x, y; } point; };");
    let layout = layout_of(&unit, "Value");
    assert_eq!((layout.size, layout.align), (24, 8));
    let record = layout.as_record().expect("record layout");
    let (d_offset, d) = record.field("d").expect("field d");
    assert_eq!((d_offset, d.size), (8, 8));
    let (point_offset, _) = record.field("point").expect("field point");
    assert_eq!(point_offset, 16);
    assert_consistent(&layout);
}

#[test]
fn test_bit_fields_share_storage() {
    let unit = compile("struct Flags { int a : 3; int b : 5; char c; };");
    let layout = layout_of(&unit, "Flags");
    assert_eq!((layout.size, layout.align), (4, 4));
    let record = layout.as_record().expect("record layout");

    let bits: Vec<_> = record
        .fields
        .iter()
        .filter_map(|field| field.bit.map(|bit| (field.offset, bit.bit_offset, bit.bit_width)))
        .collect();
    assert_eq!(bits, [(0, 0, 3), (0, 3, 5)]);
    assert_eq!(record.field("c").map(|(offset, _)| offset), Some(1));
    assert_consistent(&layout);
}

#[test]
fn test_bit_field_straddle_is_conflict() {
    let error = compile_with("struct Wide { unsigned a : 30; unsigned b : 4; };", AbiConfig::lp64_sysv())
        .expect_err("straddling bit-field");
    assert_eq!(error.kind(), Some(ErrorKind::LayoutConflict));
    insta::assert_snapshot!(
        error.errors[0].to_string(),
        @"layout conflict: bit-field 'b' would straddle a 4-byte storage unit of 'struct Wide'"
    );

    let after_plain = compile_with("struct Mixed { char c; unsigned a : 30; };", AbiConfig::ilp32_cdecl())
        .expect_err("straddling bit-field");
    assert_eq!(after_plain.kind(), Some(ErrorKind::LayoutConflict));
}

#[test]
fn test_bit_field_filling_its_unit_exactly() {
    let unit = compile("struct Full { unsigned a : 30; unsigned b : 2; unsigned c : 4; };");
    let layout = layout_of(&unit, "Full");
    assert_eq!((layout.size, layout.align), (8, 4));
    let c = layout.as_record().and_then(|r| r.field("c")).map(|(offset, field)| (offset, field.bit));
    let Some((offset, Some(bit))) = c else {
        panic!("c must be a bit-field");
    };
    assert_eq!((offset, bit.bit_offset), (4, 0));
    assert_consistent(&layout);
}

#[test]
fn test_zero_width_bit_field_closes_unit() {
    let unit = compile("struct Split { int a : 4; int : 0; int b : 4; };");
    let layout = layout_of(&unit, "Split");
    assert_eq!(layout.size, 8);
    let b = layout.as_record().and_then(|r| r.field("b")).map(|(offset, _)| offset);
    assert_eq!(b, Some(4));
    assert_consistent(&layout);
}

#[test]
fn test_packed_bit_field_straddle_is_conflict() {
    let error = compile_with(
        "struct __attribute__((packed)) Tight { char c; unsigned a : 30; unsigned b : 4; };",
        AbiConfig::lp64_sysv(),
    )
    .expect_err("straddling bit-field");
    assert_eq!(error.kind(), Some(ErrorKind::LayoutConflict));
}

#[test]
fn test_packed_char_bit_field_straddle_is_conflict() {
    let source = "struct __attribute__((packed)) Bytes { unsigned char a : 7; unsigned char b : 4; };";
    for abi in [
        AbiConfig::lp64_sysv(),
        AbiConfig::lp64_sysv().with_packing(Packing::Packed),
        AbiConfig::ilp32_cdecl().with_packing(Packing::Max(1)),
    ] {
        let error = compile_with(source, abi).expect_err("straddling bit-field");
        assert_eq!(error.kind(), Some(ErrorKind::LayoutConflict));
    }

    let fits = compile("struct __attribute__((packed)) Bytes { unsigned char a : 4; unsigned char b : 4; };");
    assert_eq!(layout_of(&fits, "Bytes").size, 1);
}

#[test]
fn test_bit_field_wider_than_type() {
    let error = compile_with("struct Narrow { char c : 9; };", AbiConfig::lp64_sysv()).expect_err("too wide");
    assert_eq!(error.kind(), Some(ErrorKind::LayoutConflict));
}

#[test]
fn test_flexible_array_member() {
    let unit = compile("struct Buf { int len; char data[]; }; struct Aligned { char tag; double values[]; };");
    let buf = layout_of(&unit, "Buf");
    assert_eq!((buf.size, buf.align), (4, 4));
    assert_eq!(offsets(&buf)[1], ("data".to_string(), 4, 0));

    let aligned = layout_of(&unit, "Aligned");
    assert_eq!((aligned.size, aligned.align), (8, 8));
    assert_eq!(offsets(&aligned)[1], ("values".to_string(), 8, 0));
    assert_consistent(&aligned);
}

#[test]
fn test_flexible_array_member_disabled() {
    let abi = AbiConfig::lp64_sysv().with_flexible_array_members(false);
    let error = compile_with("struct Buf { int len; char data[]; };", abi).expect_err("flexible array rejected");
    assert_eq!(error.kind(), Some(ErrorKind::UnsupportedConstruct));
}

#[test]
fn test_types_without_storage() {
    let abi = AbiConfig::lp64_sysv();
    let mut calculator = LayoutCalculator::new(&abi);
    let by_name = TypeNode::RecordRef {
        kind: RecordKind::Struct,
        tag: "Node".to_string(),
    };
    for ty in [TypeNode::Primitive(PrimitiveKind::Void), by_name] {
        assert!(matches!(
            calculator.layout_of(&ty),
            Err(LayoutError::Unsupported { .. })
        ));
    }
    let pointer = TypeNode::pointer_to(TypeNode::Primitive(PrimitiveKind::Void), TypeQualifiers::empty());
    assert_eq!(calculator.layout_of(&pointer).map(|l| l.size), Ok(8));
}

#[test]
fn test_function_classification_sysv() {
    let unit = compile(
        "struct Pair { int a; int b; };
         struct Triple { long x, y, z; };
         struct Pair make(struct Pair p, double scale, char *label, ...);
         void consume(struct Triple t, float f, unsigned short u);",
    );
    let make = unit.find("make").and_then(|d| d.call.clone()).expect("call signature");
    assert_eq!(
        make.ret,
        ArgClass::Aggregate {
            size: 8,
            align: 4,
            in_registers: true
        }
    );
    assert_eq!(
        make.params[1..],
        [ArgClass::Float { size: 8 }, ArgClass::Pointer]
    );
    assert!(make.is_variadic);
    assert!(unit.find("make").is_some_and(|d| d.layout.is_none()));

    let consume = unit.find("consume").and_then(|d| d.call.clone()).expect("call signature");
    assert_eq!(consume.ret, ArgClass::Void);
    assert_eq!(
        consume.params,
        [
            ArgClass::Aggregate {
                size: 24,
                align: 8,
                in_registers: false
            },
            ArgClass::Float { size: 4 },
            ArgClass::Integer { size: 2 }
        ]
    );
}

#[test]
fn test_function_classification_per_convention() {
    let source = "struct Twelve { int a, b, c; }; struct Eight { int a, b; }; void f(struct Twelve, struct Eight);";
    let passing = |abi: AbiConfig| {
        let unit = compile_with(source, abi).unwrap_or_else(|e| panic!("{e}"));
        let call = unit.find("f").and_then(|d| d.call.clone()).expect("call signature");
        call.params
            .iter()
            .map(|param| matches!(param, ArgClass::Aggregate { in_registers: true, .. }))
            .collect::<Vec<_>>()
    };
    assert_eq!(passing(AbiConfig::lp64_sysv()), [true, true]);
    assert_eq!(passing(AbiConfig::aapcs64()), [true, true]);
    assert_eq!(passing(AbiConfig::llp64_win64()), [false, true]);
    assert_eq!(passing(AbiConfig::ilp32_cdecl()), [false, false]);
}

#[test]
fn test_pointer_to_function_has_layout_and_call() {
    let unit = compile("int (*callback)(int, void *);");
    let descriptor = unit.find("callback").expect("callback");
    assert_eq!(descriptor.layout.as_ref().map(|l| l.size), Some(8));
    let call = descriptor.call.as_ref().expect("call signature");
    assert_eq!(call.ret, ArgClass::Integer { size: 4 });
    assert_eq!(call.params, [ArgClass::Integer { size: 4 }, ArgClass::Pointer]);
}

#[test]
fn test_variadic_call_signature() {
    let unit = compile("double scale(float factor, int *values, ...);");
    let call = unit.find("scale").and_then(|d| d.call.clone()).expect("call signature");
    insta::assert_debug_snapshot!(call, @r"
    CallSignature {
        convention: SysV64,
        ret: Float {
            size: 8,
        },
        params: [
            Float {
                size: 4,
            },
            Pointer,
        ],
        is_variadic: true,
    }
    ");
}
