use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use crate::abi::{AbiConfig, Packing};
use crate::ast::StorageClass;
use crate::compiler::Compiler;
use crate::descriptor::{DeclKind, Descriptor, DescriptorCache, DescriptorKey};
use crate::diagnostic::ErrorKind;
use crate::driver::output::format_descriptor;
use crate::semantic::TypeQualifiers;
use crate::tests::test_utils::{compile, compile_error, init_logging};
use crate::type_node::{PrimitiveKind, TypeNode};

fn canonical_texts(source: &str) -> Vec<String> {
    compile(source)
        .descriptors
        .iter()
        .map(|descriptor| descriptor.canonical().to_string())
        .collect()
}

#[test]
fn test_canonical_text() {
    let texts = canonical_texts(
        "typedef struct { int x; char y; } Point;
         extern const char *const names[4];
         static unsigned long counter;
         int (*cmp)(const void*, const void*);
         Point *make_point(int, int);
         struct Node { struct Node *next; int value; };
         enum __attribute__((packed)) Level { LOW, HIGH = 5 };",
    );
    assert_eq!(
        texts,
        [
            "typedef struct { int x; char y; } Point;",
            "extern const char *const names[4];",
            "static unsigned long counter;",
            "int (*cmp)(const void *, const void *);",
            "struct { int x; char y; } *make_point(int, int);",
            "struct Node { struct Node *next; int value; };",
            "enum Level : unsigned char { LOW = 0, HIGH = 5 };",
        ]
    );
}

#[test]
fn test_canonical_text_reparses_to_same_type() {
    let source = "struct Inner { short s; };
                  struct Outer { struct Inner inner; struct Inner *link; int (*hook)(struct Outer *); };
                  typedef struct Outer Outer;
                  const Outer *lookup(const char *key, unsigned n, ...);
                  char grid[3][4];";
    let first = compile(source);
    for descriptor in &first.descriptors {
        let again = compile(descriptor.canonical());
        let reparsed = again
            .descriptors
            .last()
            .unwrap_or_else(|| panic!("no descriptor for {:?}", descriptor.canonical()));
        assert_eq!(reparsed.ty, descriptor.ty, "{}", descriptor.canonical());
        assert_eq!(reparsed.qualifiers, descriptor.qualifiers);
        assert_eq!(reparsed.canonical(), descriptor.canonical());
    }
}

#[test]
fn test_same_declaration_shares_descriptor() {
    init_logging();
    let cache = DescriptorCache::new();
    let compiler = Compiler::with_cache(AbiConfig::lp64_sysv(), &cache);

    let first = compiler.process_unit("int (*cmp)(const void *, const void *);").expect("first unit");
    let second = compiler
        .process_unit("typedef const void *cptr; int (*cmp)(cptr, cptr);")
        .expect("second unit");

    let cmp = first.find("cmp").expect("cmp");
    let again = second.find("cmp").expect("cmp");
    assert!(Arc::ptr_eq(cmp, again));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_storage_class_is_part_of_the_key() {
    init_logging();
    let cache = DescriptorCache::new();
    let compiler = Compiler::with_cache(AbiConfig::lp64_sysv(), &cache);

    let local = compiler.process_unit("static int x;").expect("static unit");
    let imported = compiler.process_unit("extern int x;").expect("extern unit");
    let plain = compiler.process_unit("int x;").expect("plain unit");

    let (local, imported, plain) = (&local.descriptors[0], &imported.descriptors[0], &plain.descriptors[0]);
    assert_eq!(local.storage, Some(StorageClass::Static));
    assert_eq!(imported.storage, Some(StorageClass::Extern));
    assert_eq!(plain.storage, None);
    assert!(!Arc::ptr_eq(local, imported));
    assert_eq!(imported.canonical(), "extern int x;");
    assert_eq!(cache.len(), 3);

    let again = compiler.process_unit("extern int x;").expect("extern again");
    assert!(Arc::ptr_eq(&again.descriptors[0], imported));
}

#[test]
fn test_abi_is_part_of_the_key() {
    init_logging();
    let cache = DescriptorCache::new();
    let natural = Compiler::with_cache(AbiConfig::lp64_sysv(), &cache);
    let packed = Compiler::with_cache(AbiConfig::lp64_sysv().with_packing(Packing::Packed), &cache);

    let source = "struct S { char c; int i; };";
    let a = natural.process_unit(source).expect("natural");
    let b = packed.process_unit(source).expect("packed");
    let (a, b) = (&a.descriptors[0], &b.descriptors[0]);
    assert_eq!(a.canonical(), b.canonical());
    assert!(!Arc::ptr_eq(a, b));
    assert_eq!(a.layout.as_ref().map(|l| l.size), Some(8));
    assert_eq!(b.layout.as_ref().map(|l| l.size), Some(5));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_get_or_emit_builds_once() {
    let cache = DescriptorCache::new();
    let key = DescriptorKey::new("int x;", AbiConfig::lp64_sysv());
    let builds = AtomicUsize::new(0);
    let build = |key: &DescriptorKey| {
        builds.fetch_add(1, Ordering::SeqCst);
        Descriptor {
            key: key.clone(),
            name: Some("x".to_string()),
            kind: DeclKind::Variable,
            storage: None,
            ty: TypeNode::Primitive(PrimitiveKind::Int),
            qualifiers: TypeQualifiers::empty(),
            layout: None,
            call: None,
        }
    };

    let first = cache.get_or_emit(key.clone(), build);
    let second = cache.get_or_emit(key.clone(), build);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&key).map(|found| Arc::ptr_eq(&found, &first)), Some(true));
}

#[test]
fn test_concurrent_publication() {
    let cache = DescriptorCache::new();
    let compiler = Compiler::with_cache(AbiConfig::lp64_sysv(), &cache);
    let source = "struct Shared { int a; double b; }; struct Shared make_shared(void);";

    let units: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| compiler.process_unit(source).expect("unit")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    });

    for unit in &units[1..] {
        for (a, b) in units[0].descriptors.iter().zip(&unit.descriptors) {
            assert!(Arc::ptr_eq(a, b));
        }
    }
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_failed_unit_publishes_nothing() {
    init_logging();
    let cache = DescriptorCache::new();
    let compiler = Compiler::with_cache(AbiConfig::lp64_sysv(), &cache);

    let error = compiler
        .process_unit("int fine; struct Bad { int x : 40; };")
        .expect_err("layout conflict");
    assert_eq!(error.kind(), Some(ErrorKind::LayoutConflict));
    assert!(cache.is_empty());
}

#[test]
fn test_all_recovered_errors_are_reported() {
    let error = compile_error("int a;\nshort long b;\nint c;\nchar double d;\nint e;");
    assert_eq!(error.errors.len(), 2);
    assert!(error.errors.iter().all(|e| e.kind() == ErrorKind::Syntax));
    let lines: Vec<_> = error.errors.iter().map(|e| e.span().start.line).collect();
    assert_eq!(lines, [2, 4]);
}

#[test]
fn test_string_and_aggregate_queries() {
    let unit = compile(
        "const char *getenv(const char *name);
         unsigned char *buffer;
         char *strdup(const char *s);
         struct Pair { int a, b; };
         struct Pair *pairs;
         int plain;",
    );
    let cstring = |name: &str| unit.find(name).is_some_and(|d| d.is_cstring());
    assert!(cstring("getenv"));
    assert!(cstring("strdup"));
    assert!(!cstring("buffer"));
    assert!(!cstring("plain"));

    let non_scalar = |name: &str| unit.find(name).is_some_and(|d| d.contains_non_scalar());
    assert!(non_scalar("pairs"));
    assert!(non_scalar("Pair"));
    assert!(!non_scalar("buffer"));
}

#[test]
fn test_parse_type() {
    init_logging();
    let cache = DescriptorCache::new();
    let compiler = Compiler::with_cache(AbiConfig::lp64_sysv(), &cache);
    let unit = compiler
        .process_unit("typedef struct Foo { int a; char b; } Foo; typedef unsigned long ulong;")
        .expect("unit");

    let pointer = compiler.parse_type("struct Foo *", Some(&unit)).expect("struct Foo *");
    assert_eq!(pointer.kind, DeclKind::TypeName);
    assert_eq!(pointer.canonical(), "struct Foo *");
    assert_eq!(pointer.layout.as_ref().map(|l| l.size), Some(8));

    let by_typedef = compiler.parse_type("Foo[2]", Some(&unit)).expect("Foo[2]");
    assert_eq!(by_typedef.layout.as_ref().map(|l| (l.size, l.align)), Some((16, 4)));

    let array = compiler.parse_type("ulong[4]", Some(&unit)).expect("ulong[4]");
    assert_eq!(array.canonical(), "unsigned long [4]");

    let callback = compiler.parse_type("int (*)(int)", None).expect("function pointer");
    assert!(callback.call.is_some());

    let unknown = compiler.parse_type("Foo", None).expect_err("no unit, no typedef");
    assert_eq!(unknown.kind(), Some(ErrorKind::UnresolvedType));

    let named = compiler.parse_type("int x", None).expect_err("type names are abstract");
    assert_eq!(named.kind(), Some(ErrorKind::Syntax));
}

#[test]
fn test_descriptor_report() {
    let unit = compile("typedef struct { int x; char y; } Point; double (*scale)(Point, float);");
    let report: Vec<_> = unit.descriptors.iter().map(|d| format_descriptor(d)).collect();
    insta::assert_snapshot!(report.join("\n"), @r"
    typedef struct { int x; char y; } Point;
      size 8, align 4
      x: offset 0, size 4
      y: offset 4, size 1
      padding 3
    double (*scale)(struct { int x; char y; }, float);
      size 8, align 8
      call SysV64: (aggregate(8, align 4, registers), float32) -> float64
    ");
}
