use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::driver::output::format_scope;
use crate::ffi_scope::{FfiRoot, FfiSymbol, ScopeData, SharedLib};
use crate::tests::test_utils::compile;

const LIBC: &str = "#define FFI_SCOPE \"libc\"
#define FFI_LIB \"libc.so.6\"
typedef unsigned long size_t_alias;
struct tm { int tm_sec; int tm_min; };
enum { EOF_MARK = -1, BUFSIZE = 8192 };
extern int errno;
size_t_alias strlen(const char *s);
extern char **environ;
void *malloc(size_t_alias size);
int abs(int);
size_t_alias strlen(const char *s);
";

fn names(symbols: &[FfiSymbol]) -> Vec<&str> {
    symbols.iter().map(|symbol| symbol.name()).collect()
}

#[test]
fn test_scope_from_unit() {
    let unit = compile(LIBC);
    assert_eq!(unit.scope_name.as_deref(), Some("libc"));
    let scope = ScopeData::from_unit("libc", &unit);

    assert_eq!(scope.lib.as_deref(), Some("libc.so.6"));
    assert!(!scope.is_shared_lib());
    assert_eq!(names(&scope.variables), ["environ", "errno"]);
    assert_eq!(names(&scope.functions), ["abs", "malloc", "strlen"]);

    let types: Vec<_> = scope.types.iter().filter_map(|d| d.name.as_deref()).collect();
    assert_eq!(types, ["size_t_alias", "tm"]);
    assert_eq!(
        scope.enum_constants.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(),
        [("EOF_MARK", -1), ("BUFSIZE", 8192)]
    );
}

#[test]
fn test_scope_lookup() {
    let scope = ScopeData::from_unit("libc", &compile(LIBC));

    let strlen = scope.find_function("strlen").expect("strlen");
    assert_eq!(strlen.descriptor.canonical(), "unsigned long strlen(const char *);");
    assert!(scope.find_function("errno").is_none());
    assert!(scope.find_variable("errno").is_some());
    assert!(scope.find_variable("missing").is_none());

    let tm = scope.find_type("tm").expect("struct tm");
    assert_eq!(tm.layout.as_ref().map(|l| l.size), Some(8));
}

#[test]
fn test_register_scope_once() {
    let root = FfiRoot::new();
    let unit = compile(LIBC);
    assert!(root.register_scope("libc", ScopeData::from_unit("libc", &unit)));
    assert!(!root.register_scope("libc", ScopeData::from_unit("other", &unit)));

    let scope = root.find_scope("libc").expect("registered");
    assert_eq!(scope.shared_lib_id, Some(0));
    assert!(scope.is_shared_lib());
    assert!(root.find_scope("libm").is_none());
}

#[test]
fn test_shared_libraries_are_deduplicated() {
    let root = FfiRoot::new();
    let math = compile("#define FFI_LIB \"libm.so.6\"\ndouble sin(double);");
    let more_math = compile("#define FFI_LIB \"libm.so.6\"\ndouble cos(double);");
    let local = compile("int local_counter;");

    assert!(root.register_scope("sin", ScopeData::from_unit("sin", &math)));
    assert!(root.register_scope("local", ScopeData::from_unit("local", &local)));
    assert!(root.register_scope("cos", ScopeData::from_unit("cos", &more_math)));
    assert_eq!(root.shared_lib_id("libc.so.6"), 1);

    let ids: Vec<_> = root.scopes().iter().map(|scope| (scope.scope_name.clone(), scope.shared_lib_id)).collect();
    assert_eq!(
        ids,
        [
            ("cos".to_string(), Some(0)),
            ("local".to_string(), None),
            ("sin".to_string(), Some(0)),
        ]
    );
    assert_eq!(
        root.shared_libs(),
        [
            SharedLib {
                id: 0,
                path: "libm.so.6".to_string()
            },
            SharedLib {
                id: 1,
                path: "libc.so.6".to_string()
            },
        ]
    );
}

#[test]
fn test_bind_symbols_assigns_consecutive_slots() {
    let root = FfiRoot::new();
    let zlib = compile("extern const char *zlib_version; int deflate(void *strm, int flush); int inflate(void *strm, int flush);");
    let alpha = compile("extern int alpha_flag; void alpha_init(void);");
    let types_only = compile("typedef int handle;");

    root.register_scope("zlib", ScopeData::from_unit("zlib", &zlib));
    root.register_scope("alpha", ScopeData::from_unit("alpha", &alpha));
    root.register_scope("types", ScopeData::from_unit("types", &types_only));
    assert_eq!(root.find_scope("alpha").and_then(|scope| scope.env_offset()), None);

    root.bind_symbols();
    assert_eq!(root.dynamic_symbol_count(), 5);

    let alpha = root.find_scope("alpha").expect("alpha");
    assert_eq!(alpha.env_offset(), Some(0));
    assert_eq!(alpha.find_variable("alpha_flag").and_then(|s| s.env_index), Some(0));
    assert_eq!(alpha.find_function("alpha_init").and_then(|s| s.env_index), Some(1));

    let zlib = root.find_scope("zlib").expect("zlib");
    assert_eq!(zlib.env_offset(), Some(2));
    let slots: Vec<_> = zlib
        .variables
        .iter()
        .chain(&zlib.functions)
        .map(|symbol| (symbol.name(), symbol.env_index))
        .collect();
    assert_eq!(
        slots,
        [("zlib_version", Some(2)), ("deflate", Some(3)), ("inflate", Some(4))]
    );

    assert_eq!(root.find_scope("types").and_then(|scope| scope.env_offset()), None);
}

#[test]
fn test_concurrent_registration() {
    let root = FfiRoot::new();
    let units: Vec<_> = (0..6)
        .map(|i| compile(&format!("#define FFI_LIB \"lib{}.so\"\nint symbol_{i};", i % 2)))
        .collect();

    std::thread::scope(|scope| {
        for (i, unit) in units.iter().enumerate() {
            let root = &root;
            scope.spawn(move || {
                let name = format!("scope_{i}");
                assert!(root.register_scope(&name, ScopeData::from_unit(name.clone(), unit)));
            });
        }
    });

    assert_eq!(root.scopes().len(), 6);
    assert_eq!(root.shared_libs().len(), 2);
    let symbols: Vec<_> = root
        .scopes()
        .iter()
        .flat_map(|scope| scope.variables.iter().map(|symbol| Arc::clone(&symbol.descriptor)))
        .collect();
    assert_eq!(symbols.len(), 6);
}

#[test]
fn test_scope_report() {
    let root = FfiRoot::new();
    root.register_scope("libc", ScopeData::from_unit("libc", &compile(LIBC)));
    root.bind_symbols();
    let lines: Vec<_> = root.scopes().iter().map(format_scope).collect();
    assert_eq!(
        lines,
        ["scope libc: shared lib #0 libc.so.6, 2 variables, 3 functions, 2 types, env offset 0"]
    );
}
