use super::*;
use pretty_assertions::assert_eq;
use symbol_table::GlobalSymbol as Symbol;

fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input)
        .unwrap_or_else(|e| panic!("lexing failed: {e}"))
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

fn spelled(input: &str) -> String {
    kinds(input).iter().map(|k| k.to_string()).collect::<Vec<_>>().join(" ")
}

#[test]
fn test_declaration_keywords() {
    let keywords = [
        ("typedef", TokenKind::Typedef),
        ("extern", TokenKind::Extern),
        ("static", TokenKind::Static),
        ("const", TokenKind::Const),
        ("volatile", TokenKind::Volatile),
        ("restrict", TokenKind::Restrict),
        ("__restrict", TokenKind::Restrict),
        ("_Atomic", TokenKind::Atomic),
        ("_Bool", TokenKind::Bool),
        ("bool", TokenKind::Bool),
        ("unsigned", TokenKind::Unsigned),
        ("struct", TokenKind::Struct),
        ("union", TokenKind::Union),
        ("enum", TokenKind::Enum),
        ("__attribute__", TokenKind::Attribute),
        ("_Noreturn", TokenKind::Noreturn),
    ];

    for (text, expected) in keywords {
        assert_eq!(kinds(text), vec![expected], "keyword {text}");
    }
}

#[test]
fn test_identifiers_are_interned() {
    assert_eq!(
        kinds("size_t _private x1"),
        vec![
            TokenKind::Identifier(Symbol::new("size_t")),
            TokenKind::Identifier(Symbol::new("_private")),
            TokenKind::Identifier(Symbol::new("x1")),
        ]
    );
}

#[test]
fn test_function_pointer_declaration() {
    insta::assert_snapshot!(
        spelled("int (*cmp)(const void *, const void *);"),
        @"int ( * cmp ) ( const void * , const void * ) ;"
    );
}

#[test]
fn test_integer_constants() {
    assert_eq!(
        kinds("42 0x1F 017 0b101 10u 7UL 3ll"),
        vec![
            TokenKind::IntegerConstant(42),
            TokenKind::IntegerConstant(31),
            TokenKind::IntegerConstant(15),
            TokenKind::IntegerConstant(5),
            TokenKind::IntegerConstant(10),
            TokenKind::IntegerConstant(7),
            TokenKind::IntegerConstant(3),
        ]
    );
}

#[test]
fn test_float_and_char_constants() {
    assert_eq!(
        kinds("1.5 2e10 'a' '\\n' '\\x41'"),
        vec![
            TokenKind::FloatConstant(Symbol::new("1.5")),
            TokenKind::FloatConstant(Symbol::new("2e10")),
            TokenKind::CharacterConstant(97),
            TokenKind::CharacterConstant(10),
            TokenKind::CharacterConstant(65),
        ]
    );
}

#[test]
fn test_multi_char_punctuators() {
    insta::assert_snapshot!(spelled("... << >> -> <= == != && ||"), @"... << >> -> <= == != && ||");
}

#[test]
fn test_comments_are_skipped() {
    let source = "int /* inline */ x; // trailing\n/* multi\nline */ long y;";
    insta::assert_snapshot!(spelled(source), @"int x ; long y ;");
}

#[test]
fn test_positions_track_lines_and_columns() {
    let tokens = tokenize("int x;\n  long y;").unwrap();
    let long = tokens[3];
    assert_eq!(long.kind, TokenKind::Long);
    assert_eq!(long.span.start.line, 2);
    assert_eq!(long.span.start.column, 3);
    assert_eq!(long.lexeme("int x;\n  long y;"), "long");
}

#[test]
fn test_ffi_directives() {
    let source = "#define FFI_SCOPE \"libc\"\n#define FFI_LIB \"libc.so.6\"\nint abs(int);";
    let toks = kinds(source);
    assert_eq!(toks[0], TokenKind::Directive(DirectiveKind::Scope, Symbol::new("libc")));
    assert_eq!(toks[1], TokenKind::Directive(DirectiveKind::Lib, Symbol::new("libc.so.6")));
    assert_eq!(toks[2], TokenKind::Int);
}

#[test]
fn test_pragma_lines_are_rejected() {
    let err = tokenize("int y;\n#pragma pack(1)\nstruct S { char a; int b; };").unwrap_err();
    match &err {
        LexError::UnsupportedDirective { text, span } => {
            assert_eq!(text, "#pragma pack(1)");
            assert_eq!(span.start.line, 2);
        }
        other => panic!("expected an unsupported directive, got {other:?}"),
    }
    assert!(matches!(tokenize("  #pragma once\nint x;"), Err(LexError::UnsupportedDirective { .. })));
}

#[test]
fn test_other_directives_are_rejected() {
    let err = tokenize("#include <stdio.h>\nint x;").unwrap_err();
    assert!(matches!(err, LexError::UnsupportedDirective { .. }), "got {err:?}");
    assert_eq!(err.span().start.line, 1);
}

#[test]
fn test_hash_inside_a_line_is_invalid() {
    let err = tokenize("int # x;").unwrap_err();
    assert_eq!(err.to_string(), "invalid character '#'");
}

#[test]
fn test_unterminated_comment() {
    let err = tokenize("int x; /* never closed").unwrap_err();
    assert!(matches!(err, LexError::UnterminatedComment { .. }));
}

#[test]
fn test_unterminated_string() {
    let err = tokenize("#define FFI_LIB \"x\"\nchar *s = \"abc").unwrap_err();
    assert!(matches!(err, LexError::UnterminatedString { .. }));
}

#[test]
fn test_lexer_stops_after_first_error() {
    let mut lexer = Lexer::new("int @ x ;");
    assert_eq!(lexer.next().map(|r| r.map(|t| t.kind)), Some(Ok(TokenKind::Int)));
    assert!(matches!(lexer.next(), Some(Err(LexError::InvalidCharacter { ch: '@', .. }))));
    assert!(lexer.next().is_none());
}

#[test]
fn test_restart_rewinds_to_beginning() {
    let mut lexer = Lexer::new("int x;");
    let first: Vec<_> = lexer.by_ref().collect();
    assert!(lexer.next().is_none());
    lexer.restart();
    let second: Vec<_> = lexer.collect();
    assert_eq!(first, second);
}

#[test]
fn test_invalid_integer_suffix() {
    let err = tokenize("int a[10q];").unwrap_err();
    assert!(matches!(err, LexError::InvalidInteger { ref text, .. } if text == "10q"));
}
