//! Syntax tree for C declarations.
//!
//! The parser produces a [`TranslationUnit`]: an ordered list of declarations whose
//! declaration specifiers live in a side arena so that comma-separated declarators
//! (`int a, *b;`) share one base type. Declarators keep C's inside-out shape; the
//! resolver walks them from the outermost node towards the name.

use std::num::NonZeroU32;

use serde::Serialize;
use thin_vec::ThinVec;

use crate::lexer::DirectiveKind;
use crate::semantic::TypeQualifiers;
use crate::source::SourceSpan;
use crate::type_node::PrimitiveKind;

/// Represents an interned string using symbol_table crate.
/// Alias for GlobalSymbol from symbol_table crate with global feature.
pub type NameId = symbol_table::GlobalSymbol;

/// Reference into [`TranslationUnit::specifiers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecRef(NonZeroU32);

impl SpecRef {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// A parsed unit of declaration text.
#[derive(Debug, Clone, Default)]
pub struct TranslationUnit {
    pub declarations: Vec<Declaration>,
    pub specifiers: Vec<DeclSpecifiers>,
    pub directives: Vec<Directive>,
    /// Every typedef name the unit declared, in declaration order
    pub typedef_names: Vec<NameId>,
    /// Number of anonymous tags synthesized so far
    pub anon_count: u32,
}

impl TranslationUnit {
    pub fn new() -> Self {
        TranslationUnit::default()
    }

    /// Store the specifiers shared by the declarators of one statement
    pub(crate) fn push_specifiers(&mut self, spec: DeclSpecifiers) -> SpecRef {
        self.specifiers.push(spec);
        // len >= 1 after push
        SpecRef(NonZeroU32::MIN.saturating_add(self.specifiers.len() as u32 - 1))
    }

    pub fn specifiers(&self, spec: SpecRef) -> &DeclSpecifiers {
        &self.specifiers[spec.index()]
    }
}

/// `#define FFI_SCOPE` / `#define FFI_LIB` found in a header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub value: NameId,
    pub span: SourceSpan,
}

/// One declarator of a statement, or a tag-only statement when `declarator` is `None`.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub spec: SpecRef,
    pub declarator: Option<Declarator>,
    /// Initializers are skipped; only their presence is kept.
    pub has_initializer: bool,
    pub span: SourceSpan,
}

/// Storage class specifiers accepted at file scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StorageClass {
    Typedef,
    Extern,
    Static,
}

impl StorageClass {
    pub fn keyword(self) -> &'static str {
        match self {
            StorageClass::Typedef => "typedef",
            StorageClass::Extern => "extern",
            StorageClass::Static => "static",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeclSpecifiers {
    pub storage: Option<StorageClass>,
    pub qualifiers: TypeQualifiers,
    pub type_spec: TypeSpecifier,
    pub is_inline: bool,
    pub is_noreturn: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum TypeSpecifier {
    Builtin(PrimitiveKind),
    Record(RecordSpecifier),
    Enum(EnumSpecifier),
    /// A user typedef or one of the fixed-width builtin names (`size_t`, `int32_t`, ...)
    TypedefName(NameId, SourceSpan),
}

/// `struct`/`union` specifier. Anonymous records get a synthesized tag.
#[derive(Debug, Clone)]
pub struct RecordSpecifier {
    pub is_union: bool,
    pub tag: NameId,
    pub is_anonymous: bool,
    pub body: Option<Vec<MemberDecl>>,
    pub packed: bool,
    pub span: SourceSpan,
}

impl RecordSpecifier {
    pub fn keyword(&self) -> &'static str {
        if self.is_union { "union" } else { "struct" }
    }
}

#[derive(Debug, Clone)]
pub struct EnumSpecifier {
    pub tag: NameId,
    pub is_anonymous: bool,
    /// Explicit `enum E : type` underlying type
    pub underlying: Option<PrimitiveKind>,
    pub body: Option<Vec<Enumerator>>,
    pub packed: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Enumerator {
    pub name: NameId,
    pub value: Option<ConstExpr>,
    pub span: SourceSpan,
}

/// A member declaration inside a struct/union body.
/// No declarators means either an anonymous member or a nested tag declaration.
#[derive(Debug, Clone)]
pub struct MemberDecl {
    pub spec: DeclSpecifiers,
    pub declarators: Vec<MemberDeclarator>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct MemberDeclarator {
    /// `None` for an unnamed bit-field (`int : 3;`)
    pub declarator: Option<Declarator>,
    pub bit_width: Option<ConstExpr>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub spec: DeclSpecifiers,
    pub declarator: Declarator,
    pub span: SourceSpan,
}

/// Standalone type name, e.g. the operand of `FFI::new("struct Foo*")`
#[derive(Debug, Clone)]
pub struct TypeName {
    pub spec: DeclSpecifiers,
    pub declarator: Declarator,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ArraySize {
    /// `[]`
    Unknown,
    Expr(ConstExpr),
}

/// Declarator tree. The outermost node is applied to the base type first.
#[derive(Debug, Clone)]
pub enum Declarator {
    Identifier(NameId, SourceSpan),
    Abstract,
    Pointer(TypeQualifiers, Box<Declarator>),
    Array(Box<Declarator>, ArraySize),
    Function {
        inner: Box<Declarator>,
        params: ThinVec<ParamDecl>,
        is_variadic: bool,
    },
}

impl Declarator {
    /// The declared name, if any
    pub fn name(&self) -> Option<(NameId, SourceSpan)> {
        match self {
            Declarator::Identifier(name, span) => Some((*name, *span)),
            Declarator::Abstract => None,
            Declarator::Pointer(_, inner) | Declarator::Array(inner, _) => inner.name(),
            Declarator::Function { inner, .. } => inner.name(),
        }
    }

    /// Whether the innermost derivation is a function (i.e. this declares a function)
    pub fn is_function(&self) -> bool {
        let mut current = self;
        let mut last_is_function = false;
        loop {
            match current {
                Declarator::Identifier(..) | Declarator::Abstract => return last_is_function,
                Declarator::Pointer(_, inner) | Declarator::Array(inner, _) => {
                    last_is_function = false;
                    current = inner;
                }
                Declarator::Function { inner, .. } => {
                    last_is_function = true;
                    current = inner;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    LogicNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    LShift,
    RShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    LogicAnd,
    LogicOr,
}

/// Integer constant expression used for array sizes, enumerator values and bit widths
#[derive(Debug, Clone)]
pub struct ConstExpr {
    pub kind: ConstExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ConstExprKind {
    Int(i64),
    Ident(NameId),
    Unary(UnaryOp, Box<ConstExpr>),
    Binary(BinaryOp, Box<ConstExpr>, Box<ConstExpr>),
    Conditional(Box<ConstExpr>, Box<ConstExpr>, Box<ConstExpr>),
}
