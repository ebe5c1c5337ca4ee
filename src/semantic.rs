//! Semantic analysis module.
//!
//! This module turns a parsed [`crate::ast::TranslationUnit`] into resolved types:
//! - Scope management for ordinary identifiers and tags
//! - Typedef flattening and tag binding in a canonicalizing type registry
//! - Constant evaluation for array sizes, enumerators and bit widths
//! - Export into self-contained [`crate::type_node::TypeNode`]s and canonical text

pub mod canonical;
pub(crate) mod const_eval;
pub mod export;
pub mod symbol_table;
pub mod type_registry;
pub mod type_resolver;
pub mod types;

// Re-export key types for public API
pub use symbol_table::{Namespace, ScopeId, Symbol, SymbolKind, SymbolRef, SymbolTable, SymbolTableError};
pub use type_registry::TypeRegistry;
pub use type_resolver::{DeclKind, ResolvedDecl, ResolvedUnit, TypeResolver, resolve_type_name, resolve_unit};
pub use types::{EnumConstant, FunctionParameter, QualType, StructMember, Type, TypeKind, TypeQualifiers, TypeRef};
