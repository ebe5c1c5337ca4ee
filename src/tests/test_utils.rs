//! Shared helpers for the pipeline tests.

use crate::abi::AbiConfig;
use crate::ast::TranslationUnit;
use crate::compiler::{Compiler, Unit};
use crate::descriptor::DescriptorCache;
use crate::diagnostic::{DiagnosticEngine, FfiError, ParseError, SemanticError, UnitError};
use crate::layout::TypeLayout;
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::semantic::{ResolvedUnit, resolve_unit};
use crate::type_node::TypeNode;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parse a unit, returning the AST (if parsing did not abort) and every reported error
pub fn parse_with_errors(source: &str) -> (Option<TranslationUnit>, Vec<FfiError>) {
    init_logging();
    let tokens = tokenize(source).unwrap_or_else(|e| panic!("lexing failed: {e}"));
    let mut diag = DiagnosticEngine::new();
    let result = Parser::new(&tokens, &mut diag).parse_translation_unit();
    match result {
        Ok(unit) => (Some(unit), diag.take_errors()),
        Err(error) => {
            let mut errors = diag.take_errors();
            errors.push(error.into());
            (None, errors)
        }
    }
}

/// Parse a unit that must not produce any error
pub fn parse(source: &str) -> TranslationUnit {
    match parse_with_errors(source) {
        (Some(unit), errors) if errors.is_empty() => unit,
        (_, errors) => panic!("parse failed: {errors:?}"),
    }
}

/// The first parse error of a unit
pub fn parse_error(source: &str) -> ParseError {
    let (_, errors) = parse_with_errors(source);
    match errors.into_iter().next() {
        Some(FfiError::Parse(error)) => error,
        other => panic!("expected a parse error, got {other:?}"),
    }
}

pub fn resolve(source: &str) -> ResolvedUnit {
    resolve_unit(&parse(source), &AbiConfig::lp64_sysv()).unwrap_or_else(|errors| panic!("resolution failed: {errors:?}"))
}

pub fn resolve_error(source: &str) -> SemanticError {
    match resolve_unit(&parse(source), &AbiConfig::lp64_sysv()) {
        Ok(_) => panic!("expected resolution of {source:?} to fail"),
        Err(mut errors) => errors.remove(0),
    }
}

pub fn compile_with(source: &str, abi: AbiConfig) -> Result<Unit, UnitError> {
    init_logging();
    let cache = DescriptorCache::new();
    Compiler::with_cache(abi, &cache).process_unit(source)
}

/// Process a unit for x86-64 System V with a private cache
pub fn compile(source: &str) -> Unit {
    compile_with(source, AbiConfig::lp64_sysv()).unwrap_or_else(|e| panic!("unit failed: {e}"))
}

pub fn compile_error(source: &str) -> UnitError {
    match compile_with(source, AbiConfig::lp64_sysv()) {
        Ok(unit) => panic!("expected the unit to fail, got {} descriptors", unit.descriptors.len()),
        Err(error) => error,
    }
}

/// Exported type of the declaration named `name`
pub fn type_of(unit: &Unit, name: &str) -> TypeNode {
    match unit.find(name) {
        Some(descriptor) => descriptor.ty.clone(),
        None => panic!("no declaration named '{name}'"),
    }
}

pub fn layout_of(unit: &Unit, name: &str) -> TypeLayout {
    unit.find(name)
        .and_then(|descriptor| descriptor.layout.clone())
        .unwrap_or_else(|| panic!("'{name}' has no layout"))
}
