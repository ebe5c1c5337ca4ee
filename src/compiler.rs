//! Unit pipeline: declaration text in, published descriptors out.
//!
//! Each unit goes through lexing, parsing, type resolution, export, layout and
//! emission on one thread with its own Type Table. A unit either succeeds as a whole,
//! publishing its descriptors to the cache, or fails with every error it produced and
//! publishes nothing. Independent units can be processed in parallel.

use std::sync::Arc;

use hashbrown::HashMap;
use log::debug;
use rayon::prelude::*;

use crate::abi::AbiConfig;
use crate::ast::{StorageClass, TranslationUnit};
use crate::descriptor::{DeclKind, Descriptor, DescriptorCache, DescriptorKey};
use crate::diagnostic::{DiagnosticEngine, FfiError, SemanticError, UnitError};
use crate::layout::LayoutCalculator;
use crate::lexer::{DirectiveKind, tokenize};
use crate::parser::Parser;
use crate::semantic::export::TypeExporter;
use crate::semantic::{Namespace, QualType, ScopeId, TypeKind, canonical, resolve_type_name, resolve_unit};
use crate::source::SourceSpan;
use crate::type_node::{RecordKind, RecordType, TypeNode};

/// A successfully processed unit
#[derive(Debug, Clone)]
pub struct Unit {
    /// One descriptor per top-level declaration, in source order
    pub descriptors: Vec<Arc<Descriptor>>,
    /// Enum constants in declaration order
    pub enum_constants: Vec<(String, i64)>,
    /// Value of `#define FFI_SCOPE`
    pub scope_name: Option<String>,
    /// Value of `#define FFI_LIB`
    pub lib: Option<String>,
    records: HashMap<(RecordKind, String), Arc<RecordType>>,
    ast: TranslationUnit,
}

impl Unit {
    /// Definition of the file-scope record `kind tag`, if the unit defined or declared it
    pub fn record(&self, kind: RecordKind, tag: &str) -> Option<Arc<RecordType>> {
        self.records.get(&(kind, tag.to_string())).cloned()
    }

    /// Follow a by-name record edge. Records are returned as they are.
    pub fn resolve_ref(&self, ty: &TypeNode) -> Option<Arc<RecordType>> {
        match ty {
            TypeNode::Record(record) => Some(Arc::clone(record)),
            TypeNode::RecordRef { kind, tag } => self.record(*kind, tag),
            _ => None,
        }
    }

    /// First descriptor declaring `name`
    pub fn find(&self, name: &str) -> Option<&Arc<Descriptor>> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name.as_deref() == Some(name))
    }

    pub fn enum_constant(&self, name: &str) -> Option<i64> {
        self.enum_constants
            .iter()
            .find_map(|(constant, value)| (constant == name).then_some(*value))
    }
}

/// Drives units through the pipeline for one ABI, publishing into one cache
#[derive(Debug, Clone)]
pub struct Compiler<'c> {
    abi: AbiConfig,
    cache: &'c DescriptorCache,
}

impl Compiler<'static> {
    /// Compiler publishing into the process-wide cache
    pub fn new(abi: AbiConfig) -> Self {
        Compiler {
            abi,
            cache: DescriptorCache::global(),
        }
    }
}

impl<'c> Compiler<'c> {
    pub fn with_cache(abi: AbiConfig, cache: &'c DescriptorCache) -> Self {
        Compiler { abi, cache }
    }

    pub fn abi(&self) -> &AbiConfig {
        &self.abi
    }

    pub fn cache(&self) -> &'c DescriptorCache {
        self.cache
    }

    /// Process one unit of declaration text
    pub fn process_unit(&self, text: &str) -> Result<Unit, UnitError> {
        let tokens = tokenize(text).map_err(FfiError::from)?;

        let mut diag = DiagnosticEngine::new();
        let parsed = Parser::new(&tokens, &mut diag).parse_translation_unit();
        let ast = match parsed {
            Ok(ast) => ast,
            Err(error) => {
                diag.report_error(error);
                TranslationUnit::new()
            }
        };
        if diag.has_errors() {
            return Err(UnitError::new(diag.take_errors()));
        }
        debug!("process_unit: parsed {} declarations", ast.declarations.len());

        let resolved = resolve_unit(&ast, &self.abi).map_err(semantic_failure)?;
        let mut exporter = TypeExporter::new(&resolved.registry);
        let mut calculator = LayoutCalculator::new(&self.abi);

        let mut errors = Vec::new();
        let mut descriptors = Vec::with_capacity(resolved.decls.len());
        for decl in &resolved.decls {
            // `struct { int x; };` declares nothing
            if decl.kind == DeclKind::Tag && decl.name.is_none() {
                continue;
            }
            let name = decl.name.map(|name| name.to_string());
            match self.build_descriptor(
                &mut exporter,
                &mut calculator,
                name,
                decl.kind,
                decl.storage,
                decl.ty,
                decl.span,
            ) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(error) => errors.push(error),
            }
        }
        if !errors.is_empty() {
            return Err(UnitError::new(errors));
        }

        let mut records = HashMap::new();
        for symbol in resolved.symbols.iter_scope(ScopeId::GLOBAL, Namespace::Tag) {
            if let TypeKind::Record { is_union, .. } = resolved.registry.kind(symbol.ty.ty) {
                let kind = if *is_union { RecordKind::Union } else { RecordKind::Struct };
                records.insert((kind, symbol.name.to_string()), exporter.export_record(symbol.ty.ty));
            }
        }
        let enum_constants = resolved
            .enum_constants
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        let mut scope_name = None;
        let mut lib = None;
        for directive in &ast.directives {
            let value = Some(directive.value.to_string());
            match directive.kind {
                DirectiveKind::Scope => scope_name = value,
                DirectiveKind::Lib => lib = value,
            }
        }

        // nothing is published before the whole unit succeeded
        let descriptors = descriptors
            .into_iter()
            .map(|descriptor| self.cache.publish(descriptor))
            .collect::<Vec<_>>();
        debug!(
            "process_unit: {} descriptors, cache holds {}",
            descriptors.len(),
            self.cache.len()
        );

        Ok(Unit {
            descriptors,
            enum_constants,
            scope_name,
            lib,
            records,
            ast,
        })
    }

    /// Process independent units in parallel. Results keep the input order.
    pub fn process_units<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Result<Unit, UnitError>> {
        texts.par_iter().map(|text| self.process_unit(text.as_ref())).collect()
    }

    /// Resolve a standalone type name such as `struct Foo *` or `int[4]`, seeing the
    /// typedefs and tags of `unit` when given
    pub fn parse_type(&self, text: &str, unit: Option<&Unit>) -> Result<Arc<Descriptor>, UnitError> {
        let tokens = tokenize(text).map_err(FfiError::from)?;
        let empty = TranslationUnit::new();
        let base = unit.map_or(&empty, |unit| &unit.ast);

        let mut diag = DiagnosticEngine::new();
        let type_name = Parser::for_unit(&tokens, &mut diag, base)
            .parse_type_name()
            .map_err(FfiError::from)?;
        let (resolved, ty) = resolve_type_name(base, &type_name, &self.abi).map_err(semantic_failure)?;

        let mut exporter = TypeExporter::new(&resolved.registry);
        let mut calculator = LayoutCalculator::new(&self.abi);
        let descriptor = self
            .build_descriptor(
                &mut exporter,
                &mut calculator,
                None,
                DeclKind::TypeName,
                None,
                ty,
                type_name.span,
            )
            .map_err(UnitError::from)?;
        Ok(self.cache.publish(descriptor))
    }

    /// Export, print and lay out one declaration. A descriptor already in the cache
    /// is reused without computing the layout again.
    #[allow(clippy::too_many_arguments)]
    fn build_descriptor(
        &self,
        exporter: &mut TypeExporter,
        calculator: &mut LayoutCalculator,
        name: Option<String>,
        kind: DeclKind,
        storage: Option<StorageClass>,
        ty: QualType,
        span: SourceSpan,
    ) -> Result<Arc<Descriptor>, FfiError> {
        let (ty, qualifiers) = exporter.export(ty);
        let text = canonical::declaration_text(name.as_deref(), kind, storage, &ty, qualifiers);
        let key = DescriptorKey::new(text, self.abi.clone());
        if let Some(found) = self.cache.get(&key) {
            return Ok(found);
        }

        let layout_error = |error| FfiError::Layout { error, span };
        let layout = if kind != DeclKind::Function && ty.is_complete() {
            Some(calculator.layout_of(&ty).map_err(layout_error)?)
        } else {
            None
        };
        let call = match ty.as_function() {
            Some(_) => Some(calculator.classify_function(&ty).map_err(layout_error)?),
            None => None,
        };

        Ok(Arc::new(Descriptor {
            key,
            name,
            kind,
            storage,
            ty,
            qualifiers,
            layout,
            call,
        }))
    }
}

fn semantic_failure(errors: Vec<SemanticError>) -> UnitError {
    UnitError::new(errors.into_iter().map(FfiError::from).collect())
}
