//! Type resolution for parsed declarations.
//!
//! The resolver walks a [`TranslationUnit`] in source order, binding tags and ordinary
//! names in a [`SymbolTable`] and building canonical types in a [`TypeRegistry`].
//! Typedef uses are flattened to their targets; named records and enums are bound to
//! one registry entry each, completed in place when their body is seen.

use hashbrown::HashMap;
use log::{debug, trace};
use serde::Serialize;

use crate::abi::AbiConfig;
use crate::ast::*;
use crate::diagnostic::SemanticError;
use crate::source::SourceSpan;
use crate::type_node::PrimitiveKind;

use super::const_eval::{ConstEvalCtx, eval_const_expr};
use super::{
    EnumConstant, FunctionParameter, QualType, StructMember, Symbol, SymbolKind, SymbolTable, SymbolTableError,
    TypeKind, TypeRef, TypeRegistry,
};

/// What a top-level declaration introduces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeclKind {
    Typedef,
    Function,
    Variable,
    /// `struct S { ... };`, `struct S;`, `enum E { ... };`
    Tag,
    /// A standalone type name, e.g. the operand of `FFI::new`
    TypeName,
}

/// One resolved top-level declaration
#[derive(Debug, Clone)]
pub struct ResolvedDecl {
    /// `None` for a tag declaration of an anonymous record or enum
    pub name: Option<NameId>,
    pub kind: DeclKind,
    pub storage: Option<StorageClass>,
    /// Typedef-free type of the declared entity
    pub ty: QualType,
    pub span: SourceSpan,
}

/// Everything resolution of one unit produces
#[derive(Debug)]
pub struct ResolvedUnit {
    pub registry: TypeRegistry,
    /// Sealed after resolution
    pub symbols: SymbolTable,
    pub decls: Vec<ResolvedDecl>,
    /// Enum constants in declaration order
    pub enum_constants: Vec<(NameId, i64)>,
}

/// Resolve a whole unit for `abi`. Resolution stops at the first semantic error.
pub fn resolve_unit(unit: &TranslationUnit, abi: &AbiConfig) -> Result<ResolvedUnit, Vec<SemanticError>> {
    let mut resolver = TypeResolver::for_target(abi);
    resolver.resolve_translation_unit(unit).map_err(|e| vec![e])?;
    resolver.finish().map_err(|e| vec![e])
}

/// Resolve `type_name` against the declarations of `unit`
pub fn resolve_type_name(
    unit: &TranslationUnit,
    type_name: &TypeName,
    abi: &AbiConfig,
) -> Result<(ResolvedUnit, QualType), Vec<SemanticError>> {
    let mut resolver = TypeResolver::for_target(abi);
    resolver.resolve_translation_unit(unit).map_err(|e| vec![e])?;
    let ty = resolver.resolve_type_name(type_name).map_err(|e| vec![e])?;
    let resolved = resolver.finish().map_err(|e| vec![e])?;
    Ok((resolved, ty))
}

#[derive(Debug, Default)]
pub struct TypeResolver {
    registry: TypeRegistry,
    symbols: SymbolTable,
    /// Specifiers shared by the declarators of one statement are resolved once
    spec_cache: HashMap<SpecRef, QualType>,
    /// Records whose body is being resolved
    in_progress: Vec<TypeRef>,
    /// By-value uses of tags that must be complete once the unit is done
    pending_complete: Vec<(TypeRef, SourceSpan)>,
    decls: Vec<ResolvedDecl>,
    enum_constants: Vec<(NameId, i64)>,
    /// Integer ranges for enum underlying types
    abi: AbiConfig,
}

impl TypeResolver {
    pub fn new() -> Self {
        TypeResolver::default()
    }

    pub fn for_target(abi: &AbiConfig) -> Self {
        TypeResolver {
            abi: abi.clone(),
            ..TypeResolver::default()
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn resolve_translation_unit(&mut self, unit: &TranslationUnit) -> Result<(), SemanticError> {
        for decl in &unit.declarations {
            self.resolve_declaration(unit, decl)?;
        }
        Ok(())
    }

    /// Check deferred completeness requirements and hand out the results
    pub fn finish(mut self) -> Result<ResolvedUnit, SemanticError> {
        for &(ty, span) in &self.pending_complete {
            if !self.registry.is_complete(ty) {
                return Err(SemanticError::IncompleteType {
                    name: self.registry.display_name(ty),
                    span,
                });
            }
        }
        self.symbols.seal();
        debug!(
            "TypeResolver: resolved {} declarations, {} registry types",
            self.decls.len(),
            self.registry.len()
        );
        Ok(ResolvedUnit {
            registry: self.registry,
            symbols: self.symbols,
            decls: self.decls,
            enum_constants: self.enum_constants,
        })
    }

    /// Resolve a standalone type name in the global scope
    pub fn resolve_type_name(&mut self, type_name: &TypeName) -> Result<QualType, SemanticError> {
        let base = self.resolve_specifiers(&type_name.spec)?;
        let (ty, _) = self.apply_declarator(base, &type_name.declarator)?;
        Ok(self.registry.strip_typedefs(ty))
    }

    fn resolve_declaration(&mut self, unit: &TranslationUnit, decl: &Declaration) -> Result<(), SemanticError> {
        let spec = unit.specifiers(decl.spec);
        let base = self.spec_type(unit, decl.spec)?;

        let Some(declarator) = &decl.declarator else {
            let (tag, is_anonymous) = match &spec.type_spec {
                TypeSpecifier::Record(record) => (record.tag, record.is_anonymous),
                TypeSpecifier::Enum(enum_spec) => (enum_spec.tag, enum_spec.is_anonymous),
                _ => return Ok(()),
            };
            self.decls.push(ResolvedDecl {
                name: (!is_anonymous).then_some(tag),
                kind: DeclKind::Tag,
                storage: None,
                ty: base,
                span: decl.span,
            });
            return Ok(());
        };

        let (ty, name) = self.apply_declarator(base, declarator)?;
        let Some((name, name_span)) = name else {
            return Err(SemanticError::UnsupportedConstruct {
                message: "declaration does not declare anything".to_string(),
                span: decl.span,
            });
        };
        let ty = self.registry.strip_typedefs(ty);

        let kind = if spec.storage == Some(StorageClass::Typedef) {
            DeclKind::Typedef
        } else if matches!(self.registry.kind(ty.ty), TypeKind::Function { .. }) {
            DeclKind::Function
        } else {
            DeclKind::Variable
        };

        match kind {
            DeclKind::Function => {
                if let TypeKind::Function { return_type, .. } = self.registry.kind(ty.ty) {
                    let return_type = *return_type;
                    self.require_complete_later(return_type, name_span);
                }
            }
            DeclKind::Variable => self.check_object_type(ty, name, name_span)?,
            _ => {}
        }

        let symbol_kind = match kind {
            DeclKind::Typedef => SymbolKind::Typedef,
            DeclKind::Function => SymbolKind::Function,
            _ => SymbolKind::Variable,
        };
        let symbol_ty = if kind == DeclKind::Typedef {
            QualType::unqualified(self.registry.typedef_alias(name, ty))
        } else {
            ty
        };
        self.define_ordinary(
            Symbol {
                name,
                kind: symbol_kind,
                ty: symbol_ty,
                storage: spec.storage,
                scope: self.symbols.current_scope(),
                span: name_span,
            },
            ty,
        )?;

        trace!("resolve_declaration: {name} : {}", self.registry.display_name(ty.ty));
        self.decls.push(ResolvedDecl {
            name: Some(name),
            kind,
            storage: spec.storage,
            ty,
            span: name_span,
        });
        Ok(())
    }

    /// Define an ordinary identifier. Redeclaring the same kind of entity with the
    /// same type is accepted; anything else conflicts.
    fn define_ordinary(&mut self, symbol: Symbol, resolved: QualType) -> Result<(), SemanticError> {
        let name = symbol.name;
        let second = symbol.span;
        let kind = symbol.kind;
        match self.symbols.define_ordinary(symbol) {
            Ok(_) => Ok(()),
            Err(SymbolTableError::Redefinition { existing, .. }) => {
                let previous = self.symbols.get(existing);
                let previous_ty = self.registry.strip_typedefs(previous.ty);
                let same_kind = previous.kind == kind && !matches!(kind, SymbolKind::EnumConstant { .. });
                if same_kind && previous_ty == resolved {
                    debug!("define_ordinary: compatible redeclaration of {name}");
                    return Ok(());
                }
                let detail = if same_kind {
                    format!(
                        "'{}' redeclared as '{}'",
                        self.display_qual(previous_ty),
                        self.display_qual(resolved)
                    )
                } else {
                    "redeclared as a different kind of symbol".to_string()
                };
                Err(SemanticError::Conflict {
                    name: name.to_string(),
                    detail,
                    first: previous.span,
                    second,
                })
            }
            Err(error @ SymbolTableError::Sealed) => Err(SemanticError::UnsupportedConstruct {
                message: error.to_string(),
                span: second,
            }),
        }
    }

    fn spec_type(&mut self, unit: &TranslationUnit, spec_ref: SpecRef) -> Result<QualType, SemanticError> {
        if let Some(&ty) = self.spec_cache.get(&spec_ref) {
            return Ok(ty);
        }
        let ty = self.resolve_specifiers(unit.specifiers(spec_ref))?;
        self.spec_cache.insert(spec_ref, ty);
        Ok(ty)
    }

    fn resolve_specifiers(&mut self, spec: &DeclSpecifiers) -> Result<QualType, SemanticError> {
        let base = match &spec.type_spec {
            TypeSpecifier::Builtin(kind) => QualType::unqualified(self.registry.primitive(*kind)),
            TypeSpecifier::TypedefName(name, span) => self.resolve_typedef_name(*name, *span)?,
            TypeSpecifier::Record(record) => QualType::unqualified(self.resolve_record_specifier(record)?),
            TypeSpecifier::Enum(enum_spec) => QualType::unqualified(self.resolve_enum_specifier(enum_spec)?),
        };
        Ok(base.with_qualifiers(spec.qualifiers))
    }

    fn resolve_typedef_name(&mut self, name: NameId, span: SourceSpan) -> Result<QualType, SemanticError> {
        if let Some(symbol_ref) = self.symbols.lookup_ordinary(name) {
            let symbol = self.symbols.get(symbol_ref);
            if symbol.kind == SymbolKind::Typedef {
                return Ok(self.registry.strip_typedefs(symbol.ty));
            }
        }
        match PrimitiveKind::from_builtin_name(name.as_str()) {
            Some(kind) => Ok(QualType::unqualified(self.registry.primitive(kind))),
            None => Err(SemanticError::UnknownTypeName {
                name: name.to_string(),
                span,
            }),
        }
    }

    /// Apply a declarator to `base`, outermost derivation first.
    /// Returns the derived type and the declared name, if any.
    fn apply_declarator(
        &mut self,
        base: QualType,
        declarator: &Declarator,
    ) -> Result<(QualType, Option<(NameId, SourceSpan)>), SemanticError> {
        match declarator {
            Declarator::Identifier(name, span) => Ok((base, Some((*name, *span)))),
            Declarator::Abstract => Ok((base, None)),
            Declarator::Pointer(qualifiers, inner) => {
                let pointer = self.registry.pointer_to(base);
                self.apply_declarator(QualType::new(pointer, *qualifiers), inner)
            }
            Declarator::Array(inner, size) => {
                let span = declarator_span(inner);
                let element = self.registry.strip_typedefs(base);
                match self.registry.kind(element.ty) {
                    TypeKind::Function { .. } => {
                        return Err(SemanticError::UnsupportedConstruct {
                            message: "array of functions is not allowed".to_string(),
                            span,
                        });
                    }
                    TypeKind::Array { len: None, .. } => {
                        return Err(SemanticError::UnsupportedConstruct {
                            message: "array has incomplete element type".to_string(),
                            span,
                        });
                    }
                    TypeKind::Primitive(PrimitiveKind::Void) => {
                        return Err(SemanticError::IncompleteType {
                            name: "void".to_string(),
                            span,
                        });
                    }
                    TypeKind::Record { .. } | TypeKind::Enum { .. } => self.require_complete_later(element, span),
                    _ => {}
                }
                let len = match size {
                    ArraySize::Unknown => None,
                    ArraySize::Expr(expr) => {
                        let value = self.eval(expr)?;
                        if value < 0 {
                            return Err(SemanticError::InvalidConstant {
                                message: format!("array size {value} is negative"),
                                span: expr.span,
                            });
                        }
                        Some(value as u64)
                    }
                };
                let array = self.registry.array_of(element, len);
                self.apply_declarator(QualType::unqualified(array), inner)
            }
            Declarator::Function {
                inner,
                params,
                is_variadic,
            } => {
                let span = declarator_span(inner);
                let return_type = self.registry.strip_typedefs(base);
                match self.registry.kind(return_type.ty) {
                    TypeKind::Function { .. } => {
                        return Err(SemanticError::UnsupportedConstruct {
                            message: "function cannot return a function".to_string(),
                            span,
                        });
                    }
                    TypeKind::Array { .. } => {
                        return Err(SemanticError::UnsupportedConstruct {
                            message: "function cannot return an array".to_string(),
                            span,
                        });
                    }
                    _ => {}
                }

                // each prototype opens its own scope
                self.symbols.push_scope();
                let parameters = self.resolve_parameters(params);
                self.symbols.pop_scope();
                let parameters = parameters?;

                let function = self.registry.function_type(return_type, parameters, *is_variadic);
                self.apply_declarator(QualType::unqualified(function), inner)
            }
        }
    }

    fn resolve_parameters(&mut self, params: &[ParamDecl]) -> Result<Vec<FunctionParameter>, SemanticError> {
        let mut parameters = Vec::with_capacity(params.len());
        for param in params {
            let base = self.resolve_specifiers(&param.spec)?;
            let (ty, name) = self.apply_declarator(base, &param.declarator)?;
            let ty = self.registry.decay(ty);

            match self.registry.kind(ty.ty) {
                TypeKind::Primitive(PrimitiveKind::Void) => {
                    return Err(SemanticError::UnsupportedConstruct {
                        message: "parameter has void type".to_string(),
                        span: param.span,
                    });
                }
                TypeKind::Record { .. } | TypeKind::Enum { .. } => self.require_complete_later(ty, param.span),
                _ => {}
            }

            if let Some((name, span)) = name {
                self.define_ordinary(
                    Symbol {
                        name,
                        kind: SymbolKind::Variable,
                        ty,
                        storage: None,
                        scope: self.symbols.current_scope(),
                        span,
                    },
                    ty,
                )?;
            }
            parameters.push(FunctionParameter {
                param_type: ty,
                name: name.map(|(name, _)| name),
            });
        }
        Ok(parameters)
    }

    /// Objects declared at file scope need a size
    fn check_object_type(&mut self, ty: QualType, name: NameId, span: SourceSpan) -> Result<(), SemanticError> {
        match self.registry.kind(ty.ty) {
            TypeKind::Primitive(PrimitiveKind::Void) => Err(SemanticError::IncompleteType {
                name: "void".to_string(),
                span,
            }),
            TypeKind::Array { len: None, .. } => Err(SemanticError::UnsupportedConstruct {
                message: format!("'{name}' has an array type of unknown length"),
                span,
            }),
            TypeKind::Record { .. } | TypeKind::Enum { .. } => {
                self.require_complete_later(ty, span);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn require_complete_later(&mut self, ty: QualType, span: SourceSpan) {
        let ty = self.registry.strip_typedefs(ty);
        let is_tag = matches!(self.registry.kind(ty.ty), TypeKind::Record { .. } | TypeKind::Enum { .. });
        if is_tag && !self.registry.is_complete(ty.ty) {
            self.pending_complete.push((ty.ty, span));
        }
    }

    fn eval(&self, expr: &ConstExpr) -> Result<i64, SemanticError> {
        let ctx = ConstEvalCtx {
            symbol_table: &self.symbols,
        };
        eval_const_expr(&ctx, expr)
    }

    fn display_qual(&self, ty: QualType) -> String {
        if ty.qualifiers.is_empty() {
            self.registry.display_name(ty.ty)
        } else {
            format!("{} {}", ty.qualifiers, self.registry.display_name(ty.ty))
        }
    }

    // ============================================================
    // Tags
    // ============================================================

    /// Find the tag entry a specifier refers to, declaring it when needed.
    /// A definition binds in the current scope; a reference looks outward first.
    fn bind_tag(
        &mut self,
        tag: NameId,
        is_anonymous: bool,
        is_definition: bool,
        span: SourceSpan,
        declare: impl FnOnce(&mut TypeRegistry) -> TypeRef,
        same_kind: impl Fn(&TypeKind) -> bool,
        keyword: &str,
    ) -> Result<TypeRef, SemanticError> {
        let existing = if is_definition {
            self.symbols.lookup_tag_in_current(tag)
        } else {
            self.symbols.lookup_tag(tag)
        };

        if let Some(existing) = existing {
            let symbol = self.symbols.get(existing);
            let ty = symbol.ty.ty;
            if !same_kind(self.registry.kind(ty)) {
                return Err(SemanticError::Conflict {
                    name: format!("{keyword} {tag}"),
                    detail: format!("previously declared as '{}'", self.registry.display_name(ty)),
                    first: symbol.span,
                    second: span,
                });
            }
            if is_definition && self.registry.is_complete(ty) {
                return Err(SemanticError::Conflict {
                    name: format!("{keyword} {tag}"),
                    detail: "redefinition with a second body".to_string(),
                    first: symbol.span,
                    second: span,
                });
            }
            if is_definition {
                // the definition's position is the one later conflicts cite
                self.symbols.get_mut(existing).span = span;
            }
            return Ok(ty);
        }

        let ty = declare(&mut self.registry);
        let symbol = Symbol {
            name: tag,
            kind: SymbolKind::Tag,
            ty: QualType::unqualified(ty),
            storage: None,
            scope: self.symbols.current_scope(),
            span,
        };
        // forward references from prototypes name the file-scope tag
        let defined = if is_definition || is_anonymous {
            self.symbols.define_tag(symbol)
        } else {
            self.symbols.define_global_tag(symbol)
        };
        defined.map_err(|error| SemanticError::UnsupportedConstruct {
            message: error.to_string(),
            span,
        })?;
        Ok(ty)
    }

    fn resolve_record_specifier(&mut self, record: &RecordSpecifier) -> Result<TypeRef, SemanticError> {
        let is_union = record.is_union;
        let (tag, is_anonymous, span) = (record.tag, record.is_anonymous, record.span);
        let ty = self.bind_tag(
            tag,
            is_anonymous,
            record.body.is_some(),
            span,
            |registry| registry.declare_record(tag, is_anonymous, is_union, span),
            |kind| matches!(kind, TypeKind::Record { is_union: u, .. } if *u == is_union),
            record.keyword(),
        )?;

        if let Some(body) = &record.body {
            self.in_progress.push(ty);
            let members = self.resolve_members(ty, record, body);
            self.in_progress.pop();
            let members = members?;
            debug!(
                "resolve_record_specifier: completed {} with {} members",
                self.registry.display_name(ty),
                members.len()
            );
            self.registry.complete_record(ty, members, record.packed, span);
        }
        Ok(ty)
    }

    fn resolve_members(
        &mut self,
        record: TypeRef,
        spec: &RecordSpecifier,
        body: &[MemberDecl],
    ) -> Result<Vec<StructMember>, SemanticError> {
        let mut members = Vec::new();
        let mut seen: HashMap<NameId, SourceSpan> = HashMap::new();
        let total = body.iter().map(|decl| decl.declarators.len().max(1)).sum::<usize>();
        let mut position = 0usize;

        for member_decl in body {
            let base = self.resolve_specifiers(&member_decl.spec)?;

            if member_decl.declarators.is_empty() {
                position += 1;
                // an anonymous struct/union member; a named tag here only declares the tag
                if let TypeSpecifier::Record(inner) = &member_decl.spec.type_spec
                    && inner.is_anonymous
                    && inner.body.is_some()
                {
                    for (name, span) in self.member_names(base.ty) {
                        check_duplicate(&mut seen, name, span)?;
                    }
                    members.push(StructMember {
                        name: None,
                        member_type: base,
                        bit_width: None,
                        span: member_decl.span,
                    });
                }
                continue;
            }

            for member in &member_decl.declarators {
                position += 1;
                let is_last = position == total;
                let (ty, name) = match &member.declarator {
                    Some(declarator) => self.apply_declarator(base, declarator)?,
                    None => (base, None),
                };
                let ty = self.registry.strip_typedefs(ty);
                let span = name.map_or(member.span, |(_, span)| span);
                let field = name.map_or_else(|| "<unnamed>".to_string(), |(name, _)| name.to_string());

                self.check_member_type(record, spec, ty, &field, span, is_last)?;

                let bit_width = match &member.bit_width {
                    Some(expr) => Some(self.bit_width(ty, name.is_some(), &field, expr)?),
                    None => None,
                };
                if let Some((name, span)) = name {
                    check_duplicate(&mut seen, name, span)?;
                }
                members.push(StructMember {
                    name: name.map(|(name, _)| name),
                    member_type: ty,
                    bit_width,
                    span,
                });
            }
        }
        Ok(members)
    }

    fn check_member_type(
        &mut self,
        record: TypeRef,
        spec: &RecordSpecifier,
        ty: QualType,
        field: &str,
        span: SourceSpan,
        is_last: bool,
    ) -> Result<(), SemanticError> {
        let mut element = ty;
        if let TypeKind::Array { element: inner, len } = self.registry.kind(ty.ty).clone() {
            if len.is_none() && (!is_last || spec.is_union) {
                return Err(SemanticError::UnsupportedConstruct {
                    message: format!("flexible array member '{field}' must be the last field of a struct"),
                    span,
                });
            }
            element = self.registry.strip_typedefs(inner);
        }

        match self.registry.kind(element.ty) {
            TypeKind::Function { .. } => Err(SemanticError::UnsupportedConstruct {
                message: format!("field '{field}' declared as a function"),
                span,
            }),
            TypeKind::Primitive(PrimitiveKind::Void) => Err(SemanticError::IncompleteType {
                name: "void".to_string(),
                span,
            }),
            TypeKind::Record { .. } => {
                if self.in_progress.contains(&element.ty) || self.contains_by_value(element.ty, record) {
                    return Err(SemanticError::SelfReference {
                        record: self.registry.display_name(record),
                        field: field.to_string(),
                        span,
                    });
                }
                self.require_complete_later(element, span);
                Ok(())
            }
            TypeKind::Enum { .. } => {
                self.require_complete_later(element, span);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Whether `ty` holds a `target` by value, directly or through nested members
    fn contains_by_value(&self, ty: TypeRef, target: TypeRef) -> bool {
        if ty == target {
            return true;
        }
        match self.registry.kind(ty) {
            TypeKind::Array { element, .. } => self.contains_by_value(element.ty, target),
            TypeKind::Record { members, .. } => members
                .iter()
                .any(|member| self.contains_by_value(member.member_type.ty, target)),
            _ => false,
        }
    }

    /// Named members of a record, looking through anonymous members
    fn member_names(&self, record: TypeRef) -> Vec<(NameId, SourceSpan)> {
        let TypeKind::Record { members, .. } = self.registry.kind(record) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for member in members {
            match member.name {
                Some(name) => names.push((name, member.span)),
                None if member.bit_width.is_none() => names.extend(self.member_names(member.member_type.ty)),
                None => {}
            }
        }
        names
    }

    fn bit_width(&self, ty: QualType, is_named: bool, field: &str, expr: &ConstExpr) -> Result<u32, SemanticError> {
        let invalid = |message: String| SemanticError::InvalidBitField {
            name: field.to_string(),
            message,
            span: expr.span,
        };
        let integral = match self.registry.kind(ty.ty) {
            TypeKind::Primitive(kind) => kind.is_integer(),
            TypeKind::Enum { .. } => true,
            _ => false,
        };
        if !integral {
            return Err(invalid(format!(
                "bit-field has non-integral type '{}'",
                self.display_qual(ty)
            )));
        }
        let width = self.eval(expr)?;
        if width < 0 {
            return Err(invalid(format!("negative width {width}")));
        }
        if width == 0 && is_named {
            return Err(invalid("named bit-field has zero width".to_string()));
        }
        u32::try_from(width)
            .ok()
            .filter(|&w| w <= 64)
            .ok_or_else(|| invalid(format!("width {width} exceeds the width of its type")))
    }

    fn resolve_enum_specifier(&mut self, enum_spec: &EnumSpecifier) -> Result<TypeRef, SemanticError> {
        let (tag, is_anonymous, span) = (enum_spec.tag, enum_spec.is_anonymous, enum_spec.span);
        let ty = self.bind_tag(
            tag,
            is_anonymous,
            enum_spec.body.is_some(),
            span,
            |registry| registry.declare_enum(tag, is_anonymous, span),
            |kind| matches!(kind, TypeKind::Enum { .. }),
            "enum",
        )?;

        let Some(body) = &enum_spec.body else {
            return Ok(ty);
        };

        let mut constants = Vec::with_capacity(body.len());
        let mut next: i128 = 0;
        for enumerator in body {
            let value = match &enumerator.value {
                Some(expr) => i128::from(self.eval(expr)?),
                None => next,
            };
            let value = i64::try_from(value).map_err(|_| SemanticError::EnumValueOutOfRange {
                name: enumerator.name.to_string(),
                value,
                underlying: PrimitiveKind::LongLong.c_name().to_string(),
                span: enumerator.span,
            })?;

            // visible to the enumerators that follow
            self.define_ordinary(
                Symbol {
                    name: enumerator.name,
                    kind: SymbolKind::EnumConstant { value },
                    ty: QualType::unqualified(ty),
                    storage: None,
                    scope: self.symbols.current_scope(),
                    span: enumerator.span,
                },
                QualType::unqualified(ty),
            )?;
            self.enum_constants.push((enumerator.name, value));
            constants.push(EnumConstant {
                name: enumerator.name,
                value,
                span: enumerator.span,
            });
            next = i128::from(value) + 1;
        }

        let underlying = enum_underlying(&self.abi, enum_spec, &constants)?;
        self.registry.complete_enum(ty, underlying, constants, span);
        Ok(ty)
    }
}

/// Pick the underlying type of an enum from its values
fn enum_underlying(
    abi: &AbiConfig,
    enum_spec: &EnumSpecifier,
    constants: &[EnumConstant],
) -> Result<PrimitiveKind, SemanticError> {
    let out_of_range = |constant: &EnumConstant, kind: PrimitiveKind| SemanticError::EnumValueOutOfRange {
        name: constant.name.to_string(),
        value: i128::from(constant.value),
        underlying: kind.c_name().to_string(),
        span: constant.span,
    };

    if let Some(kind) = enum_spec.underlying {
        let (min, max) = abi.value_range(kind).unwrap_or((0, -1));
        if let Some(constant) = constants
            .iter()
            .find(|c| !(min..=max).contains(&i128::from(c.value)))
        {
            return Err(out_of_range(constant, kind));
        }
        return Ok(kind);
    }

    let min = constants.iter().map(|c| c.value).min().unwrap_or(0);
    let max = constants.iter().map(|c| c.value).max().unwrap_or(0);
    let fits = |kind: PrimitiveKind| {
        abi.value_range(kind)
            .is_some_and(|(lo, hi)| lo <= i128::from(min) && i128::from(max) <= hi)
    };

    let candidates: &[PrimitiveKind] = if enum_spec.packed {
        if min >= 0 {
            &[
                PrimitiveKind::UChar,
                PrimitiveKind::UShort,
                PrimitiveKind::UInt,
                PrimitiveKind::ULongLong,
            ]
        } else {
            &[
                PrimitiveKind::SChar,
                PrimitiveKind::Short,
                PrimitiveKind::Int,
                PrimitiveKind::LongLong,
            ]
        }
    } else {
        &[PrimitiveKind::Int, PrimitiveKind::UInt]
    };

    match candidates.iter().copied().find(|&kind| fits(kind)) {
        Some(kind) => Ok(kind),
        None => {
            let offender = constants
                .iter()
                .find(|c| !(i64::from(i32::MIN)..=i64::from(i32::MAX)).contains(&c.value))
                .or(constants.first());
            match offender {
                Some(constant) => Err(out_of_range(constant, PrimitiveKind::Int)),
                None => Ok(PrimitiveKind::Int),
            }
        }
    }
}

fn check_duplicate(
    seen: &mut HashMap<NameId, SourceSpan>,
    name: NameId,
    span: SourceSpan,
) -> Result<(), SemanticError> {
    if let Some(&first) = seen.get(&name) {
        return Err(SemanticError::DuplicateMember {
            name: name.to_string(),
            first,
            second: span,
        });
    }
    seen.insert(name, span);
    Ok(())
}

/// Position of the declared name, or nothing for abstract declarators
fn declarator_span(declarator: &Declarator) -> SourceSpan {
    declarator.name().map_or(SourceSpan::empty(), |(_, span)| span)
}

