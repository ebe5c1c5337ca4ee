//! Symbol table management and scope handling.
//!
//! The Type Table: an ordered chain of scopes, each holding the ordinary and tag
//! namespaces as insertion-ordered maps. The resolver that owns a table is the only
//! writer; once resolution finishes the table is sealed and becomes read-only.

use std::num::NonZeroU32;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::ast::{NameId, StorageClass};
use crate::source::SourceSpan;

use super::QualType;

/// Reference into [`SymbolTable`] entries
pub type SymbolRef = NonZeroU32;

/// Defines the kind of symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Typedef,
    Variable,
    Function,
    EnumConstant { value: i64 },
    /// struct/union/enum tag
    Tag,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: NameId,
    pub kind: SymbolKind,
    pub ty: QualType,
    pub storage: Option<StorageClass>,
    pub scope: ScopeId,
    pub span: SourceSpan,
}

/// Symbol table error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolTableError {
    #[error("redefinition of '{name}'")]
    Redefinition { name: NameId, existing: SymbolRef },
    #[error("symbol table is sealed")]
    Sealed,
}

/// Scope ID for efficient scope references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(NonZeroU32);

impl ScopeId {
    pub const GLOBAL: Self = Self(NonZeroU32::MIN);

    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Symbol namespaces in C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Ordinary, // Variables, functions, typedefs, enum constants
    Tag,      // Struct, union, and enum tags
}

/// Scope information
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub ordinary: IndexMap<NameId, SymbolRef>,
    pub tags: IndexMap<NameId, SymbolRef>,
    pub level: u32,
}

impl Scope {
    fn namespace(&self, ns: Namespace) -> &IndexMap<NameId, SymbolRef> {
        match ns {
            Namespace::Ordinary => &self.ordinary,
            Namespace::Tag => &self.tags,
        }
    }

    fn namespace_mut(&mut self, ns: Namespace) -> &mut IndexMap<NameId, SymbolRef> {
        match ns {
            Namespace::Ordinary => &mut self.ordinary,
            Namespace::Tag => &mut self.tags,
        }
    }
}

/// Symbol table using flattened storage
#[derive(Debug)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
    scopes: Vec<Scope>,
    current_scope_id: ScopeId,
    sealed: bool,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::new(),
            scopes: vec![Scope {
                parent: None,
                ordinary: IndexMap::new(),
                tags: IndexMap::new(),
                level: 0,
            }],
            current_scope_id: ScopeId::GLOBAL,
            sealed: false,
        }
    }

    pub fn push_scope(&mut self) -> ScopeId {
        let level = self.get_scope(self.current_scope_id).level + 1;
        self.scopes.push(Scope {
            parent: Some(self.current_scope_id),
            ordinary: IndexMap::new(),
            tags: IndexMap::new(),
            level,
        });
        let new_scope_id = ScopeId(NonZeroU32::MIN.saturating_add(self.scopes.len() as u32 - 1));
        self.current_scope_id = new_scope_id;
        debug!("SymbolTable: pushed scope {} (level {level})", new_scope_id.get());
        new_scope_id
    }

    pub fn pop_scope(&mut self) -> Option<ScopeId> {
        let parent = self.get_scope(self.current_scope_id).parent?;
        debug!(
            "SymbolTable: popped scope {}, current is now {}",
            self.current_scope_id.get(),
            parent.get()
        );
        self.current_scope_id = parent;
        Some(parent)
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope_id
    }

    pub fn get_scope(&self, scope_id: ScopeId) -> &Scope {
        &self.scopes[scope_id.index()]
    }

    /// Make the table read-only. Further definitions fail with [`SymbolTableError::Sealed`].
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn define_ordinary(&mut self, symbol: Symbol) -> Result<SymbolRef, SymbolTableError> {
        self.define(symbol, Namespace::Ordinary)
    }

    pub fn define_tag(&mut self, symbol: Symbol) -> Result<SymbolRef, SymbolTableError> {
        self.define(symbol, Namespace::Tag)
    }

    /// Bind a tag in the global scope regardless of the current scope
    pub fn define_global_tag(&mut self, symbol: Symbol) -> Result<SymbolRef, SymbolTableError> {
        self.define_in(ScopeId::GLOBAL, symbol, Namespace::Tag)
    }

    fn define(&mut self, symbol: Symbol, ns: Namespace) -> Result<SymbolRef, SymbolTableError> {
        self.define_in(self.current_scope_id, symbol, ns)
    }

    /// Bind `symbol.name` in `scope_id`. An existing binding of the same name in
    /// the same scope and namespace is reported, never overwritten.
    fn define_in(&mut self, scope_id: ScopeId, mut symbol: Symbol, ns: Namespace) -> Result<SymbolRef, SymbolTableError> {
        if self.sealed {
            return Err(SymbolTableError::Sealed);
        }
        let name = symbol.name;
        if let Some(&existing) = self.get_scope(scope_id).namespace(ns).get(&name) {
            return Err(SymbolTableError::Redefinition { name, existing });
        }

        symbol.scope = scope_id;
        let entry_ref = NonZeroU32::MIN.saturating_add(self.entries.len() as u32);
        self.entries.push(symbol);
        self.scopes[scope_id.index()].namespace_mut(ns).insert(name, entry_ref);
        debug!("SymbolTable: defined {name} in scope {} ({ns:?})", scope_id.get());
        Ok(entry_ref)
    }

    pub fn lookup_ordinary(&self, name: NameId) -> Option<SymbolRef> {
        self.lookup_from(name, self.current_scope_id, Namespace::Ordinary)
    }

    pub fn lookup_tag(&self, name: NameId) -> Option<SymbolRef> {
        self.lookup_from(name, self.current_scope_id, Namespace::Tag)
    }

    pub fn lookup_ordinary_in_current(&self, name: NameId) -> Option<SymbolRef> {
        self.get_scope(self.current_scope_id).ordinary.get(&name).copied()
    }

    pub fn lookup_tag_in_current(&self, name: NameId) -> Option<SymbolRef> {
        self.get_scope(self.current_scope_id).tags.get(&name).copied()
    }

    /// Walk outward from `start_scope` to the global scope
    pub fn lookup_from(&self, name: NameId, start_scope: ScopeId, ns: Namespace) -> Option<SymbolRef> {
        let mut scope_id = start_scope;
        loop {
            let scope = self.get_scope(scope_id);
            if let Some(&entry_ref) = scope.namespace(ns).get(&name) {
                return Some(entry_ref);
            }
            scope_id = scope.parent?;
        }
    }

    pub fn get(&self, symbol: SymbolRef) -> &Symbol {
        &self.entries[(symbol.get() - 1) as usize]
    }

    pub(crate) fn get_mut(&mut self, symbol: SymbolRef) -> &mut Symbol {
        &mut self.entries[(symbol.get() - 1) as usize]
    }

    /// Symbols of one namespace of a scope, in insertion order
    pub fn iter_scope(&self, scope_id: ScopeId, ns: Namespace) -> impl Iterator<Item = &Symbol> + '_ {
        self.get_scope(scope_id).namespace(ns).values().map(|&r| self.get(r))
    }
}
