//! FFI scopes.
//!
//! A scope groups the declarations of one header (`#define FFI_SCOPE "name"`): its
//! extern variables and functions, the types it declares and its enum constants.
//! [`FfiRoot`] registers scopes from any thread, deduplicates shared libraries and,
//! once every scope is known, binds symbols to consecutive environment slots.

use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use log::debug;
use parking_lot::Mutex;

use crate::compiler::Unit;
use crate::descriptor::{DeclKind, Descriptor};

/// An extern variable or function of a scope
#[derive(Debug, Clone)]
pub struct FfiSymbol {
    pub descriptor: Arc<Descriptor>,
    /// Slot in the runtime symbol environment, set by [`FfiRoot::bind_symbols`]
    pub env_index: Option<usize>,
}

impl FfiSymbol {
    fn new(descriptor: Arc<Descriptor>) -> Self {
        FfiSymbol {
            descriptor,
            env_index: None,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ScopeData {
    pub scope_name: String,
    /// Value of `FFI_LIB`; symbols come from a static library when absent
    pub lib: Option<String>,
    /// Set on registration when `lib` is present
    pub shared_lib_id: Option<usize>,
    /// Sorted by name
    pub variables: Vec<FfiSymbol>,
    /// Sorted by name
    pub functions: Vec<FfiSymbol>,
    /// Typedefs and tag declarations, in declaration order
    pub types: Vec<Arc<Descriptor>>,
    pub enum_constants: IndexMap<String, i64>,
}

impl ScopeData {
    pub fn from_unit(scope_name: impl Into<String>, unit: &Unit) -> Self {
        let mut variables = Vec::new();
        let mut functions = Vec::new();
        let mut types = Vec::new();
        for descriptor in &unit.descriptors {
            match descriptor.kind {
                DeclKind::Variable => variables.push(FfiSymbol::new(Arc::clone(descriptor))),
                DeclKind::Function => functions.push(FfiSymbol::new(Arc::clone(descriptor))),
                DeclKind::Typedef | DeclKind::Tag => types.push(Arc::clone(descriptor)),
                DeclKind::TypeName => {}
            }
        }
        variables.sort_by(|a, b| a.name().cmp(b.name()));
        functions.sort_by(|a, b| a.name().cmp(b.name()));
        // a redeclaration keeps the first entry
        variables.dedup_by(|a, b| a.name() == b.name());
        functions.dedup_by(|a, b| a.name() == b.name());

        ScopeData {
            scope_name: scope_name.into(),
            lib: unit.lib.clone(),
            shared_lib_id: None,
            variables,
            functions,
            types,
            enum_constants: unit.enum_constants.iter().cloned().collect(),
        }
    }

    pub fn is_shared_lib(&self) -> bool {
        self.shared_lib_id.is_some()
    }

    /// First environment slot of this scope; variables come before functions.
    /// `None` before binding or for a scope without symbols.
    pub fn env_offset(&self) -> Option<usize> {
        self.variables
            .first()
            .or_else(|| self.functions.first())
            .and_then(|symbol| symbol.env_index)
    }

    pub fn find_variable(&self, name: &str) -> Option<&FfiSymbol> {
        find_symbol(&self.variables, name)
    }

    pub fn find_function(&self, name: &str) -> Option<&FfiSymbol> {
        find_symbol(&self.functions, name)
    }

    pub fn find_type(&self, name: &str) -> Option<&Arc<Descriptor>> {
        self.types
            .iter()
            .find(|descriptor| descriptor.name.as_deref() == Some(name))
    }
}

fn find_symbol<'a>(sorted: &'a [FfiSymbol], name: &str) -> Option<&'a FfiSymbol> {
    sorted
        .binary_search_by(|symbol| symbol.name().cmp(name))
        .ok()
        .map(|index| &sorted[index])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedLib {
    pub id: usize,
    pub path: String,
}

#[derive(Debug, Default)]
struct RootState {
    shared_libs: Vec<SharedLib>,
    scopes: HashMap<String, ScopeData>,
    dynamic_symbols: usize,
}

impl RootState {
    fn shared_lib_id(&mut self, path: &str) -> usize {
        if let Some(lib) = self.shared_libs.iter().find(|lib| lib.path == path) {
            return lib.id;
        }
        let id = self.shared_libs.len();
        self.shared_libs.push(SharedLib {
            id,
            path: path.to_string(),
        });
        id
    }
}

/// Registry of all FFI scopes of a program
#[derive(Debug, Default)]
pub struct FfiRoot {
    state: Mutex<RootState>,
}

impl FfiRoot {
    pub fn new() -> Self {
        FfiRoot::default()
    }

    /// Register a scope under `scope_name`. Returns false if the name is taken.
    pub fn register_scope(&self, scope_name: &str, mut data: ScopeData) -> bool {
        let mut state = self.state.lock();
        if state.scopes.contains_key(scope_name) {
            debug!("register_scope: '{scope_name}' is already registered");
            return false;
        }
        if let Some(lib) = &data.lib {
            data.shared_lib_id = Some(state.shared_lib_id(lib));
        }
        data.scope_name = scope_name.to_string();
        state.scopes.insert(scope_name.to_string(), data);
        true
    }

    pub fn find_scope(&self, scope_name: &str) -> Option<ScopeData> {
        self.state.lock().scopes.get(scope_name).cloned()
    }

    /// All scopes, sorted by name
    pub fn scopes(&self) -> Vec<ScopeData> {
        let state = self.state.lock();
        let mut scopes: Vec<_> = state.scopes.values().cloned().collect();
        scopes.sort_by(|a, b| a.scope_name.cmp(&b.scope_name));
        scopes
    }

    /// Id of the shared library at `path`, allocating one on first use
    pub fn shared_lib_id(&self, path: &str) -> usize {
        self.state.lock().shared_lib_id(path)
    }

    pub fn shared_libs(&self) -> Vec<SharedLib> {
        self.state.lock().shared_libs.clone()
    }

    /// Assign consecutive environment slots: scope by scope in name order, the
    /// variables of a scope before its functions
    pub fn bind_symbols(&self) {
        let mut state = self.state.lock();
        let mut names: Vec<_> = state.scopes.keys().cloned().collect();
        names.sort();

        let mut index = 0;
        for name in &names {
            let Some(scope) = state.scopes.get_mut(name) else {
                continue;
            };
            for symbol in scope.variables.iter_mut().chain(scope.functions.iter_mut()) {
                symbol.env_index = Some(index);
                index += 1;
            }
        }
        state.dynamic_symbols = index;
        debug!("bind_symbols: {index} symbols in {} scopes", names.len());
    }

    pub fn dynamic_symbol_count(&self) -> usize {
        self.state.lock().dynamic_symbols
    }
}
