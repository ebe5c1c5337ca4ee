//! Immutable type descriptors and the process-wide cache that deduplicates them.
//!
//! A [`Descriptor`] is keyed by the canonical text of its declaration together with the
//! [`AbiConfig`] it was laid out for. Once published a descriptor is never mutated;
//! readers share it through `Arc`.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::trace;
use serde::Serialize;

use crate::abi::AbiConfig;
use crate::ast::StorageClass;
use crate::layout::{CallSignature, TypeLayout};
use crate::semantic::TypeQualifiers;
use crate::type_node::{PrimitiveKind, TypeNode};

pub use crate::semantic::type_resolver::DeclKind;

/// Identity of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DescriptorKey {
    pub canonical: String,
    pub abi: AbiConfig,
}

impl DescriptorKey {
    pub fn new(canonical: impl Into<String>, abi: AbiConfig) -> Self {
        DescriptorKey {
            canonical: canonical.into(),
            abi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    pub key: DescriptorKey,
    /// Declared name; the tag for tag declarations, `None` for type names
    pub name: Option<String>,
    pub kind: DeclKind,
    pub storage: Option<StorageClass>,
    pub ty: TypeNode,
    /// Qualifiers of the declared object itself, e.g. the `const` of `char *const p`
    pub qualifiers: TypeQualifiers,
    /// Present when the type has storage
    pub layout: Option<TypeLayout>,
    /// Present for functions and pointers to functions
    pub call: Option<CallSignature>,
}

impl Descriptor {
    pub fn canonical(&self) -> &str {
        &self.key.canonical
    }

    pub fn abi(&self) -> &AbiConfig {
        &self.key.abi
    }

    /// Whether the value, or a function's return value, is a `char *`
    pub fn is_cstring(&self) -> bool {
        let ty = match &self.ty {
            TypeNode::Function { ret, .. } => ret.as_ref(),
            ty => ty,
        };
        matches!(ty, TypeNode::Pointer { pointee, .. } if **pointee == TypeNode::Primitive(PrimitiveKind::Char))
    }

    /// Whether a struct or union appears anywhere in the type
    pub fn contains_non_scalar(&self) -> bool {
        self.ty.contains_record()
    }
}

/// Concurrent descriptor cache.
///
/// Inserts for one key are serialized by the map's shard lock, so at most one
/// descriptor is ever published per key. Entries are never evicted.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: DashMap<DescriptorKey, Arc<Descriptor>>,
}

static GLOBAL_CACHE: OnceLock<DescriptorCache> = OnceLock::new();

impl DescriptorCache {
    pub fn new() -> Self {
        DescriptorCache::default()
    }

    /// The process-wide cache
    pub fn global() -> &'static DescriptorCache {
        GLOBAL_CACHE.get_or_init(DescriptorCache::new)
    }

    pub fn get(&self, key: &DescriptorKey) -> Option<Arc<Descriptor>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Publish `descriptor` unless its key is already present.
    /// Returns the instance that is in the cache afterwards.
    pub fn publish(&self, descriptor: Arc<Descriptor>) -> Arc<Descriptor> {
        let entry = self
            .entries
            .entry(descriptor.key.clone())
            .or_insert_with(|| {
                trace!("publishing descriptor '{}'", descriptor.key.canonical);
                Arc::clone(&descriptor)
            });
        Arc::clone(entry.value())
    }

    /// Look up `key`, building and publishing the descriptor on a miss.
    /// `build` runs at most once per key across all threads.
    pub fn get_or_emit(&self, key: DescriptorKey, build: impl FnOnce(&DescriptorKey) -> Descriptor) -> Arc<Descriptor> {
        if let Some(found) = self.get(&key) {
            return found;
        }
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                trace!("emitting descriptor '{}'", entry.key().canonical);
                let descriptor = Arc::new(build(entry.key()));
                entry.insert(Arc::clone(&descriptor));
                descriptor
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
