//! C declaration parser and FFI type descriptor builder.
//!
//! Declaration text (`cdef` snippets, headers) is lexed, parsed, resolved against a
//! scoped Type Table, laid out for a target ABI and turned into immutable, cached
//! [`descriptor::Descriptor`]s that a stub generator consumes.

pub mod abi;
pub mod ast;
pub mod compiler;
pub mod descriptor;
pub mod diagnostic;
/// Contains the command-line driver.
pub mod driver;
pub mod ffi_scope;
pub mod layout;
pub mod lexer;
pub mod parser;
/// Contains the type resolver.
pub mod semantic;
pub mod source;
pub mod type_node;

pub use abi::AbiConfig;
pub use compiler::{Compiler, Unit};
pub use descriptor::{DeclKind, Descriptor, DescriptorCache, DescriptorKey};
pub use diagnostic::{ErrorKind, FfiError, UnitError};
pub use type_node::TypeNode;
