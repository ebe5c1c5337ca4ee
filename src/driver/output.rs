//! Output formatting module
//!
//! Renders descriptors and scopes as the plain-text report the CLI prints.

use std::fmt::Write;

use itertools::Itertools;

use crate::descriptor::Descriptor;
use crate::ffi_scope::ScopeData;
use crate::layout::{ArgClass, FieldLayout, LayoutKind, TypeLayout};

/// Canonical text followed by indented layout and calling-convention lines
pub(crate) fn format_descriptor(descriptor: &Descriptor) -> String {
    let mut out = String::from(descriptor.canonical());
    if let Some(layout) = &descriptor.layout {
        let _ = write!(out, "\n  size {}, align {}", layout.size, layout.align);
        write_fields(&mut out, layout, 0, 2);
    }
    if let Some(call) = &descriptor.call {
        let params = call.params.iter().map(format_class).join(", ");
        let variadic = if call.is_variadic { ", ..." } else { "" };
        let _ = write!(
            out,
            "\n  call {:?}: ({params}{variadic}) -> {}",
            call.convention,
            format_class(&call.ret)
        );
    }
    out
}

fn write_fields(out: &mut String, layout: &TypeLayout, base: u64, indent: usize) {
    let LayoutKind::Record(record) = &layout.kind else {
        return;
    };
    for field in &record.fields {
        let offset = base + field.offset;
        let _ = write!(out, "\n{:indent$}{}", "", format_field(field, offset));
        // anonymous members are listed with their own fields
        if field.name.is_none() && field.bit.is_none() {
            write_fields(out, &field.layout, offset, indent + 2);
        }
    }
    if record.trailing_padding > 0 {
        let _ = write!(out, "\n{:indent$}padding {}", "", record.trailing_padding);
    }
}

fn format_field(field: &FieldLayout, offset: u64) -> String {
    let name = field.name.as_deref().unwrap_or("<anonymous>");
    match field.bit {
        Some(bit) => format!(
            "{name}: offset {offset}, bits {}..{} of {}",
            bit.bit_offset,
            bit.bit_offset + u64::from(bit.bit_width),
            bit.storage_size
        ),
        None => format!("{name}: offset {offset}, size {}", field.layout.size),
    }
}

fn format_class(class: &ArgClass) -> String {
    match class {
        ArgClass::Void => "void".to_string(),
        ArgClass::Integer { size } => format!("int{}", size * 8),
        ArgClass::Float { size } => format!("float{}", size * 8),
        ArgClass::Pointer => "ptr".to_string(),
        ArgClass::Aggregate {
            size,
            align,
            in_registers,
        } => {
            let passing = if *in_registers { "registers" } else { "memory" };
            format!("aggregate({size}, align {align}, {passing})")
        }
    }
}

/// One line per scope with its library and symbol slots
pub(crate) fn format_scope(scope: &ScopeData) -> String {
    let lib = match (&scope.lib, scope.shared_lib_id) {
        (Some(lib), Some(id)) => format!("shared lib #{id} {lib}"),
        _ => "static".to_string(),
    };
    let offset = scope
        .env_offset()
        .map_or_else(|| "-".to_string(), |offset| offset.to_string());
    format!(
        "scope {}: {lib}, {} variables, {} functions, {} types, env offset {offset}",
        scope.scope_name,
        scope.variables.len(),
        scope.functions.len(),
        scope.types.len()
    )
}
