//! Shared helpers for the integration tests

#![allow(dead_code)]

use cffi_decl::layout::{RecordLayout, TypeLayout};
use cffi_decl::{AbiConfig, Compiler, DescriptorCache, Unit, UnitError};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Process `source` with a cache private to the call
pub fn process(source: &str, abi: AbiConfig) -> Result<Unit, UnitError> {
    init_logging();
    let cache = DescriptorCache::new();
    Compiler::with_cache(abi, &cache).process_unit(source)
}

pub fn process_ok(source: &str) -> Unit {
    process(source, AbiConfig::lp64_sysv()).unwrap_or_else(|error| panic!("unit failed: {error}"))
}

pub fn record_layout(layout: &TypeLayout) -> &RecordLayout {
    layout
        .as_record()
        .unwrap_or_else(|| panic!("expected a record layout, got {:?}", layout.kind))
}

/// Check that a struct's fields and padding add up to its size, recursing into
/// nested records
pub fn assert_layout_consistent(layout: &TypeLayout) {
    assert_eq!(layout.size % layout.align, 0, "size {} not a multiple of {}", layout.size, layout.align);
    let Some(record) = layout.as_record() else {
        return;
    };
    if !record.is_union {
        let total: u64 = record
            .fields
            .iter()
            .map(|field| field.padding_before + field.size)
            .sum::<u64>()
            + record.trailing_padding;
        assert_eq!(total, layout.size, "{record:?}");
    }
    for field in &record.fields {
        if field.bit.is_none() {
            assert_layout_consistent(&field.layout);
        }
    }
}
