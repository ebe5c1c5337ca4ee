//! ABI layout calculation.
//!
//! Computes size, alignment, field offsets and bit-field placement of exported
//! [`TypeNode`]s under one [`AbiConfig`], and classifies function signatures for the
//! configured calling convention.

use std::sync::Arc;

use hashbrown::HashMap;
use log::trace;
use serde::Serialize;
use thiserror::Error;

use crate::abi::{AbiConfig, CallingConvention, Packing};
use crate::diagnostic::ErrorKind;
use crate::type_node::{Field, PrimitiveKind, RecordKind, RecordType, TypeNode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("layout conflict: {message}")]
    Conflict { message: String },
    #[error("{message}")]
    Unsupported { message: String },
}

impl LayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::Conflict { .. } => ErrorKind::LayoutConflict,
            LayoutError::Unsupported { .. } => ErrorKind::UnsupportedConstruct,
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        LayoutError::Conflict {
            message: message.into(),
        }
    }

    fn unsupported(message: impl Into<String>) -> Self {
        LayoutError::Unsupported {
            message: message.into(),
        }
    }
}

/// Size, alignment and structure of a type, all in bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeLayout {
    pub size: u64,
    pub align: u64,
    pub kind: LayoutKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LayoutKind {
    Scalar,
    Array { element: Box<TypeLayout>, len: u64 },
    Record(RecordLayout),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordLayout {
    pub is_union: bool,
    pub fields: Vec<FieldLayout>,
    pub trailing_padding: u64,
}

/// Placement of one member.
///
/// For structs, `padding_before + size` summed over all fields plus
/// `trailing_padding` is the record size. `size` is the number of bytes the field adds,
/// so bit-fields sharing a storage unit contribute only the bytes they open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: Option<String>,
    pub offset: u64,
    pub size: u64,
    pub padding_before: u64,
    pub bit: Option<BitPlacement>,
    pub layout: TypeLayout,
}

/// Bit-field placement within the storage unit that starts at the field's `offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitPlacement {
    pub bit_offset: u64,
    pub bit_width: u32,
    pub storage_size: u64,
}

impl TypeLayout {
    fn scalar(size: u64, align: u64) -> Self {
        TypeLayout {
            size,
            align,
            kind: LayoutKind::Scalar,
        }
    }

    pub fn as_record(&self) -> Option<&RecordLayout> {
        match &self.kind {
            LayoutKind::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl RecordLayout {
    /// Find a named field, looking through anonymous members.
    /// Returns the field and its byte offset from the start of this record.
    pub fn field(&self, name: &str) -> Option<(u64, &FieldLayout)> {
        for field in &self.fields {
            match (&field.name, field.layout.as_record()) {
                (Some(n), _) if n == name => return Some((field.offset, field)),
                (None, Some(inner)) => {
                    if let Some((offset, found)) = inner.field(name) {
                        return Some((field.offset + offset, found));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Argument or return value class for the calling convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArgClass {
    Void,
    Integer { size: u64 },
    Float { size: u64 },
    Pointer,
    Aggregate { size: u64, align: u64, in_registers: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSignature {
    pub convention: CallingConvention,
    pub ret: ArgClass,
    pub params: Vec<ArgClass>,
    pub is_variadic: bool,
}

fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align.max(1)) * align.max(1)
}

pub struct LayoutCalculator<'a> {
    abi: &'a AbiConfig,
    // keyed by Arc address; the Arc is kept so the address stays valid
    records: HashMap<usize, (Arc<RecordType>, TypeLayout)>,
}

impl<'a> LayoutCalculator<'a> {
    pub fn new(abi: &'a AbiConfig) -> Self {
        LayoutCalculator {
            abi,
            records: HashMap::new(),
        }
    }

    pub fn abi(&self) -> &AbiConfig {
        self.abi
    }

    pub fn layout_of(&mut self, ty: &TypeNode) -> Result<TypeLayout, LayoutError> {
        match ty {
            TypeNode::Primitive(PrimitiveKind::Void) => Err(LayoutError::unsupported("'void' has no storage")),
            TypeNode::Primitive(kind) => {
                let (size, align) = self.abi.size_align(*kind);
                Ok(TypeLayout::scalar(size, align))
            }
            TypeNode::Pointer { .. } => Ok(TypeLayout::scalar(self.abi.pointer_width, self.abi.pointer_width)),
            TypeNode::Enum(e) => {
                let (size, align) = self.abi.size_align(e.underlying);
                Ok(TypeLayout::scalar(size, align))
            }
            TypeNode::Array { len: None, .. } => Err(LayoutError::unsupported("array of unknown length has no storage")),
            TypeNode::Array {
                element, len: Some(len), ..
            } => {
                let element = self.layout_of(element)?;
                let size = element
                    .size
                    .checked_mul(*len)
                    .ok_or_else(|| LayoutError::conflict(format!("array of {len} elements is too large")))?;
                Ok(TypeLayout {
                    size,
                    align: element.align,
                    kind: LayoutKind::Array {
                        element: Box::new(element),
                        len: *len,
                    },
                })
            }
            TypeNode::Function { .. } => Err(LayoutError::unsupported("function types have no storage")),
            TypeNode::RecordRef { kind, tag } => Err(LayoutError::unsupported(format!(
                "'{} {tag}' is only known by name",
                kind.keyword()
            ))),
            TypeNode::Record(record) => self.record_layout(record),
        }
    }

    fn record_layout(&mut self, record: &Arc<RecordType>) -> Result<TypeLayout, LayoutError> {
        let key = Arc::as_ptr(record) as usize;
        if let Some((_, layout)) = self.records.get(&key) {
            return Ok(layout.clone());
        }

        let Some(fields) = record.fields.as_deref() else {
            return Err(LayoutError::unsupported(format!(
                "'{}' is opaque and has no layout",
                record.display_name()
            )));
        };

        trace!("computing layout of {}", record.display_name());
        let packed = record.packed || self.abi.packing == Packing::Packed;
        let layout = match record.kind {
            RecordKind::Union => self.union_layout(fields, packed)?,
            RecordKind::Struct => self.struct_layout(record, fields, packed)?,
        };
        self.records.insert(key, (Arc::clone(record), layout.clone()));
        Ok(layout)
    }

    fn effective_align(&self, natural: u64, packed: bool) -> u64 {
        if packed {
            return 1;
        }
        match self.abi.packing {
            Packing::Natural => natural,
            Packing::Packed => 1,
            Packing::Max(n) => natural.min(n.max(1)),
        }
    }

    fn struct_layout(
        &mut self,
        record: &RecordType,
        fields: &[Field],
        packed: bool,
    ) -> Result<TypeLayout, LayoutError> {
        let mut field_layouts = Vec::with_capacity(fields.len());
        // position in bits; `consumed` is the byte count accounted to fields so far
        let mut cursor: u64 = 0;
        let mut consumed: u64 = 0;
        let mut max_align: u64 = 1;

        for (index, field) in fields.iter().enumerate() {
            let is_last = index + 1 == fields.len();

            if let TypeNode::Array {
                element, len: None, ..
            } = &field.ty
            {
                if !is_last {
                    return Err(LayoutError::unsupported(format!(
                        "array of unknown length '{}' must be the last member",
                        field.name.as_deref().unwrap_or("<unnamed>")
                    )));
                }
                if !self.abi.flexible_array_members {
                    return Err(LayoutError::unsupported(format!(
                        "flexible array member '{}' is disabled for this ABI",
                        field.name.as_deref().unwrap_or("<unnamed>")
                    )));
                }
                let element = self.layout_of(element)?;
                let align = self.effective_align(element.align, packed);
                max_align = max_align.max(align);
                let offset = round_up(cursor.div_ceil(8), align);
                field_layouts.push(FieldLayout {
                    name: field.name.clone(),
                    offset,
                    size: 0,
                    padding_before: offset - consumed,
                    bit: None,
                    layout: TypeLayout {
                        size: 0,
                        align: element.align,
                        kind: LayoutKind::Array {
                            element: Box::new(element),
                            len: 0,
                        },
                    },
                });
                consumed = offset;
                cursor = offset * 8;
                continue;
            }

            let layout = self.layout_of(&field.ty)?;

            let Some(width) = field.bit_width else {
                let align = self.effective_align(layout.align, packed);
                max_align = max_align.max(align);
                let offset = round_up(cursor.div_ceil(8), align);
                let end = offset + layout.size;
                field_layouts.push(FieldLayout {
                    name: field.name.clone(),
                    offset,
                    size: layout.size,
                    padding_before: offset - consumed,
                    bit: None,
                    layout,
                });
                consumed = end;
                cursor = end * 8;
                continue;
            };

            // bit-field
            let storage_size = layout.size;
            let unit_bits = storage_size * 8;
            let name = field.name.as_deref().unwrap_or("<unnamed>");
            if u64::from(width) > unit_bits {
                return Err(LayoutError::conflict(format!(
                    "bit-field '{name}' is {width} bits wide but its type has {unit_bits}"
                )));
            }

            if width == 0 {
                cursor = round_up(cursor, unit_bits);
                let end = cursor.div_ceil(8);
                field_layouts.push(FieldLayout {
                    name: field.name.clone(),
                    offset: end,
                    size: 0,
                    padding_before: end.saturating_sub(consumed),
                    bit: Some(BitPlacement {
                        bit_offset: 0,
                        bit_width: 0,
                        storage_size,
                    }),
                    layout,
                });
                consumed = consumed.max(end);
                continue;
            }

            // no packing mode moves a bit-field past a unit boundary
            if (cursor % unit_bits) + u64::from(width) > unit_bits {
                return Err(LayoutError::conflict(format!(
                    "bit-field '{name}' would straddle a {storage_size}-byte storage unit of '{}'",
                    record.display_name()
                )));
            }
            let align = self.effective_align(layout.align, packed);
            max_align = max_align.max(align);

            let start_bit = cursor;
            let end_bit = start_bit + u64::from(width);
            let unit_offset = (start_bit / unit_bits) * storage_size;
            let padding_before = (start_bit / 8).saturating_sub(consumed);
            let new_consumed = consumed.max(end_bit.div_ceil(8));
            field_layouts.push(FieldLayout {
                name: field.name.clone(),
                offset: unit_offset,
                size: new_consumed - consumed - padding_before,
                padding_before,
                bit: Some(BitPlacement {
                    bit_offset: start_bit % unit_bits,
                    bit_width: width,
                    storage_size,
                }),
                layout,
            });
            consumed = new_consumed;
            cursor = end_bit;
        }

        let size = round_up(cursor.div_ceil(8).max(consumed), max_align);
        trace!("{}: size {size}, align {max_align}", record.display_name());
        Ok(TypeLayout {
            size,
            align: max_align,
            kind: LayoutKind::Record(RecordLayout {
                is_union: false,
                fields: field_layouts,
                trailing_padding: size - consumed,
            }),
        })
    }

    fn union_layout(&mut self, fields: &[Field], packed: bool) -> Result<TypeLayout, LayoutError> {
        let mut field_layouts = Vec::with_capacity(fields.len());
        let mut max_size: u64 = 0;
        let mut max_align: u64 = 1;

        for field in fields {
            let layout = self.layout_of(&field.ty)?;
            let mut size = layout.size;
            let mut bit = None;
            if let Some(width) = field.bit_width {
                let unit_bits = layout.size * 8;
                if u64::from(width) > unit_bits {
                    return Err(LayoutError::conflict(format!(
                        "bit-field '{}' is {width} bits wide but its type has {unit_bits}",
                        field.name.as_deref().unwrap_or("<unnamed>")
                    )));
                }
                size = u64::from(width).div_ceil(8);
                bit = Some(BitPlacement {
                    bit_offset: 0,
                    bit_width: width,
                    storage_size: layout.size,
                });
            }
            if bit.is_none_or(|b| b.bit_width > 0) {
                max_align = max_align.max(self.effective_align(layout.align, packed));
            }
            max_size = max_size.max(size);
            field_layouts.push(FieldLayout {
                name: field.name.clone(),
                offset: 0,
                size,
                padding_before: 0,
                bit,
                layout,
            });
        }

        let size = round_up(max_size, max_align);
        Ok(TypeLayout {
            size,
            align: max_align,
            kind: LayoutKind::Record(RecordLayout {
                is_union: true,
                fields: field_layouts,
                trailing_padding: size - max_size,
            }),
        })
    }

    /// Classify the return value and parameters of a function or pointer-to-function type
    pub fn classify_function(&mut self, ty: &TypeNode) -> Result<CallSignature, LayoutError> {
        let Some(TypeNode::Function {
            ret,
            params,
            is_variadic,
        }) = ty.as_function()
        else {
            return Err(LayoutError::unsupported("not a function type"));
        };

        let ret = self.classify(ret)?;
        let params = params
            .iter()
            .map(|param| self.classify(param))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CallSignature {
            convention: self.abi.calling_convention,
            ret,
            params,
            is_variadic: *is_variadic,
        })
    }

    fn classify(&mut self, ty: &TypeNode) -> Result<ArgClass, LayoutError> {
        let class = match ty {
            TypeNode::Primitive(PrimitiveKind::Void) => ArgClass::Void,
            TypeNode::Primitive(kind) if kind.is_floating() => ArgClass::Float {
                size: self.abi.size_align(*kind).0,
            },
            TypeNode::Primitive(kind) => ArgClass::Integer {
                size: self.abi.size_align(*kind).0,
            },
            TypeNode::Enum(e) => ArgClass::Integer {
                size: self.abi.size_align(e.underlying).0,
            },
            TypeNode::Pointer { .. } | TypeNode::Array { .. } | TypeNode::Function { .. } => ArgClass::Pointer,
            TypeNode::Record(_) | TypeNode::RecordRef { .. } => {
                let layout = self.layout_of(ty)?;
                ArgClass::Aggregate {
                    size: layout.size,
                    align: layout.align,
                    in_registers: self.abi.calling_convention.passes_in_registers(layout.size),
                }
            }
        };
        Ok(class)
    }
}
