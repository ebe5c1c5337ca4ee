//! Target ABI configuration.
//!
//! An [`AbiConfig`] fixes everything layout depends on: primitive sizes and alignments,
//! the packing mode, the calling convention and the flexible array member policy.
//! It is immutable and hashable so it can be part of a descriptor cache key.

use serde::Serialize;
use target_lexicon::{Architecture, OperatingSystem, PointerWidth, Triple, Vendor};
use thiserror::Error;

use crate::type_node::PrimitiveKind;

/// Struct packing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Packing {
    /// Fields aligned to their natural alignment
    Natural,
    /// Every field aligned to 1 (`__attribute__((packed))` on every record)
    Packed,
    /// Alignment clamped to n (`#pragma pack(n)`)
    Max(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallingConvention {
    SysV64,
    Win64,
    Cdecl,
    Aapcs64,
}

impl CallingConvention {
    /// Whether an aggregate of `size` bytes is passed in registers
    pub fn passes_in_registers(self, size: u64) -> bool {
        match self {
            CallingConvention::SysV64 | CallingConvention::Aapcs64 => size > 0 && size <= 16,
            CallingConvention::Win64 => matches!(size, 1 | 2 | 4 | 8),
            CallingConvention::Cdecl => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("unsupported target '{0}'")]
    UnsupportedTarget(String),
    #[error("unknown ABI preset '{0}' (expected one of: {presets})", presets = AbiConfig::PRESETS.join(", "))]
    UnknownPreset(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AbiConfig {
    /// Pointer size in bytes; also the size of `size_t` and friends
    pub pointer_width: u64,
    pub long_size: u64,
    pub long_double_size: u64,
    pub long_double_align: u64,
    pub int64_align: u64,
    pub double_align: u64,
    pub char_signed: bool,
    pub packing: Packing,
    pub calling_convention: CallingConvention,
    /// Accept `T name[]` as the last member of a struct
    pub flexible_array_members: bool,
}

impl Default for AbiConfig {
    fn default() -> Self {
        AbiConfig::lp64_sysv()
    }
}

impl AbiConfig {
    pub const PRESETS: [&'static str; 6] = [
        "lp64_sysv",
        "llp64_win64",
        "ilp32_cdecl",
        "aapcs64",
        "llp64_arm64",
        "apple_arm64",
    ];

    /// x86-64 Linux/macOS
    pub fn lp64_sysv() -> Self {
        AbiConfig {
            pointer_width: 8,
            long_size: 8,
            long_double_size: 16,
            long_double_align: 16,
            int64_align: 8,
            double_align: 8,
            char_signed: true,
            packing: Packing::Natural,
            calling_convention: CallingConvention::SysV64,
            flexible_array_members: true,
        }
    }

    /// x86-64 Windows
    pub fn llp64_win64() -> Self {
        AbiConfig {
            long_size: 4,
            long_double_size: 8,
            long_double_align: 8,
            calling_convention: CallingConvention::Win64,
            ..AbiConfig::lp64_sysv()
        }
    }

    /// 32-bit x86 with the i386 System V alignment rules
    pub fn ilp32_cdecl() -> Self {
        AbiConfig {
            pointer_width: 4,
            long_size: 4,
            long_double_size: 12,
            long_double_align: 4,
            int64_align: 4,
            double_align: 4,
            char_signed: true,
            packing: Packing::Natural,
            calling_convention: CallingConvention::Cdecl,
            flexible_array_members: true,
        }
    }

    /// AArch64 procedure call standard; plain `char` is unsigned
    pub fn aapcs64() -> Self {
        AbiConfig {
            char_signed: false,
            calling_convention: CallingConvention::Aapcs64,
            ..AbiConfig::lp64_sysv()
        }
    }

    /// Windows on ARM64: LLP64 with MSVC's signed `char` and 8-byte `long double`
    pub fn llp64_arm64() -> Self {
        AbiConfig {
            long_size: 4,
            long_double_size: 8,
            long_double_align: 8,
            char_signed: true,
            ..AbiConfig::aapcs64()
        }
    }

    /// Apple arm64 (macOS, iOS); `char` is signed and `long double` is `double`
    pub fn apple_arm64() -> Self {
        AbiConfig {
            long_double_size: 8,
            long_double_align: 8,
            char_signed: true,
            ..AbiConfig::aapcs64()
        }
    }

    pub fn preset(name: &str) -> Result<Self, AbiError> {
        match name {
            "lp64_sysv" => Ok(AbiConfig::lp64_sysv()),
            "llp64_win64" => Ok(AbiConfig::llp64_win64()),
            "ilp32_cdecl" => Ok(AbiConfig::ilp32_cdecl()),
            "aapcs64" => Ok(AbiConfig::aapcs64()),
            "llp64_arm64" => Ok(AbiConfig::llp64_arm64()),
            "apple_arm64" => Ok(AbiConfig::apple_arm64()),
            _ => Err(AbiError::UnknownPreset(name.to_string())),
        }
    }

    pub fn for_triple(triple: &Triple) -> Result<Self, AbiError> {
        match (triple.architecture, triple.operating_system) {
            (Architecture::X86_64, OperatingSystem::Windows) => Ok(AbiConfig::llp64_win64()),
            (Architecture::X86_64, _) => Ok(AbiConfig::lp64_sysv()),
            (Architecture::X86_32(_), _) => Ok(AbiConfig::ilp32_cdecl()),
            (Architecture::Aarch64(_), OperatingSystem::Windows) => Ok(AbiConfig::llp64_arm64()),
            (Architecture::Aarch64(_), _) if triple.vendor == Vendor::Apple => Ok(AbiConfig::apple_arm64()),
            (Architecture::Aarch64(_), _) => Ok(AbiConfig::aapcs64()),
            _ => match triple.pointer_width() {
                Ok(PointerWidth::U64) if triple.operating_system != OperatingSystem::Windows => {
                    log::debug!("no dedicated ABI for {triple}, assuming lp64_sysv");
                    Ok(AbiConfig::lp64_sysv())
                }
                _ => Err(AbiError::UnsupportedTarget(triple.to_string())),
            },
        }
    }

    pub fn host() -> Result<Self, AbiError> {
        AbiConfig::for_triple(&Triple::host())
    }

    pub fn with_packing(mut self, packing: Packing) -> Self {
        self.packing = packing;
        self
    }

    pub fn with_flexible_array_members(mut self, enabled: bool) -> Self {
        self.flexible_array_members = enabled;
        self
    }

    /// Size and alignment in bytes of a primitive, before any packing
    pub fn size_align(&self, kind: PrimitiveKind) -> (u64, u64) {
        match kind {
            PrimitiveKind::Void => (0, 1),
            PrimitiveKind::Bool
            | PrimitiveKind::Char
            | PrimitiveKind::SChar
            | PrimitiveKind::UChar
            | PrimitiveKind::Int8
            | PrimitiveKind::UInt8 => (1, 1),
            PrimitiveKind::Short | PrimitiveKind::UShort | PrimitiveKind::Int16 | PrimitiveKind::UInt16 => (2, 2),
            PrimitiveKind::Int
            | PrimitiveKind::UInt
            | PrimitiveKind::Int32
            | PrimitiveKind::UInt32
            | PrimitiveKind::Float => (4, 4),
            PrimitiveKind::Long | PrimitiveKind::ULong => (self.long_size, self.long_size),
            PrimitiveKind::LongLong | PrimitiveKind::ULongLong | PrimitiveKind::Int64 | PrimitiveKind::UInt64 => {
                (8, self.int64_align)
            }
            PrimitiveKind::Double => (8, self.double_align),
            PrimitiveKind::LongDouble => (self.long_double_size, self.long_double_align),
            PrimitiveKind::Size
            | PrimitiveKind::SSize
            | PrimitiveKind::IntPtr
            | PrimitiveKind::UIntPtr
            | PrimitiveKind::PtrDiff => (self.pointer_width, self.pointer_width),
        }
    }

    /// Signedness of an integer kind, with plain `char` resolved for this target
    pub fn is_signed(&self, kind: PrimitiveKind) -> bool {
        kind.is_signed().unwrap_or(self.char_signed)
    }

    /// Representable range of an integer kind on this target. `None` for `void` and
    /// floating types.
    pub fn value_range(&self, kind: PrimitiveKind) -> Option<(i128, i128)> {
        if kind.is_void() || kind.is_floating() {
            return None;
        }
        if kind == PrimitiveKind::Bool {
            return Some((0, 1));
        }
        let bits = self.size_align(kind).0 * 8;
        let range = if self.is_signed(kind) {
            let half = 1i128 << (bits - 1);
            (-half, half - 1)
        } else {
            (0, (1i128 << bits) - 1)
        };
        Some(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_presets_by_triple() {
        let linux = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(AbiConfig::for_triple(&linux).unwrap(), AbiConfig::lp64_sysv());

        let windows = Triple::from_str("x86_64-pc-windows-msvc").unwrap();
        let abi = AbiConfig::for_triple(&windows).unwrap();
        assert_eq!(abi.size_align(PrimitiveKind::Long), (4, 4));
        assert_eq!(abi.calling_convention, CallingConvention::Win64);

        let i686 = Triple::from_str("i686-unknown-linux-gnu").unwrap();
        let abi = AbiConfig::for_triple(&i686).unwrap();
        assert_eq!(abi.size_align(PrimitiveKind::Size), (4, 4));
        assert_eq!(abi.size_align(PrimitiveKind::Double), (8, 4));

        let arm = Triple::from_str("aarch64-unknown-linux-gnu").unwrap();
        let abi = AbiConfig::for_triple(&arm).unwrap();
        assert_eq!(abi, AbiConfig::aapcs64());
        assert!(!abi.is_signed(PrimitiveKind::Char));
    }

    #[test]
    fn test_aarch64_depends_on_os() {
        let windows = Triple::from_str("aarch64-pc-windows-msvc").unwrap();
        let abi = AbiConfig::for_triple(&windows).unwrap();
        assert_eq!(abi, AbiConfig::llp64_arm64());
        assert_eq!(abi.size_align(PrimitiveKind::Long), (4, 4));
        assert_eq!(abi.size_align(PrimitiveKind::LongDouble), (8, 8));
        assert!(abi.is_signed(PrimitiveKind::Char));
        assert_eq!(abi.calling_convention, CallingConvention::Aapcs64);

        for apple in ["aarch64-apple-darwin", "aarch64-apple-ios"] {
            let abi = AbiConfig::for_triple(&Triple::from_str(apple).unwrap()).unwrap();
            assert_eq!(abi, AbiConfig::apple_arm64(), "{apple}");
            assert_eq!(abi.size_align(PrimitiveKind::Long), (8, 8));
            assert_eq!(abi.size_align(PrimitiveKind::LongDouble), (8, 8));
            assert!(abi.is_signed(PrimitiveKind::Char));
        }
    }

    #[test]
    fn test_value_ranges_follow_the_target() {
        let unsigned_char = AbiConfig::aapcs64();
        assert_eq!(unsigned_char.value_range(PrimitiveKind::Char), Some((0, 255)));
        assert_eq!(AbiConfig::lp64_sysv().value_range(PrimitiveKind::Char), Some((-128, 127)));

        assert_eq!(
            AbiConfig::llp64_win64().value_range(PrimitiveKind::ULong),
            Some((0, u32::MAX.into()))
        );
        assert_eq!(
            AbiConfig::lp64_sysv().value_range(PrimitiveKind::Long),
            Some((i64::MIN.into(), i64::MAX.into()))
        );
        assert_eq!(AbiConfig::ilp32_cdecl().value_range(PrimitiveKind::Size), Some((0, u32::MAX.into())));
        assert_eq!(unsigned_char.value_range(PrimitiveKind::Bool), Some((0, 1)));
        assert_eq!(unsigned_char.value_range(PrimitiveKind::Double), None);
    }

    #[test]
    fn test_unsupported_target() {
        let wasm = Triple::from_str("wasm32-unknown-unknown").unwrap();
        assert!(matches!(
            AbiConfig::for_triple(&wasm),
            Err(AbiError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn test_unknown_preset() {
        let err = AbiConfig::preset("lp128").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown ABI preset 'lp128' (expected one of: lp64_sysv, llp64_win64, ilp32_cdecl, aapcs64, llp64_arm64, apple_arm64)"
        );
    }

    #[test]
    fn test_config_is_part_of_identity() {
        let natural = AbiConfig::lp64_sysv();
        let packed = AbiConfig::lp64_sysv().with_packing(Packing::Packed);
        assert_ne!(natural, packed);
        assert_eq!(natural, AbiConfig::default());
    }
}
