//! CLI parsing and configuration module
//!
//! This module handles command-line argument parsing using clap and maps the flags
//! onto an [`AbiConfig`].

use clap::Parser as CliParser;
use std::path::PathBuf;
use std::str::FromStr;
use target_lexicon::Triple;

use crate::abi::{AbiConfig, AbiError, Packing};

/// CLI interface using clap
#[derive(CliParser, Debug)]
#[clap(name = "cffi-decl", about = "Parse C declarations and print their FFI type descriptors")]
pub struct Cli {
    /// Header or cdef files to process
    #[clap(value_parser, required = true)]
    pub input_files: Vec<PathBuf>,

    /// Target triple to lay types out for (defaults to the host)
    #[clap(long, value_name = "TRIPLE")]
    pub target: Option<String>,

    /// ABI preset: lp64_sysv, llp64_win64, ilp32_cdecl, aapcs64, llp64_arm64 or apple_arm64
    #[clap(long, value_name = "PRESET", conflicts_with = "target")]
    pub abi: Option<String>,

    /// Pack every struct and union
    #[clap(long)]
    pub packed: bool,

    /// Reject flexible array members
    #[clap(long)]
    pub no_flexible_array: bool,

    /// Scope name for files without `#define FFI_SCOPE`
    #[clap(long, value_name = "NAME")]
    pub scope: Option<String>,

    /// Enable verbose diagnostic output
    #[clap(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Build the ABI configuration the flags describe
    pub fn abi_config(&self) -> Result<AbiConfig, AbiError> {
        let abi = match (&self.abi, &self.target) {
            (Some(preset), _) => AbiConfig::preset(preset)?,
            (None, Some(target)) => {
                let triple = Triple::from_str(target).map_err(|_| AbiError::UnsupportedTarget(target.clone()))?;
                AbiConfig::for_triple(&triple)?
            }
            (None, None) => AbiConfig::host()?,
        };
        let abi = if self.packed { abi.with_packing(Packing::Packed) } else { abi };
        Ok(abi.with_flexible_array_members(!self.no_flexible_array))
    }
}
