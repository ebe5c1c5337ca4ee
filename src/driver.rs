//! Command-line driver
//!
//! Reads every input file, processes them as independent units in parallel and prints
//! their descriptors. Units that fail print their diagnostics to stderr.

pub mod cli;
pub(crate) mod output;

use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;

use crate::abi::AbiError;
use crate::compiler::Compiler;
use crate::diagnostic::ErrorFormatter;
use crate::ffi_scope::{FfiRoot, ScopeData};

pub use cli::Cli;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error("{0} of the input files failed")]
    CompilationFailed(usize),
}

/// Run the CLI end to end
pub fn run(cli: &Cli) -> Result<(), DriverError> {
    let abi = cli.abi_config()?;
    debug!("run: using {abi:?}");

    let mut texts = Vec::with_capacity(cli.input_files.len());
    for path in &cli.input_files {
        let text = fs::read_to_string(path).map_err(|source| DriverError::Io {
            path: path.clone(),
            source,
        })?;
        texts.push(text);
    }

    let compiler = Compiler::new(abi);
    let results = compiler.process_units(&texts);
    let root = FfiRoot::new();
    let formatter = ErrorFormatter::default();
    let mut failures = 0;

    for ((path, text), result) in cli.input_files.iter().zip(&texts).zip(results) {
        let display_path = path.display().to_string();
        match result {
            Ok(unit) => {
                println!("// {display_path}");
                for descriptor in &unit.descriptors {
                    println!("{}", output::format_descriptor(descriptor));
                }
                let scope_name = unit.scope_name.clone().or_else(|| cli.scope.clone());
                if let Some(scope_name) = scope_name
                    && !root.register_scope(&scope_name, ScopeData::from_unit(&scope_name, &unit))
                {
                    eprintln!("{display_path}: warning: scope '{scope_name}' is already defined");
                }
            }
            Err(error) => {
                failures += 1;
                eprintln!(
                    "{}",
                    formatter.format_diagnostics(&error.diagnostics(), text, &display_path)
                );
            }
        }
    }

    root.bind_symbols();
    for scope in root.scopes() {
        println!("{}", output::format_scope(&scope));
    }
    info!(
        "run: {} files, {} descriptors cached, {} dynamic symbols",
        texts.len(),
        compiler.cache().len(),
        root.dynamic_symbol_count()
    );

    if failures > 0 {
        return Err(DriverError::CompilationFailed(failures));
    }
    Ok(())
}
