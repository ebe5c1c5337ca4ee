use cffi_decl::driver::{Cli, run};
use clap::Parser as ClapParser;
use log::LevelFilter;
use std::process::exit;

/// The main entry point for the application.
///
/// Parses command-line arguments and prints the descriptors of every input file.
fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::from_default_env().filter_level(level).init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        exit(1);
    }
}
