//! dsf-linter CLI binary entry point.
//! Resolves configuration, runs the linter, and prints the summary.

use clap::Parser;
use dsf_linter::cli::{parse_error_code, Cli, Commands, EXIT_FAILURE};
use dsf_linter::linter::DsfLinter;
use dsf_linter::output::{error_prefix, note_prefix, print_summary};
use dsf_linter::project::ProjectInput;
use dsf_linter::{config, logging};
use std::path::PathBuf;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_error_code(&e));
        }
    };
    let overrides = cli.cmd.overrides();
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Lint { path, verbose, .. } => {
            logging::init(verbose);
            let input = match ProjectInput::parse(&path) {
                Ok(i) => i,
                Err(e) => {
                    eprintln!("{} {}", error_prefix(), e);
                    std::process::exit(EXIT_FAILURE);
                }
            };
            let start = match &input {
                ProjectInput::Directory(dir) => dir.clone(),
                _ => PathBuf::from("."),
            };
            let eff = match config::resolve_effective(&start, &overrides.unwrap_or_default()) {
                Ok(eff) => eff,
                Err(e) => {
                    eprintln!("{} {}", error_prefix(), e);
                    std::process::exit(EXIT_FAILURE);
                }
            };
            if eff.config_file.is_none() && eff.output != "json" {
                eprintln!("{} No dsf-linter.toml found; using defaults.", note_prefix());
            }
            let linter = DsfLinter::new(eff.lint_options());
            match linter.lint(&input) {
                Ok(overall) => {
                    print_summary(&overall, &eff.output, verbose > 0);
                    if !overall.success {
                        std::process::exit(EXIT_FAILURE);
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", error_prefix(), e);
                    std::process::exit(EXIT_FAILURE);
                }
            }
        }
    }
}
