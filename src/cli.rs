//! CLI argument parsing via `clap`.

use crate::config::CliOverrides;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dsf-linter",
    version,
    about = "Lint DSF process plugins",
    long_about = "dsf-linter discovers DSF process plugin definitions (API v1 and v2) in a project, validates their BPMN models and FHIR resources, checks service registration, and reports files no plugin references.\n\nConfiguration precedence: CLI > dsf-linter.toml > defaults.",
    after_help = "Examples:\n  dsf-linter lint --path .\n  dsf-linter lint --path target/my-plugin-1.0.jar --html\n  dsf-linter lint --path https://github.com/org/plugin.git --build --fail-on-errors",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current dsf-linter version.")]
    Version,
    /// Lint a plugin project
    #[command(
        about = "Run lint checks",
        long_about = "Discover plugin definitions, validate their resources, and write per-plugin and aggregated reports.",
        after_help = "Examples:\n  dsf-linter lint --path .\n  dsf-linter lint --path . --output json --report-dir /tmp/report"
    )]
    Lint {
        #[arg(long, default_value = ".", help = "Project directory, .jar file, or git URL")]
        path: String,
        #[arg(long, action = ArgAction::SetTrue, help = "Also write HTML reports")]
        html: bool,
        #[arg(long, action = ArgAction::SetTrue, help = "Exit non-zero when any plugin has errors")]
        fail_on_errors: bool,
        #[arg(long, help = "Report directory (default: report, relative to the project)")]
        report_dir: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, action = ArgAction::SetTrue, help = "Run a Maven build before linting")]
        build: bool,
        #[arg(long = "mvn-add", value_name = "GOAL", help = "Add a Maven goal (repeatable)")]
        mvn_add: Vec<String>,
        #[arg(
            long = "mvn-remove",
            value_name = "GOAL",
            help = "Remove a default Maven goal (repeatable)"
        )]
        mvn_remove: Vec<String>,
        #[arg(
            short,
            long,
            action = ArgAction::Count,
            help = "More log output (-v info, -vv debug)"
        )]
        verbose: u8,
    },
}

/// Flags only count as overrides when they were given.
pub fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl Commands {
    /// CLI overrides for the config layer; `None` for `version`.
    pub fn overrides(&self) -> Option<CliOverrides> {
        match self {
            Commands::Version => None,
            Commands::Lint {
                html,
                fail_on_errors,
                report_dir,
                output,
                build,
                mvn_add,
                mvn_remove,
                ..
            } => Some(CliOverrides {
                report_dir: report_dir.clone(),
                html: flag(*html),
                fail_on_errors: flag(*fail_on_errors),
                output: output.clone(),
                build: flag(*build),
                mvn_add: mvn_add.clone(),
                mvn_remove: mvn_remove.clone(),
            }),
        }
    }
}

/// Process exit codes: 0 on success, 1 on any failure.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for a rejected command line. Help output is not a failure.
pub fn parse_error_code(e: &clap::Error) -> i32 {
    if e.use_stderr() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}
