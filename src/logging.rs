//! Tracing subscriber setup for the CLI.
//!
//! `RUST_LOG` wins when set; otherwise the verbosity flag count selects the
//! level for this crate (0 = warn, 1 = info, 2 = debug, 3+ = trace).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn default_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("dsf_linter={}", level)
}

/// Install the global subscriber, writing to stderr. Safe to call twice;
/// the second call is a no-op.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_levels() {
        assert_eq!(default_directive(0), "dsf_linter=warn");
        assert_eq!(default_directive(2), "dsf_linter=debug");
        assert_eq!(default_directive(9), "dsf_linter=trace");
    }
}
