//! Logging setup for the command-line tool.

use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output-related flags shared by every subcommand.
#[derive(Debug, Clone, Default, clap::Parser)]
pub struct Output {
    /// Log more; repeat for more detail (`-v` debug, `-vv` trace).
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl Output {
    /// Whether at least one `-v` was given.
    pub fn is_verbose(&self) -> bool {
        self.verbose > 0
    }

    fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Initialize logging. `$RUST_LOG` takes precedence over `-v`.
    pub fn initialize_logging(&self) {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_ansi(should_emit_colors())
            .with_thread_ids(self.verbose > 1)
            .with_writer(std::io::stderr)
            .compact();

        let filter_layer = EnvFilter::builder()
            .with_default_directive(self.level().into())
            .from_env_lossy();

        // A second initialization (e.g. in tests) is harmless.
        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    }
}

/// Check whether we should emit ANSI escape codes for log formatting.
///
/// The `tracing-subscriber` crate doesn't have native support for
/// "--color=always|never|auto", so this only looks at the terminal and
/// `$NO_COLOR`.
fn should_emit_colors() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn verbosity_maps_to_levels() {
        let quiet = Output::parse_from(["filemap"]);
        assert_eq!(quiet.level(), LevelFilter::WARN);
        assert!(!quiet.is_verbose());

        let debug = Output::parse_from(["filemap", "-v"]);
        assert_eq!(debug.level(), LevelFilter::DEBUG);

        let trace = Output::parse_from(["filemap", "-vvv"]);
        assert_eq!(trace.level(), LevelFilter::TRACE);
    }
}
