//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// sg - scatter-gather endpoint runner
#[derive(Parser)]
#[command(
    name = "sg",
    about = "Run an in-process scatter-gather endpoint against echo recipients",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Scatter one request and print the aggregated result
    Run {
        /// Distribution mode
        #[arg(short, long, value_enum, default_value_t = Mode::Auction)]
        mode: Mode,

        /// Number of recipients
        #[arg(short, long, default_value = "3")]
        recipients: usize,

        /// How many of the recipients never reply
        #[arg(short, long, default_value = "0")]
        silent: usize,

        /// Request payload as JSON
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Override gather-timeout-ms
        #[arg(long)]
        gather_timeout_ms: Option<i64>,

        /// Print diagnostic events to stderr as JSON lines
        #[arg(short, long)]
        events: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// How the request reaches recipients
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Broadcast to every subscriber
    Auction,
    /// Route through a recipient list
    Distribution,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["sg", "run", "--mode", "distribution", "--recipients", "4", "--silent", "1"]).unwrap();
        match cli.command {
            Command::Run {
                mode,
                recipients,
                silent,
                payload,
                gather_timeout_ms,
                events,
            } => {
                assert_eq!(mode, Mode::Distribution);
                assert_eq!(recipients, 4);
                assert_eq!(silent, 1);
                assert_eq!(payload, "{}");
                assert_eq!(gather_timeout_ms, None);
                assert!(!events);
            }
            Command::Config => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["sg", "config", "--log-level", "DEBUG"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("DEBUG"));
        assert!(matches!(cli.command, Command::Config));
    }
}
