// Command-line interface: `esm-filter [run|config|version] [--config <path>]`.

use clap::{Parser, Subcommand};

/// Windowed aggregation of request telemetry datagrams.
#[derive(Debug, Parser)]
#[command(name = "esm-filter", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file. Defaults to $ESM_FILTER_CONFIG_PATH,
    /// ~/.esm-filter/esm-filter.conf or /etc/esm-filter/esm-filter.conf when present.
    /// Pass the null device (/dev/null) to use built-in defaults.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the server (default).
    Run,
    /// Print the effective configuration as TOML and exit.
    Config,
    /// Print version information and exit.
    Version,
}

impl Cli {
    /// The subcommand to run; `run` when none is given.
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config.as_deref()
    }
}
