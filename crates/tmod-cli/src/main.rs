use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use tmod_cli::{ExtractArgs, InfoArgs, ListArgs, OutputFormat, commands};

#[derive(Parser)]
#[command(
    name = "tmod",
    about = "Inspect and extract TMOD asset containers",
    version,
    long_about = "Reads the header, property table and index of a TMOD container and extracts its entries, removing the noise markers injected into the payload."
)]
struct Cli {
    /// Set the logging level (RUST_LOG takes precedence)
    #[arg(
        short,
        long,
        value_enum,
        global = true,
        env = "TMOD_LOG_LEVEL",
        default_value = "info"
    )]
    log_level: LogLevel,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show header fields and properties
    Info(InfoArgs),

    /// List entry paths
    List(ListArgs),

    /// Extract entries to a directory
    Extract(ExtractArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(cli.log_level.into()).into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info(args) => commands::info::handle(args, cli.format)?,
        Commands::List(args) => commands::list::handle(args, cli.format)?,
        Commands::Extract(args) => commands::extract::handle(args, cli.format)?,
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "tmod",
            "extract",
            "Mod.tmod",
            "out",
            "--buffer-size",
            "4096",
            "-f",
            "Content/",
            "--filter",
            ".png",
            "-o",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(args.buffer_size, 4096);
                assert_eq!(args.filters, vec!["Content/", ".png"]);
                assert_eq!(args.destination, std::path::PathBuf::from("out"));
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_rejects_zero_buffer() {
        assert!(
            Cli::try_parse_from(["tmod", "extract", "Mod.tmod", "out", "-b", "0"]).is_err()
        );
    }
}
