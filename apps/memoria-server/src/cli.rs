//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "memoria-server",
    about = "Memoria retrieval-memory ingestion server",
    version,
    long_about = "Accepts documents, runs them through the extraction/chunking/ \
                  embedding pipeline, and serves search and ask over the result."
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// HTTP server port
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Environment (dev, staging, prod)
    #[arg(
        short,
        long,
        env = "ENVIRONMENT",
        default_value = "dev",
        value_parser = ["dev", "staging", "prod"]
    )]
    pub env: String,

    /// Enable JSON log format (useful for production)
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Number of orchestrator worker loops to run concurrently
    #[arg(short, long, env = "WORKERS", default_value = "4")]
    pub workers: usize,
}

impl Args {
    /// Validate the arguments. Config file is optional - defaults apply if
    /// it's absent.
    pub fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
