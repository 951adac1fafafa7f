//! Logging setup, mirrored after `apps/hash-graph/lib/graph/src/logging/init.rs`:
//! an `EnvFilter` sourced from `--log-level`/`RUST_LOG`, with a plain or JSON
//! formatter selectable on the command line.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
pub struct LoggingArgs {
    /// Log level filter, e.g. `info`, `debug`, `entity_resolution_cli=trace`.
    #[clap(long, env = "ENTITY_RESOLUTION_LOG", default_value = "info")]
    pub log_level: String,

    /// Output format for log lines.
    #[clap(long, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl LoggingArgs {
    pub fn init(&self) {
        let filter = EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
        match self.log_format {
            LogFormatArg::Pretty => subscriber.init(),
            LogFormatArg::Json => subscriber.json().init(),
        }
    }
}
