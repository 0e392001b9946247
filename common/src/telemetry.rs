//! Provides helper functions for initializing log collection.
use std::fmt;

use anyhow::{bail, Result};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter, Registry};

/// Verbosity of the process logs, on the 0-4 scale exposed by the CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// 0
    Debug,
    /// 1
    Info,
    /// 2
    #[default]
    Warning,
    /// 3
    Error,
    /// 4, tracing has nothing above ERROR so this filters the same way.
    Critical,
}

impl Verbosity {
    /// The most verbose level that is still emitted.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Warning => LevelFilter::WARN,
            Verbosity::Error | Verbosity::Critical => LevelFilter::ERROR,
        }
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Verbosity::Debug,
            1 => Verbosity::Info,
            2 => Verbosity::Warning,
            3 => Verbosity::Error,
            4 => Verbosity::Critical,
            _ => bail!("verbosity must be between 0 and 4, got {value}"),
        })
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Debug => "DEBUG",
            Verbosity::Info => "INFO",
            Verbosity::Warning => "WARNING",
            Verbosity::Error => "ERROR",
            Verbosity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Initialize tracing.
///
/// The verbosity sets the default directive, `RUST_LOG` still takes precedence when present.
pub fn init(verbosity: Verbosity, json: bool) -> Result<()> {
    let log_filter = EnvFilter::builder()
        .with_default_directive(verbosity.level_filter().into())
        .from_env()?;

    let logger = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(log_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .compact()
            .with_filter(log_filter)
            .boxed()
    };

    let collector = Registry::default().with(logger);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector)?;

    Ok(())
}
