//! Plumbing shared by every command that touches the local data directory.

use super::ProgressReporter;
use super::config::Config;
use crate::Result;
use crate::reader::{TableReader, TokioScheduler};
use crate::store::{BlobStore, DirStore, MemoryStore};
use crate::transport::HttpClient;
use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use core::time::Duration;
use directories::BaseDirs;
use ohno::IntoAppError;
use std::fs;
use std::sync::Arc;

/// Log target for commands
const LOG_TARGET: &str = "  commands";

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by the commands that work on the local catalogue
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (default is `partsdb.toml`)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory holding the downloaded tables and the synchronized catalogue
    #[arg(long, value_name = "PATH", env = "PARTSDB_DATA_DIR")]
    pub data_dir: Option<Utf8PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

/// Loaded configuration and resolved locations for one command invocation.
#[derive(Debug)]
pub struct Common {
    pub config: Config,
    pub data_dir: Utf8PathBuf,
    pub progress: ProgressReporter,
}

impl Common {
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let config = Config::load(args.config.as_deref())?;

        let data_dir = if let Some(dir) = &args.data_dir {
            dir.clone()
        } else {
            let dir = BaseDirs::new().into_app_err("could not determine data directory")?.data_dir().join("partsdb");
            Utf8PathBuf::try_from(dir).into_app_err("data directory path is not valid UTF-8")?
        };

        let delay = if args.log_level == LogLevel::None {
            Duration::from_millis(300)
        } else {
            Duration::from_hours(365 * 24)
        };

        let use_colors = match args.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                use std::io::{IsTerminal, stderr};
                stderr().is_terminal()
            }
        };

        log::debug!(target: LOG_TARGET, "Using data directory '{data_dir}'");

        Ok(Self {
            config,
            data_dir,
            progress: ProgressReporter::new(delay, use_colors),
        })
    }

    /// The store holding the downloaded table blobs.
    pub fn blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        Ok(Arc::new(DirStore::open(self.data_dir.join("tables"))?))
    }

    /// The store holding the synchronized category and component partitions.
    pub fn catalog_store(&self) -> Result<Arc<MemoryStore>> {
        fs::create_dir_all(&self.data_dir).into_app_err_with(|| format!("unable to create data directory '{}'", self.data_dir))?;
        Ok(Arc::new(MemoryStore::open(self.data_dir.join("catalog.json"))?))
    }

    pub fn table_reader(&self) -> Result<Arc<TableReader>> {
        Ok(Arc::new(TableReader::new(
            self.blob_store()?,
            Arc::new(TokioScheduler),
            self.config.time_slice,
        )))
    }

    pub fn http_client(&self) -> Result<HttpClient> {
        HttpClient::new(&self.config.source_url()?, self.config.request_timeout, self.config.max_retries)
    }
}

/// Initialize logger based on log level
fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // a second command in the same process keeps the first logger
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}
