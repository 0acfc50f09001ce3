//! Command-line interface and orchestration for partsdb
//!
//! This module implements the CLI commands and wires the library pieces together. It
//! handles argument parsing, configuration and the end-to-end workflows.
//!
//! ## Commands
//!
//! - **init**: Generate a default configuration file
//! - **encode**: Turn a directory of per-category source files into the three tables and
//!   the archive that clients download
//! - **update**: Conditionally download the archive into the local table store
//! - **check**: Report whether the archive or the category index moved, changing nothing
//! - **sync**: Reconcile the local catalogue partitions against the category index
//! - **search**: Decode the local tables and run a query over them
//!
//! Every command loads its configuration through [`Config::load`], which
//! reads `partsdb.toml` from the current directory unless `--config` names another file.

mod common;
mod config;
mod encode;
mod host;
mod init;
mod progress_reporter;
mod run;
mod search;
mod sync;
mod update;

pub use common::{ColorMode, CommonArgs, LogLevel};
pub use config::Config;
pub use encode::{EncodeArgs, encode_tables};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::run;
pub use search::{SearchArgs, search_catalog};
pub use sync::{SyncArgs, sync_catalog};
pub use update::{CheckArgs, UpdateArgs, check_for_updates, update_tables};
