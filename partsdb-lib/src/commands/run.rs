//! Command dispatch logic for partsdb

use super::{
    CheckArgs, EncodeArgs, InitArgs, SearchArgs, SyncArgs, UpdateArgs, check_for_updates, encode_tables, init_config, search_catalog,
    sync_catalog, update_tables,
};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "partsdb", author, version, long_about = None)]
#[command(about = "Build, distribute, synchronize and search an offline electronic component catalogue")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: PartsdbSubcommand,
}

#[derive(Subcommand, Debug)]
enum PartsdbSubcommand {
    /// Generate a default configuration file
    Init(InitArgs),
    /// Encode a directory of per-category source files into the packaged tables
    Encode(Box<EncodeArgs>),
    /// Download the packaged tables if the server copy changed
    Update(UpdateArgs),
    /// Report whether updates are available without changing anything
    Check(CheckArgs),
    /// Reconcile the local catalogue with the server's category index
    Sync(SyncArgs),
    /// Search the local catalogue
    Search(Box<SearchArgs>),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        PartsdbSubcommand::Init(init_args) => init_config(host, init_args),
        PartsdbSubcommand::Encode(encode_args) => encode_tables(host, encode_args).await,
        PartsdbSubcommand::Update(update_args) => update_tables(host, update_args).await,
        PartsdbSubcommand::Check(check_args) => check_for_updates(host, check_args).await,
        PartsdbSubcommand::Sync(sync_args) => sync_catalog(host, sync_args).await,
        PartsdbSubcommand::Search(search_args) => search_catalog(host, search_args).await,
    }
}
