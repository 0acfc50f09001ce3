use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::progress::Progress;
use crate::store::CatalogStore;
use crate::sync::{Reconciler, Transition};
use crate::transport::{HttpSource, UpdateOutcome, Updater};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;

#[derive(Parser, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Download the packaged tables if the server copy changed since the last update.
pub async fn update_tables<H: Host>(host: &mut H, args: &UpdateArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let updater = Updater::new(common.http_client()?, common.config.archive_name.clone(), common.blob_store()?);

    let outcome = updater.update(&common.progress).await;
    common.progress.done();

    match outcome? {
        UpdateOutcome::NotModified => {
            let _ = writeln!(host.output(), "Component tables are up to date");
        }
        UpdateOutcome::Updated { last_modified, bytes } => {
            let _ = writeln!(
                host.output(),
                "Downloaded {} KB of component tables (server copy from {last_modified})",
                bytes / 1024
            );
        }
    }

    Ok(())
}

/// Report what an update and a sync would do, without changing anything.
pub async fn check_for_updates<H: Host>(host: &mut H, args: &CheckArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let updater = Updater::new(common.http_client()?, common.config.archive_name.clone(), common.blob_store()?);
    match updater.last_update()? {
        Some(when) => {
            let _ = writeln!(host.output(), "Component tables last updated from server copy of {when}");
        }
        None => {
            let _ = writeln!(host.output(), "Component tables have never been downloaded");
        }
    }

    let store: Arc<dyn CatalogStore> = common.catalog_store()?;
    let source = HttpSource::new(common.http_client()?, common.config.index_name.clone());
    let reconciler = Reconciler::new(source, store);

    common.progress.set_phase("Checking");
    common.progress.set_indeterminate(Box::new(|| "fetching category index".to_string()));
    let plan = reconciler.plan().await;
    common.progress.done();
    let plan = plan?;

    if plan.has_updates() {
        let _ = writeln!(
            host.output(),
            "Catalogue updates available: {} new, {} changed, {} stock updates, {} to remove",
            plan.count(Transition::New),
            plan.count(Transition::Changed),
            plan.count(Transition::StockOnly),
            plan.excessive.len()
        );
    } else {
        let _ = writeln!(host.output(), "Catalogue is up to date");
    }

    Ok(())
}
