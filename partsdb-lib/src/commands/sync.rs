use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::progress::Progress;
use crate::store::CatalogStore;
use crate::sync::{CategoryOutcome, Reconciler, StatusBoard};
use crate::transport::HttpSource;
use clap::Parser;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Reconcile the local catalogue with the server's category index.
///
/// Exits with status 1 when any category failed to synchronize; the others are kept.
pub async fn sync_catalog<H: Host>(host: &mut H, args: &SyncArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let store = common.catalog_store()?;
    let source = HttpSource::new(common.http_client()?, common.config.index_name.clone());
    let reconciler = Reconciler::new(source, Arc::clone(&store) as Arc<dyn CatalogStore>);

    let latest = Arc::new(Mutex::new(String::new()));
    let latest_clone = Arc::clone(&latest);
    let board = StatusBoard::with_listener(move |statuses| {
        let busy = statuses
            .values()
            .filter(|s| !(s.starts_with("Finished") || matches!(s.as_str(), "Failed" | "Removed" | "fetched")))
            .count();
        *latest_clone.lock().expect("lock poisoned") = format!("{busy} of {} tasks running", statuses.len());
    });

    common.progress.set_phase("Syncing");
    common.progress.set_indeterminate(Box::new(move || latest.lock().expect("lock poisoned").clone()));
    let report = reconciler.sync(&board).await;
    common.progress.done();
    let report = report?;

    store.flush()?;

    let mut created = 0;
    let mut recreated = 0;
    let mut stock = 0;
    let mut removed = 0;
    for category in &report.categories {
        match &category.outcome {
            CategoryOutcome::Created { .. } => created += 1,
            CategoryOutcome::Recreated { .. } => recreated += 1,
            CategoryOutcome::StockUpdated { .. } => stock += 1,
            CategoryOutcome::Removed => removed += 1,
            CategoryOutcome::Unchanged | CategoryOutcome::Failed(_) => {}
        }
    }

    let _ = writeln!(
        host.output(),
        "Synchronized {} categories: {created} added, {recreated} replaced, {stock} stock updates, {removed} removed",
        report.categories.len()
    );

    if !report.is_success() {
        for failure in report.failures() {
            if let CategoryOutcome::Failed(e) = &failure.outcome {
                let _ = writeln!(host.error(), "Unable to synchronize {}: {e}", failure.key);
            }
        }
        host.exit(1);
    }

    Ok(())
}
