use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::library::{Library, LibraryState};
use crate::model::{Catalog, CategoryId, Component};
use crate::progress::Progress;
use crate::query::{AttributeFilter, Query, QueryEngine, SearchOutcome};
use crate::reader::{NeverCancel, TokioScheduler};
use crate::store::CatalogStore;
use clap::Parser;
use ohno::{app_err, bail};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Words that must all occur in a matching component
    #[arg(value_name = "TEXT")]
    pub text: Vec<String>,

    /// Only search the category with this id (repeatable)
    #[arg(long = "category", value_name = "ID")]
    pub categories: Vec<CategoryId>,

    /// Only accept components whose attribute NAME shows VALUE (repeatable; values of one name are alternatives)
    #[arg(long = "attr", value_name = "NAME=VALUE", value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,

    /// Reject components that lack the attribute NAME (repeatable)
    #[arg(long = "require", value_name = "NAME")]
    pub required: Vec<String>,

    /// Order quantity used to pick the unit price
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub quantity: u64,

    /// Maximum number of matches to print
    #[arg(long, value_name = "N", default_value_t = 50)]
    pub limit: usize,

    #[command(flatten)]
    pub common: CommonArgs,
}

fn parse_attribute(s: &str) -> core::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

impl SearchArgs {
    /// The query these arguments describe.
    #[must_use]
    pub fn query(&self) -> Query {
        let mut query = Query::new().text(self.text.join(" "));
        for id in &self.categories {
            query = query.category(*id);
        }

        let mut filters: BTreeMap<&str, AttributeFilter> = BTreeMap::new();
        for (name, value) in &self.attributes {
            let filter = filters.remove(name.as_str()).unwrap_or_else(|| AttributeFilter::new(name.as_str()));
            let _ = filters.insert(name.as_str(), filter.value(value.as_str()));
        }
        for name in &self.required {
            let filter = filters.remove(name.as_str()).unwrap_or_else(|| AttributeFilter::new(name.as_str()));
            let _ = filters.insert(name.as_str(), filter.required());
        }

        filters.into_values().fold(query, Query::filter)
    }
}

/// Search the local catalogue and print the matching components.
pub async fn search_catalog<H: Host>(host: &mut H, args: &SearchArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let library = Library::new(common.table_reader()?);

    let catalog = match library.load(&NeverCancel).await {
        LibraryState::Ready(catalog) => catalog,
        LibraryState::Empty => {
            let store = common.catalog_store()?;
            let catalog = store.snapshot()?;
            if catalog.is_empty() {
                bail!("the component library is empty, run `partsdb update` or `partsdb sync` first");
            }
            Arc::new(catalog)
        }
        LibraryState::Cancelled => bail!("loading the component library was cancelled"),
        LibraryState::Unreadable(e) => return Err(app_err!("the component library cannot be read: {e}")),
    };
    common.progress.done();

    let engine = QueryEngine::new(
        Arc::new(TokioScheduler),
        common.config.time_slice,
        common.config.query_chunk_size,
        common.config.min_query_len_all_categories,
    );

    match engine.search(&catalog, &args.query(), &NeverCancel).await {
        SearchOutcome::Matches(indices) => {
            for &index in indices.iter().take(args.limit) {
                let component = &catalog.components()[index];
                let _ = writeln!(host.output(), "{}", describe(&catalog, component, args.quantity));
            }
            if indices.len() > args.limit {
                let _ = writeln!(host.output(), "... {} more", indices.len() - args.limit);
            }
            let _ = writeln!(host.output(), "{} matching components", indices.len());
        }
        SearchOutcome::QueryTooShort { min } => {
            let _ = writeln!(host.error(), "Search text must have at least {min} characters when no category is selected");
            host.exit(2);
        }
        SearchOutcome::Cancelled => {}
    }

    Ok(())
}

fn describe(catalog: &Catalog, component: &Component, quantity: u64) -> String {
    let category = catalog
        .category(component.category_id)
        .map_or_else(String::new, |c| c.key().to_string());
    let stock = component.stock.map_or_else(|| "-".to_string(), |s| s.to_string());
    let price = component.unit_price(quantity).map_or_else(|| "-".to_string(), |p| format!("${p:.4}"));

    format!(
        "{:<10} {:<20} {:>8} {:>10}  {}  [{category}]",
        component.lcsc, component.manufacturer, stock, price, component.description
    )
}
