use super::HttpClient;
use crate::Result;
use crate::encoder::{SourceFile, StockSnapshot};
use crate::sync::{CategoryIndex, CategorySource};
use serde_json::Value;

/// [`CategorySource`] backed by the files published next to the index.
///
/// For a source name `chip` the files are `chip.json`, `chip.stock.json` and
/// `chip.stock.json.sha256`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: HttpClient,
    index_name: String,
}

impl HttpSource {
    pub fn new(client: HttpClient, index_name: impl Into<String>) -> Self {
        Self {
            client,
            index_name: index_name.into(),
        }
    }

    #[must_use]
    pub const fn client(&self) -> &HttpClient {
        &self.client
    }
}

impl CategorySource for HttpSource {
    async fn fetch_index(&self) -> Result<CategoryIndex> {
        let value: Value = self.client.fetch_json(&self.index_name, "cannot fetch categories index").await?;
        CategoryIndex::from_value(value)
    }

    async fn fetch_components(&self, source_name: &str) -> Result<SourceFile> {
        let what = format!("cannot fetch components of '{source_name}'");
        let value: Value = self.client.fetch_json(&format!("{source_name}.json"), &what).await?;
        SourceFile::from_value(value)
    }

    async fn fetch_stock(&self, source_name: &str) -> Result<StockSnapshot> {
        let what = format!("cannot fetch stock of '{source_name}'");
        self.client.fetch_json(&format!("{source_name}.stock.json"), &what).await
    }

    async fn fetch_stock_hash(&self, source_name: &str) -> Result<String> {
        let what = format!("cannot fetch stock hash of '{source_name}'");
        self.client.fetch_text(&format!("{source_name}.stock.json.sha256"), &what).await
    }
}
