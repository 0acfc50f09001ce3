use super::{CategoryId, PricePoint, quantity_price};
use serde::{Deserialize, Serialize};

/// A single catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Supplier part number, the primary key.
    pub lcsc: String,
    pub manufacturer: String,
    pub description: String,

    /// Positions into the attribute lookup table.
    pub attributes: Vec<u32>,

    /// Units in stock, `None` when the stock snapshot does not mention the part.
    pub stock: Option<u64>,
    pub category_id: CategoryId,
    pub joints: Option<u64>,
    pub datasheet: String,
    pub price: Vec<PricePoint>,
    pub image: Option<String>,

    /// Product page path fragment.
    pub url: String,
}

impl Component {
    /// Unit price when ordering `quantity` pieces.
    #[must_use]
    pub fn unit_price(&self, quantity: u64) -> Option<f64> {
        quantity_price(quantity, &self.price)
    }
}
