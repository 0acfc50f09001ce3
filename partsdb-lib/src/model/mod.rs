//! Catalogue data model shared by the encoder, the stores and the query engine.

mod attribute;
mod catalog;
mod category;
mod component;
mod price;

pub use attribute::AttributePair;
pub use catalog::Catalog;
pub use category::{Category, CategoryId, CategoryKey};
pub use component::Component;
pub use price::{PricePoint, is_contiguous, parse_schedule, quantity_price};
