use crate::Result;
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One breakpoint of a component's price schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "qFrom")]
    pub quantity_from: u64,

    /// Inclusive upper bound; `None` means the range is open-ended.
    #[serde(rename = "qTo")]
    pub quantity_to: Option<u64>,

    pub price: f64,
}

impl PricePoint {
    #[must_use]
    pub const fn contains(&self, quantity: u64) -> bool {
        if quantity < self.quantity_from {
            return false;
        }
        match self.quantity_to {
            Some(to) => quantity <= to,
            None => true,
        }
    }
}

/// Unit price for `quantity` under the given breakpoints.
///
/// Returns the price of the first breakpoint whose range contains the quantity. When no
/// range matches, the first breakpoint's price is used. An empty schedule has no price.
#[must_use]
pub fn quantity_price(quantity: u64, points: &[PricePoint]) -> Option<f64> {
    points
        .iter()
        .find(|p| p.contains(quantity))
        .or_else(|| points.first())
        .map(|p| p.price)
}

/// Checks that breakpoints ascend, are contiguous and non-overlapping, and that only the
/// last one may be open-ended.
#[must_use]
pub fn is_contiguous(points: &[PricePoint]) -> bool {
    points.windows(2).all(|w| match w[0].quantity_to {
        Some(to) => to >= w[0].quantity_from && to.checked_add(1) == Some(w[1].quantity_from),
        None => false,
    })
}

/// Decode a price schedule, rejecting breakpoints that are not contiguous.
///
/// A missing (`null`) schedule decodes as empty.
pub fn parse_schedule(value: &Value) -> Result<Vec<PricePoint>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    let points: Vec<PricePoint> = serde_json::from_value(value.clone()).into_app_err("price schedule is malformed")?;
    if !is_contiguous(&points) {
        bail!("price breakpoints are not contiguous");
    }
    Ok(points)
}
