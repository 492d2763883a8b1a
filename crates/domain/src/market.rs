//! Market price signal read by price triggers.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    /// Price per kWh.
    pub price: f64,
    pub currency: String,
    pub valid_at: Timestamp,
}
