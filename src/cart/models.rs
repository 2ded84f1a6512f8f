//! Shopping Cart Domain Models
//!
//! This module contains all data structures related to the shopping cart
//! business domain.

use serde::{Deserialize, Serialize};

use super::reconciler::AvailabilityMap;

// =============================================================================
// Cart Domain Models
// =============================================================================

/// Returns the default quantity (1) for cart lines
fn default_quantity() -> u32 {
    1
}

/// One product position in the cart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Product identifier
    pub id: String,

    /// Distinguishes variants of the same product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub unit_price: f64,

    /// Price before discount, for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,

    /// Quantity of this line (defaults to 1)
    #[serde(default = "default_quantity")]
    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartLine {
    /// True when this line holds product `id` in variant `variant_key`.
    pub fn matches(&self, id: &str, variant_key: Option<&str>) -> bool {
        self.id == id && self.variant_key.as_deref() == variant_key
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }

    /// Discount against `original_price` for the whole line; zero without one.
    pub fn savings(&self) -> f64 {
        self.original_price
            .map(|original| (original - self.unit_price).max(0.0) * f64::from(self.quantity))
            .unwrap_or(0.0)
    }
}

/// Input for the sync_cart and add_to_cart endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartInput {
    /// List of lines to store or add
    pub items: Vec<CartLine>,

    /// Optional cart identifier
    pub cart_id: Option<String>,
}

/// Input for the update_cart_item and remove_from_cart endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub cart_id: Option<String>,
    pub id: String,
    pub variant_key: Option<String>,
    /// Ignored by remove_from_cart
    #[serde(default)]
    pub quantity: u32,
}

/// Input for the checkout endpoint
#[derive(Debug, Deserialize)]
pub struct CheckoutInput {
    /// Optional cart identifier
    #[serde(rename = "cartId")]
    pub cart_id: Option<String>,
}

/// Response for cart synchronization operations
#[derive(Serialize)]
pub struct SyncResponse {
    /// Status of the operation
    pub status: String,

    /// Cart identifier
    #[serde(rename = "cartId")]
    pub cart_id: String,
}

/// Cart contents together with the stock known for them
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart_id: String,
    pub items: Vec<CartLine>,
    pub availability: AvailabilityMap,
    /// Whether stock is tracked for this cart at all
    pub availability_checked: bool,
    pub subtotal: f64,
    pub savings: f64,
}
