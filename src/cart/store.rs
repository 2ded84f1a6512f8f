//! Cart store contract and its in-memory implementation.

use dashmap::DashMap;
use std::sync::Arc;

use super::models::CartLine;

/// Read/write contract of a single cart.
///
/// Consumers only read lines and request mutations through these methods;
/// the store owns the data.
pub trait CartStore: Send + Sync {
    fn lines(&self) -> Vec<CartLine>;

    /// Sets the quantity of the matching line. A quantity of zero keeps the
    /// line in the cart.
    fn update_cart_item(&self, id: &str, quantity: u32, variant_key: Option<&str>);

    /// Lowers the quantity of the matching line to at most `max`, reading the
    /// current quantity under the same lock. Returns whether it changed.
    fn clamp_cart_item(&self, id: &str, max: u32, variant_key: Option<&str>) -> bool;

    fn remove_from_cart(&self, id: &str, variant_key: Option<&str>);
}

/// One cart inside the shared cart map.
#[derive(Clone)]
pub struct CartHandle {
    carts: Arc<DashMap<String, Vec<CartLine>>>,
    cart_id: String,
}

impl CartHandle {
    pub fn new(carts: Arc<DashMap<String, Vec<CartLine>>>, cart_id: impl Into<String>) -> Self {
        Self {
            carts,
            cart_id: cart_id.into(),
        }
    }

    pub fn cart_id(&self) -> &str {
        &self.cart_id
    }
}

impl CartStore for CartHandle {
    fn lines(&self) -> Vec<CartLine> {
        self.carts
            .get(&self.cart_id)
            .map(|lines| lines.value().clone())
            .unwrap_or_default()
    }

    fn update_cart_item(&self, id: &str, quantity: u32, variant_key: Option<&str>) {
        if let Some(mut lines) = self.carts.get_mut(&self.cart_id) {
            if let Some(line) = lines.iter_mut().find(|l| l.matches(id, variant_key)) {
                line.quantity = quantity;
            }
        }
    }

    fn clamp_cart_item(&self, id: &str, max: u32, variant_key: Option<&str>) -> bool {
        let Some(mut lines) = self.carts.get_mut(&self.cart_id) else {
            return false;
        };
        match lines.iter_mut().find(|l| l.matches(id, variant_key)) {
            Some(line) if line.quantity > max => {
                line.quantity = max;
                true
            }
            _ => false,
        }
    }

    fn remove_from_cart(&self, id: &str, variant_key: Option<&str>) {
        if let Some(mut lines) = self.carts.get_mut(&self.cart_id) {
            lines.retain(|l| !l.matches(id, variant_key));
        }
    }
}
