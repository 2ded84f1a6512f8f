//! Shopping Cart Domain Module
//!
//! This module contains all shopping cart business logic, including:
//! - Domain models (CartLine, inputs, responses)
//! - Business logic helpers (cart operations, sessions, formatting)
//! - The cart store contract and its in-memory implementation
//! - Stock lookup and availability reconciliation
//! - REST API handlers

pub mod handlers;
pub mod helpers;
pub mod models;
pub mod reconciler;
pub mod stock;
pub mod store;

// Re-export commonly used types for convenience
pub use handlers::routes;
pub use reconciler::{AvailabilityMap, AvailabilityReconciler, MerchantType};
pub use store::{CartHandle, CartStore};
