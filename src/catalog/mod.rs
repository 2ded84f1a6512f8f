//! Catalog Browsing Module
//!
//! This module contains category browsing, including:
//! - Catalog models (categories, facets, filter state, search request/response)
//! - The URL codec and filter actions
//! - The filter-state synchronizer that keeps a view in step with its URL
//! - The remote catalog contract
//! - REST API handlers

pub mod api;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod sync;

// Re-export commonly used types and functions
pub use api::CatalogApi;
pub use handlers::routes;
pub use sync::FilterSynchronizer;
