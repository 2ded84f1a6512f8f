//! Storefront Sync Library
//!
//! This library keeps storefront views consistent with their sources of truth:
//! category pages with the filters encoded in their URL, and carts with the
//! live stock of the merchant.

// Domain modules
pub mod cart;
pub mod catalog;

// Shared building blocks
pub mod retry;
pub mod token;

// Infrastructure
pub mod backend;
pub mod config;
pub mod error;
pub mod router;
pub mod state;
