//! Remote catalog collaborator.

use async_trait::async_trait;
use thiserror::Error;

use super::models::{Category, SearchPage, SearchRequest};

/// Errors that can occur when talking to the catalog service.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog answered with a non-success status.
    #[error("Catalog returned status {0}")]
    Status(u16),

    /// Request URL could not be built.
    #[error("Invalid catalog URL: {0}")]
    Url(String),
}

/// Category and product search endpoints.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Category definition including its facets, or `None` if unknown.
    async fn category(&self, slug: &str) -> Result<Option<Category>, SearchError>;

    /// One page of products matching `request`.
    async fn search(&self, request: SearchRequest) -> Result<SearchPage, SearchError>;
}
