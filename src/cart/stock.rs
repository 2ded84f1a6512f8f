//! Remote stock lookup collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::Retryable;

/// Available quantity reported for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub id: String,
    /// May be negative when the merchant oversold.
    pub total_rest: i64,
}

/// Errors that can occur during a stock lookup.
#[derive(Debug, Error)]
pub enum StockError {
    /// Service answered with its error flag set.
    #[error("Stock service rejected the lookup")]
    Rejected,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status.
    #[error("Stock service returned status {0}")]
    Status(u16),

    #[error("Stock lookup timed out after {0:?}")]
    Timeout(Duration),

    /// No network connectivity.
    #[error("Network unavailable")]
    Offline,

    /// Request URL could not be built.
    #[error("Invalid stock service URL: {0}")]
    Url(String),
}

impl Retryable for StockError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected | Self::Http(_) | Self::Timeout(_) => true,
            Self::Status(status) => *status >= 500 || *status == 429,
            Self::Offline | Self::Url(_) => false,
        }
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout(after)
    }
}

/// Bulk stock lookup endpoint.
#[async_trait]
pub trait StockApi: Send + Sync {
    async fn lookup(&self, ids: &[String]) -> Result<Vec<StockLevel>, StockError>;
}
