//! HTTP client for the remote catalog and stock services.
//!
//! # Endpoints
//!
//! - `GET  {base}/categories/{slug}` - category with facet definitions (404 if unknown)
//! - `POST {base}/products/search`   - body: [`SearchRequest`], answer: [`SearchPage`]
//! - `POST {base}/stock/lookup`      - body: `{ "ids": [...] }`, answer:
//!   `{ "error": bool, "items": [{ "id", "totalRest" }] }`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::{
    cart::stock::{StockApi, StockError, StockLevel},
    catalog::{
        api::{CatalogApi, SearchError},
        models::{Category, SearchPage, SearchRequest},
    },
};

#[derive(Serialize)]
struct StockLookupRequest<'a> {
    ids: &'a [String],
}

#[derive(Deserialize)]
struct StockLookupResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    items: Vec<StockLevel>,
}

/// Client for the catalog and stock services behind one base URL.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: Url) -> Self {
        Self {
            inner: Arc::new(HttpBackendInner {
                client: reqwest::Client::new(),
                base_url,
            }),
        }
    }

    /// `base_url` with `segments` appended as escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| format!("{} cannot be a base URL", self.inner.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl CatalogApi for HttpBackend {
    async fn category(&self, slug: &str) -> Result<Option<Category>, SearchError> {
        let url = self
            .endpoint(&["categories", slug])
            .map_err(SearchError::Url)?;

        let response = self.inner.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::error!(status = %status, slug, "Catalog returned non-success status");
            return Err(SearchError::Status(status.as_u16()));
        }

        Ok(Some(response.json().await?))
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchPage, SearchError> {
        let url = self
            .endpoint(&["products", "search"])
            .map_err(SearchError::Url)?;

        let response = self.inner.client.post(url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::error!(status = %status, "Product search returned non-success status");
            return Err(SearchError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StockApi for HttpBackend {
    async fn lookup(&self, ids: &[String]) -> Result<Vec<StockLevel>, StockError> {
        let url = self
            .endpoint(&["stock", "lookup"])
            .map_err(StockError::Url)?;

        let response = self
            .inner
            .client
            .post(url)
            .json(&StockLookupRequest { ids })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    StockError::Offline
                } else {
                    StockError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StockError::Status(status.as_u16()));
        }

        let body: StockLookupResponse = response.json().await?;
        if body.error {
            return Err(StockError::Rejected);
        }

        Ok(body.items)
    }
}
