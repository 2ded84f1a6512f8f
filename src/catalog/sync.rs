//! Filter-state synchronizer for one category view.
//!
//! Each navigation decodes the URL query. A decoded state that differs from
//! the last dispatched one triggers exactly one search; a newer navigation
//! supersedes any search still in flight, and only the latest dispatch may
//! write to the view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::{
    api::CatalogApi,
    filter,
    models::{BrowseState, Category, FilterState, Product, SearchPage, SearchRequest},
};
use crate::token::RequestToken;

/// What the view currently shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub state: BrowseState,
    pub items: Vec<Product>,
    pub total_count: u64,
    /// A search for a newer state is in flight.
    pub loading: bool,
}

/// Result of a single [`FilterSynchronizer::navigate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Decoded state equals the last dispatched one; nothing fetched.
    Unchanged,
    /// Search result (or its empty fallback) was applied to the view.
    Applied,
    /// A newer navigation or a teardown happened first; result discarded.
    Superseded,
}

#[derive(Debug)]
struct SyncInner {
    dispatched: Option<BrowseState>,
    token: Option<RequestToken>,
    view: CategoryView,
}

/// Keeps one category view in agreement with its URL.
pub struct FilterSynchronizer {
    api: Arc<dyn CatalogApi>,
    category: Category,
    inner: Mutex<SyncInner>,
}

impl FilterSynchronizer {
    pub fn new(api: Arc<dyn CatalogApi>, category: Category) -> Self {
        let view = CategoryView {
            state: BrowseState::new(FilterState::for_category(&category.id)),
            items: Vec::new(),
            total_count: 0,
            loading: false,
        };

        Self {
            api,
            category,
            inner: Mutex::new(SyncInner {
                dispatched: None,
                token: None,
                view,
            }),
        }
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles a URL change for this category.
    pub async fn navigate(&self, query: &str) -> SyncOutcome {
        let decoded = filter::decode(query, &self.category);

        let pending = {
            let mut inner = self.lock();
            if inner.dispatched.as_ref() == Some(&decoded) {
                return SyncOutcome::Unchanged;
            }
            if let Some(previous) = inner.token.take() {
                previous.cancel();
            }
            let token = RequestToken::new();
            inner.token = Some(token.clone());
            inner.dispatched = Some(decoded.clone());
            inner.view.loading = true;
            PendingSearch {
                sync: self,
                token,
                settled: false,
            }
        };

        tracing::debug!(
            category = %self.category.slug,
            query = %filter::encode(&decoded),
            "Dispatching category search"
        );

        let result = self.api.search(SearchRequest::from(&decoded)).await;

        let mut inner = self.lock();
        if !pending.token.is_current(inner.token.as_ref()) {
            tracing::debug!(category = %self.category.slug, "Discarding superseded search result");
            return SyncOutcome::Superseded;
        }
        pending.settle();

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(
                    category = %self.category.slug,
                    error = %e,
                    "Category search failed, showing no results"
                );
                // Navigating to the same URL again is the only way to retry.
                inner.dispatched = None;
                SearchPage::default()
            }
        };

        inner.view = CategoryView {
            state: decoded,
            items: page.items,
            total_count: page.total_count,
            loading: false,
        };
        SyncOutcome::Applied
    }

    /// Current view.
    pub fn snapshot(&self) -> CategoryView {
        self.lock().view.clone()
    }

    /// Detaches the view: any search still in flight will not be applied.
    pub fn teardown(&self) {
        if let Some(token) = self.lock().token.take() {
            token.cancel();
        }
    }
}

/// A dispatched search whose result has not been applied yet.
///
/// If the navigation is dropped before it settles (e.g. the client went
/// away), the view stops loading and the dispatched state is forgotten so the
/// same URL fetches again.
struct PendingSearch<'a> {
    sync: &'a FilterSynchronizer,
    token: RequestToken,
    settled: bool,
}

impl PendingSearch<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingSearch<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.sync.lock();
        if self.token.is_current(inner.token.as_ref()) {
            tracing::debug!(category = %self.sync.category.slug, "Category search abandoned");
            inner.token = None;
            inner.dispatched = None;
            inner.view.loading = false;
        }
    }
}
