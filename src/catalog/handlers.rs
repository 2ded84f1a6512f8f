//! Category browsing route handlers.

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{
    filter::{self, FilterAction, Navigation},
    models::{BrowseState, Product},
    sync::CategoryView,
};
use crate::{
    cart::helpers::{resolve_session_id, session_cookie, session_id},
    error::AppError,
    state::SharedState,
};

/// Creates routes for category browsing
pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/categories/:slug", get(browse_category))
        .route("/categories/:slug/filters", post(apply_filter))
}

/// Category page data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResponse {
    pub category: String,
    /// Canonical query for the state shown
    pub query: String,
    #[serde(flatten)]
    pub state: BrowseState,
    pub items: Vec<Product>,
    pub total_count: u64,
    pub loading: bool,
}

impl BrowseResponse {
    fn new(slug: &str, view: CategoryView) -> Self {
        Self {
            category: slug.to_string(),
            query: filter::encode(&view.state),
            state: view.state,
            items: view.items,
            total_count: view.total_count,
            loading: view.loading,
        }
    }
}

/// Input for the filter endpoint: the current query plus one action.
#[derive(Debug, Deserialize)]
pub struct FilterInput {
    #[serde(default)]
    pub query: String,
    #[serde(flatten)]
    pub action: FilterAction,
}

/// Endpoint: GET /categories/:slug
/// Decodes the query, searches if the filters changed and returns the view.
async fn browse_category(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (session_id, is_new_session) = resolve_session_id(&headers);
    let synchronizer = state.synchronizer(&session_id, &slug).await?;

    let outcome = synchronizer.navigate(query.as_deref().unwrap_or_default()).await;
    tracing::debug!(category = %slug, ?outcome, "Category navigation");

    let mut response = Json(BrowseResponse::new(&slug, synchronizer.snapshot())).into_response();
    if is_new_session {
        if let Some(cookie) = session_cookie(&session_id) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

/// Endpoint: POST /categories/:slug/filters
/// Applies a filter action to the given query and returns where to navigate.
async fn apply_filter(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(input): Json<FilterInput>,
) -> Result<Json<Navigation>, AppError> {
    match &input.action {
        FilterAction::SetPage { page: 0 } => {
            return Err(AppError::BadRequest("page must be positive".to_string()));
        }
        FilterAction::SetPriceRange { min, max }
            if min.is_some_and(|v| !v.is_finite()) || max.is_some_and(|v| !v.is_finite()) =>
        {
            return Err(AppError::BadRequest("price bounds must be finite".to_string()));
        }
        _ => {}
    }

    let session = session_id(&headers);
    let category = state.category(session.as_deref(), &slug).await?;
    let current = filter::decode(&input.query, &category);

    Ok(Json(filter::apply(&category, current, input.action)))
}
