//! REST API handlers for shopping cart operations
//!
//! This module implements HTTP endpoints for cart synchronization, line
//! updates, availability and checkout.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::{helpers::*, models::*, store::CartStore};
use crate::{error::AppError, state::SharedState};

/// Creates routes for cart-related operations
pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/sync_cart", post(sync_cart))
        .route("/add_to_cart", post(add_to_cart))
        .route("/update_cart_item", post(update_cart_item))
        .route("/remove_from_cart", post(remove_from_cart))
        .route("/checkout", post(checkout))
        .route("/carts/:cart_id", get(show_cart))
        .route("/carts/:cart_id/refresh", post(refresh_cart))
}

/// Wraps `body` and sets the session cookie when the session is new.
fn with_session(body: impl IntoResponse, session_id: &str, is_new_session: bool) -> Response {
    let mut response = body.into_response();
    if is_new_session {
        if let Some(cookie) = session_cookie(session_id) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

fn cart_view(state: &SharedState, cart_id: &str) -> Result<CartView, AppError> {
    let items = state
        .carts
        .get(cart_id)
        .map(|lines| lines.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("cart {cart_id}")))?;

    let availability = state
        .reconciler(cart_id)
        .map(|reconciler| reconciler.availability())
        .unwrap_or_default();

    Ok(CartView {
        cart_id: cart_id.to_string(),
        subtotal: subtotal(&items),
        savings: total_savings(&items),
        items,
        availability,
        availability_checked: state.merchant_type.checks_availability(),
    })
}

/// Endpoint: POST /sync_cart
/// Updates the backend state to match the frontend state exactly.
async fn sync_cart(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<AddToCartInput>,
) -> Response {
    let (session_id, is_new_session) = resolve_session_id(&headers);
    let cart_id = get_or_default_cart_id(payload.cart_id, &session_id);

    tracing::debug!(cart_id = %cart_id, lines = payload.items.len(), "Syncing cart");
    state.carts.insert(cart_id.clone(), payload.items);
    state.cart_changed(&cart_id);

    let body = Json(SyncResponse {
        status: "updated".to_string(),
        cart_id,
    });
    with_session(body, &session_id, is_new_session)
}

/// Endpoint: POST /add_to_cart
/// Merges lines into the cart, aggregating quantities of matching lines.
async fn add_to_cart(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<AddToCartInput>,
) -> Response {
    let (session_id, is_new_session) = resolve_session_id(&headers);
    let cart_id = get_or_default_cart_id(payload.cart_id, &session_id);

    {
        let mut cart = state.carts.entry(cart_id.clone()).or_default();
        update_cart_with_new_items(&mut cart, payload.items);
    }
    state.cart_changed(&cart_id);

    let body = Json(SyncResponse {
        status: "updated".to_string(),
        cart_id,
    });
    with_session(body, &session_id, is_new_session)
}

/// Endpoint: POST /update_cart_item
async fn update_cart_item(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CartItemInput>,
) -> Result<Json<CartView>, AppError> {
    let (session_id, _) = resolve_session_id(&headers);
    let cart_id = get_or_default_cart_id(payload.cart_id, &session_id);

    state.cart_handle(&cart_id).update_cart_item(
        &payload.id,
        payload.quantity,
        payload.variant_key.as_deref(),
    );
    state.cart_changed(&cart_id);
    Ok(Json(cart_view(&state, &cart_id)?))
}

/// Endpoint: POST /remove_from_cart
async fn remove_from_cart(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CartItemInput>,
) -> Result<Json<CartView>, AppError> {
    let (session_id, _) = resolve_session_id(&headers);
    let cart_id = get_or_default_cart_id(payload.cart_id, &session_id);

    state
        .cart_handle(&cart_id)
        .remove_from_cart(&payload.id, payload.variant_key.as_deref());
    Ok(Json(cart_view(&state, &cart_id)?))
}

/// Endpoint: GET /carts/:cart_id
async fn show_cart(
    State(state): State<SharedState>,
    Path(cart_id): Path<String>,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(cart_view(&state, &cart_id)?))
}

/// Endpoint: POST /carts/:cart_id/refresh
/// Runs one availability cycle now instead of waiting for the next tick.
async fn refresh_cart(
    State(state): State<SharedState>,
    Path(cart_id): Path<String>,
) -> Result<Json<CartView>, AppError> {
    if !state.carts.contains_key(&cart_id) {
        return Err(AppError::NotFound(format!("cart {cart_id}")));
    }

    if let Some(reconciler) = state.reconciler(&cart_id) {
        let outcome = reconciler.refresh().await;
        tracing::debug!(cart_id = %cart_id, ?outcome, "Availability refreshed");
    }

    Ok(Json(cart_view(&state, &cart_id)?))
}

/// Endpoint: POST /checkout
/// Processes checkout from the cart
async fn checkout(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutInput>,
) -> Response {
    let (session_id, is_new_session) = resolve_session_id(&headers);
    let cart_id = get_or_default_cart_id(payload.cart_id, &session_id);

    state.unmount_reconciler(&cart_id);
    if let Some((_, items)) = state.carts.remove(&cart_id) {
        tracing::info!(
            cart_id = %cart_id,
            items = %format_item_summary(&items),
            subtotal = subtotal(&items),
            "Checkout"
        );
    }

    let body = Json(SyncResponse {
        status: "checked_out".to_string(),
        cart_id,
    });
    with_session(body, &session_id, is_new_session)
}

