//! Shopping Cart Business Logic Helpers
//!
//! This module contains helper functions for cart operations, sessions and
//! formatting.

use axum::http::{header, HeaderMap, HeaderValue};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::models::CartLine;

/// Name of the cookie carrying the browsing session.
pub const SESSION_COOKIE: &str = "cart_session";

/// Session id carried by the `cart_session` cookie, if any.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Returns the session id from the `cart_session` cookie, or a fresh one.
///
/// The flag is `true` when the session was just created and the cookie still
/// needs to be set on the response.
pub fn resolve_session_id(headers: &HeaderMap) -> (String, bool) {
    match session_id(headers) {
        Some(session_id) => (session_id, false),
        None => (Uuid::new_v4().simple().to_string(), true),
    }
}

/// `Set-Cookie` value for a new session.
pub fn session_cookie(session_id: &str) -> Option<HeaderValue> {
    let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly");
    HeaderValue::from_str(&cookie).ok()
}

/// Returns the provided `cart_id`, falling back to the session's cart.
///
/// This guarantees that every cart operation works with a non-empty identifier.
pub fn get_or_default_cart_id(cart_id: Option<String>, session_id: &str) -> String {
    cart_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| session_id.to_string())
}

/// Merges `new_lines` into `cart`, aggregating quantities for lines with the
/// same product and variant and appending brand new ones.
///
/// Only the quantity of an existing line changes; its price and display
/// fields are kept.
pub fn update_cart_with_new_items(cart: &mut Vec<CartLine>, new_lines: Vec<CartLine>) {
    for incoming in new_lines {
        if let Some(existing) = cart
            .iter_mut()
            .find(|line| line.matches(&incoming.id, incoming.variant_key.as_deref()))
        {
            existing.quantity = existing.quantity.saturating_add(incoming.quantity);
        } else {
            cart.push(incoming);
        }
    }
}

/// Distinct product ids referenced by `lines`, in sorted order.
pub fn distinct_product_ids(lines: &[CartLine]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn subtotal(lines: &[CartLine]) -> f64 {
    lines.iter().map(CartLine::line_total).sum()
}

pub fn total_savings(lines: &[CartLine]) -> f64 {
    lines.iter().map(CartLine::savings).sum()
}

/// Produces a human-readable one-line summary for a list of cart lines.
///
/// Example output: `"2x Runner, 1x Sock (navy)"`.
pub fn format_item_summary(lines: &[CartLine]) -> String {
    lines
        .iter()
        .map(|line| match &line.variant_key {
            Some(variant) => format!("{}x {} ({})", line.quantity, line.name, variant),
            None => format!("{}x {}", line.quantity, line.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
