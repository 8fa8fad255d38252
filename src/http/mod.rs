//! REST surface. Handlers stay thin: extract, call one service operation, wrap the result.

mod accounts;
mod carts;
mod catalog;
pub mod error;
pub mod extract;
mod orders;

use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::services::Services;

pub use extract::{AuthPrincipal, JsonBody};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "orderdesk"})) }))
        .route("/api/v1/auth/signup", post(accounts::signup_admin))
        .route("/api/v1/auth/login", post(accounts::login))
        .route("/api/v1/accounts", get(accounts::list_accounts).post(accounts::create_account))
        .route("/api/v1/accounts/managed", get(accounts::managed_accounts))
        .route(
            "/api/v1/accounts/:id",
            get(accounts::get_account).patch(accounts::update_account).delete(accounts::delete_account),
        )
        .route("/api/v1/accounts/:id/cart", get(carts::get_cart).delete(carts::clear_cart))
        .route("/api/v1/accounts/:id/cart/lines", post(carts::add_line))
        .route("/api/v1/accounts/:id/cart/lines/:line_id", patch(carts::update_line).delete(carts::remove_line))
        .route("/api/v1/accounts/:id/orders", get(orders::list_account_orders).post(orders::place_order))
        .route("/api/v1/accounts/:id/orders/checkout", post(orders::checkout_cart))
        .route("/api/v1/items", get(catalog::list_items).post(catalog::create_item))
        .route(
            "/api/v1/items/:id",
            get(catalog::get_item).patch(catalog::update_item).delete(catalog::delete_item),
        )
        .route("/api/v1/items/:id/stock", post(catalog::adjust_stock))
        .route("/api/v1/orders", get(orders::list_orders))
        .route("/api/v1/orders/:id", get(orders::get_order).delete(orders::purge_order))
        .route("/api/v1/orders/:id/lines", patch(orders::update_lines))
        .route("/api/v1/orders/:id/status", post(orders::change_status))
        .route("/api/v1/orders/:id/cancel", post(orders::cancel_order))
        .with_state(state)
}
