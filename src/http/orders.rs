use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, AuthPrincipal, JsonBody};
use crate::domain::aggregates::Order;
use crate::services::{Checkout, LineRequest, PlaceOrder, StatusChange};
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub account: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LinesCorrection {
    pub lines: Vec<LineRequest>,
}

pub async fn place_order(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = s.services.orders.place_order(&p, id, r).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn checkout_cart(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<Checkout>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = s.services.orders.place_order_from_cart(&p, id, r).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_account_orders(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>> {
    s.services.orders.list_orders(&p, Some(id)).await.map(Json)
}

pub async fn list_orders(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Query(q): Query<OrderQuery>,
) -> Result<Json<Vec<Order>>> {
    s.services.orders.list_orders(&p, q.account).await.map(Json)
}

pub async fn get_order(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    s.services.orders.get_order(&p, id).await.map(Json)
}

pub async fn update_lines(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<LinesCorrection>,
) -> Result<Json<Order>> {
    s.services.orders.update_order_lines(&p, id, &r.lines).await.map(Json)
}

pub async fn change_status(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<StatusChange>,
) -> Result<Json<Order>> {
    s.services.orders.transition_status(&p, id, &r).await.map(Json)
}

pub async fn cancel_order(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    s.services.orders.cancel_order(&p, id).await.map(Json)
}

pub async fn purge_order(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services.orders.purge_order(&p, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
