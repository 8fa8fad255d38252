use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, AuthPrincipal, JsonBody};
use crate::domain::aggregates::Cart;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    pub item_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineRequest {
    pub quantity: i64,
}

pub async fn get_cart(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<Json<Cart>> {
    s.services.carts.get_or_create_cart(&p, id).await.map(Json)
}

pub async fn add_line(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<AddLineRequest>,
) -> Result<Json<Cart>> {
    s.services.carts.add_line(&p, id, r.item_id, r.quantity).await.map(Json)
}

pub async fn update_line(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
    JsonBody(r): JsonBody<UpdateLineRequest>,
) -> Result<Json<Cart>> {
    s.services.carts.update_line(&p, id, line_id, r.quantity).await.map(Json)
}

pub async fn remove_line(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Cart>> {
    s.services.carts.remove_line(&p, id, line_id).await.map(Json)
}

pub async fn clear_cart(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<Json<Cart>> {
    s.services.carts.clear(&p, id).await.map(Json)
}
