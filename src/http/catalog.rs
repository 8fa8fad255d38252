use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, AuthPrincipal, JsonBody};
use crate::domain::aggregates::{Item, ItemDraft, ItemPatch};
use crate::domain::value_objects::Category;
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryQuery {
    pub company_name: Option<String>,
    pub product_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
}

pub async fn list_items(State(s): State<AppState>, Query(q): Query<CategoryQuery>) -> Result<Json<Vec<Item>>> {
    let items = match (q.company_name, q.product_name) {
        (Some(company), Some(product)) => s.services.catalog.list_by_category(&Category::new(company, product)).await?,
        (None, None) => s.services.catalog.list_items().await?,
        _ => return Err(CommerceError::InvalidInput("companyName and productName go together".into())),
    };
    Ok(Json(items))
}

pub async fn get_item(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Item>> {
    s.services.catalog.get_item(id).await.map(Json)
}

pub async fn create_item(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    JsonBody(r): JsonBody<ItemDraft>,
) -> Result<(StatusCode, Json<Item>)> {
    let item = s.services.catalog.create_item(&p, r).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<ItemPatch>,
) -> Result<Json<Item>> {
    s.services.catalog.update_item(&p, id, r).await.map(Json)
}

pub async fn adjust_stock(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<StockAdjustment>,
) -> Result<Json<Item>> {
    s.services.catalog.adjust_quantity(&p, id, r.delta).await.map(Json)
}

pub async fn delete_item(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    Query(q): Query<DeleteQuery>,
) -> Result<StatusCode> {
    s.services.catalog.delete_item(&p, id, q.status.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
