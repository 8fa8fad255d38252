use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, AuthPrincipal, JsonBody};
use crate::domain::aggregates::{Account, AccountPatch, NewAccount, Role};
use crate::services::Session;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub role: Role,
    #[serde(flatten)]
    pub account: NewAccount,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub role: Option<Role>,
}

pub async fn signup_admin(State(s): State<AppState>, JsonBody(r): JsonBody<NewAccount>) -> Result<(StatusCode, Json<Account>)> {
    let account = s.services.accounts.signup_admin(r).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn login(State(s): State<AppState>, JsonBody(r): JsonBody<Credentials>) -> Result<Json<Session>> {
    s.services.accounts.login(&r.email, &r.password).await.map(Json)
}

pub async fn create_account(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    JsonBody(r): JsonBody<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>)> {
    let account = s.services.accounts.create_account(&p, r.role, r.account).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list_accounts(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Query(q): Query<AccountQuery>,
) -> Result<Json<Vec<Account>>> {
    s.services.accounts.list_accounts(&p, q.role).await.map(Json)
}

pub async fn managed_accounts(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal) -> Result<Json<Vec<Account>>> {
    s.services.accounts.managed_accounts(&p).await.map(Json)
}

pub async fn get_account(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<Json<Account>> {
    p.require_owner_or_admin(id)?;
    s.services.accounts.get_account(id).await.map(Json)
}

pub async fn update_account(
    State(s): State<AppState>,
    AuthPrincipal(p): AuthPrincipal,
    Path(id): Path<Uuid>,
    JsonBody(r): JsonBody<AccountPatch>,
) -> Result<Json<Account>> {
    s.services.accounts.update_account(&p, id, r).await.map(Json)
}

pub async fn delete_account(State(s): State<AppState>, AuthPrincipal(p): AuthPrincipal, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services.accounts.delete_account(&p, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
