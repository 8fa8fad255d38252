use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use super::AppState;
use crate::auth::Principal;
use crate::CommerceError;

/// Bearer-authenticated caller. The account is re-read on every request, so a
/// deleted account's tokens stop working immediately.
#[derive(Clone, Copy, Debug)]
pub struct AuthPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CommerceError::Unauthorized("missing bearer token".into()))?;
        let principal = state.services.accounts.authenticate(token).await?;
        Ok(Self(principal))
    }
}

/// JSON request body. Malformed bodies are answered like any other invalid input.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = CommerceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) =
            Json::<T>::from_request(req, state).await.map_err(|rejection| CommerceError::InvalidInput(rejection.body_text()))?;
        Ok(Self(value))
    }
}
