//! Account endpoints: registration, password-grant tokens and self-service.

use crate::auth::{mask_scopes, parse_scopes, RegisterRequest, UserPatch, UserView};
use crate::error::AppError;
use crate::extractors::Authenticated;
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    Form, Json,
};
use serde::{Deserialize, Serialize};

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let user = state.users.register(req).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// OAuth2 password-grant form.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub grant_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// Issues a token holding the requested scopes the account is permitted; others are dropped.
pub async fn token(
    State(state): State<AppState>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Form(form) = form?;
    if let Some(grant) = form.grant_type.as_deref().filter(|g| !g.is_empty()) {
        if grant != "password" {
            return Err(AppError::BadRequest(format!("unsupported grant_type {}", grant)));
        }
    }
    let user = state.users.authenticate(&form.username, &form.password).await?;
    let granted = mask_scopes(&parse_scopes(&form.scope), &user.scopes);
    tracing::info!(username = %user.username, scopes = ?granted, "token issued");
    let access_token = state.tokens.issue(user.id, &user.username, granted.clone())?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        expires_in: state.tokens.ttl_secs(),
        scope: granted.join(" "),
    }))
}

pub async fn me(auth: Authenticated) -> Json<UserView> {
    Json(UserView::from(&auth.user))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: Authenticated,
    body: Result<Json<UserPatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(patch) = body?;
    let user = state.users.update_self(&auth.user, patch).await?;
    Ok((StatusCode::ACCEPTED, Json(UserView::from(&user))))
}

pub async fn delete_me(State(state): State<AppState>, auth: Authenticated) -> Result<StatusCode, AppError> {
    state.users.delete_self(&auth.user).await?;
    Ok(StatusCode::NO_CONTENT)
}
