//! Bearer-token gate: verifies the token and that its subject is still an active account.

use crate::auth::User;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// The caller behind a valid bearer token, with the scopes granted to that token.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub user: User,
    pub scopes: Vec<String>,
}

impl Authenticated {
    /// Fails with `Forbidden` unless the token was granted `scope`.
    pub fn require(&self, scope: &str) -> Result<(), AppError> {
        if self.scopes.iter().any(|s| s == scope) {
            Ok(())
        } else {
            tracing::debug!(username = %self.user.username, scope, "missing scope");
            Err(AppError::Forbidden(scope.to_string()))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let claims = state.tokens.verify(token)?;
        let user = state.users.active(&claims.sub).await?;
        if user.id != claims.uid {
            tracing::debug!(username = %claims.sub, "token issued to a previous holder of this username");
            return Err(AppError::InactiveAccount(claims.sub));
        }
        Ok(Authenticated {
            user,
            scopes: claims.scopes,
        })
    }
}
