use crate::handlers::users::{delete_me, me, register, token, update_me};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn user_routes(state: AppState) -> Router {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/token", post(token))
        .route("/users/me", get(me).patch(update_me).delete(delete_me))
        .with_state(state)
}
