//! Route assembly.

pub mod common;
pub mod resource;
pub mod users;

pub use common::common_routes;
pub use resource::resource_routes;
pub use users::user_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// The whole API: common, user and resource routes, with a body size limit and request tracing.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(user_routes(state.clone()))
        .merge(resource_routes(state))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}
