//! Resource routes built from the catalog.
//! Parameterized paths pass the segment to handlers, which resolve the resource by path.

use crate::handlers::resource::{create, delete, list, purge, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create).delete(purge))
        .route("/:path_segment/:id", get(read).patch(update).delete(delete))
        .with_state(state)
}
