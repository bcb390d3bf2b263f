//! Shared application state for all routes. Cloned per request; holds `Arc`s only.

use crate::auth::{TokenManager, UserService};
use crate::config::ResolvedCatalog;
use crate::service::CrudService;
use crate::store::DocumentStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub catalog: Arc<ResolvedCatalog>,
    pub crud: CrudService,
    pub users: UserService,
    pub tokens: Arc<TokenManager>,
}
