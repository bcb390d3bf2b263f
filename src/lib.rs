//! Farm API: catalog-driven REST resources over a JSON document store, with scoped bearer auth.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{default_catalog, load_catalog, resolve, ResolvedCatalog, ResolvedResource, Settings, StoreKind};
pub use error::{AppError, ConfigError, StoreError};
pub use routes::build_router;
pub use service::CrudService;
pub use state::AppState;
pub use store::{DocumentStore, MemoryStore, PgDocumentStore};

use auth::{TokenManager, UserService};
use std::sync::Arc;

/// Wire services over `store` and prepare every collection (catalog and users).
pub async fn init_state(
    settings: &Settings,
    catalog: ResolvedCatalog,
    store: Arc<dyn DocumentStore>,
) -> Result<AppState, AppError> {
    let crud = CrudService::new(store.clone(), settings.date_range_mode);
    crud.ensure_collections(&catalog).await?;
    let users = UserService::new(store.clone(), settings.default_user_scopes.clone());
    users.ensure_collection().await?;
    if let (Some(username), Some(password)) = (&settings.admin_username, &settings.admin_password) {
        users.bootstrap_admin(username, password, catalog.all_scopes()).await?;
    }
    Ok(AppState {
        store,
        catalog: Arc::new(catalog),
        crud,
        users,
        tokens: Arc::new(TokenManager::new(&settings.jwt_secret, settings.access_token_ttl_secs)),
    })
}
