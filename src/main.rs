//! farm-api server. Settings come from the environment (and `.env`).

use farm_api::{build_router, init_state, load_catalog, resolve, DocumentStore, MemoryStore, PgDocumentStore, Settings, StoreKind};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("farm_api=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let catalog = resolve(&load_catalog(settings.catalog_path.as_deref()).await?)?;
    tracing::info!(resources = catalog.resources.len(), "catalog loaded");

    let store: Arc<dyn DocumentStore> = match settings.store {
        StoreKind::Postgres => Arc::new(
            PgDocumentStore::connect(&settings.database_url, settings.database_max_connections, &settings.schema)
                .await?,
        ),
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let state = init_state(&settings, catalog, store).await?;
    let app = build_router(state, settings.max_body_bytes);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("farm-api listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
