//! Headless client core with an operational HTTP surface.
//!
//! Resolves the tenant for `TRIPDESK_HOST`, bootstraps auth against the
//! hosted backend and serves `/healthz`, `/readyz` and `/api/state`.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tripdesk::backend::{BackendClient, BackendConfig};
use tripdesk::cache::{CacheConfig, LocalCache, MemoryStorage};
use tripdesk::context::AppContext;
use tripdesk::server::{ServerConfig, ops_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run_with_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let backend_config = BackendConfig::from_env().context("backend config")?;
    let server_config = ServerConfig::from_env().context("server config")?;
    let cache_config = CacheConfig::from_env().context("cache config")?;

    let client = Arc::new(BackendClient::new(backend_config));
    let context = AppContext::new(LocalCache::new(Arc::new(MemoryStorage::new()), cache_config));

    context
        .tenant
        .resolve_tenant(client.as_ref(), server_config.host())
        .await;

    let mut bootstrap = context.auth_bootstrap(Arc::clone(&client), Arc::clone(&client));
    let app = ops_routes(Arc::clone(&client), context.clone(), bootstrap.watch_phase());
    bootstrap.start().await;

    let addr = server_config.bind();
    tracing::info!(%addr, host = server_config.host(), "tripdesk server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {
            tracing::info!("Shutdown requested");
        }
    }

    bootstrap.shutdown();
    Ok(())
}
