//! Operational HTTP surface for a running client core.
//!
//! ```rust,ignore
//! use tripdesk::server::{ServerConfig, ops_routes};
//!
//! let config = ServerConfig::from_env()?;
//! let app = ops_routes(client.clone(), context.clone(), bootstrap.watch_phase());
//! let listener = tokio::net::TcpListener::bind(config.bind()).await?;
//! axum::serve(listener, app).await?;
//! ```

mod config;
mod error;
mod probe;
mod routes;
mod state;

pub use config::ServerConfig;
pub use error::ServerError;
pub use probe::HealthProbe;
pub use routes::{StateSnapshot, ops_routes};
