#![doc = include_str!("../README.md")]

#[cfg(feature = "backend")]
pub mod admin;
#[cfg(feature = "backend")]
pub mod backend;
pub mod bootstrap;
pub mod branding;
pub mod cache;
pub mod color;
pub mod context;
pub mod error;
pub mod permissions;
pub mod pkce;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod tenant;
pub mod token;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
#[cfg(feature = "backend")]
pub use backend::{BackendClient, BackendConfig};
pub use bootstrap::{AuthBootstrap, Phase};
pub use branding::{BrandingApplier, Document};
pub use cache::{CacheConfig, LocalCache};
pub use context::AppContext;
pub use error::Error;
pub use permissions::{PermissionSet, PermissionStore};
pub use session::SessionStore;
pub use tenant::{Branding, Tenant, TenantState, TenantStore};
pub use traits::{AuthProvider, AuthSubscription, TenantDirectory, UserDirectory};
pub use types::{
    AuthEvent, AuthEventKind, AuthUser, Permission, Profile, Role, Session, TenantId, UserId,
};
