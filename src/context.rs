use std::sync::Arc;

use crate::bootstrap::AuthBootstrap;
use crate::cache::LocalCache;
use crate::permissions::PermissionStore;
use crate::session::SessionStore;
use crate::tenant::TenantStore;
use crate::traits::{AuthProvider, UserDirectory};

/// Composition root: one instance of every client-state container.
///
/// Clone it freely; clones share the same stores.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub session: Arc<SessionStore>,
    pub permissions: Arc<PermissionStore>,
    pub tenant: Arc<TenantStore>,
    pub cache: Arc<LocalCache>,
}

impl AppContext {
    #[must_use]
    pub fn new(cache: LocalCache) -> Self {
        Self {
            session: Arc::new(SessionStore::new()),
            permissions: Arc::new(PermissionStore::new()),
            tenant: Arc::new(TenantStore::new()),
            cache: Arc::new(cache),
        }
    }

    /// Context backed by an in-memory cache.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(LocalCache::in_memory())
    }

    /// Build the bootstrap sequencer wired to this context's stores.
    #[must_use]
    pub fn auth_bootstrap<P: AuthProvider, D: UserDirectory>(
        &self,
        provider: Arc<P>,
        directory: Arc<D>,
    ) -> AuthBootstrap<P, D> {
        AuthBootstrap::new(
            provider,
            directory,
            Arc::clone(&self.session),
            Arc::clone(&self.permissions),
        )
    }

    /// Return every store to its initial state. Cached entries are kept.
    pub fn reset(&self) {
        self.session.reset();
        self.permissions.clear();
        self.tenant.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::Phase;
    use crate::permissions::PermissionSet;
    use crate::testing::{FakeDirectory, FakeProvider, FakeTenants, session_for};
    use crate::tenant::Tenant;
    use crate::types::Permission;

    #[tokio::test]
    async fn bootstrap_shares_context_stores() {
        let ctx = AppContext::in_memory();
        let directory = FakeDirectory::new().with_permissions("u1", &["audit.view"]);
        let mut bootstrap = ctx.auth_bootstrap(
            Arc::new(FakeProvider::new(Some(session_for("u1")))),
            Arc::new(directory),
        );
        bootstrap.start().await;

        assert_eq!(bootstrap.phase(), Phase::Ready);
        let clone = ctx.clone();
        assert!(clone.permissions.has_permission("audit.view"));
        assert!(!clone.session.is_loading());
    }

    #[tokio::test]
    async fn reset_clears_state_but_keeps_cache() {
        let ctx = AppContext::in_memory();
        ctx.session.set_session(Some(session_for("u1")));
        ctx.session.set_loading(false);
        ctx.permissions
            .set(PermissionSet::new("u1".into(), [Permission::from("audit.view")]));
        let tenants = FakeTenants::new().with_tenant("a.example", Tenant::new("t1", "A"));
        ctx.tenant.resolve_tenant(&tenants, "a.example").await;
        ctx.cache.set("k", &1);

        ctx.reset();

        assert!(ctx.session.session().is_none());
        assert!(ctx.session.is_loading());
        assert!(ctx.permissions.is_empty());
        assert!(ctx.tenant.tenant().is_none());
        assert_eq!(ctx.cache.get::<i32>("k"), Some(1));
    }
}
