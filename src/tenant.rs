//! Tenant resolution from the hosting domain.
//!
//! A tenant is resolved at most once per store lifetime. Callers that arrive
//! while a lookup is in flight wait for it instead of issuing their own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::traits::TenantDirectory;
use crate::types::TenantId;

/// Visual identity of a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Branding {
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub custom_css: Option<String>,
}

impl Branding {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_primary_color(mut self, color: impl Into<String>) -> Self {
        self.primary_color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_secondary_color(mut self, color: impl Into<String>) -> Self {
        self.secondary_color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_logo_url(mut self, url: impl Into<String>) -> Self {
        self.logo_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_custom_css(mut self, css: impl Into<String>) -> Self {
        self.custom_css = Some(css.into());
        self
    }
}

/// Row from `tenants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub branding: Option<Branding>,
}

impl Tenant {
    #[must_use]
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            slug: None,
            plan: None,
            branding: None,
        }
    }

    #[must_use]
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    #[must_use]
    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = Some(branding);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantState {
    Unresolved,
    Loading,
    /// `None` when the domain maps to no tenant or the lookup failed.
    Resolved(Option<Arc<Tenant>>),
}

/// Lowercase, drop the port and a leading `www.`.
///
/// IPv6 literals lose their brackets: `[::1]:8080` becomes `::1`.
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    let host = match host.strip_prefix('[') {
        Some(rest) => rest.split_once(']').map_or(rest, |(addr, _)| addr),
        // Bare IPv6 literal, no port to strip.
        None if host.matches(':').count() > 1 => host.as_str(),
        None => host.split(':').next().unwrap_or_default(),
    };
    host.strip_prefix("www.").unwrap_or(host).to_owned()
}

#[derive(Debug)]
pub struct TenantStore {
    state: watch::Sender<TenantState>,
}

impl Default for TenantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(TenantState::Unresolved),
        }
    }

    /// Resolve the tenant serving `host`.
    ///
    /// The first call performs the lookup; later and concurrent calls return
    /// the same result. Lookup failures are logged and resolve to `None`.
    pub async fn resolve_tenant<T: TenantDirectory>(
        &self,
        directory: &T,
        host: &str,
    ) -> Option<Arc<Tenant>> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == TenantState::Unresolved {
                *state = TenantState::Loading;
                true
            } else {
                false
            }
        });

        if !claimed {
            return self.wait_resolved().await;
        }

        let domain = normalize_host(host);
        let tenant = match directory.find_tenant_by_domain(&domain).await {
            Ok(Some(tenant)) => {
                tracing::info!(domain = %domain, tenant_id = %tenant.id, "Tenant resolved");
                Some(Arc::new(tenant))
            }
            Ok(None) => {
                tracing::warn!(domain = %domain, "No tenant configured for domain");
                None
            }
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Tenant lookup failed");
                None
            }
        };

        self.state.send_replace(TenantState::Resolved(tenant.clone()));
        tenant
    }

    async fn wait_resolved(&self) -> Option<Arc<Tenant>> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, TenantState::Resolved(_)))
            .await;
        match state.as_deref() {
            Ok(TenantState::Resolved(tenant)) => tenant.clone(),
            _ => None,
        }
    }

    #[must_use]
    pub fn state(&self) -> TenantState {
        self.state.borrow().clone()
    }

    /// True until resolution has finished. Rendering waits on this.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        !matches!(*self.state.borrow(), TenantState::Resolved(_))
    }

    #[must_use]
    pub fn tenant(&self) -> Option<Arc<Tenant>> {
        match &*self.state.borrow() {
            TenantState::Resolved(tenant) => tenant.clone(),
            _ => None,
        }
    }

    #[must_use]
    pub fn branding(&self) -> Option<Branding> {
        self.tenant().and_then(|t| t.branding.clone())
    }

    /// Observe resolution; the branding applier follows this.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TenantState> {
        self.state.subscribe()
    }

    pub fn reset(&self) {
        self.state.send_replace(TenantState::Unresolved);
    }
}
