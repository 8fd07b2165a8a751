//! In-memory fakes for the provider traits, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::Error;
use crate::tenant::Tenant;
use crate::traits::{AuthProvider, AuthSubscription, TenantDirectory, UserDirectory};
use crate::types::{AuthEvent, AuthEventKind, AuthUser, Permission, Profile, Role, Session, UserId};

pub(crate) fn session_for(user_id: &str) -> Session {
    Session::new(format!("token-{user_id}"), i64::MAX, AuthUser::new(user_id))
}

fn unavailable(operation: &'static str) -> Error {
    Error::Backend {
        operation,
        status: Some(503),
        detail: "unavailable".into(),
    }
}

pub(crate) struct FakeProvider {
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    emit_initial: bool,
    get_session_calls: AtomicUsize,
    fail: bool,
}

impl FakeProvider {
    pub(crate) fn new(session: Option<Session>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(session),
            events,
            emit_initial: true,
            get_session_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub(crate) fn without_initial_event(mut self) -> Self {
        self.emit_initial = false;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        *self.session.lock() = event.session.clone();
        let _ = self.events.send(event);
    }

    pub(crate) fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl AuthProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<Session>, Error> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable("get session"));
        }
        Ok(self.session.lock().clone())
    }

    fn subscribe(&self) -> AuthSubscription {
        let subscription = AuthSubscription::new(self.events.subscribe());
        if self.emit_initial {
            let session = self.session.lock().clone();
            subscription.with_initial(AuthEvent::new(AuthEventKind::InitialSession, session))
        } else {
            subscription
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Load {
    Profile,
    Roles,
    Permissions,
}

#[derive(Default)]
pub(crate) struct FakeDirectory {
    profiles: HashMap<UserId, Profile>,
    roles: HashMap<UserId, Vec<Role>>,
    permissions: HashMap<UserId, Vec<Permission>>,
    fail_profiles: bool,
    fail_roles: bool,
    fail_permissions: bool,
    calls: Mutex<Vec<(Load, UserId, Option<bool>)>>,
    loading_probe: Option<watch::Receiver<bool>>,
    gate: Option<watch::Receiver<bool>>,
}

impl FakeDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.insert(profile.id.clone(), profile);
        self
    }

    pub(crate) fn with_roles(mut self, user_id: &str, roles: &[&str]) -> Self {
        self.roles
            .insert(user_id.into(), roles.iter().map(|r| Role::from(*r)).collect());
        self
    }

    pub(crate) fn with_permissions(mut self, user_id: &str, keys: &[&str]) -> Self {
        self.permissions.insert(
            user_id.into(),
            keys.iter().map(|k| Permission::from(*k)).collect(),
        );
        self
    }

    pub(crate) fn failing_profiles(mut self) -> Self {
        self.fail_profiles = true;
        self
    }

    pub(crate) fn failing_roles(mut self) -> Self {
        self.fail_roles = true;
        self
    }

    pub(crate) fn failing_permissions(mut self) -> Self {
        self.fail_permissions = true;
        self
    }

    /// Record the loading flag as seen at each request.
    pub(crate) fn observing_loading(mut self, rx: watch::Receiver<bool>) -> Self {
        self.loading_probe = Some(rx);
        self
    }

    /// Hold every fetch until the gate is set to `true`.
    pub(crate) fn gated(mut self, gate: watch::Receiver<bool>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Load, UserId)> {
        self.calls
            .lock()
            .iter()
            .map(|(load, id, _)| (*load, id.clone()))
            .collect()
    }

    pub(crate) fn loading_seen(&self) -> Vec<bool> {
        self.calls.lock().iter().filter_map(|(_, _, l)| *l).collect()
    }

    pub(crate) fn count(&self, load: Load) -> usize {
        self.calls.lock().iter().filter(|(l, _, _)| *l == load).count()
    }

    fn record(&self, load: Load, user_id: &UserId) {
        let loading = self.loading_probe.as_ref().map(|rx| *rx.borrow());
        self.calls.lock().push((load, user_id.clone(), loading));
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            let opened = gate.wait_for(|open| *open).await.is_ok();
            if !opened {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl UserDirectory for FakeDirectory {
    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<Profile>, Error> {
        self.record(Load::Profile, user_id);
        self.pass_gate().await;
        tokio::task::yield_now().await;
        if self.fail_profiles {
            return Err(unavailable("profile query"));
        }
        Ok(self.profiles.get(user_id).cloned())
    }

    async fn fetch_roles(&self, user_id: &UserId) -> Result<Vec<Role>, Error> {
        self.record(Load::Roles, user_id);
        self.pass_gate().await;
        tokio::task::yield_now().await;
        if self.fail_roles {
            return Err(unavailable("roles query"));
        }
        Ok(self.roles.get(user_id).cloned().unwrap_or_default())
    }

    async fn fetch_permissions(&self, user_id: &UserId) -> Result<Vec<Permission>, Error> {
        self.record(Load::Permissions, user_id);
        self.pass_gate().await;
        tokio::task::yield_now().await;
        if self.fail_permissions {
            return Err(unavailable("permissions rpc"));
        }
        Ok(self.permissions.get(user_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct FakeTenants {
    by_domain: HashMap<String, Tenant>,
    fail: bool,
    lookups: Mutex<Vec<String>>,
}

impl FakeTenants {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_tenant(mut self, domain: &str, tenant: Tenant) -> Self {
        self.by_domain.insert(domain.to_owned(), tenant);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

impl TenantDirectory for FakeTenants {
    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, Error> {
        self.lookups.lock().push(domain.to_owned());
        tokio::task::yield_now().await;
        if self.fail {
            return Err(unavailable("tenant lookup"));
        }
        Ok(self.by_domain.get(domain).cloned())
    }
}
