use std::future::Future;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::Error;
use crate::tenant::Tenant;
use crate::types::{AuthEvent, Permission, Profile, Role, Session, UserId};

/// Hosted authentication provider.
///
/// # Example
///
/// ```rust,ignore
/// impl AuthProvider for MyProvider {
///     async fn get_session(&self) -> Result<Option<Session>, Error> {
///         Ok(self.current.read().clone())
///     }
///
///     fn subscribe(&self) -> AuthSubscription {
///         AuthSubscription::new(self.events.subscribe())
///     }
/// }
/// ```
pub trait AuthProvider: Send + Sync + 'static {
    /// Current session, if any. Called once per bootstrap.
    fn get_session(&self) -> impl Future<Output = Result<Option<Session>, Error>> + Send;

    /// Subscribe to auth-state transitions.
    ///
    /// Providers may attach a synthetic [`InitialSession`](crate::AuthEventKind::InitialSession)
    /// event to the returned subscription; it is seen by this subscriber only.
    /// Dropping the subscription unsubscribes.
    fn subscribe(&self) -> AuthSubscription;
}

/// One subscriber's view of the auth-event feed.
#[derive(Debug)]
pub struct AuthSubscription {
    initial: Option<AuthEvent>,
    events: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    #[must_use]
    pub fn new(events: broadcast::Receiver<AuthEvent>) -> Self {
        Self {
            initial: None,
            events,
        }
    }

    /// Deliver `event` before anything from the shared feed.
    #[must_use]
    pub fn with_initial(mut self, event: AuthEvent) -> Self {
        self.initial = Some(event);
        self
    }

    /// Next event: the initial snapshot first, then the shared feed.
    ///
    /// Cancel safe.
    ///
    /// # Errors
    ///
    /// Same as [`broadcast::Receiver::recv`].
    pub async fn recv(&mut self) -> Result<AuthEvent, RecvError> {
        if let Some(event) = self.initial.take() {
            return Ok(event);
        }
        self.events.recv().await
    }
}

/// Per-user data loaded after a session is established.
pub trait UserDirectory: Send + Sync + 'static {
    fn fetch_profile(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<Profile>, Error>> + Send;

    fn fetch_roles(&self, user_id: &UserId)
    -> impl Future<Output = Result<Vec<Role>, Error>> + Send;

    /// Capability keys resolved from the user's role assignment.
    fn fetch_permissions(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Permission>, Error>> + Send;
}

/// Domain-to-tenant lookup.
pub trait TenantDirectory: Send + Sync + 'static {
    /// `domain` is already normalized (lowercase, no port, no `www.`).
    fn find_tenant_by_domain(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Option<Tenant>, Error>> + Send;
}
