//! Startup sequencing from "authentication unknown" to "user data loaded".
//!
//! ```text
//! Uninitialized --start--> Resolving --initial load settled--> Ready
//! ```
//!
//! Auth events are routed through [`Phase::on_event`]. Data reloads only ever
//! happen in `Ready`, and never for the provider's synthetic initial event:
//! the initial load already covers that session.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::permissions::PermissionStore;
use crate::session::SessionStore;
use crate::traits::{AuthProvider, AuthSubscription, UserDirectory};
use crate::types::{AuthEvent, AuthEventKind, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Resolving,
    Ready,
}

/// What an auth event asks the sequencer to do beyond storing its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Reload profile, roles and permissions.
    Reload,
    /// Session stored, nothing else.
    Ignore,
    /// Drop permissions and stop loading.
    SignOut,
}

impl Phase {
    #[must_use]
    pub fn on_event(self, kind: AuthEventKind, has_user: bool) -> EventAction {
        match (self, kind, has_user) {
            (_, _, false) => EventAction::SignOut,
            (_, AuthEventKind::InitialSession, true) => EventAction::Ignore,
            (Phase::Ready, _, true) => EventAction::Reload,
            (Phase::Uninitialized | Phase::Resolving, _, true) => EventAction::Ignore,
        }
    }
}

struct Shared<P, D> {
    provider: Arc<P>,
    directory: Arc<D>,
    session: Arc<SessionStore>,
    permissions: Arc<PermissionStore>,
    phase: watch::Sender<Phase>,
}

impl<P: AuthProvider, D: UserDirectory> Shared<P, D> {
    /// Load profile, roles and permissions concurrently and wait for all
    /// three. Failures are logged and swallowed.
    async fn load_user_data(&self, user_id: &UserId) {
        let (profile, roles, permissions) = tokio::join!(
            self.session.fetch_profile(self.directory.as_ref(), user_id),
            self.session.fetch_roles(self.directory.as_ref(), user_id),
            self.permissions.fetch(self.directory.as_ref(), user_id),
        );

        for (what, result) in [
            ("profile", profile),
            ("roles", roles),
            ("permissions", permissions),
        ] {
            if let Err(e) = result {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to load {what}");
            }
        }
    }

    async fn handle_event(&self, event: AuthEvent) {
        let phase = *self.phase.borrow();
        let action = phase.on_event(event.kind, event.user().is_some());
        tracing::debug!(kind = ?event.kind, ?phase, ?action, "Auth event");

        let user_id = event.user().map(|u| u.id.clone());
        self.session.set_session(event.session);

        match (action, user_id) {
            (EventAction::Reload, Some(user_id)) => {
                tracing::info!(user_id = %user_id, kind = ?event.kind, "Reloading user data");
                self.session.set_loading(true);
                self.load_user_data(&user_id).await;
                self.session.set_loading(false);
            }
            (EventAction::SignOut, _) => {
                tracing::info!("Signed out");
                self.permissions.clear();
                self.session.set_loading(false);
            }
            _ => {}
        }
    }

    /// Events are handled one at a time, except that an event without a
    /// user cancels whatever is in flight and is handled next.
    async fn listen(self: Arc<Self>, mut events: AuthSubscription) {
        let mut queued: Option<AuthEvent> = None;
        loop {
            let event = match queued.take() {
                Some(event) => event,
                None => match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let handling = self.handle_event(event);
            tokio::pin!(handling);
            let mut open = true;
            loop {
                tokio::select! {
                    () = &mut handling => break,
                    received = events.recv(), if open && queued.is_none() => match received {
                        Ok(next) if next.user().is_none() => {
                            tracing::info!(kind = ?next.kind, "Sign-out cancels in-flight reload");
                            queued = Some(next);
                            break;
                        }
                        Ok(next) => queued = Some(next),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Auth event listener lagged");
                        }
                        Err(RecvError::Closed) => open = false,
                    },
                }
            }
        }
    }
}

/// Owns the auth-event subscription and drives the session and permission
/// stores. Dropping it unsubscribes.
pub struct AuthBootstrap<P, D> {
    shared: Arc<Shared<P, D>>,
    listener: Option<JoinHandle<()>>,
}

impl<P: AuthProvider, D: UserDirectory> AuthBootstrap<P, D> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        directory: Arc<D>,
        session: Arc<SessionStore>,
        permissions: Arc<PermissionStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                directory,
                session,
                permissions,
                phase: watch::Sender::new(Phase::Uninitialized),
            }),
            listener: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.shared.phase.borrow()
    }

    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.shared.phase.subscribe()
    }

    /// Subscribe to auth events, then resolve the current session and load
    /// its user data. Returns once the initial load has settled.
    ///
    /// Calling `start` again after the first time does nothing.
    pub async fn start(&mut self) {
        let claimed = self.shared.phase.send_if_modified(|phase| {
            if *phase == Phase::Uninitialized {
                *phase = Phase::Resolving;
                true
            } else {
                false
            }
        });
        if !claimed {
            return;
        }

        let shared = &self.shared;
        shared.session.set_loading(true);

        let events = shared.provider.subscribe();
        self.listener = Some(tokio::spawn(Arc::clone(shared).listen(events)));

        match shared.provider.get_session().await {
            Ok(Some(session)) => {
                let user_id = session.user.id.clone();
                shared.session.set_session(Some(session));
                shared.load_user_data(&user_id).await;
            }
            Ok(None) => {
                tracing::debug!("No existing session");
                shared.session.set_session(None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to retrieve session");
            }
        }

        shared.session.set_loading(false);
        shared.phase.send_replace(Phase::Ready);
        tracing::debug!("Auth bootstrap complete");
    }

    /// Apply one auth event as the listener would.
    pub async fn handle_event(&self, event: AuthEvent) {
        self.shared.handle_event(event).await;
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| !l.is_finished())
    }
}

impl<P, D> AuthBootstrap<P, D> {
    /// Unsubscribe from auth events. Stores keep their last state, except
    /// that a reload cut short no longer reports loading.
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            self.shared.session.set_loading(false);
        }
    }
}

impl<P, D> Drop for AuthBootstrap<P, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
