//! Current session, profile, roles and the global loading flag.

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::Error;
use crate::traits::UserDirectory;
use crate::types::{AuthUser, Profile, Role, Session, UserId};

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    profile: Option<Profile>,
    roles: Vec<Role>,
}

/// Holds the session copy and the user data loaded for it.
///
/// Starts in the loading state: nothing is known until the bootstrap sequence
/// has asked the provider for the current session.
#[derive(Debug)]
pub struct SessionStore {
    state: RwLock<SessionState>,
    loading: watch::Sender<bool>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            loading: watch::Sender::new(true),
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.state.read().session.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.state.read().session.as_ref().map(|s| s.user.clone())
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.state.read().session.as_ref().map(|s| s.user.id.clone())
    }

    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        self.state.read().profile.clone()
    }

    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        self.state.read().roles.clone()
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.state.read().roles.iter().any(|r| r.as_str() == role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state.read().roles.iter().any(Role::is_admin)
    }

    /// Replace the session wholesale. `None` means signed out.
    pub fn set_session(&self, session: Option<Session>) {
        self.state.write().session = session;
    }

    pub fn set_profile(&self, profile: Option<Profile>) {
        self.state.write().profile = profile;
    }

    pub fn set_roles(&self, roles: Vec<Role>) {
        self.state.write().roles = roles;
    }

    /// Load the profile for `user_id` and store it.
    ///
    /// # Errors
    ///
    /// Propagates the directory error; the stored profile is left untouched.
    pub async fn fetch_profile<D: UserDirectory>(
        &self,
        directory: &D,
        user_id: &UserId,
    ) -> Result<(), Error> {
        let profile = directory.fetch_profile(user_id).await?;
        self.set_profile(profile);
        Ok(())
    }

    /// Load the role labels for `user_id` and store them.
    ///
    /// # Errors
    ///
    /// Propagates the directory error; stored roles are left untouched.
    pub async fn fetch_roles<D: UserDirectory>(
        &self,
        directory: &D,
        user_id: &UserId,
    ) -> Result<(), Error> {
        let mut roles = directory.fetch_roles(user_id).await?;
        roles.sort();
        roles.dedup();
        self.set_roles(roles);
        Ok(())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.send_replace(loading);
    }

    /// Observe loading transitions.
    #[must_use]
    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    /// Drop session, profile and roles. Loading is not touched.
    pub fn clear(&self) {
        *self.state.write() = SessionState::default();
    }

    /// Back to the freshly constructed state.
    pub fn reset(&self) {
        self.clear();
        self.set_loading(true);
    }
}
