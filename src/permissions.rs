use std::collections::BTreeSet;

use parking_lot::RwLock;

use crate::error::Error;
use crate::traits::UserDirectory;
use crate::types::{Permission, UserId};

/// Capability keys understood by the back office.
pub mod keys {
    pub const BOOKINGS_VIEW: &str = "bookings.view";
    pub const AUDIT_VIEW: &str = "audit.view";
    pub const INCIDENTS_VIEW: &str = "incidents.view";
    pub const INCIDENTS_MANAGE: &str = "incidents.manage";
    pub const RETENTION_VIEW: &str = "retention.view";
    pub const RETENTION_MANAGE: &str = "retention.manage";
    pub const BILLING_VIEW: &str = "billing.view";
    pub const TENANTS_VIEW: &str = "tenants.view";
    pub const SESSIONS_VIEW: &str = "sessions.view";
    pub const PAGES_VIEW: &str = "pages.view";
    pub const SYSTEM_MAINTAIN: &str = "system.maintain";
}

/// Permissions resolved for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    user_id: UserId,
    keys: BTreeSet<Permission>,
}

impl PermissionSet {
    #[must_use]
    pub fn new(user_id: UserId, keys: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            user_id,
            keys: keys.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k.as_str() == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.keys.iter()
    }
}

/// Current user's permission set.
///
/// Only meaningful while a session exists: it is cleared on sign-out and
/// replaced wholesale, never edited in place.
#[derive(Debug, Default)]
pub struct PermissionStore {
    current: RwLock<Option<PermissionSet>>,
}

impl PermissionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve permissions for `user_id` and replace the current set.
    ///
    /// # Errors
    ///
    /// Propagates the directory error; the current set is left untouched.
    pub async fn fetch<D: UserDirectory>(
        &self,
        directory: &D,
        user_id: &UserId,
    ) -> Result<(), Error> {
        let keys = directory.fetch_permissions(user_id).await?;
        tracing::debug!(user_id = %user_id, count = keys.len(), "Permissions resolved");
        self.set(PermissionSet::new(user_id.clone(), keys));
        Ok(())
    }

    pub fn set(&self, set: PermissionSet) {
        *self.current.write() = Some(set);
    }

    #[must_use]
    pub fn has_permission(&self, key: &str) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|set| set.contains(key))
    }

    #[must_use]
    pub fn has_any(&self, keys: &[&str]) -> bool {
        let current = self.current.read();
        current
            .as_ref()
            .is_some_and(|set| keys.iter().any(|k| set.contains(k)))
    }

    #[must_use]
    pub fn has_all(&self, keys: &[&str]) -> bool {
        let current = self.current.read();
        current
            .as_ref()
            .is_some_and(|set| keys.iter().all(|k| set.contains(k)))
    }

    /// Fail with [`Error::Forbidden`] unless `key` is granted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Forbidden` naming the missing key.
    pub fn require(&self, key: &str) -> Result<(), Error> {
        if self.has_permission(key) {
            Ok(())
        } else {
            Err(Error::Forbidden(key.to_owned()))
        }
    }

    /// Sorted copy of the granted keys.
    #[must_use]
    pub fn permissions(&self) -> Vec<Permission> {
        self.current
            .read()
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn computed_for(&self) -> Option<UserId> {
        self.current.read().as_ref().map(|set| set.user_id.clone())
    }

    /// True when the set is missing or belongs to another user.
    #[must_use]
    pub fn is_stale_for(&self, user_id: &UserId) -> bool {
        self.current
            .read()
            .as_ref()
            .is_none_or(|set| &set.user_id != user_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.read().as_ref().is_none_or(|set| set.keys.is_empty())
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}
