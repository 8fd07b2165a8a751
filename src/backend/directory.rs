//! Provider trait implementations over the backend's tables.

use serde::Deserialize;

use super::{BackendClient, Query, Table, now_unix};
use crate::error::Error;
use crate::tenant::Tenant;
use crate::traits::{AuthProvider, AuthSubscription, TenantDirectory, UserDirectory};
use crate::types::{AuthEvent, AuthEventKind, Permission, Profile, Role, Session, UserId};

#[derive(Deserialize)]
struct RoleRow {
    role: Role,
}

#[derive(Deserialize)]
struct DomainRow {
    tenant_id: String,
}

/// `get_user_permissions` may return bare keys or `{ "permission": key }` rows.
#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionRow {
    Key(Permission),
    Row { permission: Permission },
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        match row {
            PermissionRow::Key(key) | PermissionRow::Row { permission: key } => key,
        }
    }
}

impl AuthProvider for BackendClient {
    /// The held session, refreshed first if it has expired.
    ///
    /// An expired session that cannot be refreshed is dropped.
    async fn get_session(&self) -> Result<Option<Session>, Error> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired(now_unix()) {
            return Ok(Some(session));
        }
        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Expired session could not be refreshed");
                *self.session.write() = None;
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.events.subscribe()).with_initial(AuthEvent::new(
            AuthEventKind::InitialSession,
            self.current_session(),
        ))
    }
}

impl UserDirectory for BackendClient {
    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<Profile>, Error> {
        self.select_one(&Query::new(Table::Profiles).eq("id", user_id))
            .await
    }

    async fn fetch_roles(&self, user_id: &UserId) -> Result<Vec<Role>, Error> {
        let rows: Vec<RoleRow> = self
            .select(&Query::new(Table::UserRoles).select("role").eq("user_id", user_id))
            .await?;
        Ok(rows.into_iter().map(|r| r.role).collect())
    }

    async fn fetch_permissions(&self, user_id: &UserId) -> Result<Vec<Permission>, Error> {
        let rows: Vec<PermissionRow> = self
            .rpc(
                "get_user_permissions",
                &serde_json::json!({ "_user_id": user_id }),
            )
            .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }
}

impl TenantDirectory for BackendClient {
    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, Error> {
        let mapping: Option<DomainRow> = self
            .select_one(
                &Query::new(Table::TenantDomains)
                    .select("tenant_id")
                    .eq("domain", domain),
            )
            .await?;
        let Some(mapping) = mapping else {
            return Ok(None);
        };
        self.select_one(&Query::new(Table::Tenants).eq("id", &mapping.tenant_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::client;
    use crate::testing::session_for;

    #[test]
    fn permission_rows_accept_both_shapes() {
        let rows: Vec<PermissionRow> = serde_json::from_value(serde_json::json!([
            "audit.view",
            { "permission": "bookings.view" }
        ]))
        .unwrap();
        let keys: Vec<Permission> = rows.into_iter().map(Permission::from).collect();
        assert_eq!(
            keys,
            vec![Permission::from("audit.view"), Permission::from("bookings.view")]
        );
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_session() {
        let client = client("https://abc.example");
        client.set_session(session_for("u1"));
        let mut rx = client.subscribe();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::InitialSession);
        assert_eq!(event.session, Some(session_for("u1")));
    }

    #[tokio::test]
    async fn initial_session_reaches_only_the_new_subscriber() {
        let client = client("https://abc.example");
        let mut first = client.subscribe();
        assert_eq!(first.recv().await.unwrap().kind, AuthEventKind::InitialSession);

        let mut second = client.subscribe();
        assert_eq!(second.recv().await.unwrap().kind, AuthEventKind::InitialSession);

        client.set_session(session_for("u1"));
        assert_eq!(first.recv().await.unwrap().kind, AuthEventKind::SignedIn);
        assert_eq!(second.recv().await.unwrap().kind, AuthEventKind::SignedIn);
    }

    #[tokio::test]
    async fn get_session_returns_live_session() {
        let client = client("https://abc.example");
        assert_eq!(client.get_session().await.unwrap(), None);
        client.set_session(session_for("u1"));
        assert_eq!(client.get_session().await.unwrap(), Some(session_for("u1")));
    }

    #[tokio::test]
    async fn expired_session_without_refresh_token_is_dropped() {
        let client = client("https://abc.example");
        client.set_session(Session::new("t", 0, crate::types::AuthUser::new("u1")));
        assert_eq!(client.get_session().await.unwrap(), None);
        assert!(client.current_session().is_none());
    }
}
