use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::watch;

use super::error::ServerError;
use super::probe::HealthProbe;
use super::state::OpsState;
use crate::bootstrap::Phase;
use crate::context::AppContext;
use crate::types::{Permission, Role, TenantId, UserId};

/// Create the operational router: `/healthz`, `/readyz` and `/api/state`.
pub fn ops_routes<H: HealthProbe>(
    probe: Arc<H>,
    context: AppContext,
    phase: watch::Receiver<Phase>,
) -> Router {
    let state = OpsState {
        probe,
        context,
        phase,
    };

    Router::new()
        .route("/healthz", get(healthz::<H>))
        .route("/readyz", get(readyz::<H>))
        .route("/api/state", get(snapshot::<H>))
        .with_state(state)
}

async fn healthz<H: HealthProbe>(
    State(state): State<OpsState<H>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.probe.check().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn readyz<H: HealthProbe>(
    State(state): State<OpsState<H>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if *state.phase.borrow() != Phase::Ready {
        return Err(ServerError::NotReady("auth bootstrap in progress"));
    }
    if state.context.tenant.is_loading() {
        return Err(ServerError::NotReady("tenant unresolved"));
    }
    Ok(Json(serde_json::json!({ "status": "ready" })))
}

/// Point-in-time view of the client stores.
#[derive(Debug, Serialize)]
pub struct StateSnapshot {
    pub phase: Phase,
    pub loading: bool,
    pub user_id: Option<UserId>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub tenant_id: Option<TenantId>,
}

impl StateSnapshot {
    fn capture(context: &AppContext, phase: Phase) -> Self {
        Self {
            phase,
            loading: context.session.is_loading(),
            user_id: context.session.user_id(),
            roles: context.session.roles(),
            permissions: context.permissions.permissions(),
            tenant_id: context.tenant.tenant().map(|t| t.id.clone()),
        }
    }
}

async fn snapshot<H: HealthProbe>(State(state): State<OpsState<H>>) -> Json<StateSnapshot> {
    let phase = *state.phase.borrow();
    Json(StateSnapshot::capture(&state.context, phase))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::error::Error;
    use crate::permissions::PermissionSet;
    use crate::tenant::Tenant;
    use crate::testing::{FakeTenants, session_for};

    #[derive(Default)]
    struct FakeProbe {
        down: AtomicBool,
    }

    impl HealthProbe for FakeProbe {
        async fn check(&self) -> Result<(), Error> {
            if self.down.load(Ordering::SeqCst) {
                Err(Error::Backend {
                    operation: "health",
                    status: Some(500),
                    detail: "database unreachable".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn app(probe: Arc<FakeProbe>, context: AppContext, phase: Phase) -> Router {
        // A closed channel still serves its last value.
        let (_tx, rx) = watch::channel(phase);
        ops_routes(probe, context, rx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn healthz_maps_probe_failure_to_503() {
        let probe = Arc::new(FakeProbe::default());
        let context = AppContext::in_memory();

        let (status, body) = get_json(app(probe.clone(), context.clone(), Phase::Ready), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        probe.down.store(true, Ordering::SeqCst);
        let (status, body) = get_json(app(probe, context, Phase::Ready), "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn readyz_waits_for_bootstrap_and_tenant() {
        let probe = Arc::new(FakeProbe::default());
        let context = AppContext::in_memory();

        let (status, _) = get_json(app(probe.clone(), context.clone(), Phase::Resolving), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = get_json(app(probe.clone(), context.clone(), Phase::Ready), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");

        context
            .tenant
            .resolve_tenant(&FakeTenants::new(), "unknown.example")
            .await;
        let (status, _) = get_json(app(probe, context, Phase::Ready), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn state_snapshot_reflects_stores() {
        let context = AppContext::in_memory();
        context.session.set_session(Some(session_for("u1")));
        context.session.set_roles(vec![Role::from("admin")]);
        context.session.set_loading(false);
        context.permissions.set(PermissionSet::new(
            "u1".into(),
            [Permission::from("audit.view")],
        ));
        let tenants = FakeTenants::new().with_tenant("acme.travel", Tenant::new("t-acme", "Acme"));
        context.tenant.resolve_tenant(&tenants, "www.acme.travel").await;

        let (status, body) = get_json(
            app(Arc::new(FakeProbe::default()), context, Phase::Ready),
            "/api/state",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "phase": "ready",
                "loading": false,
                "user_id": "u1",
                "roles": ["admin"],
                "permissions": ["audit.view"],
                "tenant_id": "t-acme",
            })
        );
    }
}
