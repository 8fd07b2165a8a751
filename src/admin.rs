//! Back-office repositories over the backend tables.
//!
//! Every operation checks a capability key against the current permission
//! set before touching the network. Mutations leave an audit-log entry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::backend::{BackendClient, Query, Table};
use crate::cache::LocalCache;
use crate::error::Error;
use crate::permissions::{PermissionStore, keys};
use crate::types::{TenantId, UserId};

const PLANS_CACHE_KEY: &str = "admin:plans";
const PLANS_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_PAGE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Booking {
    pub id: String,
    pub user_id: UserId,
    #[serde(default)]
    pub booking_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AuditLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub action: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub details: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl AuditLogEntry {
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: None,
            action: action.into(),
            entity_type: None,
            entity_id: None,
            details: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn on(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
    Closed,
}

impl IncidentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: IncidentStatus,
    pub severity: Severity,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct NewIncident {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub severity: Severity,
    pub status: IncidentStatus,
}

impl NewIncident {
    #[must_use]
    pub fn new(title: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: None,
            severity,
            status: IncidentStatus::Open,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RetentionPolicy {
    /// Table the policy prunes; unique.
    pub table_name: String,
    pub retention_days: u32,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,
}

fn enabled_default() -> bool {
    true
}

impl RetentionPolicy {
    #[must_use]
    pub fn new(table_name: impl Into<String>, retention_days: u32) -> Self {
        Self {
            table_name: table_name.into(),
            retention_days,
            enabled: true,
            last_run_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price_monthly: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TenantMember {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AdminSession {
    pub id: String,
    pub user_id: UserId,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ManagedPage {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub published: bool,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Reply of the `health` edge function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct HealthReport {
    pub status: String,
    #[serde(flatten)]
    pub checks: Map<String, JsonValue>,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "healthy")
    }
}

/// Permission-gated back-office operations for the signed-in administrator.
pub struct Admin<'a> {
    client: &'a BackendClient,
    permissions: &'a PermissionStore,
    actor: Option<UserId>,
}

impl<'a> Admin<'a> {
    #[must_use]
    pub fn new(client: &'a BackendClient, permissions: &'a PermissionStore) -> Self {
        Self {
            client,
            permissions,
            actor: permissions.computed_for(),
        }
    }

    /// Write an audit entry attributed to the current actor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Backend`] if the insert fails.
    pub async fn record_audit(&self, mut entry: AuditLogEntry) -> Result<(), Error> {
        if entry.user_id.is_none() {
            entry.user_id = self.actor.clone();
        }
        let _: Vec<JsonValue> = self.client.insert(Table::AuditLogs, &entry).await?;
        Ok(())
    }

    async fn audit_best_effort(&self, entry: AuditLogEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.record_audit(entry).await {
            tracing::warn!(action = %action, error = %e, "Audit log write failed");
        }
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `bookings.view`; otherwise backend errors.
    pub async fn bookings(&self, user_id: Option<&UserId>) -> Result<Vec<Booking>, Error> {
        self.permissions.require(keys::BOOKINGS_VIEW)?;
        let mut query = Query::new(Table::Bookings)
            .order("created_at", false)
            .limit(DEFAULT_PAGE);
        if let Some(user_id) = user_id {
            query = query.eq("user_id", user_id);
        }
        self.client.select(&query).await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `audit.view`; otherwise backend errors.
    pub async fn audit_logs(&self, limit: usize) -> Result<Vec<AuditLogEntry>, Error> {
        self.permissions.require(keys::AUDIT_VIEW)?;
        let query = Query::new(Table::AuditLogs)
            .order("created_at", false)
            .limit(limit);
        self.client.select(&query).await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `incidents.view`; otherwise backend errors.
    pub async fn incidents(&self, status: Option<IncidentStatus>) -> Result<Vec<Incident>, Error> {
        self.permissions.require(keys::INCIDENTS_VIEW)?;
        let mut query = Query::new(Table::Incidents).order("created_at", false);
        if let Some(status) = status {
            query = query.eq("status", status.as_str());
        }
        self.client.select(&query).await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `incidents.manage`; otherwise backend errors.
    pub async fn create_incident(&self, incident: &NewIncident) -> Result<Incident, Error> {
        self.permissions.require(keys::INCIDENTS_MANAGE)?;
        let created: Vec<Incident> = self.client.insert(Table::Incidents, incident).await?;
        let created = first_row(created, "incident insert")?;
        self.audit_best_effort(
            AuditLogEntry::new("incident.create")
                .on("incident", &created.id)
                .with_details(serde_json::json!({ "severity": created.severity })),
        )
        .await;
        Ok(created)
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `incidents.manage`; otherwise backend errors.
    pub async fn update_incident_status(
        &self,
        incident_id: &str,
        status: IncidentStatus,
    ) -> Result<Incident, Error> {
        self.permissions.require(keys::INCIDENTS_MANAGE)?;
        let updated: Vec<Incident> = self
            .client
            .update(
                &Query::new(Table::Incidents).eq("id", incident_id),
                &serde_json::json!({ "status": status }),
            )
            .await?;
        let updated = first_row(updated, "incident update")?;
        self.audit_best_effort(
            AuditLogEntry::new("incident.status")
                .on("incident", incident_id)
                .with_details(serde_json::json!({ "status": status })),
        )
        .await;
        Ok(updated)
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `retention.view`; otherwise backend errors.
    pub async fn retention_policies(&self) -> Result<Vec<RetentionPolicy>, Error> {
        self.permissions.require(keys::RETENTION_VIEW)?;
        self.client
            .select(&Query::new(Table::RetentionPolicies).order("table_name", true))
            .await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `retention.manage`; otherwise backend errors.
    pub async fn upsert_retention_policy(
        &self,
        policy: &RetentionPolicy,
    ) -> Result<RetentionPolicy, Error> {
        self.permissions.require(keys::RETENTION_MANAGE)?;
        let stored: Vec<RetentionPolicy> = self
            .client
            .upsert(Table::RetentionPolicies, policy, "table_name")
            .await?;
        let stored = first_row(stored, "retention upsert")?;
        self.audit_best_effort(
            AuditLogEntry::new("retention.upsert")
                .on("retention_policy", &stored.table_name)
                .with_details(serde_json::json!({
                    "retention_days": stored.retention_days,
                    "enabled": stored.enabled,
                })),
        )
        .await;
        Ok(stored)
    }

    /// Billing plans, served from `cache` when fresh.
    ///
    /// # Errors
    ///
    /// `Error::Forbidden` without `billing.view`; otherwise backend errors.
    pub async fn plans(&self, cache: &LocalCache) -> Result<Vec<Plan>, Error> {
        self.permissions.require(keys::BILLING_VIEW)?;
        if let Some(plans) = cache.get::<Vec<Plan>>(PLANS_CACHE_KEY) {
            return Ok(plans);
        }
        let plans: Vec<Plan> = self
            .client
            .select(&Query::new(Table::Plans).order("price_monthly", true))
            .await?;
        cache.set_with_ttl(PLANS_CACHE_KEY, &plans, PLANS_TTL);
        Ok(plans)
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `tenants.view`; otherwise backend errors.
    pub async fn tenant_members(&self, tenant_id: &TenantId) -> Result<Vec<TenantMember>, Error> {
        self.permissions.require(keys::TENANTS_VIEW)?;
        self.client
            .select(&Query::new(Table::TenantMembers).eq("tenant_id", tenant_id))
            .await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `sessions.view`; otherwise backend errors.
    pub async fn admin_sessions(&self) -> Result<Vec<AdminSession>, Error> {
        self.permissions.require(keys::SESSIONS_VIEW)?;
        self.client
            .select(
                &Query::new(Table::AdminSessions)
                    .order("last_seen_at", false)
                    .limit(DEFAULT_PAGE),
            )
            .await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `pages.view`; otherwise backend errors.
    pub async fn managed_pages(&self) -> Result<Vec<ManagedPage>, Error> {
        self.permissions.require(keys::PAGES_VIEW)?;
        self.client
            .select(&Query::new(Table::ManagedPages).order("slug", true))
            .await
    }

    /// # Errors
    ///
    /// `Error::Forbidden` without `system.maintain`; otherwise backend errors.
    pub async fn health(&self) -> Result<HealthReport, Error> {
        self.permissions.require(keys::SYSTEM_MAINTAIN)?;
        self.client.invoke("health", &serde_json::json!({})).await
    }

    /// Trigger the retention cleanup job.
    ///
    /// # Errors
    ///
    /// `Error::Forbidden` without `system.maintain`; otherwise backend errors.
    pub async fn run_cleanup(&self) -> Result<JsonValue, Error> {
        self.permissions.require(keys::SYSTEM_MAINTAIN)?;
        let result: JsonValue = self.client.invoke("run-cleanup", &serde_json::json!({})).await?;
        self.audit_best_effort(AuditLogEntry::new("system.cleanup").with_details(result.clone()))
            .await;
        Ok(result)
    }
}

fn first_row<T>(rows: Vec<T>, operation: &'static str) -> Result<T, Error> {
    rows.into_iter().next().ok_or_else(|| Error::Backend {
        operation,
        status: None,
        detail: "no row returned".into(),
    })
}
