use std::fmt;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::BackendClient;
use crate::error::Error;

/// Collections the client reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    UserRoles,
    Bookings,
    AuditLogs,
    Incidents,
    RetentionPolicies,
    AdminSessions,
    Tenants,
    TenantDomains,
    TenantMembers,
    Plans,
    ManagedPages,
}

impl Table {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::UserRoles => "user_roles",
            Self::Bookings => "bookings",
            Self::AuditLogs => "audit_logs",
            Self::Incidents => "incidents",
            Self::RetentionPolicies => "retention_policies",
            Self::AdminSessions => "admin_sessions",
            Self::Tenants => "tenants",
            Self::TenantDomains => "tenant_domains",
            Self::TenantMembers => "tenant_members",
            Self::Plans => "plans",
            Self::ManagedPages => "managed_pages",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter, ordering and paging for a table request.
///
/// ```rust,ignore
/// let query = Query::new(Table::Incidents)
///     .eq("status", "open")
///     .order("created_at", false)
///     .limit(50);
/// let incidents: Vec<Incident> = client.select(&query).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    table: Table,
    columns: String,
    filters: Vec<(String, String)>,
    order: Option<(String, bool)>,
    limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self {
            table,
            columns: "*".into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn table(&self) -> Table {
        self.table
    }

    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, format!("eq.{value}"))
    }

    #[must_use]
    pub fn neq(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(column, format!("neq.{value}"))
    }

    #[must_use]
    pub fn in_list<V: fmt::Display>(self, column: &str, values: &[V]) -> Self {
        let list = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, format!("in.({list})"))
    }

    fn filter(mut self, column: &str, condition: String) -> Self {
        self.filters.push((column.to_owned(), condition));
        self
    }

    #[must_use]
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn is_filtered(&self) -> bool {
        !self.filters.is_empty()
    }

    fn apply_filters(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        for (column, condition) in &self.filters {
            pairs.append_pair(column, condition);
        }
    }

    fn apply_read(&self, url: &mut Url) {
        url.query_pairs_mut().append_pair("select", &self.columns);
        self.apply_filters(url);
        let mut pairs = url.query_pairs_mut();
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            pairs.append_pair("order", &format!("{column}.{direction}"));
        }
        if let Some(limit) = self.limit {
            pairs.append_pair("limit", &limit.to_string());
        }
    }
}

fn table_path(table: Table) -> String {
    format!("rest/v1/{}", table.as_str())
}

fn refuse_unfiltered(query: &Query, operation: &'static str) -> Result<(), Error> {
    if query.is_filtered() {
        Ok(())
    } else {
        Err(Error::Backend {
            operation,
            status: None,
            detail: format!("refusing unfiltered {operation} on {}", query.table),
        })
    }
}

impl BackendClient {
    pub(crate) fn read_url(&self, query: &Query) -> Result<Url, Error> {
        let mut url = self.endpoint(&table_path(query.table))?;
        query.apply_read(&mut url);
        Ok(url)
    }

    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the query is rejected.
    pub async fn select<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>, Error> {
        let url = self.read_url(query)?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::ensure_success(response, "select").await?;
        response.json::<Vec<T>>().await.map_err(Into::into)
    }

    /// First row matching `query`, if any.
    ///
    /// # Errors
    ///
    /// Same as [`select`](Self::select).
    pub async fn select_one<T: DeserializeOwned>(&self, query: &Query) -> Result<Option<T>, Error> {
        let rows = self.select::<T>(&query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row or an array of rows; returns the stored rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the insert is rejected.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: Table,
        rows: &B,
    ) -> Result<Vec<T>, Error> {
        let url = self.endpoint(&table_path(table))?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let response = Self::ensure_success(response, "insert").await?;
        response.json::<Vec<T>>().await.map_err(Into::into)
    }

    /// Insert or merge on the `on_conflict` columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the upsert is rejected.
    pub async fn upsert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: Table,
        rows: &B,
        on_conflict: &str,
    ) -> Result<Vec<T>, Error> {
        let mut url = self.endpoint(&table_path(table))?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(rows)
            .send()
            .await?;
        let response = Self::ensure_success(response, "upsert").await?;
        response.json::<Vec<T>>().await.map_err(Into::into)
    }

    /// Patch every row matching `query`; unfiltered updates are refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] for an unfiltered query or a rejected update,
    /// or [`Error::Http`] on network failure.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        query: &Query,
        patch: &B,
    ) -> Result<Vec<T>, Error> {
        refuse_unfiltered(query, "update")?;
        let mut url = self.endpoint(&table_path(query.table))?;
        query.apply_filters(&mut url);
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let response = Self::ensure_success(response, "update").await?;
        response.json::<Vec<T>>().await.map_err(Into::into)
    }

    /// Delete every row matching `query`; unfiltered deletes are refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] for an unfiltered query or a rejected delete,
    /// or [`Error::Http`] on network failure.
    pub async fn delete(&self, query: &Query) -> Result<(), Error> {
        refuse_unfiltered(query, "delete")?;
        let mut url = self.endpoint(&table_path(query.table))?;
        query.apply_filters(&mut url);
        let response = self.request(Method::DELETE, url).send().await?;
        Self::ensure_success(response, "delete").await?;
        Ok(())
    }

    /// Call a database function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the call is rejected.
    pub async fn rpc<A: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        function: &str,
        args: &A,
    ) -> Result<T, Error> {
        let url = self.endpoint(&format!("rest/v1/rpc/{function}"))?;
        let response = self.request(Method::POST, url).json(args).send().await?;
        let response = Self::ensure_success(response, "rpc").await?;
        response.json::<T>().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::client;

    #[test]
    fn read_url_encodes_filters_order_and_limit() {
        let query = Query::new(Table::Incidents)
            .select("id,title,status")
            .eq("status", "open")
            .order("created_at", false)
            .limit(25);
        let url = client("https://abc.example").read_url(&query).unwrap();

        assert_eq!(url.path(), "/rest/v1/incidents");
        assert_eq!(
            url.query(),
            Some("select=id%2Ctitle%2Cstatus&status=eq.open&order=created_at.desc&limit=25")
        );
    }

    #[test]
    fn in_list_filter() {
        let query = Query::new(Table::Bookings).in_list("status", &["pending", "confirmed"]);
        let url = client("https://abc.example").read_url(&query).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("status".into(), "in.(pending,confirmed)".into())));
    }

    #[test]
    fn default_select_is_star() {
        let url = client("https://abc.example")
            .read_url(&Query::new(Table::Plans))
            .unwrap();
        assert_eq!(url.query(), Some("select=*"));
    }

    #[tokio::test]
    async fn unfiltered_writes_are_refused() {
        let client = client("https://abc.example");
        let query = Query::new(Table::AuditLogs);
        assert!(matches!(
            client.delete(&query).await,
            Err(Error::Backend { operation: "delete", status: None, .. })
        ));
        let result: Result<Vec<serde_json::Value>, _> =
            client.update(&query, &serde_json::json!({ "a": 1 })).await;
        assert!(result.is_err());
    }

    #[test]
    fn table_names() {
        assert_eq!(Table::RetentionPolicies.to_string(), "retention_policies");
        assert_eq!(Table::TenantDomains.as_str(), "tenant_domains");
    }
}
