use std::fmt;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::BackendClient;
use crate::cache::LocalCache;
use crate::error::Error;

/// Inventory searched through the travel search proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Flights,
    Hotels,
    Cars,
    Activities,
}

impl SearchKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flights => "flights",
            Self::Hotels => "hotels",
            Self::Cars => "cars",
            Self::Activities => "activities",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn search_cache_key(kind: SearchKind, params: &JsonValue) -> String {
    format!("search:{kind}:{params}")
}

impl BackendClient {
    /// Invoke an edge function with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the function responds with an error status.
    pub async fn invoke<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.endpoint(&format!("functions/v1/{name}"))?;
        let response = self.request(Method::POST, url).json(body).send().await?;
        let response = Self::ensure_success(response, "function call").await?;
        response.json::<T>().await.map_err(Into::into)
    }

    /// Search third-party inventory. Request and response shapes belong to
    /// the upstream API and pass through untouched.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn search(&self, kind: SearchKind, params: &JsonValue) -> Result<JsonValue, Error> {
        let body = serde_json::json!({ "type": kind, "params": params });
        self.invoke(&self.config.search_function, &body).await
    }

    /// [`search`](Self::search) through the local cache.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke); cache problems are never errors.
    pub async fn search_cached(
        &self,
        cache: &LocalCache,
        kind: SearchKind,
        params: &JsonValue,
    ) -> Result<JsonValue, Error> {
        let key = search_cache_key(kind, params);
        if let Some(hit) = cache.get::<JsonValue>(&key) {
            tracing::debug!(%kind, "Search served from cache");
            return Ok(hit);
        }
        let results = self.search(kind, params).await?;
        cache.set(&key, &results);
        Ok(results)
    }
}
