//! HTTP client for the hosted backend: auth, table queries, edge functions.

mod auth;
mod config;
mod directory;
mod functions;
mod query;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use url::Url;

pub use auth::{OAuthRedirect, UserUpdate};
pub use config::BackendConfig;
pub use functions::SearchKind;
pub use query::{Query, Table};

use crate::error::Error;
use crate::types::{AuthEvent, AuthEventKind, Session};

const EVENT_CAPACITY: usize = 32;

/// Client for the hosted backend.
///
/// Holds the current session in memory and publishes auth transitions to
/// subscribers; it is the [`AuthProvider`](crate::AuthProvider) the bootstrap
/// sequencer listens to.
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl BackendClient {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            http: reqwest::Client::new(),
            session: RwLock::new(None),
            events,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Session held by this client, expired or not.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Adopt a session obtained elsewhere (e.g. restored by the host app)
    /// and announce it as a sign-in.
    pub fn set_session(&self, session: Session) {
        self.publish(AuthEventKind::SignedIn, Some(session));
    }

    /// Store `session` and notify subscribers.
    fn publish(&self, kind: AuthEventKind, session: Option<Session>) {
        *self.session.write() = session.clone();
        // No subscribers is fine.
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    /// `base_url` + `path`, tolerant of a base with or without trailing slash.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("cannot use {} as a base URL", self.config.base_url)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Bearer credential: the session's access token, else the anon key.
    fn bearer(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    pub(crate) fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer())
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    pub(crate) async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Backend {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
