use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{BackendClient, now_unix};
use crate::error::Error;
use crate::pkce::PkcePair;
use crate::types::{AuthEventKind, AuthUser, Session};

/// Token response from the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let fallback = now_unix() + self.expires_in.unwrap_or(3600);
        let mut session = match self.expires_at {
            Some(expires_at) => Session::new(self.access_token, expires_at, self.user),
            None => Session::from_token(self.access_token, self.user, fallback),
        };
        session.refresh_token = self.refresh_token;
        session
    }
}

/// Sign-up answers with a session, or only a user while email confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// Fields to change on the signed-in user. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
#[non_exhaustive]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Free-form user metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl UserUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// Redirect URL for third-party sign-in plus the PKCE verifier to keep until
/// the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthRedirect {
    pub url: String,
    pub code_verifier: String,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the credentials are rejected.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = Self::ensure_success(response, "password sign-in").await?;
        let session = response.json::<TokenResponse>().await?.into_session();

        tracing::info!(user_id = %session.user.id, "Signed in with password");
        self.publish(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Register a new account.
    ///
    /// Returns `None` when the backend requires email confirmation first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if registration is rejected.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<JsonValue>,
    ) -> Result<Option<Session>, Error> {
        let mut url = self.endpoint("auth/v1/signup")?;
        if let Some(redirect) = &self.config.redirect_url {
            url.query_pairs_mut().append_pair("redirect_to", redirect.as_str());
        }

        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata.unwrap_or_else(|| serde_json::json!({})),
            }))
            .send()
            .await?;
        let response = Self::ensure_success(response, "sign-up").await?;

        match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                tracing::info!(user_id = %session.user.id, "Signed up");
                self.publish(AuthEventKind::SignedIn, Some(session.clone()));
                Ok(Some(session))
            }
            SignUpResponse::User(user) => {
                tracing::info!(user_id = %user.id, "Signed up, confirmation pending");
                Ok(None)
            }
        }
    }

    /// Revoke the session server-side and forget it locally.
    ///
    /// The local session is dropped and `SignedOut` published even if the
    /// revocation request fails.
    pub async fn sign_out(&self) {
        if self.session.read().is_some() {
            let result = match self.endpoint("auth/v1/logout") {
                Ok(url) => match self.request(Method::POST, url).send().await {
                    Ok(response) => Self::ensure_success(response, "sign-out").await.map(drop),
                    Err(e) => Err(e.into()),
                },
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Session revocation failed during sign-out");
            }
        }
        self.publish(AuthEventKind::SignedOut, None);
    }

    /// Exchange the refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] without a refresh token, [`Error::Http`] on
    /// network failure, or [`Error::Backend`] if the refresh is rejected.
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        let refresh_token = self
            .session
            .read()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or_else(|| Error::Token("no refresh token".into()))?;

        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let response = Self::ensure_success(response, "token refresh").await?;
        let session = response.json::<TokenResponse>().await?.into_session();

        tracing::debug!(user_id = %session.user.id, "Session refreshed");
        self.publish(AuthEventKind::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    /// Fetch the signed-in user from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the token is rejected.
    pub async fn get_user(&self) -> Result<AuthUser, Error> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::ensure_success(response, "user request").await?;
        response.json::<AuthUser>().await.map_err(Into::into)
    }

    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the update is rejected.
    pub async fn update_user(&self, update: &UserUpdate) -> Result<AuthUser, Error> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self.request(Method::PUT, url).json(update).send().await?;
        let response = Self::ensure_success(response, "user update").await?;
        let user = response.json::<AuthUser>().await?;

        let session = self.current_session().map(|mut s| {
            s.user = user.clone();
            s
        });
        self.publish(AuthEventKind::UserUpdated, session);
        Ok(user)
    }

    /// Send a password-recovery email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the request is rejected.
    pub async fn reset_password_for_email(&self, email: &str) -> Result<(), Error> {
        let mut url = self.endpoint("auth/v1/recover")?;
        if let Some(redirect) = &self.config.redirect_url {
            url.query_pairs_mut().append_pair("redirect_to", redirect.as_str());
        }
        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        Self::ensure_success(response, "password recovery").await?;
        Ok(())
    }

    /// Build the redirect for signing in with a third-party identity provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL cannot carry a path.
    pub fn authorize_url(&self, provider: &str) -> Result<OAuthRedirect, Error> {
        let pkce = PkcePair::generate();
        let mut url = self.endpoint("auth/v1/authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("provider", provider)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "s256");
            if let Some(redirect) = &self.config.redirect_url {
                query.append_pair("redirect_to", redirect.as_str());
            }
        }
        Ok(OAuthRedirect {
            url: url.into(),
            code_verifier: pkce.verifier,
        })
    }

    /// Complete a third-party sign-in with the code from the callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Backend`] if the code or verifier is rejected.
    pub async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> Result<Session, Error> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "pkce");

        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await?;
        let response = Self::ensure_success(response, "code exchange").await?;
        let session = response.json::<TokenResponse>().await?.into_session();

        tracing::info!(user_id = %session.user.id, "Signed in with identity provider");
        self.publish(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::client;
    use crate::backend::BackendConfig;

    #[test]
    fn authorize_url_carries_pkce() {
        let client = BackendClient::new(
            BackendConfig::new("https://abc.example".parse().unwrap(), "anon")
                .with_redirect_url("https://app.example/cb".parse().unwrap()),
        );
        let redirect = client.authorize_url("google").unwrap();

        assert!(redirect.url.starts_with("https://abc.example/auth/v1/authorize?"));
        assert!(redirect.url.contains("provider=google"));
        assert!(redirect.url.contains("code_challenge_method=s256"));
        assert!(redirect.url.contains(&format!(
            "code_challenge={}",
            PkcePair::from_verifier(redirect.code_verifier.clone()).challenge
        )));
        assert!(redirect.url.contains("redirect_to=https%3A%2F%2Fapp.example%2Fcb"));
    }

    #[test]
    fn authorize_url_unique_per_call() {
        let client = client("https://abc.example");
        let a = client.authorize_url("github").unwrap();
        let b = client.authorize_url("github").unwrap();
        assert_ne!(a.code_verifier, b.code_verifier);
    }

    #[test]
    fn token_response_prefers_reported_expiry() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "opaque",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_800_000_000,
            "refresh_token": "r1",
            "user": { "id": "u1", "email": "ada@example.com", "aud": "authenticated" }
        }))
        .unwrap();
        let session = token.into_session();
        assert_eq!(session.expires_at, 1_800_000_000);
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.user.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn token_response_falls_back_to_jwt_exp() {
        let jwt = crate::token::encode_for_test(&serde_json::json!({ "exp": 1_234 }));
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": jwt,
            "user": { "id": "u1" }
        }))
        .unwrap();
        assert_eq!(token.into_session().expires_at, 1_234);
    }

    #[test]
    fn sign_up_response_variants() {
        let pending: SignUpResponse =
            serde_json::from_value(serde_json::json!({ "id": "u1", "email": "a@b.c" })).unwrap();
        assert!(matches!(pending, SignUpResponse::User(_)));

        let session: SignUpResponse = serde_json::from_value(serde_json::json!({
            "access_token": "t",
            "user": { "id": "u1" }
        }))
        .unwrap();
        assert!(matches!(session, SignUpResponse::Session(_)));
    }

    #[test]
    fn user_update_skips_unset_fields() {
        let json = serde_json::to_value(UserUpdate::new().with_password("s3cret")).unwrap();
        assert_eq!(json, serde_json::json!({ "password": "s3cret" }));
    }

    #[tokio::test]
    async fn sign_out_without_session_only_publishes() {
        let client = client("https://abc.example");
        let mut rx = client.events.subscribe();
        client.sign_out().await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(client.current_session().is_none());
    }

    #[tokio::test]
    async fn refresh_without_token_fails_fast() {
        let client = client("https://abc.example");
        assert!(matches!(client.refresh_session().await, Err(Error::Token(_))));
    }
}
