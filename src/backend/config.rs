use url::Url;

use crate::error::Error;

const DEFAULT_SEARCH_FUNCTION: &str = "travel-search";

/// Hosted backend connection settings.
///
/// Required fields are constructor parameters; everything else has a default
/// and a `with_*` override.
///
/// ```rust,ignore
/// use tripdesk::BackendConfig;
///
/// let config = BackendConfig::new("https://abc.backend.example".parse()?, "public-anon-key")
///     .with_redirect_url("https://book.acme.travel/auth/callback".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BackendConfig {
    pub(crate) base_url: Url,
    pub(crate) anon_key: String,
    pub(crate) redirect_url: Option<Url>,
    pub(crate) search_function: String,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            base_url,
            anon_key: anon_key.into(),
            redirect_url: None,
            search_function: DEFAULT_SEARCH_FUNCTION.into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `TRIPDESK_BACKEND_URL`: backend base URL (must be http or https)
    /// - `TRIPDESK_BACKEND_ANON_KEY`: public anonymous API key
    ///
    /// # Optional env vars
    /// - `TRIPDESK_REDIRECT_URL`: where OAuth sign-in returns to
    /// - `TRIPDESK_SEARCH_FUNCTION`: travel search proxy function name
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("TRIPDESK_BACKEND_URL")
            .map_err(|_| Error::Config("TRIPDESK_BACKEND_URL is required".into()))?;
        let base_url = parse_http_url("TRIPDESK_BACKEND_URL", &base_url)?;
        let anon_key = std::env::var("TRIPDESK_BACKEND_ANON_KEY")
            .map_err(|_| Error::Config("TRIPDESK_BACKEND_ANON_KEY is required".into()))?;
        if anon_key.trim().is_empty() {
            return Err(Error::Config("TRIPDESK_BACKEND_ANON_KEY is empty".into()));
        }

        let mut config = Self::new(base_url, anon_key);
        if let Ok(url) = std::env::var("TRIPDESK_REDIRECT_URL") {
            config = config.with_redirect_url(parse_http_url("TRIPDESK_REDIRECT_URL", &url)?);
        }
        if let Ok(name) = std::env::var("TRIPDESK_SEARCH_FUNCTION") {
            config = config.with_search_function(name);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_redirect_url(mut self, url: Url) -> Self {
        self.redirect_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_search_function(mut self, name: impl Into<String>) -> Self {
        self.search_function = name.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    #[must_use]
    pub fn redirect_url(&self) -> Option<&Url> {
        self.redirect_url.as_ref()
    }

    #[must_use]
    pub fn search_function(&self) -> &str {
        &self.search_function
    }
}

fn parse_http_url(var: &str, value: &str) -> Result<Url, Error> {
    let url: Url = value
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!("{var}: unsupported scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let config = BackendConfig::new("https://abc.example".parse().unwrap(), "anon");
        assert_eq!(config.anon_key(), "anon");
        assert_eq!(config.search_function(), "travel-search");
        assert!(config.redirect_url().is_none());
    }

    #[test]
    fn overrides() {
        let config = BackendConfig::new("https://abc.example".parse().unwrap(), "anon")
            .with_redirect_url("https://app.example/cb".parse().unwrap())
            .with_search_function("amadeus-proxy");
        assert_eq!(
            config.redirect_url().map(Url::as_str),
            Some("https://app.example/cb")
        );
        assert_eq!(config.search_function(), "amadeus-proxy");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(parse_http_url("X", "ftp://files.example").is_err());
        assert!(parse_http_url("X", "not a url").is_err());
        assert!(parse_http_url("X", "http://localhost:54321").is_ok());
    }
}
