use std::net::SocketAddr;

use crate::error::Error;

const DEFAULT_HOST: &str = "localhost";

/// Listener and tenant settings for the operational server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    bind: SocketAddr,
    host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            host: DEFAULT_HOST.into(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `TRIPDESK_BIND`: listen address (default `0.0.0.0:8080`)
    /// - `TRIPDESK_HOST`: host name the tenant is resolved from (default `localhost`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `TRIPDESK_BIND` is not a socket address.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("TRIPDESK_BIND") {
            config.bind = parse_bind(&bind)?;
        }
        if let Ok(host) = std::env::var("TRIPDESK_HOST") {
            config = config.with_host(host);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn bind(&self) -> SocketAddr {
        self.bind
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

fn parse_bind(value: &str) -> Result<SocketAddr, Error> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("TRIPDESK_BIND: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind().to_string(), "0.0.0.0:8080");
        assert_eq!(config.host(), "localhost");
    }

    #[test]
    fn bind_must_be_socket_address() {
        assert_eq!(
            parse_bind(" 127.0.0.1:9000 ").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 9000))
        );
        assert!(matches!(parse_bind("localhost"), Err(Error::Config(_))));
    }
}
