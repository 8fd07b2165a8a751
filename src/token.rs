use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::Error;

/// Claims read from a backend access token.
///
/// Signature is NOT verified: the token is issued to us by the backend and the
/// backend re-verifies it on every request. These claims only drive local
/// bookkeeping such as expiry.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct AccessTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Decode the payload segment of a JWT access token without verifying it.
///
/// # Errors
///
/// Returns `Error::Token` if the token is not three dot-separated segments or
/// the payload is not base64url-encoded JSON.
pub fn decode_unverified(token: &str) -> Result<AccessTokenClaims, Error> {
    let payload = payload_segment(token)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| Error::Token("invalid payload encoding".into()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Token(format!("invalid payload: {e}")))
}

fn payload_segment(token: &str) -> Result<&str, Error> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(_), None) if !h.is_empty() && !p.is_empty() => Ok(p),
        _ => Err(Error::Token("invalid token format".into())),
    }
}

#[cfg(test)]
pub(crate) fn encode_for_test(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}
