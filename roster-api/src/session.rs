//! Signed session cookies.
//!
//! The cookie value is `<uuid>.<hex hmac-sha256(uuid)>`. A missing, malformed
//! or wrongly signed cookie is replaced by a fresh identity.

use std::fmt;

use axum::http::{header, HeaderMap};
use hmac::{Hmac, Mac};
use roster_core::SessionError;
use sha2::Sha256;
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

type HmacSha256 = Hmac<Sha256>;

/// Session identity resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: String,
    /// True when the identity was minted for this request and the response
    /// must carry a `Set-Cookie`.
    pub issued: bool,
}

/// Signs and verifies session cookie values.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: &str) -> Result<Self, SessionError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            SessionError::Unavailable {
                reason: format!("Failed to initialize HMAC: {}", e),
            }
        })?;
        Ok(Self { mac })
    }

    fn signature(&self, id: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac
    }

    /// Cookie value for `id`.
    pub fn sign(&self, id: &str) -> String {
        let tag = self.signature(id).finalize().into_bytes();
        format!("{}.{}", id, hex::encode(tag))
    }

    /// Session id carried by a cookie value, if its signature checks out.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (id, tag) = value.split_once('.')?;
        Uuid::parse_str(id).ok()?;
        let tag = hex::decode(tag).ok()?;
        self.signature(id).verify_slice(&tag).ok()?;
        Some(id.to_string())
    }

    /// Resolve the session for a request, minting one if needed.
    pub fn resolve(&self, headers: &HeaderMap) -> SessionIdentity {
        if let Some(id) = cookie_value(headers, SESSION_COOKIE).and_then(|v| self.verify(v)) {
            return SessionIdentity { id, issued: false };
        }
        SessionIdentity {
            id: Uuid::new_v4().to_string(),
            issued: true,
        }
    }

    /// `Set-Cookie` header value for `id`.
    pub fn set_cookie(&self, id: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/",
            SESSION_COOKIE,
            self.sign(id)
        )
    }
}

/// First value of cookie `name` across all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signer() -> SessionSigner {
        SessionSigner::new("test-secret").unwrap()
    }

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_sign_then_verify() {
        let id = Uuid::new_v4().to_string();
        let value = signer().sign(&id);
        assert_eq!(signer().verify(&value), Some(id));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let id = Uuid::new_v4().to_string();
        let mut value = signer().sign(&id);
        let last = value.pop().unwrap();
        value.push(if last == '0' { '1' } else { '0' });
        assert_eq!(signer().verify(&value), None);
    }

    #[test]
    fn test_other_key_rejected() {
        let id = Uuid::new_v4().to_string();
        let value = SessionSigner::new("other-secret").unwrap().sign(&id);
        assert_eq!(signer().verify(&value), None);
    }

    #[test]
    fn test_malformed_values_rejected() {
        let signer = signer();
        assert_eq!(signer.verify(""), None);
        assert_eq!(signer.verify("no-dot"), None);
        assert_eq!(signer.verify("not-a-uuid.abcd"), None);
        let id = Uuid::new_v4().to_string();
        assert_eq!(signer.verify(&format!("{}.zz", id)), None);
    }

    #[test]
    fn test_resolve_reads_cookie_among_others() {
        let signer = signer();
        let id = Uuid::new_v4().to_string();
        let cookie = format!("theme=dark; session={}; lang=en", signer.sign(&id));

        let identity = signer.resolve(&headers(&cookie));
        assert_eq!(identity, SessionIdentity { id, issued: false });
    }

    #[test]
    fn test_resolve_mints_on_missing_or_bad_cookie() {
        let signer = signer();
        let fresh = signer.resolve(&HeaderMap::new());
        assert!(fresh.issued);
        assert!(Uuid::parse_str(&fresh.id).is_ok());

        let forged = format!("session={}.deadbeef", Uuid::new_v4());
        let identity = signer.resolve(&headers(&forged));
        assert!(identity.issued);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let signer = signer();
        let cookie = signer.set_cookie("abc");
        assert!(cookie.starts_with("session=abc."));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("Path=/"));
        assert!(!cookie.contains("Max-Age"));
    }
}
