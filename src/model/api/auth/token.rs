use hmac::{Hmac, Mac};
use rocket::{
    http::Status,
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    Request, State,
};
use sha2::Sha256;

use crate::config::Config;
use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

/// Message authenticated under each token, so that tokens are compared as
/// fixed-length tags rather than directly.
const TOKEN_CONTEXT: &[u8] = b"polls-backend admin token";

/// Scheme prefix of the `Authorization` header value.
pub const AUTHORIZATION_SCHEME: &str = "Bearer ";

/// Proof that the request carried the configured admin token.
#[derive(Debug)]
pub struct AdminToken(());

impl AdminToken {
    /// Check a raw `Authorization` header value against the expected token.
    fn verify(header: Option<&str>, expected: Option<&str>) -> Result<Self, Error> {
        let expected = expected
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Unauthorized("Admin access is disabled".to_string()))?;
        let presented = header
            .and_then(|value| value.strip_prefix(AUTHORIZATION_SCHEME))
            .ok_or_else(|| Error::Unauthorized("Missing admin token".to_string()))?;
        let expected_tag = token_mac(expected)?.finalize().into_bytes();
        token_mac(presented.trim())?
            .verify_slice(&expected_tag)
            .map_err(|_| Error::Unauthorized("Invalid admin token".to_string()))?;
        Ok(Self(()))
    }
}

/// An HMAC over [`TOKEN_CONTEXT`], keyed by `token`.
fn token_mac(token: &str) -> Result<HmacSha256, Error> {
    let mut mac = HmacSha256::new_from_slice(token.as_bytes())
        .map_err(|e| Error::Unauthorized(format!("Unusable admin token: {e}")))?;
    mac.update(TOKEN_CONTEXT);
    Ok(mac)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminToken {
    type Error = Error;

    /// Get an [`AdminToken`] from the `Authorization` header.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(req.guard::<&State<Config>>().await.map_failure(|_| {
            (
                Status::InternalServerError,
                Error::Unauthorized("No config in managed state".to_string()),
            )
        }));
        let header = req.headers().get_one("Authorization");
        match Self::verify(header, config.admin_token()) {
            Ok(token) => Outcome::Success(token),
            Err(e) => {
                warn!("Rejected admin request: {e}");
                Outcome::Failure((Status::Unauthorized, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_token() {
        assert!(AdminToken::verify(Some("Bearer hunter2"), Some("hunter2")).is_ok());
    }

    #[test]
    fn wrong_or_missing_token() {
        for header in [
            None,
            Some("hunter2"),
            Some("Bearer hunter3"),
            Some("Bearer hunter"),
            Some("Basic hunter2"),
        ] {
            assert!(matches!(
                AdminToken::verify(header, Some("hunter2")),
                Err(Error::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(AdminToken::verify(Some("Bearer hunter2 "), Some(" hunter2\n")).is_ok());
        assert!(AdminToken::verify(Some("Bearer  hunter2"), Some("hunter2")).is_ok());
    }

    #[test]
    fn tokens_of_other_lengths_are_rejected() {
        let long = "hunter2".repeat(20);
        for presented in ["", "h", "hunter22", long.as_str()] {
            let header = format!("Bearer {presented}");
            assert!(matches!(
                AdminToken::verify(Some(&header), Some("hunter2")),
                Err(Error::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn disabled_without_configured_token() {
        assert!(matches!(
            AdminToken::verify(Some("Bearer "), Some("   ")),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            AdminToken::verify(Some("Bearer anything"), None),
            Err(Error::Unauthorized(_))
        ));
    }
}
