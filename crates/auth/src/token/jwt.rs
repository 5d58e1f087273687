use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{Payload, SecretKey, TokenEngine, TokenError, TokenScheme, check_fresh, check_issuable};

/// Registered claims wrapped around the payload.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    payload: Payload,
    iss: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWT backend.
#[derive(Debug, Clone)]
pub struct JwtEngine {
    issuer: String,
}

impl JwtEngine {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation
    }
}

impl TokenEngine for JwtEngine {
    fn scheme(&self) -> TokenScheme {
        TokenScheme::Jwt
    }

    fn create_token(&self, key: &SecretKey, payload: &Payload) -> Result<String, TokenError> {
        check_issuable(key, payload)?;

        let claims = Claims {
            payload: payload.clone(),
            iss: self.issuer.clone(),
            iat: payload.issued_at.timestamp(),
            exp: payload.expires_at.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(key.expose()),
        )
        .map_err(|e| TokenError::server(e.to_string()))
    }

    fn verify_token(&self, key: &SecretKey, token: &str) -> Result<Payload, TokenError> {
        key.ensure_min_len()?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(key.expose()),
            &self.validation(),
        )
        .map_err(|e| classify(e.kind()))?;

        // exp has second granularity; the payload window is exact.
        check_fresh(data.claims.payload, Utc::now())
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            TokenError::malformed("not a compact JWS")
        }
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::SignatureInvalid,
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => TokenError::Expired,
        ErrorKind::Json(e) => TokenError::FailedParseClaims(e.to_string()),
        ErrorKind::InvalidIssuer => TokenError::FailedParseClaims("unexpected issuer".into()),
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::FailedParseClaims(format!("missing claim '{claim}'"))
        }
        other => TokenError::server(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use warden_core::UserId;

    fn key() -> SecretKey {
        SecretKey::new("0123456789abcdef0123456789abcdef")
    }

    fn payload() -> Payload {
        Payload::new(UserId::new(), "a@b.com", Duration::minutes(5))
    }

    #[test]
    fn round_trip() {
        let engine = JwtEngine::new("warden");
        let payload = payload();
        let token = engine.create_token(&key(), &payload).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(engine.verify_token(&key(), &token).unwrap(), payload);
    }

    #[test]
    fn garbage_is_malformed() {
        let engine = JwtEngine::new("warden");
        assert!(matches!(
            engine.verify_token(&key(), "definitely-not-a-jwt"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let engine = JwtEngine::new("warden");
        let token = engine.create_token(&key(), &payload()).unwrap();
        let other = SecretKey::new("ffffffffffffffffffffffffffffffff");
        assert_eq!(engine.verify_token(&other, &token), Err(TokenError::SignatureInvalid));
    }

    #[test]
    fn foreign_issuer_fails_claims() {
        let token = JwtEngine::new("someone-else")
            .create_token(&key(), &payload())
            .unwrap();
        assert!(matches!(
            JwtEngine::new("warden").verify_token(&key(), &token),
            Err(TokenError::FailedParseClaims(_))
        ));
    }

    #[test]
    fn past_exp_is_expired() {
        let engine = JwtEngine::new("warden");
        let stale = Payload::issued_at(
            UserId::new(),
            "a@b.com",
            Utc::now() - Duration::hours(2),
            Duration::hours(1),
        );
        let token = engine.create_token(&key(), &stale).unwrap();
        assert_eq!(engine.verify_token(&key(), &token), Err(TokenError::Expired));
    }

    #[test]
    fn claims_without_payload_fail_to_parse() {
        #[derive(Serialize)]
        struct Bare {
            iss: &'static str,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Bare {
                iss: "warden",
                exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            },
            &EncodingKey::from_secret(key().expose()),
        )
        .unwrap();
        assert!(matches!(
            JwtEngine::new("warden").verify_token(&key(), &token),
            Err(TokenError::FailedParseClaims(_))
        ));
    }
}
