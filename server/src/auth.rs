//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs issued on login. The `user_id` claim carries the
//! user key; `exp` is enforced when present.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wallet_common::{UserKey, WalletError};

use crate::errors::ApiError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserIdClaim {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: UserIdClaim,
}

#[derive(Debug, Serialize)]
struct IssuedClaims<'a> {
    user_id: &'a str,
    exp: u64,
}

/// Signs login tokens.
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer for an HS256 secret; tokens expire after `ttl`.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Sign a token for `user`.
    pub fn issue(&self, user: &UserKey) -> Result<String, WalletError> {
        let claims = IssuedClaims {
            user_id: user.as_str(),
            exp: get_current_timestamp() + self.ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| WalletError::infrastructure(format!("token signing failed: {e}")))
    }
}

/// Validates bearer tokens and extracts the user key.
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Create a validator for an HS256 secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims::<&str>(&[]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Decode a token and return its user key.
    pub fn validate(&self, token: &str) -> Result<UserKey, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            ApiError::Unauthorized("invalid token")
        })?;

        let key = match data.claims.user_id {
            UserIdClaim::Text(id) => UserKey::parse(id),
            UserIdClaim::Number(id) => Ok(UserKey::from(id)),
        };
        key.map_err(|_| ApiError::Unauthorized("invalid user_id claim"))
    }
}

/// Shared state of the auth middleware.
#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<TokenValidator>,
}

/// Reject requests without a valid bearer token and attach the [`UserKey`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers()).map_err(|e| {
        warn!(path = %req.uri().path(), "Missing or malformed Authorization header");
        e
    })?;
    let user = state.validator.validate(token)?;

    debug!(user_key = %user, "User authenticated");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::Unauthorized("missing Authorization header"))?;

    let header = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("malformed Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized("expected a Bearer token"))?
        .trim();
    if token.is_empty() {
        return Err(ApiError::Unauthorized("empty bearer token"));
    }

    Ok(token)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    pub(crate) fn mint(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        4_102_444_800
    }

    #[test]
    fn test_string_and_numeric_user_ids() {
        let validator = TokenValidator::new(b"secret");

        let token = mint("secret", json!({"user_id": "42", "exp": far_future()}));
        assert_eq!(validator.validate(&token).unwrap(), UserKey::new("42"));

        let token = mint("secret", json!({"user_id": 7}));
        assert_eq!(validator.validate(&token).unwrap(), UserKey::new("7"));
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let validator = TokenValidator::new(b"secret");

        let wrong_secret = mint("other", json!({"user_id": "42"}));
        assert!(validator.validate(&wrong_secret).is_err());

        let expired = mint("secret", json!({"user_id": "42", "exp": 1_000}));
        assert!(validator.validate(&expired).is_err());

        let no_user = mint("secret", json!({"sub": "42"}));
        assert!(validator.validate(&no_user).is_err());

        let blank_user = mint("secret", json!({"user_id": "  "}));
        assert!(validator.validate(&blank_user).is_err());
    }

    #[test]
    fn test_issued_tokens_validate() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(3600));
        let token = issuer.issue(&UserKey::from(17)).unwrap();

        let validator = TokenValidator::new(b"secret");
        assert_eq!(validator.validate(&token).unwrap(), UserKey::new("17"));
        assert!(TokenValidator::new(b"other").validate(&token).is_err());
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  "));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def");
    }
}
