//! JWT Token Generation and Validation
//!
//! Uses EdDSA (Ed25519) for asymmetric token signing/verification. Access
//! tokens carry the Discord roles fetched when the session was issued or
//! last refreshed.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AuthError, AuthResult};
use crate::entitlements::RoleSet;

/// JWT claims for access and refresh tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID as UUID string).
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Token type (access or refresh).
    pub typ: TokenType,
    /// JWT ID for refresh token revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Guild roles held at issue time. Access tokens only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ext_roles: Vec<String>,
}

/// Token type discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived access token.
    Access,
    /// Long-lived refresh token.
    Refresh,
}

/// Token pair returned after successful authentication.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry in seconds.
    pub access_expires_in: i64,
    pub refresh_token_id: Uuid,
}

/// Decode a base64-encoded PEM key.
fn decode_pem_key(base64_key: &str) -> AuthResult<Vec<u8>> {
    STANDARD
        .decode(base64_key)
        .map_err(|_| AuthError::Internal("Invalid base64 in JWT key".to_string()))
}

fn decoding_key(public_key: &str) -> AuthResult<DecodingKey> {
    let key_bytes = decode_pem_key(public_key)?;
    DecodingKey::from_ed_pem(&key_bytes)
        .map_err(|e| AuthError::Internal(format!("Invalid Ed25519 public key: {e}")))
}

/// Generate both access and refresh tokens.
pub fn generate_token_pair(
    user_id: Uuid,
    external_roles: &RoleSet,
    private_key: &str,
    access_expiry_seconds: i64,
    refresh_expiry_seconds: i64,
) -> AuthResult<TokenPair> {
    let now = Utc::now();
    let refresh_token_id = Uuid::now_v7();

    let key_bytes = decode_pem_key(private_key)?;
    let encoding_key = EncodingKey::from_ed_pem(&key_bytes)
        .map_err(|e| AuthError::Internal(format!("Invalid Ed25519 private key: {e}")))?;

    let access_claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::seconds(access_expiry_seconds)).timestamp(),
        iat: now.timestamp(),
        typ: TokenType::Access,
        jti: None,
        ext_roles: external_roles.to_sorted_vec(),
    };

    let access_token = encode(
        &Header::new(Algorithm::EdDSA),
        &access_claims,
        &encoding_key,
    )?;

    // Refresh tokens carry a jti for revocation and no roles
    let refresh_claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::seconds(refresh_expiry_seconds)).timestamp(),
        iat: now.timestamp(),
        typ: TokenType::Refresh,
        jti: Some(refresh_token_id.to_string()),
        ext_roles: Vec::new(),
    };

    let refresh_token = encode(
        &Header::new(Algorithm::EdDSA),
        &refresh_claims,
        &encoding_key,
    )?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        access_expires_in: access_expiry_seconds,
        refresh_token_id,
    })
}

fn validate(token: &str, public_key: &str, expected: TokenType) -> AuthResult<Claims> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &decoding_key(public_key)?, &validation).map_err(
        |e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        },
    )?;

    if token_data.claims.typ != expected {
        return Err(AuthError::InvalidToken);
    }

    Ok(token_data.claims)
}

/// Validate and decode an access token.
pub fn validate_access_token(token: &str, public_key: &str) -> AuthResult<Claims> {
    validate(token, public_key, TokenType::Access)
}

/// Validate and decode a refresh token. Refresh tokens must carry a jti.
pub fn validate_refresh_token(token: &str, public_key: &str) -> AuthResult<Claims> {
    let claims = validate(token, public_key, TokenType::Refresh)?;
    if claims.jti.is_none() {
        return Err(AuthError::InvalidToken);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    // A different Ed25519 public key for testing validation failure
    const WRONG_PUBLIC_KEY: &str = "LS0tLS1CRUdJTiBQVUJMSUMgS0VZLS0tLS0KTUNvd0JRWURLMlZ3QXlFQU5xRlcrTXJIWHUrKzhYS0hKam96Nnc1WXhIYXA5VjNqdDYrN0VKOWZ2ZGc9Ci0tLS0tRU5EIFBVQkxJQyBLRVktLS0tLQo=";

    fn keys() -> (String, String) {
        let config = Config::default_for_test();
        (config.jwt_private_key, config.jwt_public_key)
    }

    #[test]
    fn test_access_token_carries_roles() {
        let (private_key, public_key) = keys();
        let user_id = Uuid::now_v7();
        let roles: RoleSet = ["222", "111"].into_iter().collect();

        let tokens = generate_token_pair(user_id, &roles, &private_key, 3600, 604_800).unwrap();
        let claims = validate_access_token(&tokens.access_token, &public_key).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.ext_roles, vec!["111", "222"]);
        assert_eq!(tokens.access_expires_in, 3600);
    }

    #[test]
    fn test_refresh_token_has_jti_and_no_roles() {
        let (private_key, public_key) = keys();
        let roles: RoleSet = ["111"].into_iter().collect();

        let tokens =
            generate_token_pair(Uuid::now_v7(), &roles, &private_key, 3600, 604_800).unwrap();
        let claims = validate_refresh_token(&tokens.refresh_token, &public_key).unwrap();

        assert_eq!(claims.jti, Some(tokens.refresh_token_id.to_string()));
        assert!(claims.ext_roles.is_empty());
    }

    #[test]
    fn test_token_types_not_interchangeable() {
        let (private_key, public_key) = keys();
        let tokens =
            generate_token_pair(Uuid::now_v7(), &RoleSet::empty(), &private_key, 3600, 604_800)
                .unwrap();

        assert!(validate_access_token(&tokens.refresh_token, &public_key).is_err());
        assert!(validate_refresh_token(&tokens.access_token, &public_key).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let (private_key, _) = keys();
        let tokens =
            generate_token_pair(Uuid::now_v7(), &RoleSet::empty(), &private_key, 3600, 604_800)
                .unwrap();

        assert!(validate_access_token(&tokens.access_token, WRONG_PUBLIC_KEY).is_err());
    }

    #[test]
    fn test_expired_token_reported_as_expired() {
        let (private_key, public_key) = keys();
        let tokens =
            generate_token_pair(Uuid::now_v7(), &RoleSet::empty(), &private_key, -60, 604_800)
                .unwrap();

        assert!(matches!(
            validate_access_token(&tokens.access_token, &public_key),
            Err(AuthError::TokenExpired)
        ));
    }
}
