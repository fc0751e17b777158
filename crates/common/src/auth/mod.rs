//! Authentication and authorization utilities
//!
//! Credentials are issued by the identity service; this module only
//! validates its HS256 bearer tokens and turns them into a [`Principal`].

use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Role of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Mentor => "mentor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller available to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Require a specific role, returning error if not present
    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: format!("This action requires the {} role", role),
            })
        }
    }

    /// Require one of several roles
    pub fn require_any(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: format!("Role {} may not perform this action", self.role),
            })
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    pub role: Role,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// JWT token validator
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    leeway_secs: u64,
}

impl JwtManager {
    /// Create a new JWT manager with the identity service's secret
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            leeway_secs,
        }
    }

    /// Issue a token; used by local tooling and tests
    pub fn issue(&self, principal: Principal, ttl: Duration) -> Result<String> {
        let claims = JwtClaims {
            sub: principal.user_id.to_string(),
            role: principal.role,
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to issue token: {}", e),
        })
    }

    /// Validate a token and resolve the caller
    pub fn authenticate(&self, token: &str) -> Result<Principal> {
        let mut validation = Validation::default();
        validation.leeway = self.leeway_secs;

        let claims = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid bearer token".to_string(),
                },
            })?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized {
            message: "Token subject is not a valid user id".to_string(),
        })?;

        Ok(Principal::new(user_id, claims.role))
    }
}

/// Extract the token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Axum extractor for Principal
impl<S> FromRequestParts<S> for Principal
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Expected a bearer token".to_string(),
        })?;

        let manager = Arc::<JwtManager>::from_ref(state);
        manager.authenticate(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }

    #[test]
    fn test_token_round_trip() {
        let manager = JwtManager::new("test_secret", 0);
        let principal = Principal::new(Uuid::new_v4(), Role::Mentor);

        let token = manager.issue(principal, Duration::hours(1)).unwrap();
        assert_eq!(manager.authenticate(&token).unwrap(), principal);
    }

    #[test]
    fn test_expired_token() {
        let manager = JwtManager::new("test_secret", 0);
        let principal = Principal::new(Uuid::new_v4(), Role::Student);

        let token = manager.issue(principal, Duration::hours(-1)).unwrap();
        assert!(matches!(manager.authenticate(&token), Err(AppError::ExpiredToken)));
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let issuer = JwtManager::new("issuer_secret", 0);
        let verifier = JwtManager::new("other_secret", 0);
        let token = issuer
            .issue(Principal::new(Uuid::new_v4(), Role::Admin), Duration::hours(1))
            .unwrap();

        assert!(matches!(
            verifier.authenticate(&token),
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_role_checks() {
        let student = Principal::new(Uuid::new_v4(), Role::Student);
        assert!(student.require_role(Role::Student).is_ok());
        assert!(matches!(
            student.require_role(Role::Admin),
            Err(AppError::Forbidden { .. })
        ));
        assert!(student.require_any(&[Role::Student, Role::Mentor]).is_ok());
        assert!(student.require_any(&[Role::Mentor]).is_err());
    }
}
