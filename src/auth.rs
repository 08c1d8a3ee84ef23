//! Identity boundary. Token issuance lives in a separate auth service; this
//! module only verifies the bearer JWT it minted and exposes the caller's
//! identity to handlers. The core trusts the decoded identity unconditionally.

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

/// Claims carried by the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiration (unix seconds)
    pub exp: usize,
}

/// Authenticated user extracted from the JWT token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Admin gate for privileged operations such as order status transitions.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "admin role required".to_string(),
            ))
        }
    }
}

/// Decodes and verifies a bearer token into its claims.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {e}")))?;

    Ok(data.claims)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("malformed authorization header".to_string()))?;

        let claims = decode_token(token, &state.config.jwt_secret)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("token subject is not a user id".to_string()))?;

        Ok(AuthenticatedUser {
            user_id,
            roles: claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn issue(claims: &Claims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_valid_token() {
        let user_id = Uuid::new_v4();
        let token = issue(&Claims {
            sub: user_id.to_string(),
            roles: vec!["admin".into()],
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        });

        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue(&Claims {
            sub: Uuid::new_v4().to_string(),
            roles: vec![],
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        });

        assert!(matches!(
            decode_token(&token, "another-secret-another-secret-32"),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue(&Claims {
            sub: Uuid::new_v4().to_string(),
            roles: vec![],
            exp: (chrono::Utc::now().timestamp() - 3600) as usize,
        });

        assert!(decode_token(&token, SECRET).is_err());
    }

    #[test]
    fn admin_gate() {
        let admin = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            roles: vec!["admin".into()],
        };
        assert!(admin.require_admin().is_ok());

        let customer = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            roles: vec![],
        };
        assert!(matches!(
            customer.require_admin(),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
