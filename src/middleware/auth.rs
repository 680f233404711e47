use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// Caller identity threaded into every service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
    pub role: Role,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, actor_id: Uuid, role: Role) -> Self {
        Self {
            tenant_id,
            actor_id,
            role,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Teacher)
    }

    pub fn require_staff(&self) -> crate::error::Result<()> {
        if !self.is_staff() {
            return Err(Error::Forbidden(
                "This action requires a teacher or admin role".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<Claims> for TenantContext {
    fn from(claims: Claims) -> Self {
        TenantContext::new(claims.tenant_id, claims.sub, claims.role)
    }
}

pub fn decode_claims(token: &str, secret: &str) -> crate::error::Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| Error::Unauthorized("invalid_token".to_string()))
}

pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Error::Unauthorized("missing_authorization".to_string()).into_response();
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Error::Unauthorized("bad_authorization".to_string()).into_response();
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Error::Unauthorized("unsupported_scheme".to_string()).into_response();
    };

    match decode_claims(token, &state.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(TenantContext::from(claims));
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .copied()
            .ok_or_else(|| Error::Unauthorized("missing_authorization".to_string()))
    }
}
