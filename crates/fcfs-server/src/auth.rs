//! Bearer-credential extraction.
//!
//! The perimeter (gateway) verifies token signatures before requests reach
//! this service; here the JWT payload segment is decoded only to recover the
//! caller's tenant (and optional user/role). Anything missing or malformed is
//! a 401 — tenant resolution never falls back.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fcfs_db::ActorContext;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// The authenticated caller: tenant identity plus audit actor fields.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: Uuid,
    pub actor: ActorContext,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    tenant_id: Uuid,
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    role: Option<String>,
}

pub(crate) fn decode_claims(token: &str) -> Option<AuthContext> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    let claims: TokenClaims = serde_json::from_slice(&bytes).ok()?;

    Some(AuthContext {
        tenant_id: claims.tenant_id,
        actor: ActorContext {
            user_id: claims.user_id,
            role: claims.role,
        },
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(ApiError::unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(ApiError::unauthorized)?;

        decode_claims(token).ok_or_else(ApiError::unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Unsigned test token in JWT wire format (signature is not checked here).
    pub(crate) fn bearer_token(tenant_id: Uuid, user_id: Option<Uuid>) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({
                "tenant_id": tenant_id,
                "user_id": user_id,
                "role": "subcontractor",
            }))
            .unwrap(),
        );
        let signature = URL_SAFE_NO_PAD.encode(b"sig");
        format!("{header}.{payload}.{signature}")
    }

    #[test]
    fn decodes_tenant_and_actor_claims() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let ctx = decode_claims(&bearer_token(tenant, Some(user))).unwrap();
        assert_eq!(ctx.tenant_id, tenant);
        assert_eq!(ctx.actor.user_id, Some(user));
        assert_eq!(ctx.actor.role.as_deref(), Some("subcontractor"));
    }

    #[test]
    fn user_id_is_optional() {
        let tenant = Uuid::new_v4();
        let ctx = decode_claims(&bearer_token(tenant, None)).unwrap();
        assert_eq!(ctx.actor.user_id, None);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(decode_claims("no-dots-here").is_none());
        assert!(decode_claims("a.b").is_none());
        assert!(decode_claims("a.b.c.d").is_none());
        assert!(decode_claims("a.!!!notbase64!!!.c").is_none());

        // Valid base64 but no tenant claim.
        let payload = URL_SAFE_NO_PAD.encode(br#"{"user_id":null}"#);
        assert!(decode_claims(&format!("h.{payload}.s")).is_none());
    }
}
