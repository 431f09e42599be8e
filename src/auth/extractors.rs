use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::{claims::SessionClaims, jwt::JwtKeys};

/// Claims from a valid `Authorization: Bearer <access token>` header, if any.
///
/// Never rejects: a missing, malformed or expired token yields `None` and the
/// policy decides what that means for the route.
pub struct Session(pub Option<SessionClaims>);

impl Session {
    pub fn claims(&self) -> Option<&SessionClaims> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return Ok(Session(None));
        };

        let Some(token) = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
        else {
            warn!("invalid auth scheme");
            return Ok(Session(None));
        };

        let keys = JwtKeys::from_ref(state);
        match keys.verify_access(token) {
            Ok(claims) => Ok(Session(Some(claims.session))),
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                Ok(Session(None))
            }
        }
    }
}
