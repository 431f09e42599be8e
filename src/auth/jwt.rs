use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{OAuthStateClaims, SessionClaims, TokenClaims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Access and refresh token issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(1) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

fn now_and_exp(ttl: Duration) -> (usize, usize) {
    let now = OffsetDateTime::now_utc();
    let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
    (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
}

impl JwtKeys {
    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    fn sign_with_kind(&self, session: &SessionClaims, kind: TokenKind) -> anyhow::Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let (iat, exp) = now_and_exp(ttl);
        let claims = TokenClaims {
            session: session.clone(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %session.id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, session: &SessionClaims) -> anyhow::Result<String> {
        self.sign_with_kind(session, TokenKind::Access)
    }

    pub fn sign_refresh(&self, session: &SessionClaims) -> anyhow::Result<String> {
        self.sign_with_kind(session, TokenKind::Refresh)
    }

    pub fn issue(&self, session: &SessionClaims) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign_access(session)?,
            refresh_token: self.sign_refresh(session)?,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<TokenClaims> {
        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation())?;
        debug!(user_id = %data.claims.session.id, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<TokenClaims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            anyhow::bail!("not an access token");
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<TokenClaims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }

    /// Signs the `state` for an authorize redirect. `nonce` is also handed
    /// to the browser, which must present it again at the callback.
    pub fn sign_oauth_state(&self, provider: &str, nonce: Uuid) -> anyhow::Result<String> {
        let (iat, exp) = now_and_exp(OAUTH_STATE_TTL);
        let claims = OAuthStateClaims {
            provider: provider.to_string(),
            nonce,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_oauth_state(&self, state: &str, provider: &str, nonce: Uuid) -> anyhow::Result<()> {
        let data = decode::<OAuthStateClaims>(state, &self.decoding, &self.validation())?;
        if data.claims.provider != provider {
            anyhow::bail!("oauth state issued for another provider");
        }
        if data.claims.nonce != nonce {
            anyhow::bail!("oauth state issued to another browser");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn session() -> SessionClaims {
        SessionClaims {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            name: Some("User".into()),
            role: Role::User,
            is_approved: false,
            active: true,
        }
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let s = session();
        let token = keys.sign_access(&s).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.session, s);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn sign_and_verify_refresh_token_and_verify_refresh() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let s = session();
        let pair = keys.issue(&s).expect("issue pair");
        let claims = keys.verify_refresh(&pair.refresh_token).expect("verify refresh");
        assert_eq!(claims.session.id, s.id);
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let pair = keys.issue(&session()).expect("issue pair");
        let err = keys.verify_refresh(&pair.access_token).unwrap_err();
        assert!(err.to_string().contains("not a refresh token"));
        let err = keys.verify_access(&pair.refresh_token).unwrap_err();
        assert!(err.to_string().contains("not an access token"));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign_access(&session()).expect("sign access");
        assert!(bad_keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_other_secret() {
        let a = make_keys("secret-a", "iss", "aud");
        let b = make_keys("secret-b", "iss", "aud");
        let token = a.sign_access(&session()).expect("sign access");
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn oauth_state_is_bound_to_provider_and_nonce() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let nonce = Uuid::new_v4();
        let state = keys.sign_oauth_state("github", nonce).unwrap();
        assert!(keys.verify_oauth_state(&state, "github", nonce).is_ok());
        assert!(keys.verify_oauth_state(&state, "google", nonce).is_err());
        let err = keys.verify_oauth_state(&state, "github", Uuid::new_v4()).unwrap_err();
        assert!(err.to_string().contains("another browser"));
        // a session token is not a valid state
        let token = keys.sign_access(&session()).unwrap();
        assert!(keys.verify_oauth_state(&token, "github", nonce).is_err());
    }
}
