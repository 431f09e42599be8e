use std::str::FromStr;

use serde::Deserialize;

use crate::authz::Gate;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Client credentials for one OAuth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthConfig {
    pub google: Option<OAuthCredentials>,
    pub github: Option<OAuthCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub gate: Gate,
    pub public_url: String,
    pub oauth: OAuthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "catalog-api".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "catalog-users".into()),
            ttl_minutes: parse_or("JWT_TTL_MINUTES", 60 * 24),
            refresh_ttl_minutes: parse_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let gate = match std::env::var("ACCESS_GATE") {
            Ok(v) => v
                .parse::<Gate>()
                .map_err(|e| anyhow::anyhow!("ACCESS_GATE: {e}"))?,
            Err(_) => Gate::Approval,
        };
        let public_url = std::env::var("PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        let oauth = OAuthConfig {
            google: credentials("GOOGLE_ID", "GOOGLE_SECRET"),
            github: credentials("GITHUB_ID", "GITHUB_SECRET"),
        };
        Ok(Self {
            database_url,
            database_max_connections,
            jwt,
            gate,
            public_url,
            oauth,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn credentials(id_key: &str, secret_key: &str) -> Option<OAuthCredentials> {
    match (std::env::var(id_key), std::env::var(secret_key)) {
        (Ok(client_id), Ok(client_secret)) if !client_id.is_empty() && !client_secret.is_empty() => {
            Some(OAuthCredentials {
                client_id,
                client_secret,
            })
        }
        _ => None,
    }
}
