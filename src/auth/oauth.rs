use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::repo_types::Provider;
use crate::config::{OAuthConfig, OAuthCredentials};

const USER_AGENT: &str = "catalog-api";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("provider '{0}' is not enabled")]
    Disabled(String),
    #[error("provider did not return a usable email address")]
    NoEmail,
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),
}

/// Identity reported by a provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: Provider,
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait OAuthClient: Send + Sync {
    fn is_enabled(&self, provider: Provider) -> bool;
    fn authorize_url(&self, provider: Provider, state: &str) -> Result<String, OAuthError>;
    async fn exchange(&self, provider: Provider, code: &str) -> Result<OAuthProfile, OAuthError>;
}

/// Google and GitHub authorization-code flow over HTTPS.
pub struct HttpOAuthClient {
    http: Client,
    google: Option<OAuthCredentials>,
    github: Option<OAuthCredentials>,
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl HttpOAuthClient {
    pub fn new(config: &OAuthConfig, public_url: &str) -> Self {
        Self {
            http: Client::new(),
            google: config.google.clone(),
            github: config.github.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn credentials(&self, provider: Provider) -> Result<&OAuthCredentials, OAuthError> {
        let creds = match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Github => self.github.as_ref(),
            Provider::Credentials => None,
        };
        creds.ok_or_else(|| OAuthError::Disabled(provider.to_string()))
    }

    fn redirect_uri(&self, provider: Provider) -> String {
        format!("{}/api/auth/callback/{}", self.public_url, provider)
    }

    async fn exchange_code(
        &self,
        token_url: &str,
        provider: Provider,
        code: &str,
    ) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);
        let resp: TokenResponse = self
            .http
            .post(token_url)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;
        match resp.access_token {
            Some(token) => Ok(token),
            None => {
                let reason = resp
                    .error_description
                    .or(resp.error)
                    .unwrap_or_else(|| "no access token".into());
                warn!(%provider, %reason, "oauth code exchange failed");
                Err(OAuthError::Rejected(reason))
            }
        }
    }

    async fn google_profile(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let token = self
            .exchange_code("https://oauth2.googleapis.com/token", Provider::Google, code)
            .await?;
        let info: GoogleUserInfo = self
            .http
            .get("https://openidconnect.googleapis.com/v1/userinfo")
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let email = info
            .email
            .filter(|_| info.email_verified)
            .ok_or(OAuthError::NoEmail)?;
        Ok(OAuthProfile {
            provider: Provider::Google,
            provider_account_id: info.sub,
            email,
            name: info.name,
        })
    }

    async fn github_profile(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let token = self
            .exchange_code("https://github.com/login/oauth/access_token", Provider::Github, code)
            .await?;
        let user: GithubUser = self
            .http
            .get("https://api.github.com/user")
            .bearer_auth(&token)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // profile email is optional and may be private; fall back to the primary verified one
        let email = match user.email {
            Some(email) => email,
            None => {
                let emails: Vec<GithubEmail> = self
                    .http
                    .get("https://api.github.com/user/emails")
                    .bearer_auth(&token)
                    .header(header::USER_AGENT, USER_AGENT)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .ok_or(OAuthError::NoEmail)?
            }
        };
        Ok(OAuthProfile {
            provider: Provider::Github,
            provider_account_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
        })
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    fn is_enabled(&self, provider: Provider) -> bool {
        self.credentials(provider).is_ok()
    }

    fn authorize_url(&self, provider: Provider, state: &str) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);
        let (base, scope) = match provider {
            Provider::Google => ("https://accounts.google.com/o/oauth2/v2/auth", "openid email profile"),
            Provider::Github => ("https://github.com/login/oauth/authorize", "read:user user:email"),
            Provider::Credentials => return Err(OAuthError::Disabled(provider.to_string())),
        };
        let url = Url::parse_with_params(
            base,
            &[
                ("client_id", creds.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope),
                ("state", state),
            ],
        )
        .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange(&self, provider: Provider, code: &str) -> Result<OAuthProfile, OAuthError> {
        let profile = match provider {
            Provider::Google => self.google_profile(code).await?,
            Provider::Github => self.github_profile(code).await?,
            Provider::Credentials => return Err(OAuthError::Disabled(provider.to_string())),
        };
        debug!(%provider, account = %profile.provider_account_id, "oauth profile fetched");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpOAuthClient {
        HttpOAuthClient::new(
            &OAuthConfig {
                google: None,
                github: Some(OAuthCredentials {
                    client_id: "gh-id".into(),
                    client_secret: "gh-secret".into(),
                }),
            },
            "https://catalog.example.com/",
        )
    }

    #[test]
    fn authorize_url_carries_client_redirect_and_state() {
        let url = client().authorize_url(Provider::Github, "st4te").unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("github.com"));
        let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(params.contains(&("client_id".into(), "gh-id".into())));
        assert!(params.contains(&("state".into(), "st4te".into())));
        assert!(params.contains(&(
            "redirect_uri".into(),
            "https://catalog.example.com/api/auth/callback/github".into()
        )));
    }

    #[test]
    fn unconfigured_provider_is_disabled() {
        assert!(client().is_enabled(Provider::Github));
        assert!(!client().is_enabled(Provider::Google));
        let err = client().authorize_url(Provider::Google, "s").unwrap_err();
        assert!(matches!(err, OAuthError::Disabled(p) if p == "google"));
        let err = client().authorize_url(Provider::Credentials, "s").unwrap_err();
        assert!(matches!(err, OAuthError::Disabled(_)));
    }

    #[tokio::test]
    async fn exchange_with_unconfigured_provider_fails_without_network() {
        let err = client().exchange(Provider::Google, "code").await.unwrap_err();
        assert!(matches!(err, OAuthError::Disabled(_)));
    }
}
