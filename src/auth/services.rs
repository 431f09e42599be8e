use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    claims::SessionClaims,
    dto::{RegisterRequest, UpdateMeRequest},
    oauth::OAuthProfile,
    password::{hash_password, verify_decoy, verify_password},
    repo_types::{NewUser, Provider, User, UserPatch},
};
use crate::{
    authz::{Denial, Gate, Policy},
    error::{ApiError, ApiResult},
    store::{Store, StoreError},
};

pub const MIN_PASSWORD_LEN: usize = 6;
const MAX_NAME_LEN: usize = 100;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trims a display name; blank becomes `None`.
pub(crate) fn clean_name(raw: Option<String>) -> ApiResult<Option<String>> {
    let Some(name) = raw.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation("Name must be at most 100 characters"));
    }
    Ok(Some(name))
}

/// Login is an authenticated entry point: under the activity gate a
/// deactivated non-admin is refused even with correct credentials.
fn admit(user: &User, gate: Gate) -> ApiResult<()> {
    Policy::authenticated()
        .evaluate(Some(&SessionClaims::from(user)), gate)
        .map(|_| ())
        .map_err(|denial| {
            warn!(user_id = %user.id, ?denial, "sign-in refused");
            ApiError::from(denial)
        })
}

pub async fn register(store: &dyn Store, req: RegisterRequest) -> ApiResult<User> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::validation(
            "Password must be at least 6 characters",
        ));
    }
    let name = clean_name(req.name)?;

    if store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("Email already registered"));
    }

    let hash = hash_password(&req.password).map_err(ApiError::internal)?;
    let draft = NewUser {
        email,
        password_hash: Some(hash),
        name,
        provider: Provider::Credentials,
        provider_id: None,
    };
    // the lookup above can lose a race; the unique index decides
    let user = store.create_user(draft).await.map_err(|e| match e {
        StoreError::Conflict(_) => ApiError::Conflict("Email already registered"),
        other => other.into(),
    })?;
    info!(user_id = %user.id, role = %user.role, approved = user.is_approved, "user created");
    Ok(user)
}

/// Same error for an unknown email, an OAuth-only account and a wrong
/// password. The decoy hash keeps the unknown-email path as slow as a real
/// comparison.
pub async fn verify_credentials(
    store: &dyn Store,
    gate: Gate,
    email: &str,
    password: &str,
) -> ApiResult<User> {
    let email = normalize_email(email);
    let user = store.find_user_by_email(&email).await?;
    let matched = match user.as_ref().and_then(|u| u.password_hash.as_deref()) {
        Some(hash) => verify_password(password, hash).map_err(ApiError::internal)?,
        None => verify_decoy(password),
    };
    let user = match (user, matched) {
        (Some(user), true) => user,
        _ => {
            warn!(email = %email, "login rejected");
            return Err(ApiError::InvalidCredentials);
        }
    };
    admit(&user, gate)?;
    Ok(user)
}

/// Current record for a token subject. A subject that no longer exists is
/// treated as signed out.
pub async fn current_user(store: &dyn Store, id: Uuid) -> ApiResult<User> {
    store
        .find_user_by_id(id)
        .await?
        .ok_or(ApiError::Denied(Denial::Unauthenticated))
}

pub async fn refresh(store: &dyn Store, gate: Gate, id: Uuid) -> ApiResult<User> {
    let user = current_user(store, id).await?;
    admit(&user, gate)?;
    Ok(user)
}

/// Finds the account for a provider identity by email, creating it through
/// the bootstrap rule when there is none.
pub async fn oauth_sign_in(store: &dyn Store, gate: Gate, profile: OAuthProfile) -> ApiResult<User> {
    let email = normalize_email(&profile.email);
    if !is_valid_email(&email) {
        warn!(provider = %profile.provider, "provider returned an invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if let Some(user) = store.find_user_by_email(&email).await? {
        admit(&user, gate)?;
        info!(user_id = %user.id, provider = %profile.provider, "oauth sign-in");
        return Ok(user);
    }

    let draft = NewUser {
        email: email.clone(),
        password_hash: None,
        name: clean_name(profile.name)?,
        provider: profile.provider,
        provider_id: Some(profile.provider_account_id),
    };
    let user = match store.create_user(draft).await {
        Ok(user) => user,
        // a concurrent callback for the same email got there first
        Err(StoreError::Conflict(_)) => store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("user vanished after conflict")))?,
        Err(e) => return Err(e.into()),
    };
    admit(&user, gate)?;
    info!(user_id = %user.id, provider = %user.provider, role = %user.role, "oauth user created");
    Ok(user)
}

/// Self-service update. Only the display name can be changed here.
pub async fn update_me(store: &dyn Store, id: Uuid, req: UpdateMeRequest) -> ApiResult<User> {
    if req.role.is_some() || req.is_approved.is_some() || req.active.is_some() {
        warn!(user_id = %id, "self-service standing change refused");
        return Err(Denial::Forbidden.into());
    }
    let patch = UserPatch {
        name: clean_name(req.name)?,
        ..Default::default()
    };
    if patch.is_empty() {
        return current_user(store, id).await;
    }
    store
        .update_user(id, patch)
        .await?
        .ok_or(ApiError::Denied(Denial::Unauthenticated))
}
