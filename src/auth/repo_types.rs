use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. `Market` is a seller role with no extra privileges over `User`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Market,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Market => "market",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "market" => Ok(Role::Market),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// How an account signs in. Fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Credentials,
    Google,
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Credentials => "credentials",
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credentials" => Ok(Provider::Credentials),
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

/// User record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>, // Argon2 PHC string, credentials accounts only
    pub name: Option<String>,
    pub role: Role,
    pub provider: Provider,
    pub provider_id: Option<String>,
    pub is_approved: bool,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Row as stored in `users`; enums are kept as text columns.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub role: String,
    pub provider: String,
    pub provider_id: Option<String>,
    pub is_approved: bool,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = UnknownVariant;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            name: r.name,
            role: r.role.parse()?,
            provider: r.provider.parse()?,
            provider_id: r.provider_id,
            is_approved: r.is_approved,
            active: r.active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Everything needed to create a user. Role and approval are not part of
/// the draft; the store assigns them from the bootstrap state.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub provider: Provider,
    pub provider_id: Option<String>,
}

/// Partial update of a user. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_approved: Option<bool>,
    pub active: Option<bool>,
}

impl UserPatch {
    /// True if the patch touches fields only an admin may change.
    pub fn touches_standing(&self) -> bool {
        self.role.is_some() || self.is_approved.is_some() || self.active.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && !self.touches_standing()
    }
}
