use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{claims::SessionClaims, repo_types::Role};

/// Why a request may not proceed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Your account is awaiting admin approval")]
    Unapproved,
    #[error("Your account has been deactivated. Contact an admin.")]
    Inactive,
    #[error("You do not have permission to perform this action")]
    Forbidden,
    /// Missing, or owned by someone else.
    #[error("{0}")]
    NotFound(&'static str),
    #[error("cannot modify own account")]
    SelfAction,
}

/// Second policy step, chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    /// Non-admins need `is_approved` for member routes.
    Approval,
    /// Non-admins need `active` for every authenticated route, login included.
    Activity,
}

impl FromStr for Gate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approval" => Ok(Gate::Approval),
            "active" | "activity" => Ok(Gate::Activity),
            other => Err(format!("expected 'approval' or 'active', got '{other}'")),
        }
    }
}

/// Where an account stands with respect to the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    Pending,
    Approved,
    AdminExempt,
}

impl AccountStatus {
    pub fn of(role: Role, is_approved: bool) -> Self {
        match (role, is_approved) {
            (Role::Admin, _) => AccountStatus::AdminExempt,
            (_, true) => AccountStatus::Approved,
            (_, false) => AccountStatus::Pending,
        }
    }
}

/// The acting identity once a policy has allowed a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&SessionClaims> for Identity {
    fn from(c: &SessionClaims) -> Self {
        Self {
            id: c.id,
            email: c.email.clone(),
            role: c.role,
        }
    }
}

/// Outcome of an owner-or-admin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerAccess {
    pub is_owner: bool,
    pub is_admin: bool,
}

/// Allowed request: who is acting and, if asked, in which capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub identity: Identity,
    pub access: Option<OwnerAccess>,
}

pub fn require_authenticated(claims: Option<&SessionClaims>) -> Result<&SessionClaims, Denial> {
    claims.ok_or(Denial::Unauthenticated)
}

pub fn require_approved(claims: &SessionClaims) -> Result<(), Denial> {
    match AccountStatus::of(claims.role, claims.is_approved) {
        AccountStatus::AdminExempt | AccountStatus::Approved => Ok(()),
        AccountStatus::Pending => Err(Denial::Unapproved),
    }
}

/// `claims` must come from a fresh read of the user record.
pub fn require_active(claims: &SessionClaims) -> Result<(), Denial> {
    if claims.is_admin() || claims.active {
        Ok(())
    } else {
        Err(Denial::Inactive)
    }
}

/// An empty `allowed` set places no restriction on the role.
pub fn require_role(claims: &SessionClaims, allowed: &[Role]) -> Result<(), Denial> {
    if allowed.is_empty() || allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(Denial::Forbidden)
    }
}

pub fn require_owner_or_admin(claims: &SessionClaims, owner_id: Uuid) -> Result<OwnerAccess, Denial> {
    let access = OwnerAccess {
        is_owner: claims.id == owner_id,
        is_admin: claims.is_admin(),
    };
    if access.is_owner || access.is_admin {
        Ok(access)
    } else {
        Err(Denial::Forbidden)
    }
}

/// Admin mutations of a user record must not target the acting admin.
pub fn forbid_self_action(actor: &Identity, target_id: Uuid) -> Result<(), Denial> {
    if actor.id == target_id {
        Err(Denial::SelfAction)
    } else {
        Ok(())
    }
}

/// A conjunction of checks, evaluated in a fixed order:
/// authentication, gate, role, ownership. The first denial is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    approval_required: bool,
    roles: Vec<Role>,
    owner: Option<Uuid>,
}

impl Policy {
    /// Signed in. Under [`Gate::Activity`] the account must still be active.
    pub fn authenticated() -> Self {
        Self {
            approval_required: false,
            roles: Vec::new(),
            owner: None,
        }
    }

    /// Signed in and past the deployment gate.
    pub fn member() -> Self {
        Self {
            approval_required: true,
            ..Self::authenticated()
        }
    }

    pub fn admin() -> Self {
        Self::member().with_roles(&[Role::Admin])
    }

    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn owner_or_admin(mut self, owner_id: Uuid) -> Self {
        self.owner = Some(owner_id);
        self
    }

    pub fn evaluate(&self, claims: Option<&SessionClaims>, gate: Gate) -> Result<Grant, Denial> {
        let claims = require_authenticated(claims)?;
        match gate {
            Gate::Activity => require_active(claims)?,
            Gate::Approval if self.approval_required => require_approved(claims)?,
            Gate::Approval => {}
        }
        require_role(claims, &self.roles)?;
        let access = match self.owner {
            Some(owner_id) => Some(require_owner_or_admin(claims, owner_id)?),
            None => None,
        };
        Ok(Grant {
            identity: Identity::from(claims),
            access,
        })
    }
}
