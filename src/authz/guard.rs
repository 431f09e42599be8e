use tracing::warn;

use super::policy::{require_authenticated, Denial, Gate, Grant, Policy};
use crate::{
    auth::claims::SessionClaims,
    error::{ApiError, ApiResult},
    store::Store,
};

/// Runs `policy` for a request.
///
/// The token snapshot only names the caller; role, approval and activity are
/// re-read from the store so that admin changes apply on the next request.
/// A token whose user no longer exists is treated as no token.
pub async fn authorize(
    store: &dyn Store,
    gate: Gate,
    claims: Option<&SessionClaims>,
    policy: &Policy,
) -> ApiResult<Grant> {
    let claims = require_authenticated(claims)?;
    let Some(user) = store.find_user_by_id(claims.id).await? else {
        warn!(user_id = %claims.id, "token for unknown user");
        return Err(Denial::Unauthenticated.into());
    };
    let fresh = SessionClaims::from(&user);
    policy.evaluate(Some(&fresh), gate).map_err(|denial| {
        warn!(user_id = %fresh.id, role = %fresh.role, ?denial, "request denied");
        ApiError::from(denial)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::repo_types::{NewUser, Provider, Role, UserPatch},
        store::{MemoryStore, UserStore},
    };

    fn draft(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: None,
            name: None,
            provider: Provider::Credentials,
            provider_id: None,
        }
    }

    #[tokio::test]
    async fn stale_snapshot_does_not_outlive_approval() {
        let store = MemoryStore::new();
        let _admin = store.create_user(draft("a@x.com")).await.unwrap();
        let b = store.create_user(draft("b@x.com")).await.unwrap();
        let snapshot = SessionClaims::from(&b);

        let err = authorize(&store, Gate::Approval, Some(&snapshot), &Policy::member())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::Unapproved)));

        store
            .update_user(b.id, UserPatch { is_approved: Some(true), ..Default::default() })
            .await
            .unwrap();
        let grant = authorize(&store, Gate::Approval, Some(&snapshot), &Policy::member())
            .await
            .unwrap();
        assert_eq!(grant.identity.id, b.id);
    }

    #[tokio::test]
    async fn deactivation_applies_even_with_an_active_snapshot() {
        let store = MemoryStore::new();
        let _admin = store.create_user(draft("a@x.com")).await.unwrap();
        let b = store.create_user(draft("b@x.com")).await.unwrap();
        let snapshot = SessionClaims::from(&b);
        store
            .update_user(b.id, UserPatch { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        let err = authorize(&store, Gate::Activity, Some(&snapshot), &Policy::authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::Inactive)));
    }

    #[tokio::test]
    async fn forged_admin_snapshot_is_not_trusted() {
        let store = MemoryStore::new();
        let _admin = store.create_user(draft("a@x.com")).await.unwrap();
        let b = store.create_user(draft("b@x.com")).await.unwrap();
        let mut snapshot = SessionClaims::from(&b);
        snapshot.role = Role::Admin;
        let err = authorize(&store, Gate::Approval, Some(&snapshot), &Policy::admin())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::Unapproved)));
    }

    #[tokio::test]
    async fn deleted_user_is_unauthenticated() {
        let store = MemoryStore::new();
        let a = store.create_user(draft("a@x.com")).await.unwrap();
        let snapshot = SessionClaims::from(&a);
        store.delete_user(a.id).await.unwrap();
        let err = authorize(&store, Gate::Approval, Some(&snapshot), &Policy::authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::Unauthenticated)));
    }
}
