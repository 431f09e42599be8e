use tracing::info;
use uuid::Uuid;

use super::dto::UpdateUserRequest;
use crate::{
    auth::{
        repo_types::{User, UserPatch},
        services::clean_name,
    },
    authz::{forbid_self_action, Denial, Grant},
    catalog::repo_types::OwnerCounts,
    error::{ApiError, ApiResult},
    store::{Page, Store},
};

pub async fn list(store: &dyn Store, page: Page) -> ApiResult<Vec<User>> {
    Ok(store.list_users(page).await?)
}

pub async fn get(store: &dyn Store, id: Uuid) -> ApiResult<User> {
    store
        .find_user_by_id(id)
        .await?
        .ok_or(ApiError::Denied(Denial::NotFound("User not found")))
}

/// Applies an update already allowed for the owner or an admin. Standing
/// changes additionally need the admin role and may not target the actor.
pub async fn update(
    store: &dyn Store,
    grant: &Grant,
    target_id: Uuid,
    req: UpdateUserRequest,
) -> ApiResult<User> {
    let patch = UserPatch {
        name: clean_name(req.name)?,
        role: req.role,
        is_approved: req.is_approved,
        active: req.active,
    };

    if patch.touches_standing() {
        if !grant.identity.is_admin() {
            return Err(Denial::Forbidden.into());
        }
        forbid_self_action(&grant.identity, target_id)?;
    }

    if patch.is_empty() {
        return get(store, target_id).await;
    }

    let user = store
        .update_user(target_id, patch.clone())
        .await?
        .ok_or(ApiError::Denied(Denial::NotFound("User not found")))?;
    if patch.touches_standing() {
        info!(
            actor = %grant.identity.id,
            target = %user.id,
            role = %user.role,
            approved = user.is_approved,
            active = user.active,
            "user standing changed"
        );
    }
    Ok(user)
}

pub async fn delete(store: &dyn Store, grant: &Grant, target_id: Uuid) -> ApiResult<()> {
    forbid_self_action(&grant.identity, target_id)?;
    if !store.delete_user(target_id).await? {
        return Err(ApiError::Denied(Denial::NotFound("User not found")));
    }
    info!(actor = %grant.identity.id, target = %target_id, "user deleted");
    Ok(())
}

pub async fn stats(store: &dyn Store, page: Page) -> ApiResult<Vec<(User, OwnerCounts)>> {
    let users = store.list_users(page).await?;
    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let counts = store.owner_counts(user.id).await?;
        out.push((user, counts));
    }
    Ok(out)
}
