use serde::{Deserialize, Serialize};

use crate::auth::{
    dto::PublicUser,
    repo_types::{Role, User},
};
use crate::catalog::repo_types::OwnerCounts;

/// Admin or owner update of a user. `role`, `isApproved` and `active` are
/// admin-only.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_approved: Option<bool>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(flatten)]
    pub user: PublicUser,
    pub category_count: i64,
    pub product_count: i64,
}

impl UserStats {
    pub fn new(user: &User, counts: OwnerCounts) -> Self {
        Self {
            user: PublicUser::from(user),
            category_count: counts.category_count,
            product_count: counts.product_count,
        }
    }
}
