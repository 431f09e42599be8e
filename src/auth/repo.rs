use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User, UserPatch, UserRow},
    authz::BootstrapState,
    catalog::repo_types::OwnerCounts,
    store::{Page, StoreError, StoreResult},
};

const USER_COLUMNS: &str = "id, email, password_hash, name, role, provider, provider_id, \
                            is_approved, active, created_at, updated_at";

/// Advisory lock key serializing user creation, so the bootstrap count and
/// the insert cannot interleave between two first registrations.
const USER_CREATE_LOCK: i64 = 0x5553_4552_4352_4541;

impl User {
    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::try_from).transpose()?)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::try_from).transpose()?)
    }

    pub async fn count(db: &PgPool) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;
        Ok(n)
    }

    /// Oldest accounts first.
    pub async fn list(db: &PgPool, page: Page) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await?;
        rows.into_iter()
            .map(|r| User::try_from(r).map_err(StoreError::from))
            .collect()
    }

    /// Create a user; role and approval come from the bootstrap state observed
    /// under the creation lock.
    pub async fn create(db: &PgPool, draft: &NewUser) -> StoreResult<User> {
        let mut tx = db.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(USER_CREATE_LOCK)
            .execute(&mut *tx)
            .await?;

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        let standing = BootstrapState::from_user_count(count).initial_standing();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, provider, provider_id, is_approved, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&draft.email)
        .bind(&draft.password_hash)
        .bind(&draft.name)
        .bind(standing.role.as_str())
        .bind(draft.provider.as_str())
        .bind(&draft.provider_id)
        .bind(standing.is_approved)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(User::try_from(row)?)
    }

    pub async fn update(db: &PgPool, id: Uuid, patch: &UserPatch) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   role = COALESCE($3, role),
                   is_approved = COALESCE($4, is_approved),
                   active = COALESCE($5, active),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.is_approved)
        .bind(patch.active)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::try_from).transpose()?)
    }

    /// Categories and products go with the user (ON DELETE CASCADE).
    pub async fn delete(db: &PgPool, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn owner_counts(db: &PgPool, id: Uuid) -> StoreResult<OwnerCounts> {
        let counts = sqlx::query_as::<_, OwnerCounts>(
            r#"
            SELECT (SELECT COUNT(*) FROM categories WHERE user_id = $1) AS category_count,
                   (SELECT COUNT(*) FROM products   WHERE user_id = $1) AS product_count
            "#,
        )
        .bind(id)
        .fetch_one(db)
        .await?;
        Ok(counts)
    }
}
