use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{
    Category, CategoryPatch, NewCategory, NewProduct, Product, ProductPatch,
};
use crate::store::{Page, StoreResult};

const CATEGORY_COLUMNS: &str = "id, user_id, name, description, image, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
    "id, user_id, category_id, name, price, description, image, created_at, updated_at";

impl Category {
    pub async fn list_by_owner(db: &PgPool, owner: Uuid) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE user_id = $1 ORDER BY name ASC"
        ))
        .bind(owner)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find_owned(db: &PgPool, id: Uuid, owner: Uuid) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn create(db: &PgPool, owner: Uuid, draft: &NewCategory) -> StoreResult<Category> {
        let row = sqlx::query_as::<_, Category>(&format!(
            r#"
            INSERT INTO categories (id, user_id, name, description, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.image)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
        patch: &CategoryPatch,
    ) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(&format!(
            r#"
            UPDATE categories
               SET name = COALESCE($3, name),
                   description = COALESCE($4, description),
                   image = COALESCE($5, image),
                   updated_at = now()
             WHERE id = $1 AND user_id = $2
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(&patch.image)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid, owner: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM categories WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

impl Product {
    /// Newest first.
    pub async fn list_by_owner(db: &PgPool, owner: Uuid, page: Page) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(owner)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn list_in_category(
        db: &PgPool,
        category_id: Uuid,
        owner: Uuid,
    ) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE category_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(category_id)
        .bind(owner)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn count_in_category(db: &PgPool, category_id: Uuid) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE category_id = $1")
            .bind(category_id)
            .fetch_one(db)
            .await?;
        Ok(n)
    }

    pub async fn find_owned(db: &PgPool, id: Uuid, owner: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn create(db: &PgPool, owner: Uuid, draft: &NewProduct) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (id, user_id, category_id, name, price, description, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(draft.category_id)
        .bind(&draft.name)
        .bind(draft.price)
        .bind(&draft.description)
        .bind(&draft.image)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
        patch: &ProductPatch,
    ) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
               SET category_id = COALESCE($3, category_id),
                   name = COALESCE($4, name),
                   price = COALESCE($5, price),
                   description = COALESCE($6, description),
                   image = COALESCE($7, image),
                   updated_at = now()
             WHERE id = $1 AND user_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(patch.category_id)
        .bind(&patch.name)
        .bind(patch.price)
        .bind(&patch.description)
        .bind(&patch.image)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid, owner: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
