use async_trait::async_trait;
use uuid::Uuid;

use super::{CategoryStore, Page, ProductStore, StoreResult, UserStore};
use crate::{
    auth::repo_types::{NewUser, User, UserPatch},
    catalog::repo_types::{
        Category, CategoryPatch, NewCategory, NewProduct, OwnerCounts, Product, ProductPatch,
    },
    db::Database,
};

/// Store backed by Postgres through the lazily connected [`Database`] pool.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        let pool = self.db.pool().await?;
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        User::count(self.db.pool().await?).await
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        User::find_by_id(self.db.pool().await?, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        User::find_by_email(self.db.pool().await?, email).await
    }

    async fn list_users(&self, page: Page) -> StoreResult<Vec<User>> {
        User::list(self.db.pool().await?, page).await
    }

    async fn create_user(&self, draft: NewUser) -> StoreResult<User> {
        User::create(self.db.pool().await?, &draft).await
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        User::update(self.db.pool().await?, id, &patch).await
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        User::delete(self.db.pool().await?, id).await
    }

    async fn owner_counts(&self, user_id: Uuid) -> StoreResult<OwnerCounts> {
        User::owner_counts(self.db.pool().await?, user_id).await
    }
}

#[async_trait]
impl CategoryStore for PgStore {
    async fn list_categories(&self, owner: Uuid) -> StoreResult<Vec<Category>> {
        Category::list_by_owner(self.db.pool().await?, owner).await
    }

    async fn find_category(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Category>> {
        Category::find_owned(self.db.pool().await?, id, owner).await
    }

    async fn find_category_by_id(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Category::find_by_id(self.db.pool().await?, id).await
    }

    async fn create_category(&self, owner: Uuid, draft: NewCategory) -> StoreResult<Category> {
        Category::create(self.db.pool().await?, owner, &draft).await
    }

    async fn update_category(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: CategoryPatch,
    ) -> StoreResult<Option<Category>> {
        Category::update(self.db.pool().await?, id, owner, &patch).await
    }

    async fn delete_category(&self, id: Uuid, owner: Uuid) -> StoreResult<bool> {
        Category::delete(self.db.pool().await?, id, owner).await
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn list_products(&self, owner: Uuid, page: Page) -> StoreResult<Vec<Product>> {
        Product::list_by_owner(self.db.pool().await?, owner, page).await
    }

    async fn list_products_in_category(
        &self,
        category_id: Uuid,
        owner: Uuid,
    ) -> StoreResult<Vec<Product>> {
        Product::list_in_category(self.db.pool().await?, category_id, owner).await
    }

    async fn count_products_in_category(&self, category_id: Uuid) -> StoreResult<i64> {
        Product::count_in_category(self.db.pool().await?, category_id).await
    }

    async fn find_product(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Product>> {
        Product::find_owned(self.db.pool().await?, id, owner).await
    }

    async fn create_product(&self, owner: Uuid, draft: NewProduct) -> StoreResult<Product> {
        Product::create(self.db.pool().await?, owner, &draft).await
    }

    async fn update_product(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: ProductPatch,
    ) -> StoreResult<Option<Product>> {
        Product::update(self.db.pool().await?, id, owner, &patch).await
    }

    async fn delete_product(&self, id: Uuid, owner: Uuid) -> StoreResult<bool> {
        Product::delete(self.db.pool().await?, id, owner).await
    }
}
