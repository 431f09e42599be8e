//! Persistence seam. Services only talk to these traits; [`postgres::PgStore`]
//! runs in production and [`memory::MemoryStore`] backs tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User, UserPatch},
    catalog::repo_types::{
        Category, CategoryPatch, NewCategory, NewProduct, OwnerCounts, Product, ProductPatch,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the constraint name.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    /// A foreign key rejected the write; carries the constraint name.
    #[error("foreign key constraint violated: {0}")]
    ForeignKey(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
            if db.is_foreign_key_violation() {
                return StoreError::ForeignKey(
                    db.constraint().unwrap_or("foreign key").to_string(),
                );
            }
        }
        StoreError::Database(e)
    }
}

impl From<crate::auth::repo_types::UnknownVariant> for StoreError {
    fn from(e: crate::auth::repo_types::UnknownVariant) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(20, 0)
    }
}

/// `?limit=&offset=` as sent by clients.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        let default = Page::default();
        Page::new(q.limit.unwrap_or(default.limit), q.offset.unwrap_or(default.offset))
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
    async fn count_users(&self) -> StoreResult<i64>;
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self, page: Page) -> StoreResult<Vec<User>>;
    /// Inserts a user with the standing given by the bootstrap state. The count
    /// and the insert happen atomically, so exactly one account can ever be
    /// created while the store is empty.
    async fn create_user(&self, draft: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>>;
    /// Also removes the user's categories and products.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;
    async fn owner_counts(&self, user_id: Uuid) -> StoreResult<OwnerCounts>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_categories(&self, owner: Uuid) -> StoreResult<Vec<Category>>;
    async fn find_category(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Category>>;
    /// Unscoped lookup, for checking the owner of a category the caller named.
    async fn find_category_by_id(&self, id: Uuid) -> StoreResult<Option<Category>>;
    async fn create_category(&self, owner: Uuid, draft: NewCategory) -> StoreResult<Category>;
    async fn update_category(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: CategoryPatch,
    ) -> StoreResult<Option<Category>>;
    async fn delete_category(&self, id: Uuid, owner: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list_products(&self, owner: Uuid, page: Page) -> StoreResult<Vec<Product>>;
    async fn list_products_in_category(
        &self,
        category_id: Uuid,
        owner: Uuid,
    ) -> StoreResult<Vec<Product>>;
    async fn count_products_in_category(&self, category_id: Uuid) -> StoreResult<i64>;
    async fn find_product(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Product>>;
    async fn create_product(&self, owner: Uuid, draft: NewProduct) -> StoreResult<Product>;
    async fn update_product(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: ProductPatch,
    ) -> StoreResult<Option<Product>>;
    async fn delete_product(&self, id: Uuid, owner: Uuid) -> StoreResult<bool>;
}

pub trait Store: UserStore + CategoryStore + ProductStore {}

impl<T: UserStore + CategoryStore + ProductStore> Store for T {}
