use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CategoryStore, Page, ProductStore, StoreError, StoreResult, UserStore};
use crate::{
    auth::repo_types::{NewUser, User, UserPatch},
    authz::BootstrapState,
    catalog::repo_types::{
        Category, CategoryPatch, NewCategory, NewProduct, OwnerCounts, Product, ProductPatch,
    },
};

/// In-process store with the same constraints as the Postgres schema:
/// unique email, unique category name per owner, products must reference an
/// existing category, user deletion cascades.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>, // creation order
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn window<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.inner.read().await.users.len() as i64)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, page: Page) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        Ok(window(inner.users.clone(), page))
    }

    async fn create_user(&self, draft: NewUser) -> StoreResult<User> {
        // one write guard covers the count and the insert
        let mut inner = self.inner.write().await;
        if inner.users.iter().any(|u| u.email == draft.email) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        let standing = BootstrapState::from_user_count(inner.users.len() as i64).initial_standing();
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: draft.email,
            password_hash: draft.password_hash,
            name: draft.name,
            role: standing.role,
            provider: draft.provider,
            provider_id: draft.provider_id,
            is_approved: standing.is_approved,
            active: true,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.name = Some(name);
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(is_approved) = patch.is_approved {
            user.is_approved = is_approved;
        }
        if let Some(active) = patch.active {
            user.active = active;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        if inner.users.len() == before {
            return Ok(false);
        }
        inner.products.retain(|_, p| p.user_id != id);
        inner.categories.retain(|_, c| c.user_id != id);
        Ok(true)
    }

    async fn owner_counts(&self, user_id: Uuid) -> StoreResult<OwnerCounts> {
        let inner = self.inner.read().await;
        Ok(OwnerCounts {
            category_count: inner.categories.values().filter(|c| c.user_id == user_id).count() as i64,
            product_count: inner.products.values().filter(|p| p.user_id == user_id).count() as i64,
        })
    }
}

impl Inner {
    fn name_taken(&self, owner: Uuid, name: &str, except: Option<Uuid>) -> bool {
        self.categories
            .values()
            .any(|c| c.user_id == owner && c.name == name && Some(c.id) != except)
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn list_categories(&self, owner: Uuid) -> StoreResult<Vec<Category>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Category> = inner
            .categories
            .values()
            .filter(|c| c.user_id == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn find_category(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Category>> {
        let inner = self.inner.read().await;
        Ok(inner.categories.get(&id).filter(|c| c.user_id == owner).cloned())
    }

    async fn find_category_by_id(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.inner.read().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, owner: Uuid, draft: NewCategory) -> StoreResult<Category> {
        let mut inner = self.inner.write().await;
        if !inner.users.iter().any(|u| u.id == owner) {
            return Err(StoreError::ForeignKey("categories_user_id_fkey".into()));
        }
        if inner.name_taken(owner, &draft.name, None) {
            return Err(StoreError::Conflict("categories_owner_name_key".into()));
        }
        let now = OffsetDateTime::now_utc();
        let category = Category {
            id: Uuid::new_v4(),
            user_id: owner,
            name: draft.name,
            description: draft.description,
            image: draft.image,
            created_at: now,
            updated_at: now,
        };
        inner.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: CategoryPatch,
    ) -> StoreResult<Option<Category>> {
        let mut inner = self.inner.write().await;
        if !inner.categories.get(&id).is_some_and(|c| c.user_id == owner) {
            return Ok(None);
        }
        if let Some(name) = patch.name.as_deref() {
            if inner.name_taken(owner, name, Some(id)) {
                return Err(StoreError::Conflict("categories_owner_name_key".into()));
            }
        }
        let Some(category) = inner.categories.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            category.name = name;
        }
        if let Some(description) = patch.description {
            category.description = description;
        }
        if let Some(image) = patch.image {
            category.image = image;
        }
        category.updated_at = OffsetDateTime::now_utc();
        Ok(Some(category.clone()))
    }

    async fn delete_category(&self, id: Uuid, owner: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.categories.get(&id).is_some_and(|c| c.user_id == owner) {
            return Ok(false);
        }
        if inner.products.values().any(|p| p.category_id == id) {
            return Err(StoreError::ForeignKey("products_category_id_fkey".into()));
        }
        inner.categories.remove(&id);
        Ok(true)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self, owner: Uuid, page: Page) -> StoreResult<Vec<Product>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Product> = inner
            .products
            .values()
            .filter(|p| p.user_id == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(window(out, page))
    }

    async fn list_products_in_category(
        &self,
        category_id: Uuid,
        owner: Uuid,
    ) -> StoreResult<Vec<Product>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Product> = inner
            .products
            .values()
            .filter(|p| p.category_id == category_id && p.user_id == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn count_products_in_category(&self, category_id: Uuid) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner.products.values().filter(|p| p.category_id == category_id).count() as i64)
    }

    async fn find_product(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Product>> {
        let inner = self.inner.read().await;
        Ok(inner.products.get(&id).filter(|p| p.user_id == owner).cloned())
    }

    async fn create_product(&self, owner: Uuid, draft: NewProduct) -> StoreResult<Product> {
        let mut inner = self.inner.write().await;
        if !inner.categories.contains_key(&draft.category_id) {
            return Err(StoreError::ForeignKey("products_category_id_fkey".into()));
        }
        let now = OffsetDateTime::now_utc();
        let product = Product {
            id: Uuid::new_v4(),
            user_id: owner,
            category_id: draft.category_id,
            name: draft.name,
            price: draft.price,
            description: draft.description,
            image: draft.image,
            created_at: now,
            updated_at: now,
        };
        inner.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: ProductPatch,
    ) -> StoreResult<Option<Product>> {
        let mut inner = self.inner.write().await;
        if let Some(category_id) = patch.category_id {
            if !inner.categories.contains_key(&category_id) {
                return Err(StoreError::ForeignKey("products_category_id_fkey".into()));
            }
        }
        let Some(product) = inner.products.get_mut(&id).filter(|p| p.user_id == owner) else {
            return Ok(None);
        };
        if let Some(category_id) = patch.category_id {
            product.category_id = category_id;
        }
        if let Some(name) = patch.name {
            product.name = name;
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(description) = patch.description {
            product.description = description;
        }
        if let Some(image) = patch.image {
            product.image = image;
        }
        product.updated_at = OffsetDateTime::now_utc();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: Uuid, owner: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.products.get(&id).is_some_and(|p| p.user_id == owner) {
            return Ok(false);
        }
        inner.products.remove(&id);
        Ok(true)
    }
}
