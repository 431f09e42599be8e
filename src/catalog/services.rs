use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CreateCategoryRequest, CreateProductRequest, UpdateCategoryRequest, UpdateProductRequest},
    repo_types::{Category, CategoryPatch, NewCategory, NewProduct, Product, ProductPatch},
    validate,
};
use crate::{
    authz::Denial,
    error::{ApiError, ApiResult},
    store::{Page, Store, StoreError},
};

const CATEGORY_NOT_FOUND: ApiError = ApiError::Denied(Denial::NotFound("Category not found"));
const PRODUCT_NOT_FOUND: ApiError = ApiError::Denied(Denial::NotFound("Product not found"));

fn category_conflict(e: StoreError) -> ApiError {
    match e {
        StoreError::Conflict(_) => ApiError::Conflict("Category name already exists"),
        other => other.into(),
    }
}

fn product_reference(e: StoreError) -> ApiError {
    match e {
        // the category went away between the check and the write
        StoreError::ForeignKey(_) => CATEGORY_NOT_FOUND,
        other => other.into(),
    }
}

/// A product may only be filed under a category of its own owner.
async fn check_category_owner(store: &dyn Store, owner: Uuid, category_id: Uuid) -> ApiResult<()> {
    let Some(category) = store.find_category_by_id(category_id).await? else {
        return Err(CATEGORY_NOT_FOUND);
    };
    if category.user_id != owner {
        warn!(%owner, %category_id, "product references a foreign category");
        return Err(Denial::Forbidden.into());
    }
    Ok(())
}

pub async fn list_categories(
    store: &dyn Store,
    owner: Uuid,
) -> ApiResult<Vec<(Category, Vec<Product>)>> {
    let categories = store.list_categories(owner).await?;
    let mut out = Vec::with_capacity(categories.len());
    for category in categories {
        let products = store.list_products_in_category(category.id, owner).await?;
        out.push((category, products));
    }
    Ok(out)
}

pub async fn get_category(
    store: &dyn Store,
    owner: Uuid,
    id: Uuid,
) -> ApiResult<(Category, Vec<Product>)> {
    let category = store.find_category(id, owner).await?.ok_or(CATEGORY_NOT_FOUND)?;
    let products = store.list_products_in_category(id, owner).await?;
    Ok((category, products))
}

pub async fn create_category(
    store: &dyn Store,
    owner: Uuid,
    req: CreateCategoryRequest,
) -> ApiResult<Category> {
    let draft = NewCategory {
        name: validate::category_name(&req.name)?,
        description: validate::description(
            req.description.as_deref(),
            validate::CATEGORY_DESCRIPTION_MAX,
        )?,
        image: validate::image(req.image.as_deref())?,
    };
    let category = store
        .create_category(owner, draft)
        .await
        .map_err(category_conflict)?;
    info!(%owner, category_id = %category.id, "category created");
    Ok(category)
}

pub async fn update_category(
    store: &dyn Store,
    owner: Uuid,
    id: Uuid,
    req: UpdateCategoryRequest,
) -> ApiResult<Category> {
    let patch = CategoryPatch {
        name: req.name.as_deref().map(validate::category_name).transpose()?,
        description: req
            .description
            .as_deref()
            .map(|d| validate::description(Some(d), validate::CATEGORY_DESCRIPTION_MAX))
            .transpose()?,
        image: req
            .image
            .as_deref()
            .map(|i| validate::image(Some(i)))
            .transpose()?,
    };
    store
        .update_category(id, owner, patch)
        .await
        .map_err(category_conflict)?
        .ok_or(CATEGORY_NOT_FOUND)
}

/// Refuses while products are still filed under the category.
pub async fn delete_category(store: &dyn Store, owner: Uuid, id: Uuid) -> ApiResult<()> {
    if store.find_category(id, owner).await?.is_none() {
        return Err(CATEGORY_NOT_FOUND);
    }
    let in_use = ApiError::Conflict("Category still has products");
    if store.count_products_in_category(id).await? > 0 {
        return Err(in_use);
    }
    match store.delete_category(id, owner).await {
        Ok(true) => {
            info!(%owner, category_id = %id, "category deleted");
            Ok(())
        }
        Ok(false) => Err(CATEGORY_NOT_FOUND),
        Err(StoreError::ForeignKey(_)) => Err(in_use),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_products(
    store: &dyn Store,
    owner: Uuid,
    page: Page,
) -> ApiResult<Vec<(Product, Option<Category>)>> {
    let products = store.list_products(owner, page).await?;
    let mut categories: HashMap<Uuid, Option<Category>> = HashMap::new();
    let mut out = Vec::with_capacity(products.len());
    for product in products {
        let category = match categories.get(&product.category_id) {
            Some(cached) => cached.clone(),
            None => {
                let found = store.find_category(product.category_id, owner).await?;
                categories.insert(product.category_id, found.clone());
                found
            }
        };
        out.push((product, category));
    }
    Ok(out)
}

pub async fn get_product(
    store: &dyn Store,
    owner: Uuid,
    id: Uuid,
) -> ApiResult<(Product, Option<Category>)> {
    let product = store.find_product(id, owner).await?.ok_or(PRODUCT_NOT_FOUND)?;
    let category = store.find_category(product.category_id, owner).await?;
    Ok((product, category))
}

pub async fn create_product(
    store: &dyn Store,
    owner: Uuid,
    req: CreateProductRequest,
) -> ApiResult<Product> {
    let draft = NewProduct {
        category_id: req.category_id,
        name: validate::product_name(&req.name)?,
        price: validate::price(req.price)?,
        description: validate::description(
            req.description.as_deref(),
            validate::PRODUCT_DESCRIPTION_MAX,
        )?,
        image: validate::image(req.image.as_deref())?,
    };
    check_category_owner(store, owner, draft.category_id).await?;
    let product = store
        .create_product(owner, draft)
        .await
        .map_err(product_reference)?;
    info!(%owner, product_id = %product.id, "product created");
    Ok(product)
}

pub async fn update_product(
    store: &dyn Store,
    owner: Uuid,
    id: Uuid,
    req: UpdateProductRequest,
) -> ApiResult<Product> {
    let patch = ProductPatch {
        category_id: req.category_id,
        name: req.name.as_deref().map(validate::product_name).transpose()?,
        price: req.price.map(validate::price).transpose()?,
        description: req
            .description
            .as_deref()
            .map(|d| validate::description(Some(d), validate::PRODUCT_DESCRIPTION_MAX))
            .transpose()?,
        image: req
            .image
            .as_deref()
            .map(|i| validate::image(Some(i)))
            .transpose()?,
    };
    // a foreign product is reported missing before its target category is looked at
    if store.find_product(id, owner).await?.is_none() {
        return Err(PRODUCT_NOT_FOUND);
    }
    if let Some(category_id) = patch.category_id {
        check_category_owner(store, owner, category_id).await?;
    }
    store
        .update_product(id, owner, patch)
        .await
        .map_err(product_reference)?
        .ok_or(PRODUCT_NOT_FOUND)
}

pub async fn delete_product(store: &dyn Store, owner: Uuid, id: Uuid) -> ApiResult<()> {
    if !store.delete_product(id, owner).await? {
        return Err(PRODUCT_NOT_FOUND);
    }
    info!(%owner, product_id = %id, "product deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::repo_types::{NewUser, Provider},
        store::{MemoryStore, UserStore},
    };

    async fn two_owners(store: &MemoryStore) -> (Uuid, Uuid) {
        let mut ids = Vec::new();
        for email in ["a@x.com", "b@x.com"] {
            let user = store
                .create_user(NewUser {
                    email: email.into(),
                    password_hash: None,
                    name: None,
                    provider: Provider::Credentials,
                    provider_id: None,
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        (ids[0], ids[1])
    }

    fn category(name: &str) -> CreateCategoryRequest {
        CreateCategoryRequest { name: name.into(), description: None, image: None }
    }

    fn product(category_id: Uuid, name: &str) -> CreateProductRequest {
        CreateProductRequest {
            category_id,
            name: name.into(),
            price: 9.5,
            description: Some("tasty".into()),
            image: None,
        }
    }

    #[tokio::test]
    async fn reads_and_writes_are_scoped_to_the_owner() {
        let store = MemoryStore::new();
        let (a, b) = two_owners(&store).await;
        let fruit = create_category(&store, a, category("Fruit")).await.unwrap();

        let err = get_category(&store, b, fruit.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::NotFound(_))));
        let err = update_category(&store, b, fruit.id, UpdateCategoryRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::NotFound(_))));
        let err = delete_category(&store, b, fruit.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::NotFound(_))));
        assert!(list_categories(&store, b).await.unwrap().is_empty());

        let apple = create_product(&store, a, product(fruit.id, "Apple")).await.unwrap();
        let err = get_product(&store, b, apple.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::NotFound(_))));
        let err = delete_product(&store, b, apple.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::NotFound(_))));
        assert!(list_products(&store, b, Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn product_must_reference_own_category() {
        let store = MemoryStore::new();
        let (a, b) = two_owners(&store).await;
        let fruit = create_category(&store, a, category("Fruit")).await.unwrap();
        let toys = create_category(&store, b, category("Toys")).await.unwrap();

        let err = create_product(&store, b, product(fruit.id, "Apple")).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::Forbidden)));
        let err = create_product(&store, b, product(Uuid::new_v4(), "Apple")).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::NotFound("Category not found"))));

        let ball = create_product(&store, b, product(toys.id, "Ball")).await.unwrap();
        let move_to_foreign = UpdateProductRequest { category_id: Some(fruit.id), ..Default::default() };
        let err = update_product(&store, b, ball.id, move_to_foreign).await.unwrap_err();
        assert!(matches!(err, ApiError::Denied(Denial::Forbidden)));
        let (ball, cat) = get_product(&store, b, ball.id).await.unwrap();
        assert_eq!(ball.category_id, toys.id);
        assert_eq!(cat.map(|c| c.id), Some(toys.id));
    }

    #[tokio::test]
    async fn category_names_are_unique_per_owner() {
        let store = MemoryStore::new();
        let (a, b) = two_owners(&store).await;
        create_category(&store, a, category("Fruit")).await.unwrap();
        let err = create_category(&store, a, category(" Fruit ")).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        create_category(&store, b, category("Fruit")).await.unwrap();

        let veg = create_category(&store, a, category("Veg")).await.unwrap();
        let rename = UpdateCategoryRequest { name: Some("Fruit".into()), ..Default::default() };
        let err = update_category(&store, a, veg.id, rename).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn category_with_products_cannot_be_deleted() {
        let store = MemoryStore::new();
        let (a, _) = two_owners(&store).await;
        let fruit = create_category(&store, a, category("Fruit")).await.unwrap();
        let apple = create_product(&store, a, product(fruit.id, "Apple")).await.unwrap();

        let err = delete_category(&store, a, fruit.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict("Category still has products")));

        delete_product(&store, a, apple.id).await.unwrap();
        delete_category(&store, a, fruit.id).await.unwrap();
        assert!(list_categories(&store, a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_store() {
        let store = MemoryStore::new();
        let (a, _) = two_owners(&store).await;
        let err = create_category(&store, a, category("F1")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let fruit = create_category(&store, a, category("Fruit")).await.unwrap();
        let mut pricey = product(fruit.id, "Gold apple");
        pricey.price = 2_000_000.0;
        let err = create_product(&store, a, pricey).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(list_products(&store, a, Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listings_embed_their_relations() {
        let store = MemoryStore::new();
        let (a, _) = two_owners(&store).await;
        let fruit = create_category(&store, a, category("Fruit")).await.unwrap();
        create_category(&store, a, category("Empty")).await.unwrap();
        create_product(&store, a, product(fruit.id, "Apple")).await.unwrap();
        create_product(&store, a, product(fruit.id, "Pear")).await.unwrap();

        let categories = list_categories(&store, a).await.unwrap();
        let counts: Vec<(String, usize)> = categories
            .iter()
            .map(|(c, p)| (c.name.clone(), p.len()))
            .collect();
        assert_eq!(counts, vec![("Empty".into(), 0), ("Fruit".into(), 2)]);

        let products = list_products(&store, a, Page::default()).await.unwrap();
        assert_eq!(products.len(), 2);
        assert!(products.iter().all(|(_, c)| c.as_ref().map(|c| c.id) == Some(fruit.id)));
    }
}
