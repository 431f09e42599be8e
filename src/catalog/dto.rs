use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Category, Product};

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub category_id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            name: c.name,
            description: c.description,
            image: c.image,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            category_id: p.category_id,
            name: p.name,
            price: p.price,
            description: p.description,
            image: p.image,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// A category together with the products filed under it.
#[derive(Debug, Serialize)]
pub struct CategoryWithProducts {
    #[serde(flatten)]
    pub category: CategoryResponse,
    pub products: Vec<ProductResponse>,
}

impl From<(Category, Vec<Product>)> for CategoryWithProducts {
    fn from((category, products): (Category, Vec<Product>)) -> Self {
        Self {
            category: category.into(),
            products: products.into_iter().map(Into::into).collect(),
        }
    }
}

/// A product with its category embedded.
#[derive(Debug, Serialize)]
pub struct ProductWithCategory {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub category: Option<CategoryResponse>,
}

impl From<(Product, Option<Category>)> for ProductWithCategory {
    fn from((product, category): (Product, Option<Category>)) -> Self {
        Self {
            product: product.into(),
            category: category.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
