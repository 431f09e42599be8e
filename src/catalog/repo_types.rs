use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub image: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub image: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub category_id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Per-owner resource counts for the admin overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct OwnerCounts {
    pub category_count: i64,
    pub product_count: i64,
}
