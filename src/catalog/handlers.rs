use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        CategoryResponse, CategoryWithProducts, CreateCategoryRequest, CreateProductRequest,
        MessageResponse, ProductResponse, ProductWithCategory, UpdateCategoryRequest,
        UpdateProductRequest,
    },
    services,
};
use crate::{
    auth::extractors::Session,
    authz::{authorize, Policy},
    error::ApiResult,
    extract::{Json, Path, Query},
    state::AppState,
    store::PageQuery,
};

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/category", get(list_categories).post(create_category))
        .route(
            "/category/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/product", get(list_products).post(create_product))
        .route(
            "/product/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

/// Catalog data is always the caller's own.
async fn caller_id(state: &AppState, session: &Session) -> ApiResult<Uuid> {
    let grant = authorize(state.store.as_ref(), state.gate(), session.claims(), &Policy::member())
        .await?;
    Ok(grant.identity.id)
}

#[instrument(skip(state, session))]
pub async fn list_categories(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Vec<CategoryWithProducts>>> {
    let owner = caller_id(&state, &session).await?;
    let rows = services::list_categories(state.store.as_ref(), owner).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, session, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<CategoryResponse>)> {
    let owner = caller_id(&state, &session).await?;
    let category = services::create_category(state.store.as_ref(), owner, payload).await?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

#[instrument(skip(state, session))]
pub async fn get_category(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CategoryWithProducts>> {
    let owner = caller_id(&state, &session).await?;
    let row = services::get_category(state.store.as_ref(), owner, id).await?;
    Ok(Json(row.into()))
}

#[instrument(skip(state, session, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> ApiResult<Json<CategoryResponse>> {
    let owner = caller_id(&state, &session).await?;
    let category = services::update_category(state.store.as_ref(), owner, id, payload).await?;
    Ok(Json(category.into()))
}

#[instrument(skip(state, session))]
pub async fn delete_category(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let owner = caller_id(&state, &session).await?;
    services::delete_category(state.store.as_ref(), owner, id).await?;
    Ok(Json(MessageResponse { message: "Category deleted" }))
}

#[instrument(skip(state, session))]
pub async fn list_products(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<ProductWithCategory>>> {
    let owner = caller_id(&state, &session).await?;
    let rows = services::list_products(state.store.as_ref(), owner, page.into()).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, session, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let owner = caller_id(&state, &session).await?;
    let product = services::create_product(state.store.as_ref(), owner, payload).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

#[instrument(skip(state, session))]
pub async fn get_product(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProductWithCategory>> {
    let owner = caller_id(&state, &session).await?;
    let row = services::get_product(state.store.as_ref(), owner, id).await?;
    Ok(Json(row.into()))
}

#[instrument(skip(state, session, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<Json<ProductResponse>> {
    let owner = caller_id(&state, &session).await?;
    let product = services::update_product(state.store.as_ref(), owner, id, payload).await?;
    Ok(Json(product.into()))
}

#[instrument(skip(state, session))]
pub async fn delete_product(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let owner = caller_id(&state, &session).await?;
    services::delete_product(state.store.as_ref(), owner, id).await?;
    Ok(Json(MessageResponse { message: "Product deleted" }))
}
