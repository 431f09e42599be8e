use axum::{
    extract::State,
    routing::get,
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{UpdateUserRequest, UserStats},
    services,
};
use crate::{
    auth::{dto::PublicUser, extractors::Session},
    authz::{authorize, Policy},
    catalog::dto::MessageResponse,
    error::ApiResult,
    extract::{Json, Path, Query},
    state::AppState,
    store::PageQuery,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(list_users))
        .route(
            "/user/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/user-stats", get(user_stats))
}

#[instrument(skip(state, session))]
pub async fn list_users(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<PublicUser>>> {
    authorize(state.store.as_ref(), state.gate(), session.claims(), &Policy::admin()).await?;
    let users = services::list(state.store.as_ref(), page.into()).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, session))]
pub async fn get_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PublicUser>> {
    let policy = Policy::member().owner_or_admin(id);
    authorize(state.store.as_ref(), state.gate(), session.claims(), &policy).await?;
    let user = services::get(state.store.as_ref(), id).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, session, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<PublicUser>> {
    let policy = Policy::member().owner_or_admin(id);
    let grant = authorize(state.store.as_ref(), state.gate(), session.claims(), &policy).await?;
    let user = services::update(state.store.as_ref(), &grant, id, payload).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, session))]
pub async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let grant =
        authorize(state.store.as_ref(), state.gate(), session.claims(), &Policy::admin()).await?;
    services::delete(state.store.as_ref(), &grant, id).await?;
    Ok(Json(MessageResponse { message: "User deleted" }))
}

#[instrument(skip(state, session))]
pub async fn user_stats(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<UserStats>>> {
    authorize(state.store.as_ref(), state.gate(), session.claims(), &Policy::admin()).await?;
    let rows = services::stats(state.store.as_ref(), page.into()).await?;
    Ok(Json(
        rows.iter()
            .map(|(user, counts)| UserStats::new(user, *counts))
            .collect(),
    ))
}
