use axum::{
    extract::{FromRef, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::SessionClaims,
        dto::{
            AuthResponse, LoginRequest, OAuthCallbackQuery, PublicUser, RefreshRequest,
            RegisterRequest, UpdateMeRequest,
        },
        extractors::Session,
        jwt::{JwtKeys, OAUTH_STATE_TTL},
        repo_types::{Provider, User},
        services,
    },
    authz::{authorize, Denial, Policy},
    error::{ApiError, ApiResult},
    extract::{Json, Path, Query},
    state::AppState,
};

const OAUTH_NONCE_COOKIE: &str = "oauth_nonce";
const CALLBACK_PATH: &str = "/api/auth/callback";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/signin/:provider", get(oauth_signin))
        .route("/auth/callback/:provider", get(oauth_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me).put(update_me))
}

fn respond(state: &AppState, user: &User) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let pair = keys.issue(&SessionClaims::from(user)).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        ApiError::internal(e)
    })?;
    Ok(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: PublicUser::from(user),
    })
}

fn oauth_provider(state: &AppState, raw: &str) -> ApiResult<Provider> {
    match raw.parse::<Provider>() {
        Ok(p @ (Provider::Google | Provider::Github)) if state.oauth.is_enabled(p) => Ok(p),
        _ => Err(ApiError::Denied(Denial::NotFound("Unknown provider"))),
    }
}

/// Short-lived cookie tying an authorize redirect to the browser that asked for it.
fn nonce_cookie(state: &AppState, value: String, max_age: CookieDuration) -> String {
    Cookie::build((OAUTH_NONCE_COOKIE, value))
        .http_only(true)
        .secure(state.config.public_url.starts_with("https://"))
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .path(CALLBACK_PATH)
        .build()
        .to_string()
}

fn cookie_nonce(headers: &HeaderMap) -> Option<Uuid> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    header
        .split(';')
        .filter_map(|part| Cookie::parse(part.trim()).ok())
        .find(|c| c.name() == OAUTH_NONCE_COOKIE)
        .and_then(|c| c.value().parse().ok())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let user = services::register(state.store.as_ref(), payload).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(respond(&state, &user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = services::verify_credentials(
        state.store.as_ref(),
        state.gate(),
        &payload.email,
        &payload.password,
    )
    .await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(respond(&state, &user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "invalid refresh token");
        ApiError::Denied(Denial::Unauthenticated)
    })?;
    let user = services::refresh(state.store.as_ref(), state.gate(), claims.session.id).await?;
    Ok(Json(respond(&state, &user)?))
}

#[instrument(skip(state, session))]
pub async fn get_me(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<PublicUser>> {
    let grant = authorize(
        state.store.as_ref(),
        state.gate(),
        session.claims(),
        &Policy::authenticated(),
    )
    .await?;
    let user = services::current_user(state.store.as_ref(), grant.identity.id).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, session, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<UpdateMeRequest>,
) -> ApiResult<Json<PublicUser>> {
    let grant = authorize(
        state.store.as_ref(),
        state.gate(),
        session.claims(),
        &Policy::authenticated(),
    )
    .await?;
    let user = services::update_me(state.store.as_ref(), grant.identity.id, payload).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state))]
pub async fn oauth_signin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let provider = oauth_provider(&state, &provider)?;
    let keys = JwtKeys::from_ref(&state);
    let nonce = Uuid::new_v4();
    let oauth_state = keys
        .sign_oauth_state(provider.as_str(), nonce)
        .map_err(ApiError::internal)?;
    let url = state.oauth.authorize_url(provider, &oauth_state)?;
    let ttl = CookieDuration::seconds(OAUTH_STATE_TTL.as_secs() as i64);
    let cookie = nonce_cookie(&state, nonce.to_string(), ttl);
    Ok(([(SET_COOKIE, cookie)], Redirect::to(&url)))
}

#[instrument(skip(state, headers, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> ApiResult<impl IntoResponse> {
    let provider = oauth_provider(&state, &provider)?;
    if let Some(reason) = query.error {
        warn!(%provider, %reason, "provider returned an error");
        return Err(ApiError::validation("Sign-in was cancelled or refused"));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::validation("Missing code or state"));
    };

    let Some(nonce) = cookie_nonce(&headers) else {
        warn!(%provider, "oauth callback without nonce cookie");
        return Err(ApiError::validation("Invalid OAuth state"));
    };
    let keys = JwtKeys::from_ref(&state);
    keys.verify_oauth_state(&oauth_state, provider.as_str(), nonce)
        .map_err(|e| {
            warn!(%provider, error = %e, "invalid oauth state");
            ApiError::validation("Invalid OAuth state")
        })?;

    let profile = state.oauth.exchange(provider, &code).await?;
    let user = services::oauth_sign_in(state.store.as_ref(), state.gate(), profile).await?;
    info!(user_id = %user.id, %provider, "oauth login");
    let cleared = nonce_cookie(&state, String::new(), CookieDuration::ZERO);
    Ok(([(SET_COOKIE, cleared)], Json(respond(&state, &user)?)))
}
