use std::net::SocketAddr;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::instrument;

use crate::{
    auth, catalog,
    error::{ApiError, ApiResult},
    state::AppState,
    users,
};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(catalog::router())
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

#[instrument(skip(state))]
async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.store.ping().await?;
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok", "timestamp": timestamp })))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::authz::Gate;

    struct Api {
        app: Router,
    }

    impl Api {
        fn new() -> Self {
            Self::with_gate(Gate::Approval)
        }

        fn with_gate(gate: Gate) -> Self {
            Self { app: build_app(AppState::fake_with_gate(gate)) }
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
            }
            let req = match body {
                Some(b) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(b.to_string()))
                    .unwrap(),
                None => req.body(Body::empty()).unwrap(),
            };
            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        /// Registers and returns (access token, user id).
        async fn register(&self, email: &str) -> (String, String) {
            let (status, body) = self
                .call(
                    Method::POST,
                    "/api/auth/register",
                    None,
                    Some(json!({ "email": email, "password": "secret1" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            (
                body["accessToken"].as_str().unwrap().to_string(),
                body["user"]["id"].as_str().unwrap().to_string(),
            )
        }
    }

    #[tokio::test]
    async fn first_account_is_admin_and_later_ones_wait_for_approval() {
        let api = Api::new();
        let (status, a) = api
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": "a@x.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(a["user"]["role"], "admin");
        assert_eq!(a["user"]["isApproved"], true);

        let (status, b) = api
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": "b@x.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(b["user"]["role"], "user");
        assert_eq!(b["user"]["isApproved"], false);
        assert_eq!(b["user"]["status"], "pending");

        let b_token = b["accessToken"].as_str().unwrap();
        let (status, body) = api.call(Method::GET, "/api/product", Some(b_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Your account is awaiting admin approval");

        // pending users can still see their own profile
        let (status, me) = api.call(Method::GET, "/api/auth/me", Some(b_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "b@x.com");
    }

    #[tokio::test]
    async fn approval_applies_to_the_next_request_without_new_tokens() {
        let api = Api::new();
        let (a, _) = api.register("a@x.com").await;
        let (b, b_id) = api.register("b@x.com").await;

        let (status, _) = api.call(Method::GET, "/api/product", Some(&b), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = api
            .call(
                Method::PUT,
                &format!("/api/user/{b_id}"),
                Some(&a),
                Some(json!({ "isApproved": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["isApproved"], true);

        let (status, body) = api.call(Method::GET, "/api/product", Some(&b), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn other_owners_resources_are_not_found() {
        let api = Api::new();
        let (a, _) = api.register("a@x.com").await;
        let (b, b_id) = api.register("b@x.com").await;
        api.call(
            Method::PUT,
            &format!("/api/user/{b_id}"),
            Some(&a),
            Some(json!({ "isApproved": true })),
        )
        .await;

        let (status, category) = api
            .call(Method::POST, "/api/category", Some(&a), Some(json!({ "name": "Fruit" })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{category}");
        let cid = category["id"].as_str().unwrap();

        let (status, _) = api
            .call(Method::GET, &format!("/api/category/{cid}"), Some(&b), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = api
            .call(Method::DELETE, &format!("/api/category/{cid}"), Some(&b), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = api
            .call(
                Method::POST,
                "/api/product",
                Some(&b),
                Some(json!({ "categoryId": cid, "name": "Apple", "price": 1.5 })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, product) = api
            .call(
                Method::POST,
                "/api/product",
                Some(&a),
                Some(json!({ "categoryId": cid, "name": "Apple", "price": 1.5 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(product["categoryId"], cid);

        let (status, listed) = api.call(Method::GET, "/api/category", Some(&a), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["products"][0]["name"], "Apple");

        let (status, _) = api
            .call(Method::DELETE, &format!("/api/category/{cid}"), Some(&a), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn admin_cannot_demote_or_delete_self() {
        let api = Api::new();
        let (a, a_id) = api.register("a@x.com").await;

        let (status, body) = api
            .call(
                Method::PUT,
                &format!("/api/user/{a_id}"),
                Some(&a),
                Some(json!({ "role": "user" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "cannot modify own account");

        let (status, _) = api
            .call(Method::DELETE, &format!("/api/user/{a_id}"), Some(&a), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, me) = api.call(Method::GET, "/api/auth/me", Some(&a), None).await;
        assert_eq!(me["role"], "admin");
    }

    #[tokio::test]
    async fn admin_routes_need_an_admin() {
        let api = Api::new();
        let (a, _) = api.register("a@x.com").await;
        let (b, b_id) = api.register("b@x.com").await;
        api.call(
            Method::PUT,
            &format!("/api/user/{b_id}"),
            Some(&a),
            Some(json!({ "isApproved": true })),
        )
        .await;

        let (status, _) = api.call(Method::GET, "/api/user", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = api.call(Method::GET, "/api/user", Some(&b), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = api.call(Method::GET, "/api/admin/user-stats", Some(&b), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, stats) = api.call(Method::GET, "/api/admin/user-stats", Some(&a), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats.as_array().unwrap().len(), 2);
        assert_eq!(stats[0]["categoryCount"], 0);

        // approved non-admins may not raise their own standing
        let (status, _) = api
            .call(
                Method::PUT,
                &format!("/api/user/{b_id}"),
                Some(&b),
                Some(json!({ "role": "admin" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = api
            .call(Method::PUT, "/api/auth/me", Some(&b), Some(json!({ "role": "admin" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = api
            .call(Method::DELETE, &format!("/api/user/{b_id}"), Some(&a), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = api.call(Method::GET, "/api/auth/me", Some(&b), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_failures_share_one_message_and_refresh_reissues() {
        let api = Api::new();
        api.register("a@x.com").await;

        let (s1, unknown) = api
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "nobody@x.com", "password": "secret1" })),
            )
            .await;
        let (s2, wrong) = api
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "a@x.com", "password": "nope!!" })),
            )
            .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s2, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, wrong);

        let (status, login) = api
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "A@x.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let refresh = login["refreshToken"].as_str().unwrap();

        let (status, _) = api.call(Method::GET, "/api/auth/me", Some(refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, renewed) = api
            .call(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({ "refreshToken": refresh })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renewed["user"]["email"], "a@x.com");

        let access = login["accessToken"].as_str().unwrap();
        let (status, _) = api
            .call(Method::POST, "/api/auth/refresh", None, Some(json!({ "refreshToken": access })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn activity_gate_locks_out_deactivated_users() {
        let api = Api::with_gate(Gate::Activity);
        let (a, _) = api.register("a@x.com").await;
        let (b, b_id) = api.register("b@x.com").await;

        // unapproved accounts pass this deployment's gate
        let (status, _) = api.call(Method::GET, "/api/product", Some(&b), None).await;
        assert_eq!(status, StatusCode::OK);

        api.call(
            Method::PUT,
            &format!("/api/user/{b_id}"),
            Some(&a),
            Some(json!({ "active": false })),
        )
        .await;

        let (status, body) = api.call(Method::GET, "/api/auth/me", Some(&b), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Your account has been deactivated. Contact an admin.");
        let (status, _) = api
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "b@x.com", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn oauth_with_no_providers_is_not_found() {
        let api = Api::new();
        for uri in [
            "/api/auth/signin/google",
            "/api/auth/signin/credentials",
            "/api/auth/signin/myspace",
            "/api/auth/callback/github?code=c&state=s",
        ] {
            let (status, _) = api.call(Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn unparseable_input_is_a_json_validation_error() {
        let api = Api::new();
        let (token, _) = api.register("a@x.com").await;

        let send_raw = |body: &'static str| {
            let req = Request::builder()
                .method(Method::POST)
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap();
            api.app.clone().oneshot(req)
        };
        for raw in ["{not json", r#"{"email":5,"password":"secret1"}"#, r#"{"password":"x"}"#] {
            let res = send_raw(raw).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{raw}");
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(body["error"].is_string(), "{raw}");
        }

        for uri in [
            "/api/category/not-a-uuid",
            "/api/product/123",
            "/api/user/nope",
            "/api/product?limit=lots",
        ] {
            let (status, body) = api.call(Method::GET, uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }

        let (status, body) = api
            .call(Method::POST, "/api/category", Some(&token), Some(json!({ "name": 7 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let api = Api::new();
        let (status, body) = api.call(Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }
}
