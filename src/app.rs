use std::net::SocketAddr;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::state::AppState;
use crate::{auth, comments, contributors, issues, projects, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api",
              Router::new()
                  .merge(auth::router())
                  .merge(users::router())
                  .merge(projects::router())
                  .merge(contributors::router())
                  .merge(issues::router())
                  .merge(comments::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
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
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        app: &Router,
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

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn signup(app: &Router, email: &str) -> (String, String) {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/signup/",
            None,
            Some(json!({
                "email": email,
                "password1": "password123",
                "password2": "password123",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn project_routes_enforce_auth_and_membership() {
        let app = build_app(AppState::fake());
        let (alice, _) = signup(&app, "alice@example.com").await;
        let (carol, _) = signup(&app, "carol@example.com").await;

        let (status, _) = call(&app, Method::GET, "/api/projects/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, project) = call(
            &app,
            Method::POST,
            "/api/projects/",
            Some(&alice),
            Some(json!({ "title": "Alpha", "description": "tracker", "type": "back-end" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(project["type"], "back-end");
        let id = project["id"].as_str().unwrap();

        let uri = format!("/api/projects/{id}/");
        let (status, _) = call(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::GET, &uri, Some(&carol), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let missing = format!("/api/projects/{}/", uuid::Uuid::new_v4());
        let (status, _) = call(&app, Method::GET, &missing, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn contributor_gains_access_to_issues() {
        let app = build_app(AppState::fake());
        let (alice, alice_id) = signup(&app, "alice@example.com").await;
        let (bob, bob_id) = signup(&app, "bob@example.com").await;

        let (_, project) = call(
            &app,
            Method::POST,
            "/api/projects/",
            Some(&alice),
            Some(json!({ "title": "Alpha", "description": "tracker", "type": "iOS" })),
        )
        .await;
        let id = project["id"].as_str().unwrap();
        let issues = format!("/api/projects/{id}/issues/");

        let (status, _) = call(&app, Method::GET, &issues, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, row) = call(
            &app,
            Method::POST,
            &format!("/api/projects/{id}/users/"),
            Some(&alice),
            Some(json!({ "user": bob_id, "role": "tester" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(row["user"]["id"], bob_id.as_str());
        assert_eq!(row["user"]["email"], "bob@example.com");
        assert!(row["user"].get("password_hash").is_none());

        let (status, issue) = call(
            &app,
            Method::POST,
            &issues,
            Some(&bob),
            Some(json!({
                "title": "crash",
                "description": "on start",
                "tag": "BUG",
                "priority": "HIGH",
                "status": "To Do",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issue["assignee"]["id"], alice_id.as_str());
        assert_eq!(issue["author"]["email"], "bob@example.com");

        let (status, list) = call(&app, Method::GET, &issues, Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unreadable_bodies_are_json_validation_errors() {
        let app = build_app(AppState::fake());
        let (alice, _) = signup(&app, "alice@example.com").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/projects/",
            Some(&alice),
            Some(json!({ "title": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["detail"].as_str().is_some_and(|d| d.contains("description")));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/signup/",
            None,
            Some(json!({ "email": "dave@example.com", "password1": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/login/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_path_id_is_json_not_found() {
        let app = build_app(AppState::fake());
        let (alice, _) = signup(&app, "alice@example.com").await;

        let (status, body) = call(&app, Method::GET, "/api/projects/abc/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, body) = call(&app, Method::GET, "/api/users/abc/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn missing_parent_and_forbidden_win_over_bad_body() {
        let app = build_app(AppState::fake());
        let (alice, _) = signup(&app, "alice@example.com").await;
        let (carol, _) = signup(&app, "carol@example.com").await;

        let ghost = format!("/api/projects/{}/issues/", uuid::Uuid::new_v4());
        let (status, body) = call(&app, Method::POST, &ghost, Some(&alice), Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (_, project) = call(
            &app,
            Method::POST,
            "/api/projects/",
            Some(&alice),
            Some(json!({ "title": "Alpha", "description": "tracker", "type": "iOS" })),
        )
        .await;
        let uri = format!("/api/projects/{}/", project["id"].as_str().unwrap());

        let (status, body) = call(&app, Method::PUT, &uri, Some(&carol), Some(json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, body) = call(&app, Method::PUT, &uri, Some(&alice), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn deleted_account_token_is_rejected() {
        let app = build_app(AppState::fake());
        let (token, id) = signup(&app, "gone@example.com").await;

        let uri = format!("/api/users/{id}/delete-user/");
        let (status, _) = call(
            &app,
            Method::DELETE,
            &uri,
            Some(&token),
            Some(json!({ "password": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, Method::GET, "/api/projects/", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/login/",
            None,
            Some(json!({ "email": "gone@example.com", "password": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
