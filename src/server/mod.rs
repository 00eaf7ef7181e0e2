// Copyright 2023 Remi Bernotavicius

//! JSON HTTP API over the dish store.
//!
//! Every response, successful or not, is wrapped in an [`ApiResponse`] envelope:
//!
//! ```json
//! { "code": 0, "data": { "id": 1, "dish_name": "麻婆豆腐", "difficult": 2 }, "message": "success" }
//! { "code": 404, "data": null, "message": "dish 7 not found" }
//! ```
//!
//! On failure `code` repeats the HTTP status. Store failures are logged and answered with a
//! generic message.

use crate::config::ServerConfig;
use crate::database::{self, Store};
use crate::error::{Error, Result};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

mod dish_routes;
mod ingredient_routes;

/// Shared by every handler through axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    store: Store,
    max_page_size: i64,
}

impl AppState {
    pub fn new(store: Store, max_page_size: i64) -> Self {
        Self {
            store,
            max_page_size,
        }
    }

    /// Runs `f` on the blocking pool with a pooled connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut database::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.conn()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }
}

#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    code: u16,
    data: Option<T>,
    message: String,
}

fn success<T>(data: T) -> Result<Json<ApiResponse<T>>> {
    Ok(Json(ApiResponse {
        code: 0,
        data: Some(data),
        message: "success".to_string(),
    }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Pool(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status.is_server_error() {
            log::error!("request failed: {self}");
            "internal server error".to_string()
        } else {
            log::warn!("rejected request: {self}");
            self.to_string()
        };
        let body = ApiResponse::<()> {
            code: status.as_u16(),
            data: None,
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Result<Json<ApiResponse<Health>>> {
    success(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the API router with every route mounted under `base_path` (empty mounts at the root).
pub fn router(state: AppState, base_path: &str) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(dish_routes::routes())
        .merge(ingredient_routes::routes())
        .with_state(state);
    let app = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    app.layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

pub async fn run_server(
    store: Store,
    config: &ServerConfig,
    bind: &str,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let app = router(
        AppState::new(store, config.max_page_size),
        &config.base_path,
    );
    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("listening on http://{}{}", listener.local_addr()?, config.base_path);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
fn test_app(dir: &tempfile::TempDir) -> Router {
    router(AppState::new(database::test_store(dir), 100), "")
}

/// Sends one request through `app` and decodes the JSON envelope it answers with.
#[cfg(test)]
async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    use axum::body::Body;
    use tower::ServiceExt as _;

    let request = axum::http::Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_under_base_path() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(
        AppState::new(database::test_store(&dir), 100),
        "/cooking/ver3",
    );

    let (status, body) = call(&app, "GET", "/cooking/ver3/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));

    let response = {
        use tower::ServiceExt as _;
        let request = axum::http::Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    };
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    use axum::body::Body;
    use tower::ServiceExt as _;

    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/dish/add")
        .header("content-type", "application/json")
        .body(Body::from("{\"dish_name\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], 400);
    assert_eq!(body["data"], serde_json::Value::Null);

    let (status, body) = call(
        &app,
        "POST",
        "/dish/add",
        Some(serde_json::json!({"dish_name": "鱼香茄子", "difficult": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = call(&app, "GET", "/dish/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    use tower::ServiceExt as _;

    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let request = axum::http::Request::builder()
        .uri("/health")
        .header("origin", "http://localhost:5173")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}
