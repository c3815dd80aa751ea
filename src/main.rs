#![cfg_attr(debug_assertions, allow(dead_code, unused_imports))]

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, http::Method, middleware, Router
};

use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use model::{store::SqliteStore, ModelController};
use routes::mw_auth;

use server::{get_config, get_server_folder_path_array, get_server_port};
use tokio::net::TcpListener;
use tools::{auth::get_or_init_keys, face_inference::OnnxFaceAnalyzer, log::{log_info, LogServiceType}};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

pub use self::error::{Error, Result, SvResult};

mod model;
mod routes;
mod error;
mod tools;
mod server;
mod domain;


#[tokio::main]
async fn main() -> Result<()> {
    log_info(LogServiceType::Register, "Starting snapvault server".to_string());
    log_info(LogServiceType::Register, "Initializing config".to_string());
    server::initialize_config().await;
    get_or_init_keys().await?;

    let store = SqliteStore::new().await?;
    let config = get_config().await;
    let models_dir = get_server_folder_path_array(vec!["models"]).await?;
    let analyzer = Arc::new(OnnxFaceAnalyzer::new(models_dir));
    let mc = ModelController::new(store, analyzer, config.recognition.clone()).await?;

    let app = app(mc);
    let local_port = get_server_port().await;
    let listener = TcpListener::bind(format!("127.0.0.1:{}", local_port)).await?;
    log_info(LogServiceType::Register, format!("->> LISTENING on {:?}\n", listener.local_addr()));

    axum::serve(listener, app).await?;

    Ok(())
}


fn app(mc: ModelController) -> Router {
    let cors: CorsLayer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::PATCH, Method::DELETE, Method::HEAD, Method::OPTIONS, Method::POST])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .nest("/ping", routes::ping::routes())
        .nest("/users", routes::users::routes(mc.clone()))
        .nest("/photos", routes::photos::routes(mc.clone()))
        .nest("/people", routes::people::routes(mc.clone()))
        .nest("/faces", routes::faces::routes(mc.clone()))
        .layer(middleware::from_fn_with_state(mc.clone(), mw_auth::mw_token_resolver))
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(cors)
        )
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{self, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    // for `collect`
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `call`, `oneshot`, and `ready`

    #[tokio::test]
    async fn json() {
        let mc = ModelController::new_for_tests().await.unwrap();
        let app = app(mc);

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::GET)
                    .uri("/ping")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "result": {"success": true} }));
    }

    #[tokio::test]
    async fn not_found() {
        let mc = ModelController::new_for_tests().await.unwrap();
        let app = app(mc);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn anonymous_cannot_list_photos() {
        let mc = ModelController::new_for_tests().await.unwrap();
        let app = app(mc);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/photos")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
