//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::require_bearer;
use crate::handlers::{create_job, health, stream_job_progress, workers_status};
use crate::state::AppState;

/// Create the API router. Health and metrics are unauthenticated; all
/// `/api` routes require the bearer token when one is configured.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id/stream", get(stream_job_progress))
        .route("/workers/status", get(workers_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health))
        .merge(metrics_routes)
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::DispatcherConfig;

    fn test_state(api_key: Option<&str>, workers: Vec<String>) -> AppState {
        AppState::new(DispatcherConfig {
            port: 0,
            worker_nodes: workers,
            worker_timeout: Duration::from_millis(200),
            api_key: api_key.map(String::from),
        })
    }

    /// An address with nothing listening.
    async fn dead_worker() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn job_json() -> &'static str {
        r#"{"input_url":"https://example.com/x.mp4","preset":"720p_h264","output":{"storage":"local","path":"out/x.mp4"}}"#
    }

    fn post_job(body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/jobs")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = create_router(test_state(Some("secret"), vec![]), None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = create_router(test_state(Some("secret"), vec![]), None);
        let response = app.oneshot(post_job(job_json(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_auth_header_is_unauthorized() {
        let app = create_router(test_state(Some("secret"), vec![]), None);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/jobs")
            .header("content-type", "application/json")
            .header("authorization", "Basic secret")
            .body(Body::from(job_json()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let app = create_router(test_state(Some("secret"), vec![]), None);
        let response = app
            .oneshot(post_job(job_json(), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_disabled_without_key() {
        // No key configured, no workers: request passes auth, fails on
        // worker selection.
        let app = create_router(test_state(None, vec![]), None);
        let response = app.oneshot(post_job(job_json(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_no_workers_is_service_unavailable() {
        let dead = dead_worker().await;
        let app = create_router(test_state(None, vec![dead]), None);
        let response = app.oneshot(post_job(job_json(), None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().unwrap().contains("no available workers"));
    }

    #[tokio::test]
    async fn test_unknown_field_is_bad_request() {
        let body = r#"{"input_url":"u","preset":"p","output":{"storage":"local","path":"x"},"surprise":true}"#;
        let app = create_router(test_state(None, vec![]), None);
        let response = app.oneshot(post_job(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = create_router(test_state(None, vec![]), None);
        let response = app.oneshot(post_job("{not json", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_input_url_is_bad_request() {
        let body = r#"{"input_url":"  ","preset":"p","output":{"storage":"local","path":"x"}}"#;
        let app = create_router(test_state(None, vec![]), None);
        let response = app.oneshot(post_job(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_unknown_job_yields_error_record() {
        let app = create_router(test_state(None, vec![]), None);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/jobs/ghost/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("data: {\"error\":\"job not found\"}"));
    }

    #[tokio::test]
    async fn test_workers_status_reports_unreachable() {
        let dead = dead_worker().await;
        let app = create_router(test_state(None, vec![dead.clone()]), None);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/workers/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let probes: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(probes[0]["address"], dead);
        assert_eq!(probes[0]["reachable"], false);
    }
}
