use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use routes::{
    analysis::{cancel_analysis, get_analysis, retry_analysis, submit_analysis},
    liveness::live,
    readiness::ready,
    stats::queue_stats,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Probes
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let queue = Router::new()
        .route("/analysis", post(submit_analysis))
        .route("/analysis/{id}", get(get_analysis))
        .route("/analysis/{id}/cancel", post(cancel_analysis))
        .route("/analysis/{id}/retry", post(retry_analysis))
        .route("/stats", get(queue_stats));

    public.merge(queue)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use analysis_queue::{AnalysisExecutor, ExecutionError};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use common::{
        storage::{db::SurrealDbClient, types::analysis_job::AnalysisJob},
        utils::config::AppConfig,
    };
    use serde_json::{json, Value};
    use surrealdb::Surreal;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    struct FailingExecutor;

    #[async_trait]
    impl AnalysisExecutor for FailingExecutor {
        async fn execute(&self, _job: &AnalysisJob) -> Result<Value, ExecutionError> {
            Err(ExecutionError::from("Invalid campaign schema"))
        }
    }

    async fn test_state() -> ApiState {
        let database = Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &database)
                .await
                .expect("in-memory surrealdb"),
        );
        ApiState::with_db(db, Arc::new(FailingExecutor), &AppConfig::default())
    }

    fn app(state: ApiState) -> Router {
        api_routes_v1().with_state(state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn submission() -> Value {
        json!({
            "files": [{ "name": "spring-sale.png" }],
            "realtime": true,
            "userTier": "standard",
            "requirements": { "complexity": "detailed" }
        })
    }

    #[tokio::test]
    async fn test_submit_and_fetch_status() {
        let app = app(test_state().await);

        let (status, receipt) = send(&app, Method::POST, "/analysis", Some(submission())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["status"], json!("queued"));
        assert_eq!(receipt["priority"], json!(80));
        assert_eq!(receipt["queue_position"], json!(1));

        let job_id = receipt["job_id"].as_str().expect("job id");
        let (status, view) = send(&app, Method::GET, &format!("/analysis/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], json!("queued"));
        assert_eq!(view["attempts"], json!(0));
        assert!(view.get("error").is_none());
    }

    #[tokio::test]
    async fn test_invalid_submission_is_bad_request() {
        let app = app(test_state().await);

        let (status, body) = send(
            &app,
            Method::POST,
            "/analysis",
            Some(json!({ "files": [], "realtime": false, "userTier": "", "requirements": { "complexity": "simple" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], json!("error"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = app(test_state().await);

        let (status, _) = send(&app, Method::GET, "/analysis/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::POST, "/analysis/does-not-exist/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_and_retry() {
        let state = test_state().await;
        let manager = Arc::clone(&state.manager);
        let app = app(state);

        let (_, receipt) = send(&app, Method::POST, "/analysis", Some(submission())).await;
        let cancel_id = receipt["job_id"].as_str().expect("job id").to_string();

        let (status, outcome) =
            send(&app, Method::POST, &format!("/analysis/{cancel_id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["cancelled"], json!(true));
        assert_eq!(outcome["status"], json!("cancelled"));

        let (status, _) =
            send(&app, Method::POST, &format!("/analysis/{cancel_id}/retry"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, receipt) = send(&app, Method::POST, "/analysis", Some(submission())).await;
        let failed_id = receipt["job_id"].as_str().expect("job id").to_string();
        manager.process_next().await.expect_err("executor rejects");

        let (status, view) = send(&app, Method::GET, &format!("/analysis/{failed_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], json!("failed"));
        assert_eq!(view["error"], json!("Invalid campaign schema"));

        let (status, view) =
            send(&app, Method::POST, &format!("/analysis/{failed_id}/retry"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], json!("queued"));
        assert_eq!(view["attempts"], json!(2));
    }

    #[tokio::test]
    async fn test_stats_and_probes() {
        let app = app(test_state().await);
        send(&app, Method::POST, "/analysis", Some(submission())).await;

        let (status, stats) = send(&app, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["state"], json!("available"));
        assert_eq!(stats["queue_depth"], json!(1));
        assert_eq!(stats["max_concurrent"], json!(5));

        let (status, body) = send(&app, Method::GET, "/live", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));

        let (status, _) = send(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_degrade_without_store() {
        let db = Arc::new(SurrealDbClient {
            client: Surreal::init(),
        });
        let app = app(ApiState::with_db(
            db,
            Arc::new(FailingExecutor),
            &AppConfig::default(),
        ));

        let (status, stats) = send(&app, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["state"], json!("unavailable"));

        let (status, _) = send(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
