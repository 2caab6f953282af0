//! Thin HTTP transport over the prediction service.
//!
//! Handlers only translate between JSON/multipart and the core types; status
//! codes are decided in [`error::ApiError`].

pub mod error;
pub mod handlers;

use crate::config::{BatchConfig, ServerConfig};
use crate::metrics::ServiceMetrics;
use crate::service::PredictionService;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub use error::{ApiError, ApiResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub metrics: Arc<ServiceMetrics>,
    pub batch: BatchConfig,
}

/// Create the router with all routes
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/predict/batch", post(handlers::predict_batch))
        .route("/predict/batch/stats", post(handlers::predict_batch_stats))
        .route("/model/info", get(handlers::model_info))
        .route("/metrics", get(handlers::metrics))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{scripted_service, scripted_service_with};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "fraud-scoring-boundary";

    fn app_with(batch: BatchConfig) -> Router {
        let state = AppState {
            service: Arc::new(scripted_service()),
            metrics: Arc::new(ServiceMetrics::new()),
            batch,
        };
        router(state, &ServerConfig::default())
    }

    fn app() -> Router {
        app_with(BatchConfig::default())
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(uri: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"batch.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
            b = BOUNDARY,
            csv = csv
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    const BATCH: &str = "TransactionAmt,ProductCD,card1,risk\n10.5,W,13926,0.1\n100,C,2755,0.65\n42,W,4663,0.9\n";

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["model_type"], "XGBoost (Tuned)");
    }

    #[tokio::test]
    async fn test_predict() {
        let request = json_request(
            "/predict",
            json!({"risk": 0.65, "TransactionAmt": 150.5, "ProductCD": "W", "card1": 13926}),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_fraud"], true);
        assert_eq!(body["risk_level"], "High");
        assert!(body["message"].as_str().unwrap().contains("FRAUD"));
    }

    #[tokio::test]
    async fn test_predict_derives_email_features_from_one_domain() {
        // Each service reads one derived feature back as its probability.
        let body = json!({
            "TransactionAmt": 150.5,
            "ProductCD": "W",
            "card1": 13926,
            "P_emaildomain": "gmail.com"
        });

        let cases = [
            ("has_P_email", 1.0),
            ("P_email_is_common", 1.0),
            ("email_domain_match", 0.0),
            ("has_R_email", 0.0),
        ];
        for (feature, expected) in cases {
            let state = AppState {
                service: Arc::new(scripted_service_with(&[feature, "card4"])),
                metrics: Arc::new(ServiceMetrics::new()),
                batch: BatchConfig::default(),
            };
            let app = router(state, &ServerConfig::default());

            let (status, verdict) = send(app, json_request("/predict", body.clone())).await;

            assert_eq!(status, StatusCode::OK, "{}", feature);
            assert_eq!(verdict["fraud_probability"], expected, "{}", feature);
        }
    }

    #[tokio::test]
    async fn test_predict_requires_card1() {
        let request = json_request("/predict", json!({"TransactionAmt": 10.0, "ProductCD": "W"}));
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], 422);
    }

    #[tokio::test]
    async fn test_predict_classifier_failure_is_500() {
        let request = json_request(
            "/predict",
            json!({"risk": -1.0, "TransactionAmt": 1.0, "ProductCD": "W", "card1": 1}),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Prediction error:"));
    }

    #[tokio::test]
    async fn test_predict_batch() {
        let (status, body) = send(app(), upload_request("/predict/batch", BATCH)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_transactions"], 3);
        assert_eq!(body["fraud_detected"], 2);
        assert_eq!(body["predictions"][2]["transaction_id"], 2);
        assert_eq!(body["predictions"][2]["risk_level"], "Critical");
    }

    #[tokio::test]
    async fn test_predict_batch_rejects_negative_amounts() {
        let csv = "TransactionAmt,ProductCD,card1,risk\n-5,W,1,0.1\n";
        let (status, body) = send(app(), upload_request("/predict/batch", csv)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("negative"));
    }

    #[tokio::test]
    async fn test_predict_batch_rejects_textual_amounts() {
        let csv = "TransactionAmt,ProductCD,card1,risk\n5,W,1,0.1\nabc,W,1,0.2\n";
        let (status, body) = send(app(), upload_request("/predict/batch", csv)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not a number"));
    }

    #[tokio::test]
    async fn test_predict_batch_failure_modes() {
        let csv = "TransactionAmt,ProductCD,card1,risk\n1,W,1,0.9\n2,W,1,-1\n";

        let (status, _) = send(app(), upload_request("/predict/batch", csv)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) =
            send(app(), upload_request("/predict/batch?mode=best_effort", csv)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_transactions"], 2);
        assert!(body["predictions"][1]["error"].is_string());
    }

    #[tokio::test]
    async fn test_predict_batch_stats_sample() {
        let app = app_with(BatchConfig {
            sample_size: 2,
            ..BatchConfig::default()
        });
        let (status, body) = send(app, upload_request("/predict/batch/stats", BATCH)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["total_transactions"], 3);
        assert_eq!(body["summary"]["risk_distribution"]["Critical"], 1);
        assert_eq!(body["detailed_predictions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_model_info() {
        let request = Request::builder().uri("/model/info").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["features_count"], 3);
        assert_eq!(body["optimal_threshold"], 0.6);
        assert_eq!(body["performance"]["recall"], "67.32%");
    }

    #[tokio::test]
    async fn test_metrics_count_predictions() {
        let state = AppState {
            service: Arc::new(scripted_service()),
            metrics: Arc::new(ServiceMetrics::new()),
            batch: BatchConfig::default(),
        };
        let metrics = state.metrics.clone();
        let app = router(state, &ServerConfig::default());

        let (status, _) = send(app.clone(), upload_request("/predict/batch", BATCH)).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let (_, body) = send(app, request).await;
        assert_eq!(body["predictions"], 3);
        assert_eq!(body["flagged"], 2);
        assert_eq!(body["batches"], 1);
        assert_eq!(metrics.snapshot().predictions, 3);
    }
}
