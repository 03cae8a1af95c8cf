//! Spurgeon API Gateway
//!
//! The HTTP entry point for sermon search, question restatement,
//! devotional generation and chat.
//! Handles:
//! - Passcode authentication
//! - Request routing and the tool-call surface
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use spurgeon_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self, PROVIDER_BUCKETS},
    ServiceContext,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: ServiceContext,
    pub metrics: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);

    info!("Starting Spurgeon API Gateway v{}", spurgeon_common::VERSION);

    // Initialize metrics
    let metrics_handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), PROVIDER_BUCKETS)?
        .install_recorder()?;
    metrics::register_metrics();

    let services = ServiceContext::from_config(config.clone())?;

    // Create app state
    let state = AppState {
        config: config.clone(),
        services,
        metrics: metrics_handle,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// RUST_LOG wins over the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Passcode-protected operations; each accepts any method
    let protected = Router::new()
        .route("/search", any(handlers::search::search))
        .route("/searchSpurgeon", any(handlers::search::search))
        .route("/restateQuestion", any(handlers::restate::restate))
        .route("/restateSpurgeonQuestion", any(handlers::restate::restate))
        .route("/generateDevotional", any(handlers::devotional::generate))
        .route("/generateSpurgeonDevotional", any(handlers::devotional::generate))
        .route("/chat", any(handlers::chat::chat))
        .route("/tools/list", get(handlers::tools::list_tools))
        .route("/tools/{name}", post(handlers::tools::call_tool))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth::require_passcode));

    // Compose the app
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .merge(protected)
        .layer(from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use spurgeon_common::{
        embeddings::MockEmbedder,
        excerpts::ExcerptStore,
        llm::{text_payload, ScriptedModel},
        vector::{MockVectorIndex, VectorMatch},
    };
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        model: Arc<ScriptedModel>,
        _bodies: NamedTempFile,
    }

    fn harness(passcode: Option<&str>, replies: Vec<spurgeon_common::Result<Value>>) -> Harness {
        let mut bodies = NamedTempFile::new().unwrap();
        writeln!(bodies, "{}", json!({ "id": "s-1", "body": "Pray without ceasing." })).unwrap();

        let mut config = AppConfig::default();
        config.auth.admin_passcode = passcode.map(String::from);
        config.excerpts.bodies_path = bodies.path().to_path_buf();
        let config = Arc::new(config);

        let model = Arc::new(ScriptedModel::new(replies));
        let index = Arc::new(MockVectorIndex::new(vec![VectorMatch {
            key: "k-1".to_string(),
            distance: Some(0.2),
            metadata: json!({ "title": "Pray", "url": "https://example.org/s-1", "sermon_id": "s-1", "offset_start": 0, "offset_end": 4 }),
        }]));

        let services = ServiceContext::new(
            config.clone(),
            Arc::new(MockEmbedder::new(4)),
            index,
            model.clone(),
            Arc::new(ExcerptStore::new()),
        );

        let state = AppState {
            config,
            services,
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        };

        Harness {
            app: create_router(state),
            model,
            _bodies: bodies,
        }
    }

    fn post(uri: &str, passcode: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(passcode) = passcode {
            builder = builder.header("authorization", format!("Bearer {}", passcode));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_needs_no_passcode() {
        let h = harness(Some("secret"), vec![]);
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_passcode_checks() {
        let h = harness(None, vec![]);
        let (status, body) = send(&h.app, post("/search", Some("x"), json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Passcode is not configured" }));

        let h = harness(Some("secret"), vec![]);
        let (status, body) = send(&h.app, post("/search", None, json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Authorization header with passcode is required" }));

        let (status, body) = send(&h.app, post("/search", Some("wrong"), json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Invalid passcode" }));
    }

    #[tokio::test]
    async fn test_bare_token_accepted() {
        let h = harness(Some("secret"), vec![]);
        let request = Request::builder()
            .method("GET")
            .uri("/searchSpurgeon?question=prayer&topK=1&contextChars=8")
            .header("authorization", "secret")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "prayer");
        assert_eq!(body["results"][0]["excerpt"], "Pray without");
    }

    #[tokio::test]
    async fn test_search_scenario() {
        let h = harness(Some("secret"), vec![]);
        let (status, body) = send(
            &h.app,
            post(
                "/search",
                Some("secret"),
                json!({ "question": "How do I persevere in prayer?", "topK": 3, "contextChars": 120 }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "How do I persevere in prayer?");
        for result in body["results"].as_array().unwrap() {
            assert!(result["offset_start"].as_u64() <= result["offset_end"].as_u64());
            assert!(result["excerpt"].is_string());
        }
    }

    #[tokio::test]
    async fn test_validation_error_shape() {
        let h = harness(Some("secret"), vec![]);
        let (status, body) = send(&h.app, post("/restateQuestion", Some("secret"), json!({ "question": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "status": 400, "error": "Question or topic is required." }));

        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("authorization", "Bearer secret")
            .body(Body::from("[1,2,3]"))
            .unwrap();
        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_casual() {
        let h = harness(
            Some("secret"),
            vec![
                Ok(text_payload(r#"{"category":"casual","reason":"greeting"}"#, 3, 3)),
                Ok(text_payload("Good morning, friend.", 20, 5)),
            ],
        );
        let (status, body) = send(&h.app, post("/chat", Some("secret"), json!({ "message": "Hello there" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Good morning, friend.");
        assert_eq!(body["tool_runs"], json!([]));
        assert_eq!(h.model.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let h = harness(Some("secret"), vec![]);
        let request = Request::builder()
            .uri("/tools/list")
            .header("authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"].as_array().unwrap().len(), 3);

        let (status, body) = send(
            &h.app,
            post("/tools/spurgeon.search", Some("secret"), json!({ "topic": "prayer", "topK": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["structuredContent"]["query"], "prayer");
        assert!(body["content"][0]["text"].as_str().unwrap().contains("\"query\": \"prayer\""));
        assert!(body.get("isError").is_none());
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_in_band() {
        let h = harness(Some("secret"), vec![]);
        let (status, body) = send(&h.app, post("/tools/spurgeon.devotional", Some("secret"), json!({ "question": "q" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isError"], true);
        let text: Value = serde_json::from_str(body["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["status"], 400);
        assert_eq!(text["error"], "Excerpts are required.");

        let (status, _) = send(&h.app, post("/tools/spurgeon.unknown", Some("secret"), json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_devotional_route_alias() {
        let devotional = json!({ "title": "Grace", "intro": "", "paragraphs": ["One."], "references": [] });
        let h = harness(Some("secret"), vec![Ok(text_payload(&devotional.to_string(), 10, 10))]);
        let (status, body) = send(
            &h.app,
            post(
                "/generateSpurgeonDevotional",
                Some("secret"),
                json!({ "question": "grace", "excerpts": [{ "title": "t", "url": "u", "excerpt": "e" }] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["devotional"]["title"], "Grace");
        assert_eq!(body["devotional"]["paragraphs"], json!(["One."]));
    }
}
