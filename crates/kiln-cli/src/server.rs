//! HTTP transport: one POST endpoint in front of the pipeline

use crate::request::RunBody;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use kiln_core::{LintGate, Pipeline, PipelineConfig, StyleChecker};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

pub const DEFAULT_PORT: u16 = 8888;

/// Shared by every request
pub struct AppState {
    pub config: PipelineConfig,
    pub lint: Arc<dyn LintGate>,
}

impl AppState {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            lint: Arc::new(StyleChecker),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Serve the front end from `webroot` and move the endpoint to `/run`
    pub interactive: bool,
    pub cors: bool,
    pub webroot: PathBuf,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            cors: false,
            webroot: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/webroot")),
        }
    }
}

pub fn build_router(state: Arc<AppState>, options: &ServerOptions) -> Router {
    let endpoint = if options.interactive { "/run" } else { "/" };
    let mut routes = Router::new().route(endpoint, post(run_source));
    if options.interactive {
        routes = routes.fallback_service(ServeDir::new(&options.webroot));
    }
    let router = routes.with_state(state);
    if options.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn serve(state: Arc<AppState>, options: ServerOptions, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    let endpoint = if options.interactive { "/run" } else { "/" };
    info!(port, endpoint, interactive = options.interactive, cors = options.cors, "listening");
    axum::serve(listener, build_router(state, &options)).await?;
    Ok(())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn run_source(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let parsed = serde_json::from_slice::<RunBody>(&body)
        .map_err(|e| format!("Invalid request body: {e}"))
        .and_then(|body| body.into_request().map_err(|e| e.to_string()));
    let request = match parsed {
        Ok(request) => request,
        Err(message) => {
            info!(error = %message, "rejected request");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    let result = tokio::task::spawn_blocking(move || {
        Pipeline::new(&state.config, Arc::clone(&state.lint), request).run()
    })
    .await;

    match result {
        Ok(Ok(record)) => Json(record).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "pipeline failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "pipeline task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    async fn spawn_server(options: ServerOptions) -> String {
        let state = Arc::new(AppState::new(PipelineConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state, &options);
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_runs_snippet() {
        let base = spawn_server(ServerOptions::default()).await;
        let resp = reqwest::Client::new()
            .post(&base)
            .json(&json!({ "source": "int a = 3; int b = 4; print(a+b);" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["compiled"], true);
        assert_eq!(body["executed"], true);
        assert_eq!(body["output"], "7\n");
        assert_eq!(body["as"], "snippet");
        assert_eq!(body["compiler"], "bytecode");
        assert_eq!(body["timeout"], 100);
        assert!(body["received"].is_string());
        assert!(body["returned"].is_string());
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_timeout_still_answers() {
        let base = spawn_server(ServerOptions::default()).await;
        let body: Value = reqwest::Client::new()
            .post(&base)
            .json(&json!({ "source": "while (true) {\n}", "timeout": 20 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["timedOut"], true);
        assert_eq!(body["executed"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let base = spawn_server(ServerOptions::default()).await;
        let client = reqwest::Client::new();

        let resp = client.post(&base).body("{ nope").send().await.unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let resp = client.post(&base).json(&json!({ "as": "class" })).send().await.unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_interactive_mode() {
        let base = spawn_server(ServerOptions {
            interactive: true,
            ..ServerOptions::default()
        })
        .await;
        let client = reqwest::Client::new();

        let page = client.get(format!("{base}/index.html")).send().await.unwrap();
        assert_eq!(page.status(), 200);
        assert!(page.text().await.unwrap().contains("kiln"));

        let resp = client
            .post(format!("{base}/run"))
            .json(&json!({ "source": "print(\"hi\");" }))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["output"], "hi\n");
    }

    #[tokio::test]
    async fn test_cors_header() {
        let base = spawn_server(ServerOptions {
            cors: true,
            ..ServerOptions::default()
        })
        .await;
        let resp = reqwest::Client::new()
            .post(&base)
            .header("Origin", "http://example.com")
            .json(&json!({ "source": "print(1);" }))
            .send()
            .await
            .unwrap();
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }
}
