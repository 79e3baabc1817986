// Copyright 2026 Authrecon Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST adapter around the pipeline.
//!
//! Thin plumbing only: the handlers validate parameters, serialize
//! errors, and hand the work to [`PortalDriver`] and [`Engine`]. One
//! pipeline invocation runs at a time; concurrent requests queue on the
//! run lock.

use crate::config::Settings;
use crate::driver::PortalDriver;
use crate::enrich::{Engine, EngineOptions};
use crate::types::{DataLoadError, QueryParams};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Fixed filename and MIME type of the report download.
const REPORT_FILENAME: &str = "records_enriched.xlsx";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Wrapper to assert a future is Send.
///
/// The driver future contains only Send types, but the compiler cannot
/// prove it due to higher-ranked lifetime bounds in transitive
/// dependencies (chromiumoxide).
struct AssertSend<F>(F);

// SAFETY: All concrete types held across awaits in the driver future are
// Send (Browser, Page, watch channels, event streams).
unsafe impl<F: std::future::Future> Send for AssertSend<F> {}

impl<F: std::future::Future> std::future::Future for AssertSend<F> {
    type Output = F::Output;
    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let inner = unsafe { self.map_unchecked_mut(|s| &mut s.0) };
        inner.poll(cx)
    }
}

/// State shared by all handlers.
pub struct AppState {
    settings: Settings,
    driver: PortalDriver,
    engine: Engine,
    /// Serializes pipeline invocations — the browser session and the
    /// filesystem artifacts are not concurrent-safe.
    run_lock: Mutex<()>,
    /// Cancels in-flight browser waits and HTTP calls on shutdown.
    cancel: Arc<Notify>,
}

impl AppState {
    pub fn new(settings: Settings, cancel: Arc<Notify>) -> Self {
        let driver = PortalDriver::new(
            settings.portal.clone(),
            settings.driver.clone(),
            settings.work_dir.clone(),
        );
        let engine = Engine::new(&settings.enrich, EngineOptions::default());
        Self {
            settings,
            driver,
            engine,
            run_lock: Mutex::new(()),
            cancel,
        }
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/query", post(handle_query))
        .route("/api/v1/report", get(handle_report))
        .layer(cors)
        .with_state(state)
}

/// Serve the REST API until `shutdown` fires.
pub async fn start(state: Arc<AppState>, shutdown: Arc<Notify>) -> anyhow::Result<()> {
    let port = state.settings.http_port;
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;
    Ok(())
}

/// JSON error payload: `{"error": {"code", "message"}}`.
fn error_payload(code: &str, message: impl Into<String>) -> Value {
    json!({ "error": { "code": code, "message": message.into() } })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
struct QueryRequest {
    date: String,
    time: String,
    address: String,
}

/// Run the automation driver for one search and report the artifact.
async fn handle_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> impl IntoResponse {
    for (name, value) in [
        ("date", &req.date),
        ("time", &req.time),
        ("address", &req.address),
    ] {
        if value.trim().is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_payload(
                    "E_INVALID_PARAMS",
                    format!("'{name}' must be a non-empty string"),
                )),
            );
        }
    }

    let _running = state.run_lock.lock().await;
    let params = QueryParams::new(req.date, req.time, req.address);

    // Spawn through AssertSend to satisfy axum's Send requirement.
    let run_state = Arc::clone(&state);
    let result = {
        let fut = AssertSend(async move {
            run_state
                .driver
                .run(&params, Arc::clone(&run_state.cancel))
                .await
        });
        match tokio::task::spawn(fut).await {
            Ok(result) => result,
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(error_payload("E_INTERNAL", format!("driver task panicked: {e}"))),
                );
            }
        }
    };

    match result {
        Ok(artifact) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "artifact_path": artifact.display().to_string(),
                "completed_at": chrono::Utc::now().to_rfc3339(),
            })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": {
                    "code": "E_AUTOMATION",
                    "stage": e.stage.as_str(),
                    "message": e.to_string(),
                }
            })),
        ),
    }
}

/// Reconcile the most recent download and stream the enriched file.
async fn handle_report(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let export = state.settings.export_path();
    if !export.exists() {
        return (
            StatusCode::NOT_FOUND,
            Json(error_payload(
                "E_NO_ARTIFACT",
                "no downloaded spreadsheet; run a query first",
            )),
        )
            .into_response();
    }

    let _running = state.run_lock.lock().await;
    let enriched = state.settings.enriched_path();
    let result = state
        .engine
        .process(&export, &enriched, Arc::clone(&state.cancel))
        .await;

    match result {
        Ok((path, _summary)) => match tokio::fs::read(&path).await {
            Ok(bytes) => (
                [
                    (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{REPORT_FILENAME}\""),
                    ),
                ],
                bytes,
            )
                .into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_payload("E_INTERNAL", e.to_string())),
            )
                .into_response(),
        },
        Err(e) => {
            let status = match e {
                DataLoadError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, Json(error_payload("E_DATA_LOAD", e.to_string()))).into_response()
        }
    }
}
