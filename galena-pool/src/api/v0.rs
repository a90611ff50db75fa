//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until the pool reaches 1.0.

use axum::{Json, extract::State};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::{BlockSummary, MethodLogEntry, PoolSummary, WorkerSummary};

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_pool))
        .routes(routes!(get_workers))
        .routes(routes!(get_blocks))
        .routes(routes!(get_methods))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return the pool-wide statistics snapshot.
#[utoipa::path(
    get,
    path = "/pool",
    tag = "pool",
    responses(
        (status = OK, description = "Current pool statistics", body = PoolSummary),
    ),
)]
async fn get_pool(State(state): State<SharedState>) -> Json<PoolSummary> {
    Json(state.pool_summary())
}

/// Return all known workers, active and historical.
#[utoipa::path(
    get,
    path = "/workers",
    tag = "workers",
    responses(
        (status = OK, description = "Per-worker statistics", body = Vec<WorkerSummary>),
    ),
)]
async fn get_workers(State(state): State<SharedState>) -> Json<Vec<WorkerSummary>> {
    Json(state.workers())
}

/// Return every block the pool has found.
#[utoipa::path(
    get,
    path = "/blocks",
    tag = "blocks",
    responses(
        (status = OK, description = "Blocks found by the pool", body = Vec<BlockSummary>),
    ),
)]
async fn get_blocks(State(state): State<SharedState>) -> Json<Vec<BlockSummary>> {
    Json(state.blocks())
}

/// Return the recent Stratum method log.
#[utoipa::path(
    get,
    path = "/methods",
    tag = "methods",
    responses(
        (status = OK, description = "Recent Stratum method calls", body = Vec<MethodLogEntry>),
    ),
)]
async fn get_methods(State(state): State<SharedState>) -> Json<Vec<MethodLogEntry>> {
    Json(state.methods())
}
