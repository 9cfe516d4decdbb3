//! Tierbit REST API Server
//!
//! Run with: cargo run --features server --bin tierbit-server
//!
//! Environment:
//!   TIERBIT_DB      - database directory (default ./data/tierbit.mdb)
//!   TIERBIT_CONFIG  - optional matrix config TOML
//!   PORT            - listen port (default 3000)
//!   RUST_LOG        - tracing filter (default info)
//!
//! Endpoints:
//!   GET  /health                              - Liveness and active mode
//!   POST /entities                            - Create entity
//!   POST /permissions/check                   - Evaluate a permission (pure read)
//!   POST /permissions/gate                    - Evaluate with mode handling and audit
//!   POST /permissions/train                   - Record a learned decision
//!   POST /permissions/set                     - Set an explicit decision
//!   POST /permissions/lock                    - Lock and cascade to descendants
//!   POST /permissions/unlock                  - Release a lock
//!   GET  /permissions/requests?status=pending - List request rows
//!   POST /permissions/requests/:id/approve    - Train a pending request
//!   POST /permissions/requests/:id/reject     - Dismiss a pending request
//!   POST /sku/parse                           - Parse a compound SKU
//!   POST /sku/build                           - Build a compound SKU
//!   POST /sku/validate                        - Strict SKU validation
//!   POST /sku/resolve                         - Resolve a lineage SKU

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tierbit::{
    build, parse, validate, Entity, EntityHierarchy, EntityType, Error, LineItem, LockOutcome, MatrixConfig, Mode,
    PermissionMatrix, PermissionRecord, PermissionRequest, PermissionResult, PermissionStore, RequestContext,
    RequestStatus, Resolution, SkuLineage, SkuParseResult, SkuValidation, Store, UnlockOutcome,
};

// ============================================================================
// State
// ============================================================================

struct AppState {
    store: Store,
    matrix: PermissionMatrix<Store, Store>,
    lineage: SkuLineage<Store, Store>,
}

type Shared = State<Arc<AppState>>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct CreateEntityReq {
    code: String,
    entity_type: EntityType,
    parent_id: Option<u64>,
}

#[derive(Deserialize)]
struct CheckReq {
    entity_id: u64,
    key: String,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct GateReq {
    entity_id: u64,
    action: String,
    method: String,
    route: String,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct TrainReq {
    entity_id: u64,
    key: String,
    scope: Option<String>,
    allow: bool,
    route: Option<String>,
}

#[derive(Deserialize)]
struct SetReq {
    entity_id: u64,
    key: String,
    allowed: bool,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct RequestsQuery {
    status: Option<RequestStatus>,
}

#[derive(Deserialize)]
struct ApproveReq {
    allow: bool,
}

#[derive(Deserialize)]
struct SkuReq {
    sku: String,
}

#[derive(Deserialize)]
struct BuildReq {
    items: Vec<LineItem>,
}

#[derive(Serialize)]
struct BuildRes {
    sku: String,
}

#[derive(Serialize)]
struct HealthRes {
    status: &'static str,
    mode: Mode,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

// ============================================================================
// Helpers
// ============================================================================

fn status_of(e: &Error) -> StatusCode {
    match e {
        Error::Locked { .. } | Error::RequestNotPending(_) => StatusCode::CONFLICT,
        Error::EntityNotFound(_) | Error::RequestNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidKey(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T>(r: tierbit::Result<T>) -> Reply<T> {
    match r {
        Ok(v) => (StatusCode::OK, Json(ApiResponse::ok(v))),
        Err(e) => {
            let status = status_of(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(error = %e, "request failed");
            }
            (status, Json(ApiResponse::err(e.to_string())))
        }
    }
}

fn ok<T>(v: T) -> Reply<T> {
    reply(Ok(v))
}

fn entity(s: &AppState, id: u64) -> tierbit::Result<Entity> {
    s.store.require_entity(id)
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_health(State(s): Shared) -> Reply<HealthRes> {
    ok(HealthRes { status: "ok", mode: s.matrix.config().mode })
}

async fn post_entity(State(s): Shared, Json(req): Json<CreateEntityReq>) -> Reply<Entity> {
    reply(s.store.create_entity(&req.code, req.entity_type, req.parent_id))
}

async fn post_check(State(s): Shared, Json(req): Json<CheckReq>) -> Reply<PermissionResult> {
    reply(entity(&s, req.entity_id).and_then(|e| s.matrix.can(&e, &req.key, req.scope.as_deref())))
}

async fn post_gate(State(s): Shared, Json(req): Json<GateReq>) -> Reply<PermissionResult> {
    let mut ctx = RequestContext::new(req.method, req.route);
    ctx.scope = req.scope;
    reply(entity(&s, req.entity_id).and_then(|e| s.matrix.gate_request(&ctx, &e, &req.action)))
}

async fn post_train(State(s): Shared, Json(req): Json<TrainReq>) -> Reply<PermissionRecord> {
    reply(entity(&s, req.entity_id).and_then(|e| {
        s.matrix
            .train(&e, &req.key, req.scope.as_deref(), req.allow, req.route.as_deref())
    }))
}

async fn post_set(State(s): Shared, Json(req): Json<SetReq>) -> Reply<PermissionRecord> {
    reply(entity(&s, req.entity_id).and_then(|e| {
        s.matrix
            .set_permission(&e, &req.key, req.allowed, req.scope.as_deref())
    }))
}

async fn post_lock(State(s): Shared, Json(req): Json<SetReq>) -> Reply<LockOutcome> {
    reply(entity(&s, req.entity_id).and_then(|e| s.matrix.lock(&e, &req.key, req.allowed, req.scope.as_deref())))
}

async fn post_unlock(State(s): Shared, Json(req): Json<CheckReq>) -> Reply<UnlockOutcome> {
    reply(entity(&s, req.entity_id).and_then(|e| s.matrix.unlock(&e, &req.key, req.scope.as_deref())))
}

async fn get_requests(State(s): Shared, Query(q): Query<RequestsQuery>) -> Reply<Vec<PermissionRequest>> {
    reply(s.store.requests(q.status))
}

async fn post_approve(State(s): Shared, Path(id): Path<u64>, Json(req): Json<ApproveReq>) -> Reply<PermissionRecord> {
    reply(s.matrix.approve_request(id, req.allow))
}

async fn post_reject(State(s): Shared, Path(id): Path<u64>) -> Reply<PermissionRequest> {
    reply(s.matrix.reject_request(id))
}

async fn post_sku_parse(Json(req): Json<SkuReq>) -> Reply<SkuParseResult> {
    ok(parse(&req.sku))
}

async fn post_sku_build(Json(req): Json<BuildReq>) -> Reply<BuildRes> {
    ok(BuildRes { sku: build(&req.items) })
}

async fn post_sku_validate(Json(req): Json<SkuReq>) -> Reply<SkuValidation> {
    ok(validate(&req.sku))
}

async fn post_sku_resolve(State(s): Shared, Json(req): Json<SkuReq>) -> Reply<Option<Resolution>> {
    reply(s.lineage.resolve(&req.sku))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_path = std::env::var("TIERBIT_DB").unwrap_or_else(|_| "./data/tierbit.mdb".into());
    let config = match std::env::var("TIERBIT_CONFIG") {
        Ok(path) => MatrixConfig::load(&path)?,
        Err(_) => MatrixConfig::default(),
    };
    tracing::info!(db = %db_path, mode = ?config.mode, "starting tierbit server");
    let store = Store::open(&db_path)?;

    let state = Arc::new(AppState {
        matrix: PermissionMatrix::with_store(store.clone(), config),
        lineage: SkuLineage::with_store(store.clone()),
        store,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(get_health))
        .route("/entities", post(post_entity))
        .route("/permissions/check", post(post_check))
        .route("/permissions/gate", post(post_gate))
        .route("/permissions/train", post(post_train))
        .route("/permissions/set", post(post_set))
        .route("/permissions/lock", post(post_lock))
        .route("/permissions/unlock", post(post_unlock))
        .route("/permissions/requests", get(get_requests))
        .route("/permissions/requests/:id/approve", post(post_approve))
        .route("/permissions/requests/:id/reject", post(post_reject))
        .route("/sku/parse", post(post_sku_parse))
        .route("/sku/build", post(post_sku_build))
        .route("/sku/validate", post(post_sku_validate))
        .route("/sku/resolve", post(post_sku_resolve))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!(%addr, "tierbit server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
