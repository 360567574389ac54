//! Dashboard HTTP API over a [`PoolSession`].
//!
//! Every handler hands its core call to the blocking pool and answers with
//! the `{payload}` / `{error_code, error_message}` envelope.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, task};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ErrorCode, ExplorerError, Result};
use crate::explore::{
    BinPage, BinRequest, BlockTree, ErrorLogPage, ErrorLogRequest, ObjectDescription, ObjectListRequest, ObjectPage, Outcome,
    RangePage, RangeRequest, RecordFilter, SpaceMapSummary, TreeRequest,
};
use crate::provider::ImageError;
use crate::session::{PoolInfo, PoolSession};
use crate::types::{DatasetId, Namespace, ObjectId};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7070;

/// Runtime options used to boot the dashboard HTTP server.
#[derive(Clone, Debug)]
pub struct DashboardOptions {
    /// Pool image to serve.
    pub image: PathBuf,
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Allowed CORS origins for remote dashboards.
    pub allow_origins: Vec<String>,
}

impl DashboardOptions {
    /// Options bound to loopback on the default port.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            allow_origins: Vec::new(),
        }
    }

    /// Convenience accessor for `(host, port)` tuples.
    pub fn socket_parts(&self) -> (IpAddr, u16) {
        (self.host, self.port)
    }
}

/// Errors that can occur while running the dashboard server.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Loading the pool image failed.
    #[error(transparent)]
    Image(#[from] ImageError),
    /// Binding or serving on the TCP listener failed.
    #[error("dashboard server error: {0}")]
    Io(#[from] std::io::Error),
}

type AppState = Arc<ServerState>;

struct ServerState {
    session: Arc<PoolSession>,
}

/// Loads the pool image and serves it until shutdown.
pub async fn serve(options: DashboardOptions) -> std::result::Result<(), DashboardError> {
    install_tracing_subscriber();
    let session = Arc::new(PoolSession::open_image(&options.image)?);
    tracing::info!(
        image = %options.image.display(),
        pool = session.name(),
        "pool image loaded"
    );
    serve_session(session, options.host, options.port, &options.allow_origins).await
}

/// Serves an already-open session until shutdown.
pub async fn serve_session(
    session: Arc<PoolSession>,
    host: IpAddr,
    port: u16,
    allow_origins: &[String],
) -> std::result::Result<(), DashboardError> {
    install_tracing_subscriber();
    let pool = session.name().to_owned();
    let app = build_router(session, allow_origins);
    let addr = SocketAddr::from((host, port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, %pool, allow_origins = ?allow_origins, "dashboard listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds the API router.
pub fn build_router(session: Arc<PoolSession>, allow_origins: &[String]) -> Router {
    let state = Arc::new(ServerState { session });
    let cors = build_cors_layer(allow_origins);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/pool", get(pool_handler))
        .route("/api/errors", get(errors_handler))
        .route("/api/objects", get(objects_handler))
        .route("/api/datasets/:dataset/objects", get(dataset_objects_handler))
        .route("/api/obj/:objid", get(describe_handler))
        .route("/api/datasets/:dataset/obj/:objid", get(dataset_describe_handler))
        .route("/api/obj/:objid/block-tree", get(block_tree_handler))
        .route(
            "/api/datasets/:dataset/obj/:objid/block-tree",
            get(dataset_block_tree_handler),
        )
        .route("/api/spacemap/:objid/summary", get(summary_handler))
        .route("/api/spacemap/:objid/ranges", get(ranges_handler))
        .route("/api/spacemap/:objid/bins", get(bins_handler));

    if let Some(layer) = cors {
        router = router.layer(layer);
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let mut allowed = Vec::new();
    for origin in origins {
        let normalized = normalize_origin(origin);
        match normalized
            .as_deref()
            .and_then(|value| HeaderValue::from_str(value).ok())
        {
            Some(value) => allowed.push(value),
            None => {
                tracing::warn!(%origin, ?normalized, "ignoring invalid CORS origin");
            }
        }
    }

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([ACCEPT, CONTENT_TYPE]),
    )
}

fn normalize_origin(origin: &str) -> Option<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// HTTP status used for each error kind.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Unsupported => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

struct ApiReply<T>(Outcome<T>);

impl<T: Serialize> IntoResponse for ApiReply<T> {
    fn into_response(self) -> Response {
        let status = self.0.error_code().map_or(StatusCode::OK, status_for);
        (status, Json(self.0)).into_response()
    }
}

/// Runs a core call on the blocking pool.
async fn run<T, F>(state: AppState, op: F) -> ApiReply<T>
where
    T: Send + 'static,
    F: FnOnce(&PoolSession) -> Result<T> + Send + 'static,
{
    let session = Arc::clone(&state.session);
    match task::spawn_blocking(move || op(&session)).await {
        Ok(result) => ApiReply(result.into()),
        Err(err) => {
            tracing::error!(?err, "blocking task failed");
            ApiReply(ExplorerError::internal(format!("internal task failure: {err}")).into())
        }
    }
}

fn query<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params
        .map(|Query(inner)| inner)
        .map_err(|rejection| ExplorerError::invalid(rejection.body_text()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pool: String,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pool: state.session.name().to_owned(),
    })
}

async fn pool_handler(State(state): State<AppState>) -> ApiReply<PoolInfo> {
    ApiReply(Outcome::Payload {
        payload: state.session.info(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ObjectParams {
    cursor: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "type")]
    type_tag: Option<u8>,
}

impl ObjectParams {
    fn request(self, namespace: Namespace) -> ObjectListRequest {
        ObjectListRequest {
            namespace,
            cursor: self.cursor,
            limit: self.limit,
            type_tag: self.type_tag,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorLogParams {
    cursor: Option<u64>,
    limit: Option<u64>,
}

async fn errors_handler(
    State(state): State<AppState>,
    params: std::result::Result<Query<ErrorLogParams>, QueryRejection>,
) -> ApiReply<ErrorLogPage> {
    let params = query(params);
    run(state, move |session| {
        let params = params?;
        session.errors(&ErrorLogRequest {
            cursor: params.cursor,
            limit: params.limit,
        })
    })
    .await
}

async fn objects_handler(
    State(state): State<AppState>,
    params: std::result::Result<Query<ObjectParams>, QueryRejection>,
) -> ApiReply<ObjectPage> {
    let params = query(params);
    run(state, move |session| {
        session.objects(&params?.request(Namespace::Meta))
    })
    .await
}

async fn dataset_objects_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    params: std::result::Result<Query<ObjectParams>, QueryRejection>,
) -> ApiReply<ObjectPage> {
    let params = query(params);
    run(state, move |session| {
        let dataset = DatasetId::parse(&dataset)?;
        session.objects(&params?.request(Namespace::Dataset(dataset)))
    })
    .await
}

async fn describe_handler(
    State(state): State<AppState>,
    Path(objid): Path<String>,
) -> ApiReply<ObjectDescription> {
    run(state, move |session| {
        session.describe(Namespace::Meta, ObjectId::parse(&objid)?)
    })
    .await
}

async fn dataset_describe_handler(
    State(state): State<AppState>,
    Path((dataset, objid)): Path<(String, String)>,
) -> ApiReply<ObjectDescription> {
    run(state, move |session| {
        let namespace = Namespace::Dataset(DatasetId::parse(&dataset)?);
        session.describe(namespace, ObjectId::parse(&objid)?)
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
struct TreeParams {
    max_depth: Option<u64>,
    max_nodes: Option<u64>,
}

fn tree_request(namespace: Namespace, objid: &str, params: TreeParams) -> Result<TreeRequest> {
    Ok(TreeRequest {
        namespace,
        object: ObjectId::parse(objid)?,
        max_depth: params.max_depth,
        max_nodes: params.max_nodes,
    })
}

async fn block_tree_handler(
    State(state): State<AppState>,
    Path(objid): Path<String>,
    params: std::result::Result<Query<TreeParams>, QueryRejection>,
) -> ApiReply<BlockTree> {
    let params = query(params);
    run(state, move |session| {
        session.block_tree(&tree_request(Namespace::Meta, &objid, params?)?)
    })
    .await
}

async fn dataset_block_tree_handler(
    State(state): State<AppState>,
    Path((dataset, objid)): Path<(String, String)>,
    params: std::result::Result<Query<TreeParams>, QueryRejection>,
) -> ApiReply<BlockTree> {
    let params = query(params);
    run(state, move |session| {
        let namespace = Namespace::Dataset(DatasetId::parse(&dataset)?);
        session.block_tree(&tree_request(namespace, &objid, params?)?)
    })
    .await
}

async fn summary_handler(
    State(state): State<AppState>,
    Path(objid): Path<String>,
) -> ApiReply<SpaceMapSummary> {
    run(state, move |session| {
        session.spacemap_summary(ObjectId::parse(&objid)?)
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
struct SpaceMapParams {
    cursor: Option<u64>,
    limit: Option<u64>,
    bin_size: Option<u64>,
    op: Option<String>,
    min_length: Option<u64>,
    txg_min: Option<u64>,
    txg_max: Option<u64>,
}

impl SpaceMapParams {
    fn filter(&self) -> Result<RecordFilter> {
        RecordFilter::from_params(
            self.op.as_deref(),
            self.min_length,
            self.txg_min,
            self.txg_max,
        )
    }
}

async fn ranges_handler(
    State(state): State<AppState>,
    Path(objid): Path<String>,
    params: std::result::Result<Query<SpaceMapParams>, QueryRejection>,
) -> ApiReply<RangePage> {
    let params = query(params);
    run(state, move |session| {
        let object = ObjectId::parse(&objid)?;
        let params = params?;
        session.spacemap_ranges(&RangeRequest {
            object,
            cursor: params.cursor,
            limit: params.limit,
            filter: params.filter()?,
        })
    })
    .await
}

async fn bins_handler(
    State(state): State<AppState>,
    Path(objid): Path<String>,
    params: std::result::Result<Query<SpaceMapParams>, QueryRejection>,
) -> ApiReply<BinPage> {
    let params = query(params);
    run(state, move |session| {
        let object = ObjectId::parse(&objid)?;
        let params = params?;
        session.spacemap_bins(&BinRequest {
            object,
            bin_size: params.bin_size,
            cursor: params.cursor,
            limit: params.limit,
            filter: params.filter()?,
        })
    })
    .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

/// Installs the `info`-default env-filtered subscriber once per process.
/// Output goes to stderr so JSON written to stdout stays parseable.
pub fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
