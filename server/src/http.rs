//! HTTP/JSON control API.
//!
//! One route per control operation under `/v1/`, with typed errors mapped
//! to status codes and the streaming operation served as SSE. Requests and
//! responses are the `sdk` crate's wire types.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::ApiClientFactory;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response, Sse, sse};
use axum::routing::{get, post};
use axum::Router;
use network::NetworkError;
use network::health::{DEFAULT_HEALTHY_TIMEOUT, DEFAULT_POLL_INTERVAL};
use sdk::types::{
    AttachPeerRequest, AttachPeerResponse, ClusterInfo, ErrorBody, RemoveNodeRequest,
    RestartNodeRequest, SendOutboundMessageRequest, SendOutboundMessageResponse, StartRequest,
    StopResponse, UrisResponse,
};
use serde::Deserialize;
use slog::Logger;
use tokio_stream::Stream;

use crate::error::ControlError;
use crate::runner::{ClusterRunner, Readiness, RunnerConfig};

/// Shared state of the control server: at most one cluster runner per
/// server instance lifetime.
pub struct ControlContext {
    pub logger: Logger,
    pub root_data_dir: PathBuf,
    pub client_factory: ApiClientFactory,
    pub healthy_timeout: Duration,
    pub poll_interval: Duration,
    runner: Mutex<Option<Arc<ClusterRunner>>>,
}

impl ControlContext {
    pub fn new(logger: Logger, root_data_dir: PathBuf, client_factory: ApiClientFactory) -> Self {
        Self {
            logger,
            root_data_dir,
            client_factory,
            healthy_timeout: DEFAULT_HEALTHY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            runner: Mutex::new(None),
        }
    }

    fn runner(&self) -> Result<Arc<ClusterRunner>, ControlError> {
        self.runner
            .lock()
            .unwrap()
            .clone()
            .ok_or(ControlError::NotStarted)
    }

    /// The runner, if one was ever started. Used for teardown on server
    /// shutdown.
    pub fn current_runner(&self) -> Option<Arc<ClusterRunner>> {
        self.runner.lock().unwrap().clone()
    }
}

/// HTTP-facing error with its status mapping.
struct HttpError(StatusCode, String);

impl From<ControlError> for HttpError {
    fn from(err: ControlError) -> Self {
        let status = match &err {
            ControlError::NotStarted => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::AlreadyStarted => StatusCode::CONFLICT,
            ControlError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::Network(e) => match e {
                NetworkError::Validation(_) | NetworkError::Genesis(_) => StatusCode::BAD_REQUEST,
                NetworkError::NameConflict(_) => StatusCode::CONFLICT,
                NetworkError::NotFound(_) | NetworkError::PeerNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                NetworkError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                NetworkError::Aborted => StatusCode::SERVICE_UNAVAILABLE,
                NetworkError::Process { .. } | NetworkError::Connection(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };
        Self(status, err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

/// Build the control router.
pub fn router(context: Arc<ControlContext>) -> Router {
    Router::new()
        .route("/v1/start", post(start_handler))
        .route("/v1/health", get(health_handler))
        .route("/v1/uris", get(uris_handler))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream-status", get(stream_status_handler))
        .route("/v1/remove-node", post(remove_node_handler))
        .route("/v1/restart-node", post(restart_node_handler))
        .route("/v1/attach-peer", post(attach_peer_handler))
        .route("/v1/send-outbound-message", post(send_outbound_message_handler))
        .route("/v1/stop", post(stop_handler))
        .with_state(context)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    context: Arc<ControlContext>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    slog::info!(context.logger, "Control server listening"; "addr" => %addr);
    axum::serve(listener, router(context))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn start_handler(
    State(ctx): State<Arc<ControlContext>>,
    Json(req): Json<StartRequest>,
) -> Result<Json<ClusterInfo>, HttpError> {
    if req.exec_path.is_empty() {
        return Err(ControlError::Network(NetworkError::Validation(
            "exec_path is empty".into(),
        ))
        .into());
    }

    let mut config = RunnerConfig::new(req.exec_path.as_str(), &ctx.root_data_dir);
    if let Some(n) = req.num_nodes {
        config.num_nodes = n;
    }
    if let Some(subnets) = req.whitelisted_subnets {
        config.whitelisted_subnets = subnets;
    }
    config.healthy_timeout = ctx.healthy_timeout;
    config.poll_interval = ctx.poll_interval;

    let mut guard = ctx.runner.lock().unwrap();
    // One start per server instance lifetime; a second call is a usage
    // error even after stop.
    if guard.is_some() {
        return Err(ControlError::AlreadyStarted.into());
    }
    let runner = ClusterRunner::start(
        ctx.logger.clone(),
        config,
        Arc::clone(&ctx.client_factory),
    );
    *guard = Some(Arc::clone(&runner));
    drop(guard);

    Ok(Json(runner.cluster_info()))
}

/// Wait for readiness, then hand the runner back for a gated operation.
async fn ready_runner(ctx: &ControlContext) -> Result<Arc<ClusterRunner>, HttpError> {
    let runner = ctx.runner()?;
    match runner.wait_ready().await {
        Readiness::Ready => Ok(runner),
        Readiness::Failed(reason) => Err(ControlError::NotReady(reason).into()),
        Readiness::Pending => unreachable!("wait_ready never returns Pending"),
    }
}

async fn health_handler(
    State(ctx): State<Arc<ControlContext>>,
) -> Result<Json<ClusterInfo>, HttpError> {
    let runner = ready_runner(&ctx).await?;
    Ok(Json(runner.cluster_info()))
}

async fn uris_handler(
    State(ctx): State<Arc<ControlContext>>,
) -> Result<Json<UrisResponse>, HttpError> {
    let runner = ready_runner(&ctx).await?;
    Ok(Json(UrisResponse {
        uris: runner.uris(),
    }))
}

async fn status_handler(
    State(ctx): State<Arc<ControlContext>>,
) -> Result<Json<ClusterInfo>, HttpError> {
    let runner = ready_runner(&ctx).await?;
    Ok(Json(runner.cluster_info()))
}

#[derive(Debug, Deserialize)]
struct StreamStatusParams {
    push_interval_ms: Option<u64>,
}

/// SSE endpoint: one cluster snapshot per push interval, until the client
/// disconnects or the cluster is stopped. The ticker lives inside the
/// per-connection stream, so dropping the connection drops the ticker.
async fn stream_status_handler(
    State(ctx): State<Arc<ControlContext>>,
    Query(params): Query<StreamStatusParams>,
) -> Result<Sse<impl Stream<Item = Result<sse::Event, Infallible>>>, HttpError> {
    let runner = ctx.runner()?;
    let push_interval = Duration::from_millis(params.push_interval_ms.unwrap_or(5000).max(1));

    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(push_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = runner.stop_signal().wait() => break,
                _ = ticker.tick() => {
                    let info = runner.cluster_info();
                    match serde_json::to_string(&info) {
                        Ok(data) => yield Ok::<_, Infallible>(sse::Event::default().data(data)),
                        Err(_) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(sse::KeepAlive::default()))
}

async fn remove_node_handler(
    State(ctx): State<Arc<ControlContext>>,
    Json(req): Json<RemoveNodeRequest>,
) -> Result<Json<ClusterInfo>, HttpError> {
    let runner = ctx.runner()?;
    let info = runner.remove_node(&req.node_name).await?;
    Ok(Json(info))
}

async fn restart_node_handler(
    State(ctx): State<Arc<ControlContext>>,
    Json(req): Json<RestartNodeRequest>,
) -> Result<Json<ClusterInfo>, HttpError> {
    let runner = ctx.runner()?;
    let info = runner
        .restart_node(&req.node_name, req.exec_path, req.whitelisted_subnets)
        .await?;
    Ok(Json(info))
}

async fn attach_peer_handler(
    State(ctx): State<Arc<ControlContext>>,
    Json(req): Json<AttachPeerRequest>,
) -> Result<Json<AttachPeerResponse>, HttpError> {
    let runner = ctx.runner()?;
    let peer = runner.attach_peer(&req.node_name).await?;
    Ok(Json(AttachPeerResponse { peer }))
}

async fn send_outbound_message_handler(
    State(ctx): State<Arc<ControlContext>>,
    Json(req): Json<SendOutboundMessageRequest>,
) -> Result<Json<SendOutboundMessageResponse>, HttpError> {
    let payload = hex::decode(&req.payload_hex).map_err(|e| {
        HttpError::from(ControlError::Network(NetworkError::Validation(format!(
            "payload_hex is not valid hex: {e}"
        ))))
    })?;

    let runner = ctx.runner()?;
    runner
        .send_outbound_message(&req.node_name, &req.peer_id, req.op, &payload)
        .await?;
    Ok(Json(SendOutboundMessageResponse { sent: true }))
}

async fn stop_handler(
    State(ctx): State<Arc<ControlContext>>,
) -> Result<Json<StopResponse>, HttpError> {
    // Stop before start is a no-op: nothing to tear down.
    let Some(runner) = ctx.current_runner() else {
        return Ok(Json(StopResponse {
            cluster_info: ClusterInfo::default(),
            error: None,
        }));
    };
    let error = runner.stop().await;
    Ok(Json(StopResponse {
        cluster_info: runner.cluster_info(),
        error,
    }))
}
