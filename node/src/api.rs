//! # REST + JSON-RPC + WebSocket API
//!
//! Builds the axum router that exposes the chain index. All endpoints
//! share application state through axum's `State` extractor, and every
//! read goes through [`ChainQuery`].
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                        |
//! |--------|---------------------------|------------------------------------|
//! | GET    | `/health`                 | Liveness probe                     |
//! | GET    | `/status`                 | Node and chain summary             |
//! | POST   | `/rpc`                    | JSON-RPC 2.0 gateway               |
//! | GET    | `/ws`                     | WebSocket for tip/reorg events     |
//! | GET    | `/blocks/:hash`           | `getblock` view of a block         |
//! | GET    | `/blocks/height/:height`  | Main-chain block at a height       |
//! | GET    | `/tips`                   | All branch tips                    |
//!
//! ## JSON-RPC Methods
//!
//! | Method             | Params        | Result                        |
//! |--------------------|---------------|-------------------------------|
//! | `getblock`         | `[hash]`      | `BlockInfo`                   |
//! | `getblockhash`     | `[height]`    | hash                          |
//! | `getbestblockhash` | `[]`          | hash                          |
//! | `getblockcount`    | `[]`          | tip height                    |
//! | `getchaintips`     | `[]`          | `ChainTipInfo` array          |
//! | `getconfirmations` | `[hash]`      | confirmations (`-1` orphaned) |
//! | `submitheader`     | `[header]`    | [`SubmitResult`]              |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nova_chain::{BlockHash, BlockHeader, ChainError, ChainQuery, InsertOutcome};

use crate::events::{submit_header_async, NodeEvent};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc` or is a channel handle.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network name ("main", "testnet", "regtest").
    pub network: String,
    /// Read access to the chain index.
    pub query: ChainQuery,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<NodeEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/blocks/:hash", get(block_by_hash_handler))
        .route("/blocks/height/:height", get(block_by_height_handler))
        .route("/tips", get(tips_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// JSON-RPC error codes used by this node.
pub mod codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = -32001;
    pub const HEADER_REJECTED: i32 = -32010;
}

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Positional parameters.
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ChainError> for JsonRpcError {
    fn from(err: ChainError) -> Self {
        let code = match &err {
            ChainError::UnknownBlock(_) => codes::NOT_FOUND,
            ChainError::DuplicateEntry(_)
            | ChainError::OrphanParent { .. }
            | ChainError::InvalidWork { .. }
            | ChainError::Listener { .. } => codes::HEADER_REJECTED,
            ChainError::MissingAncestor(_) | ChainError::Db(_) => codes::INTERNAL_ERROR,
        };
        Self::new(code, err.to_string())
    }
}

type RpcResult = Result<Value, JsonRpcError>;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network identifier.
    pub network: String,
    /// Height of the active tip.
    pub height: u64,
    /// Hash of the active tip.
    pub best_block_hash: String,
    /// Stored entries across all branches.
    pub entries: usize,
    /// Known branch tips.
    pub tips: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Result of `submitheader`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResult {
    /// Hash of the accepted header.
    pub hash: String,
    /// Height of the new entry.
    pub height: u64,
    /// "extended", "reorganized" or "side-branch".
    pub outcome: String,
    /// Blocks disconnected by this header. 0 unless reorganized.
    pub depth: usize,
}

impl From<&InsertOutcome> for SubmitResult {
    fn from(outcome: &InsertOutcome) -> Self {
        let entry = outcome.entry();
        let (label, depth) = match outcome {
            InsertOutcome::Extended(_) => ("extended", 0),
            InsertOutcome::Reorganized(update) => ("reorganized", update.depth()),
            InsertOutcome::SideBranch(_) => ("side-branch", 0),
        };
        Self {
            hash: entry.hash.to_hex(),
            height: entry.height,
            outcome: label.to_string(),
            depth,
        }
    }
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// REST Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node and chain summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let tip = state.query.get_active_tip();
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        height: tip.height,
        best_block_hash: tip.hash.to_hex(),
        entries: state.query.entry_count(),
        tips: state.query.tree().store().tip_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /blocks/:hash`: the `getblock` view of any known block.
async fn block_by_hash_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let hash = match hash.parse::<BlockHash>() {
        Ok(h) => h,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid hash: {}", e)),
    };

    match state.query.block_info(&hash) {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) if e.is_not_found() => {
            error_response(StatusCode::NOT_FOUND, format!("Block not found: {}", hash))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /blocks/height/:height`: the main-chain block at a height.
async fn block_by_height_handler(
    Path(height): Path<u64>,
    State(state): State<AppState>,
) -> Response {
    let Some(hash) = state.query.get_block_hash(height) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Block not found at height {}", height),
        );
    };

    match state.query.block_info(&hash) {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /tips`: every branch tip.
async fn tips_handler(State(state): State<AppState>) -> Response {
    match state.query.chain_tips() {
        Ok(tips) => (StatusCode::OK, Json(tips)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// `POST /rpc`: JSON-RPC 2.0 gateway.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let outcome = if req.jsonrpc != "2.0" {
        Err(JsonRpcError::new(
            codes::INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"",
        ))
    } else {
        dispatch(&state, &req.method, req.params.as_ref()).await
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

async fn dispatch(state: &AppState, method: &str, params: Option<&Value>) -> RpcResult {
    let query = &state.query;
    match method {
        "getblock" => {
            let hash = param_hash(params, 0)?;
            to_value(query.block_info(&hash)?)
        }
        "getblockhash" => {
            let height = param_u64(params, 0)?;
            let hash = query.get_block_hash(height).ok_or_else(|| {
                JsonRpcError::new(
                    codes::NOT_FOUND,
                    format!("Block height out of range: {}", height),
                )
            })?;
            Ok(Value::String(hash.to_hex()))
        }
        "getbestblockhash" => Ok(Value::String(query.best_block_hash().to_hex())),
        "getblockcount" => Ok(Value::from(query.block_count())),
        "getchaintips" => to_value(query.chain_tips()?),
        "getconfirmations" => {
            let hash = param_hash(params, 0)?;
            Ok(Value::from(query.confirmations(&hash)?))
        }
        "submitheader" => {
            let header: BlockHeader = param(params, 0)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .ok_or_else(|| {
                    JsonRpcError::new(codes::INVALID_PARAMS, "Invalid params: expected [header]")
                })?;

            let outcome = submit_header_async(
                Arc::clone(query.tree()),
                Arc::clone(&state.metrics),
                header,
            )
            .await
            .map_err(|e| JsonRpcError::new(codes::INTERNAL_ERROR, e.to_string()))??;

            to_value(SubmitResult::from(&outcome))
        }
        _ => Err(JsonRpcError::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )),
    }
}

fn to_value<T: Serialize>(value: T) -> RpcResult {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(codes::INTERNAL_ERROR, e.to_string()))
}

fn param(params: Option<&Value>, index: usize) -> Option<&Value> {
    params.and_then(|p| p.as_array()).and_then(|arr| arr.get(index))
}

fn param_hash(params: Option<&Value>, index: usize) -> Result<BlockHash, JsonRpcError> {
    param(params, index)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| JsonRpcError::new(codes::INVALID_PARAMS, "Invalid params: expected [hash]"))
}

fn param_u64(params: Option<&Value>, index: usize) -> Result<u64, JsonRpcError> {
    param(params, index)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| {
            JsonRpcError::new(codes::INVALID_PARAMS, "Invalid params: expected [height]")
        })
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`NodeEvent`] messages for each tip change
/// and reorganization. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
