use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::{LedgerError, LedgerResult};
use crate::node::{NodeHandle, TransactionQuery};
use crate::replication::ClusterStatus;
use crate::types::{Account, AuditEntry, Role, Transaction, TxType};

#[derive(Clone)]
struct AppState {
    node: NodeHandle,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
}

#[derive(Deserialize)]
struct RegisterRequest {
    address: String,
    role: Option<Role>,
}

#[derive(Deserialize)]
struct GrantRoleRequest {
    address: String,
    role: Role,
}

#[derive(Deserialize)]
struct QueryRequest {
    requester_address: String,
}

#[derive(Deserialize)]
struct ClusterJoinRequest {
    node_id: String,
    raft_address: String,
}

#[derive(Deserialize)]
struct ClusterRemoveRequest {
    node_id: String,
}

type ApiError = (StatusCode, HeaderMap, Json<ErrorResponse>);

pub async fn serve(node: NodeHandle, addr: SocketAddr) -> LedgerResult<()> {
    let state = AppState { node };
    let router = Router::new()
        .route("/health", get(health))
        .route("/accounts/register", post(register_account))
        .route("/accounts/role", post(grant_role))
        .route("/accounts/:address", get(account_info))
        .route("/transactions", post(submit_transaction))
        .route("/transactions/query", post(query_transactions))
        .route("/audit", get(audit_entries))
        .route("/audit/:index", get(audit_entry))
        .route("/cluster/join", post(cluster_join))
        .route("/cluster/remove", post(cluster_remove))
        .route("/cluster/status", get(cluster_status))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(?addr, "HTTP server listening");
    axum::serve(listener, router)
        .await
        .map_err(|err| LedgerError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        node_id: state.node.node_id().to_string(),
    })
}

async fn register_account(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    if request.address.is_empty() {
        return Err(to_http_error(LedgerError::InvalidArgument(
            "address required".into(),
        )));
    }
    state
        .node
        .register_account(&request.address, request.role)
        .map(|_| (StatusCode::CREATED, Json(StatusResponse { status: "ok" })))
        .map_err(to_http_error)
}

async fn grant_role(
    State(state): State<AppState>,
    Json(request): Json<GrantRoleRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .node
        .grant_role(&request.address, request.role)
        .map(|_| Json(StatusResponse { status: "ok" }))
        .map_err(to_http_error)
}

async fn account_info(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Account>, ApiError> {
    state
        .node
        .get_account(&address)
        .map(Json)
        .map_err(to_http_error)
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<StatusResponse>, ApiError> {
    if tx.sender.is_empty() || tx.receiver.is_empty() {
        return Err(to_http_error(LedgerError::InvalidArgument(
            "sender and receiver required".into(),
        )));
    }
    // The core validator only gates the mint sender; the receiver-side role
    // restriction is a submission-surface rule.
    if tx.kind == TxType::Mint {
        let receiver = state.node.get_account(&tx.receiver).map_err(to_http_error)?;
        if receiver.role != Role::Admin {
            return Err(to_http_error(LedgerError::PermissionDenied(
                "mint receiver must hold the ADMIN role".into(),
            )));
        }
    }
    state
        .node
        .submit_transaction(tx)
        .map(|_| Json(StatusResponse { status: "ok" }))
        .map_err(to_http_error)
}

async fn query_transactions(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<TransactionQuery>, ApiError> {
    state
        .node
        .list_transactions(&request.requester_address)
        .map(Json)
        .map_err(to_http_error)
}

async fn audit_entry(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> Result<Json<AuditEntry>, ApiError> {
    state
        .node
        .audit_entry(index)
        .map(Json)
        .map_err(to_http_error)
}

async fn audit_entries(
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    state.node.audit_entries().map(Json).map_err(to_http_error)
}

async fn cluster_join(
    State(state): State<AppState>,
    Json(request): Json<ClusterJoinRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if request.node_id.is_empty() || request.raft_address.is_empty() {
        return Err(to_http_error(LedgerError::InvalidArgument(
            "node_id and raft_address required".into(),
        )));
    }
    state
        .node
        .cluster_join(&request.node_id, &request.raft_address)
        .map(|_| Json(StatusResponse { status: "ok" }))
        .map_err(to_http_error)
}

async fn cluster_remove(
    State(state): State<AppState>,
    Json(request): Json<ClusterRemoveRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if request.node_id.is_empty() {
        return Err(to_http_error(LedgerError::InvalidArgument(
            "node_id required".into(),
        )));
    }
    state
        .node
        .cluster_remove(&request.node_id)
        .map(|_| Json(StatusResponse { status: "ok" }))
        .map_err(to_http_error)
}

async fn cluster_status(State(state): State<AppState>) -> Json<ClusterStatus> {
    Json(state.node.cluster_status())
}

fn to_http_error(err: LedgerError) -> ApiError {
    let mut headers = HeaderMap::new();
    if let LedgerError::NotLeader {
        leader: Some(leader),
    } = &err
    {
        if let Ok(value) = HeaderValue::from_str(leader) {
            headers.insert(HeaderName::from_static("x-raft-leader"), value);
        }
    }
    let status = match &err {
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::AlreadyExists(_) => StatusCode::CONFLICT,
        LedgerError::InvalidArgument(_)
        | LedgerError::SignatureInvalid(_)
        | LedgerError::NonceMismatch { .. }
        | LedgerError::Frozen(_)
        | LedgerError::InsufficientBalance { .. }
        | LedgerError::Overflow(_) => StatusCode::BAD_REQUEST,
        LedgerError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        LedgerError::NotLeader { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        headers,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
