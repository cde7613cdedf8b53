//! REST API handlers for wallet operations

use crate::api::websocket::WsBroadcaster;
use crate::core::types::amount_serde;
use crate::core::{Address, Amount, Operation, OperationId, OperationKind};
use crate::multisig::{
    ConfirmReceipt, MultiSigEngine, PendingOperation, PendingStatus, RecordedEvent,
    SubmitReceipt, WalletError,
};
use crate::storage::Storage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub wallet: Arc<RwLock<MultiSigEngine>>,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

impl ApiState {
    /// Persist the wallet and publish events recorded since `from_seq`
    ///
    /// Subscribers see the events even when the save fails, since the
    /// in-memory wallet has already changed. The caller gets a 500 so it
    /// knows the change is not durable.
    fn commit(
        &self,
        wallet: &MultiSigEngine,
        from_seq: u64,
    ) -> Result<(), (StatusCode, Json<ApiError>)> {
        let saved = self.storage.save(&wallet.snapshot());
        self.ws_broadcaster
            .broadcast_all(wallet.events_since(from_seq));

        saved.map_err(|e| {
            log::error!("Failed to save wallet: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: format!("Wallet changed but was not persisted: {}", e),
                }),
            )
        })
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct WalletInfo {
    pub label: Option<String>,
    pub owners: Vec<Address>,
    pub required: usize,
    pub description: String,
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    #[serde(with = "amount_serde")]
    pub daily_limit: Amount,
    #[serde(with = "amount_serde")]
    pub spent_today: Amount,
    #[serde(with = "amount_serde")]
    pub remaining_today: Amount,
    pub pending_operations: usize,
    pub next_event_seq: u64,
    pub created_at: String,
}

impl From<&MultiSigEngine> for WalletInfo {
    fn from(wallet: &MultiSigEngine) -> Self {
        Self {
            label: wallet.label().map(str::to_string),
            owners: wallet.owners().to_vec(),
            required: wallet.required(),
            description: wallet.registry().description(),
            balance: wallet.balance(),
            daily_limit: wallet.daily_limit(),
            spent_today: wallet.spent_today(),
            remaining_today: wallet.remaining_today(),
            pending_operations: wallet.pending_operations().len(),
            next_event_seq: wallet.next_event_seq(),
            created_at: wallet.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OwnerStatus {
    pub address: Address,
    pub is_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(with = "amount_serde")]
    pub balance: Amount,
}

/// Pending operation as seen by current owners
#[derive(Debug, Serialize)]
pub struct OperationInfo {
    pub id: OperationId,
    pub kind: OperationKind,
    pub operation: Operation,
    pub description: String,
    pub proposer: Address,
    pub confirmed_by: Vec<Address>,
    pub confirmations: usize,
    pub required: usize,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationInfo {
    fn new(pending: &PendingOperation, wallet: &MultiSigEngine) -> Self {
        let registry = wallet.registry();
        Self {
            id: pending.id,
            kind: pending.operation.kind(),
            operation: pending.operation.clone(),
            description: pending.operation.to_string(),
            proposer: pending.proposer,
            confirmed_by: pending.confirmers(registry).into_iter().copied().collect(),
            confirmations: pending.tally(registry),
            required: wallet.required(),
            status: pending.status(registry),
            created_at: pending.created_at,
            updated_at: pending.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmationStatus {
    pub operation: OperationId,
    pub owner: Address,
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn bad_request(error: String) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error }))
}

/// Map an engine rejection to a status code
fn wallet_error(err: WalletError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        WalletError::UnknownOwner(_) => StatusCode::FORBIDDEN,
        WalletError::NoSuchOperation(_) => StatusCode::NOT_FOUND,
        WalletError::ReentrantCall => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

fn parse_id(id: &str) -> Result<OperationId, (StatusCode, Json<ApiError>)> {
    id.parse()
        .map_err(|e| bad_request(format!("Invalid operation id: {}", e)))
}

fn parse_address(address: &str) -> Result<Address, (StatusCode, Json<ApiError>)> {
    address
        .parse()
        .map_err(|e| bad_request(format!("Invalid address: {}", e)))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub from: Address,
    #[serde(with = "amount_serde")]
    pub value: Amount,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub caller: Address,
    pub operation: Operation,
}

#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    pub caller: Address,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// First sequence number to return
    pub since: Option<u64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/wallet - Wallet status
pub async fn get_wallet_info(State(state): State<ApiState>) -> Json<WalletInfo> {
    let wallet = state.wallet.read().await;
    Json(WalletInfo::from(&*wallet))
}

/// GET /api/wallet/owners/{address} - Ownership check
pub async fn get_owner_status(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<OwnerStatus> {
    let address = parse_address(&address)?;
    let wallet = state.wallet.read().await;

    Ok(Json(OwnerStatus {
        address,
        is_owner: wallet.is_owner(&address),
    }))
}

/// POST /api/wallet/deposit - Credit value to the wallet
pub async fn deposit(
    State(state): State<ApiState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<BalanceResponse> {
    let mut wallet = state.wallet.write().await;
    let seq = wallet.next_event_seq();

    wallet.deposit(&req.from, req.value).map_err(wallet_error)?;
    state.commit(&wallet, seq)?;

    Ok(Json(BalanceResponse {
        balance: wallet.balance(),
    }))
}

/// GET /api/operations - Pending operations
pub async fn list_operations(State(state): State<ApiState>) -> Json<Vec<OperationInfo>> {
    let wallet = state.wallet.read().await;
    let operations = wallet
        .pending_operations()
        .into_iter()
        .map(|p| OperationInfo::new(p, &wallet))
        .collect();

    Json(operations)
}

/// GET /api/operations/{id} - Get a pending operation
pub async fn get_operation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<OperationInfo> {
    let id = parse_id(&id)?;
    let wallet = state.wallet.read().await;

    match wallet.operation(&id) {
        Some(pending) => Ok(Json(OperationInfo::new(pending, &wallet))),
        None => Err(wallet_error(WalletError::NoSuchOperation(id))),
    }
}

/// POST /api/operations - Submit an operation
pub async fn submit_operation(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<SubmitReceipt> {
    let mut wallet = state.wallet.write().await;
    let seq = wallet.next_event_seq();

    let receipt = wallet
        .submit(req.operation, &req.caller)
        .map_err(wallet_error)?;
    state.commit(&wallet, seq)?;

    Ok(Json(receipt))
}

/// POST /api/operations/{id}/confirm - Confirm a pending operation
pub async fn confirm_operation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<ConfirmReceipt> {
    let id = parse_id(&id)?;
    let mut wallet = state.wallet.write().await;
    let seq = wallet.next_event_seq();

    let receipt = wallet.confirm(&id, &req.caller).map_err(wallet_error)?;
    state.commit(&wallet, seq)?;

    Ok(Json(receipt))
}

/// POST /api/operations/{id}/revoke - Revoke a confirmation
pub async fn revoke_confirmation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<OperationInfo> {
    let id = parse_id(&id)?;
    let mut wallet = state.wallet.write().await;
    let seq = wallet.next_event_seq();

    wallet.revoke(&id, &req.caller).map_err(wallet_error)?;
    state.commit(&wallet, seq)?;

    match wallet.operation(&id) {
        Some(pending) => Ok(Json(OperationInfo::new(pending, &wallet))),
        None => Err(wallet_error(WalletError::NoSuchOperation(id))),
    }
}

/// GET /api/operations/{id}/confirmations/{owner} - Confirmation check
pub async fn get_confirmation(
    State(state): State<ApiState>,
    Path((id, owner)): Path<(String, String)>,
) -> ApiResult<ConfirmationStatus> {
    let id = parse_id(&id)?;
    let owner = parse_address(&owner)?;
    let wallet = state.wallet.read().await;

    Ok(Json(ConfirmationStatus {
        operation: id,
        owner,
        confirmed: wallet.has_confirmed(&id, &owner),
    }))
}

/// GET /api/events - Event journal
pub async fn get_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<RecordedEvent>> {
    let wallet = state.wallet.read().await;
    Json(wallet.events_since(query.since.unwrap_or(0)))
}
