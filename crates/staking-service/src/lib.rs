#![deny(unsafe_code)]

pub mod config;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use staking_adapters::{
    stakeholder_for_public_key, AcceptAllVerifier, CustodyAccount, Ed25519IdentityVerifier,
    InMemoryProjectRegistry, InMemoryTokenCustody, ProofError,
};
use staking_core::{
    Amount, CustodyError, IdentityVerifier, JournalEntry, LedgerBuilder, LedgerSnapshot,
    MachineId, MachineState, ProjectRegistry, ReservationLedger, SlashReceipt, StakeError,
    StakeProof, StakeReceipt, StakeRequest, StakeholderId,
};
use thiserror::Error;
use tracing::{info, warn};

pub use crate::config::{IdentityMode, RegistryMode, ServiceConfig};

#[derive(Clone)]
pub struct ServiceState {
    pub ledger: Arc<ReservationLedger>,
    pub custody: Arc<InMemoryTokenCustody>,
    pub identity_mode: IdentityMode,
    pub slash_penalty: Amount,
    /// Whether the custody mint/approve/read routes are mounted.
    pub dev_custody: bool,
    auth: CallerAuth,
}

/// How reporter and admin identities are established for privileged routes.
#[derive(Clone)]
enum CallerAuth {
    /// The identity named in the request body is taken as is.
    Trusted,
    /// The identity is the key that signed the canonical action message.
    Signed(Arc<Ed25519IdentityVerifier>),
}

impl CallerAuth {
    fn resolve(
        &self,
        claimed: Option<StakeholderId>,
        proof: Option<&StakeProof>,
        role: &str,
        authenticate: impl FnOnce(&Ed25519IdentityVerifier, &StakeProof) -> Result<StakeholderId, ProofError>,
    ) -> Result<StakeholderId, ApiError> {
        let verifier = match self {
            CallerAuth::Trusted => {
                return claimed.ok_or_else(|| ApiError::bad_request(format!("{role} is required")))
            }
            CallerAuth::Signed(verifier) => verifier.as_ref(),
        };

        let proof = proof.ok_or_else(|| {
            ApiError::unauthenticated(format!("{role} must sign the request"))
        })?;
        let signer = authenticate(verifier, proof).map_err(|err| {
            warn!(role, reason = %err, "Signed request rejected");
            ApiError::unauthenticated(format!("{role} proof rejected: {err}"))
        })?;
        match claimed {
            Some(claimed) if claimed != signer => Err(ApiError::unauthenticated(format!(
                "{role} {claimed} does not match signing key {signer}"
            ))),
            _ => Ok(signer),
        }
    }
}

impl ServiceState {
    pub async fn bootstrap(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let custody = Arc::new(InMemoryTokenCustody::new());

        let (verifier, auth) = match config.identity.mode {
            IdentityMode::Ed25519 => {
                if !config.ledger.owner.starts_with("0x") {
                    warn!(owner = %config.ledger.owner, "Owner is not a key id; signed admin actions will be refused");
                }
                let verifier = Arc::new(Ed25519IdentityVerifier::new());
                let shared: Arc<dyn IdentityVerifier> = verifier.clone();
                (shared, CallerAuth::Signed(verifier))
            }
            IdentityMode::AcceptAll => {
                warn!("Identity checks disabled; request bodies name reporters and admins");
                let open: Arc<dyn IdentityVerifier> = Arc::new(AcceptAllVerifier);
                (open, CallerAuth::Trusted)
            }
        };
        let dev_custody =
            config.server.dev_custody || config.identity.mode == IdentityMode::AcceptAll;
        let registry: Arc<dyn ProjectRegistry> = match config.registry.mode {
            RegistryMode::Open => Arc::new(InMemoryProjectRegistry::open()),
            RegistryMode::AllowList => Arc::new(InMemoryProjectRegistry::allow_list(
                config.registry.machine_ids()?,
            )),
        };

        let ledger = LedgerBuilder::from_config(&config.ledger)?
            .custody(custody.clone())
            .verifier(verifier)
            .registry(registry)
            .build()?;

        info!(
            identity = ?config.identity.mode,
            registry = ?config.registry.mode,
            dev_custody,
            "Staking service state ready"
        );

        Ok(Self {
            ledger: Arc::new(ledger),
            custody,
            identity_mode: config.identity.mode,
            slash_penalty: config.ledger.slash_penalty,
            dev_custody,
            auth,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    let router = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/params", get(params))
        .route("/v1/stake", post(stake))
        .route("/v1/machines/:machine_id", get(get_machine))
        .route("/v1/machines/:machine_id/timeout", post(report_timeout))
        .route(
            "/v1/stakeholders/:stakeholder_id/reserve",
            get(get_reserve),
        )
        .route("/v1/reporters", post(grant_reporter))
        .route("/v1/reporters/:monitor/revoke", post(revoke_reporter))
        .route("/v1/journal", get(list_journal))
        .route("/v1/snapshot", get(snapshot));

    let router = if state.dev_custody {
        router
            .route("/v1/custody/:account", get(get_custody_account))
            .route("/v1/custody/:account/mint", post(mint))
            .route("/v1/custody/:account/approve", post(approve))
    } else {
        router
    };
    router.with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("ledger error: {0}")]
    Ledger(#[from] StakeError),
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
    #[error(transparent)]
    Ledger(#[from] StakeError),
    #[error(transparent)]
    Custody(#[from] CustodyError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHENTICATED",
            message: message.into(),
        }
    }
}

/// HTTP status for each ledger error code.
pub fn status_for(err: &StakeError) -> StatusCode {
    match err {
        StakeError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        StakeError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        StakeError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StakeError::AlreadyStaked(_) | StakeError::NotStaked(_) => StatusCode::CONFLICT,
        StakeError::TransferFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        StakeError::InsufficientStake { .. } | StakeError::Overflow => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StakeError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
        StakeError::Initialization(_) | StakeError::InvalidSnapshot(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Http {
                status,
                code,
                message,
            } => (status, code, message),
            ApiError::Ledger(err) => (status_for(&err), err.code(), err.to_string()),
            ApiError::Custody(err) => (StatusCode::BAD_REQUEST, "CUSTODY_ERROR", err.to_string()),
        };
        (
            status,
            Json(serde_json::json!({ "error": message, "code": code })),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    identity: IdentityMode,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "staking-service",
        identity: state.identity_mode,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParamsResponse {
    pub owner: StakeholderId,
    #[serde(with = "staking_core::amount")]
    pub min_stake: Amount,
    #[serde(with = "staking_core::amount")]
    pub slash_penalty: Amount,
    pub monitors: Vec<StakeholderId>,
}

async fn params(State(state): State<ServiceState>) -> Json<ParamsResponse> {
    Json(ParamsResponse {
        owner: state.ledger.owner().clone(),
        min_stake: state.ledger.min_stake(),
        slash_penalty: state.slash_penalty,
        monitors: state.ledger.monitors(),
    })
}

/// Stake payload. `caller` may be omitted when the public key is a hex
/// Ed25519 key; the caller is then derived from it.
#[derive(Debug, Deserialize)]
pub struct StakeBody {
    #[serde(default)]
    pub caller: Option<StakeholderId>,
    #[serde(flatten)]
    pub request: StakeRequest,
}

async fn stake(
    State(state): State<ServiceState>,
    Json(body): Json<StakeBody>,
) -> Result<Json<StakeReceipt>, ApiError> {
    let caller = body
        .caller
        .or_else(|| stakeholder_for_public_key(&body.request.proof.public_key))
        .ok_or_else(|| {
            ApiError::bad_request("caller is required unless public_key is a hex Ed25519 key")
        })?;
    Ok(Json(state.ledger.stake(&caller, body.request).await?))
}

/// Timeout report. With Ed25519 identities the reporter is the key that
/// signed `timeout_message`; a `reporter` field must then match it.
#[derive(Debug, Deserialize)]
pub struct TimeoutBody {
    #[serde(default)]
    pub reporter: Option<StakeholderId>,
    /// Overrides the configured slash policy for this report.
    #[serde(default, with = "staking_core::amount::option")]
    pub penalty: Option<Amount>,
    #[serde(flatten)]
    pub proof: Option<StakeProof>,
}

async fn report_timeout(
    State(state): State<ServiceState>,
    Path(machine_id): Path<String>,
    Json(body): Json<TimeoutBody>,
) -> Result<Json<SlashReceipt>, ApiError> {
    let machine_id = MachineId::new(machine_id)?;
    let reporter = state.auth.resolve(
        body.reporter,
        body.proof.as_ref(),
        "reporter",
        |verifier, proof| verifier.authenticate_timeout(proof, &machine_id, body.penalty),
    )?;
    let receipt = match body.penalty {
        Some(penalty) => {
            state
                .ledger
                .report_timeout_with_penalty(&reporter, &machine_id, penalty)
                .await?
        }
        None => state.ledger.report_timeout(&reporter, &machine_id).await?,
    };
    Ok(Json(receipt))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MachineView {
    pub machine_id: MachineId,
    #[serde(flatten)]
    pub state: MachineState,
    pub owner: Option<StakeholderId>,
    #[serde(with = "staking_core::amount")]
    pub outstanding_slash: Amount,
}

async fn get_machine(
    State(state): State<ServiceState>,
    Path(machine_id): Path<String>,
) -> Result<Json<MachineView>, ApiError> {
    let machine_id = MachineId::new(machine_id)?;
    let view = match state.ledger.machine(&machine_id).await {
        Some(record) => MachineView {
            state: record.state(),
            owner: Some(record.owner),
            outstanding_slash: record.outstanding_slash,
            machine_id,
        },
        None => MachineView {
            machine_id,
            state: MachineState::Unregistered,
            owner: None,
            outstanding_slash: 0,
        },
    };
    Ok(Json(view))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReserveView {
    pub stakeholder: StakeholderId,
    #[serde(with = "staking_core::amount")]
    pub reserved_balance: Amount,
}

async fn get_reserve(
    State(state): State<ServiceState>,
    Path(stakeholder_id): Path<String>,
) -> Result<Json<ReserveView>, ApiError> {
    let stakeholder = StakeholderId::new(stakeholder_id)?;
    Ok(Json(ReserveView {
        reserved_balance: state.ledger.reserved_balance(&stakeholder).await,
        stakeholder,
    }))
}

/// Roster change bodies. With Ed25519 identities the admin is the key that
/// signed `grant_reporter_message` or `revoke_reporter_message`.
#[derive(Debug, Deserialize)]
pub struct GrantBody {
    #[serde(default)]
    pub admin: Option<StakeholderId>,
    pub monitor: StakeholderId,
    #[serde(flatten)]
    pub proof: Option<StakeProof>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
    #[serde(default)]
    pub admin: Option<StakeholderId>,
    #[serde(flatten)]
    pub proof: Option<StakeProof>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RosterChange {
    pub monitor: StakeholderId,
    pub changed: bool,
    pub monitors: Vec<StakeholderId>,
}

async fn grant_reporter(
    State(state): State<ServiceState>,
    Json(body): Json<GrantBody>,
) -> Result<Json<RosterChange>, ApiError> {
    let admin = state.auth.resolve(
        body.admin,
        body.proof.as_ref(),
        "admin",
        |verifier, proof| verifier.authenticate_grant(proof, &body.monitor),
    )?;
    let changed = state
        .ledger
        .grant_reporter(&admin, body.monitor.clone())
        .await?;
    Ok(Json(RosterChange {
        monitor: body.monitor,
        changed,
        monitors: state.ledger.monitors(),
    }))
}

async fn revoke_reporter(
    State(state): State<ServiceState>,
    Path(monitor): Path<String>,
    Json(body): Json<RevokeBody>,
) -> Result<Json<RosterChange>, ApiError> {
    let monitor = StakeholderId::new(monitor)?;
    let admin = state.auth.resolve(
        body.admin,
        body.proof.as_ref(),
        "admin",
        |verifier, proof| verifier.authenticate_revoke(proof, &monitor),
    )?;
    let changed = state.ledger.revoke_reporter(&admin, &monitor).await?;
    Ok(Json(RosterChange {
        monitor,
        changed,
        monitors: state.ledger.monitors(),
    }))
}

#[derive(Debug, Deserialize)]
struct JournalQuery {
    machine_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JournalResponse {
    pub verified: bool,
    pub entries: Vec<JournalEntry>,
}

async fn list_journal(
    State(state): State<ServiceState>,
    Query(query): Query<JournalQuery>,
) -> Result<Json<JournalResponse>, ApiError> {
    let filter = query.machine_id.map(MachineId::new).transpose()?;
    let entries = state
        .ledger
        .journal()
        .await
        .into_iter()
        .filter(|entry| match &filter {
            Some(machine_id) => entry.event.machine_id() == Some(machine_id),
            None => true,
        })
        .collect();
    Ok(Json(JournalResponse {
        verified: state.ledger.verify_journal().await,
        entries,
    }))
}

async fn snapshot(State(state): State<ServiceState>) -> Json<LedgerSnapshot> {
    Json(state.ledger.snapshot().await)
}

#[derive(Debug, Deserialize)]
pub struct AmountBody {
    #[serde(with = "staking_core::amount")]
    pub amount: Amount,
}

async fn get_custody_account(
    State(state): State<ServiceState>,
    Path(account): Path<String>,
) -> Result<Json<CustodyAccount>, ApiError> {
    let account = StakeholderId::new(account)?;
    Ok(Json(state.custody.account(&account).await))
}

async fn mint(
    State(state): State<ServiceState>,
    Path(account): Path<String>,
    Json(body): Json<AmountBody>,
) -> Result<Json<CustodyAccount>, ApiError> {
    let account = StakeholderId::new(account)?;
    state.custody.mint(&account, body.amount).await?;
    Ok(Json(state.custody.account(&account).await))
}

async fn approve(
    State(state): State<ServiceState>,
    Path(account): Path<String>,
    Json(body): Json<AmountBody>,
) -> Result<Json<CustodyAccount>, ApiError> {
    let account = StakeholderId::new(account)?;
    state.custody.approve(&account, body.amount).await;
    Ok(Json(state.custody.account(&account).await))
}
