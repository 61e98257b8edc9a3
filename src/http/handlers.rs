//! Public and operator endpoint handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chain::types::{ChainError, ConfirmationStatus};
use crate::entities::EntityKind;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::settlement::MonthId;
use crate::token::verifier::{VerificationReport, VerifyError};

#[derive(Debug, Deserialize)]
pub struct IssueQrRequest {
    #[serde(rename = "consumerId")]
    pub consumer_id: String,
    #[serde(rename = "monthId")]
    pub month_id: MonthId,
    /// Settlement transaction reference to embed in the token refs;
    /// defaults to the month's anchor transaction.
    #[serde(default)]
    pub tx: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueQrResponse {
    /// QR payload (base64 of the signed token).
    pub qr: String,
    pub redirect: String,
    pub exp: u64,
}

/// POST /settlement/qr — mint a verification token.
pub async fn issue_qr(
    State(state): State<AppState>,
    Json(req): Json<IssueQrRequest>,
) -> Result<Json<IssueQrResponse>, ApiError> {
    let issued = state
        .issuer
        .issue(&req.consumer_id, req.month_id, req.tx)
        .await?;
    metrics::record_request("settlement/qr", 200);
    Ok(Json(IssueQrResponse {
        qr: issued.encoded,
        redirect: issued.redirect,
        exp: issued.exp,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQrRequest {
    pub qr: String,
}

/// Verification outcome returned to the scanner.
///
/// Protocol rejections are 200s with `verified: false` so the client can
/// render the red certificate state; infrastructure failures surface as
/// 5xx with no verdict.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum VerifyQrResponse {
    Pass(VerificationReport),
    Reject {
        verified: bool,
        reason: &'static str,
    },
}

async fn verify_common(state: &AppState, encoded: &str) -> Result<Json<VerifyQrResponse>, ApiError> {
    match state.verifier.verify(encoded).await {
        Ok(report) => {
            metrics::record_request("settlement/verify-qr", 200);
            Ok(Json(VerifyQrResponse::Pass(report)))
        }
        Err(VerifyError::Malformed(e)) => Err(ApiError::bad_request(e.to_string())),
        Err(VerifyError::Chain(e)) => Err(ApiError::from(e)),
        Err(rejection) => Ok(Json(VerifyQrResponse::Reject {
            verified: false,
            reason: rejection.reason(),
        })),
    }
}

/// POST /settlement/verify-qr — validate a scanned token.
pub async fn verify_qr(
    State(state): State<AppState>,
    Json(req): Json<VerifyQrRequest>,
) -> Result<Json<VerifyQrResponse>, ApiError> {
    verify_common(&state, &req.qr).await
}

#[derive(Debug, Deserialize)]
pub struct VerifyQrParams {
    pub qr: String,
}

/// GET /verify?qr= — the scanned QR link resolves here.
pub async fn verify_qr_link(
    State(state): State<AppState>,
    Query(params): Query<VerifyQrParams>,
) -> Result<Json<VerifyQrResponse>, ApiError> {
    verify_common(&state, &params.qr).await
}

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "monthId")]
    pub month_id: MonthId,
    pub units: u64,
}

#[derive(Debug, Serialize)]
pub struct TxResponse {
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(rename = "blockNumber", skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

/// POST /project/mint — mint a month's units to the project address.
pub async fn mint_units(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let project = state
        .entities
        .expect_kind(&req.project_id, EntityKind::Project)?;
    if req.units == 0 {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "cannot mint zero units",
        ));
    }
    let relay = state.relay()?;
    let contracts = state.contracts()?;

    let tx_hash = relay
        .submit_mint(
            contracts.unit_registry,
            project.eth_address,
            req.month_id,
            req.units,
        )
        .await?;
    let status = relay
        .wait_for_confirmation(tx_hash, state.confirmation_timeout_secs())
        .await?;
    let block_number = confirmed_block(status)?;

    Ok(Json(TxResponse {
        tx_hash: tx_hash.to_string(),
        block_number: Some(block_number),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "consumerId")]
    pub consumer_id: String,
    #[serde(rename = "monthId")]
    pub month_id: MonthId,
    pub units: u64,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub seq: u32,
    #[serde(rename = "leafHash")]
    pub leaf_hash: String,
}

/// POST /project/consume — record a consumption leaf.
pub async fn record_consumption(
    State(state): State<AppState>,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    state
        .entities
        .expect_kind(&req.project_id, EntityKind::Project)?;
    state
        .entities
        .expect_kind(&req.consumer_id, EntityKind::Consumer)?;

    let leaf = state
        .settlements
        .record_consumption(&req.consumer_id, req.month_id, req.units)?;

    Ok(Json(ConsumeResponse {
        seq: leaf.seq,
        leaf_hash: format!("{}", leaf.hash()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct MonthRequest {
    #[serde(rename = "monthId")]
    pub month_id: MonthId,
}

#[derive(Debug, Serialize)]
pub struct BuildResponse {
    pub root: String,
    #[serde(rename = "leafCount")]
    pub leaf_count: usize,
}

/// POST /settlement/build — build the month's Merkle tree.
pub async fn build_settlement(
    State(state): State<AppState>,
    Json(req): Json<MonthRequest>,
) -> Result<Json<BuildResponse>, ApiError> {
    let (root, leaf_count) = state.settlements.build(req.month_id)?;
    Ok(Json(BuildResponse {
        root: format!("{root}"),
        leaf_count,
    }))
}

#[derive(Debug, Serialize)]
pub struct AnchorResponse {
    pub root: String,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
}

/// POST /settlement/anchor — commit the built root on-chain.
///
/// The anchor record (and the month seal) is only written after the
/// transaction reaches the configured confirmation depth.
pub async fn anchor_settlement(
    State(state): State<AppState>,
    Json(req): Json<MonthRequest>,
) -> Result<Json<AnchorResponse>, ApiError> {
    let month_id = req.month_id;
    let root = state
        .settlements
        .built_root(month_id)
        .ok_or(crate::settlement::SettlementError::NotBuilt(month_id))?;
    let relay = state.relay()?;
    let contracts = state.contracts()?;

    let tx_hash = relay
        .submit_anchor(contracts.settlement_registry, month_id, root)
        .await?;
    let status = relay
        .wait_for_confirmation(tx_hash, state.confirmation_timeout_secs())
        .await?;
    let block_number = confirmed_block(status)?;

    state
        .settlements
        .record_anchor(month_id, root, tx_hash.to_string())?;
    tracing::info!(month = month_id, root = %root, tx = %tx_hash, "Month anchored");

    Ok(Json(AnchorResponse {
        root: format!("{root}"),
        tx_hash: tx_hash.to_string(),
        block_number,
    }))
}

fn confirmed_block(status: ConfirmationStatus) -> Result<u64, ApiError> {
    match status {
        ConfirmationStatus::Confirmed { block_number } => Ok(block_number),
        ConfirmationStatus::Failed(reason) => Err(ChainError::Reverted(reason).into()),
        other => Err(ApiError::internal(format!(
            "unexpected confirmation state: {other:?}"
        ))),
    }
}

/// GET /health — liveness plus chain reachability.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let chain = match &state.chain {
        Some(client) => {
            if client.is_healthy().await {
                "ok"
            } else {
                "unreachable"
            }
        }
        None => "disabled",
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "chain": chain,
    }))
}
