//! Admin endpoint handlers: status views and entity registration.

use alloy::primitives::Address;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::response::ApiError;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub entities: EntityCounts,
    pub settlement: SettlementCounts,
}

#[derive(Serialize)]
pub struct EntityCounts {
    pub producers: usize,
    pub projects: usize,
    pub consumers: usize,
}

#[derive(Serialize)]
pub struct SettlementCounts {
    pub months: usize,
    pub built: usize,
    pub anchored: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let (producers, projects, consumers) = state.entities.summary();
    let (months, built, anchored) = state.settlements.summary();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        entities: EntityCounts {
            producers,
            projects,
            consumers,
        },
        settlement: SettlementCounts {
            months,
            built,
            anchored,
        },
    })
}

#[derive(Serialize)]
pub struct SessionSummary {
    pub active: usize,
    pub consumed: usize,
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<SessionSummary> {
    let (active, consumed) = state.sessions.summary();
    Json(SessionSummary { active, consumed })
}

#[derive(Serialize)]
pub struct AnchorView {
    #[serde(rename = "monthId")]
    pub month_id: u32,
    pub root: String,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
}

pub async fn get_anchors(State(state): State<AppState>) -> Json<Vec<AnchorView>> {
    let anchors = state
        .settlements
        .anchored_months()
        .into_iter()
        .map(|(month_id, record)| AnchorView {
            month_id,
            root: format!("{}", record.root),
            tx_hash: record.tx_hash,
        })
        .collect();
    Json(anchors)
}

#[derive(Debug, Deserialize)]
pub struct AddEntityRequest {
    pub id: String,
    #[serde(rename = "ethAddress")]
    pub eth_address: Address,
    /// Required for projects only.
    #[serde(rename = "producerId")]
    pub producer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddEntityResponse {
    pub id: String,
    pub registered: bool,
}

pub async fn add_producer(
    State(state): State<AppState>,
    Json(req): Json<AddEntityRequest>,
) -> Result<Json<AddEntityResponse>, ApiError> {
    state.entities.add_producer(&req.id, req.eth_address)?;
    Ok(Json(AddEntityResponse {
        id: req.id,
        registered: true,
    }))
}

pub async fn add_project(
    State(state): State<AppState>,
    Json(req): Json<AddEntityRequest>,
) -> Result<Json<AddEntityResponse>, ApiError> {
    let producer_id = req
        .producer_id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("producerId is required for projects"))?;
    state
        .entities
        .add_project(&req.id, producer_id, req.eth_address)?;
    Ok(Json(AddEntityResponse {
        id: req.id,
        registered: true,
    }))
}

pub async fn add_consumer(
    State(state): State<AppState>,
    Json(req): Json<AddEntityRequest>,
) -> Result<Json<AddEntityResponse>, ApiError> {
    state.entities.add_consumer(&req.id, req.eth_address)?;
    Ok(Json(AddEntityResponse {
        id: req.id,
        registered: true,
    }))
}
