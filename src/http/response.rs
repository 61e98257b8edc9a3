//! Uniform JSON error responses.
//!
//! Every subsystem error converts into an [`ApiError`] here, so status
//! mapping lives in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::chain::types::ChainError;
use crate::entities::RegistryError;
use crate::settlement::SettlementError;
use crate::token::issuer::IssueError;

/// An error ready to leave the gateway.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = match &e {
            RegistryError::Duplicate(_) => StatusCode::CONFLICT,
            RegistryError::Unknown(_) => StatusCode::NOT_FOUND,
            RegistryError::WrongKind { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, e.to_string())
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        let status = match &e {
            SettlementError::EmptyBatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SettlementError::NotBuilt(_) => StatusCode::CONFLICT,
            SettlementError::MonthSealed(_) => StatusCode::CONFLICT,
            SettlementError::ZeroUnits => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, e.to_string())
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        let status = match &e {
            ChainError::NotAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChainError::ConfirmationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ChainError::GasPriceTooHigh { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.to_string())
    }
}

impl From<IssueError> for ApiError {
    fn from(e: IssueError) -> Self {
        let status = match &e {
            IssueError::UnknownConsumer(_) => StatusCode::NOT_FOUND,
            IssueError::UnknownMonth(_) => StatusCode::NOT_FOUND,
            IssueError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IssueError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}
