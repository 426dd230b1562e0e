use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ethers::providers::ProviderError;
use serde_json::json;
use thiserror::Error;

use crate::models::{Invoice, PaymentChallenge};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Payment required")]
    PaymentRequired(Box<Invoice>),

    #[error("Payment rejected: {reason}")]
    PaymentRejected { reason: String },

    #[error("Invalid payment proof: {reason}")]
    InvalidProof { reason: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream provider error: {detail}")]
    Provider { detail: String },

    #[error("Chain RPC error: {0}")]
    Rpc(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::PaymentRequired(invoice) => {
                let challenge = PaymentChallenge::from_invoice(&invoice);
                (StatusCode::PAYMENT_REQUIRED, Json(challenge)).into_response()
            }
            GatewayError::PaymentRejected { reason } => {
                tracing::warn!("Payment rejected: {}", reason);
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({
                        "error": "Payment Invalid",
                        "reason": reason,
                    })),
                )
                    .into_response()
            }
            GatewayError::InvalidProof { reason } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid payment proof",
                    "reason": reason,
                })),
            )
                .into_response(),
            GatewayError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            GatewayError::Provider { detail } => {
                tracing::error!("Upstream provider failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Agent Processing Failed",
                        "details": detail,
                    })),
                )
                    .into_response()
            }
            GatewayError::Rpc(err) => {
                tracing::error!("Chain RPC failure: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Chain RPC unavailable" })),
                )
                    .into_response()
            }
            GatewayError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
