use base64::Engine;
use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, H256, U256};
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::models::Invoice;

/// Response-field aliases probed for the settlement transaction reference,
/// highest priority first.
pub const TX_REF_FIELDS: [&str; 3] = ["txHash", "hash", "transactionHash"];

/// How long a signed transfer authorization stays redeemable.
pub const AUTHORIZATION_VALIDITY: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Failed to build a signed transfer authorization: {0}")]
    Signing(String),

    #[error("Facilitator rejected settlement ({status}): {body}")]
    Facilitator { status: u16, body: String },

    #[error("Facilitator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Facilitator result carries no transaction reference under any of {fields:?}")]
    MissingTxReference { fields: [&'static str; 3] },

    #[error("Facilitator returned an invalid transaction reference: {0}")]
    InvalidTxReference(String),
}

impl SettlementError {
    /// Whether a retry with the same authorization could plausibly succeed.
    /// Signing and authorization-shaped failures cannot; transport faults
    /// and facilitator 5xx can.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Facilitator { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// EIP-3009 `TransferWithAuthorization` message plus its signature, exactly
/// as serialized into the settlement header. Numeric fields travel as
/// decimal strings, addresses and the nonce as 0x-prefixed hex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: String,
    pub to: String,
    pub value: String,
    pub token: String,
    pub valid_after: String,
    pub valid_before: String,
    pub nonce: String,
    pub signature: String,
}

/// What the facilitator is being asked to settle; mirrors the invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequirements {
    pub pay_to: String,
    pub description: String,
    pub max_amount_required: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementResult {
    pub tx_hash: H256,
}

pub fn requirements_for(invoice: &Invoice, description: &str) -> SettlementRequirements {
    SettlementRequirements {
        pay_to: format!("{:?}", invoice.pay_to),
        description: description.to_string(),
        max_amount_required: invoice.amount.to_string(),
        token: format!("{:?}", invoice.token),
    }
}

/// Builds and signs EIP-712 typed data in the EIP-3009 shape. The token
/// contract is the verifying contract; name and version must match what the
/// token itself reports or the facilitator's submission will revert.
pub struct AuthorizationSigner {
    pub domain_name: String,
    pub domain_version: String,
    pub chain_id: u64,
}

impl AuthorizationSigner {
    pub async fn build(
        &self,
        wallet: &LocalWallet,
        invoice: &Invoice,
        validity: Duration,
    ) -> Result<TransferAuthorization, SettlementError> {
        let from = wallet.address();
        let valid_after = U256::zero();
        let valid_before = U256::from(Utc::now().timestamp() as u64 + validity.as_secs());

        let mut nonce_bytes = [0u8; 32];
        thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = H256::from(nonce_bytes);

        let typed = self.typed_data(from, invoice, valid_after, valid_before, nonce)?;
        let signature = wallet
            .sign_typed_data(&typed)
            .await
            .map_err(|e| SettlementError::Signing(e.to_string()))?;

        Ok(TransferAuthorization {
            from: format!("{:?}", from),
            to: format!("{:?}", invoice.pay_to),
            value: invoice.amount.to_string(),
            token: format!("{:?}", invoice.token),
            valid_after: valid_after.to_string(),
            valid_before: valid_before.to_string(),
            nonce: format!("{:?}", nonce),
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        })
    }

    fn typed_data(
        &self,
        from: Address,
        invoice: &Invoice,
        valid_after: U256,
        valid_before: U256,
        nonce: H256,
    ) -> Result<TypedData, SettlementError> {
        let payload = json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"},
                    {"name": "verifyingContract", "type": "address"},
                ],
                "TransferWithAuthorization": [
                    {"name": "from", "type": "address"},
                    {"name": "to", "type": "address"},
                    {"name": "value", "type": "uint256"},
                    {"name": "validAfter", "type": "uint256"},
                    {"name": "validBefore", "type": "uint256"},
                    {"name": "nonce", "type": "bytes32"},
                ],
            },
            "primaryType": "TransferWithAuthorization",
            "domain": {
                "name": self.domain_name,
                "version": self.domain_version,
                "chainId": self.chain_id,
                "verifyingContract": format!("{:?}", invoice.token),
            },
            "message": {
                "from": format!("{:?}", from),
                "to": format!("{:?}", invoice.pay_to),
                "value": invoice.amount.to_string(),
                "validAfter": valid_after.to_string(),
                "validBefore": valid_before.to_string(),
                "nonce": format!("{:?}", nonce),
            },
        });

        serde_json::from_value(payload).map_err(|e| SettlementError::Signing(e.to_string()))
    }
}

/// Thin HTTP client for the facilitator's settle endpoint.
pub struct SettlementClient {
    http: reqwest::Client,
    base_url: String,
}

impl SettlementClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submits the signed authorization and returns the transaction
    /// reference the facilitator reports for the settlement.
    pub async fn settle(
        &self,
        authorization: &TransferAuthorization,
        requirements: &SettlementRequirements,
    ) -> Result<SettlementResult, SettlementError> {
        let header = encode_header(authorization)?;
        let body = json!({
            "header": header,
            "requirements": requirements,
        });

        let response = self
            .http
            .post(format!("{}/settle", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::Facilitator {
                status: status.as_u16(),
                body,
            });
        }

        let result: serde_json::Value = response.json().await?;
        extract_tx_hash(&result)
    }
}

/// Settle one invoice end to end: sign the authorization, mirror the
/// invoice into requirements, submit both. Each step fails independently
/// with its own `SettlementError` variant.
pub async fn settle_invoice(
    signer: &AuthorizationSigner,
    wallet: &LocalWallet,
    facilitator: &SettlementClient,
    invoice: &Invoice,
    description: &str,
) -> Result<SettlementResult, SettlementError> {
    let authorization = signer
        .build(wallet, invoice, AUTHORIZATION_VALIDITY)
        .await?;
    let requirements = requirements_for(invoice, description);
    facilitator.settle(&authorization, &requirements).await
}

fn encode_header(authorization: &TransferAuthorization) -> Result<String, SettlementError> {
    let json = serde_json::to_string(authorization)
        .map_err(|e| SettlementError::Signing(format!("serializing authorization: {}", e)))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Probes the facilitator reply for the transaction reference, taking the
/// first alias that is present and non-empty.
fn extract_tx_hash(result: &serde_json::Value) -> Result<SettlementResult, SettlementError> {
    for field in TX_REF_FIELDS {
        if let Some(raw) = result.get(field).and_then(|v| v.as_str()) {
            if raw.is_empty() {
                continue;
            }
            let tx_hash = H256::from_str(raw.trim_start_matches("0x"))
                .map_err(|_| SettlementError::InvalidTxReference(raw.to_string()))?;
            return Ok(SettlementResult { tx_hash });
        }
    }
    Err(SettlementError::MissingTxReference {
        fields: TX_REF_FIELDS,
    })
}
