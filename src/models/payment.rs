use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ethers::types::{Address, Log, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Pricing configuration the seller quotes from. Loaded once at startup;
/// the amount is already validated as an integer in smallest token units.
#[derive(Debug, Clone)]
pub struct PriceSpec {
    pub pay_to: Address,
    pub amount: U256,
    pub token: Address,
    pub currency: String,
    pub network: String,
    pub invoice_ttl: Duration,
}

/// A per-request payment demand. Recomputed for every unpaid request and
/// discarded with the response; nothing persists it.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub pay_to: Address,
    pub amount: U256,
    pub token: Address,
    pub currency: String,
    pub network: String,
    pub valid_before: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeOffer {
    pub network: String,
    pub currency: String,
    pub amount: String,
    pub to: String,
    pub token: String,
}

/// Wire body of the 402 response. Carries both the `schemes` array and
/// flattened top-level fields so simple callers can skip scheme selection.
/// Amounts travel as decimal strings to avoid any float precision loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentChallenge {
    pub error: String,
    pub schemes: Vec<SchemeOffer>,
    pub amount: String,
    pub pay_to: String,
    pub currency: String,
    pub token: String,
}

impl PaymentChallenge {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        let pay_to = format!("{:?}", invoice.pay_to);
        let token = format!("{:?}", invoice.token);
        let amount = invoice.amount.to_string();

        Self {
            error: "Payment Required".to_string(),
            schemes: vec![SchemeOffer {
                network: invoice.network.clone(),
                currency: invoice.currency.clone(),
                amount: amount.clone(),
                to: pay_to.clone(),
                token: token.clone(),
            }],
            amount,
            pay_to,
            currency: invoice.currency.clone(),
            token,
        }
    }

    /// Reconstruct the invoice a challenge describes, as seen from the buyer
    /// side. `validity` bounds the buyer's own authorization window; the
    /// challenge wire format carries no expiry of its own.
    pub fn to_invoice(&self, validity: Duration) -> Result<Invoice> {
        let pay_to = Address::from_str(&self.pay_to)
            .with_context(|| format!("invalid pay_to address in challenge: {}", self.pay_to))?;
        let token = Address::from_str(&self.token)
            .with_context(|| format!("invalid token address in challenge: {}", self.token))?;
        let amount = U256::from_dec_str(&self.amount)
            .with_context(|| format!("invalid amount in challenge: {}", self.amount))?;
        let network = self
            .schemes
            .first()
            .map(|s| s.network.clone())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Invoice {
            pay_to,
            amount,
            token,
            currency: self.currency.clone(),
            network,
            valid_before: Utc::now() + chrono::Duration::from_std(validity)?,
        })
    }
}

/// Terminal classification of one proof against one invoice. Callers must
/// distinguish retryable failure (`RpcFailure`) from definitive rejection;
/// a boolean would lose that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Receipt not yet observable. Non-terminal inside the polling budget.
    Pending,
    /// Qualifying transfers found, summed value covers the invoice.
    Confirmed { paid: U256 },
    /// Qualifying transfers found but the summed value falls short.
    InsufficientAmount { paid: U256, required: U256 },
    /// No log matched the expected token contract and recipient at all.
    WrongRecipientOrToken,
    /// Every polling attempt failed at the transport level.
    RpcFailure { detail: String },
    /// Receipt never appeared within the attempt budget.
    NotFound { attempts: u32 },
}

impl VerificationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Machine-readable reason surfaced on denial responses and the event
    /// log. Never generic: each variant names what went wrong.
    pub fn reason(&self) -> String {
        match self {
            Self::Pending => "verification pending".to_string(),
            Self::Confirmed { paid } => format!("payment confirmed: {} units", paid),
            Self::InsufficientAmount { paid, required } => {
                format!("insufficient payment: {} < {}", paid, required)
            }
            Self::WrongRecipientOrToken => {
                "no qualifying transfer to the expected recipient and token".to_string()
            }
            Self::RpcFailure { detail } => format!("chain rpc unavailable: {}", detail),
            Self::NotFound { attempts } => {
                format!("transaction receipt not found after {} attempts", attempts)
            }
        }
    }
}

/// An ERC-20 `Transfer(address,address,uint256)` decoded from a receipt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl TransferEvent {
    /// Canonical `Transfer(address,address,uint256)` topic.
    pub fn signature_topic() -> H256 {
        H256::from(keccak256("Transfer(address,address,uint256)"))
    }

    /// Decode a receipt log into a transfer. Returns `None` for anything
    /// that is not a well-formed indexed ERC-20 transfer: wrong signature
    /// topic, fewer than three topics, or a value field that is not a
    /// single 32-byte word.
    pub fn decode(log: &Log) -> Option<Self> {
        if log.topics.first() != Some(&Self::signature_topic()) {
            return None;
        }
        if log.topics.len() < 3 {
            return None;
        }
        if log.data.len() != 32 {
            return None;
        }

        Some(Self {
            contract: log.address,
            from: Address::from(log.topics[1]),
            to: Address::from(log.topics[2]),
            value: U256::from_big_endian(&log.data),
        })
    }

    /// A transfer pays an invoice only when the emitting contract is the
    /// invoiced token and the recipient topic matches the invoiced payee.
    pub fn pays(&self, invoice: &Invoice) -> bool {
        self.contract == invoice.token && self.to == invoice.pay_to
    }
}
