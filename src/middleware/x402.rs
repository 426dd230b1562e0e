use axum::{extract::Request, middleware::Next, response::Response};
use ethers::types::H256;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::models::EventKind;
use crate::services::{EventLog, InvoiceIssuer, ReplayGuard, VerificationEngine};

/// Header names probed for the payment proof, highest priority first.
pub const PROOF_HEADERS: [&str; 2] = ["x-payment-hash", "payment-hash"];

const REPLAY_REASON: &str = "payment proof already consumed";

/// The payment gate in front of the metered route. Stateless per caller:
/// every decision is a function of the request headers, the configured
/// price and the chain.
pub struct PaymentGateway {
    issuer: InvoiceIssuer,
    verifier: VerificationEngine,
    replay: ReplayGuard,
    events: Arc<EventLog>,
}

impl PaymentGateway {
    pub fn new(
        issuer: InvoiceIssuer,
        verifier: VerificationEngine,
        replay: ReplayGuard,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            issuer,
            verifier,
            replay,
            events,
        }
    }

    pub fn proof_header(request: &Request) -> Option<&str> {
        PROOF_HEADERS
            .iter()
            .find_map(|name| request.headers().get(*name).and_then(|h| h.to_str().ok()))
    }

    /// Decides whether the request may reach the handler. `Err` carries the
    /// full wire response (402 challenge, 400 malformed, 403 denial).
    ///
    /// Takes the path and proof as plain strings rather than the request so
    /// the future stays `Send` across the verification awaits.
    pub async fn admit(&self, path: &str, raw_proof: Option<&str>) -> Result<(), GatewayError> {
        let Some(raw_proof) = raw_proof else {
            let invoice = self.issuer.issue();
            tracing::info!(
                "No payment proof on {}, issuing challenge: {} {} to {:?}",
                path,
                invoice.amount,
                invoice.currency,
                invoice.pay_to
            );
            self.events
                .record(EventKind::ChallengeIssued, path, None, "challenge issued");
            return Err(GatewayError::PaymentRequired(Box::new(invoice)));
        };

        let tx_hash = H256::from_str(raw_proof.trim().trim_start_matches("0x")).map_err(|e| {
            self.events.record(
                EventKind::Rejected,
                path,
                None,
                format!("malformed proof: {}", e),
            );
            GatewayError::InvalidProof {
                reason: format!("not a transaction hash: {}", e),
            }
        })?;
        let canonical = format!("{:?}", tx_hash);

        // Replays are bounced before any RPC budget is spent.
        if self.replay.already_consumed(&canonical).await {
            self.events.record(
                EventKind::Rejected,
                path,
                Some(canonical.clone()),
                REPLAY_REASON,
            );
            return Err(GatewayError::PaymentRejected {
                reason: REPLAY_REASON.to_string(),
            });
        }

        let invoice = self.issuer.issue();
        let outcome = self.verifier.verify(tx_hash, &invoice).await;

        if !outcome.is_confirmed() {
            // Default deny: anything short of Confirmed is a rejection with
            // the outcome's own reason, never a generic one.
            let reason = outcome.reason();
            self.events.record(
                EventKind::Rejected,
                path,
                Some(canonical.clone()),
                reason.clone(),
            );
            return Err(GatewayError::PaymentRejected { reason });
        }

        // First consumer wins; losing the race is a replay like any other.
        if !self.replay.try_consume(&canonical).await {
            self.events.record(
                EventKind::Rejected,
                path,
                Some(canonical.clone()),
                REPLAY_REASON,
            );
            return Err(GatewayError::PaymentRejected {
                reason: REPLAY_REASON.to_string(),
            });
        }

        tracing::info!("Payment admitted on {}: {}", path, canonical);
        self.events
            .record(EventKind::Admitted, path, Some(canonical), outcome.reason());
        Ok(())
    }
}

// Axum middleware function
pub async fn payment_gate(
    gateway: Arc<PaymentGateway>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_string();
    let proof = PaymentGateway::proof_header(&request).map(str::to_string);
    gateway.admit(&path, proof.as_deref()).await?;
    Ok(next.run(request).await)
}
