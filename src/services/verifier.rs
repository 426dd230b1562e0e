use ethers::types::{TransactionReceipt, H256, U256};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Invoice, TransferEvent, VerificationOutcome};
use crate::services::ChainClient;

/// Receipt polling budget. The final attempt never sleeps, so worst-case
/// wall clock stays under `max_attempts * delay` plus RPC time.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(2000),
        }
    }
}

/// Decides whether a transaction hash settles an invoice by reading the
/// chain directly. Facilitator and caller claims are never trusted; only
/// receipt logs count.
pub struct VerificationEngine {
    chain: Arc<dyn ChainClient>,
    policy: RetryPolicy,
}

impl VerificationEngine {
    pub fn new(chain: Arc<dyn ChainClient>, policy: RetryPolicy) -> Self {
        Self { chain, policy }
    }

    /// Polls for the receipt and classifies it against the invoice.
    /// Infallible: transport trouble is absorbed into the outcome rather
    /// than surfaced as an error, so the gateway always has a closed
    /// classification to act on.
    pub async fn verify(&self, tx_hash: H256, invoice: &Invoice) -> VerificationOutcome {
        let mut last_rpc_error: Option<String> = None;
        let mut observed_absence = false;

        for attempt in 1..=self.policy.max_attempts {
            match self.chain.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    tracing::debug!(
                        "Receipt for {:?} found on attempt {}/{}",
                        tx_hash,
                        attempt,
                        self.policy.max_attempts
                    );
                    // Mined logs are immutable, classify once and stop.
                    return classify(&receipt, invoice);
                }
                Ok(None) => {
                    observed_absence = true;
                    tracing::debug!(
                        "Receipt for {:?} not yet available (attempt {}/{})",
                        tx_hash,
                        attempt,
                        self.policy.max_attempts
                    );
                }
                Err(e) => {
                    last_rpc_error = Some(e.to_string());
                    tracing::warn!(
                        "Receipt lookup for {:?} failed (attempt {}/{}): {}",
                        tx_hash,
                        attempt,
                        self.policy.max_attempts,
                        e
                    );
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        if observed_absence {
            VerificationOutcome::NotFound {
                attempts: self.policy.max_attempts,
            }
        } else {
            // Every attempt died in transport; the chain never answered, so
            // absence was not established.
            VerificationOutcome::RpcFailure {
                detail: last_rpc_error.unwrap_or_else(|| "no attempts made".to_string()),
            }
        }
    }
}

/// Classify a mined receipt against an invoice. All qualifying transfers in
/// the receipt are summed before comparing with the invoiced amount, so a
/// payment split across several Transfer logs in one transaction still
/// settles the invoice.
fn classify(receipt: &TransactionReceipt, invoice: &Invoice) -> VerificationOutcome {
    let mut paid = U256::zero();
    let mut qualifying = false;

    for log in &receipt.logs {
        if let Some(transfer) = TransferEvent::decode(log) {
            if transfer.pays(invoice) {
                qualifying = true;
                paid = paid.saturating_add(transfer.value);
            }
        }
    }

    if !qualifying {
        return VerificationOutcome::WrongRecipientOrToken;
    }

    if paid >= invoice.amount {
        VerificationOutcome::Confirmed { paid }
    } else {
        VerificationOutcome::InsufficientAmount {
            paid,
            required: invoice.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use ethers::providers::ProviderError;
    use ethers::types::{Address, Bytes, Log};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    enum Step {
        Receipt(TransactionReceipt),
        Missing,
        Fail(&'static str),
    }

    /// Replays a fixed sequence of receipt-lookup answers; once the script
    /// runs out it keeps answering "no receipt yet".
    struct ScriptedChain {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedChain {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainClient for ScriptedChain {
        async fn transaction_receipt(
            &self,
            _tx_hash: H256,
        ) -> Result<Option<TransactionReceipt>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Receipt(receipt)) => Ok(Some(receipt)),
                Some(Step::Missing) | None => Ok(None),
                Some(Step::Fail(msg)) => Err(ProviderError::CustomError(msg.to_string())),
            }
        }
    }

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn invoice() -> Invoice {
        Invoice {
            pay_to: addr(0xaa),
            amount: U256::from(10_000u64),
            token: addr(0xbb),
            currency: "USDC".to_string(),
            network: "cronos-testnet".to_string(),
            valid_before: Utc::now() + chrono::Duration::minutes(10),
        }
    }

    fn transfer_log(token: Address, from: Address, to: Address, value: u64) -> Log {
        let mut data = [0u8; 32];
        U256::from(value).to_big_endian(&mut data);
        Log {
            address: token,
            topics: vec![
                TransferEvent::signature_topic(),
                H256::from(from),
                H256::from(to),
            ],
            data: Bytes::from(data.to_vec()),
            ..Default::default()
        }
    }

    fn receipt_with(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            logs,
            ..Default::default()
        }
    }

    fn engine(chain: Arc<ScriptedChain>) -> VerificationEngine {
        VerificationEngine::new(
            chain,
            RetryPolicy {
                max_attempts: 5,
                delay: Duration::from_millis(2000),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn exact_payment_confirms() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(inv.token, addr(0x01), inv.pay_to, 10_000),
        ]))]));

        let outcome = engine(chain.clone()).verify(H256::zero(), &inv).await;

        assert_eq!(
            outcome,
            VerificationOutcome::Confirmed {
                paid: U256::from(10_000u64)
            }
        );
        assert_eq!(chain.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_unit_short_is_insufficient() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(inv.token, addr(0x01), inv.pay_to, 9_999),
        ]))]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert_eq!(
            outcome,
            VerificationOutcome::InsufficientAmount {
                paid: U256::from(9_999u64),
                required: U256::from(10_000u64),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overpayment_confirms_with_actual_amount() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(inv.token, addr(0x01), inv.pay_to, 15_000),
        ]))]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert_eq!(
            outcome,
            VerificationOutcome::Confirmed {
                paid: U256::from(15_000u64)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn split_transfers_in_one_receipt_sum() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(inv.token, addr(0x01), inv.pay_to, 6_000),
            transfer_log(inv.token, addr(0x02), inv.pay_to, 4_000),
        ]))]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert_eq!(
            outcome,
            VerificationOutcome::Confirmed {
                paid: U256::from(10_000u64)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_to_wrong_recipient_is_rejected() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(inv.token, addr(0x01), addr(0xdd), 10_000),
        ]))]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert_eq!(outcome, VerificationOutcome::WrongRecipientOrToken);
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_from_wrong_contract_is_rejected() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(addr(0xee), addr(0x01), inv.pay_to, 10_000),
        ]))]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert_eq!(outcome, VerificationOutcome::WrongRecipientOrToken);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transfer_logs_are_ignored() {
        let inv = invoice();
        let noise = Log {
            address: inv.token,
            topics: vec![H256::repeat_byte(0x77)],
            data: Bytes::from(vec![0u8; 64]),
            ..Default::default()
        };
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            noise,
            transfer_log(inv.token, addr(0x01), inv.pay_to, 10_000),
        ]))]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert!(outcome.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_receipt_exhausts_budget_without_trailing_sleep() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![]));
        let started = tokio::time::Instant::now();

        let outcome = engine(chain.clone()).verify(H256::zero(), &inv).await;

        assert_eq!(outcome, VerificationOutcome::NotFound { attempts: 5 });
        assert_eq!(chain.calls(), 5);
        // Four sleeps between five attempts, none after the last.
        assert!(started.elapsed() < Duration::from_millis(5 * 2000));
        assert!(started.elapsed() >= Duration::from_millis(4 * 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_on_first_attempt_never_sleeps() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
            transfer_log(inv.token, addr(0x01), inv.pay_to, 10_000),
        ]))]));
        let started = tokio::time::Instant::now();

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert!(outcome.is_confirmed());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn late_receipt_within_budget_confirms() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![
            Step::Missing,
            Step::Missing,
            Step::Receipt(receipt_with(vec![transfer_log(
                inv.token,
                addr(0x01),
                inv.pay_to,
                10_000,
            )])),
        ]));

        let outcome = engine(chain.clone()).verify(H256::zero(), &inv).await;

        assert!(outcome.is_confirmed());
        assert_eq!(chain.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_transport_failures_classify_as_rpc_failure() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![
            Step::Fail("connection refused"),
            Step::Fail("connection refused"),
            Step::Fail("connection refused"),
            Step::Fail("connection refused"),
            Step::Fail("timed out"),
        ]));

        let outcome = engine(chain.clone()).verify(H256::zero(), &inv).await;

        match outcome {
            VerificationOutcome::RpcFailure { detail } => {
                assert!(detail.contains("timed out"));
            }
            other => panic!("expected RpcFailure, got {:?}", other),
        }
        assert_eq!(chain.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn any_clean_absence_classifies_as_not_found() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![
            Step::Fail("connection refused"),
            Step::Missing,
            Step::Fail("connection refused"),
        ]));

        let outcome = engine(chain).verify(H256::zero(), &inv).await;

        assert_eq!(outcome, VerificationOutcome::NotFound { attempts: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fault_then_receipt_still_confirms() {
        let inv = invoice();
        let chain = Arc::new(ScriptedChain::new(vec![
            Step::Fail("gateway timeout"),
            Step::Receipt(receipt_with(vec![transfer_log(
                inv.token,
                addr(0x01),
                inv.pay_to,
                10_000,
            )])),
        ]));

        let outcome = engine(chain.clone()).verify(H256::zero(), &inv).await;

        assert!(outcome.is_confirmed());
        assert_eq!(chain.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_is_idempotent_for_mined_state() {
        let inv = invoice();
        let make_chain = || {
            Arc::new(ScriptedChain::new(vec![Step::Receipt(receipt_with(vec![
                transfer_log(inv.token, addr(0x01), inv.pay_to, 10_000),
            ]))]))
        };

        let first = engine(make_chain()).verify(H256::zero(), &inv).await;
        let second = engine(make_chain()).verify(H256::zero(), &inv).await;

        assert_eq!(first, second);
    }
}
