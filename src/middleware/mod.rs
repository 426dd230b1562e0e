pub mod x402;

pub use x402::{payment_gate, PaymentGateway, PROOF_HEADERS};
