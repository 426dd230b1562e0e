use chrono::{Duration, Utc};

use crate::models::{Invoice, PriceSpec};

/// Quotes the payment terms for the metered endpoint. Invoices are
/// recomputed per request from the configured price spec and never stored;
/// verification re-derives everything it needs from that spec and the chain.
pub struct InvoiceIssuer {
    spec: PriceSpec,
}

impl InvoiceIssuer {
    pub fn new(spec: PriceSpec) -> Self {
        Self { spec }
    }

    pub fn issue(&self) -> Invoice {
        let ttl = Duration::from_std(self.spec.invoice_ttl)
            .unwrap_or_else(|_| Duration::seconds(600));
        Invoice {
            pay_to: self.spec.pay_to,
            amount: self.spec.amount,
            token: self.spec.token,
            currency: self.spec.currency.clone(),
            network: self.spec.network.clone(),
            valid_before: Utc::now() + ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};
    use std::time::Duration as StdDuration;

    fn spec() -> PriceSpec {
        PriceSpec {
            pay_to: Address::repeat_byte(0x5e),
            amount: U256::from(10_000u64),
            token: Address::repeat_byte(0xc0),
            currency: "USDC".to_string(),
            network: "cronos-testnet".to_string(),
            invoice_ttl: StdDuration::from_secs(600),
        }
    }

    #[test]
    fn issued_invoice_mirrors_the_price_spec() {
        let issuer = InvoiceIssuer::new(spec());
        let invoice = issuer.issue();

        assert_eq!(invoice.pay_to, Address::repeat_byte(0x5e));
        assert_eq!(invoice.amount, U256::from(10_000u64));
        assert_eq!(invoice.token, Address::repeat_byte(0xc0));
        assert_eq!(invoice.currency, "USDC");
        assert_eq!(invoice.network, "cronos-testnet");
    }

    #[test]
    fn validity_window_is_in_the_future() {
        let issuer = InvoiceIssuer::new(spec());
        let invoice = issuer.issue();

        let remaining = invoice.valid_before - Utc::now();
        assert!(remaining > Duration::seconds(590));
        assert!(remaining <= Duration::seconds(600));
    }
}
