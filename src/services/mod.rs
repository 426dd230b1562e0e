pub mod analyst;
pub mod cache;
pub mod chain;
pub mod events;
pub mod invoice;
pub mod market;
pub mod replay;
pub mod verifier;

pub use analyst::AnalystService;
pub use cache::CacheService;
pub use chain::{ChainClient, HttpChainClient};
pub use events::EventLog;
pub use invoice::InvoiceIssuer;
pub use market::MarketService;
pub use replay::ReplayGuard;
pub use verifier::{RetryPolicy, VerificationEngine};
