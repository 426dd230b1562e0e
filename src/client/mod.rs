pub mod settlement;
pub mod wallet;

pub use settlement::{
    settle_invoice, AuthorizationSigner, SettlementClient, SettlementError, SettlementResult,
    TransferAuthorization,
};
pub use wallet::WalletClient;
