pub mod market;
pub mod payment;
pub mod response;

pub use market::*;
pub use payment::*;
pub use response::*;
