pub mod analyze;
pub mod health;
pub mod ops;

pub use analyze::*;
pub use health::*;
pub use ops::*;
