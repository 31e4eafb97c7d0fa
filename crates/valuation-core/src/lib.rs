pub mod config;
pub mod control;
pub mod error;
pub mod types;
pub mod valuation;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "sensitivity")]
pub mod sensitivity;

pub use config::EnginePolicy;
pub use error::EngineError;
pub use types::*;

/// Standard result type for all valuation-engine operations
pub type EngineResult<T> = Result<T, EngineError>;
