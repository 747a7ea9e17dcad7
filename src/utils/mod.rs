// Utility functions
pub mod date_range;
pub mod error;
pub mod pagination;
pub mod serde_helpers;
pub mod validation;

pub use error::*;
