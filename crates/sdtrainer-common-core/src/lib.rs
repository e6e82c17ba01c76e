//! sdtrainer common core types and utilities.

pub mod error;
pub mod id;
pub mod timestamp;

pub use error::{Error, Result};
pub use id::random_string;
pub use timestamp::Timestamp;
