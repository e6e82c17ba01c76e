//! sdtrainer CLI Library
//!
//! Argument parsing, command implementations, and output formatting for the
//! `sdtrainer` binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use error::CliError;
