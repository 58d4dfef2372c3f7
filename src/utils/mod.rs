//!
//! Utility module for the wallet sync crate.
//!
//! Re-exports formatting helpers used by the engine adapters and the harness.
/// Utility functions for formatting and display
pub mod index;

pub use index::format_token_amount;
