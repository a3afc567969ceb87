//! # Error Handling
//!
//! Crate-level error types for vaultflow using `thiserror`. The rotation
//! domain carries its own error enums next to the code that produces them:
//! [`crate::vault::SessionError`], [`crate::vault::IssuanceError`] and
//! [`crate::destinations::WriteError`].

pub mod types;

pub use types::{Error, Result};
