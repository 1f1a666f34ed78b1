//! Domain layer for kaiwa.
//!
//! Holds the chat data model, the error taxonomy, the collaborator traits the
//! application layer is written against, and the generic state engine that
//! screen controllers are built from.

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod secret;
pub mod session;

// Re-export common error type
pub use error::{KaiwaError, Result};
