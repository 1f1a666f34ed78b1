//! Application layer for kaiwa.
//!
//! The coordinator implements the chat use cases on top of the store and the
//! generation client; the controllers expose them per screen as state and
//! effect streams.

pub mod context;
pub mod controllers;
pub mod coordinator;

pub use context::AppContext;
pub use coordinator::ChatCoordinator;
