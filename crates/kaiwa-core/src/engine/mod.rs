//! Unidirectional state-update engine shared by every screen controller.

mod controller;
mod state_engine;

pub use controller::Controller;
pub use state_engine::StateEngine;
