//! Screen controller contract.

use super::state_engine::StateEngine;
use tokio::sync::{broadcast, watch};

/// A per-screen controller built on a [`StateEngine`].
///
/// `handle_event` is the single entry point. Implementations match every
/// event variant; branches that do I/O go through [`StateEngine::launch`] so
/// the work lives in the engine's cancellation scope and failures become
/// effects.
pub trait Controller: Send + Sync {
    type State: Clone + Send + Sync + 'static;
    type Event: Send + 'static;
    type Effect: Clone + Send + 'static;

    fn engine(&self) -> &StateEngine<Self::State, Self::Effect>;

    fn handle_event(&self, event: Self::Event);

    fn current_state(&self) -> Self::State {
        self.engine().current_state()
    }

    fn state_stream(&self) -> watch::Receiver<Self::State> {
        self.engine().state_stream()
    }

    fn effect_stream(&self) -> broadcast::Receiver<Self::Effect> {
        self.engine().effect_stream()
    }

    fn dispose(&self) {
        self.engine().dispose();
    }
}
