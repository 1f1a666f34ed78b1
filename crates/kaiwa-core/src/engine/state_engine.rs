//! Generic unidirectional state container.
//!
//! `StateEngine` holds a replay-latest state stream (`watch`), a
//! fire-and-forget effect stream (`broadcast`) and a cancellation scope that
//! owns every asynchronous task started through it.

use crate::error::{KaiwaError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Effects buffered per subscriber before the slowest one starts lagging.
const EFFECT_CAPACITY: usize = 64;

/// A state container parameterized by its state `S` and effect `F` types.
///
/// Cloning yields another handle to the same engine; async work started by
/// the engine holds such a handle to publish results.
///
/// `launch` and `collect` spawn onto the current tokio runtime and must be
/// called from within one.
pub struct StateEngine<S, F> {
    inner: Arc<EngineInner<S, F>>,
}

struct EngineInner<S, F> {
    state: watch::Sender<S>,
    effects: broadcast::Sender<F>,
    scope: CancellationToken,
}

impl<S, F> Clone for StateEngine<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, F> StateEngine<S, F>
where
    S: Clone + Send + Sync + 'static,
    F: Clone + Send + 'static,
{
    pub fn new(initial: S) -> Self {
        let (state, _) = watch::channel(initial);
        let (effects, _) = broadcast::channel(EFFECT_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                state,
                effects,
                scope: CancellationToken::new(),
            }),
        }
    }

    /// The latest applied state.
    pub fn current_state(&self) -> S {
        self.inner.state.borrow().clone()
    }

    /// A replay-latest stream of states; new subscribers see the current one.
    pub fn state_stream(&self) -> watch::Receiver<S> {
        self.inner.state.subscribe()
    }

    /// A stream of effects emitted after this call.
    ///
    /// Effects emitted while nobody is subscribed are dropped.
    pub fn effect_stream(&self) -> broadcast::Receiver<F> {
        self.inner.effects.subscribe()
    }

    /// Applies `reduce` to the current state and publishes the result.
    ///
    /// Reductions are serialized, so concurrent tasks never lose each
    /// other's updates. `reduce` must not call back into the engine.
    pub fn set_state(&self, reduce: impl FnOnce(&S) -> S) {
        self.inner.state.send_modify(|state| *state = reduce(state));
    }

    /// Like [`set_state`](Self::set_state), but `reduce` may decline the
    /// change by returning `None`. The check and the update happen as one
    /// step, so two callers racing on the same precondition cannot both win.
    ///
    /// Returns whether a new state was published.
    pub fn try_set_state(&self, reduce: impl FnOnce(&S) -> Option<S>) -> bool {
        self.inner.state.send_if_modified(|state| match reduce(state) {
            Some(next) => {
                *state = next;
                true
            }
            None => false,
        })
    }

    /// Publishes one effect to the current subscribers.
    pub fn set_effect(&self, build: impl FnOnce() -> F) {
        if self.inner.effects.send(build()).is_err() {
            tracing::trace!("effect dropped: no subscribers");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.scope.is_cancelled()
    }

    /// Cancels every task started by this engine, including long-lived
    /// subscriptions. Calling it again has no effect.
    pub fn dispose(&self) {
        if !self.inner.scope.is_cancelled() {
            tracing::debug!("disposing state engine");
            self.inner.scope.cancel();
        }
    }

    /// Runs `work` inside the engine's cancellation scope.
    ///
    /// When `work` finishes, `cleanup` is applied to the state whether it
    /// succeeded, failed or panicked; a failure or panic is then turned into
    /// an effect by `on_error`. If the engine is disposed first, `work` is
    /// aborted and neither `cleanup` nor `on_error` run.
    pub fn launch<Fut, OnError, Cleanup>(
        &self,
        work: Fut,
        on_error: OnError,
        cleanup: Cleanup,
    ) -> JoinHandle<()>
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
        OnError: FnOnce(KaiwaError) -> F + Send + 'static,
        Cleanup: FnOnce(&S) -> S + Send + 'static,
    {
        let engine = self.clone();
        let scope = self.inner.scope.clone();
        tokio::spawn(async move {
            let mut task = tokio::spawn(work);
            let joined = tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    task.abort();
                    return;
                }
                joined = &mut task => joined,
            };

            let result = joined.unwrap_or_else(|join_err| {
                Err(KaiwaError::internal(format!("event task failed: {join_err}")))
            });

            engine.set_state(cleanup);
            if let Err(err) = result {
                tracing::warn!(error = %err, "event handling failed");
                engine.set_effect(move || on_error(err));
            }
        })
    }

    /// Folds every snapshot of `source` into the state until the returned
    /// token or the engine scope is cancelled.
    ///
    /// The current value of `source` is applied immediately.
    pub fn collect<T, Apply>(&self, source: watch::Receiver<T>, apply: Apply) -> CancellationToken
    where
        T: Clone + Send + Sync + 'static,
        Apply: Fn(&S, T) -> S + Send + Sync + 'static,
    {
        let subscription = self.inner.scope.child_token();
        tokio::spawn(follow(self.clone(), source, subscription.clone(), apply));
        subscription
    }

    /// Like [`collect`](Self::collect), for a stream that has to be opened
    /// asynchronously. The returned token is live before `open` resolves, so
    /// cancelling it right away also stops the pending open.
    ///
    /// If opening fails, the error is turned into an effect by `on_error`
    /// and the subscription ends.
    pub fn collect_from<T, Open, Apply, OnError>(
        &self,
        open: Open,
        apply: Apply,
        on_error: OnError,
    ) -> CancellationToken
    where
        T: Clone + Send + Sync + 'static,
        Open: Future<Output = Result<watch::Receiver<T>>> + Send + 'static,
        Apply: Fn(&S, T) -> S + Send + Sync + 'static,
        OnError: FnOnce(KaiwaError) -> F + Send + 'static,
    {
        let engine = self.clone();
        let subscription = self.inner.scope.child_token();
        let token = subscription.clone();
        tokio::spawn(async move {
            let opened = tokio::select! {
                biased;
                _ = subscription.cancelled() => return,
                opened = open => opened,
            };
            match opened {
                Ok(source) => follow(engine, source, subscription, apply).await,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to open subscription");
                    engine.set_effect(move || on_error(err));
                }
            }
        });
        token
    }
}

/// Applies the latest value of `source`, then every change, until
/// `subscription` is cancelled or the sender goes away.
async fn follow<S, F, T, Apply>(
    engine: StateEngine<S, F>,
    mut source: watch::Receiver<T>,
    subscription: CancellationToken,
    apply: Apply,
) where
    S: Clone + Send + Sync + 'static,
    F: Clone + Send + 'static,
    T: Clone,
    Apply: Fn(&S, T) -> S,
{
    loop {
        let latest = source.borrow_and_update().clone();
        engine.set_state(|state| apply(state, latest));
        tokio::select! {
            biased;
            _ = subscription.cancelled() => break,
            changed = source.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
