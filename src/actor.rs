//! Actor loop that owns a store's reducer and serialises dispatches.
//!
//! The actor runs as a task on the store's runtime and processes messages
//! from an `mpsc` channel one at a time. It exclusively owns the reducer and
//! the `watch::Sender` through which state is published, so it is the only
//! writer of state and commits happen in a single total order. A dispatch
//! is fully reduced, committed and notified before the next message is
//! read, which means a second dispatch can never commit while a
//! notification round is in progress.
//!
//! Panics from the reducer or from a listener are caught and reported to the
//! dispatching caller; neither takes the actor down.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::error::{ContractViolation, DispatchError};
use crate::listener::ListenerId;
use crate::reducer::Reducer;
use crate::registry::{self, Entry, SharedRegistry};

/// Process-unique identity of a store, used to detect re-entrant dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoreId(u64);

impl StoreId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

tokio::task_local! {
    /// Set for the lifetime of each actor task. Listener futures are polled
    /// inside the actor task, so this tells `dispatch` whether it is being
    /// called from a listener of the store it targets.
    static NOTIFYING: StoreId;
}

/// Id of the store whose actor task is running the caller, if any.
pub(crate) fn current_actor() -> Option<StoreId> {
    NOTIFYING.try_with(|id| *id).ok()
}

/// Result type sent back through the `Dispatch` reply channel.
pub(crate) type DispatchResult<S, E> = Result<Arc<S>, DispatchError<E>>;

/// Messages sent from [`Store`](crate::Store) handles to the actor loop.
pub(crate) enum StoreMessage<S, A, E: std::error::Error + Send + Sync + 'static> {
    /// Reduce, commit, and notify for one action.
    Dispatch {
        /// The action to fold into the state.
        action: A,
        /// Registry watermark taken when the dispatch was issued. Only
        /// registrations below it are notified.
        watermark: ListenerId,
        /// Channel to send back the committed state or an error.
        reply: oneshot::Sender<DispatchResult<S, E>>,
    },
}

/// Everything the actor task owns.
pub(crate) struct ActorParts<S, A, R: Reducer<S, A>> {
    pub id: StoreId,
    pub name: Arc<str>,
    pub reducer: R,
    pub state: watch::Sender<Arc<S>>,
    pub registry: SharedRegistry,
    pub rx: mpsc::Receiver<StoreMessage<S, A, R::Error>>,
    /// Fired once the task is running on its runtime.
    pub ready: oneshot::Sender<()>,
}

/// Runs the store actor loop.
///
/// The loop exits when the channel closes, i.e. when every strong
/// [`Store`](crate::Store) handle has been dropped. On exit the reducer and
/// the state sender are dropped.
pub(crate) async fn run_actor<S, A, R>(parts: ActorParts<S, A, R>)
where
    S: Send + Sync + 'static,
    A: Send + 'static,
    R: Reducer<S, A>,
{
    let ActorParts {
        id,
        name,
        reducer,
        state,
        registry,
        mut rx,
        ready,
    } = parts;

    // If the builder stopped waiting there is nobody left to serve.
    if ready.send(()).is_err() {
        return;
    }
    tracing::debug!(store = %name, "store actor started");

    NOTIFYING
        .scope(id, async {
            let mut seq: u64 = 0;
            while let Some(msg) = rx.recv().await {
                match msg {
                    StoreMessage::Dispatch {
                        action,
                        watermark,
                        reply,
                    } => {
                        seq += 1;
                        let span = tracing::debug_span!("dispatch", store = %name, seq);
                        let result = dispatch(&reducer, &state, &registry, action, watermark)
                            .instrument(span)
                            .await;
                        // If the receiver was dropped, the caller no longer
                        // cares about the result. The commit stands anyway.
                        let _ = reply.send(result);
                    }
                }
            }
        })
        .await;

    tracing::debug!(store = %name, "store actor stopped");
}

/// Process one action: reduce, commit, snapshot listeners, notify.
async fn dispatch<S, A, R>(
    reducer: &R,
    state: &watch::Sender<Arc<S>>,
    registry: &SharedRegistry,
    action: A,
    watermark: ListenerId,
) -> DispatchResult<S, R::Error>
where
    S: Send + Sync + 'static,
    R: Reducer<S, A>,
{
    let next = reduce(reducer, state, action)?;

    // Commit. From here on every reader sees `next`.
    state.send_replace(Arc::clone(&next));
    tracing::debug!("state committed");

    let listeners = registry::lock(registry).snapshot(watermark);
    notify::<R::Error>(listeners).await?;

    Ok(next)
}

/// Run the reducer against the current state without committing.
///
/// A panicking reducer is caught and reported as a contract violation so
/// the actor survives it.
fn reduce<S, A, R>(
    reducer: &R,
    state: &watch::Sender<Arc<S>>,
    action: A,
) -> DispatchResult<S, R::Error>
where
    R: Reducer<S, A>,
{
    let current = Arc::clone(&state.borrow());

    match panic::catch_unwind(AssertUnwindSafe(|| reducer.reduce(&current, action))) {
        Ok(Ok(next)) => Ok(Arc::new(next)),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "reducer rejected action, state unchanged");
            Err(DispatchError::Reducer(e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(panic = %message, "reducer panicked, state unchanged");
            Err(ContractViolation::ReducerPanicked(message).into())
        }
    }
}

/// Notify each listener in order, stopping at the first failure or panic.
async fn notify<E>(listeners: Vec<Entry>) -> Result<(), DispatchError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    for (id, listener) in listeners {
        // `notify()` itself may run user code before returning its future.
        let outcome = AssertUnwindSafe(async { listener.notify().await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                tracing::warn!(
                    listener = %id,
                    error = %source,
                    "listener failed, skipping the rest of this round"
                );
                return Err(DispatchError::Listener {
                    listener: id,
                    source,
                });
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(
                    listener = %id,
                    panic = %message,
                    "listener panicked, skipping the rest of this round"
                );
                return Err(ContractViolation::ListenerPanicked {
                    listener: id,
                    message,
                }
                .into());
            }
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
