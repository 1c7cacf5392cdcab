//! Crate-level error types for store construction and dispatch.

use crate::listener::{ListenerError, ListenerId};

/// Error returned when dispatching an action to a store fails.
///
/// Generic over `E`, the error type of the store's reducer. For plain
/// closure reducers this is [`std::convert::Infallible`].
///
/// Whether the new state was committed depends on the variant:
/// [`Reducer`](DispatchError::Reducer) never commits,
/// [`Listener`](DispatchError::Listener) always has, and for
/// [`ContractViolation`](DispatchError::ContractViolation) only
/// [`ListenerPanicked`](ContractViolation::ListenerPanicked) has.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError<E: std::error::Error + Send + Sync + 'static> {
    /// The reducer rejected the action.
    ///
    /// State is left at its prior value.
    #[error(transparent)]
    Reducer(E),

    /// A listener failed during notification.
    ///
    /// The new state was committed before notification began. Listeners
    /// ordered after the failing one were not notified for this dispatch.
    #[error("listener {listener} failed: {source}")]
    Listener {
        /// Registration that failed.
        listener: ListenerId,
        /// The error the listener returned.
        source: ListenerError,
    },

    /// The reducer or a listener broke the store's usage contract.
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),

    /// The store actor is no longer running.
    ///
    /// Every strong [`Store`](crate::Store) handle was dropped or the actor
    /// task was torn down, so no further actions can be processed.
    #[error("store is no longer running")]
    StoreClosed,
}

/// Misuse of the store detected at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The reducer panicked instead of returning a state.
    ///
    /// The panic is contained; state is unchanged and the store keeps
    /// accepting actions.
    #[error("reducer panicked: {0}")]
    ReducerPanicked(String),

    /// A listener panicked while being notified.
    ///
    /// Handled like a failing listener: the new state is already committed,
    /// later listeners are skipped for this round, and the store keeps
    /// accepting actions.
    #[error("listener {listener} panicked: {message}")]
    ListenerPanicked {
        /// Registration that panicked.
        listener: ListenerId,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// A listener awaited `dispatch` on the store that is notifying it.
    ///
    /// The store processes one dispatch at a time, so this would never
    /// complete. Spawn a task to dispatch follow-up actions instead.
    #[error("listener dispatched to the store that is notifying it")]
    ReentrantDispatch,
}

/// Error returned when a store cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// No runtime handle was configured and none is ambient.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The store actor exited before reporting that it was ready.
    #[error("store actor failed to start")]
    StartupFailed,
}

/// Error returned by [`CombinedReducer`](crate::CombinedReducer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombineError {
    /// The state handed to the reducer was not a JSON object.
    #[error("combined state must be a JSON object, found {found}")]
    NotAnObject {
        /// JSON kind that was found instead.
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal reducer error for testing `DispatchError<E>`.
    #[derive(Debug, thiserror::Error)]
    #[error("test reducer error")]
    struct TestReducerError;

    #[test]
    fn dispatch_error_reducer_displays_inner() {
        let err: DispatchError<TestReducerError> = DispatchError::Reducer(TestReducerError);
        assert_eq!(err.to_string(), "test reducer error");
    }

    #[test]
    fn dispatch_error_listener_names_registration() {
        let err: DispatchError<TestReducerError> = DispatchError::Listener {
            listener: ListenerId(7),
            source: "disk full".into(),
        };
        assert_eq!(err.to_string(), "listener #7 failed: disk full");
    }

    #[test]
    fn dispatch_error_from_contract_violation() {
        let err: DispatchError<TestReducerError> = ContractViolation::ReentrantDispatch.into();
        assert!(matches!(
            err,
            DispatchError::ContractViolation(ContractViolation::ReentrantDispatch)
        ));
        assert_eq!(
            err.to_string(),
            "contract violation: listener dispatched to the store that is notifying it"
        );
    }

    #[test]
    fn reducer_panicked_carries_message() {
        let err = ContractViolation::ReducerPanicked("index out of bounds".into());
        assert_eq!(err.to_string(), "reducer panicked: index out of bounds");
    }

    #[test]
    fn listener_panicked_names_registration() {
        let err = ContractViolation::ListenerPanicked {
            listener: ListenerId(3),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "listener #3 panicked: boom");
    }

    #[test]
    fn dispatch_error_store_closed_display() {
        let err: DispatchError<TestReducerError> = DispatchError::StoreClosed;
        assert_eq!(err.to_string(), "store is no longer running");
    }

    #[test]
    fn create_error_from_missing_runtime() {
        // Plain `#[test]`: no runtime is entered on this thread.
        let err = CreateError::from(
            tokio::runtime::Handle::try_current().expect_err("no runtime should be ambient"),
        );
        assert!(matches!(err, CreateError::NoRuntime(_)));
        assert!(err.to_string().starts_with("no tokio runtime available"));
    }

    #[test]
    fn combine_error_names_found_kind() {
        let err = CombineError::NotAnObject { found: "array" };
        assert_eq!(
            err.to_string(),
            "combined state must be a JSON object, found array"
        );
    }

    #[test]
    fn create_error_startup_failed_display() {
        assert_eq!(
            CreateError::StartupFailed.to_string(),
            "store actor failed to start"
        );
    }

    // Verify `Send + Sync` bounds are satisfied so errors can cross thread
    // boundaries, which is required for use with `tokio` channels.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<DispatchError<TestReducerError>>();
            assert_send_sync::<CreateError>();
            assert_send_sync::<ContractViolation>();
            assert_send_sync::<CombineError>();
        }
    };
}
