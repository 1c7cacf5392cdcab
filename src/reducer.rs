//! Reducer trait and closure adapters.

use std::convert::Infallible;
use std::marker::PhantomData;

/// Computes the next state from the current state and an action.
///
/// # Contract
///
/// - [`reduce`](Reducer::reduce) must be pure: deterministic, no I/O, no side
///   effects. The store makes no guarantee about a reducer that is not.
/// - It must not suspend. The store commits its return value immediately.
/// - It borrows the current state and returns a wholly new value; the store
///   never mutates state in place.
/// - Actions the reducer does not recognise should return the state
///   unchanged.
///
/// Any `Fn(&S, A) -> S` closure is an infallible reducer. Wrap closures that
/// can reject an action with [`try_reducer`].
pub trait Reducer<S, A>: Send + Sync + 'static {
    /// Reason an action was rejected.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fold one action into the state.
    ///
    /// Returning `Err` fails the dispatch without committing anything.
    fn reduce(&self, state: &S, action: A) -> Result<S, Self::Error>;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(&S, A) -> S + Send + Sync + 'static,
{
    type Error = Infallible;

    fn reduce(&self, state: &S, action: A) -> Result<S, Infallible> {
        Ok(self(state, action))
    }
}

/// Reducer backed by a fallible closure.
///
/// Built by [`try_reducer`].
pub struct TryReducer<F, E> {
    f: F,
    _error: PhantomData<fn() -> E>,
}

impl<S, A, E, F> Reducer<S, A> for TryReducer<F, E>
where
    F: Fn(&S, A) -> Result<S, E> + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn reduce(&self, state: &S, action: A) -> Result<S, E> {
        (self.f)(state, action)
    }
}

/// Adapt a closure returning `Result<S, E>` into a [`Reducer`].
///
/// # Examples
///
/// ```
/// use statefold::{Reducer, try_reducer};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("balance would go negative")]
/// struct Overdrawn;
///
/// let reducer = try_reducer(|balance: &u64, withdraw: u64| {
///     balance.checked_sub(withdraw).ok_or(Overdrawn)
/// });
///
/// assert_eq!(reducer.reduce(&10, 4).unwrap(), 6);
/// assert!(reducer.reduce(&3, 4).is_err());
/// ```
pub fn try_reducer<S, A, E, F>(f: F) -> TryReducer<F, E>
where
    F: Fn(&S, A) -> Result<S, E> + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    TryReducer {
        f,
        _error: PhantomData,
    }
}


#[cfg(test)]
mod tests {
    use super::Reducer;
    use super::test_fixtures::{Counter, CounterAction, CounterError, counter_reducer};

    #[test]
    fn closure_is_infallible_reducer() {
        let reducer = |state: &u64, action: u64| state + action;
        assert_eq!(reducer.reduce(&2, 3).expect("infallible"), 5);
    }

    #[test]
    fn reduce_increment() {
        let state = counter_reducer()
            .reduce(&Counter::default(), CounterAction::Increment)
            .expect("increment should succeed");
        assert_eq!(state.value, 1);
    }

    #[test]
    fn reduce_decrement_at_zero() {
        let result = counter_reducer().reduce(&Counter::default(), CounterAction::Decrement);
        let err = result.expect_err("decrement at zero should fail");
        assert!(
            matches!(err, CounterError::AlreadyZero),
            "expected AlreadyZero, got: {err}"
        );
    }

    #[test]
    fn reduce_leaves_input_untouched() {
        let before = Counter { value: 4 };
        let after = counter_reducer()
            .reduce(&before, CounterAction::Add(6))
            .expect("add should succeed");
        assert_eq!(before.value, 4);
        assert_eq!(after.value, 10);
    }

    #[test]
    fn unknown_action_returns_equal_state() {
        let before = Counter { value: 9 };
        let after = counter_reducer()
            .reduce(&before, CounterAction::Noop)
            .expect("noop should succeed");
        assert_eq!(after, before);
    }

    #[test]
    fn fold_matches_sequential_reduction() {
        let actions = [
            CounterAction::Increment,
            CounterAction::Add(5),
            CounterAction::Decrement,
        ];
        let reducer = counter_reducer();
        let final_state = actions
            .iter()
            .cloned()
            .try_fold(Counter::default(), |state, action| {
                reducer.reduce(&state, action)
            })
            .expect("all actions should succeed");
        assert_eq!(final_state.value, 5);
    }
}
