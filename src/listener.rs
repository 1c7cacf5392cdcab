//! Listener trait and adapters for plain, fallible, and async closures.
//!
//! The store only ever sees `dyn Listener`: one operation, "notify and
//! await completion". Plain functions, async functions and user types with
//! their own state all implement it, so the notification loop is agnostic to
//! which kind of callable it holds.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Error a listener may return to fail the dispatch that notified it.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boxed future returned by [`Listener::notify`].
pub type ListenerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ListenerError>> + Send + 'a>>;

/// Identifies a single listener registration within a store.
///
/// Ids are assigned in subscription order and never reused by the same
/// store, so registering the same listener twice yields two distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that wants to hear about every committed state change.
///
/// Listeners take no arguments; read the new state through a
/// [`WeakStore`](crate::WeakStore) handle. A captured strong
/// [`Store`](crate::Store) keeps the store alive for as long as the
/// listener stays subscribed.
///
/// # Contract
///
/// - The store awaits the returned future to completion before notifying
///   the next listener, so a slow listener delays the whole round.
/// - Returning `Err` aborts the remaining notifications for that dispatch
///   and surfaces the error to the dispatch caller.
/// - Panicking is treated the same way and reported as
///   [`ContractViolation::ListenerPanicked`](crate::ContractViolation::ListenerPanicked).
/// - Do not await `dispatch` on the notifying store from inside `notify`;
///   it is rejected with
///   [`ContractViolation::ReentrantDispatch`](crate::ContractViolation::ReentrantDispatch).
///
/// # Examples
///
/// ```
/// use statefold::listener::{Listener, ListenerFuture};
///
/// struct Bell;
///
/// impl Listener for Bell {
///     fn notify(&self) -> ListenerFuture<'_> {
///         Box::pin(async { Ok(()) })
///     }
/// }
/// ```
pub trait Listener: Send + Sync + 'static {
    /// Invoke the listener and resolve once it has finished.
    fn notify(&self) -> ListenerFuture<'_>;
}

/// Listener backed by a synchronous closure that cannot fail.
///
/// Built by [`from_fn`].
pub struct FnListener<F> {
    f: F,
}

impl<F> Listener for FnListener<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn notify(&self) -> ListenerFuture<'_> {
        (self.f)();
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Listener backed by a synchronous closure returning a `Result`.
///
/// Built by [`try_from_fn`].
pub struct TryFnListener<F> {
    f: F,
}

impl<F> Listener for TryFnListener<F>
where
    F: Fn() -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn notify(&self) -> ListenerFuture<'_> {
        Box::pin(std::future::ready((self.f)()))
    }
}

/// Listener backed by a closure that returns a future.
///
/// Built by [`from_async_fn`].
pub struct AsyncFnListener<F> {
    f: F,
}

impl<F, Fut> Listener for AsyncFnListener<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    fn notify(&self) -> ListenerFuture<'_> {
        Box::pin((self.f)())
    }
}

/// Wrap a plain closure as a listener.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let listener = statefold::listener::from_fn(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// # let _ = listener;
/// ```
pub fn from_fn<F>(f: F) -> FnListener<F>
where
    F: Fn() + Send + Sync + 'static,
{
    FnListener { f }
}

/// Wrap a closure that may fail as a listener.
pub fn try_from_fn<F>(f: F) -> TryFnListener<F>
where
    F: Fn() -> Result<(), ListenerError> + Send + Sync + 'static,
{
    TryFnListener { f }
}

/// Wrap a closure returning a future as a listener.
///
/// The store awaits each returned future before moving on, so side effects
/// recorded after a suspension point are visible once `dispatch` returns.
///
/// # Examples
///
/// ```
/// let listener = statefold::listener::from_async_fn(|| async {
///     tokio::task::yield_now().await;
///     Ok(())
/// });
/// # let _ = listener;
/// ```
pub fn from_async_fn<F, Fut>(f: F) -> AsyncFnListener<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    AsyncFnListener { f }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn fn_listener_runs_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let listener = from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listener.notify().await.expect("notify should succeed");
        listener.notify().await.expect("notify should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn try_fn_listener_forwards_error() {
        let listener = try_from_fn(|| Err("boom".into()));
        let err = listener.notify().await.expect_err("notify should fail");
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn async_listener_completes_after_suspension() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let listener = from_async_fn(move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let fut = listener.notify();
        // Nothing runs until the future is polled.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        fut.await.expect("notify should succeed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_id_display() {
        assert_eq!(ListenerId(3).to_string(), "#3");
    }

    #[test]
    fn listener_ids_order_by_registration() {
        assert!(ListenerId(1) < ListenerId(2));
    }
}
