//! Top-level entry point: the [`Store`] handle, its builder, and
//! [`create_store`].
//!
//! A store is a cloneable handle to a single actor task that owns the
//! reducer. Dispatches travel over a bounded mailbox and are answered on a
//! oneshot channel once reduction, commit and notification are complete.
//! The committed state is published through a `watch` channel so reading
//! it never suspends, and the listener registry is shared behind a short
//! synchronous lock so subscribing never suspends either.

use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use crate::actor::{self, ActorParts, StoreId, StoreMessage, run_actor};
use crate::error::{ContractViolation, CreateError, DispatchError};
use crate::listener::{Listener, ListenerId};
use crate::reducer::Reducer;
use crate::registry::{self, Registry, SharedRegistry, Subscription};

/// Default mailbox capacity: 32 queued dispatches.
const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Tunable settings for a store.
///
/// All fields have sensible defaults accessible via
/// [`StoreConfig::default()`]. The struct is `serde`-friendly so it can be
/// embedded in an application's own configuration file; missing fields
/// fall back to their defaults.
///
/// Pass to [`StoreBuilder::config`] to apply.
///
/// # Examples
///
/// ```
/// use statefold::StoreConfig;
///
/// let config = StoreConfig {
///     name: "session".into(),
///     ..StoreConfig::default()
/// };
/// assert_eq!(config.name, "session");
/// assert_eq!(config.mailbox_capacity, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How many dispatches may queue before `dispatch` waits for room.
    ///
    /// A value of `0` is treated as `1`.
    ///
    /// Default: 32.
    pub mailbox_capacity: usize,

    /// Label attached to the store's log events.
    ///
    /// Default: `"store"`.
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            name: "store".to_owned(),
        }
    }
}

/// Handle to a running store.
///
/// Lightweight, cloneable, and `Send + Sync`: every clone talks to the same
/// actor, state and listener set. The actor shuts down once every `Store`
/// handle has been dropped; [`WeakStore`] handles do not keep it alive.
///
/// # Type Parameters
///
/// * `S` - State type.
/// * `A` - Action type.
/// * `E` - The reducer's error type; [`Infallible`] for closure reducers.
pub struct Store<S, A, E = Infallible>
where
    E: std::error::Error + Send + Sync + 'static,
{
    id: StoreId,
    name: Arc<str>,
    sender: mpsc::Sender<StoreMessage<S, A, E>>,
    state: watch::Receiver<Arc<S>>,
    registry: SharedRegistry,
}

// Manual `Clone` because neither `S`, `A` nor `E` need be `Clone` for the
// handle; only the channel ends and the registry `Arc` are cloned.
impl<S, A, E> Clone for Store<S, A, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
            state: self.state.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S, A, E> fmt::Debug for Store<S, A, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("listeners", &registry::lock(&self.registry).len())
            .field("alive", &!self.sender.is_closed())
            .finish()
    }
}

impl<S, A> Store<S, A>
where
    S: Send + Sync + 'static,
    A: Send + 'static,
{
    /// Start configuring a store for `reducer` with `initial_state`.
    ///
    /// # Examples
    ///
    /// ```
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use statefold::Store;
    ///
    /// let store = Store::builder(|total: &i64, delta: i64| total + delta, 0)
    ///     .name("totals")
    ///     .mailbox_capacity(8)
    ///     .build()
    ///     .await?;
    ///
    /// store.dispatch(5).await?;
    /// assert_eq!(*store.state(), 5);
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder<R>(reducer: R, initial_state: S) -> StoreBuilder<S, A, R>
    where
        R: Reducer<S, A>,
    {
        StoreBuilder::new(reducer, initial_state)
    }
}

impl<S, A, E> Store<S, A, E>
where
    S: Send + Sync + 'static,
    A: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Fold `action` into the state and notify every listener.
    ///
    /// Resolves once the new state is committed and every listener has
    /// completed, in subscription order. The listeners notified are those
    /// registered before this call began and still registered when
    /// notification starts. Dispatches from one task are applied in the
    /// order issued; dispatches from different tasks are applied in a single
    /// total order.
    ///
    /// If this future is dropped after the action reached the store, the
    /// store still finishes reducing, committing and notifying.
    ///
    /// # Arguments
    ///
    /// * `action` - Forwarded to the reducer as-is.
    ///
    /// # Returns
    ///
    /// The newly committed state.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Reducer`] -- the reducer rejected the action; state
    ///   is unchanged.
    /// * [`DispatchError::Listener`] -- a listener failed; state was
    ///   committed, later listeners were skipped for this round.
    /// * [`DispatchError::ContractViolation`] -- the reducer panicked (state
    ///   unchanged), a listener panicked (state committed, later listeners
    ///   skipped), or this call came from a listener of this same store.
    /// * [`DispatchError::StoreClosed`] -- the store actor has exited.
    pub async fn dispatch(&self, action: A) -> Result<Arc<S>, DispatchError<E>> {
        if actor::current_actor() == Some(self.id) {
            return Err(ContractViolation::ReentrantDispatch.into());
        }

        let watermark = registry::lock(&self.registry).watermark();
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StoreMessage::Dispatch {
                action,
                watermark,
                reply: tx,
            })
            .await
            .map_err(|_| DispatchError::StoreClosed)?;
        rx.await.map_err(|_| DispatchError::StoreClosed)?
    }

    /// The most recently committed state.
    ///
    /// Never suspends and never fails. Inside a listener this is already the
    /// state committed by the dispatch being notified.
    pub fn state(&self) -> Arc<S> {
        Arc::clone(&self.state.borrow())
    }

    /// Register `listener` to run after every future commit.
    ///
    /// The listener is first notified by the next dispatch call that begins
    /// after this call returns; a dispatch already issued, even one still
    /// waiting in the mailbox, does not notify it. Registering the same
    /// listener value twice (e.g. via a shared `Arc`) creates two
    /// independent registrations.
    ///
    /// The registry owns the listener until it is unsubscribed, so a
    /// listener that captures a strong [`Store`] keeps the store running
    /// forever. Capture a [`WeakStore`] from [`downgrade`](Store::downgrade)
    /// instead.
    ///
    /// # Returns
    ///
    /// A [`Subscription`] whose [`unsubscribe`](Subscription::unsubscribe)
    /// removes exactly this registration.
    pub fn subscribe<L: Listener>(&self, listener: L) -> Subscription {
        self.subscribe_shared(Arc::new(listener))
    }

    /// Register an already shared listener.
    ///
    /// Same as [`subscribe`](Store::subscribe) but lets the caller keep its
    /// own `Arc` to the listener, e.g. to inspect its state later.
    pub fn subscribe_shared(&self, listener: Arc<dyn Listener>) -> Subscription {
        let id = registry::lock(&self.registry).insert(listener);
        tracing::debug!(store = %self.name, listener = %id, "listener subscribed");
        Subscription::new(id, &self.registry)
    }

    /// Number of live listener registrations.
    pub fn listener_count(&self) -> usize {
        registry::lock(&self.registry).len()
    }

    /// Ids of the live listener registrations, in notification order.
    pub fn listeners(&self) -> Vec<ListenerId> {
        registry::lock(&self.registry).ids()
    }

    /// The label configured through [`StoreBuilder::name`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the actor backing this store is still running.
    ///
    /// Returns `false` once the actor has exited, for example because its
    /// runtime shut down.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Create a [`WeakStore`] that does not keep the actor alive.
    ///
    /// Listeners that need to read state should capture a weak handle: a
    /// strong handle stored in the registry would keep the store from ever
    /// shutting down.
    pub fn downgrade(&self) -> WeakStore<S, A, E> {
        WeakStore {
            id: self.id,
            name: Arc::clone(&self.name),
            sender: self.sender.downgrade(),
            state: self.state.clone(),
            registry: Arc::downgrade(&self.registry),
        }
    }
}

/// Non-owning handle to a store.
///
/// Obtained from [`Store::downgrade`]. Call [`upgrade`](WeakStore::upgrade)
/// to get a usable [`Store`] while at least one strong handle still exists.
pub struct WeakStore<S, A, E = Infallible>
where
    E: std::error::Error + Send + Sync + 'static,
{
    id: StoreId,
    name: Arc<str>,
    sender: mpsc::WeakSender<StoreMessage<S, A, E>>,
    state: watch::Receiver<Arc<S>>,
    registry: Weak<Mutex<Registry>>,
}

impl<S, A, E> Clone for WeakStore<S, A, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
            state: self.state.clone(),
            registry: Weak::clone(&self.registry),
        }
    }
}

impl<S, A, E> fmt::Debug for WeakStore<S, A, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<S, A, E> WeakStore<S, A, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Get a strong handle, or `None` if every strong handle was dropped.
    pub fn upgrade(&self) -> Option<Store<S, A, E>> {
        Some(Store {
            id: self.id,
            name: Arc::clone(&self.name),
            sender: self.sender.upgrade()?,
            state: self.state.clone(),
            registry: self.registry.upgrade()?,
        })
    }
}

/// Builder for [`Store`].
///
/// Created by [`Store::builder`]. Without further configuration it binds
/// the store to the ambient tokio runtime with [`StoreConfig::default`].
pub struct StoreBuilder<S, A, R> {
    reducer: R,
    initial_state: S,
    config: StoreConfig,
    runtime: Option<Handle>,
    _action: PhantomData<fn(A)>,
}

impl<S, A, R> StoreBuilder<S, A, R>
where
    S: Send + Sync + 'static,
    A: Send + 'static,
    R: Reducer<S, A>,
{
    fn new(reducer: R, initial_state: S) -> Self {
        Self {
            reducer,
            initial_state,
            config: StoreConfig::default(),
            runtime: None,
            _action: PhantomData,
        }
    }

    /// Run the store actor on `runtime` instead of the ambient runtime.
    ///
    /// The runtime must be running (driven by some thread) for
    /// [`build`](StoreBuilder::build) and every later dispatch to complete.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set how many dispatches may queue before senders wait.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    /// Set the label attached to the store's log events.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Replace every [`StoreConfig`] setting at once.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the store actor and wait until it is running.
    ///
    /// No reduction happens here; the returned store's state is the initial
    /// state and it has no listeners.
    ///
    /// # Errors
    ///
    /// * [`CreateError::NoRuntime`] -- no runtime was configured and this
    ///   was not called from within one.
    /// * [`CreateError::StartupFailed`] -- the actor task never started, for
    ///   example because the runtime is shutting down.
    pub async fn build(self) -> Result<Store<S, A, R::Error>, CreateError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()?,
        };

        let id = StoreId::next();
        let name: Arc<str> = Arc::from(self.config.name);
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(Arc::new(self.initial_state));
        let registry = SharedRegistry::default();
        let (ready_tx, ready_rx) = oneshot::channel();

        runtime.spawn(run_actor(ActorParts {
            id,
            name: Arc::clone(&name),
            reducer: self.reducer,
            state: state_tx,
            registry: Arc::clone(&registry),
            rx,
            ready: ready_tx,
        }));

        ready_rx.await.map_err(|_| CreateError::StartupFailed)?;
        tracing::debug!(store = %name, "store created");

        Ok(Store {
            id,
            name,
            sender: tx,
            state: state_rx,
            registry,
        })
    }
}

/// Create a store from `reducer` and `initial_state` with default settings.
///
/// Shorthand for `Store::builder(reducer, initial_state).build()`. Must be
/// called from within a tokio runtime; the store actor is spawned on it.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = statefold::create_store(|count: &u32, _: ()| count + 1, 0).await?;
/// store.dispatch(()).await?;
/// assert_eq!(*store.state(), 1);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// See [`StoreBuilder::build`].
pub async fn create_store<S, A, R>(
    reducer: R,
    initial_state: S,
) -> Result<Store<S, A, R::Error>, CreateError>
where
    S: Send + Sync + 'static,
    A: Send + 'static,
    R: Reducer<S, A>,
{
    Store::builder(reducer, initial_state).build().await
}
