//! Async single-state store: pure reducers, ordered dispatch, awaited
//! listeners.
//!
//! A [`Store`] holds one state value that changes only when an action is
//! dispatched through its [`Reducer`]. After each commit every subscribed
//! [`Listener`] is notified in subscription order, and async listeners are
//! awaited before `dispatch` resolves.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use statefold::{create_store, listener};
//!
//! let store = create_store(|todos: &Vec<String>, text: String| {
//!     let mut next = todos.clone();
//!     next.push(text);
//!     next
//! }, Vec::new())
//! .await?;
//!
//! let subscription = store.subscribe(listener::from_fn(|| println!("changed")));
//! store.dispatch("todo text".to_owned()).await?;
//! assert_eq!(*store.state(), vec!["todo text".to_owned()]);
//!
//! subscription.unsubscribe();
//! assert_eq!(store.listener_count(), 0);
//! # Ok(())
//! # }
//! ```

mod actor;
mod combine;
mod error;
pub mod listener;
mod reducer;
mod registry;
mod store;

pub use combine::{CombinedReducer, combine_reducers};
pub use error::{CombineError, ContractViolation, CreateError, DispatchError};
pub use listener::{Listener, ListenerError, ListenerId};
pub use reducer::{Reducer, TryReducer, try_reducer};
pub use registry::Subscription;
pub use store::{Store, StoreBuilder, StoreConfig, WeakStore, create_store};
