//! Todo list driven by a store with a plain, an async, and a failing
//! listener.
//!
//! Run with: `RUST_LOG=statefold=debug cargo run --example todos`

use std::time::Duration;

use serde::{Deserialize, Serialize};
use statefold::{DispatchError, Store, listener, try_reducer};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// State and actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Todos {
    items: Vec<Todo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Todo {
    text: String,
    done: bool,
}

/// Actions accepted by [`reduce`].
#[derive(Debug, Clone)]
enum Action {
    Add(String),
    Toggle(usize),
}

#[derive(Debug, thiserror::Error)]
enum TodoError {
    #[error("no todo at index {0}")]
    NoSuchTodo(usize),
}

fn reduce(state: &Todos, action: Action) -> Result<Todos, TodoError> {
    let mut next = state.clone();
    match action {
        Action::Add(text) => next.items.push(Todo { text, done: false }),
        Action::Toggle(index) => {
            let todo = next
                .items
                .get_mut(index)
                .ok_or(TodoError::NoSuchTodo(index))?;
            todo.done = !todo.done;
        }
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Store::builder(try_reducer(reduce), Todos::default())
        .name("todos")
        .build()
        .await?;

    // Print the list after every change. A weak handle keeps the listener
    // from holding the store open.
    let weak = store.downgrade();
    let _printer = store.subscribe(listener::from_fn(move || {
        if let Some(store) = weak.upgrade() {
            match serde_json::to_string(&*store.state()) {
                Ok(json) => println!("state: {json}"),
                Err(e) => eprintln!("cannot render state: {e}"),
            }
        }
    }));

    // Simulate a slow sink; dispatch waits for it.
    let _sink = store.subscribe(listener::from_async_fn(|| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("  (synced)");
        Ok(())
    }));

    store.dispatch(Action::Add("write the store".into())).await?;
    store.dispatch(Action::Add("write the tests".into())).await?;
    store.dispatch(Action::Toggle(0)).await?;

    // Rejected by the reducer: state stays as it was and nobody is notified.
    match store.dispatch(Action::Toggle(9)).await {
        Err(DispatchError::Reducer(e)) => println!("rejected: {e}"),
        other => println!("unexpected: {other:?}"),
    }

    // A listener that fails surfaces its error after the commit.
    let flaky = store.subscribe(listener::try_from_fn(|| Err("webhook timed out".into())));
    if let Err(e) = store.dispatch(Action::Toggle(1)).await {
        println!("dispatch committed but reported: {e}");
    }
    flaky.unsubscribe();

    println!(
        "{} todos, {} listeners",
        store.state().items.len(),
        store.listener_count()
    );
    Ok(())
}
