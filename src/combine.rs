//! Composition of per-key reducers over JSON object state.
//!
//! Keyed-mapping state is modelled as a `serde_json::Value` object. A
//! [`CombinedReducer`] routes each action to one slice reducer per key and
//! reassembles the results into a new object.

use serde_json::{Map, Value};

use crate::error::CombineError;
use crate::reducer::Reducer;

/// Reducer for the value stored under one key.
type SliceReducer<A> = Box<dyn Fn(&Value, &A) -> Value + Send + Sync>;

/// A reducer built from one slice reducer per top-level key.
///
/// Built by [`combine_reducers`]. On every action each slice reducer
/// receives the current value under its key (`Value::Null` when the key is
/// absent) and a reference to the action; its return value is stored under
/// the same key. Keys without a slice reducer are carried over unchanged.
pub struct CombinedReducer<A> {
    slices: Vec<(String, SliceReducer<A>)>,
}

impl<A> Default for CombinedReducer<A> {
    fn default() -> Self {
        Self { slices: Vec::new() }
    }
}

impl<A> CombinedReducer<A> {
    /// Route the value under `key` through `reducer`.
    ///
    /// Registering a key twice replaces the earlier reducer.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn slice<F>(mut self, key: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&Value, &A) -> Value + Send + Sync + 'static,
    {
        let key = key.into();
        let reducer: SliceReducer<A> = Box::new(reducer);
        match self.slices.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = reducer,
            None => self.slices.push((key, reducer)),
        }
        self
    }

    /// Keys handled by this reducer, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|(key, _)| key.as_str())
    }
}

impl<A: 'static> Reducer<Value, A> for CombinedReducer<A> {
    type Error = CombineError;

    fn reduce(&self, state: &Value, action: A) -> Result<Value, CombineError> {
        let Value::Object(current) = state else {
            return Err(CombineError::NotAnObject {
                found: value_kind(state),
            });
        };

        let mut next: Map<String, Value> = current.clone();
        for (key, reducer) in &self.slices {
            let slice = current.get(key).unwrap_or(&Value::Null);
            next.insert(key.clone(), reducer(slice, &action));
        }
        Ok(Value::Object(next))
    }
}

/// Start building a [`CombinedReducer`].
///
/// # Examples
///
/// ```
/// use serde_json::{Value, json};
/// use statefold::{Reducer, combine_reducers};
///
/// let reducer = combine_reducers::<Value>()
///     .slice("count", |count, action| match action["type"].as_str() {
///         Some("INCREMENT") => json!(count.as_u64().unwrap_or(0) + 1),
///         _ => count.clone(),
///     })
///     .slice("last", |last, action| {
///         action.get("type").cloned().unwrap_or_else(|| last.clone())
///     });
///
/// let state = reducer
///     .reduce(&json!({ "count": 1 }), json!({ "type": "INCREMENT" }))
///     .unwrap();
/// assert_eq!(state, json!({ "count": 2, "last": "INCREMENT" }));
/// ```
pub fn combine_reducers<A>() -> CombinedReducer<A> {
    CombinedReducer::default()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn todos(state: &Value, action: &Value) -> Value {
        match action["type"].as_str() {
            Some("ADD_TODO") => {
                let mut items = state.as_array().cloned().unwrap_or_default();
                items.push(action["text"].clone());
                Value::Array(items)
            }
            _ => state.clone(),
        }
    }

    fn visibility(state: &Value, action: &Value) -> Value {
        match action["type"].as_str() {
            Some("SET_FILTER") => action["filter"].clone(),
            _ if state.is_null() => json!("all"),
            _ => state.clone(),
        }
    }

    fn app() -> CombinedReducer<Value> {
        combine_reducers()
            .slice("todos", todos)
            .slice("visibility", visibility)
    }

    #[test]
    fn routes_each_key_to_its_slice() {
        let state = json!({ "todos": [], "visibility": "all" });
        let next = app()
            .reduce(&state, json!({ "type": "ADD_TODO", "text": "write tests" }))
            .expect("reduce should succeed");
        assert_eq!(
            next,
            json!({ "todos": ["write tests"], "visibility": "all" })
        );
    }

    #[test]
    fn missing_keys_start_from_null() {
        let next = app()
            .reduce(&json!({}), json!({ "type": "NOOP" }))
            .expect("reduce should succeed");
        assert_eq!(next, json!({ "todos": null, "visibility": "all" }));
    }

    #[test]
    fn unmanaged_keys_are_preserved() {
        let state = json!({ "todos": [], "visibility": "all", "session": { "user": "ada" } });
        let next = app()
            .reduce(&state, json!({ "type": "SET_FILTER", "filter": "done" }))
            .expect("reduce should succeed");
        assert_eq!(next["session"], json!({ "user": "ada" }));
        assert_eq!(next["visibility"], "done");
    }

    #[test]
    fn non_object_state_is_rejected() {
        let err = app()
            .reduce(&json!([1, 2]), json!({ "type": "NOOP" }))
            .expect_err("array state should fail");
        assert!(matches!(err, CombineError::NotAnObject { found: "array" }));
    }

    #[test]
    fn re_registering_a_key_replaces_it() {
        let reducer = app().slice("visibility", |_: &Value, _: &Value| json!("fixed"));
        assert_eq!(reducer.keys().collect::<Vec<_>>(), vec!["todos", "visibility"]);

        let next = reducer
            .reduce(&json!({}), json!({ "type": "SET_FILTER", "filter": "done" }))
            .expect("reduce should succeed");
        assert_eq!(next["visibility"], "fixed");
    }
}
