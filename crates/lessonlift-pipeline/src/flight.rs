//! Per-key single-flight guard.
//!
//! `generate`, `apply`, and `confirm` each allow at most one pending request
//! per key. A second call while one is pending is rejected with
//! [`PipelineError::Busy`] rather than queued.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PipelineError, Result};

/// Observable state of the most recent request for a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// No request has been made for this key.
    #[default]
    Idle,
    /// A request is in progress.
    Pending,
    /// The last request completed successfully.
    Succeeded,
    /// The last request failed or was abandoned.
    Failed,
}

/// Registry of request states keyed by `K`.
#[derive(Debug)]
pub struct SingleFlight<K> {
    operation: &'static str,
    states: Arc<Mutex<HashMap<K, RequestState>>>,
}

impl<K> SingleFlight<K>
where
    K: Eq + Hash + Clone + std::fmt::Display,
{
    /// Creates an empty registry for the named operation.
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Marks `key` pending and returns a guard for the request.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Busy`] if a request for `key` is already pending.
    pub fn begin(&self, key: K) -> Result<FlightGuard<K>> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.get(&key) == Some(&RequestState::Pending) {
            debug!(operation = self.operation, key = %key, "Rejecting duplicate in-flight request");
            return Err(PipelineError::busy(self.operation, key.to_string()));
        }
        states.insert(key.clone(), RequestState::Pending);
        drop(states);

        Ok(FlightGuard {
            key,
            states: Arc::clone(&self.states),
            finished: false,
        })
    }

    /// Returns the state of the most recent request for `key`.
    #[must_use]
    pub fn state(&self, key: &K) -> RequestState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Forgets the state recorded for `key`, unless a request is pending.
    pub fn reset(&self, key: &K) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.get(key) != Some(&RequestState::Pending) {
            states.remove(key);
        }
    }
}

/// Holds a key in the `Pending` state.
///
/// Dropping the guard without calling [`FlightGuard::succeed`] records the
/// request as `Failed`, so early returns through `?` release the key.
#[derive(Debug)]
pub struct FlightGuard<K: Eq + Hash> {
    key: K,
    states: Arc<Mutex<HashMap<K, RequestState>>>,
    finished: bool,
}

impl<K: Eq + Hash> FlightGuard<K> {
    /// Records the request as succeeded.
    pub fn succeed(mut self) {
        self.finish(RequestState::Succeeded);
    }

    fn finish(&mut self, state: RequestState) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = states.get_mut(&self.key) {
            *entry = state;
        }
    }
}

impl<K: Eq + Hash> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        self.finish(RequestState::Failed);
    }
}
