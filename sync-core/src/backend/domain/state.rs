//! Observable state published by the ledger, activity sync and rewards manager.
//!
//! Each holder owns the single sender; UI collaborators subscribe and read
//! snapshots without ever blocking the writer.

use std::sync::Arc;
use tokio::sync::watch;

/// A value plus the loading flag and last-error slot shown next to it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observed<T> {
    pub value: T,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ObservableState<T> {
    sender: Arc<watch::Sender<Observed<T>>>,
}

impl<T: Clone> ObservableState<T> {
    pub fn new(value: T) -> Self {
        let (sender, _) = watch::channel(Observed {
            value,
            is_loading: false,
            last_error: None,
        });
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn get(&self) -> Observed<T> {
        self.sender.borrow().clone()
    }

    pub fn value(&self) -> T {
        self.sender.borrow().value.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Observed<T>> {
        self.sender.subscribe()
    }

    pub fn update(&self, modify: impl FnOnce(&mut Observed<T>)) {
        self.sender.send_modify(modify);
    }

    pub fn set_loading(&self, is_loading: bool) {
        self.update(|state| state.is_loading = is_loading);
    }

    /// Store the outcome of a finished operation
    pub fn finish(&self, value: T, last_error: Option<String>) {
        self.update(|state| {
            state.value = value;
            state.is_loading = false;
            state.last_error = last_error;
        });
    }

    /// Record a failure, leaving the value as it is
    pub fn fail(&self, message: String) {
        self.update(|state| {
            state.is_loading = false;
            state.last_error = Some(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let state = ObservableState::new(0i64);
        let mut receiver = state.subscribe();

        state.set_loading(true);
        state.finish(42, None);

        receiver.changed().await.unwrap();
        let snapshot = receiver.borrow().clone();
        assert_eq!(snapshot.value, 42);
        assert!(!snapshot.is_loading);
    }

    #[test]
    fn test_fail_keeps_value() {
        let state = ObservableState::new(7i64);
        state.fail("offline".to_string());

        let snapshot = state.get();
        assert_eq!(snapshot.value, 7);
        assert_eq!(snapshot.last_error.as_deref(), Some("offline"));
    }
}
