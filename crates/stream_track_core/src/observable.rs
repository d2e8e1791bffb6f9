//! crates/stream_track_core/src/observable.rs
//!
//! A small reactive cell: the latest value can be read or awaited through a
//! `watch` channel, and every transition is also published on a `broadcast`
//! channel so observers can replay the full sequence of states.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const HISTORY_CAPACITY: usize = 256;

struct Inner<T> {
    current: watch::Sender<T>,
    history: broadcast::Sender<T>,
}

/// A shared, observable value. Clones refer to the same cell.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (current, _) = watch::channel(initial);
        let (history, _) = broadcast::channel(HISTORY_CAPACITY);
        Self {
            inner: Arc::new(Inner { current, history }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.current.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.update(move |current| *current = value);
    }

    /// Applies `f` as a single transition and returns the resulting value.
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) -> T {
        let history = &self.inner.history;
        let mut next = None;
        self.inner.current.send_modify(|current| {
            f(current);
            // Published while the watch lock is held so both channels agree on order.
            let _ = history.send(current.clone());
            next = Some(current.clone());
        });
        next.unwrap_or_else(|| self.get())
    }

    /// Latest-value receiver; intermediate states may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.current.subscribe()
    }

    /// Every transition made after this call, in order.
    pub fn changes(&self) -> broadcast::Receiver<T> {
        self.inner.history.subscribe()
    }

    /// Resolves with the first value (current or future) matching `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> T
    where
        F: FnMut(&T) -> bool,
    {
        let mut rx = self.subscribe();
        let result = rx.wait_for(predicate).await.map(|value| T::clone(&value));
        // The sender lives as long as `self`, so the channel cannot close here.
        result.unwrap_or_else(|_| self.get())
    }
}

/// Waits for the first item of `stream`, then drops the stream (detaching it).
pub async fn next_event<S: Stream>(stream: S) -> Option<S::Item> {
    let mut stream = std::pin::pin!(stream);
    stream.next().await
}
