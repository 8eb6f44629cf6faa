use std::collections::HashMap;

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;

type Pending<T> = Shared<BoxFuture<'static, T>>;

/// At most one outstanding operation per key; later callers join it.
pub struct RequestDeduplicator<T: Clone> {
    inflight: Mutex<HashMap<String, Pending<T>>>,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Awaits the in-flight operation for `key`, starting one with `start`
    /// if none exists. The entry is registered before the first await and
    /// removed once it settles, so a later call for the same key starts fresh.
    pub async fn run<F>(&self, key: &str, start: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let pending = {
            let mut inflight = self.inflight.lock();
            match inflight.get(key) {
                Some(existing) => {
                    tracing::debug!(target: "classifier", key, "joining in-flight request");
                    existing.clone()
                }
                None => {
                    let fresh = start().shared();
                    inflight.insert(key.to_string(), fresh.clone());
                    fresh
                }
            }
        };

        let value = pending.clone().await;

        let mut inflight = self.inflight.lock();
        if inflight
            .get(key)
            .is_some_and(|current| current.ptr_eq(&pending))
        {
            inflight.remove(key);
        }
        value
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: &str) -> bool {
        self.inflight.lock().contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Forgets every entry. Callers already awaiting keep their handles.
    pub fn clear(&self) -> usize {
        let mut inflight = self.inflight.lock();
        let dropped = inflight.len();
        inflight.clear();
        dropped
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
