//! Per-key mutual exclusion with a self-pruning lock map.
//!
//! Each key gets a lazily created async mutex. Entries are reference counted:
//! the map holds one reference and every holder or waiter holds another, so
//! the entry is removed as soon as the last of them leaves. The map therefore
//! only ever contains keys with work in flight.

use hntop_core::Error;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// A map of async locks keyed by string.
#[derive(Clone, Debug, Default)]
pub struct KeyedLocks {
    map: Arc<StdMutex<LockMap>>,
}

/// Exclusive hold on one key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    // Field order matters: the mutex guard must be released before the
    // handle checks whether it was the last reference.
    _guard: OwnedMutexGuard<()>,
    _handle: Handle,
}

/// A counted reference to one map entry.
#[derive(Debug)]
struct Handle {
    key: String,
    lock: Arc<Mutex<()>>,
    map: Arc<StdMutex<LockMap>>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        let mut map = lock_map(&self.map);
        // One reference in the map, one here: nobody else holds or waits.
        if Arc::strong_count(&self.lock) == 2
            && let Some(entry) = map.get(&self.key)
            && Arc::ptr_eq(entry, &self.lock)
        {
            map.remove(&self.key);
        }
    }
}

fn lock_map(map: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Returns `Error::Cancelled` if `cancel` fires first. A cancelled waiter
    /// gives up its reference, so it never leaves a stale entry behind.
    pub async fn acquire(&self, key: &str, cancel: &CancellationToken) -> Result<KeyGuard, Error> {
        let handle = {
            let mut map = lock_map(&self.map);
            let lock = map.entry(key.to_string()).or_default().clone();
            Handle { key: key.to_string(), lock, map: self.map.clone() }
        };

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = handle.lock.clone().lock_owned() => guard,
        };

        Ok(KeyGuard { _guard: guard, _handle: handle })
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        lock_map(&self.map).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
