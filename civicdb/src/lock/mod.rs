//! Distributed all-or-nothing locking of record id sets.
//!
//! A [`LockManager`] acquires one lock key per record id, all of them or none,
//! and remembers each acquired set under its canonical (sorted, deduplicated)
//! form. Every lock it writes carries the manager's owner token, so only the
//! manager that took a lock can release it. Leases bound how long a crashed
//! holder can keep records locked.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use redis::aio::ConnectionManager;

use crate::{
    config::LockSettings,
    errors::RepoError,
    id::generate_owner_token,
    keys::KeyContext,
    runtime::scripts::{LOCK_ACQUIRE_SCRIPT, LOCK_RELEASE_SCRIPT},
};

/// Storage for the lock keys themselves.
#[allow(async_fn_in_trait)]
pub trait LockBackend {
    /// Take every key for `owner`, or none of them when any is already held.
    async fn try_acquire(&self, keys: &[String], owner: &str, lease: Duration) -> Result<bool, RepoError>;

    /// Delete the keys still owned by `owner`; returns how many were deleted.
    async fn release(&self, keys: &[String], owner: &str) -> Result<usize, RepoError>;

    /// Current owner token of `key`, if it is held.
    async fn holder(&self, key: &str) -> Result<Option<String>, RepoError>;
}

/// [`LockBackend`] over plain Redis keys, driven by Lua scripts so that
/// acquiring and releasing a set is atomic.
#[derive(Clone)]
pub struct RedisLockBackend {
    conn: ConnectionManager,
}

impl RedisLockBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Every lock key matching `pattern` with its owner token.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<(String, String)>, RepoError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();

        let mut held = Vec::with_capacity(keys.len());
        for key in keys {
            let owner: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            if let Some(owner) = owner {
                held.push((key, owner));
            }
        }
        Ok(held)
    }

    /// Delete a lock key regardless of its owner.
    pub async fn force_release(&self, key: &str) -> Result<bool, RepoError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}

impl LockBackend for RedisLockBackend {
    async fn try_acquire(&self, keys: &[String], owner: &str, lease: Duration) -> Result<bool, RepoError> {
        let mut invocation = LOCK_ACQUIRE_SCRIPT.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        invocation.arg(owner).arg(lease.as_millis().max(1) as u64);
        let mut conn = self.conn.clone();
        let acquired: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(acquired == 1)
    }

    async fn release(&self, keys: &[String], owner: &str) -> Result<usize, RepoError> {
        let mut invocation = LOCK_RELEASE_SCRIPT.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        invocation.arg(owner);
        let mut conn = self.conn.clone();
        let released: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(released.max(0) as usize)
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, RepoError> {
        let mut conn = self.conn.clone();
        let owner: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(owner)
    }
}

/// Canonical identity of a set of record ids: sorted and deduplicated, so
/// `[b, a, a]` and `[a, b]` name the same lock set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockSetKey(Vec<String>);

impl LockSetKey {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        Self(unique.into_iter().collect())
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
struct LockHandle {
    lock_keys: Vec<String>,
    acquired_at: Instant,
}

/// Process-local bookkeeping over a [`LockBackend`].
///
/// Bookkeeping is guarded by a mutex that is never held across a backend call.
/// Two callers racing for the same set in one process are settled by the
/// backend: the second acquisition finds the keys taken and fails.
pub struct LockManager<B> {
    backend: B,
    prefix: String,
    owner: String,
    settings: LockSettings,
    held: Mutex<HashMap<LockSetKey, LockHandle>>,
}

impl<B> LockManager<B>
where
    B: LockBackend,
{
    pub fn new(backend: B, prefix: impl Into<String>, settings: LockSettings) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            owner: generate_owner_token(),
            settings,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Token written into every lock this manager holds.
    pub fn owner_token(&self) -> &str {
        &self.owner
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Try to lock every id, retrying until the configured wait elapses.
    ///
    /// Returns `false` when this manager still holds the same set, and `false`
    /// when the wait runs out or the backend fails. A remembered set whose
    /// leases have all expired is forgotten and acquired again. Never holds a
    /// partial set.
    pub async fn lock_records(&self, record_ids: &[String]) -> bool {
        let set = LockSetKey::new(record_ids.iter().map(String::as_str));
        if set.is_empty() {
            warn!("refusing to lock an empty set of records");
            return false;
        }
        match self.still_held(&set).await {
            Ok(true) => {
                warn!("records {:?} are already locked by this manager", set.ids());
                return false;
            }
            Ok(false) => {}
            Err(err) => {
                warn!("failed to check existing locks for {:?}: {err}", set.ids());
                return false;
            }
        }

        let lock_keys = self.lock_keys(set.ids());
        let deadline = Instant::now() + self.settings.wait();
        let retry = self.settings.retry_interval();
        loop {
            match self.backend.try_acquire(&lock_keys, &self.owner, self.settings.lease()).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => {
                    warn!("failed to acquire locks for {:?}: {err}", set.ids());
                    return false;
                }
            }
            if Instant::now() + retry > deadline {
                info!("timed out waiting for locks on {:?}", set.ids());
                return false;
            }
            tokio::time::sleep(retry).await;
        }

        debug!("locked records {:?}", set.ids());
        self.held_map().insert(
            set,
            LockHandle {
                lock_keys,
                acquired_at: Instant::now(),
            },
        );
        true
    }

    /// Release a previously locked set.
    ///
    /// An exact match of a set acquired here releases that set. Otherwise each
    /// id's lock is released individually when this manager owns it, and a
    /// remembered set is forgotten once none of its locks is still held. Ids
    /// not locked by this manager are ignored. Returns how many lock keys were
    /// deleted.
    pub async fn release_locks(&self, record_ids: &[String]) -> Result<usize, RepoError> {
        let set = LockSetKey::new(record_ids.iter().map(String::as_str));
        if set.is_empty() {
            return Ok(0);
        }

        let exact = self.held_map().get(&set).cloned();
        if let Some(handle) = exact {
            let released = self.backend.release(&handle.lock_keys, &self.owner).await?;
            self.held_map().remove(&set);
            debug!(
                "released {released} locks for {:?} after {:?}",
                set.ids(),
                handle.acquired_at.elapsed()
            );
            return Ok(released);
        }

        let mut released_ids = BTreeSet::new();
        let mut released = 0;
        for id in set.ids() {
            let key = KeyContext::new(&self.prefix).record_lock(id);
            if self.backend.holder(&key).await?.as_deref() != Some(self.owner.as_str()) {
                continue;
            }
            released += self.backend.release(std::slice::from_ref(&key), &self.owner).await?;
            released_ids.insert(id.as_str());
        }
        if !released_ids.is_empty() {
            debug!("released {released} individual locks for {released_ids:?}");
            self.forget_released_sets(&released_ids).await?;
        }
        Ok(released)
    }

    /// Whether this manager holds exactly this set and at least one of its
    /// leases is still live.
    pub async fn is_locked(&self, record_ids: &[String]) -> Result<bool, RepoError> {
        let set = LockSetKey::new(record_ids.iter().map(String::as_str));
        self.still_held(&set).await
    }

    /// Number of sets this manager remembers holding, expired leases included.
    pub fn held_sets(&self) -> usize {
        self.held_map().len()
    }

    /// Whether `set` is remembered and still owned in the backend. A remembered
    /// set with no owned key left has expired and is forgotten.
    async fn still_held(&self, set: &LockSetKey) -> Result<bool, RepoError> {
        let Some(handle) = self.held_map().get(set).cloned() else {
            return Ok(false);
        };
        if self.owns_any(&handle).await? {
            return Ok(true);
        }
        debug!("locks on {:?} expired after {:?}", set.ids(), handle.acquired_at.elapsed());
        self.held_map().remove(set);
        Ok(false)
    }

    async fn owns_any(&self, handle: &LockHandle) -> Result<bool, RepoError> {
        for key in &handle.lock_keys {
            if self.backend.holder(key).await?.as_deref() == Some(self.owner.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drop remembered sets touched by `released_ids` once none of their keys is still ours.
    async fn forget_released_sets(&self, released_ids: &BTreeSet<&str>) -> Result<(), RepoError> {
        let touched: Vec<(LockSetKey, LockHandle)> = self
            .held_map()
            .iter()
            .filter(|(set, _)| set.ids().iter().any(|id| released_ids.contains(id.as_str())))
            .map(|(set, handle)| (set.clone(), handle.clone()))
            .collect();

        for (set, handle) in touched {
            if !self.owns_any(&handle).await? {
                self.held_map().remove(&set);
            }
        }
        Ok(())
    }

    fn lock_keys(&self, ids: &[String]) -> Vec<String> {
        let ctx = KeyContext::new(&self.prefix);
        ids.iter().map(|id| ctx.record_lock(id)).collect()
    }

    fn held_map(&self) -> std::sync::MutexGuard<'_, HashMap<LockSetKey, LockHandle>> {
        // Poisoning only means another caller panicked mid-update; the map is still usable.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_set_key_is_order_and_duplicate_insensitive() {
        assert_eq!(LockSetKey::new(["b", "a", "a"]), LockSetKey::new(["a", "b"]));
        assert_ne!(LockSetKey::new(["a"]), LockSetKey::new(["a", "b"]));
        assert_eq!(LockSetKey::new(["b", "a"]).ids(), ["a", "b"]);
    }
}
