#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use civicdb::{
    EntityCache, GenericRepository, JsonRowMapper, LockBackend, NamedParams, QueryEntity, SqlExecutor,
    TopicPublisher, errors::RepoError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, QueryEntity)]
#[serde(rename_all = "camelCase")]
#[query(table = "household", rename_all = "camelCase")]
pub struct Household {
    #[query(key)]
    pub id: String,
    pub client_reference_id: String,
    pub tenant_id: String,
    pub member_count: i32,
    pub is_deleted: bool,
}

impl Household {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            client_reference_id: format!("C-{id}"),
            tenant_id: "pb.amritsar".to_string(),
            member_count: 3,
            is_deleted: false,
        }
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    pub fn with_members(mut self, member_count: i32) -> Self {
        self.member_count = member_count;
        self
    }

    pub fn row(&self) -> Value {
        serde_json::to_value(self).expect("household serializes")
    }
}

#[derive(Debug, Clone, Default, QueryEntity)]
#[query(table = "household", rename_all = "camelCase")]
pub struct HouseholdSearch {
    pub id: Option<Vec<String>>,
    pub client_reference_id: Option<Vec<String>>,
    pub boundary_code: Option<String>,
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[derive(Default)]
struct ExecutorState {
    rows: VecDeque<Vec<Value>>,
    strings: VecDeque<Vec<String>>,
    count: i64,
    queries: Vec<(String, NamedParams)>,
}

/// Replays queued result sets and records every statement it receives.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

impl MockExecutor {
    pub fn push_rows(&self, rows: Vec<Value>) {
        self.state.lock().unwrap().rows.push_back(rows);
    }

    pub fn push_strings(&self, values: Vec<String>) {
        self.state.lock().unwrap().strings.push_back(values);
    }

    pub fn set_count(&self, count: i64) {
        self.state.lock().unwrap().count = count;
    }

    pub fn queries(&self) -> Vec<(String, NamedParams)> {
        self.state.lock().unwrap().queries.clone()
    }

    fn record(&self, sql: &str, params: &NamedParams) {
        self.state
            .lock()
            .unwrap()
            .queries
            .push((sql.to_string(), params.clone()));
    }
}

impl SqlExecutor for MockExecutor {
    type Row = Value;

    async fn fetch_all(&self, sql: &str, params: &NamedParams) -> Result<Vec<Value>, RepoError> {
        params.to_positional(sql)?;
        self.record(sql, params);
        Ok(self.state.lock().unwrap().rows.pop_front().unwrap_or_default())
    }

    async fn fetch_strings(&self, sql: &str, params: &NamedParams) -> Result<Vec<String>, RepoError> {
        params.to_positional(sql)?;
        self.record(sql, params);
        Ok(self.state.lock().unwrap().strings.pop_front().unwrap_or_default())
    }

    async fn fetch_count(&self, sql: &str, params: &NamedParams) -> Result<i64, RepoError> {
        params.to_positional(sql)?;
        self.record(sql, params);
        Ok(self.state.lock().unwrap().count)
    }
}

#[derive(Default)]
struct CacheState {
    tables: HashMap<String, BTreeMap<String, String>>,
    ttls: HashMap<String, Duration>,
    writes: usize,
}

/// In-memory stand-in for the Redis hash cache.
#[derive(Clone, Default)]
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
    failing: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn seed(&self, table: &str, entities: &[Household]) {
        let mut state = self.state.lock().unwrap();
        let hash = state.tables.entry(table.to_string()).or_default();
        for entity in entities {
            hash.insert(entity.id.clone(), serde_json::to_string(entity).unwrap());
        }
    }

    pub fn cached_ids(&self, table: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cached(&self, table: &str, id: &str) -> Option<Household> {
        let state = self.state.lock().unwrap();
        let json = state.tables.get(table)?.get(id)?;
        Some(serde_json::from_str(json).unwrap())
    }

    pub fn ttl(&self, table: &str) -> Option<Duration> {
        self.state.lock().unwrap().ttls.get(table).copied()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Other {
                message: "cache unavailable".into(),
            });
        }
        Ok(())
    }
}

impl EntityCache for MemoryCache {
    async fn get_many(&self, table: &str, ids: &[String]) -> Result<Vec<Option<String>>, RepoError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let hash = state.tables.get(table);
        Ok(ids
            .iter()
            .map(|id| hash.and_then(|hash| hash.get(id).cloned()))
            .collect())
    }

    async fn put_many(&self, table: &str, entries: &[(String, String)], ttl: Duration) -> Result<(), RepoError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let hash = state.tables.entry(table.to_string()).or_default();
        for (id, json) in entries {
            hash.insert(id.clone(), json.clone());
        }
        state.ttls.insert(table.to_string(), ttl);
        state.writes += 1;
        Ok(())
    }

    async fn get_all(&self, table: &str) -> Result<Vec<(String, String)>, RepoError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .map(|hash| hash.iter().map(|(id, json)| (id.clone(), json.clone())).collect())
            .unwrap_or_default())
    }

    async fn evict(&self, table: &str) -> Result<bool, RepoError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.ttls.remove(table);
        Ok(state.tables.remove(table).is_some())
    }

    async fn time_to_live(&self, table: &str) -> Result<Option<Duration>, RepoError> {
        self.check()?;
        Ok(self.ttl(table))
    }
}

/// Collects published messages instead of sending them anywhere.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl TopicPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Other {
                message: "broker unavailable".into(),
            });
        }
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct LockState {
    keys: HashMap<String, String>,
}

/// All-or-nothing lock table kept in memory; leases only end through `expire`.
#[derive(Clone, Default)]
pub struct MemoryLockBackend {
    state: Arc<Mutex<LockState>>,
    acquire_attempts: Arc<AtomicUsize>,
}

impl MemoryLockBackend {
    /// Hold `key` for a foreign owner.
    pub fn hold(&self, key: &str, owner: &str) {
        self.state
            .lock()
            .unwrap()
            .keys
            .insert(key.to_string(), owner.to_string());
    }

    /// Drop `key` as if its lease had run out.
    pub fn expire(&self, key: &str) {
        self.state.lock().unwrap().keys.remove(key);
    }

    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().keys.get(key).cloned()
    }

    pub fn held_keys(&self) -> usize {
        self.state.lock().unwrap().keys.len()
    }

    pub fn acquire_attempts(&self) -> usize {
        self.acquire_attempts.load(Ordering::SeqCst)
    }
}

impl LockBackend for MemoryLockBackend {
    async fn try_acquire(&self, keys: &[String], owner: &str, _lease: Duration) -> Result<bool, RepoError> {
        self.acquire_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if keys.iter().any(|key| state.keys.contains_key(key)) {
            return Ok(false);
        }
        for key in keys {
            state.keys.insert(key.clone(), owner.to_string());
        }
        Ok(true)
    }

    async fn release(&self, keys: &[String], owner: &str) -> Result<usize, RepoError> {
        let mut state = self.state.lock().unwrap();
        let mut released = 0;
        for key in keys {
            if state.keys.get(key).map(String::as_str) == Some(owner) {
                state.keys.remove(key);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.owner_of(key))
    }
}

pub type HouseholdRepository =
    GenericRepository<Household, MockExecutor, JsonRowMapper, MemoryCache, RecordingPublisher>;

pub struct Fixture {
    pub repository: HouseholdRepository,
    pub executor: MockExecutor,
    pub cache: MemoryCache,
    pub publisher: RecordingPublisher,
}

pub fn fixture() -> Fixture {
    let executor = MockExecutor::default();
    let cache = MemoryCache::default();
    let publisher = RecordingPublisher::default();
    let repository = GenericRepository::new(
        "household",
        executor.clone(),
        JsonRowMapper,
        cache.clone(),
        publisher.clone(),
    )
    .expect("valid table name");
    Fixture {
        repository,
        executor,
        cache,
        publisher,
    }
}

pub fn rows(households: &[Household]) -> Vec<Value> {
    households.iter().map(Household::row).collect()
}
