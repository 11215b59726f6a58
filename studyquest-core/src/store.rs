//! Transactional document store seam.
//!
//! The engine talks to persistence only through [`DocumentStore`]: a document
//! database addressed by slash-separated paths, with field-level sentinels
//! (increment, server timestamp, delete) and optimistic transactions that are
//! re-executed when a document they read changed before commit.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and the
//! tester binary. It validates read versions at commit, retries conflicting
//! transactions, and supports fault injection.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::constants::{DEBUG_ENV_VAR, MAX_TRANSACTION_ATTEMPTS};

#[cfg(debug_assertions)]
fn debug_log_enabled() -> bool {
    matches!(std::env::var(DEBUG_ENV_VAR), Ok(val) if val != "0")
}

#[cfg(not(debug_assertions))]
const fn debug_log_enabled() -> bool {
    false
}

pub const PARTIES: &str = "parties";
pub const USERS: &str = "users";

/// Members sub-collection of a party.
#[must_use]
pub fn members_collection(party_id: &str) -> String {
    format!("{PARTIES}/{party_id}/members")
}

/// Slash-separated path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPath(String);

impl DocPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn user(user_id: &str) -> Self {
        Self(format!("{USERS}/{user_id}"))
    }

    #[must_use]
    pub fn daily_session(user_id: &str, day_key: &str) -> Self {
        Self(format!("{USERS}/{user_id}/dailySessions/{day_key}"))
    }

    #[must_use]
    pub fn party(party_id: &str) -> Self {
        Self(format!("{PARTIES}/{party_id}"))
    }

    #[must_use]
    pub fn member(party_id: &str, user_id: &str) -> Self {
        Self(format!("{}/{user_id}", members_collection(party_id)))
    }

    #[must_use]
    pub fn weekly_entry(week_id: &str, user_id: &str) -> Self {
        Self(format!("leaderboards/weekly/{week_id}/{user_id}"))
    }

    #[must_use]
    pub fn monthly_entry(month_id: &str, user_id: &str) -> Self {
        Self(format!("leaderboards/monthly/{month_id}/{user_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Collection containing this document.
    #[must_use]
    pub fn collection(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(parent, _)| parent)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single field mutation. Dotted field names address nested objects.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Set(Value),
    Increment(i64),
    ServerTimestamp,
    Delete,
}

/// Field-level mutation applied by `merge` and `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, FieldWrite>,
}

impl Patch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .insert(field.to_string(), FieldWrite::Set(value.into()));
        self
    }

    #[must_use]
    pub fn increment(mut self, field: &str, by: i64) -> Self {
        self.fields
            .insert(field.to_string(), FieldWrite::Increment(by));
        self
    }

    #[must_use]
    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.fields
            .insert(field.to_string(), FieldWrite::ServerTimestamp);
        self
    }

    #[must_use]
    pub fn delete(mut self, field: &str) -> Self {
        self.fields.insert(field.to_string(), FieldWrite::Delete);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldWrite)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn apply(&self, path: &str, doc: &mut Value, now: DateTime<Utc>) -> Result<(), StoreError> {
        for (field, write) in &self.fields {
            let (parent, leaf) = parent_object(path, doc, field)?;
            match write {
                FieldWrite::Set(value) => {
                    parent.insert(leaf.to_string(), value.clone());
                }
                FieldWrite::Increment(by) => {
                    let current = match parent.get(leaf) {
                        None | Some(Value::Null) => 0,
                        Some(Value::Number(n)) => n
                            .as_i64()
                            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
                            .ok_or_else(|| StoreError::NotNumeric {
                                path: path.to_string(),
                                field: field.clone(),
                            })?,
                        Some(_) => {
                            return Err(StoreError::NotNumeric {
                                path: path.to_string(),
                                field: field.clone(),
                            });
                        }
                    };
                    parent.insert(leaf.to_string(), Value::from(current.saturating_add(*by)));
                }
                FieldWrite::ServerTimestamp => {
                    parent.insert(leaf.to_string(), Value::String(now.to_rfc3339()));
                }
                FieldWrite::Delete => {
                    parent.remove(leaf);
                }
            }
        }
        Ok(())
    }
}

/// Walk (and create) the objects along a dotted field path.
fn parent_object<'a, 'f>(
    path: &str,
    doc: &'a mut Value,
    field: &'f str,
) -> Result<(&'a mut Map<String, Value>, &'f str), StoreError> {
    let (parents, leaf) = field
        .rsplit_once('.')
        .map_or((None, field), |(p, l)| (Some(p), l));
    let mut node = doc;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let Value::Object(object) = node else {
            return Err(StoreError::NotAnObject {
                path: path.to_string(),
                field: segment.to_string(),
            });
        };
        let child = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if child.is_null() {
            *child = Value::Object(Map::new());
        }
        node = child;
    }
    match node {
        Value::Object(object) => Ok((object, leaf)),
        _ => Err(StoreError::NotAnObject {
            path: path.to_string(),
            field: field.to_string(),
        }),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("transaction conflict on {path}")]
    Conflict { path: String },
    #[error("transaction abandoned after {attempts} conflicting attempts")]
    Contention { attempts: u32 },
    #[error("read of {path} after a buffered write; transactions must read before writing")]
    ReadAfterWrite { path: String },
    #[error("cannot update missing document {path}")]
    MissingDocument { path: String },
    #[error("field {field} of {path} is not numeric")]
    NotNumeric { path: String, field: String },
    #[error("field {field} of {path} is not an object")]
    NotAnObject { path: String, field: String },
    #[error("injected write failure at {path}")]
    Injected { path: String },
    #[error("store state poisoned by a panicked writer")]
    Poisoned,
}

impl StoreError {
    /// Conflicts and contention resolve themselves when the operation is retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Contention { .. })
    }
}

/// Body-side view of an in-flight transaction. Writes are buffered and only
/// applied if the whole body succeeds and no read went stale.
pub trait Transaction {
    /// # Errors
    ///
    /// Returns [`StoreError::ReadAfterWrite`] once any write has been buffered.
    fn get(&mut self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    /// Direct children of `collection`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadAfterWrite`] once any write has been buffered.
    fn list(&mut self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    fn set(&mut self, path: &DocPath, data: Value);
    /// Upsert: creates the document when absent.
    fn merge(&mut self, path: &DocPath, patch: Patch);
    /// Fails the commit when the document is absent.
    fn update(&mut self, path: &DocPath, patch: Patch);
    fn delete(&mut self, path: &DocPath);
}

pub trait DocumentStore: Send + Sync {
    /// Run `body` atomically, re-executing it when a read went stale.
    ///
    /// # Errors
    ///
    /// Returns the body's error (nothing is written), or a store error when
    /// commit fails or contention outlasts the retry budget.
    fn run_transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>;

    /// Fresh document id inside `collection`.
    fn allocate_id(&self, collection: &str) -> String;

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        self.run_transaction(|tx| tx.get(path))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.run_transaction(|tx| tx.list(collection))
    }

    /// # Errors
    ///
    /// Returns an error if the write cannot be committed.
    fn set(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        self.run_transaction(|tx| {
            tx.set(path, data.clone());
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the write cannot be committed.
    fn merge(&self, path: &DocPath, patch: Patch) -> Result<(), StoreError> {
        self.run_transaction(|tx| {
            tx.merge(path, patch.clone());
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns [`StoreError::MissingDocument`] if the document does not exist.
    fn update(&self, path: &DocPath, patch: Patch) -> Result<(), StoreError> {
        self.run_transaction(|tx| {
            tx.update(path, patch.clone());
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the delete cannot be committed.
    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.run_transaction(|tx| {
            tx.delete(path);
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
enum Write {
    Set(Value),
    Merge(Patch),
    Update(Patch),
    Delete,
}

#[derive(Debug, Default)]
struct Faults {
    failing_prefixes: Vec<String>,
    pending_conflicts: u32,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, Value>,
    versions: HashMap<String, u64>,
    collection_versions: HashMap<String, u64>,
    stamp: u64,
    next_id: u64,
    commits: u64,
    retries: u64,
    faults: Faults,
}

impl Inner {
    fn version_of(&self, path: &str) -> u64 {
        self.versions.get(path).copied().unwrap_or(0)
    }

    fn collection_version_of(&self, collection: &str) -> u64 {
        self.collection_versions.get(collection).copied().unwrap_or(0)
    }

    fn children(&self, collection: &str) -> Vec<(String, Value)> {
        let prefix = format!("{collection}/");
        self.docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, doc)| {
                let id = &path[prefix.len()..];
                (!id.contains('/')).then(|| (id.to_string(), doc.clone()))
            })
            .collect()
    }
}

/// Thread-safe in-memory [`DocumentStore`] with optimistic concurrency.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Store whose server timestamps come from `clock`.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock: Arc::new(clock),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Make every commit that writes under `prefix` fail.
    pub fn fail_writes_under(&self, prefix: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.faults.failing_prefixes.push(prefix.to_string());
        }
    }

    /// Force the next `count` commits to report a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        if let Ok(mut inner) = self.lock() {
            inner.faults.pending_conflicts = inner.faults.pending_conflicts.saturating_add(count);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.faults = Faults::default();
        }
    }

    /// Copy of every stored document keyed by path.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock().map(|inner| inner.docs.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.lock().map_or(0, |inner| inner.commits)
    }

    #[must_use]
    pub fn retry_count(&self) -> u64 {
        self.lock().map_or(0, |inner| inner.retries)
    }

    fn commit(&self, tx: MemoryTransaction<'_>) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.faults.pending_conflicts > 0 {
            inner.faults.pending_conflicts -= 1;
            return Err(StoreError::Conflict {
                path: String::from("<injected>"),
            });
        }
        for (path, version) in &tx.reads {
            if inner.version_of(path) != *version {
                return Err(StoreError::Conflict { path: path.clone() });
            }
        }
        for (collection, version) in &tx.collection_reads {
            if inner.collection_version_of(collection) != *version {
                return Err(StoreError::Conflict {
                    path: collection.clone(),
                });
            }
        }
        if tx.writes.is_empty() {
            return Ok(());
        }
        if let Some((path, _)) = tx.writes.iter().find(|(path, _)| {
            inner
                .faults
                .failing_prefixes
                .iter()
                .any(|prefix| path.as_str().starts_with(prefix.as_str()))
        }) {
            return Err(StoreError::Injected {
                path: path.to_string(),
            });
        }

        // Stage every write first so a failing one leaves the store untouched.
        let now = self.clock.now();
        let mut staged: BTreeMap<String, Option<Value>> = BTreeMap::new();
        for (path, write) in &tx.writes {
            let key = path.as_str();
            let current = match staged.get(key) {
                Some(value) => value.clone(),
                None => inner.docs.get(key).cloned(),
            };
            if debug_log_enabled() {
                log::debug!("commit {key}: {write:?}");
            }
            let next = match write {
                Write::Set(value) => Some(value.clone()),
                Write::Merge(patch) => {
                    let mut doc = current.unwrap_or_else(|| Value::Object(Map::new()));
                    patch.apply(key, &mut doc, now)?;
                    Some(doc)
                }
                Write::Update(patch) => {
                    let Some(mut doc) = current else {
                        return Err(StoreError::MissingDocument {
                            path: key.to_string(),
                        });
                    };
                    patch.apply(key, &mut doc, now)?;
                    Some(doc)
                }
                Write::Delete => None,
            };
            staged.insert(key.to_string(), next);
        }

        inner.stamp += 1;
        let stamp = inner.stamp;
        for (path, next) in staged {
            let collection = DocPath::new(path.clone()).collection().to_string();
            let membership_changed = match next {
                Some(doc) => inner.docs.insert(path.clone(), doc).is_none(),
                None => inner.docs.remove(&path).is_some(),
            };
            if membership_changed {
                inner.collection_versions.insert(collection, stamp);
            }
            inner.versions.insert(path, stamp);
        }
        inner.commits += 1;
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn run_transaction<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut tx = MemoryTransaction::new(self);
            let value = body(&mut tx)?;
            match self.commit(tx) {
                Ok(()) => return Ok(value),
                Err(StoreError::Conflict { path }) => {
                    log::debug!("transaction attempt {attempt} conflicted on {path}; retrying");
                    if let Ok(mut inner) = self.lock() {
                        inner.retries += 1;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Contention {
            attempts: MAX_TRANSACTION_ATTEMPTS,
        }
        .into())
    }

    fn allocate_id(&self, collection: &str) -> String {
        let tail = collection.rsplit('/').next().unwrap_or(collection);
        let next = self.lock().map_or(0, |mut inner| {
            inner.next_id += 1;
            inner.next_id
        });
        format!("{tail}-{next:04}")
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    reads: HashMap<String, u64>,
    collection_reads: HashMap<String, u64>,
    writes: Vec<(DocPath, Write)>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            collection_reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    fn ensure_read_phase(&self, path: &str) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            Ok(())
        } else {
            Err(StoreError::ReadAfterWrite {
                path: path.to_string(),
            })
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&mut self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        self.ensure_read_phase(path.as_str())?;
        let inner = self.store.lock()?;
        self.reads
            .entry(path.as_str().to_string())
            .or_insert_with(|| inner.version_of(path.as_str()));
        Ok(inner.docs.get(path.as_str()).cloned())
    }

    fn list(&mut self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.ensure_read_phase(collection)?;
        let inner = self.store.lock()?;
        self.collection_reads
            .entry(collection.to_string())
            .or_insert_with(|| inner.collection_version_of(collection));
        let children = inner.children(collection);
        for (id, _) in &children {
            let path = format!("{collection}/{id}");
            let version = inner.version_of(&path);
            self.reads.entry(path).or_insert(version);
        }
        Ok(children)
    }

    fn set(&mut self, path: &DocPath, data: Value) {
        self.writes.push((path.clone(), Write::Set(data)));
    }

    fn merge(&mut self, path: &DocPath, patch: Patch) {
        self.writes.push((path.clone(), Write::Merge(patch)));
    }

    fn update(&mut self, path: &DocPath, patch: Patch) {
        self.writes.push((path.clone(), Write::Update(patch)));
    }

    fn delete(&mut self, path: &DocPath) {
        self.writes.push((path.clone(), Write::Delete));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn counter_path() -> DocPath {
        DocPath::new("counters/global")
    }

    #[test]
    fn paths_expose_collection_and_id() {
        let path = DocPath::member("p1", "u7");
        assert_eq!(path.as_str(), "parties/p1/members/u7");
        assert_eq!(path.collection(), "parties/p1/members");
        assert_eq!(path.id(), "u7");
        assert_eq!(
            DocPath::weekly_entry("2024-W09", "u7").as_str(),
            "leaderboards/weekly/2024-W09/u7"
        );
    }

    #[test]
    fn merge_creates_and_increments_nested_fields() {
        let store = MemoryStore::new();
        let path = counter_path();
        store
            .merge(&path, Patch::new().increment("totals.exp", 10).set("name", "a"))
            .unwrap();
        store
            .merge(&path, Patch::new().increment("totals.exp", 5))
            .unwrap();
        let doc = store.get(&path).unwrap().unwrap();
        assert_eq!(doc["totals"]["exp"], json!(15));
        assert_eq!(doc["name"], json!("a"));
    }

    #[test]
    fn update_requires_existing_document() {
        let store = MemoryStore::new();
        let err = store
            .update(&counter_path(), Patch::new().set("x", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingDocument { .. }));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn increment_rejects_non_numeric_fields() {
        let store = MemoryStore::new();
        store.set(&counter_path(), json!({"value": "text"})).unwrap();
        let err = store
            .update(&counter_path(), Patch::new().increment("value", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotNumeric { .. }));
    }

    #[test]
    fn delete_field_and_document() {
        let store = MemoryStore::new();
        store.set(&counter_path(), json!({"a": 1, "b": 2})).unwrap();
        store
            .update(&counter_path(), Patch::new().delete("a"))
            .unwrap();
        assert_eq!(store.get(&counter_path()).unwrap(), Some(json!({"b": 2})));
        store.delete(&counter_path()).unwrap();
        assert_eq!(store.get(&counter_path()).unwrap(), None);
    }

    #[test]
    fn reads_after_writes_are_rejected() {
        let store = MemoryStore::new();
        let result: Result<(), StoreError> = store.run_transaction(|tx| {
            tx.set(&counter_path(), json!({"n": 1}));
            tx.get(&counter_path())?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::ReadAfterWrite { .. })));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_writes_under("audit/");
        let result: Result<(), StoreError> = store.run_transaction(|tx| {
            tx.set(&counter_path(), json!({"n": 1}));
            tx.set(&DocPath::new("audit/entry"), json!({"ok": true}));
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Injected { .. })));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn injected_conflicts_are_retried() {
        let store = MemoryStore::new();
        store.inject_conflicts(2);
        let mut runs = 0;
        let result: Result<(), StoreError> = store.run_transaction(|tx| {
            runs += 1;
            tx.merge(&counter_path(), Patch::new().increment("n", 1));
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(runs, 3);
        assert_eq!(store.retry_count(), 2);
        assert_eq!(store.get(&counter_path()).unwrap().unwrap()["n"], json!(1));
    }

    #[test]
    fn persistent_contention_gives_up() {
        let store = MemoryStore::new();
        store.inject_conflicts(MAX_TRANSACTION_ATTEMPTS);
        let result: Result<(), StoreError> = store.run_transaction(|tx| {
            tx.merge(&counter_path(), Patch::new().increment("n", 1));
            Ok(())
        });
        assert_eq!(
            result,
            Err(StoreError::Contention {
                attempts: MAX_TRANSACTION_ATTEMPTS
            })
        );
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn list_returns_direct_children_only() {
        let store = MemoryStore::new();
        store.set(&DocPath::party("a"), json!({})).unwrap();
        store.set(&DocPath::party("b"), json!({})).unwrap();
        store.set(&DocPath::member("a", "u1"), json!({})).unwrap();
        let ids: Vec<String> = store.list(PARTIES).unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.list(&members_collection("a")).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_read_modify_write_loses_no_updates() {
        let store = Arc::new(MemoryStore::new());
        store.set(&counter_path(), json!({"n": 0})).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let mut attempts = 0;
                        loop {
                            let result: Result<(), StoreError> = store.run_transaction(|tx| {
                                let doc = tx.get(&counter_path())?.unwrap_or_default();
                                let n = doc["n"].as_i64().unwrap_or(0);
                                tx.set(&counter_path(), json!({"n": n + 1}));
                                Ok(())
                            });
                            match result {
                                Ok(()) => break,
                                Err(StoreError::Contention { .. }) if attempts < 50 => {
                                    attempts += 1;
                                }
                                Err(err) => panic!("unexpected store error: {err}"),
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get(&counter_path()).unwrap().unwrap()["n"], json!(80));
    }

    #[test]
    fn allocated_ids_are_unique() {
        let store = MemoryStore::new();
        let a = store.allocate_id(PARTIES);
        let b = store.allocate_id(PARTIES);
        assert_ne!(a, b);
        assert!(a.starts_with("parties-"));
    }
}
