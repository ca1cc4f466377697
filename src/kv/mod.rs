//! A small in-process KV store providing hashes, string-sets, and sorted
//! sets with atomic multi-op pipelines.
//!
//! This is the leaf of the component stack in `SPEC_FULL.md` §2: everything
//! above it (the `model` module's typed entities) is a thin, schema-aware
//! wrapper that never touches raw field names or `Field` values directly
//! outside of this crate boundary.
//!
//! A single `std::sync::Mutex` guards the whole store. That is the
//! "atomic pipeline" primitive: a `pipeline` closure runs with the lock
//! held, so a reader can never observe half of a multi-field mutation.
//! This mirrors the source system's reliance on a single external KV
//! store for that guarantee (`SPEC_FULL.md` §A, `spec.md` §4.1, §5).

pub mod error;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

pub use error::KvError;

/// A single scalar field value stored in a hash.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i64),
    Str(String),
}

impl Field {
    pub fn as_int(&self) -> i64 {
        match self {
            Field::Int(v) => *v,
            Field::Str(s) => s.parse().unwrap_or(0),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Field::Str(s) => s.as_str(),
            Field::Int(_) => "",
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Field::Str(s) => s,
            Field::Int(v) => v.to_string(),
        }
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Int(v)
    }
}

impl From<u32> for Field {
    fn from(v: u32) -> Self {
        Field::Int(v as i64)
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Str(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Str(v.to_owned())
    }
}

type Row = HashMap<String, Field>;

#[derive(Default)]
struct Inner {
    /// "<kind>:<id>" -> hash fields
    hashes: HashMap<String, Row>,
    /// "<kind>:<id>:<field>" -> set members
    sets: HashMap<String, HashSet<String>>,
    /// zset name -> member -> score
    zsets: HashMap<String, BTreeMap<String, f64>>,
    /// entity kind -> ids of that kind (backs `Entity::members`)
    members: HashMap<&'static str, HashSet<String>>,
    /// index name -> value -> id (backs `Entity::add_lookup`/`lookup`)
    indexes: HashMap<&'static str, HashMap<String, String>>,
}

fn row_key(kind: &str, id: &str) -> String {
    format!("{kind}:{id}")
}

fn set_key(kind: &str, id: &str, field: &str) -> String {
    format!("{kind}:{id}:{field}")
}

/// The store. Cheap to clone (wrap in `Arc`); all state lives behind the
/// internal mutex.
pub struct Kv {
    inner: Mutex<Inner>,
}

impl Kv {
    pub fn new() -> Self {
        Kv {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Run a batch of mutations with the store lock held for the whole
    /// closure. Every op inside `f` is visible to subsequent readers
    /// together, or (on early return via `?`) none of the ops past the
    /// failure point take effect on the ops that follow it in program
    /// order, but ops already applied inside the closure are not rolled
    /// back -- exactly as in the source, where a pipeline is a batch of
    /// unconditional writes, not a database transaction. Callers that need
    /// all-or-nothing semantics order their checks (e.g. existence) before
    /// their writes within the same pipeline.
    pub fn pipeline<R>(&self, f: impl FnOnce(&mut Tx) -> Result<R, KvError>) -> Result<R, KvError> {
        let mut guard = self.inner.lock().expect("kv store mutex poisoned");
        let mut tx = Tx { inner: &mut guard };
        f(&mut tx)
    }

    /// Convenience for a single read-only operation.
    pub fn read<R>(&self, f: impl FnOnce(&Tx) -> R) -> R {
        let guard = self.inner.lock().expect("kv store mutex poisoned");
        let tx = Tx { inner: &guard };
        f(&tx)
    }
}

impl Default for Kv {
    fn default() -> Self {
        Self::new()
    }
}

/// A transaction handle. Obtained only inside `Kv::pipeline`/`Kv::read`, so
/// every method call here is already covered by the store-wide lock.
pub struct Tx<'a> {
    inner: &'a mut Inner,
}

impl<'a> Tx<'a> {
    // -- entity existence / membership --

    pub fn create(&mut self, kind: &'static str, id: &str, fields: Row) -> Result<(), KvError> {
        let key = row_key(kind, id);
        if self.inner.hashes.contains_key(&key) {
            return Err(KvError::Exists {
                kind,
                id: id.to_owned(),
            });
        }
        self.inner.hashes.insert(key, fields);
        self.inner
            .members
            .entry(kind)
            .or_default()
            .insert(id.to_owned());
        Ok(())
    }

    pub fn exists(&self, kind: &'static str, id: &str) -> bool {
        self.inner.hashes.contains_key(&row_key(kind, id))
    }

    pub fn members(&self, kind: &'static str) -> Vec<String> {
        self.inner
            .members
            .get(kind)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every hash field and set under `(kind, id)`. Secondary
    /// indexes are not scrubbed here -- callers that declared a lookup
    /// must remove it explicitly via `index_remove`, because only the
    /// entity layer knows which field value was indexed.
    pub fn delete(&mut self, kind: &'static str, id: &str) {
        let key = row_key(kind, id);
        self.inner.hashes.remove(&key);
        if let Some(ids) = self.inner.members.get_mut(kind) {
            ids.remove(id);
        }
        let prefix = format!("{key}:");
        self.inner.sets.retain(|k, _| !k.starts_with(&prefix));
    }

    // -- hash fields --

    pub fn hget(&self, kind: &'static str, id: &str, field: &str) -> Option<&Field> {
        self.inner.hashes.get(&row_key(kind, id))?.get(field)
    }

    pub fn hset(&mut self, kind: &'static str, id: &str, field: &str, value: Field) {
        self.inner
            .hashes
            .entry(row_key(kind, id))
            .or_default()
            .insert(field.to_owned(), value);
    }

    pub fn hincrby(&mut self, kind: &'static str, id: &str, field: &str, delta: i64) -> i64 {
        let row = self.inner.hashes.entry(row_key(kind, id)).or_default();
        let next = match row.get(field) {
            Some(v) => v.as_int() + delta,
            None => delta,
        };
        row.insert(field.to_owned(), Field::Int(next));
        next
    }

    // -- string sets --

    pub fn sadd(&mut self, kind: &'static str, id: &str, field: &str, member: String) -> bool {
        self.inner
            .sets
            .entry(set_key(kind, id, field))
            .or_default()
            .insert(member)
    }

    pub fn srem(&mut self, kind: &'static str, id: &str, field: &str, member: &str) -> bool {
        match self.inner.sets.get_mut(&set_key(kind, id, field)) {
            Some(set) => set.remove(member),
            None => false,
        }
    }

    pub fn smembers(&self, kind: &'static str, id: &str, field: &str) -> HashSet<String> {
        self.inner
            .sets
            .get(&set_key(kind, id, field))
            .cloned()
            .unwrap_or_default()
    }

    /// Clear the set and return its prior contents. Used for `buffer_files`
    /// churn in the frame-append path (`spec.md` §4.3 step 4).
    pub fn sremall(&mut self, kind: &'static str, id: &str, field: &str) -> HashSet<String> {
        self.inner
            .sets
            .remove(&set_key(kind, id, field))
            .unwrap_or_default()
    }

    // -- sorted sets --

    pub fn zadd(&mut self, zset: &str, member: String, score: f64) {
        self.inner
            .zsets
            .entry(zset.to_owned())
            .or_default()
            .insert(member, score);
    }

    pub fn zrem(&mut self, zset: &str, member: &str) -> bool {
        match self.inner.zsets.get_mut(zset) {
            Some(m) => m.remove(member).is_some(),
            None => false,
        }
    }

    pub fn zscore(&self, zset: &str, member: &str) -> Option<f64> {
        self.inner.zsets.get(zset)?.get(member).copied()
    }

    /// Pop and return the highest-scoring member, breaking ties on member
    /// name for determinism. `None` if the set is empty.
    pub fn zrevpop(&mut self, zset: &str) -> Option<(String, f64)> {
        let set = self.inner.zsets.get_mut(zset)?;
        let (member, score) = set
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap().then(a.0.cmp(b.0)))
            .map(|(m, s)| (m.clone(), *s))?;
        set.remove(&member);
        Some((member, score))
    }

    /// All `(member, score)` pairs with `score <= max_score`, used by the
    /// lease reaper to find expired heartbeats (`spec.md` §4.6).
    pub fn zrange_le(&self, zset: &str, max_score: f64) -> Vec<(String, f64)> {
        match self.inner.zsets.get(zset) {
            Some(set) => set
                .iter()
                .filter(|(_, s)| **s <= max_score)
                .map(|(m, s)| (m.clone(), *s))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn scard(&self, zset: &str) -> usize {
        self.inner.zsets.get(zset).map(BTreeMap::len).unwrap_or(0)
    }

    // -- secondary indexes --

    /// Insert `value -> id` into `index`, failing if `value` is already
    /// claimed by a different id (enforces injectivity, `spec.md` §4.1).
    pub fn index_put(&mut self, index: &'static str, value: String, id: String) -> Result<(), KvError> {
        let table = self.inner.indexes.entry(index).or_default();
        match table.get(&value) {
            Some(existing) if existing != &id => Err(KvError::IndexCollision { index, value }),
            _ => {
                table.insert(value, id);
                Ok(())
            }
        }
    }

    pub fn index_get(&self, index: &'static str, value: &str) -> Option<String> {
        self.inner.indexes.get(index)?.get(value).cloned()
    }

    pub fn index_remove(&mut self, index: &'static str, value: &str) {
        if let Some(table) = self.inner.indexes.get_mut(index) {
            table.remove(value);
        }
    }
}
