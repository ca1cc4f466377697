//! The `Stream` entity (`spec.md` §3): a persisted lifecycle state machine
//! plus the committed frame counter. This module is the typed, compile-time
//! schema the source's dynamic attribute lookup is replaced with (`spec.md`
//! §9, "Dynamic entity registry").

use serde::{Deserialize, Serialize};

use crate::kv::{Field, Tx};
use crate::model::ids::{StreamId, TargetId};

pub const KIND: &str = "stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Stopped,
}

impl Status {
    fn as_field(self) -> Field {
        match self {
            Status::Ok => Field::Str("OK".to_owned()),
            Status::Stopped => Field::Str("STOPPED".to_owned()),
        }
    }

    fn from_field(f: Option<&Field>) -> Self {
        match f.map(Field::as_str) {
            Some("STOPPED") => Status::Stopped,
            _ => Status::Ok,
        }
    }
}

/// A read-only snapshot of a stream's persisted fields.
#[derive(Debug, Clone)]
pub struct StreamView {
    pub id: StreamId,
    pub target: TargetId,
    pub frames: i64,
    pub status: Status,
    pub error_count: i64,
}

/// Creates a `Stream` row with `frames = 0`, `status = OK`, `error_count = 0`.
/// Fails with `KvError::Exists` if the id is already present.
pub fn create(
    tx: &mut Tx,
    id: &StreamId,
    target: &TargetId,
) -> Result<(), crate::kv::KvError> {
    let mut fields = std::collections::HashMap::new();
    fields.insert("target".to_owned(), Field::Str(target.clone()));
    fields.insert("frames".to_owned(), Field::Int(0));
    fields.insert("status".to_owned(), Status::Ok.as_field());
    fields.insert("error_count".to_owned(), Field::Int(0));
    tx.create(KIND, id.as_str(), fields)
}

pub fn exists(tx: &Tx, id: &StreamId) -> bool {
    tx.exists(KIND, id.as_str())
}

pub fn get(tx: &Tx, id: &StreamId) -> Option<StreamView> {
    if !tx.exists(KIND, id.as_str()) {
        return None;
    }
    Some(StreamView {
        id: id.clone(),
        target: tx
            .hget(KIND, id.as_str(), "target")
            .map(Field::as_str)
            .unwrap_or_default()
            .to_owned(),
        frames: tx.hget(KIND, id.as_str(), "frames").map(Field::as_int).unwrap_or(0),
        status: Status::from_field(tx.hget(KIND, id.as_str(), "status")),
        error_count: tx
            .hget(KIND, id.as_str(), "error_count")
            .map(Field::as_int)
            .unwrap_or(0),
    })
}

pub fn frames(tx: &Tx, id: &StreamId) -> i64 {
    tx.hget(KIND, id.as_str(), "frames").map(Field::as_int).unwrap_or(0)
}

/// Advances the committed frame count by `delta` (`delta >= 0`, per the
/// frame-count monotonicity invariant, `spec.md` §8 property 1) and returns
/// the new total.
pub fn incr_frames(tx: &mut Tx, id: &StreamId, delta: i64) -> i64 {
    tx.hincrby(KIND, id.as_str(), "frames", delta)
}

pub fn status(tx: &Tx, id: &StreamId) -> Status {
    Status::from_field(tx.hget(KIND, id.as_str(), "status"))
}

pub fn set_status(tx: &mut Tx, id: &StreamId, status: Status) {
    tx.hset(KIND, id.as_str(), "status", status.as_field());
}

pub fn error_count(tx: &Tx, id: &StreamId) -> i64 {
    tx.hget(KIND, id.as_str(), "error_count").map(Field::as_int).unwrap_or(0)
}

pub fn incr_error_count(tx: &mut Tx, id: &StreamId) -> i64 {
    tx.hincrby(KIND, id.as_str(), "error_count", 1)
}

pub fn reset_error_count(tx: &mut Tx, id: &StreamId) {
    tx.hset(KIND, id.as_str(), "error_count", Field::Int(0));
}

pub fn target(tx: &Tx, id: &StreamId) -> TargetId {
    tx.hget(KIND, id.as_str(), "target")
        .map(Field::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Removes the stream's KV row. Callers are responsible for the disk
/// directory (`spec.md` §4.2, "removes disk dir (caller handles)").
pub fn delete(tx: &mut Tx, id: &StreamId) {
    tx.delete(KIND, id.as_str());
}

pub fn members(tx: &Tx) -> Vec<StreamId> {
    tx.members(KIND)
        .into_iter()
        .map(|s| s.parse().expect("StreamId parsing is infallible"))
        .collect()
}
