//! The `ActiveStream` entity (`spec.md` §3): exists iff a stream is
//! currently leased out to a core. Maintains the `auth_token -> stream_id`
//! secondary index synchronously with every create/delete, per the design
//! note in `spec.md` §9 ("Secondary indexes ... hot-path for every core
//! request").

use std::collections::HashSet;

use crate::kv::{Field, Tx};
use crate::model::ids::StreamId;

pub const KIND: &str = "active_stream";
const AUTH_TOKEN_INDEX: &str = "auth_token";

#[derive(Debug, Clone)]
pub struct ActiveStreamView {
    pub id: StreamId,
    pub auth_token: String,
    pub donor: Option<String>,
    pub buffer_frames: i64,
    pub total_frames: i64,
    pub start_time: i64,
    pub frame_hash: String,
}

/// Creates the `ActiveStream` row and registers `auth_token` in the
/// secondary index. Fails with `KvError::Exists` if the stream is already
/// active, or `KvError::IndexCollision` if `auth_token` collides with a
/// different active stream (it is minted fresh per activation, so this
/// should never happen in practice, but the invariant is still enforced;
/// `spec.md` §3, "auth_token is globally unique within the shard").
pub fn create(
    tx: &mut Tx,
    id: &StreamId,
    auth_token: &str,
    donor: Option<&str>,
    total_frames: i64,
    start_time: i64,
) -> Result<(), crate::kv::KvError> {
    tx.index_put(AUTH_TOKEN_INDEX, auth_token.to_owned(), id.as_str().to_owned())?;

    let mut fields = std::collections::HashMap::new();
    fields.insert("auth_token".to_owned(), Field::Str(auth_token.to_owned()));
    if let Some(donor) = donor {
        fields.insert("donor".to_owned(), Field::Str(donor.to_owned()));
    }
    fields.insert("buffer_frames".to_owned(), Field::Int(0));
    fields.insert("total_frames".to_owned(), Field::Int(total_frames));
    fields.insert("start_time".to_owned(), Field::Int(start_time));
    fields.insert("frame_hash".to_owned(), Field::Str(String::new()));

    if let Err(err) = tx.create(KIND, id.as_str(), fields) {
        tx.index_remove(AUTH_TOKEN_INDEX, auth_token);
        return Err(err);
    }
    Ok(())
}

pub fn exists(tx: &Tx, id: &StreamId) -> bool {
    tx.exists(KIND, id.as_str())
}

pub fn lookup_by_token(tx: &Tx, auth_token: &str) -> Option<StreamId> {
    tx.index_get(AUTH_TOKEN_INDEX, auth_token)
        .map(|s| s.parse().expect("StreamId parsing is infallible"))
}

pub fn get(tx: &Tx, id: &StreamId) -> Option<ActiveStreamView> {
    if !tx.exists(KIND, id.as_str()) {
        return None;
    }
    Some(ActiveStreamView {
        id: id.clone(),
        auth_token: tx
            .hget(KIND, id.as_str(), "auth_token")
            .map(Field::as_str)
            .unwrap_or_default()
            .to_owned(),
        donor: tx
            .hget(KIND, id.as_str(), "donor")
            .map(|f| f.as_str().to_owned()),
        buffer_frames: tx
            .hget(KIND, id.as_str(), "buffer_frames")
            .map(Field::as_int)
            .unwrap_or(0),
        total_frames: tx
            .hget(KIND, id.as_str(), "total_frames")
            .map(Field::as_int)
            .unwrap_or(0),
        start_time: tx
            .hget(KIND, id.as_str(), "start_time")
            .map(Field::as_int)
            .unwrap_or(0),
        frame_hash: tx
            .hget(KIND, id.as_str(), "frame_hash")
            .map(Field::as_str)
            .unwrap_or_default()
            .to_owned(),
    })
}

pub fn buffer_frames(tx: &Tx, id: &StreamId) -> i64 {
    tx.hget(KIND, id.as_str(), "buffer_frames").map(Field::as_int).unwrap_or(0)
}

pub fn incr_buffer_frames(tx: &mut Tx, id: &StreamId, delta: i64) -> i64 {
    tx.hincrby(KIND, id.as_str(), "buffer_frames", delta)
}

pub fn reset_buffer_frames(tx: &mut Tx, id: &StreamId) {
    tx.hset(KIND, id.as_str(), "buffer_frames", Field::Int(0));
}

pub fn incr_total_frames(tx: &mut Tx, id: &StreamId, delta: i64) -> i64 {
    tx.hincrby(KIND, id.as_str(), "total_frames", delta)
}

pub fn frame_hash(tx: &Tx, id: &StreamId) -> String {
    tx.hget(KIND, id.as_str(), "frame_hash")
        .map(Field::as_str)
        .unwrap_or_default()
        .to_owned()
}

pub fn set_frame_hash(tx: &mut Tx, id: &StreamId, hash: &str) {
    tx.hset(KIND, id.as_str(), "frame_hash", Field::Str(hash.to_owned()));
}

pub fn buffer_files(tx: &Tx, id: &StreamId) -> HashSet<String> {
    tx.smembers(KIND, id.as_str(), "buffer_files")
}

pub fn add_buffer_file(tx: &mut Tx, id: &StreamId, name: &str) {
    tx.sadd(KIND, id.as_str(), "buffer_files", name.to_owned());
}

/// Clears `buffer_files`, returning its prior contents (`spec.md` §4.3
/// step 4, "Clear buffer_files").
pub fn clear_buffer_files(tx: &mut Tx, id: &StreamId) -> HashSet<String> {
    tx.sremall(KIND, id.as_str(), "buffer_files")
}

/// Deletes the `ActiveStream` row and scrubs its `auth_token` from the
/// secondary index (`spec.md` §3 invariant: the index is bijective on
/// active streams).
pub fn delete(tx: &mut Tx, id: &StreamId) {
    if let Some(token) = tx.hget(KIND, id.as_str(), "auth_token").map(Field::as_str).map(str::to_owned) {
        tx.index_remove(AUTH_TOKEN_INDEX, &token);
    }
    tx.delete(KIND, id.as_str());
}
