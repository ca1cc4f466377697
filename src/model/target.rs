//! The `Target` entity (`spec.md` §3): a back-reference set of streams plus
//! the priority queue used for activation (`spec.md` §4.2).
//!
//! `Target <-> Stream` is a bidirectional relation (`spec.md` §9, "Cyclic
//! back-references"): a target's `streams` set and a stream's `target`
//! scalar are kept in sync by the two functions below, rather than by a
//! generic `relate()` primitive -- the source's dynamic relation facility
//! collapses into a couple of typed functions once the schema is fixed at
//! compile time.

use std::collections::HashSet;

use crate::kv::Tx;
use crate::model::ids::{StreamId, TargetId};
use crate::model::stream;

pub const KIND: &str = "target";

fn queue_name(target_id: &str) -> String {
    format!("queue:{target_id}")
}

pub fn exists(tx: &Tx, target_id: &TargetId) -> bool {
    tx.exists(KIND, target_id)
}

/// Creates the target row if it doesn't already exist. Idempotent, per the
/// "implicit assumption" design note (`spec.md` §9): a target exists on
/// this shard iff it has >= 1 stream here, so creation always happens as a
/// side effect of assigning it a first stream rather than as a standalone
/// API call.
pub fn ensure(tx: &mut Tx, target_id: &TargetId) {
    if !tx.exists(KIND, target_id) {
        let _ = tx.create(KIND, target_id, Default::default());
    }
}

/// Adds `stream_id` to `target_id`'s `streams` set and points the stream's
/// `target` scalar back at it. Assumes the `Target` row already exists
/// (call `ensure` first).
pub fn add_stream(tx: &mut Tx, target_id: &TargetId, stream_id: &StreamId) {
    tx.sadd(KIND, target_id, "streams", stream_id.as_str().to_owned());
}

/// Removes `stream_id` from `target_id`'s `streams` set. Returns `true` if
/// the target now owns zero streams on this shard, in which case the
/// caller MAY delete the target (`spec.md` §9).
pub fn remove_stream(tx: &mut Tx, target_id: &TargetId, stream_id: &StreamId) -> bool {
    tx.srem(KIND, target_id, "streams", stream_id.as_str());
    tx.smembers(KIND, target_id, "streams").is_empty()
}

pub fn streams(tx: &Tx, target_id: &TargetId) -> HashSet<StreamId> {
    tx.smembers(KIND, target_id, "streams")
        .into_iter()
        .map(|s| s.parse().expect("StreamId parsing is infallible"))
        .collect()
}

pub fn delete(tx: &mut Tx, target_id: &TargetId) {
    tx.delete(KIND, target_id);
}

// -- queue --

/// Adds `stream_id` to the target's queue with the given priority score
/// (lower = sooner to be handed out, but see `dequeue_highest`, which pops
/// the *highest* score to match the source's `zrevpop`; `spec.md` §4.2).
pub fn enqueue(tx: &mut Tx, target_id: &TargetId, stream_id: &StreamId, score: f64) {
    tx.zadd(&queue_name(target_id), stream_id.as_str().to_owned(), score);
}

pub fn remove_from_queue(tx: &mut Tx, target_id: &TargetId, stream_id: &StreamId) {
    tx.zrem(&queue_name(target_id), stream_id.as_str());
}

/// Pops the highest-scoring (most advanced) queued stream, per the
/// activation tie-break rule in `spec.md` §4.2.
pub fn dequeue_highest(tx: &mut Tx, target_id: &TargetId) -> Option<StreamId> {
    let (member, _score) = tx.zrevpop(&queue_name(target_id))?;
    Some(member.parse().expect("StreamId parsing is infallible"))
}

pub fn queue_len(tx: &Tx, target_id: &TargetId) -> usize {
    tx.scard(&queue_name(target_id))
}

/// Re-enqueues `stream_id` at its current committed frame count, the score
/// used by every transition except initial creation (`spec.md` §4.2, §4.5).
pub fn enqueue_at_frames(tx: &mut Tx, target_id: &TargetId, stream_id: &StreamId) {
    let frames = stream::frames(tx, stream_id);
    enqueue(tx, target_id, stream_id, frames as f64);
}
