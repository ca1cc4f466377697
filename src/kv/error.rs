use thiserror::Error;

/// Errors raised by the in-process KV store.
///
/// These are internal to a single shard process (the store never talks to
/// the network or disk), so the only failure modes are logic errors: a
/// double-create, a missing row, or a secondary index collision.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KvError {
    #[error("{kind} {id} already exists")]
    Exists { kind: &'static str, id: String },

    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: String },

    #[error("value {value} is already indexed under {index}")]
    IndexCollision { index: &'static str, value: String },

    /// A state-machine precondition failed inside a pipeline (e.g. stopping
    /// a stream that isn't `OK`, replacing a filename absent from `files/`).
    /// Distinct from the structural errors above so callers can map it to
    /// `spec.md` §7's "precondition" client-error kind without guessing at
    /// a stringly-typed variant.
    #[error("{0}")]
    Precondition(String),
}
