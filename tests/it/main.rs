//! Integration tests driving the shard server's router end-to-end, in the
//! style of the teacher's `control` crate's `tests/it` harness (`support`
//! builds a fresh in-memory app per test; no real socket, no real clock).

mod auth;
mod lifecycle;
mod support;
