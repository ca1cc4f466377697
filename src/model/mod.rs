//! Typed entity views over the [`crate::kv`] store (`spec.md` §4.1).
//!
//! Each submodule is a compile-time declared schema for one entity kind:
//! a fixed set of typed fields plus whatever index/relation wiring that
//! entity needs, exposed only through these functions. Nothing outside
//! `model` constructs a raw `kv::Field` or touches a bare field name.

pub mod active_stream;
pub mod ids;
pub mod stream;
pub mod target;

pub use ids::{StreamId, TargetId};
