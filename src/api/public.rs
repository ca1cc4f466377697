//! Unauthenticated read endpoints (`spec.md` §6): liveness, and the three
//! read-only introspection routes used by managers/operators to poll
//! progress without a manager token.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::App;
use crate::error::AppError;
use crate::model::{active_stream, stream, StreamId, TargetId};

#[derive(Debug, Serialize)]
pub struct Liveness {
    shard: String,
    streams: usize,
}

/// `GET /` (`SPEC_FULL.md` §B): liveness probe, also useful as a cheap
/// load indicator (count of streams currently leased to a core).
pub async fn liveness(State(app): State<Arc<App>>) -> Json<Liveness> {
    let streams = app.kv.read(|tx| {
        stream::members(tx)
            .into_iter()
            .filter(|id| active_stream::exists(tx, id))
            .count()
    });
    Json(Liveness {
        shard: app.config.shard_name.clone(),
        streams,
    })
}

#[derive(Debug, Serialize)]
pub struct StreamInfo {
    status: stream::Status,
    frames: i64,
    error_count: i64,
    active: bool,
}

/// `GET /streams/info/<sid>` (`spec.md` §6), grounded on `StreamInfoHandler`.
pub async fn stream_info(State(app): State<Arc<App>>, Path(stream_id): Path<StreamId>) -> Result<Json<StreamInfo>, AppError> {
    app.kv
        .read(|tx| {
            stream::get(tx, &stream_id).map(|view| StreamInfo {
                status: view.status,
                frames: view.frames,
                error_count: view.error_count,
                active: active_stream::exists(tx, &stream_id),
            })
        })
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            kind: stream::KIND,
            id: stream_id.to_string(),
        })
}

#[derive(Debug, Serialize)]
pub struct TargetStreamInfo {
    status: stream::Status,
    frames: i64,
}

/// `GET /targets/streams/<tid>` (`spec.md` §6), grounded on
/// `TargetStreamsHandler`. Targets with no streams on this shard simply
/// report an empty map rather than a 404 -- the source never distinguishes
/// "unknown target" from "target with nothing here yet".
pub async fn target_streams(
    State(app): State<Arc<App>>,
    Path(target_id): Path<TargetId>,
) -> Json<HashMap<StreamId, TargetStreamInfo>> {
    let out = app.kv.read(|tx| {
        crate::model::target::streams(tx, &target_id)
            .into_iter()
            .filter_map(|id| {
                stream::get(tx, &id).map(|view| {
                    (
                        id,
                        TargetStreamInfo {
                            status: view.status,
                            frames: view.frames,
                        },
                    )
                })
            })
            .collect()
    });
    Json(out)
}

#[derive(Debug, Serialize)]
pub struct ActiveStreamInfo {
    donor: Option<String>,
    start_time: i64,
    active_frames: i64,
    buffer_frames: i64,
}

/// `GET /active_streams` (`spec.md` §6), grounded on `ActiveStreamsHandler`:
/// every currently-leased stream, grouped by its owning target. There is no
/// dedicated "all targets" index, so this derives the grouping from the
/// stream set itself -- a target with zero active streams is simply absent
/// from the result, matching the source's behavior of only ever emitting
/// targets it found an active stream under.
pub async fn active_streams(State(app): State<Arc<App>>) -> Json<HashMap<TargetId, HashMap<StreamId, ActiveStreamInfo>>> {
    let out = app.kv.read(|tx| {
        let mut by_target: HashMap<TargetId, HashMap<StreamId, ActiveStreamInfo>> = HashMap::new();
        for id in stream::members(tx) {
            let Some(active) = active_stream::get(tx, &id) else {
                continue;
            };
            let target_id = stream::target(tx, &id);
            by_target.entry(target_id).or_default().insert(
                id,
                ActiveStreamInfo {
                    donor: active.donor,
                    start_time: active.start_time,
                    active_frames: active.total_frames,
                    buffer_frames: active.buffer_frames,
                },
            );
        }
        by_target
    });
    Json(out)
}
