//! The stream lifecycle state machine, the frame/checkpoint protocol, and
//! deactivation (`spec.md` §4.2, §4.3, §4.5). This module is where the
//! `kv`/`model` layer (metadata) and `storage` layer (bytes on disk) are
//! composed into the operations the HTTP handlers in [`crate::api`] call;
//! nothing here is axum-specific.

use std::collections::HashMap;
use std::io::Read;

use base64::decode as b64_decode;

use crate::api::App;
use crate::error::AppError;
use crate::model::ids::TargetId;
use crate::model::{active_stream, stream, target, StreamId};
use crate::storage::StreamDir;

fn stream_dir(app: &App, id: &StreamId) -> StreamDir {
    StreamDir::new(&app.config.streams_dir, &app.config.shard_name, id)
}

/// `POST /streams` (`spec.md` §4.2, `∅ -> INACTIVE_OK`). Manager files are
/// stored byte-for-byte as given -- the source writes the JSON string
/// value straight to disk with no base64 decode, despite the field names
/// carrying a `.b64` hint for the core's benefit later.
pub async fn create_stream(
    app: &App,
    target_id: &TargetId,
    files: HashMap<String, Vec<u8>>,
) -> Result<StreamId, AppError> {
    app.target_catalog.register_shard(target_id, &app.config.shard_name).await?;

    let id = StreamId::new(uuid::Uuid::new_v4(), &app.config.shard_name);
    stream_dir(app, &id).write_initial(&files).await?;

    app.kv.pipeline(|tx| {
        target::ensure(tx, target_id);
        target::add_stream(tx, target_id, &id);
        stream::create(tx, &id, target_id)?;
        target::enqueue(tx, target_id, &id, 0.0);
        Ok(())
    })?;

    Ok(id)
}

/// `POST /streams/activate` (`spec.md` §4.2, `INACTIVE_OK -> ACTIVE_OK`).
/// Pops the queue, mints a token, and creates the `ActiveStream` + lease
/// entry in a single pipeline so a crash can't leave a stream popped and
/// un-leased (`spec.md` §5).
pub async fn activate(
    app: &App,
    target_id: &TargetId,
    donor_id: Option<&str>,
) -> Result<String, AppError> {
    let now = app.clock.now_unix();
    let expires_at = now + app.config.heartbeat_seconds();
    let token = uuid::Uuid::new_v4().to_string();

    let activated = app.kv.pipeline(|tx| {
        let Some(stream_id) = target::dequeue_highest(tx, target_id) else {
            return Ok(None);
        };
        active_stream::create(tx, &stream_id, &token, donor_id, 0, now)?;
        crate::lease::insert(tx, &stream_id, expires_at);
        Ok(Some(stream_id))
    })?;

    if activated.is_some() {
        Ok(token)
    } else {
        Err(AppError::BadRequest("no streams available".to_string()))
    }
}

/// `PUT /streams/start/<sid>` (`spec.md` §4.2, `INACTIVE_STOPPED ->
/// INACTIVE_OK`). A no-op if the stream is already `OK`.
pub async fn start_stream(app: &App, id: &StreamId) -> Result<(), AppError> {
    let view = require_stream(app, id)?;
    if view.status == stream::Status::Ok {
        return Ok(());
    }
    app.kv.pipeline(|tx| {
        stream::set_status(tx, id, stream::Status::Ok);
        stream::reset_error_count(tx, id);
        target::enqueue_at_frames(tx, &view.target, id);
        Ok(())
    })?;
    Ok(())
}

/// `PUT /streams/stop/<sid>` (`spec.md` §4.2, any `ACTIVE`/`INACTIVE_OK` ->
/// `INACTIVE_STOPPED`). Deactivates first (idempotent if already inactive).
pub async fn stop_stream(app: &App, id: &StreamId) -> Result<(), AppError> {
    let view = require_stream(app, id)?;
    deactivate(app, id, DeactivateReason::ManagerStop).await?;
    if view.status != stream::Status::Stopped {
        app.kv.pipeline(|tx| {
            stream::set_status(tx, id, stream::Status::Stopped);
            target::remove_from_queue(tx, &view.target, id);
            Ok(())
        })?;
    }
    Ok(())
}

/// `PUT /streams/delete/<sid>` (`spec.md` §4.2, any `INACTIVE` -> `∅`).
/// Removes the KV rows and the on-disk directory, and drops the target row
/// too if this was its last stream (`spec.md` §9, "implicit assumption").
pub async fn delete_stream(app: &App, id: &StreamId) -> Result<(), AppError> {
    let view = require_stream(app, id)?;

    let target_empty = app.kv.pipeline(|tx| {
        if active_stream::exists(tx, id) {
            active_stream::delete(tx, id);
        }
        crate::lease::remove(tx, id);
        let empty = target::remove_stream(tx, &view.target, id);
        target::remove_from_queue(tx, &view.target, id);
        stream::delete(tx, id);
        Ok(empty)
    })?;

    if target_empty {
        app.kv.pipeline(|tx| {
            target::delete(tx, &view.target);
            Ok(())
        })?;
    }

    stream_dir(app, id).remove_all().await?;
    Ok(())
}

/// `PUT /streams/replace/<sid>` (`spec.md` §6). The stream must be
/// `STOPPED`, and only filenames already present under `files/` may be
/// replaced -- mirrors the source's pre-check over `os.listdir`.
pub async fn replace_files(
    app: &App,
    id: &StreamId,
    files: HashMap<String, Vec<u8>>,
) -> Result<(), AppError> {
    let view = require_stream(app, id)?;
    if view.status != stream::Status::Stopped {
        return Err(AppError::BadRequest("stream must be stopped first".to_string()));
    }

    let sd = stream_dir(app, id);
    let existing = sd.read_initial().await?;
    for name in files.keys() {
        if !existing.contains_key(name) {
            return Err(AppError::BadRequest(format!("{name} is not in files directory")));
        }
    }
    sd.write_initial(&files).await?;
    Ok(())
}

/// `PUT /targets/delete/<tid>` (`spec.md` §6). Deactivates and removes
/// every stream this shard holds for `target_id`. A missing target is a
/// no-op (`spec.md` §9 "implicit assumption": a target may not exist here).
pub async fn delete_target(app: &App, target_id: &TargetId) -> Result<(), AppError> {
    if !app.kv.read(|tx| target::exists(tx, target_id)) {
        return Ok(());
    }

    let stream_ids = app.kv.read(|tx| target::streams(tx, target_id));
    for id in &stream_ids {
        deactivate(app, id, DeactivateReason::Delete).await?;
        stream_dir(app, id).remove_all().await?;
        app.kv.pipeline(|tx| {
            target::remove_from_queue(tx, target_id, id);
            stream::delete(tx, id);
            Ok(())
        })?;
    }

    app.kv.pipeline(|tx| {
        target::delete(tx, target_id);
        Ok(())
    })?;
    Ok(())
}

/// Why a stream is being deactivated (`spec.md` §4.5). Only
/// [`DeactivateReason::Delete`] skips the requeue step, since the stream
/// row is about to be removed entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivateReason {
    CoreStop,
    ManagerStop,
    LeaseExpired,
    Delete,
}

/// Deactivation (`spec.md` §4.5): idempotent, invoked from core stop,
/// manager stop, lease expiry, and (stream/target) delete.
pub async fn deactivate(app: &App, id: &StreamId, reason: DeactivateReason) -> Result<(), AppError> {
    let state = app.kv.read(|tx| {
        if !active_stream::exists(tx, id) {
            return None;
        }
        Some((active_stream::buffer_files(tx, id), stream::target(tx, id)))
    });
    let Some((buffer_files, target_id)) = state else {
        return Ok(());
    };

    stream_dir(app, id).clear_buffers(buffer_files).await?;

    app.kv.pipeline(|tx| {
        active_stream::delete(tx, id);
        crate::lease::remove(tx, id);
        if reason != DeactivateReason::Delete {
            target::enqueue_at_frames(tx, &target_id, id);
        }
        Ok(())
    })?;
    Ok(())
}

/// `GET /core/start` (`spec.md` §6): the contents of `files/`, returned
/// exactly as stored.
pub struct CoreStart {
    pub target_id: TargetId,
    pub files: HashMap<String, Vec<u8>>,
}

pub async fn core_start(app: &App, id: &StreamId) -> Result<CoreStart, AppError> {
    let view = require_stream(app, id)?;
    let files = stream_dir(app, id).read_initial().await?;
    Ok(CoreStart {
        target_id: view.target,
        files,
    })
}

/// `PUT /core/frame` (`spec.md` §4.3). `frames` defaults to 1 if omitted.
pub async fn core_frame(
    app: &App,
    id: &StreamId,
    body: &[u8],
    files: HashMap<String, String>,
    frames: i64,
) -> Result<(), AppError> {
    if frames < 1 {
        return Err(AppError::BadRequest("frames must be >= 1".to_string()));
    }

    let digest = format!("{:x}", md5::compute(body));
    let prior_hash = app.kv.read(|tx| active_stream::frame_hash(tx, id));
    if prior_hash == digest {
        // Replay of the same body: absorbed with no side effects
        // (`spec.md` §4.3 step 1, §8 property 3).
        return Ok(());
    }

    app.kv.pipeline(|tx| {
        active_stream::set_frame_hash(tx, id, &digest);
        active_stream::clear_buffer_files(tx, id);
        Ok(())
    })?;

    let sd = stream_dir(app, id);
    let mut written = Vec::with_capacity(files.len());
    for (name, data) in &files {
        let (final_name, bytes) = decode_upload_name(name, data)?;
        sd.append_buffer(&final_name, &bytes).await?;
        written.push(final_name);
    }

    app.kv.pipeline(|tx| {
        for name in &written {
            active_stream::add_buffer_file(tx, id, name);
        }
        active_stream::incr_buffer_frames(tx, id, frames);
        Ok(())
    })?;
    Ok(())
}

/// `PUT /core/checkpoint` (`spec.md` §4.3, §6). Checkpoint file content is
/// stored raw (no `.b64`/`.gz` transform) -- only frame uploads carry that
/// encoding, confirmed against the source's `CoreCheckpointHandler`, which
/// `.encode()`s the JSON string straight to bytes. Every name in `files`
/// must already exist under `files/` (`spec.md` §6, "Filenames must
/// pre-exist in files/"); a typo'd or absent name is rejected here rather
/// than left to surface as an `fs::rename` `NotFound` out of
/// `StreamDir::checkpoint`.
pub async fn core_checkpoint(
    app: &App,
    id: &StreamId,
    files: HashMap<String, String>,
) -> Result<(), AppError> {
    let (p, b, buffer_file_names) = app.kv.read(|tx| {
        (
            stream::frames(tx, id),
            active_stream::buffer_frames(tx, id),
            active_stream::buffer_files(tx, id),
        )
    });

    if b == 0 {
        return Ok(());
    }
    let t = p + b;

    let sd = stream_dir(app, id);
    let existing = sd.read_initial().await?;
    for name in files.keys() {
        if !existing.contains_key(name) {
            return Err(crate::kv::KvError::Precondition(format!("{name} is not in files directory")).into());
        }
    }

    let checkpoint_files: HashMap<String, Vec<u8>> =
        files.into_iter().map(|(name, content)| (name, content.into_bytes())).collect();

    sd.checkpoint(&checkpoint_files, &buffer_file_names, p, t).await?;

    app.kv.pipeline(|tx| {
        stream::incr_frames(tx, id, b);
        active_stream::incr_total_frames(tx, id, b);
        active_stream::reset_buffer_frames(tx, id);
        Ok(())
    })?;
    Ok(())
}

/// `PUT /core/stop` (`spec.md` §6). `error_b64`, if present, is base64 of
/// the log message to append to `error_log.txt`, timestamped. If
/// `error_count` crosses the configured threshold, the stream is stopped
/// outright instead of being returned to the queue (`spec.md` §7, §9
/// "Error-count policy": the source tracks the count but never acts on
/// it, so the threshold + auto-stop are this implementation's explicit
/// policy).
pub async fn core_stop(app: &App, id: &StreamId, error_b64: Option<String>) -> Result<(), AppError> {
    let mut auto_stop = false;

    if let Some(encoded) = error_b64 {
        let message = b64_decode(&encoded)
            .map_err(|e| AppError::BadRequest(format!("invalid base64 error message: {e}")))?;
        let message = String::from_utf8_lossy(&message).into_owned();

        let error_count = app.kv.pipeline(|tx| Ok(stream::incr_error_count(tx, id)))?;

        let timestamp = chrono::Local::now().format("%c");
        stream_dir(app, id).append_error_log(&format!("{timestamp}\n{message}")).await?;

        if let Some(threshold) = app.config.error_stop_threshold {
            auto_stop = error_count >= threshold as i64;
        }
    }

    deactivate(app, id, DeactivateReason::CoreStop).await?;

    if auto_stop {
        let view = require_stream(app, id)?;
        if view.status != stream::Status::Stopped {
            app.kv.pipeline(|tx| {
                stream::set_status(tx, id, stream::Status::Stopped);
                target::remove_from_queue(tx, &view.target, id);
                Ok(())
            })?;
        }
    }

    Ok(())
}

/// `POST /core/heartbeat` (`spec.md` §4.6): refreshes the lease expiry.
pub async fn core_heartbeat(app: &App, id: &StreamId) -> Result<(), AppError> {
    let expires_at = app.clock.now_unix() + app.config.heartbeat_seconds();
    app.kv.pipeline(|tx| {
        crate::lease::refresh(tx, id, expires_at);
        Ok(())
    })?;
    Ok(())
}

/// `GET /streams/download/<sid>/<filename>` (`spec.md` §4.7). A `files/`
/// entry is served raw; otherwise frame files matching `filename` are
/// concatenated in frame order. Never-produced names return an empty body
/// rather than an error -- the source can't distinguish "not yet" from
/// "never will be" (`spec.md` §4.7).
pub async fn download(app: &App, id: &StreamId, filename: &str) -> Result<Vec<u8>, AppError> {
    let sd = stream_dir(app, id);
    let initial = sd.read_initial().await?;
    if let Some(bytes) = initial.get(filename) {
        return Ok(bytes.clone());
    }
    Ok(sd.download(filename).await?)
}

fn require_stream(app: &App, id: &StreamId) -> Result<stream::StreamView, AppError> {
    app.kv
        .read(|tx| stream::get(tx, id))
        .ok_or_else(|| AppError::NotFound {
            kind: stream::KIND,
            id: id.to_string(),
        })
}

/// Applies the frame-upload filename convention (`spec.md` §4.3 step 4): a
/// trailing `.b64` means base64-decode, and if the *decoded* name still
/// ends in `.gz` it is gzip-decompressed. The `.gz` check only applies
/// inside the `.b64` branch -- a name like `foo.gz` with no `.b64` suffix
/// is stored as-is, matching the source's nesting (`CoreFrameHandler.put`).
fn decode_upload_name(name: &str, raw: &str) -> Result<(String, Vec<u8>), AppError> {
    let Some(b64_stripped) = name.strip_suffix(".b64") else {
        return Ok((name.to_string(), raw.as_bytes().to_vec()));
    };

    let decoded = b64_decode(raw).map_err(|e| AppError::BadRequest(format!("invalid base64 for {name}: {e}")))?;

    if let Some(gz_stripped) = b64_stripped.strip_suffix(".gz") {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(decoded.as_slice())
            .read_to_end(&mut out)
            .map_err(AppError::Storage)?;
        Ok((gz_stripped.to_string(), out))
    } else {
        Ok((b64_stripped.to_string(), decoded))
    }
}
