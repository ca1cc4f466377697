use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::App;
use crate::auth::CoreAuth;
use crate::error::AppError;
use crate::lifecycle;

#[derive(Debug, Serialize)]
pub struct CoreStartReply {
    stream_id: String,
    target_id: String,
    files: HashMap<String, String>,
}

/// `GET /core/start` (`spec.md` §6).
pub async fn start(State(app): State<Arc<App>>, CoreAuth(stream_id): CoreAuth) -> Result<Json<CoreStartReply>, AppError> {
    let started = lifecycle::core_start(&app, &stream_id).await?;
    let files = started
        .files
        .into_iter()
        .map(|(name, bytes)| (name, String::from_utf8_lossy(&bytes).into_owned()))
        .collect();
    Ok(Json(CoreStartReply {
        stream_id: stream_id.to_string(),
        target_id: started.target_id,
        files,
    }))
}

#[derive(Debug, Deserialize)]
struct FrameRequest {
    files: HashMap<String, String>,
    #[serde(default = "default_frames")]
    frames: i64,
}

fn default_frames() -> i64 {
    1
}

/// `PUT /core/frame` (`spec.md` §4.3, §6). The idempotency hash is taken
/// over the raw request body, so this handler needs the bytes before
/// they're parsed as JSON.
pub async fn frame(State(app): State<Arc<App>>, CoreAuth(stream_id): CoreAuth, body: Bytes) -> Result<(), AppError> {
    let req: FrameRequest = serde_json::from_slice(&body)?;
    lifecycle::core_frame(&app, &stream_id, &body, req.files, req.frames).await
}

#[derive(Debug, Deserialize)]
pub struct CheckpointRequest {
    files: HashMap<String, String>,
}

/// `PUT /core/checkpoint` (`spec.md` §4.3, §6).
pub async fn checkpoint(
    State(app): State<Arc<App>>,
    CoreAuth(stream_id): CoreAuth,
    Json(req): Json<CheckpointRequest>,
) -> Result<(), AppError> {
    lifecycle::core_checkpoint(&app, &stream_id, req.files).await
}

#[derive(Debug, Deserialize, Default)]
pub struct StopRequest {
    error: Option<String>,
}

/// `PUT /core/stop` (`spec.md` §6). An empty body is treated the same as
/// `{}` -- the source's handler unconditionally `json.loads`es the body,
/// but an empty object is the documented "no error" request shape.
pub async fn stop(State(app): State<Arc<App>>, CoreAuth(stream_id): CoreAuth, body: Bytes) -> Result<(), AppError> {
    let req: StopRequest = if body.is_empty() {
        StopRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    lifecycle::core_stop(&app, &stream_id, req.error).await
}

/// `POST /core/heartbeat` (`spec.md` §4.6, §6).
pub async fn heartbeat(State(app): State<Arc<App>>, CoreAuth(stream_id): CoreAuth) -> Result<(), AppError> {
    lifecycle::core_heartbeat(&app, &stream_id).await
}
