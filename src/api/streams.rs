use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::App;
use crate::auth::{require_owner, ManagerAuth};
use crate::error::AppError;
use crate::lifecycle;
use crate::model::{stream, StreamId};

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    target_id: String,
    files: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct CreateReply {
    stream_id: StreamId,
}

/// `POST /streams` (`spec.md` §6). No resource-level owner check -- the
/// target may be new to this shard, so there is nothing yet to own
/// (matches `PostStreamHandler`, which only requires manager auth).
pub async fn create(
    State(app): State<Arc<App>>,
    _manager: ManagerAuth,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreateReply>, AppError> {
    let files = req.files.into_iter().map(|(name, data)| (name, data.into_bytes())).collect();
    let stream_id = lifecycle::create_stream(&app, &req.target_id, files).await?;
    Ok(Json(CreateReply { stream_id }))
}

async fn check_owner(app: &App, stream_id: &StreamId, user_id: &str) -> Result<(), AppError> {
    let target_id = app
        .kv
        .read(|tx| stream::get(tx, stream_id))
        .ok_or_else(|| AppError::NotFound {
            kind: stream::KIND,
            id: stream_id.to_string(),
        })?
        .target;
    require_owner(app, &target_id, user_id).await
}

/// `PUT /streams/start/<sid>` (`spec.md` §6).
pub async fn start(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<StreamId>,
    ManagerAuth { user_id }: ManagerAuth,
) -> Result<(), AppError> {
    check_owner(&app, &stream_id, &user_id).await?;
    lifecycle::start_stream(&app, &stream_id).await
}

/// `PUT /streams/stop/<sid>` (`spec.md` §6).
pub async fn stop(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<StreamId>,
    ManagerAuth { user_id }: ManagerAuth,
) -> Result<(), AppError> {
    check_owner(&app, &stream_id, &user_id).await?;
    lifecycle::stop_stream(&app, &stream_id).await
}

/// `PUT /streams/delete/<sid>` (`spec.md` §6).
pub async fn delete(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<StreamId>,
    ManagerAuth { user_id }: ManagerAuth,
) -> Result<(), AppError> {
    check_owner(&app, &stream_id, &user_id).await?;
    lifecycle::delete_stream(&app, &stream_id).await
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRequest {
    files: HashMap<String, String>,
}

/// `PUT /streams/replace/<sid>` (`spec.md` §6).
pub async fn replace(
    State(app): State<Arc<App>>,
    Path(stream_id): Path<StreamId>,
    ManagerAuth { user_id }: ManagerAuth,
    Json(req): Json<ReplaceRequest>,
) -> Result<(), AppError> {
    check_owner(&app, &stream_id, &user_id).await?;
    let files = req.files.into_iter().map(|(name, data)| (name, data.into_bytes())).collect();
    lifecycle::replace_files(&app, &stream_id, files).await
}

/// `GET /streams/download/<sid>/<filename>` (`spec.md` §4.7, §6): raw
/// `application/octet-stream`, not the usual JSON envelope.
pub async fn download(
    State(app): State<Arc<App>>,
    Path((stream_id, filename)): Path<(StreamId, String)>,
    ManagerAuth { user_id }: ManagerAuth,
) -> Result<Response, AppError> {
    check_owner(&app, &stream_id, &user_id).await?;
    let bytes = lifecycle::download(&app, &stream_id, &filename).await?;
    let body = Bytes::from(bytes);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={filename}")),
        ],
        body,
    )
        .into_response())
}
