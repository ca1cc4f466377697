use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::App;
use crate::auth::RouterAuth;
use crate::error::AppError;
use crate::lifecycle;

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    target_id: String,
    donor_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivateReply {
    token: String,
}

/// `POST /streams/activate` (`spec.md` §6).
pub async fn activate(
    State(app): State<Arc<App>>,
    _router: RouterAuth,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<ActivateReply>, AppError> {
    let token = lifecycle::activate(&app, &req.target_id, req.donor_id.as_deref()).await?;
    Ok(Json(ActivateReply { token }))
}
