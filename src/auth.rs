//! The three independent authorization gates (`spec.md` §4.4), implemented
//! as axum `FromRequestParts` extractors rather than the source's method
//! decorators -- each route declares which gate it needs in its handler
//! signature instead of wrapping every handler body in a decorator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::async_trait;

use crate::api::App;
use crate::error::AppError;
use crate::model::StreamId;

fn authorization_header(parts: &Parts) -> Option<&str> {
    parts.headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()
}

/// A rejection used only by these extractors: plain 401s with no body
/// detail, matching the source's bare `set_status(401)` for auth failures
/// (`spec.md` §4.4 never specifies an error body for auth gates).
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

/// An authenticated manager. Resource-level ownership (does this manager
/// own the target this stream/target belongs to) is not checked here --
/// extractors don't see path parameters generically, so handlers call
/// [`require_owner`] once they've loaded the resource's target.
pub struct ManagerAuth {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<App>> for ManagerAuth {
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, app: &Arc<App>) -> Result<Self, Self::Rejection> {
        let token = authorization_header(parts).ok_or(Unauthorized)?;
        match app.user_directory.authenticate(token).await {
            Ok(Some(user_id)) => Ok(ManagerAuth { user_id }),
            _ => Err(Unauthorized),
        }
    }
}

/// Fails unless the `target_id`'s recorded owner matches `user_id`
/// (`spec.md` §4.4, "resource-level check requires that the stream's
/// target's owner equals the user").
pub async fn require_owner(app: &App, target_id: &str, user_id: &str) -> Result<(), AppError> {
    match app.target_catalog.owner(target_id).await? {
        Some(owner) if owner == user_id => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// A core request authenticated by bearer token, resolved to the stream_id
/// it was activated for (`spec.md` §4.4, "Core auth").
pub struct CoreAuth(pub StreamId);

#[async_trait]
impl FromRequestParts<Arc<App>> for CoreAuth {
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, app: &Arc<App>) -> Result<Self, Self::Rejection> {
        let token = authorization_header(parts).ok_or(Unauthorized)?;
        let stream_id = app
            .kv
            .read(|tx| crate::model::active_stream::lookup_by_token(tx, token));
        stream_id.map(CoreAuth).ok_or(Unauthorized)
    }
}

/// The calling peer is an allow-listed command-center address, or loopback
/// in test mode (`spec.md` §4.4, "Router auth").
pub struct RouterAuth;

#[async_trait]
impl FromRequestParts<Arc<App>> for RouterAuth {
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, app: &Arc<App>) -> Result<Self, Self::Rejection> {
        let ConnectInfo(addr) = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .copied()
            .ok_or(Unauthorized)?;
        if app.config.is_router_addr(addr.ip()) {
            Ok(RouterAuth)
        } else {
            Err(Unauthorized)
        }
    }
}
