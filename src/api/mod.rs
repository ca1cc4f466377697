//! HTTP surface (`spec.md` §6): the `Arc<App>`-keyed axum router plus one
//! handler submodule per route group, mirroring `agent::api`'s layout
//! (`authorize_task.rs`, `history.rs`, ... each a thin wrapper translating
//! HTTP <-> [`crate::lifecycle`] calls).

mod activate;
mod core;
mod public;
mod streams;
mod targets;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::config::Config;
use crate::directory::{TargetCatalog, UserDirectory};
use crate::kv::Kv;

/// Shared application state. Handlers only ever see `Arc<App>` (via axum's
/// `State` extractor), never a bare `App`, so cloning it around tasks (the
/// lease tick, in particular) is cheap.
pub struct App {
    pub kv: Kv,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    pub user_directory: UserDirectory,
    pub target_catalog: TargetCatalog,
}

impl App {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        user_directory: UserDirectory,
        target_catalog: TargetCatalog,
    ) -> Self {
        App {
            kv: Kv::new(),
            clock,
            config,
            user_directory,
            target_catalog,
        }
    }
}

/// Builds the full router, layered with tracing and a concurrency cap
/// (`SPEC_FULL.md` §B); CORS is applied separately in
/// [`crate::startup::run`] since it wraps the whole service including
/// static error responses.
pub fn build_router(app: Arc<App>) -> Router<Arc<App>> {
    let max_concurrency = app.config.max_concurrency;

    Router::new()
        .route("/", get(public::liveness))
        .route("/streams/info/:stream_id", get(public::stream_info))
        .route("/targets/streams/:target_id", get(public::target_streams))
        .route("/active_streams", get(public::active_streams))
        .route("/streams/activate", post(activate::activate))
        .route("/streams", post(streams::create))
        .route("/streams/start/:stream_id", put(streams::start))
        .route("/streams/stop/:stream_id", put(streams::stop))
        .route("/streams/delete/:stream_id", put(streams::delete))
        .route("/streams/replace/:stream_id", put(streams::replace))
        .route("/streams/download/:stream_id/:filename", get(streams::download))
        .route("/targets/delete/:target_id", put(targets::delete))
        .route("/core/start", get(core::start))
        .route("/core/frame", put(core::frame))
        .route("/core/checkpoint", put(core::checkpoint))
        .route("/core/stop", put(core::stop))
        .route("/core/heartbeat", post(core::heartbeat))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(ConcurrencyLimitLayer::new(max_concurrency)),
        )
}
