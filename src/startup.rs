//! Binds and serves the router with graceful shutdown (`SPEC_FULL.md` §A.5).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::{build_router, App};
use crate::cors::cors_layer;

/// Serves `app` on `app.config.bind_addr` until ctrl-c, then signals
/// `shutdown_tx` so background tasks (the lease tick) wind down too.
pub async fn run(app: Arc<App>, shutdown_tx: watch::Sender<bool>) -> anyhow::Result<()> {
    let bind_addr = app.config.bind_addr;
    let listener = TcpListener::bind(bind_addr).await?;
    serve(listener, app, shutdown_tx).await
}

async fn serve(listener: TcpListener, app: Arc<App>, shutdown_tx: watch::Sender<bool>) -> anyhow::Result<()> {
    let router = build_router(Arc::clone(&app)).with_state(app).layer(cors_layer());

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    Ok(())
}

fn shutdown_signal(shutdown_tx: watch::Sender<bool>) -> impl Future<Output = ()> {
    async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    }
}
