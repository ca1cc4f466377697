//! Heartbeat-based activation lease (`spec.md` §4.6).
//!
//! A single sorted set `heartbeats` maps `stream_id -> expiry_time`.
//! Activation and the core's heartbeat endpoint are the only writers;
//! a periodic tick reaps everything past its expiry and hands those
//! streams back to [`crate::lifecycle::deactivate`].

use crate::kv::Tx;
use crate::model::StreamId;

const HEARTBEATS: &str = "heartbeats";

pub fn insert(tx: &mut Tx, stream_id: &StreamId, expires_at: i64) {
    tx.zadd(HEARTBEATS, stream_id.as_str().to_owned(), expires_at as f64);
}

/// Overwrites the expiry for an already-leased stream. No-op if the stream
/// isn't currently leased (the caller's core-auth check already ensures
/// this can't happen for a well-behaved client, but a reaped-then-retried
/// heartbeat must not resurrect a dead lease).
pub fn refresh(tx: &mut Tx, stream_id: &StreamId, expires_at: i64) {
    if tx.zscore(HEARTBEATS, stream_id.as_str()).is_some() {
        tx.zadd(HEARTBEATS, stream_id.as_str().to_owned(), expires_at as f64);
    }
}

pub fn remove(tx: &mut Tx, stream_id: &StreamId) {
    tx.zrem(HEARTBEATS, stream_id.as_str());
}

pub fn is_leased(tx: &Tx, stream_id: &StreamId) -> bool {
    tx.zscore(HEARTBEATS, stream_id.as_str()).is_some()
}

/// Every stream whose lease expired at or before `now`.
pub fn expired(tx: &Tx, now: i64) -> Vec<StreamId> {
    tx.zrange_le(HEARTBEATS, now as f64)
        .into_iter()
        .map(|(member, _)| member.parse().expect("StreamId parsing is infallible"))
        .collect()
}

/// Runs [`crate::lifecycle::deactivate`] for every stream whose lease has
/// expired, then sleeps `tick_period` and repeats until `shutdown`
/// resolves. Only the designated reaper task should run this per process
/// group (`spec.md` §4.6, "The tick runs only on the designated worker").
pub async fn run_tick(
    app: std::sync::Arc<crate::api::App>,
    tick_period: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick_period);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::info!("lease tick stopping");
                return;
            }
        }

        let now = app.clock.now_unix();
        let expired_ids = app.kv.read(|tx| expired(tx, now));
        for stream_id in expired_ids {
            tracing::info!(%stream_id, "reclaiming expired lease");
            if let Err(err) = crate::lifecycle::deactivate(&app, &stream_id, crate::lifecycle::DeactivateReason::LeaseExpired).await {
                tracing::warn!(%stream_id, ?err, "failed to reclaim expired lease (will retry next tick)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Kv;

    #[test]
    fn expired_finds_only_past_due_entries() {
        let kv = Kv::new();
        let a: StreamId = "a:shard".parse().unwrap();
        let b: StreamId = "b:shard".parse().unwrap();
        kv.pipeline(|tx| {
            insert(tx, &a, 100);
            insert(tx, &b, 200);
            Ok(())
        })
        .unwrap();

        let due = kv.read(|tx| expired(tx, 150));
        assert_eq!(due, vec![a.clone()]);

        let due = kv.read(|tx| expired(tx, 250));
        let mut due: Vec<String> = due.iter().map(|s| s.to_string()).collect();
        due.sort();
        assert_eq!(due, vec!["a:shard".to_string(), "b:shard".to_string()]);
    }

    #[test]
    fn refresh_is_noop_once_removed() {
        let kv = Kv::new();
        let a: StreamId = "a:shard".parse().unwrap();
        kv.pipeline(|tx| {
            insert(tx, &a, 100);
            remove(tx, &a);
            refresh(tx, &a, 999);
            Ok(())
        })
        .unwrap();
        assert!(!kv.read(|tx| is_leased(tx, &a)));
    }
}
