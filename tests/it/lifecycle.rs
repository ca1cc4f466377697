//! HTTP-level scenarios from `spec.md` §8 ("Concrete scenarios").
//! Crash-recovery (S4) and the low-level checkpoint swap are covered by
//! `storage::tests` instead, since they operate below the HTTP surface.

use axum::http::StatusCode;
use serde_json::json;

use crate::support::{assert_status, body_bytes, body_json, TestAppBuilder};

const MANAGER_TOKEN: &str = "manager-tok";
const MANAGER_USER: &str = "alice";
const TARGET: &str = "target-1";

/// S1: create + activate + start. `POST /streams` stores file content
/// byte-for-byte (no base64 decode); `core/start` returns it unchanged and
/// `streams/info` reports the freshly-activated state.
#[tokio::test]
async fn s1_create_activate_start() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json(
            "/streams",
            Some(MANAGER_TOKEN),
            &json!({"target_id": TARGET, "files": {"state.xml.gz.b64": "aGVsbG8="}}),
        )
        .await;
    assert_status(&created, StatusCode::OK);
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    assert_status(&activated, StatusCode::OK);
    let token = body_json(activated).await["token"].as_str().unwrap().to_owned();

    let start = harness.get("/core/start", Some(&token)).await;
    assert_status(&start, StatusCode::OK);
    let start_body = body_json(start).await;
    assert_eq!(start_body["target_id"], TARGET);
    assert_eq!(start_body["files"]["state.xml.gz.b64"], "aGVsbG8=");

    let info = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    assert_status(&info, StatusCode::OK);
    let info_body = body_json(info).await;
    assert_eq!(info_body["status"], "OK");
    assert_eq!(info_body["frames"], 0);
    assert_eq!(info_body["active"], true);
}

/// S2/S3: a single frame append + checkpoint commits exactly once, and a
/// byte-identical replay of the frame POST is absorbed with no change to
/// `buffer_frames` (`spec.md` §8 properties 2 and 3).
#[tokio::test]
async fn s2_single_commit_and_s3_duplicate_frame_post() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json(
            "/streams",
            Some(MANAGER_TOKEN),
            &json!({"target_id": TARGET, "files": {"state.xml.gz.b64": "old"}}),
        )
        .await;
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    let token = body_json(activated).await["token"].as_str().unwrap().to_owned();

    let frame_body = json!({
        "files": {"frames.xtc.b64": base64::encode(b"AAAA")},
        "frames": 1,
    });
    let frame_resp = harness.put_json("/core/frame", Some(&token), &frame_body).await;
    assert_status(&frame_resp, StatusCode::OK);

    // S3: the exact same body again must not double `buffer_frames`.
    let replay_resp = harness.put_json("/core/frame", Some(&token), &frame_body).await;
    assert_status(&replay_resp, StatusCode::OK);

    let active = harness.get("/active_streams", None).await;
    let active_body = body_json(active).await;
    let buffer_frames = active_body[TARGET][stream_id.as_str()]["buffer_frames"].as_i64().unwrap();
    assert_eq!(buffer_frames, 1, "duplicate frame POST must not double-count buffer_frames");

    let checkpoint_resp = harness
        .put_json(
            "/core/checkpoint",
            Some(&token),
            &json!({"files": {"state.xml.gz.b64": "new"}}),
        )
        .await;
    assert_status(&checkpoint_resp, StatusCode::OK);

    let info = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    let info_body = body_json(info).await;
    assert_eq!(info_body["frames"], 1);

    let downloaded = harness
        .get(&format!("/streams/download/{stream_id}/frames.xtc"), Some(MANAGER_TOKEN))
        .await;
    assert_status(&downloaded, StatusCode::OK);
    assert_eq!(body_bytes(downloaded).await, b"AAAA");

    let start = harness.get("/core/start", Some(&token)).await;
    let start_body = body_json(start).await;
    assert_eq!(start_body["files"]["state.xml.gz.b64"], "new");

    // A second identical checkpoint is a no-op (`spec.md` §8 property 2):
    // buffer_frames is already 0, so it short-circuits.
    let second_checkpoint = harness
        .put_json(
            "/core/checkpoint",
            Some(&token),
            &json!({"files": {"state.xml.gz.b64": "new"}}),
        )
        .await;
    assert_status(&second_checkpoint, StatusCode::OK);
    let info_again = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    assert_eq!(body_json(info_again).await["frames"], 1);
}

/// `PUT /core/checkpoint` rejects a filename absent from `files/` with 400,
/// not a storage-layer 500 (`spec.md` §6, "Filenames must pre-exist in
/// files/"), and leaves `frames` unchanged.
#[tokio::test]
async fn checkpoint_rejects_unknown_filename() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json(
            "/streams",
            Some(MANAGER_TOKEN),
            &json!({"target_id": TARGET, "files": {"state.xml.gz.b64": "old"}}),
        )
        .await;
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    let token = body_json(activated).await["token"].as_str().unwrap().to_owned();

    harness
        .put_json(
            "/core/frame",
            Some(&token),
            &json!({"files": {"frames.xtc.b64": base64::encode(b"AAAA")}, "frames": 1}),
        )
        .await;

    let checkpoint_resp = harness
        .put_json(
            "/core/checkpoint",
            Some(&token),
            &json!({"files": {"nonexistent.txt": "new"}}),
        )
        .await;
    assert_status(&checkpoint_resp, StatusCode::BAD_REQUEST);

    let info = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    assert_eq!(body_json(info).await["frames"], 0, "a rejected checkpoint must not commit frames");
}

/// S5: after the heartbeat lease lapses, reaping the expired entry
/// deactivates the stream and returns it to the queue -- confirmed here by
/// a fresh `/streams/activate` succeeding again on the same target
/// (`spec.md` §8 property 4).
#[tokio::test]
async fn s5_lease_expiry_reclaims_the_stream() {
    let harness = TestAppBuilder::new()
        .with_manager(MANAGER_TOKEN, MANAGER_USER)
        .with_heartbeat_seconds(10)
        .build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json(
            "/streams",
            Some(MANAGER_TOKEN),
            &json!({"target_id": TARGET, "files": {}}),
        )
        .await;
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    assert_status(&activated, StatusCode::OK);

    let info = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    assert_eq!(body_json(info).await["active"], true);

    harness.clock.advance(11);
    let expired = harness.app.kv.read(|tx| scv::lease::expired(tx, harness.clock.now_unix()));
    assert_eq!(expired.len(), 1);
    for id in expired {
        scv::lifecycle::deactivate(&harness.app, &id, scv::lifecycle::DeactivateReason::LeaseExpired)
            .await
            .unwrap();
    }

    let info = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    assert_eq!(body_json(info).await["active"], false);

    // Back in the queue: activation succeeds again.
    let reactivated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    assert_status(&reactivated, StatusCode::OK);
}

/// S6: manager stop removes a stream from the queue; manager start
/// re-enqueues it at its current committed frame count, so a
/// higher-progress stream wins the next activation over one still at zero
/// (`spec.md` §4.2 tie-break rule).
#[tokio::test]
async fn s6_stop_then_restart_reenqueues_at_frames() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();
    harness.set_owner(TARGET, MANAGER_USER);

    let low = harness
        .post_json("/streams", Some(MANAGER_TOKEN), &json!({"target_id": TARGET, "files": {}}))
        .await;
    let low_id = body_json(low).await["stream_id"].as_str().unwrap().to_owned();

    let high = harness
        .post_json("/streams", Some(MANAGER_TOKEN), &json!({"target_id": TARGET, "files": {}}))
        .await;
    let high_id = body_json(high).await["stream_id"].as_str().unwrap().to_owned();

    // Manually advance `high`'s committed frame count via the checkpoint
    // protocol, then stop and restart it so it re-enters the queue above 0.
    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    let token = body_json(activated).await["token"].as_str().unwrap().to_owned();
    // Whichever of the two streams came up first (both start at score 0)
    // is the one we just activated; drive frames through it directly.
    harness
        .put_json(
            "/core/frame",
            Some(&token),
            &json!({"files": {"f.xtc.b64": base64::encode(b"Z")}, "frames": 5}),
        )
        .await;
    harness
        .put_json("/core/checkpoint", Some(&token), &json!({"files": {}}))
        .await;
    harness.put_json(&format!("/streams/stop/{high_id}"), Some(MANAGER_TOKEN), &json!({})).await;
    harness.put_json(&format!("/streams/stop/{low_id}"), Some(MANAGER_TOKEN), &json!({})).await;

    let info_high_before = harness.get(&format!("/streams/info/{high_id}"), None).await;
    // Either `high_id` or `low_id` received the frames depending on
    // activation order; read back whichever one actually has frames > 0
    // and assert *that* one wins the next activation after both restart.
    let high_frames = body_json(info_high_before).await["frames"].as_i64().unwrap();

    harness.put_json(&format!("/streams/start/{low_id}"), Some(MANAGER_TOKEN), &json!({})).await;
    harness.put_json(&format!("/streams/start/{high_id}"), Some(MANAGER_TOKEN), &json!({})).await;

    let reactivated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    assert_status(&reactivated, StatusCode::OK);
    let reactivated_body = body_json(reactivated).await;
    let token3 = reactivated_body["token"].as_str().unwrap();

    let started = harness.get("/core/start", Some(token3)).await;
    let winner = body_json(started).await["stream_id"].as_str().unwrap().to_owned();

    if high_frames > 0 {
        assert_eq!(winner, high_id, "the stream with more committed frames should win the tie-break");
    } else {
        assert_eq!(winner, low_id);
    }
}

/// The configurable error-count policy (`spec.md` §7, §9): once
/// `error_count` reaches the configured threshold, `core/stop` stops the
/// stream outright instead of returning it to the queue.
#[tokio::test]
async fn core_stop_errors_past_threshold_auto_stop() {
    let harness = TestAppBuilder::new()
        .with_manager(MANAGER_TOKEN, MANAGER_USER)
        .with_error_stop_threshold(2)
        .build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json("/streams", Some(MANAGER_TOKEN), &json!({"target_id": TARGET, "files": {}}))
        .await;
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    let token = body_json(activated).await["token"].as_str().unwrap().to_owned();

    let stop_resp = harness
        .put_json("/core/stop", Some(&token), &json!({"error": base64::encode("boom")}))
        .await;
    assert_status(&stop_resp, StatusCode::OK);
    let info = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    assert_eq!(body_json(info).await["status"], "OK", "below threshold, stream stays OK");

    let activated_again = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    let token2 = body_json(activated_again).await["token"].as_str().unwrap().to_owned();

    let stop_resp2 = harness
        .put_json("/core/stop", Some(&token2), &json!({"error": base64::encode("boom again")}))
        .await;
    assert_status(&stop_resp2, StatusCode::OK);

    let info2 = harness.get(&format!("/streams/info/{stream_id}"), None).await;
    let info2_body = body_json(info2).await;
    assert_eq!(info2_body["status"], "STOPPED");
    assert_eq!(info2_body["error_count"], 2);

    // Stopped streams never appear in the activation queue.
    let activate_again = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    assert_status(&activate_again, StatusCode::BAD_REQUEST);
}
