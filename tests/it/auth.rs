//! Auth disjointness (`spec.md` §8 property 5): no handler decorated for
//! one role succeeds when presented only a token valid for another role.

use axum::http::StatusCode;
use serde_json::json;

use crate::support::{assert_status, body_json, TestAppBuilder};

const MANAGER_TOKEN: &str = "manager-tok";
const MANAGER_USER: &str = "alice";
const TARGET: &str = "target-1";

#[tokio::test]
async fn core_token_cannot_call_manager_routes() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json("/streams", Some(MANAGER_TOKEN), &json!({"target_id": TARGET, "files": {}}))
        .await;
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let activated = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    let core_token = body_json(activated).await["token"].as_str().unwrap().to_owned();

    // A valid core token is not a valid manager token.
    let stop = harness
        .put_json(&format!("/streams/stop/{stream_id}"), Some(&core_token), &json!({}))
        .await;
    assert_status(&stop, StatusCode::UNAUTHORIZED);

    let delete = harness
        .put_json(&format!("/streams/delete/{stream_id}"), Some(&core_token), &json!({}))
        .await;
    assert_status(&delete, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn manager_token_cannot_call_core_routes() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();
    harness.set_owner(TARGET, MANAGER_USER);

    harness
        .post_json("/streams", Some(MANAGER_TOKEN), &json!({"target_id": TARGET, "files": {}}))
        .await;

    let start = harness.get("/core/start", Some(MANAGER_TOKEN)).await;
    assert_status(&start, StatusCode::UNAUTHORIZED);

    let heartbeat = harness.post_empty("/core/heartbeat", Some(MANAGER_TOKEN)).await;
    assert_status(&heartbeat, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_bearer_token_is_rejected_everywhere() {
    let harness = TestAppBuilder::new().with_manager(MANAGER_TOKEN, MANAGER_USER).build();

    let create = harness
        .post_json("/streams", Some("not-a-real-token"), &json!({"target_id": TARGET, "files": {}}))
        .await;
    assert_status(&create, StatusCode::UNAUTHORIZED);

    let start = harness.get("/core/start", Some("not-a-real-token")).await;
    assert_status(&start, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_mismatch_is_rejected() {
    let harness = TestAppBuilder::new()
        .with_manager(MANAGER_TOKEN, MANAGER_USER)
        .with_manager("other-tok", "mallory")
        .build();
    harness.set_owner(TARGET, MANAGER_USER);

    let created = harness
        .post_json("/streams", Some(MANAGER_TOKEN), &json!({"target_id": TARGET, "files": {}}))
        .await;
    let stream_id = body_json(created).await["stream_id"].as_str().unwrap().to_owned();

    let stop = harness
        .put_json(&format!("/streams/stop/{stream_id}"), Some("other-tok"), &json!({}))
        .await;
    assert_status(&stop, StatusCode::UNAUTHORIZED);
}

/// Router-authenticated routes require the caller to be an allow-listed
/// command-center address (or loopback in test mode) -- here denied.
#[tokio::test]
async fn router_route_rejects_non_router_callers() {
    let harness = TestAppBuilder::new().deny_router().build();

    let activate = harness
        .post_json("/streams/activate", None, &json!({"target_id": TARGET}))
        .await;
    assert_status(&activate, StatusCode::UNAUTHORIZED);
}
