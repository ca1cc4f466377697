//! Test harness: an in-memory `App` driven through the real router via
//! `tower::ServiceExt::oneshot`, mirroring the teacher's `tests/it/support`
//! layout (a `TestContext` wrapping a cloned `Router`, no real socket).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;

use scv::api::{build_router, App};
use scv::clock::TestClock;
use scv::config::Config;
use scv::directory::{InMemoryTargetCatalog, InMemoryUserDirectory, TargetCatalog, UserDirectory};

const LOOPBACK: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

pub struct TestApp {
    pub app: Arc<App>,
    pub clock: Arc<TestClock>,
    targets: Arc<InMemoryTargetCatalog>,
    _tmp: tempfile::TempDir,
}

impl TestApp {
    pub fn set_owner(&self, target_id: &str, user_id: &str) {
        self.targets.set_owner(target_id, user_id);
    }

    fn router(&self) -> Router {
        build_router(Arc::clone(&self.app)).with_state(Arc::clone(&self.app))
    }

    pub async fn request(&self, method: Method, path: &str, auth: Option<&str>, body: Body) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = auth {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        let mut req = builder.body(body).expect("request builds");
        req.extensions_mut().insert(ConnectInfo(LOOPBACK));

        self.router().oneshot(req).await.expect("axum always responds")
    }

    pub async fn get(&self, path: &str, auth: Option<&str>) -> Response {
        self.request(Method::GET, path, auth, Body::empty()).await
    }

    pub async fn put_json<P: Serialize + ?Sized>(&self, path: &str, auth: Option<&str>, payload: &P) -> Response {
        self.json_request(Method::PUT, path, auth, payload).await
    }

    pub async fn post_json<P: Serialize + ?Sized>(&self, path: &str, auth: Option<&str>, payload: &P) -> Response {
        self.json_request(Method::POST, path, auth, payload).await
    }

    pub async fn post_empty(&self, path: &str, auth: Option<&str>) -> Response {
        self.request(Method::POST, path, auth, Body::empty()).await
    }

    pub async fn put_bytes(&self, path: &str, auth: Option<&str>, body: Vec<u8>) -> Response {
        self.request(Method::PUT, path, auth, Body::from(body)).await
    }

    async fn json_request<P: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        auth: Option<&str>,
        payload: &P,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = auth {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        let mut req = builder
            .body(Body::from(serde_json::to_vec(payload).expect("serializes")))
            .expect("request builds");
        req.extensions_mut().insert(ConnectInfo(LOOPBACK));

        self.router().oneshot(req).await.expect("axum always responds")
    }
}

pub struct TestAppBuilder {
    managers: std::collections::HashMap<String, String>,
    heartbeat_seconds: u64,
    error_stop_threshold: Option<u32>,
    allow_loopback_router: bool,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        TestAppBuilder {
            managers: std::collections::HashMap::new(),
            heartbeat_seconds: 900,
            error_stop_threshold: None,
            allow_loopback_router: true,
        }
    }

    pub fn with_manager(mut self, token: &str, user_id: &str) -> Self {
        self.managers.insert(token.to_owned(), user_id.to_owned());
        self
    }

    pub fn with_heartbeat_seconds(mut self, seconds: u64) -> Self {
        self.heartbeat_seconds = seconds;
        self
    }

    pub fn with_error_stop_threshold(mut self, threshold: u32) -> Self {
        self.error_stop_threshold = Some(threshold);
        self
    }

    pub fn deny_router(mut self) -> Self {
        self.allow_loopback_router = false;
        self
    }

    pub fn build(self) -> TestApp {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = Config {
            shard_name: "shard0".to_owned(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            streams_dir: tmp.path().to_path_buf(),
            heartbeat_seconds: self.heartbeat_seconds,
            tick_period_seconds: 3,
            router_addrs: Vec::new(),
            allow_loopback_router: self.allow_loopback_router,
            error_stop_threshold: self.error_stop_threshold,
            user_directory_url: None,
            target_catalog_url: None,
            max_concurrency: 256,
        };
        let clock = Arc::new(TestClock::new(1_000));
        let user_directory = UserDirectory::in_memory(self.managers);
        let targets = Arc::new(InMemoryTargetCatalog::default());
        let target_catalog = TargetCatalog::in_memory_shared(Arc::clone(&targets));

        let app = Arc::new(App::new(config, clock.clone(), user_directory, target_catalog));
        TestApp {
            app,
            clock,
            targets,
            _tmp: tmp,
        }
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("reading body");
    serde_json::from_slice(&bytes).expect("valid json body")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("reading body")
        .to_vec()
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status code");
}
