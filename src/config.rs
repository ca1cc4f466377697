//! Shard configuration, loaded from CLI flags with environment-variable
//! fallback (`SPEC_FULL.md` §A.1). Replaces the source's process-wide
//! mutable options table with an explicit record passed to the shard at
//! construction (`spec.md` §9, "Global mutable options").

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Shard server (SCV) for sharded simulation work dispatch")]
pub struct Config {
    /// This shard's name, used in stream ids (`<uuid>:<shard_name>`) and
    /// the on-disk `<shard_name>_data/` root.
    #[arg(long, env = "SCV_SHARD_NAME")]
    pub shard_name: String,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "SCV_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Root directory under which `<shard_name>_data/streams/<id>/` lives.
    #[arg(long, env = "SCV_STREAMS_DIR", default_value = "./data")]
    pub streams_dir: PathBuf,

    /// Heartbeat lease duration in seconds (`H` in `spec.md` §4.6).
    #[arg(long, env = "SCV_HEARTBEAT_SECONDS", default_value_t = 900)]
    pub heartbeat_seconds: u64,

    /// Lease-reaper tick period in seconds (`P` in `spec.md` §4.6).
    #[arg(long, env = "SCV_TICK_PERIOD_SECONDS", default_value_t = 3)]
    pub tick_period_seconds: u64,

    /// Command-center addresses allowed to call router-authenticated routes
    /// (`spec.md` §4.4). Comma-separated when set via environment variable.
    #[arg(long = "router-addr", env = "SCV_ROUTER_ADDRS", value_delimiter = ',')]
    pub router_addrs: Vec<IpAddr>,

    /// Test-mode escape hatch: also accept loopback as a router address
    /// (`spec.md` §4.4, "is in the configured ... set, or is loopback (test
    /// mode)").
    #[arg(long, env = "SCV_ALLOW_LOOPBACK_ROUTER")]
    pub allow_loopback_router: bool,

    /// Maximum `error_count` before a stream is auto-stopped. Unset means
    /// the policy the source leaves unimplemented never fires (`spec.md`
    /// §7, §9 "Error-count policy").
    #[arg(long, env = "SCV_ERROR_STOP_THRESHOLD")]
    pub error_stop_threshold: Option<u32>,

    /// Base URL of the user/auth store (`spec.md` §1). Omit to run against
    /// the in-memory fake (local/dev or test fixtures).
    #[arg(long, env = "SCV_USER_DIRECTORY_URL")]
    pub user_directory_url: Option<reqwest::Url>,

    /// Base URL of the target catalog (`spec.md` §1). Omit to run against
    /// the in-memory fake.
    #[arg(long, env = "SCV_TARGET_CATALOG_URL")]
    pub target_catalog_url: Option<reqwest::Url>,

    /// Maximum concurrent in-flight requests (`SPEC_FULL.md` §B).
    #[arg(long, env = "SCV_MAX_CONCURRENCY", default_value_t = 256)]
    pub max_concurrency: usize,
}

impl Config {
    pub fn heartbeat_seconds(&self) -> i64 {
        self.heartbeat_seconds as i64
    }

    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_period_seconds)
    }

    /// `true` if `addr` is allowed to call router-authenticated routes
    /// (`spec.md` §4.4).
    pub fn is_router_addr(&self, addr: IpAddr) -> bool {
        if self.router_addrs.contains(&addr) {
            return true;
        }
        self.allow_loopback_router && addr.is_loopback()
    }
}
