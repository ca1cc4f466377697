//! `Access-Control-Allow-Origin: *` on every response (`spec.md` §6).
//! Unlike `control::cors`, which restricts to a configured origin list, the
//! shard's clients are untrusted cores and managers reached through a
//! router rather than a browser app, so a permissive layer is the faithful
//! translation of the source's blanket `set_header("Access-Control-Allow-
//! Origin", "*")` in `BaseHandler.set_default_headers`.

use tower_http::cors::CorsLayer;

pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}
