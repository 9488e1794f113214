//! CORS header set
//!
//! The frontend runs from another origin, so proxy responses and preflight
//! answers carry the same permissive header set.

use hyper::http::response::Builder;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type";

/// Attach the full CORS header set to a response builder
pub fn with_cors(builder: Builder) -> Builder {
    builder
        .header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
        .header("Access-Control-Allow-Methods", ALLOW_METHODS)
        .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
}
