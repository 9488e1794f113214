//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method dispatch, proxy route
//! matching, static fallback, and access logging.

use crate::config::AppState;
use crate::handler::{proxy, static_files};
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, Uri, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Main entry point for HTTP request handling
///
/// The request body is never read, so any body type is accepted.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    drop(body);

    let response = route_request(&parts, &state).await;

    if state.config.logging.access_log {
        let entry = access_entry(&parts, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Dispatch on method, then on path
pub async fn route_request(req: &Parts, state: &AppState) -> Response<Full<Bytes>> {
    let uri = &req.uri;
    match req.method {
        Method::OPTIONS => http::build_options_response(),
        Method::GET if is_proxy_route(uri, &state.config.proxy.route) => {
            proxy::handle_proxy(uri.query().unwrap_or_default(), state).await
        }
        Method::GET => static_files::serve(uri.path(), uri.query(), false, state).await,
        Method::HEAD => static_files::serve(uri.path(), uri.query(), true, state).await,
        ref method => {
            logger::log_warning(&format!("Method not supported: {method} {uri}"));
            http::build_501_response(method)
        }
    }
}

/// The proxy route needs its exact path followed by a query string
fn is_proxy_route(uri: &Uri, route: &str) -> bool {
    uri.path() == route && uri.query().is_some()
}

fn access_entry(
    req: &Parts,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method.to_string(),
        req.uri.path().to_string(),
    );
    entry.query = req.uri.query().map(ToString::to_string);
    entry.http_version = version_label(req.version).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response.body().size_hint().exact().unwrap_or(0);
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
