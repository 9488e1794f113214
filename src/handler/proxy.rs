//! Proxy route
//!
//! Fetches the page named by the `url` query parameter and relays it to the
//! browser inside a small JSON envelope, with CORS headers attached.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::Response;
use reqwest::Client;
use serde::Serialize;
use url::form_urlencoded;

use crate::config::AppState;
use crate::error::ProxyError;
use crate::http;
use crate::logger;

/// Value reported in `status.content_type`; fixed, not taken from upstream
pub const ENVELOPE_CONTENT_TYPE: &str = "text/html";

/// JSON wrapper returned on a successful fetch
#[derive(Debug, Serialize)]
pub struct ProxyEnvelope {
    pub contents: String,
    pub status: EnvelopeStatus,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeStatus {
    /// The requested URL, echoed verbatim
    pub url: String,
    pub content_type: &'static str,
}

impl ProxyEnvelope {
    pub fn new(contents: String, url: &str) -> Self {
        Self {
            contents,
            status: EnvelopeStatus {
                url: url.to_string(),
                content_type: ENVELOPE_CONTENT_TYPE,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, ProxyError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Pull the target URL out of a raw query string.
///
/// Blank values are skipped, so `url=` alone counts as missing. When several
/// `url` parameters are present the first non-blank one wins.
pub fn extract_target_url(query: &str) -> Result<String, ProxyError> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "url" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
        .ok_or(ProxyError::MissingParameter)
}

/// Fetch `target_url` once and wrap the decoded body.
///
/// Malformed UTF-8 in the body is replaced with U+FFFD instead of failing.
pub async fn fetch(client: &Client, target_url: &str) -> Result<ProxyEnvelope, ProxyError> {
    let response = client.get(target_url).send().await?;

    let status = response.status();
    if !status.is_success() {
        // hyper only records the phrase when it is not the standard one
        let phrase = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(ReasonPhrase::as_bytes);
        return Err(ProxyError::upstream_status(status, phrase));
    }

    let body = response.bytes().await?;
    let contents = String::from_utf8_lossy(&body).into_owned();
    Ok(ProxyEnvelope::new(contents, target_url))
}

/// Handle `GET <route>?<query>`
pub async fn handle_proxy(query: &str, state: &AppState) -> Response<Full<Bytes>> {
    let target_url = match extract_target_url(query) {
        Ok(url) => url,
        Err(e) => {
            logger::log_warning(&format!("Proxy request rejected: {e}"));
            return error_response(&e);
        }
    };

    logger::log_fetch_start(&target_url);

    let result = match fetch(&state.client, &target_url).await {
        Ok(envelope) => envelope
            .to_json()
            .map(|json| (json, envelope.contents.len())),
        Err(e) => Err(e),
    };

    match result {
        Ok((json, fetched)) => {
            logger::log_fetch_success(fetched);
            http::build_json_response(json)
        }
        Err(e) => {
            logger::log_fetch_failed(&target_url, &e);
            error_response(&e)
        }
    }
}

fn error_response(err: &ProxyError) -> Response<Full<Bytes>> {
    http::build_text_response(err.status(), &err.to_string(), true)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Stub upstream used in place of real recipe sites
    async fn upstream_service(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let ua = req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let (status, body): (u16, Bytes) = match req.uri().path() {
            "/" => (200, Bytes::from_static(b"<html>hi</html>")),
            "/missing" => (404, Bytes::from_static(b"gone")),
            "/teapot" => (418, Bytes::new()),
            "/gone" => return Ok(with_phrase(404, "Recipe Gone")),
            "/origin-timeout" => return Ok(with_phrase(522, "Connection Timed Out")),
            "/invalid-utf8" => (200, Bytes::from_static(b"caf\xe9 \xff<p>")),
            "/ua" => (200, Bytes::from(ua)),
            "/redirect" => {
                return Ok(Response::builder()
                    .status(302)
                    .header("Location", "/")
                    .body(Full::new(Bytes::new()))
                    .unwrap());
            }
            "/slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                (200, Bytes::from_static(b"late"))
            }
            _ => (500, Bytes::new()),
        };

        Ok(Response::builder()
            .status(status)
            .body(Full::new(body))
            .unwrap())
    }

    /// Response carrying a reason phrase of its own choosing
    fn with_phrase(status: u16, phrase: &'static str) -> Response<Full<Bytes>> {
        let mut resp = Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .unwrap();
        resp.extensions_mut()
            .insert(ReasonPhrase::from_static(phrase.as_bytes()));
        resp
    }

    pub(crate) async fn spawn_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service_fn(upstream_service))
                        .await;
                });
            }
        });
        addr
    }

    pub(crate) fn test_client(timeout: Duration) -> Client {
        Client::builder()
            .timeout(timeout)
            .user_agent(crate::config::DEFAULT_USER_AGENT)
            .no_proxy()
            .build()
            .unwrap()
    }

    #[test]
    fn test_extract_target_url() {
        assert_eq!(
            extract_target_url("url=https%3A%2F%2Fexample.com%2F").unwrap(),
            "https://example.com/"
        );
        assert_eq!(
            extract_target_url("foo=1&url=https://a.test/x?y=1").unwrap(),
            "https://a.test/x?y=1"
        );
    }

    #[test]
    fn test_extract_first_url_wins() {
        assert_eq!(
            extract_target_url("url=https://first.test/&url=https://second.test/").unwrap(),
            "https://first.test/"
        );
    }

    #[test]
    fn test_extract_missing_or_blank() {
        assert!(matches!(
            extract_target_url(""),
            Err(ProxyError::MissingParameter)
        ));
        assert!(matches!(
            extract_target_url("u=https://example.com/"),
            Err(ProxyError::MissingParameter)
        ));
        assert!(matches!(
            extract_target_url("url="),
            Err(ProxyError::MissingParameter)
        ));
        assert_eq!(extract_target_url("url=&url=https://b.test/").unwrap(), "https://b.test/");
    }

    #[test]
    fn test_envelope_json_shape() {
        let json = ProxyEnvelope::new("<html>hi</html>".to_string(), "https://example.com/")
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            r#"{"contents":"<html>hi</html>","status":{"url":"https://example.com/","content_type":"text/html"}}"#
        );
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let addr = spawn_upstream().await;
        let url = format!("http://{addr}/");
        let envelope = fetch(&test_client(Duration::from_secs(5)), &url)
            .await
            .unwrap();
        assert_eq!(envelope.contents, "<html>hi</html>");
        assert_eq!(envelope.status.url, url);
        assert_eq!(envelope.status.content_type, "text/html");
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let addr = spawn_upstream().await;
        let envelope = fetch(&test_client(Duration::from_secs(5)), &format!("http://{addr}/ua"))
            .await
            .unwrap();
        assert_eq!(envelope.contents, crate::config::DEFAULT_USER_AGENT);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        let addr = spawn_upstream().await;
        let url = format!("http://{addr}/redirect");
        let envelope = fetch(&test_client(Duration::from_secs(5)), &url)
            .await
            .unwrap();
        assert_eq!(envelope.contents, "<html>hi</html>");
        // The envelope echoes what was asked for, not where it ended up
        assert_eq!(envelope.status.url, url);
    }

    #[tokio::test]
    async fn test_fetch_replaces_invalid_utf8() {
        let addr = spawn_upstream().await;
        let envelope = fetch(
            &test_client(Duration::from_secs(5)),
            &format!("http://{addr}/invalid-utf8"),
        )
        .await
        .unwrap();
        assert_eq!(envelope.contents, "caf\u{FFFD} \u{FFFD}<p>");
        assert!(envelope.to_json().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_upstream_404_is_mirrored() {
        let addr = spawn_upstream().await;
        let err = fetch(
            &test_client(Duration::from_secs(5)),
            &format!("http://{addr}/missing"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "HTTP Error: Not Found");
    }

    #[tokio::test]
    async fn test_fetch_upstream_unusual_status_is_mirrored() {
        let addr = spawn_upstream().await;
        let err = fetch(
            &test_client(Duration::from_secs(5)),
            &format!("http://{addr}/teapot"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_fetch_keeps_upstream_reason_phrase() {
        let addr = spawn_upstream().await;
        let client = test_client(Duration::from_secs(5));

        let err = fetch(&client, &format!("http://{addr}/gone"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "HTTP Error: Recipe Gone");

        let err = fetch(&client, &format!("http://{addr}/origin-timeout"))
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 522);
        assert_eq!(err.to_string(), "HTTP Error: Connection Timed Out");
    }

    #[tokio::test]
    async fn test_fetch_unresolvable_host() {
        let err = fetch(
            &test_client(Duration::from_secs(10)),
            "http://carrot-proxy-test.invalid/",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)), "{err:?}");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = err.to_string();
        assert!(text.starts_with("URL Error: "), "{text}");
        // The resolver failure is reported, not just the request URL
        assert!(text.contains("dns error"), "{text}");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = fetch(&test_client(Duration::from_secs(5)), &format!("http://{addr}/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_unreachable() {
        let addr = spawn_upstream().await;
        let err = fetch(
            &test_client(Duration::from_millis(300)),
            &format!("http://{addr}/slow"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_relative_url_is_internal_error() {
        let err = fetch(&test_client(Duration::from_secs(5)), "not-a-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Internal(_)), "{err:?}");
        assert!(err.to_string().starts_with("Server Error: "));
    }

    #[tokio::test]
    async fn test_error_response_is_plain_text_with_cors() {
        let resp = error_response(&ProxyError::MissingParameter);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            resp.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Missing 'url' parameter");
    }
}
