//! Request forwarding to upstream servers.

use super::client::HttpClient;
use super::handler::{Exchange, InboundRequest};
use super::headers::{append_forwarded_for, flatten, strip_hop_by_hop};
use super::route::{strip_service, Route};
use crate::model::{RequestContext, TrafficResponse};
use crate::template::Renderer;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_ENCODING, HOST};
use hyper::{Request, Response, Uri};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::Read;
use std::time::Instant;
use tracing::{debug, error, warn};

/// JSON error body in the `{"error": "..."}` shape.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

/// Swap a `localhost` or `127.0.0.1` host for `alias`.
pub fn apply_localhost_alias(target: &str, alias: Option<&str>) -> String {
    let Some(alias) = alias.filter(|a| !a.is_empty()) else {
        return target.to_string();
    };
    let Some((scheme, rest)) = target.split_once("://") else {
        return target.to_string();
    };
    for host in ["localhost", "LOCALHOST", "127.0.0.1"] {
        if let Some(after) = rest.strip_prefix(host) {
            if after.is_empty() || after.starts_with([':', '/', '?']) {
                return format!("{scheme}://{alias}{after}");
            }
        }
    }
    target.to_string()
}

/// Join `target`'s path with the forwarded path using exactly one slash and
/// merge both query strings.
pub fn build_upstream_uri(target: &str, path: &str, query: Option<&str>) -> Result<Uri, String> {
    let base: Uri = target
        .parse()
        .map_err(|e| format!("invalid proxy target '{target}': {e}"))?;
    let (Some(scheme), Some(authority)) = (base.scheme_str(), base.authority()) else {
        return Err(format!("proxy target '{target}' must be an absolute URL"));
    };

    let joined = join_paths(base.path(), path);
    let query = match (base.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => format!("?{a}&{b}"),
        (Some(q), None) | (None, Some(q)) => format!("?{q}"),
        (None, None) => String::new(),
    };

    format!("{scheme}://{authority}{joined}{query}")
        .parse()
        .map_err(|e| format!("invalid upstream URL: {e}"))
}

fn join_paths(base: &str, path: &str) -> String {
    if path.is_empty() {
        return if base.is_empty() { "/".into() } else { base.into() };
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Undo gzip for the recorded copy of a body. `None` when `body` is not
/// valid gzip.
pub fn gunzip(body: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

/// Forward a buffered request and capture the upstream response.
#[allow(clippy::too_many_arguments)]
pub async fn forward_request(
    client: &HttpClient,
    renderer: &Renderer,
    localhost_alias: Option<&str>,
    target: &str,
    rule_headers: &BTreeMap<String, String>,
    req: &InboundRequest,
    route: &Route,
    ctx: &RequestContext,
) -> Exchange {
    let start = Instant::now();

    let target = renderer.render_or_literal(target, ctx);
    let target = apply_localhost_alias(&target, localhost_alias);
    let forwarded_path = strip_service(&route.path, &route.service);
    let uri = match build_upstream_uri(&target, &forwarded_path, req.uri.query()) {
        Ok(uri) => uri,
        Err(message) => {
            error!(service = %route.service, "{}", message);
            return Exchange::error(500, "Invalid upstream URL");
        }
    };

    debug!(service = %route.service, "Forwarding to: {}", uri);

    let mut headers = req.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    if let Some(authority) = uri.authority() {
        if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
            headers.insert(HOST, host);
        }
    }
    if let Some(remote) = req.remote_addr {
        append_forwarded_for(&mut headers, remote.ip());
    }
    for (name, template) in rule_headers {
        let rendered = renderer.render_or_literal(template, ctx);
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&rendered),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(service = %route.service, header = %name, "Skipping invalid rule header"),
        }
    }

    let mut builder = Request::builder().method(req.method.clone()).uri(uri);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    let upstream_req = match builder.body(BoxBody::new(
        Full::new(req.body.clone()).map_err(|never: Infallible| match never {}),
    )) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to build upstream request: {}", e);
            return Exchange::error(500, "Invalid upstream request");
        }
    };

    let upstream_response = match client.request(upstream_req).await {
        Ok(r) => r,
        Err(e) => {
            error!(service = %route.service, "Failed to forward request to upstream: {}", e);
            let mut exchange = Exchange::error(502, "Bad Gateway");
            exchange.recorded.delay_ms = start.elapsed().as_millis() as u64;
            return exchange;
        }
    };

    let (mut parts, body) = upstream_response.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to collect upstream response body: {}", e);
            return Exchange::error(502, "Failed to read upstream response");
        }
    };
    let delay_ms = start.elapsed().as_millis() as u64;

    strip_hop_by_hop(&mut parts.headers);

    let mut recorded_headers = flatten(&parts.headers);
    let gzipped = parts
        .headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"));
    let recorded_body = if gzipped {
        match gunzip(&body_bytes) {
            Some(plain) => {
                recorded_headers.remove("Content-Encoding");
                String::from_utf8_lossy(&plain).into_owned()
            }
            None => {
                warn!(service = %route.service, "Upstream body claims gzip but does not decode");
                String::from_utf8_lossy(&body_bytes).into_owned()
            }
        }
    } else {
        String::from_utf8_lossy(&body_bytes).into_owned()
    };

    let recorded = TrafficResponse {
        status_code: parts.status.as_u16(),
        headers: recorded_headers,
        body: recorded_body,
        delay_ms,
    };
    Exchange {
        response: Response::from_parts(parts, Full::new(body_bytes)),
        recorded,
    }
}
