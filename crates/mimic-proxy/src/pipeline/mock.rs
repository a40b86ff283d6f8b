//! Mock responses rendered from the response DSL.

use super::handler::Exchange;
use super::headers::insert_all;
use crate::dsl;
use crate::model::{RequestContext, TrafficResponse};
use crate::template::Renderer;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{HeaderMap, Response, StatusCode};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Build the response for a mock rule. The parsed delay is awaited first;
/// it only holds up this request's task.
pub async fn mock_response(renderer: &Renderer, template: &str, ctx: &RequestContext) -> Exchange {
    let parsed = dsl::parse(template);

    if !parsed.delay.is_zero() {
        debug!(delay_ms = parsed.delay.as_millis() as u64, "Delaying mock response");
        tokio::time::sleep(parsed.delay).await;
    }

    let Ok(status) = StatusCode::from_u16(parsed.status_code) else {
        warn!(status = parsed.status_code, "Mock response has an invalid status code");
        return Exchange::error(500, "Invalid mock status code");
    };

    let rendered_headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), renderer.render_or_literal(value, ctx)))
        .collect();
    let body = renderer.render_or_literal(&parsed.body, ctx);

    let mut headers = HeaderMap::new();
    let rejected = insert_all(
        &mut headers,
        rendered_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );
    for name in rejected {
        warn!(header = %name, "Skipping invalid mock header");
    }

    let mut response = Response::new(Full::new(Bytes::from(body.clone())));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    let recorded_headers: BTreeMap<String, String> = rendered_headers.into_iter().collect();
    Exchange {
        response,
        recorded: TrafficResponse {
            status_code: parsed.status_code,
            headers: recorded_headers,
            body,
            delay_ms: parsed.delay.as_millis() as u64,
        },
    }
}
