//! Traffic inspection handlers, including the live SSE feed.

use crate::admin_api::types::{
    error_response, json_response, store_error_response, IndexedRule, TrafficQuery,
};
use crate::model::TrafficEntry;
use crate::pipeline::{ResponseBody, ResponseExt};
use crate::store::{Store, TrafficSubscription};
use bytes::Bytes;
use futures::Stream;
use http_body_util::combinators::BoxBody;
use http_body_util::{Full, StreamBody};
use hyper::body::Frame;
use hyper::{Response, StatusCode};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// GET /api/w/:ws/traffic
pub fn handle_list(store: &Store, query: Option<&str>) -> Response<Full<Bytes>> {
    let params = TrafficQuery::parse(query);
    json_response(
        StatusCode::OK,
        &store.get_traffic(params.limit, params.service.as_deref()),
    )
}

/// GET /api/w/:ws/traffic/:id
pub fn handle_get(store: &Store, id: &str) -> Response<Full<Bytes>> {
    match store.get_traffic_by_id(id) {
        Some(entry) => json_response(StatusCode::OK, &entry),
        None => error_response(
            StatusCode::NOT_FOUND,
            &format!("traffic entry '{id}' not found"),
        ),
    }
}

/// POST /api/w/:ws/traffic/:id/rule
pub fn handle_create_rule(store: &Store, id: &str) -> Response<Full<Bytes>> {
    match store.add_rule_from_traffic(id) {
        Ok((service, index)) => {
            let rule = store.get_rules(&service).get(index).cloned().unwrap_or_default();
            json_response(
                StatusCode::CREATED,
                &IndexedRule {
                    service,
                    index,
                    rule,
                },
            )
        }
        Err(e) => store_error_response(&e),
    }
}

/// GET /api/w/:ws/traffic/stream
///
/// One `data: <json>` event per entry. The stream ends when the client goes
/// away or the workspace is closed.
pub fn handle_stream(store: Arc<Store>) -> Response<ResponseBody> {
    let TrafficSubscription { id, receiver } = store.subscribe();
    debug!(workspace = %store.name(), subscriber = id, "Traffic stream opened");

    let events = TrafficEvents {
        receiver,
        store,
        id,
    };

    match Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .body(BoxBody::new(StreamBody::new(events)))
    {
        Ok(response) => response,
        Err(e) => {
            warn!("Failed to build traffic stream response: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to open stream").into_boxed()
        }
    }
}

/// SSE frame for one entry.
pub fn sse_event(entry: &TrafficEntry) -> Bytes {
    let json = serde_json::to_string(entry).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

/// Subscription adapter that unsubscribes when the response body is dropped.
struct TrafficEvents {
    receiver: mpsc::Receiver<TrafficEntry>,
    store: Arc<Store>,
    id: u64,
}

impl Stream for TrafficEvents {
    type Item = Result<Frame<Bytes>, hyper::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver
            .poll_recv(cx)
            .map(|entry| entry.map(|entry| Ok(Frame::data(sse_event(&entry)))))
    }
}

impl Drop for TrafficEvents {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
        debug!(workspace = %self.store.name(), subscriber = self.id, "Traffic stream closed");
    }
}
