//! Body conversions shared by both listeners.
//!
//! Handlers build `Response<Full<Bytes>>`; hyper services return boxed
//! bodies so buffered and streamed (SSE) responses share one type.

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use std::convert::Infallible;

pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Box a buffered body.
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    BoxBody::new(Full::new(bytes.into()).map_err(|never: Infallible| match never {}))
}

pub trait ResponseExt {
    /// `Response<Full<Bytes>>` to `Response<BoxBody<Bytes, hyper::Error>>`.
    fn into_boxed(self) -> Response<ResponseBody>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<ResponseBody> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}
