//! Common types used throughout the middleware pipeline.
//!
//! The pipeline operates on fully buffered requests: the server front-end
//! collects the body before dispatch, so middleware never deal with a
//! partially read stream.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type consumed by the pipeline.
///
/// A standard `http::Request` whose body has already been collected
/// into contiguous bytes.
pub type Request = http::Request<Bytes>;

/// The HTTP response type produced by the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Builds a JSON error envelope body.
///
/// All error responses produced by the pipeline share this shape:
///
/// ```json
/// {"error": {"code": "NOT_FOUND", "message": "...", "request_id": "..."}}
/// ```
#[must_use]
pub fn error_envelope(code: &str, message: &str, request_id: &str) -> Bytes {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "request_id": request_id,
        }
    });
    Bytes::from(body.to_string())
}
