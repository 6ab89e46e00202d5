//! HTTP response construction.
//!
//! Plain-status helpers plus the streaming layer that serves cache entries
//! with validator and range support.

use crate::cache::Cache;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::DateTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::error;

/// Cache hint for immutable artifact responses.
pub(crate) const AGE_FOREVER: u32 = 365 * 24 * 3600;
/// Cache hint for mutable (latest/lookup/list) responses.
pub(crate) const AGE_MUTABLE: u32 = 60;
/// Cache hint for malformed-request rejections.
pub(crate) const AGE_MALFORMED: u32 = 3600;

pub(crate) fn set_cache_control(headers: &mut HeaderMap, age: u32) {
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={age}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

/// A text/plain response with an optional cache hint.
pub(crate) fn text(status: StatusCode, age: Option<u32>, body: impl Into<String>) -> Response {
    let mut response = (status, body.into()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Some(age) = age {
        set_cache_control(response.headers_mut(), age);
    }
    response
}

pub(crate) fn not_found(age: u32, message: impl Into<String>) -> Response {
    text(StatusCode::NOT_FOUND, Some(age), message)
}

pub(crate) fn not_found_default(age: u32) -> Response {
    not_found(age, "Not Found")
}

pub(crate) fn method_not_allowed() -> Response {
    text(
        StatusCode::METHOD_NOT_ALLOWED,
        Some(AGE_MALFORMED),
        "Method Not Allowed",
    )
}

pub(crate) fn internal_server_error() -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, None, "Internal Server Error")
}

pub(crate) fn bad_gateway() -> Response {
    text(StatusCode::BAD_GATEWAY, None, "Bad Gateway")
}

/// Serve a cache entry, honoring `If-None-Match`/`If-Modified-Since`
/// validators and single byte ranges. Multi-range requests get the whole
/// entry.
pub(crate) async fn serve_cache(
    method: &Method,
    request_headers: &HeaderMap,
    cache: Cache,
    age: u32,
) -> Response {
    let etag = format!("\"{}\"", BASE64.encode(cache.checksum()));
    let size = cache.size();

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(cache.mime_type()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    let last_modified = cache
        .mod_time()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    set_cache_control(&mut headers, age);

    if not_modified(request_headers, &etag, cache.mod_time().timestamp()) {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }

    let range = request_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|spec| parse_range(spec, size))
        .unwrap_or(RangeDecision::Whole);

    let (status, start, length) = match range {
        RangeDecision::Whole => (StatusCode::OK, 0, size),
        RangeDecision::Partial(start, length) => {
            let end = start + length - 1;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (StatusCode::PARTIAL_CONTENT, start, length)
        }
        RangeDecision::Unsatisfiable => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            return (StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response();
        }
    };

    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }

    if method == Method::HEAD {
        return (status, headers, Body::empty()).into_response();
    }

    let mut content = cache.into_content();
    if start > 0 {
        if let Err(err) = content.seek(std::io::SeekFrom::Start(start)).await {
            error!(%err, "seeking cache entry failed");
            return internal_server_error();
        }
    }
    let body = Body::from_stream(ReaderStream::new(content.take(length)));
    (status, headers, body).into_response()
}

fn not_modified(request_headers: &HeaderMap, etag: &str, mod_time_secs: i64) -> bool {
    if let Some(if_none_match) = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return if_none_match
            .split(',')
            .any(|token| token.trim() == etag || token.trim() == "*");
    }
    if let Some(if_modified_since) = request_headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(since) = DateTime::parse_from_rfc2822(if_modified_since) {
            return mod_time_secs <= since.timestamp();
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeDecision {
    Whole,
    /// `(start, length)`, both validated against the entry size.
    Partial(u64, u64),
    Unsatisfiable,
}

fn parse_range(value: &str, size: u64) -> RangeDecision {
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return RangeDecision::Whole;
    };
    if ranges.contains(',') {
        return RangeDecision::Whole;
    }
    if size == 0 {
        return RangeDecision::Unsatisfiable;
    }

    let Some((start, end)) = ranges.split_once('-') else {
        return RangeDecision::Whole;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix form: the final N bytes.
        return match end.parse::<u64>() {
            Ok(0) | Err(_) => RangeDecision::Unsatisfiable,
            Ok(n) => {
                let length = n.min(size);
                RangeDecision::Partial(size - length, length)
            }
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeDecision::Unsatisfiable;
    };
    if start >= size {
        return RangeDecision::Unsatisfiable;
    }

    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return RangeDecision::Unsatisfiable,
        }
    };

    RangeDecision::Partial(start, end - start + 1)
}
