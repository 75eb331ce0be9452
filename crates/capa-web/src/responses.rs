//! Response shaping.

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::CONTENT_TYPE,
    },
    response::{IntoResponse, Response},
};
use capa_core::{InvokeResponse, MetadataMap};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// 204 with no body.
#[must_use]
pub fn empty() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Pre-encoded JSON body with `application/json`.
#[must_use]
pub fn json(status: StatusCode, body: Vec<u8>) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
        body,
    )
        .into_response()
}

/// Render an invocation result.
///
/// The status is forwarded verbatim when the runtime flagged it as HTTP,
/// otherwise the canonical code is translated. Runtime headers are copied;
/// the content type falls back to JSON.
#[must_use]
pub fn invoke(result: InvokeResponse) -> Response {
    let status =
        StatusCode::from_u16(result.status.to_http()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::new(Body::from(result.data));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    copy_metadata(&result.headers, headers);

    let content_type = result
        .content_type
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(CONTENT_TYPE, content_type);

    response
}

/// Copy a metadata map onto response headers, skipping names or values that
/// are not valid HTTP.
fn copy_metadata(metadata: &MetadataMap, headers: &mut HeaderMap) {
    for (name, values) in metadata {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
}

/// Collect request headers into a metadata map, keeping every value.
#[must_use]
pub fn headers_to_metadata(headers: &HeaderMap) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (name, value) in headers {
        metadata
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    metadata
}
