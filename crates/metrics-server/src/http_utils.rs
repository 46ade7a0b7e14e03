// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use metrics_common::codec::compress;
use metrics_common::constants::HASH_HEADER;
use serde_json::json;
use tracing::{debug, error, warn};

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Responses are assembled over a plain byte body and wrapped for hyper at the connection edge.
pub type HttpResponse = Response<Bytes>;

pub fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Does two things:
/// 1. Logs the given message: debug for success, warn for client errors, error otherwise.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> HttpResponse {
    if status.is_success() {
        debug!("{message}");
    } else if status.is_client_error() {
        warn!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    response(status, APPLICATION_JSON, body)
}

pub fn hash_header_name() -> Option<HeaderName> {
    HeaderName::from_bytes(HASH_HEADER.as_bytes()).ok()
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// True when there is no Content-Type header or its media type is `expected`.
pub fn content_type_allows(headers: &HeaderMap, expected: &str) -> bool {
    match headers.get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(expected)),
    }
}

fn lists_gzip(headers: &HeaderMap, name: HeaderName) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(','))
        .any(|coding| {
            coding
                .split(';')
                .next()
                .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
        })
}

pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    lists_gzip(headers, header::ACCEPT_ENCODING)
}

pub fn is_gzipped(headers: &HeaderMap) -> bool {
    lists_gzip(headers, header::CONTENT_ENCODING)
}

/// Compresses a non-empty body. On failure the response is returned unchanged.
pub fn gzip_response(response: HttpResponse) -> HttpResponse {
    if response.body().is_empty() {
        return response;
    }
    let (mut parts, body) = response.into_parts();
    match compress(&body) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            Response::from_parts(parts, Bytes::from(compressed))
        }
        Err(e) => {
            error!("Failed to compress response: {e}");
            Response::from_parts(parts, body)
        }
    }
}

/// Rejects requests whose declared Content-Length is invalid or above `max_content_length`.
///
/// Will return None if no issues are found. Otherwise returns the error response to send.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Option<HttpResponse> {
    let content_length_header = header_map.get(header::CONTENT_LENGTH)?;
    let content_length = match content_length_header
        .to_str()
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
    {
        Some(length) => length,
        None => {
            return Some(log_and_create_http_response(
                "Invalid Content-Length header",
                StatusCode::BAD_REQUEST,
            ));
        }
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            "Payload too large",
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_common::codec::decompress;

    fn headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_error_response_body() {
        let response = log_and_create_http_response("metric not found", StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.body().as_ref(),
            b"{\"message\":\"metric not found\"}"
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static(APPLICATION_JSON)
        );
    }

    #[test]
    fn test_content_type_allows() {
        assert!(content_type_allows(&HeaderMap::new(), APPLICATION_JSON));
        assert!(content_type_allows(
            &headers(&[(header::CONTENT_TYPE, "application/json; charset=utf-8")]),
            APPLICATION_JSON
        ));
        assert!(!content_type_allows(
            &headers(&[(header::CONTENT_TYPE, "text/plain")]),
            APPLICATION_JSON
        ));
    }

    #[test]
    fn test_gzip_negotiation() {
        assert!(accepts_gzip(&headers(&[(
            header::ACCEPT_ENCODING,
            "deflate, gzip;q=0.8"
        )])));
        assert!(!accepts_gzip(&headers(&[(header::ACCEPT_ENCODING, "br")])));
        assert!(is_gzipped(&headers(&[(header::CONTENT_ENCODING, "GZIP")])));
        assert!(!is_gzipped(&HeaderMap::new()));
    }

    #[test]
    fn test_gzip_response() {
        let compressed = gzip_response(response(StatusCode::OK, TEXT_PLAIN, "123"));
        assert_eq!(
            compressed.headers()[header::CONTENT_ENCODING],
            HeaderValue::from_static("gzip")
        );
        assert_eq!(decompress(compressed.body()).unwrap(), b"123");

        let empty = gzip_response(response(StatusCode::OK, TEXT_PLAIN, ""));
        assert!(empty.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_content_length_limits() {
        assert!(verify_request_content_length(&HeaderMap::new(), 10).is_none());
        assert!(
            verify_request_content_length(&headers(&[(header::CONTENT_LENGTH, "10")]), 10)
                .is_none()
        );
        let too_large =
            verify_request_content_length(&headers(&[(header::CONTENT_LENGTH, "11")]), 10)
                .unwrap();
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let invalid =
            verify_request_content_length(&headers(&[(header::CONTENT_LENGTH, "ten")]), 10)
                .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }
}
