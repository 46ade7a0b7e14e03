// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of the collector.
//!
//! | Route                            | Body             |
//! |----------------------------------|------------------|
//! | `GET /`                          | HTML listing     |
//! | `GET /ping`                      | storage health   |
//! | `GET /value/{type}/{name}`       | plain text value |
//! | `POST /value/`                   | JSON query       |
//! | `POST /update/{type}/{name}/{v}` | plain text       |
//! | `POST /update/`                  | JSON record      |
//! | `POST /updates/`                 | JSON array       |

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{HeaderMap, HeaderValue};
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_common::codec::{sign, PayloadDecoder};
use metrics_common::constants::{HASH_HEADER, REAL_IP_HEADER};
use metrics_common::errors::CodecError;
use metrics_common::metric::{Metric, MetricKind, MetricValue};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::http_utils::{
    accepts_gzip, content_type_allows, gzip_response, hash_header_name, header_str, is_gzipped,
    log_and_create_http_response, response, verify_request_content_length, HttpResponse,
    APPLICATION_JSON, TEXT_HTML, TEXT_PLAIN,
};
use crate::security::TrustedSubnet;
use crate::service::{MetricsService, ServiceError};

const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Everything a request handler needs.
pub struct ServerState {
    pub service: MetricsService,
    pub decoder: PayloadDecoder,
    pub trusted_subnet: Option<TrustedSubnet>,
}

pub struct MetricsServer {
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_timeout: Duration,
}

impl MetricsServer {
    pub async fn bind(
        address: &str,
        state: ServerState,
        shutdown_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            state: Arc::new(state),
            shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `cancel` fires, then lets in-flight requests finish within the
    /// shutdown timeout.
    pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = JoinSet::new();
        info!("Listening on {}", self.listener.local_addr()?);

        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => break,
                con_res = self.listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let conn = TokioIo::new(conn);
            let server = server.clone();
            let state = Arc::clone(&self.state);
            let cancel = cancel.clone();
            joinset.spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(handle(&state, req).await.map(Full::new)) }
                });
                let conn = server.serve_connection(conn, service);
                tokio::pin!(conn);
                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = cancel.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(e) = result {
                    error!("Connection error: {e}");
                }
            });
        }

        drop(self.listener);
        info!(
            "Stopped accepting connections, waiting for {} open connections",
            joinset.len()
        );
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while joinset.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "Timed out after {:?} waiting for connections, aborting them",
                self.shutdown_timeout
            );
            joinset.abort_all();
        }
        Ok(())
    }
}

/// Routes one request and applies the response-wide concerns: gzip and the access log line.
pub async fn handle<B>(state: &ServerState, req: Request<B>) -> HttpResponse
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let gzip = accepts_gzip(req.headers());

    let mut response = route(state, req).await;
    if gzip {
        response = gzip_response(response);
    }
    info!(
        "{method} {path} {} {} bytes in {:?}",
        response.status().as_u16(),
        response.body().len(),
        started.elapsed()
    );
    response
}

async fn route<B>(state: &ServerState, req: Request<B>) -> HttpResponse
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match (req.method(), segments.as_slice()) {
        (&Method::GET, [""]) => list_handler(state).await,
        (&Method::GET, ["ping"]) => ping_handler(state).await,
        (&Method::GET, ["value", kind, name]) => value_text_handler(state, kind, name).await,
        (&Method::POST, ["value"] | ["value", ""]) => value_json_handler(state, req).await,
        (&Method::POST, ["update"] | ["update", ""]) => update_json_handler(state, req).await,
        (&Method::POST, ["update", kind, name, raw]) => {
            update_text_handler(state, req.headers(), kind, name, raw).await
        }
        (&Method::POST, ["updates"] | ["updates", ""]) => update_batch_handler(state, req).await,
        (_, [""] | ["ping"] | ["value", ..] | ["update", ..] | ["updates", ..])
            if !matches!(*req.method(), Method::GET | Method::POST) =>
        {
            log_and_create_http_response(
                &format!("Method {} not allowed", req.method()),
                StatusCode::METHOD_NOT_ALLOWED,
            )
        }
        _ => log_and_create_http_response(&format!("No route for {path}"), StatusCode::NOT_FOUND),
    }
}

fn service_error_response(err: ServiceError) -> HttpResponse {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log_and_create_http_response(&err.to_string(), status)
}

fn codec_error_response(err: CodecError) -> HttpResponse {
    let message = match &err {
        CodecError::Serialize(e) => format!("Invalid JSON body: {e}"),
        other => format!("Invalid request payload: {other}"),
    };
    log_and_create_http_response(&message, StatusCode::BAD_REQUEST)
}

/// A JSON body, signed with the server key when one is configured.
fn json_response(state: &ServerState, metric: &Metric) -> HttpResponse {
    let body = match serde_json::to_vec(metric) {
        Ok(body) => body,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Failed to serialize response: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };
    let signature = sign(&body, state.decoder.key());
    let mut response = response(StatusCode::OK, APPLICATION_JSON, body);
    if let (Some(signature), Some(name)) = (signature, hash_header_name()) {
        if let Ok(value) = HeaderValue::from_str(&signature) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// Rejects a request whose source is outside the trusted subnet, when one is configured.
fn check_trusted(state: &ServerState, headers: &HeaderMap) -> Option<HttpResponse> {
    let subnet = state.trusted_subnet.as_ref()?;
    let real_ip = header_str(headers, REAL_IP_HEADER);
    if subnet.allows(real_ip) {
        return None;
    }
    Some(log_and_create_http_response(
        &format!(
            "Source address {} is outside trusted subnet {subnet}",
            real_ip.unwrap_or("<missing>")
        ),
        StatusCode::FORBIDDEN,
    ))
}

fn check_content_type(headers: &HeaderMap, expected: &str) -> Option<HttpResponse> {
    if content_type_allows(headers, expected) {
        return None;
    }
    Some(log_and_create_http_response(
        &format!("Content-Type must be {expected}"),
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
    ))
}

/// Reads, unframes and parses a JSON request body.
async fn read_json<T, B>(state: &ServerState, req: Request<B>) -> Result<T, HttpResponse>
where
    T: DeserializeOwned,
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if let Some(response) = check_content_type(req.headers(), APPLICATION_JSON) {
        return Err(response);
    }
    if let Some(response) = verify_request_content_length(req.headers(), MAX_CONTENT_LENGTH) {
        return Err(response);
    }

    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_CONTENT_LENGTH).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Err(log_and_create_http_response(
                &format!("Failed to read request body: {e}"),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let signature = header_str(&parts.headers, HASH_HEADER);
    state
        .decoder
        .decode(&body, is_gzipped(&parts.headers), signature)
        .map_err(codec_error_response)
}

async fn list_handler(state: &ServerState) -> HttpResponse {
    match state.service.list().await {
        Ok(metrics) => {
            let body = metrics
                .iter()
                .map(|(name, value)| listing_line(name, value))
                .collect::<Vec<_>>()
                .join("\n");
            response(StatusCode::OK, TEXT_HTML, body)
        }
        Err(e) => service_error_response(e),
    }
}

async fn ping_handler(state: &ServerState) -> HttpResponse {
    match state.service.ping().await {
        Ok(()) => response(StatusCode::OK, TEXT_PLAIN, "OK"),
        Err(e) => service_error_response(e),
    }
}

async fn value_text_handler(state: &ServerState, kind: &str, name: &str) -> HttpResponse {
    if name.is_empty() {
        return log_and_create_http_response("Metric name is required", StatusCode::NOT_FOUND);
    }
    let query = Metric::query(name, MetricKind::from(kind.to_string()));
    match state.service.value(&query).await {
        Ok(metric) => match metric.validate() {
            Ok(value) => response(StatusCode::OK, TEXT_PLAIN, value.to_string()),
            Err(e) => service_error_response(e.into()),
        },
        // An unknown type in the path reads as a missing metric.
        Err(ServiceError::Validation(e)) => {
            log_and_create_http_response(&e.to_string(), StatusCode::NOT_FOUND)
        }
        Err(e) => service_error_response(e),
    }
}

async fn value_json_handler<B>(state: &ServerState, req: Request<B>) -> HttpResponse
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let query: Metric = match read_json(state, req).await {
        Ok(query) => query,
        Err(response) => return response,
    };
    match state.service.value(&query).await {
        Ok(metric) => json_response(state, &metric),
        Err(e) => service_error_response(e),
    }
}

async fn update_text_handler(
    state: &ServerState,
    headers: &HeaderMap,
    kind: &str,
    name: &str,
    raw: &str,
) -> HttpResponse {
    if let Some(response) = check_content_type(headers, "text/plain") {
        return response;
    }
    if name.is_empty() {
        return log_and_create_http_response("Metric name is required", StatusCode::NOT_FOUND);
    }
    let metric = match Metric::parse_text(kind, name, raw) {
        Ok(metric) => metric,
        Err(e) => return service_error_response(e.into()),
    };
    match state.service.update(&metric).await {
        Ok(stored) => {
            debug!("Updated {} {} via text route", stored.kind, stored.id);
            response(StatusCode::OK, TEXT_PLAIN, "")
        }
        Err(e) => service_error_response(e),
    }
}

async fn update_json_handler<B>(state: &ServerState, req: Request<B>) -> HttpResponse
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if let Some(response) = check_trusted(state, req.headers()) {
        return response;
    }
    let metric: Metric = match read_json(state, req).await {
        Ok(metric) => metric,
        Err(response) => return response,
    };
    match state.service.update(&metric).await {
        Ok(stored) => json_response(state, &stored),
        Err(e) => service_error_response(e),
    }
}

async fn update_batch_handler<B>(state: &ServerState, req: Request<B>) -> HttpResponse
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if let Some(response) = check_trusted(state, req.headers()) {
        return response;
    }
    let metrics: Vec<Metric> = match read_json(state, req).await {
        Ok(metrics) => metrics,
        Err(response) => return response,
    };
    match state.service.update_batch(&metrics).await {
        Ok(()) => log_and_create_http_response(
            &format!("Updated {} metrics", metrics.len()),
            StatusCode::OK,
        ),
        Err(e) => service_error_response(e),
    }
}

/// Formats one stored value the way the listing page shows it.
pub fn listing_line(name: &str, value: &MetricValue) -> String {
    format!("{name}: {value};")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::Storage;
    use metrics_common::codec::{compress, decompress, PayloadEncoder};
    use metrics_common::crypto::Decryptor;

    fn state(key: Option<&str>, trusted_subnet: Option<&str>) -> ServerState {
        ServerState {
            service: MetricsService::new(Arc::new(MemoryStorage::new())),
            decoder: PayloadDecoder::new(key.map(str::to_string), Decryptor::default()),
            trusted_subnet: trusted_subnet.map(|cidr| cidr.parse().unwrap()),
        }
    }

    fn request(method: Method, uri: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body.into()))
            .unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request<Full<Bytes>> {
        let mut req = request(Method::POST, uri, body.to_string());
        req.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_JSON),
        );
        req
    }

    fn body_str(response: &HttpResponse) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_text_update_and_read_back() {
        let state = state(None, None);
        let response = handle(&state, request(Method::POST, "/update/counter/PollCount/2", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        handle(&state, request(Method::POST, "/update/counter/PollCount/3", "")).await;
        handle(&state, request(Method::POST, "/update/gauge/Alloc/123.5", "")).await;

        let response = handle(&state, request(Method::GET, "/value/counter/PollCount", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_str(&response), "5");

        let response = handle(&state, request(Method::GET, "/value/gauge/Alloc", "")).await;
        assert_eq!(body_str(&response), "123.5");

        let response = handle(&state, request(Method::GET, "/value/gauge/Missing", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle(&state, request(Method::GET, "/value/timer/Alloc", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_text_update_errors() {
        let state = state(None, None);
        let status = |uri: &'static str| {
            let state = &state;
            async move { handle(state, request(Method::POST, uri, "")).await.status() }
        };
        assert_eq!(status("/update/gauge//1").await, StatusCode::NOT_FOUND);
        assert_eq!(status("/update/gauge/Alloc").await, StatusCode::NOT_FOUND);
        assert_eq!(status("/update/histogram/Alloc/1").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/update/counter/PollCount/1.5").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/update/gauge/Alloc/abc").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unrepresentable_values_leave_snapshot_restorable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let state = ServerState {
            service: MetricsService::new(Arc::new(MemoryStorage::with_file(&path, true))),
            ..state(None, None)
        };
        let status = |uri: &'static str| {
            let state = &state;
            async move { handle(state, request(Method::POST, uri, "")).await.status() }
        };
        assert_eq!(status("/update/gauge/Alloc/1.5").await, StatusCode::OK);
        assert_eq!(status("/update/gauge/Bad/NaN").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/update/gauge/Bad/inf").await, StatusCode::BAD_REQUEST);
        assert_eq!(
            status("/update/counter/PollCount/9223372036854775807").await,
            StatusCode::OK
        );
        assert_eq!(
            status("/update/counter/PollCount/1").await,
            StatusCode::BAD_REQUEST
        );

        let response = handle(&state, json_request("/value/", r#"{"id":"Bad","type":"gauge"}"#)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let restored = MemoryStorage::with_file(&path, false);
        assert!(restored.load().await.unwrap());
        assert_eq!(restored.get_gauge("Alloc").await.unwrap(), Some(1.5));
        assert_eq!(restored.get_gauge("Bad").await.unwrap(), None);
        assert_eq!(restored.get_counter("PollCount").await.unwrap(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_json_update_returns_stored_total() {
        let state = state(None, None);
        let body = r#"{"id":"PollCount","type":"counter","delta":2}"#;
        handle(&state, json_request("/update/", body)).await;
        let response = handle(&state, json_request("/update/", body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let stored: Metric = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(stored, Metric::counter("PollCount", 4));
    }

    #[tokio::test]
    async fn test_json_value_lookup() {
        let state = state(None, None);
        handle(
            &state,
            json_request("/update/", r#"{"id":"Alloc","type":"gauge","value":123}"#),
        )
        .await;

        let response = handle(&state, json_request("/value/", r#"{"id":"Alloc","type":"gauge"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_str(&response), r#"{"id":"Alloc","type":"gauge","value":123.0}"#);

        let response = handle(&state, json_request("/value/", r#"{"id":"Nope","type":"gauge"}"#)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle(&state, json_request("/value/", r#"{"id":"Alloc","type":"timer"}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_route() {
        let state = state(None, None);
        let batch = r#"[{"id":"Alloc","type":"gauge","value":123.0},{"id":"PollCount","type":"counter","delta":1}]"#;
        assert_eq!(handle(&state, json_request("/updates/", batch)).await.status(), StatusCode::OK);
        assert_eq!(
            handle(&state, json_request("/updates/", "[]")).await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            handle(&state, json_request("/updates/", "{broken")).await.status(),
            StatusCode::BAD_REQUEST
        );
        let incomplete = r#"[{"id":"Alloc","type":"gauge","value":1.0},{"id":"PollCount","type":"counter"}]"#;
        assert_eq!(
            handle(&state, json_request("/updates/", incomplete)).await.status(),
            StatusCode::BAD_REQUEST
        );

        let listing = handle(&state, request(Method::GET, "/", "")).await;
        assert_eq!(body_str(&listing), "Alloc: 123;\nPollCount: 1;");
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_unsupported() {
        let state = state(None, None);
        let mut req = json_request("/update/", r#"{"id":"Alloc","type":"gauge","value":1}"#);
        req.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        );
        assert_eq!(
            handle(&state, req).await.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[tokio::test]
    async fn test_signed_gzipped_request_and_signed_response() {
        let state = state(Some("secret"), None);
        let payload = PayloadEncoder::new(Some("secret".to_string()), Default::default())
            .encode(&Metric::gauge("Alloc", 1.0))
            .unwrap();

        let mut req = json_request("/update/", "");
        *req.body_mut() = Full::new(Bytes::from(payload.body));
        let headers = req.headers_mut();
        headers.insert(
            hyper::header::CONTENT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
        headers.insert(
            hyper::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
        headers.insert(
            hash_header_name().unwrap(),
            HeaderValue::from_str(payload.signature.as_deref().unwrap()).unwrap(),
        );

        let response = handle(&state, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = decompress(response.body()).unwrap();
        assert_eq!(
            header_str(response.headers(), HASH_HEADER),
            sign(&body, Some("secret")).as_deref()
        );
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let state = state(Some("secret"), None);
        let json = br#"{"id":"Alloc","type":"gauge","value":1.0}"#;
        let mut req = json_request("/update/", "");
        *req.body_mut() = Full::new(Bytes::from(compress(json).unwrap()));
        req.headers_mut().insert(
            hyper::header::CONTENT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
        req.headers_mut().insert(
            hash_header_name().unwrap(),
            HeaderValue::from_str(&sign(json, Some("other")).unwrap()).unwrap(),
        );
        assert_eq!(handle(&state, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trusted_subnet_enforced_on_updates() {
        let state = state(None, Some("10.0.0.0/8"));
        let body = r#"{"id":"Alloc","type":"gauge","value":1.0}"#;

        let outside = handle(&state, json_request("/update/", body)).await;
        assert_eq!(outside.status(), StatusCode::FORBIDDEN);

        let mut inside = json_request("/update/", body);
        inside.headers_mut().insert(
            hyper::header::HeaderName::from_static("x-real-ip"),
            HeaderValue::from_static("10.1.2.3"),
        );
        assert_eq!(handle(&state, inside).await.status(), StatusCode::OK);

        // Reads are not restricted.
        let read = handle(&state, request(Method::GET, "/value/gauge/Alloc", "")).await;
        assert_eq!(read.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_routes_and_methods() {
        let state = state(None, None);
        assert_eq!(
            handle(&state, request(Method::GET, "/metrics", "")).await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            handle(&state, request(Method::DELETE, "/update/", "")).await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            handle(&state, request(Method::GET, "/ping", "")).await.status(),
            StatusCode::OK
        );
    }
}
