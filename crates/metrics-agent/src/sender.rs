// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of encoded batches to the collector over HTTP.

use std::net::UdpSocket;
use std::time::Duration;

use async_trait::async_trait;
use metrics_common::codec::{EncodedPayload, PayloadEncoder};
use metrics_common::constants::{HASH_HEADER, REAL_IP_HEADER, UPDATES_PATH, UPDATE_PATH};
use metrics_common::errors::CodecError;
use metrics_common::metric::Metric;
use metrics_common::retry::{with_retry, RetryPolicy};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("empty metrics batch")]
    EmptyBatch,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl SendError {
    /// Transport failures and overload/unavailability answers are worth another attempt.
    pub fn is_retriable(&self) -> bool {
        match self {
            SendError::Transport(e) => !e.is_builder(),
            SendError::Status { status, .. } => matches!(
                *status,
                StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
                    | StatusCode::TOO_MANY_REQUESTS
            ),
            SendError::EmptyBatch | SendError::Encode(_) => false,
        }
    }
}

/// The two wire operations of the collector.
#[async_trait]
pub trait MetricsSender: Send + Sync {
    /// `POST /updates/` with a JSON array.
    async fn send_batch(&self, batch: &[Metric]) -> Result<(), SendError>;

    /// `POST /update/` with a single JSON record.
    async fn send_metric(&self, metric: &Metric) -> Result<(), SendError>;
}

pub struct HttpSenderConfig {
    /// Collector base URL including the scheme
    pub base_url: String,
    pub encoder: PayloadEncoder,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

pub struct HttpSender {
    client: reqwest::Client,
    base_url: String,
    encoder: PayloadEncoder,
    retry_policy: RetryPolicy,
    real_ip: Option<String>,
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Address of the interface that routes to the public internet. No packet is sent.
pub fn outbound_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

impl HttpSender {
    pub fn new(config: HttpSenderConfig) -> Result<Self, SendError> {
        let real_ip = outbound_ip();
        if real_ip.is_none() {
            debug!("Could not determine outbound IP, {REAL_IP_HEADER} will not be sent");
        }
        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            encoder: config.encoder,
            retry_policy: config.retry_policy,
            real_ip,
        })
    }

    async fn post(&self, path: &str, payload: EncodedPayload) -> Result<(), SendError> {
        let url = format!("{}{path}", self.base_url);
        let (url, payload) = (url.as_str(), &payload);
        let started = std::time::Instant::now();
        with_retry(
            &format!("POST {path}"),
            &self.retry_policy,
            SendError::is_retriable,
            move || self.post_once(url, payload),
        )
        .await?;
        info!("POST {url} delivered in {:?}", started.elapsed());
        Ok(())
    }

    async fn post_once(&self, url: &str, payload: &EncodedPayload) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_ENCODING, "gzip")
            .header(CONTENT_TYPE, "application/json")
            .body(payload.body.clone());
        if let Some(ip) = &self.real_ip {
            request = request.header(REAL_IP_HEADER, ip);
        }
        if let Some(signature) = &payload.signature {
            request = request.header(HASH_HEADER, signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SendError::Status { status, body })
    }
}

#[async_trait]
impl MetricsSender for HttpSender {
    async fn send_batch(&self, batch: &[Metric]) -> Result<(), SendError> {
        if batch.is_empty() {
            return Err(SendError::EmptyBatch);
        }
        let payload = self.encoder.encode(batch)?;
        debug!("Sending batch of {} metrics", batch.len());
        self.post(UPDATES_PATH, payload).await
    }

    async fn send_metric(&self, metric: &Metric) -> Result<(), SendError> {
        let payload = self.encoder.encode(metric)?;
        self.post(UPDATE_PATH, payload).await
    }
}
