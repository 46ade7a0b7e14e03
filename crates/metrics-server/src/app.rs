// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector lifecycle: open storage, serve until shutdown, then stop the server before the
//! storage so the final snapshot includes every accepted request.

use std::future::Future;
use std::net::SocketAddr;

use metrics_common::codec::PayloadDecoder;
use metrics_common::crypto::Decryptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::server::{MetricsServer, ServerState};
use crate::service::MetricsService;
use crate::storage::{self, StorageHandle};

/// A bound collector that has not started serving yet.
pub struct Collector {
    server: MetricsServer,
    storage: StorageHandle,
}

impl Collector {
    pub async fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        let decryptor = Decryptor::from_optional_file(config.crypto_key.as_deref())?;
        let storage = storage::open(config).await?;
        let state = ServerState {
            service: MetricsService::new(storage.storage()),
            decoder: PayloadDecoder::new(config.key.clone(), decryptor),
            trusted_subnet: config.trusted_subnet,
        };
        if let Some(subnet) = &config.trusted_subnet {
            info!("Accepting updates from {subnet} only");
        }

        let server = match MetricsServer::bind(&config.address, state, config.shutdown_timeout).await
        {
            Ok(server) => server,
            Err(source) => {
                storage.shutdown().await;
                return Err(ServerError::Bind {
                    address: config.address.clone(),
                    source,
                });
            }
        };
        Ok(Self { server, storage })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr().ok()
    }

    /// Serves until `shutdown` resolves, then drains connections and closes storage.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = tokio::spawn(async move {
            shutdown.await;
            info!("Starting graceful shutdown");
            trigger.cancel();
        });

        let served = self.server.serve(cancel.clone()).await;
        cancel.cancel();
        watcher.abort();

        self.storage.shutdown().await;
        debug!("Collector stopped");
        served.map_err(ServerError::Serve)
    }
}
