// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Serves a dataflow table over HTTP.
//!
//! Each accepted request is bound to a row of the *queries* table and
//! appended to it under a fresh identity. The caller computes a *responses*
//! collection from the queries, and the first row it produces under a
//! request's identity is sent back as that request's answer.
//!
//! ```ignore
//! let (queries, writer) = rc_rest::rest_connector(config, &metrics_registry)?;
//! let responses = queries.map(desc, |id, row| answer(id, row));
//! let server = writer.serve(responses).await?;
//! ```

#![warn(missing_debug_implementations)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures::Stream;
use rc_dataflow::{new_input, Collection, InputHandle, Update};
use rc_repr::RelationDesc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use crate::dispatch::ResponseDispatcher;
use crate::http::ConnectorState;
use crate::ingest::Ingestor;
use crate::matcher::OutputMatcher;
use crate::registry::{Closed, CorrelationRegistry};

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod registry;
pub mod schema;

pub use crate::config::{ConfigError, RestConfig};
pub use crate::error::{RestError, WriteError};
pub use crate::metrics::Metrics;
pub use crate::schema::{BindError, ParamPrecedence, Schema};

/// Creates a REST connector.
///
/// Returns the table of bound requests, and the writer that serves them once
/// the collection of responses has been computed from it.
pub fn rest_connector(
    config: RestConfig,
    registry: &prometheus::Registry,
) -> Result<(Collection, ResponseWriter), ConfigError> {
    config.validate()?;
    let metrics =
        Metrics::register_into(registry).map_err(|e| ConfigError::Metrics(e.to_string()))?;
    let (input, queries) = new_input(config.schema.desc());
    let writer = ResponseWriter {
        config,
        input,
        metrics,
    };
    Ok((queries, writer))
}

/// Serves the requests of a REST connector.
#[derive(Debug)]
pub struct ResponseWriter {
    config: RestConfig,
    input: InputHandle,
    metrics: Metrics,
}

impl ResponseWriter {
    /// Returns the table requests are appended to.
    pub fn input_table(&self) -> &InputHandle {
        &self.input
    }

    /// Starts answering requests with the rows of `responses`.
    pub async fn serve(self, responses: Collection) -> Result<RestServer, anyhow::Error> {
        let desc = responses.desc().clone();
        let updates = responses.subscribe();
        self.serve_stream(desc, updates).await
    }

    /// Starts answering requests with the rows of `updates`, shaped `desc`.
    ///
    /// Every update must carry the identity of the request it answers.
    pub async fn serve_stream<S>(
        self,
        desc: RelationDesc,
        updates: S,
    ) -> Result<RestServer, anyhow::Error>
    where
        S: Stream<Item = Update> + Send + Unpin + 'static,
    {
        let RestConfig {
            host,
            port,
            route,
            schema,
            delete_queries,
            request_timeout,
            precedence,
            strict,
            methods,
        } = self.config;

        let registry = Arc::new(
            CorrelationRegistry::default()
                .with_pending_gauge(self.metrics.pending_responses.clone()),
        );
        let ingestor = Ingestor::new(Arc::new(self.input));
        let dispatcher = ResponseDispatcher::new(desc, ingestor.clone(), delete_queries);
        let state = Arc::new(ConnectorState {
            schema,
            precedence,
            strict,
            request_timeout,
            registry: Arc::clone(&registry),
            ingestor,
            dispatcher,
            metrics: self.metrics.clone(),
        });
        let router = http::router(state, &route, &methods)?;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("binding {host}:{port}"))?;
        let local_addr = listener.local_addr()?;

        let matcher = OutputMatcher::new(Arc::clone(&registry), self.metrics);
        let matcher = tokio::spawn(matcher.run(updates));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(%local_addr, %route, "serving REST connector");
        Ok(RestServer {
            local_addr,
            route,
            registry,
            shutdown_tx,
            server,
            matcher,
        })
    }
}

/// A running REST connector.
#[derive(Debug)]
pub struct RestServer {
    local_addr: SocketAddr,
    route: String,
    registry: Arc<CorrelationRegistry>,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
    matcher: JoinHandle<()>,
}

impl RestServer {
    /// The address the connector is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The URL requests are accepted at.
    pub fn url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.route)
    }

    /// The number of requests waiting for their response.
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Fails all waiting requests and stops accepting new ones.
    pub async fn shutdown(self) -> Result<(), anyhow::Error> {
        let failed = self.registry.fail_all(Closed::ShuttingDown);
        info!(failed, "shutting down REST connector");
        let _ = self.shutdown_tx.send(());
        self.matcher.abort();
        self.server
            .await
            .context("joining server task")?
            .context("serving requests")?;
        Ok(())
    }

    /// Serves until `signal` completes, then shuts down.
    pub async fn run_until<F>(self, signal: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await
    }
}
