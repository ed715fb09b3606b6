// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The HTTP surface of a REST connector.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use bytes::Bytes;
use http::Method;
use tracing::{debug, info_span, Instrument};

use crate::config::{validate_route, ConfigError};
use crate::dispatch::ResponseDispatcher;
use crate::error::RestError;
use crate::ingest::Ingestor;
use crate::metrics::Metrics;
use crate::registry::CorrelationRegistry;
use crate::schema::{BindError, ParamPrecedence, Params, Schema};

/// Everything a request handler needs.
#[derive(Debug)]
pub struct ConnectorState {
    pub schema: Schema,
    pub precedence: ParamPrecedence,
    pub strict: bool,
    pub request_timeout: Duration,
    pub registry: Arc<CorrelationRegistry>,
    pub ingestor: Ingestor,
    pub dispatcher: ResponseDispatcher,
    pub metrics: Metrics,
}

/// Builds the router serving requests at `route` for each of `methods`.
pub fn router(
    state: Arc<ConnectorState>,
    route: &str,
    methods: &[Method],
) -> Result<Router, ConfigError> {
    validate_route(route)?;
    let mut method_router: MethodRouter<Arc<ConnectorState>> = MethodRouter::new();
    for method in methods {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| ConfigError::UnsupportedMethod(method.to_string()))?;
        method_router = method_router.on(filter, handle_query);
    }
    Ok(Router::new().route(route, method_router).with_state(state))
}

pub async fn handle_query(
    State(state): State<Arc<ConnectorState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let response = match answer(&state, query, &body).await {
        Ok(response) => response,
        Err(e) => {
            debug!("failed to answer request: {e}");
            e.into_response()
        }
    };
    state
        .metrics
        .requests
        .with_label_values(&[response.status().as_str()])
        .inc();
    state
        .metrics
        .request_duration_seconds
        .observe(start.elapsed().as_secs_f64());
    response
}

async fn answer(
    state: &ConnectorState,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
    body: &[u8],
) -> Result<Response, RestError> {
    let Query(query) = query.map_err(|e| BindError::InvalidQuery(e.body_text()))?;
    let params = Params::from_request(query, body, state.precedence)?;
    let row = state.schema.bind(params, state.strict)?;

    let (id, handle) = state
        .ingestor
        .ingest(row, |id| state.registry.register(id))?;
    let query = state.dispatcher.track(handle);
    query
        .respond(state.request_timeout)
        .instrument(info_span!("rest_query", %id))
        .await
}
