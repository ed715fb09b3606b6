// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Turning produced rows into HTTP responses.

use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::Json;
use rc_repr::{RelationDesc, Row, RowId};
use tracing::warn;

use crate::error::RestError;
use crate::ingest::Ingestor;
use crate::registry::ResponseHandle;

/// Renders the rows answering requests, and cleans up after the requests.
#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    desc: Arc<RelationDesc>,
    ingestor: Ingestor,
    delete_queries: bool,
}

impl ResponseDispatcher {
    pub fn new(desc: RelationDesc, ingestor: Ingestor, delete_queries: bool) -> Self {
        ResponseDispatcher {
            desc: Arc::new(desc),
            ingestor,
            delete_queries,
        }
    }

    /// Renders `row` as a JSON object keyed by the output column names.
    pub fn render(&self, row: &Row) -> serde_json::Value {
        let object = self
            .desc
            .iter_names()
            .zip(row.iter())
            .map(|(name, datum)| (name.to_string(), datum.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }

    /// Tracks the request waiting on `handle` until it is answered.
    pub fn track(&self, handle: ResponseHandle) -> InflightQuery {
        InflightQuery {
            dispatcher: self.clone(),
            handle,
            removed: false,
        }
    }

    fn remove(&self, id: RowId) {
        if let Err(e) = self.ingestor.remove(id) {
            warn!(%id, "failed to remove answered request: {e}");
        }
    }
}

/// A request whose row has been ingested and that is waiting for its answer.
///
/// When removing answered requests, the request's row is removed from the
/// input table however the request ends, including when it is dropped.
#[derive(Debug)]
pub struct InflightQuery {
    dispatcher: ResponseDispatcher,
    handle: ResponseHandle,
    removed: bool,
}

impl InflightQuery {
    /// Waits up to `timeout` for the answer, and renders it.
    pub async fn respond(mut self, timeout: Duration) -> Result<Response, RestError> {
        let result = self.handle.wait(timeout).await;
        if self.dispatcher.delete_queries {
            self.dispatcher.remove(self.handle.id());
            self.removed = true;
        }
        let row = result?;
        Ok(Json(self.dispatcher.render(&row)).into_response())
    }
}

impl Drop for InflightQuery {
    fn drop(&mut self) {
        if self.dispatcher.delete_queries && !self.removed {
            self.dispatcher.remove(self.handle.id());
        }
    }
}
