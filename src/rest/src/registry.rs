// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Correlation of produced rows with the requests waiting for them.
//!
//! Each request registers its identity before its row becomes visible to the
//! computation, receiving a [`ResponseHandle`] to wait on. The output side
//! calls [`CorrelationRegistry::resolve`] for every row produced. Resolution
//! removes the pending entry from the registry, so at most one row is ever
//! delivered per identity no matter how many are produced or how many threads
//! race to deliver them.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::IntGauge;
use rc_repr::{Row, RowId};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::RestError;

/// Why a registry stopped accepting requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Closed {
    /// The stream of produced rows ended.
    EngineUnavailable,
    /// The listener is shutting down.
    ShuttingDown,
}

#[derive(Debug)]
struct PendingResponse {
    created_at: Instant,
    tx: oneshot::Sender<Result<Row, Closed>>,
}

/// The requests waiting for a response, keyed by identity.
///
/// Entries live in a sharded map, so requests for unrelated identities rarely
/// contend, and no lock is held while a request waits.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    pending: DashMap<RowId, PendingResponse>,
    closed: OnceLock<Closed>,
    pending_gauge: Option<IntGauge>,
}

impl CorrelationRegistry {
    /// Reports the number of pending responses through `gauge`.
    pub fn with_pending_gauge(mut self, gauge: IntGauge) -> Self {
        self.pending_gauge = Some(gauge);
        self
    }

    /// Registers a pending response for `id`.
    ///
    /// Fails if a response for `id` is already pending, or if the registry is
    /// closed. Dropping the returned handle cancels the registration.
    pub fn register(self: &Arc<Self>, id: RowId) -> Result<ResponseHandle, RestError> {
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                debug!(%id, "identity registered twice");
                return Err(RestError::DuplicateIdentity(id));
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingResponse {
                    created_at: Instant::now(),
                    tx,
                });
            }
        }
        if let Some(gauge) = &self.pending_gauge {
            gauge.inc();
        }

        // `fail_all` closes the registry before draining it, so an entry that
        // was inserted after the drain is caught here.
        if let Some(closed) = self.closed.get() {
            self.remove(id);
            return Err((*closed).into());
        }

        Ok(ResponseHandle {
            id,
            rx,
            registry: Arc::clone(self),
        })
    }

    /// Delivers `row` to the request pending for `id`.
    ///
    /// Returns whether the row was delivered. It is not delivered if no
    /// response is pending for `id` (it was never registered, was already
    /// resolved, or was cancelled) or if the waiting request went away.
    pub fn resolve(&self, id: RowId, row: Row) -> bool {
        match self.remove(id) {
            Some(pending) => {
                trace!(%id, elapsed = ?pending.created_at.elapsed(), "resolving pending response");
                pending.tx.send(Ok(row)).is_ok()
            }
            None => false,
        }
    }

    /// Cancels the response pending for `id`.
    ///
    /// Returns whether a response was pending.
    pub fn cancel(&self, id: RowId) -> bool {
        self.remove(id).is_some()
    }

    /// Closes the registry, failing all pending responses and every later
    /// registration.
    ///
    /// Only the first close takes effect. Returns the number of pending
    /// responses that were failed.
    pub fn fail_all(&self, reason: Closed) -> usize {
        let _ = self.closed.set(reason);
        let reason = self.closed.get().copied().unwrap_or(reason);

        // Collect first: removing while iterating would deadlock on the
        // shard locks the iterator holds.
        let ids: Vec<RowId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some(pending) = self.remove(id) {
                let _ = pending.tx.send(Err(reason));
                failed += 1;
            }
        }
        failed
    }

    /// Reports why the registry was closed, if it was.
    pub fn closed(&self) -> Option<Closed> {
        self.closed.get().copied()
    }

    /// Returns the number of pending responses.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn remove(&self, id: RowId) -> Option<PendingResponse> {
        let (_, pending) = self.pending.remove(&id)?;
        if let Some(gauge) = &self.pending_gauge {
            gauge.dec();
        }
        Some(pending)
    }
}

/// A request's claim on the row produced for it.
///
/// Dropping the handle, e.g. because the client disconnected and the request
/// future was dropped, cancels the pending response.
#[derive(Debug)]
pub struct ResponseHandle {
    id: RowId,
    rx: oneshot::Receiver<Result<Row, Closed>>,
    registry: Arc<CorrelationRegistry>,
}

impl ResponseHandle {
    pub fn id(&self) -> RowId {
        self.id
    }

    /// Waits up to `timeout` for the row produced for this request.
    pub async fn wait(&mut self, timeout: Duration) -> Result<Row, RestError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(Ok(row))) => Ok(row),
            Ok(Ok(Err(closed))) => Err(closed.into()),
            Ok(Err(_)) => Err(RestError::Internal(anyhow::anyhow!(
                "pending response for {} dropped",
                self.id
            ))),
            Err(_elapsed) => {
                if self.registry.cancel(self.id) {
                    return Err(RestError::Timeout(timeout));
                }
                // Someone else removed the entry, and whoever removes an entry
                // sends on or drops its sender right after, so this wait is
                // short. The row may not have been sent yet.
                match (&mut self.rx).await {
                    Ok(Ok(row)) => Ok(row),
                    Ok(Err(closed)) => Err(closed.into()),
                    Err(_) => Err(RestError::Timeout(timeout)),
                }
            }
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        self.registry.cancel(self.id);
    }
}
