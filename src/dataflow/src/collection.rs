// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use rc_repr::{Diff, RelationDesc, Row, RowId};
use tokio::sync::mpsc;

/// A change to a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    /// The identity of the changed row.
    pub id: RowId,
    /// The row, with one datum per column of the collection.
    pub row: Row,
    /// The change in multiplicity of `row`.
    pub diff: Diff,
}

impl Update {
    pub fn insert(id: RowId, row: Row) -> Update {
        Update { id, row, diff: 1 }
    }

    pub fn retract(id: RowId, row: Row) -> Update {
        Update { id, row, diff: -1 }
    }
}

/// A handle to a stream of updates with a fixed shape.
///
/// Cloning a `Collection` is cheap and yields a handle to the same stream.
/// The stream of every [`Subscription`] ends once all handles to the
/// collection, including those held by running operators, are dropped.
#[derive(Clone, Debug)]
pub struct Collection {
    desc: Arc<RelationDesc>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Update>>>>,
}

impl Collection {
    pub(crate) fn new(desc: RelationDesc) -> Collection {
        Collection {
            desc: Arc::new(desc),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the shape of the rows in this collection.
    pub fn desc(&self) -> &RelationDesc {
        &self.desc
    }

    /// Subscribes to all updates sent to this collection from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("lock poisoned").push(tx);
        Subscription { rx }
    }

    /// Sends `update` to every live subscriber, forgetting the ones that have
    /// gone away.
    pub(crate) fn send(&self, update: Update) {
        let mut subscribers = self.subscribers.lock().expect("lock poisoned");
        subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }
}

/// The updates of a [`Collection`], in the order they were produced.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Update>,
}

impl Stream for Subscription {
    type Item = Update;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Update>> {
        self.rx.poll_recv(cx)
    }
}
