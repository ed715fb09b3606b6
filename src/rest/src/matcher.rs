// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use rc_dataflow::Update;
use tracing::{trace, warn};

use crate::metrics::Metrics;
use crate::registry::{Closed, CorrelationRegistry};

/// Routes the rows produced by the computation to the requests that caused
/// them.
#[derive(Debug)]
pub struct OutputMatcher {
    registry: Arc<CorrelationRegistry>,
    metrics: Metrics,
}

impl OutputMatcher {
    pub fn new(registry: Arc<CorrelationRegistry>, metrics: Metrics) -> OutputMatcher {
        OutputMatcher { registry, metrics }
    }

    /// Consumes `updates` until it ends, then fails every pending and future
    /// request.
    pub async fn run<S>(self, mut updates: S)
    where
        S: Stream<Item = Update> + Unpin,
    {
        while let Some(Update { id, row, diff }) = updates.next().await {
            if diff <= 0 {
                continue;
            }
            if self.registry.resolve(id, row) {
                self.metrics.matched_output_rows.inc();
            } else {
                trace!(%id, diff, "discarding output row with no pending request");
                self.metrics.unmatched_output_rows.inc();
            }
        }
        let failed = self.registry.fail_all(Closed::EngineUnavailable);
        warn!(failed, "output stream ended; failing pending requests");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc;
    use prometheus::Registry;
    use rc_repr::{Datum, Row, RowId};

    use crate::error::RestError;

    use super::*;

    #[tokio::test]
    async fn resolves_insertions_only() {
        let metrics = Metrics::register_into(&Registry::new()).unwrap();
        let registry = Arc::new(CorrelationRegistry::default());
        let mut handle = registry.register(RowId::Input(0)).unwrap();

        let (tx, rx) = mpsc::unbounded();
        let matcher = tokio::spawn(OutputMatcher::new(Arc::clone(&registry), metrics.clone()).run(rx));

        let old = Row::new(vec![Datum::from("old")]);
        let new = Row::new(vec![Datum::from("new")]);
        tx.unbounded_send(Update::retract(RowId::Input(0), old)).unwrap();
        tx.unbounded_send(Update::insert(RowId::Input(0), new.clone())).unwrap();
        tx.unbounded_send(Update::insert(RowId::Input(0), new.clone())).unwrap();
        tx.unbounded_send(Update::insert(RowId::Input(7), new.clone())).unwrap();

        assert_eq!(handle.wait(Duration::from_secs(5)).await.unwrap(), new);

        drop(tx);
        matcher.await.unwrap();
        assert_eq!(metrics.matched_output_rows.get(), 1);
        assert_eq!(metrics.unmatched_output_rows.get(), 2);
    }

    #[tokio::test]
    async fn stream_end_fails_requests() {
        let metrics = Metrics::register_into(&Registry::new()).unwrap();
        let registry = Arc::new(CorrelationRegistry::default());
        let mut handle = registry.register(RowId::Input(0)).unwrap();

        let (tx, rx) = mpsc::unbounded::<Update>();
        drop(tx);
        OutputMatcher::new(Arc::clone(&registry), metrics).run(rx).await;

        assert!(matches!(
            handle.wait(Duration::from_secs(5)).await,
            Err(RestError::EngineUnavailable)
        ));
        assert!(matches!(
            registry.register(RowId::Input(1)),
            Err(RestError::EngineUnavailable)
        ));
    }
}
