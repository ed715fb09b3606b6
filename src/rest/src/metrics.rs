// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub requests: IntCounterVec,
    pub pending_responses: IntGauge,
    pub matched_output_rows: IntCounter,
    pub unmatched_output_rows: IntCounter,
    pub request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn register_into(registry: &Registry) -> Result<Metrics, prometheus::Error> {
        Ok(Metrics {
            requests: register(
                registry,
                IntCounterVec::new(
                    Opts::new(
                        "rc_rest_requests_total",
                        "The total number of requests answered, by HTTP status.",
                    ),
                    &["status"],
                )?,
            )?,
            pending_responses: register(
                registry,
                IntGauge::new(
                    "rc_rest_pending_responses",
                    "The number of requests waiting for the computation to produce their response.",
                )?,
            )?,
            matched_output_rows: register(
                registry,
                IntCounter::new(
                    "rc_rest_matched_output_rows_total",
                    "The total number of produced rows delivered to a waiting request.",
                )?,
            )?,
            unmatched_output_rows: register(
                registry,
                IntCounter::new(
                    "rc_rest_unmatched_output_rows_total",
                    "The total number of produced rows for which no request was waiting.",
                )?,
            )?,
            request_duration_seconds: register(
                registry,
                Histogram::with_opts(
                    HistogramOpts::new(
                        "rc_rest_request_duration_seconds",
                        "The time from accepting a request to answering it.",
                    )
                    .buckets(prometheus::exponential_buckets(0.000_128, 2.0, 18)?),
                )?,
            )?,
        })
    }
}

fn register<C>(registry: &Registry, collector: C) -> Result<C, prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}
