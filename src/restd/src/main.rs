// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Runs a REST connector in front of an echo dataflow.
//!
//! Each request is answered with its identity and its bound fields,
//! optionally upper-casing one of them.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use rc_dataflow::Collection;
use rc_repr::{Datum, RelationDesc, Row, ScalarType};
use rc_rest::{rest_connector, ParamPrecedence, RestConfig, Schema};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Parser)]
#[clap(about = "REST connector echo server", long_about = None)]
struct Args {
    /// The host to listen on.
    #[clap(long, env = "RC_HOST", default_value = "127.0.0.1")]
    host: String,
    /// The port to listen on. Port 0 selects an ephemeral port.
    #[clap(long, env = "RC_PORT", default_value_t = 8080)]
    port: u16,
    /// The path requests are accepted at.
    #[clap(long, env = "RC_ROUTE", default_value = "/")]
    route: String,
    /// The fields each request is bound to.
    /// JSON of the form: `{"query": {"type": "string"}, "user": {"type": "string", "default": "manul"}}`
    #[clap(long, env = "RC_SCHEMA", default_value = r#"{"query": {"type": "string"}}"#)]
    schema: String,
    /// Keep answered requests in the queries table instead of removing them.
    #[clap(long, env = "RC_KEEP_QUERIES")]
    keep_queries: bool,
    /// How long a request waits for its response.
    #[clap(long, env = "RC_REQUEST_TIMEOUT", value_parser = humantime::parse_duration, default_value = "30s")]
    request_timeout: Duration,
    /// Which parameter source wins when a field appears in both the query
    /// string and the body: `body-first` or `query-first`.
    #[clap(long, env = "RC_PRECEDENCE", default_value = "body-first")]
    precedence: ParamPrecedence,
    /// Reject requests with parameters that name no schema field.
    #[clap(long, env = "RC_STRICT")]
    strict: bool,
    /// An HTTP method requests are accepted with. May be repeated.
    #[clap(long = "method", env = "RC_METHODS", value_delimiter = ',', default_value = "POST")]
    methods: Vec<http::Method>,
    /// A string field to upper-case in responses.
    #[clap(long, env = "RC_UPPERCASE")]
    uppercase: Option<String>,
    /// Which tracing events to log.
    #[clap(long, env = "RC_LOG_FILTER", default_value = "info")]
    log_filter: String,
    /// Where to serve Prometheus metrics at `/metrics`, if anywhere.
    #[clap(long, env = "RC_INTERNAL_HTTP_LISTEN_ADDR", value_name = "HOST:PORT")]
    internal_http_listen_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("rc-restd: fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_new(&args.log_filter).context("parsing --log-filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let schema = Schema::from_json(&args.schema).context("decoding --schema")?;
    let config = RestConfig::new(schema)
        .with_host(args.host)
        .with_port(args.port)
        .with_route(args.route)
        .with_delete_queries(!args.keep_queries)
        .with_request_timeout(args.request_timeout)
        .with_precedence(args.precedence)
        .with_strict(args.strict)
        .with_methods(args.methods);

    let metrics_registry = prometheus::Registry::new();
    let (queries, writer) = rest_connector(config, &metrics_registry)?;
    let responses = echo(&queries, args.uppercase.as_deref())?;
    let server = writer.serve(responses).await?;

    if let Some(addr) = args.internal_http_listen_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding --internal-http-listen-addr {addr}"))?;
        info!(addr = %listener.local_addr()?, "serving metrics");
        let router = Router::new().route("/metrics", get(move || serve_metrics(metrics_registry)));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!("metrics server failed: {e}");
            }
        });
    }

    println!("rc-restd listening...");
    println!(" HTTP address: {}", server.url());

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to wait for ctrl-c: {e}");
            }
        })
        .await
}

/// Answers each query with its identity followed by its fields, upper-casing
/// the field named `uppercase`.
fn echo(queries: &Collection, uppercase: Option<&str>) -> Result<Collection, anyhow::Error> {
    let input = queries.desc();
    let upper_idx = match uppercase {
        Some(name) => {
            let (idx, typ) = input
                .get_by_name(name)
                .with_context(|| format!("--uppercase names unknown field {name:?}"))?;
            if typ.scalar_type != ScalarType::String {
                anyhow::bail!("--uppercase field {name:?} is not a string but {typ}");
            }
            Some(idx)
        }
        None => None,
    };

    let desc = input.iter().fold(
        RelationDesc::empty().with_column("query_id", ScalarType::Id.nullable(false)),
        |desc, (name, typ)| desc.with_column(name.as_str(), *typ),
    );
    Ok(queries.map(desc, move |id, row| {
        let fields = row.iter().enumerate().map(|(i, datum)| match datum {
            Datum::String(s) if Some(i) == upper_idx => Datum::from(s.to_uppercase()),
            datum => datum.clone(),
        });
        std::iter::once(Datum::from(id)).chain(fields).collect::<Row>()
    }))
}

async fn serve_metrics(registry: prometheus::Registry) -> Result<String, (http::StatusCode, String)> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .map_err(|e| (http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    String::from_utf8(buf).map_err(|e| (http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
