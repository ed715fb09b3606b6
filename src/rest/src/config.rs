// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! REST connector configuration.

use std::time::Duration;

use http::Method;
use rc_repr::ScalarType;

use crate::schema::{ParamPrecedence, Schema};

/// The route served when none is configured.
pub const DEFAULT_ROUTE: &str = "/";

/// How long a request waits for its response when no timeout is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configures a REST connector.
#[derive(Clone, Debug)]
pub struct RestConfig {
    /// The host to listen on.
    pub host: String,
    /// The port to listen on. Port 0 selects an ephemeral port.
    pub port: u16,
    /// The path requests are accepted at.
    pub route: String,
    /// The fields each request is bound to.
    pub schema: Schema,
    /// Whether to remove a request's row from the input table once the
    /// request has been answered. When `false`, rows stay in the table and
    /// keep contributing to the computation.
    pub delete_queries: bool,
    /// How long a request waits for the computation to produce its response.
    pub request_timeout: Duration,
    /// Which parameter source wins when a field appears in both.
    pub precedence: ParamPrecedence,
    /// Whether parameters that name no schema field fail the request.
    pub strict: bool,
    /// The HTTP methods requests are accepted with.
    pub methods: Vec<Method>,
}

impl RestConfig {
    pub fn new(schema: Schema) -> RestConfig {
        RestConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            route: DEFAULT_ROUTE.into(),
            schema,
            delete_queries: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            precedence: ParamPrecedence::default(),
            strict: false,
            methods: vec![Method::POST],
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_delete_queries(mut self, delete_queries: bool) -> Self {
        self.delete_queries = delete_queries;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_precedence(mut self, precedence: ParamPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    /// Reports the first problem with this configuration, if any.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_route(&self.route)?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.methods.is_empty() {
            return Err(ConfigError::NoMethods);
        }
        for method in &self.methods {
            if !SUPPORTED_METHODS.contains(method) {
                return Err(ConfigError::UnsupportedMethod(method.to_string()));
            }
        }
        self.schema.validate()
    }
}

/// Checks that `route` is a literal path the router can serve.
///
/// Routes are matched literally, so path parameters (`:name`), wildcards
/// (`*rest`) and braces are rejected rather than handed to the router, which
/// panics on patterns it cannot parse.
pub fn validate_route(route: &str) -> Result<(), ConfigError> {
    let literal = route.starts_with('/')
        && route.split('/').all(|segment| {
            !segment.starts_with(':')
                && !segment.starts_with('*')
                && !segment.contains(['{', '}'])
        });
    if literal {
        Ok(())
    } else {
        Err(ConfigError::InvalidRoute(route.to_owned()))
    }
}

const SUPPORTED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Errors in the configuration of a REST connector.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("route must be a literal path starting with '/': {0:?}")]
    InvalidRoute(String),
    #[error("request timeout must be positive")]
    ZeroTimeout,
    #[error("at least one HTTP method must be accepted")]
    NoMethods,
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("schema fields must have a name")]
    EmptyFieldName,
    #[error("duplicate schema field {0:?}")]
    DuplicateField(String),
    #[error("field {field:?} cannot be of type {typ}")]
    InvalidFieldType { field: String, typ: ScalarType },
    #[error("invalid default for field {field:?}: {msg}")]
    InvalidDefault { field: String, msg: String },
    #[error("failed to register metrics: {0}")]
    Metrics(String),
}
