// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use axum::response::IntoResponse;
use http::StatusCode;
use rc_dataflow::DataflowError;
use rc_repr::RowId;

use crate::registry::Closed;
use crate::schema::BindError;

/// Errors we can encounter while answering a request.
///
/// Every request fails on its own: none of these errors affect other pending
/// requests, except that a closed registry fails every request from then on.
/// Each error maps to the HTTP status the caller receives.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("no response was produced within {0:?}")]
    Timeout(Duration),
    #[error("the computation answering requests is unavailable")]
    EngineUnavailable,
    #[error("the server is shutting down")]
    ShuttingDown,
    #[error("request identity {0} is already pending")]
    DuplicateIdentity(RowId),
    #[error("failed to write request: {0}")]
    Write(#[from] WriteError),
    #[error("internal failure! {0:?}")]
    Internal(#[from] anyhow::Error),
}

impl From<Closed> for RestError {
    fn from(closed: Closed) -> Self {
        match closed {
            Closed::EngineUnavailable => RestError::EngineUnavailable,
            Closed::ShuttingDown => RestError::ShuttingDown,
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> axum::response::Response {
        match self {
            e @ RestError::Bind(_) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            e @ RestError::Timeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, e.to_string()).into_response()
            }
            e @ RestError::EngineUnavailable
            | e @ RestError::ShuttingDown
            | e @ RestError::Write(WriteError::Closed) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            e @ RestError::DuplicateIdentity(_) | e @ RestError::Write(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
            RestError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                e.root_cause().to_string(),
            )
                .into_response(),
        }
    }
}

/// Errors writing to the input table.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("input table rejected the row: {0}")]
    Rejected(#[from] DataflowError),
    #[error("input table is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use http::StatusCode;

    use super::*;

    #[test]
    fn smoke_test_error_response_status() {
        let resp = RestError::from(BindError::MissingField("query".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = RestError::Timeout(Duration::from_secs(1)).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

        let resp = RestError::from(Closed::EngineUnavailable).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = RestError::from(Closed::ShuttingDown).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = RestError::from(WriteError::Closed).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        // All other errors should map to 500.
        let resp = RestError::DuplicateIdentity(RowId::Input(1)).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = RestError::from(WriteError::Rejected(DataflowError::DuplicateRow(
            RowId::Input(1),
        )))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = RestError::from(anyhow::anyhow!("test")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
