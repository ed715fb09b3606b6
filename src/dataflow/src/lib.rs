// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A minimal incremental dataflow.
//!
//! Collections are streams of [`Update`]s: insertions (positive diff) and
//! retractions (negative diff) of identified rows. An [`InputHandle`] feeds a
//! collection from outside; operators derive new collections from existing
//! ones and keep them up to date as their inputs change; a [`Subscription`]
//! observes a collection's updates from the moment it is created.
//!
//! Operators run as tasks on the ambient tokio runtime, so dataflows must be
//! built from within a [`tokio::runtime::Runtime`]. Subscribe to a collection
//! before feeding its inputs: updates are not replayed to late subscribers.

#![warn(missing_debug_implementations)]

mod collection;
mod input;
mod operators;

use rc_repr::{ColumnType, RowId, ScalarType};

pub use crate::collection::{Collection, Subscription, Update};
pub use crate::input::{new_input, InputHandle};

/// Errors produced while building or feeding a dataflow.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DataflowError {
    #[error("unknown column {0:?}")]
    UnknownColumn(String),
    #[error("column {column:?} has type {typ}, expected one of: {expected}")]
    InvalidColumnType {
        column: String,
        typ: ColumnType,
        expected: &'static str,
    },
    #[error("row {0} is already present")]
    DuplicateRow(RowId),
    #[error("row has {got} columns, expected {expected}")]
    ArityMismatch { got: usize, expected: usize },
    #[error("value for column {column:?} is not of type {typ}")]
    TypeMismatch { column: String, typ: ColumnType },
}

fn check_numeric(column: &str, typ: &ColumnType) -> Result<(), DataflowError> {
    match typ.scalar_type {
        ScalarType::Int64 | ScalarType::Float64 => Ok(()),
        _ => Err(DataflowError::InvalidColumnType {
            column: column.to_owned(),
            typ: *typ,
            expected: "int, float",
        }),
    }
}
