// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fundamental data representation.
//!
//! This module contains the types for representing data that flows between
//! the REST connector and the dataflow that answers its requests. The central
//! types are:
//!
//!   * [`Datum`], a single value of one of the supported [`ScalarType`]s.
//!   * [`Row`], an ordered sequence of datums.
//!   * [`RelationDesc`], the names and types of the columns of a collection.
//!   * [`RowId`], the identity a row carries through the dataflow.

#![warn(missing_debug_implementations)]

mod relation;
mod row;
mod row_id;
mod scalar;

pub use crate::relation::{ColumnName, ColumnType, RelationDesc};
pub use crate::row::Row;
pub use crate::row_id::{RowId, RowIdGen};
pub use crate::scalar::{Datum, Jsonb, ScalarType, UnknownTypeError};

/// The type of the multiplicity of an update.
///
/// Positive values insert a row, negative values retract it.
pub type Diff = i64;
