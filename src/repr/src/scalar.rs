// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{ColumnType, RowId};

/// A single value.
///
/// `Datum` must always derive [`Eq`], [`Ord`] and [`Hash`] so that rows can be
/// used as grouping keys. Floats are wrapped in [`OrderedFloat`] to make that
/// possible, and JSON values are stored in their canonical textual form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Datum {
    /// An unknown value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 64-bit floating point number.
    Float64(OrderedFloat<f64>),
    /// A sequence of Unicode codepoints encoded as UTF-8.
    String(String),
    /// An arbitrary JSON document.
    Jsonb(Jsonb),
    /// The identity of a row.
    Id(RowId),
}

impl Datum {
    /// Returns the type of this datum, or `None` for [`Datum::Null`].
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(ScalarType::Bool),
            Datum::Int64(_) => Some(ScalarType::Int64),
            Datum::Float64(_) => Some(ScalarType::Float64),
            Datum::String(_) => Some(ScalarType::String),
            Datum::Jsonb(_) => Some(ScalarType::Jsonb),
            Datum::Id(_) => Some(ScalarType::Id),
        }
    }

    /// Reports whether this datum is a valid value of a column of type `typ`.
    pub fn is_instance_of(&self, typ: &ColumnType) -> bool {
        match self.scalar_type() {
            None => typ.nullable,
            Some(scalar_type) => scalar_type == typ.scalar_type,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Datum::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Datum::Float64(f) => Some(f.into_inner()),
            Datum::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts this datum into a JSON value.
    ///
    /// Identities are rendered as strings and non-finite floats as `null`,
    /// since JSON has no representation for either.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Datum::Null => serde_json::Value::Null,
            Datum::Bool(b) => serde_json::Value::Bool(*b),
            Datum::Int64(i) => serde_json::Value::from(*i),
            Datum::Float64(f) => serde_json::Number::from_f64(f.into_inner())
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Datum::String(s) => serde_json::Value::String(s.clone()),
            Datum::Jsonb(j) => j.to_value(),
            Datum::Id(id) => serde_json::Value::String(id.to_string()),
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Datum {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Datum {
        Datum::Int64(i)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Datum {
        Datum::Float64(OrderedFloat(f))
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Datum {
        Datum::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Datum {
        Datum::String(s)
    }
}

impl From<RowId> for Datum {
    fn from(id: RowId) -> Datum {
        Datum::Id(id)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Int64(i) => write!(f, "{i}"),
            Datum::Float64(n) => write!(f, "{n}"),
            Datum::String(s) => write!(f, "{s:?}"),
            Datum::Jsonb(j) => write!(f, "{j}"),
            Datum::Id(id) => write!(f, "{id}"),
        }
    }
}

/// A JSON document in canonical textual form.
///
/// `serde_json` orders object keys, so two equal documents always serialize
/// to the same text.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Jsonb(String);

impl Jsonb {
    pub fn from_value(value: &serde_json::Value) -> Jsonb {
        Jsonb(value.to_string())
    }

    pub fn to_value(&self) -> serde_json::Value {
        // The text was produced by `from_value`, so it always parses.
        serde_json::from_str(&self.0).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Jsonb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The type of a [`Datum`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScalarType {
    Bool,
    Int64,
    Float64,
    String,
    Jsonb,
    Id,
}

impl ScalarType {
    /// Derives a column type from this scalar type with the specified
    /// nullability.
    pub fn nullable(self, nullable: bool) -> ColumnType {
        ColumnType {
            scalar_type: self,
            nullable,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int64 => "int",
            ScalarType::Float64 => "float",
            ScalarType::String => "string",
            ScalarType::Jsonb => "json",
            ScalarType::Id => "id",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The error returned when parsing an unrecognized type name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown type: {0:?}")]
pub struct UnknownTypeError(pub String);

impl FromStr for ScalarType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<ScalarType, UnknownTypeError> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ScalarType::Bool),
            "int" | "int64" | "integer" | "bigint" => Ok(ScalarType::Int64),
            "float" | "float64" | "double" => Ok(ScalarType::Float64),
            "str" | "string" | "text" => Ok(ScalarType::String),
            "json" | "jsonb" => Ok(ScalarType::Jsonb),
            "id" | "pointer" => Ok(ScalarType::Id),
            _ => Err(UnknownTypeError(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ScalarType {
    type Error = UnknownTypeError;

    fn try_from(s: String) -> Result<ScalarType, UnknownTypeError> {
        s.parse()
    }
}

impl From<ScalarType> for String {
    fn from(typ: ScalarType) -> String {
        typ.name().to_owned()
    }
}
