// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ScalarType;

/// The type of a [`Datum`](crate::Datum).
///
/// [`ColumnType`] bundles information about the scalar type of a datum (e.g.,
/// Int64 or String) with its nullability.
///
/// To construct a column type, either initialize the struct directly, or
/// use the [`ScalarType::nullable`] method.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// The underlying scalar type (e.g., Int64 or String) of this column.
    pub scalar_type: ScalarType,
    /// Whether this datum can be null.
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnType {
    /// Consumes this `ColumnType` and returns a new `ColumnType` with its
    /// nullability set to the specified boolean.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.scalar_type)
        } else {
            write!(f, "{}", self.scalar_type)
        }
    }
}

/// The name of a column in a [`RelationDesc`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ColumnName(String);

impl ColumnName {
    /// Returns this column name as a `str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ColumnName {
    fn from(s: String) -> ColumnName {
        ColumnName(s)
    }
}

impl From<&str> for ColumnName {
    fn from(s: &str) -> ColumnName {
        ColumnName(s.into())
    }
}

/// A description of the shape of a relation.
///
/// It bundles a type for each column with a name for each column. Rows of the
/// relation carry their datums in column order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RelationDesc {
    names: Vec<ColumnName>,
    types: Vec<ColumnType>,
}

impl RelationDesc {
    /// Constructs a new `RelationDesc` that represents the empty relation
    /// with no columns.
    pub fn empty() -> Self {
        RelationDesc::default()
    }

    /// Appends a column with the specified name and type.
    pub fn with_column<N>(mut self, name: N, column_type: ColumnType) -> Self
    where
        N: Into<ColumnName>,
    {
        self.names.push(name.into());
        self.types.push(column_type);
        self
    }

    /// Returns the number of columns in this relation.
    pub fn arity(&self) -> usize {
        self.names.len()
    }

    /// Returns an iterator over the columns in this relation.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnName, &ColumnType)> {
        self.names.iter().zip(self.types.iter())
    }

    /// Returns an iterator over the names of the columns in this relation.
    pub fn iter_names(&self) -> impl Iterator<Item = &ColumnName> {
        self.names.iter()
    }

    /// Finds a column by name.
    ///
    /// Returns the index and type of the column named `name`, or `None` if no
    /// such column exists.
    pub fn get_by_name(&self, name: &str) -> Option<(usize, &ColumnType)> {
        self.names
            .iter()
            .position(|n| n.as_str() == name)
            .map(|i| (i, &self.types[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let desc = RelationDesc::empty()
            .with_column("query", ScalarType::String.nullable(false))
            .with_column("user", ScalarType::String.nullable(true));
        assert_eq!(desc.arity(), 2);
        assert_eq!(
            desc.get_by_name("user"),
            Some((1, &ScalarType::String.nullable(true)))
        );
        assert_eq!(desc.get_by_name("missing"), None);
        let names: Vec<_> = desc.iter_names().map(|n| n.as_str()).collect();
        assert_eq!(names, ["query", "user"]);
    }
}
