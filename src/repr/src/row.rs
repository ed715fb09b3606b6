// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use crate::Datum;

/// An ordered sequence of [`Datum`]s.
///
/// Rows do not carry their own schema; the [`RelationDesc`](crate::RelationDesc)
/// of the collection they belong to names and types each position.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Row {
    datums: Vec<Datum>,
}

impl Row {
    pub fn new(datums: Vec<Datum>) -> Row {
        Row { datums }
    }

    /// Returns the datum at position `idx`, if any.
    pub fn get(&self, idx: usize) -> Option<&Datum> {
        self.datums.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.datums.iter()
    }

    pub fn len(&self) -> usize {
        self.datums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datums.is_empty()
    }
}

impl FromIterator<Datum> for Row {
    fn from_iter<I: IntoIterator<Item = Datum>>(iter: I) -> Row {
        Row {
            datums: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Datum;
    type IntoIter = std::slice::Iter<'a, Datum>;

    fn into_iter(self) -> Self::IntoIter {
        self.datums.iter()
    }
}

/// Formats the row as a parenthesized, comma-separated list of datums.
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(")?;
        for (i, datum) in self.datums.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", datum)?;
        }
        f.write_str(")")
    }
}
