// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Row;

/// The identity of a row as it flows through a dataflow.
///
/// Every update carries the identity of the row it inserts or retracts.
/// Operators that preserve rows one-to-one (maps, filters) preserve the
/// identity, which is what lets the output of a computation be matched back
/// to the input row that caused it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RowId {
    /// A row appended to an input table.
    Input(u64),
    /// A row produced by an operator that does not preserve identities, such
    /// as a reduction, named after the key it was produced for.
    Derived(u64),
}

impl RowId {
    /// Derives the identity of the row an operator produces for `key`.
    ///
    /// Equal keys always derive equal identities within a process.
    pub fn derived(key: &Row) -> RowId {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        RowId::Derived(hasher.finish())
    }

    /// Reports whether this identity was assigned to an input row.
    pub fn is_input(&self) -> bool {
        matches!(self, RowId::Input(_))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RowId::Input(id) => write!(f, "i{id}"),
            RowId::Derived(id) => write!(f, "d{id:016x}"),
        }
    }
}

/// Allocates input [`RowId`]s.
///
/// Allocation is a single atomic increment, so it can be shared by any number
/// of concurrent callers without serializing them.
#[derive(Debug, Default)]
pub struct RowIdGen {
    next: AtomicU64,
}

impl RowIdGen {
    /// Allocates a new identifier and advances the generator.
    pub fn allocate_id(&self) -> RowId {
        RowId::Input(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use crate::Datum;

    use super::*;

    #[test]
    fn allocated_ids_are_unique_across_threads() {
        let id_gen = Arc::new(RowIdGen::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let id_gen = Arc::clone(&id_gen);
                std::thread::spawn(move || {
                    (0..1000).map(|_| id_gen.allocate_id()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = BTreeSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id.is_input());
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn derived_ids_follow_keys() {
        let one = Row::new(vec![Datum::from(1_i64)]);
        let two = Row::new(vec![Datum::from(2_i64)]);
        assert_eq!(RowId::derived(&one), RowId::derived(&one.clone()));
        assert_ne!(RowId::derived(&one), RowId::derived(&two));
        assert!(!RowId::derived(&one).is_input());
    }

    #[test]
    fn display() {
        assert_eq!(RowId::Input(42).to_string(), "i42");
        assert_eq!(RowId::Derived(255).to_string(), "d00000000000000ff");
    }
}
