// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Input tables.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rc_repr::{RelationDesc, Row, RowId};
use tracing::trace;

use crate::{Collection, DataflowError, Update};

/// Creates a new input table with rows of shape `desc`.
///
/// Returns a handle to insert and remove rows, and the collection of the
/// table's updates.
pub fn new_input(desc: RelationDesc) -> (InputHandle, Collection) {
    let collection = Collection::new(desc);
    let handle = InputHandle {
        collection: collection.clone(),
        rows: Arc::new(Mutex::new(BTreeMap::new())),
    };
    (handle, collection)
}

/// A handle to the contents of an input table.
///
/// The handle keeps the live rows of the table so that a removal only needs
/// the identity of the row to retract.
#[derive(Clone, Debug)]
pub struct InputHandle {
    collection: Collection,
    rows: Arc<Mutex<BTreeMap<RowId, Row>>>,
}

impl InputHandle {
    /// Inserts `row` into the table under identity `id`.
    pub fn insert(&self, id: RowId, row: Row) -> Result<(), DataflowError> {
        let desc = self.collection.desc();
        if row.len() != desc.arity() {
            return Err(DataflowError::ArityMismatch {
                got: row.len(),
                expected: desc.arity(),
            });
        }
        for (datum, (name, typ)) in row.iter().zip(desc.iter()) {
            if !datum.is_instance_of(typ) {
                return Err(DataflowError::TypeMismatch {
                    column: name.to_string(),
                    typ: *typ,
                });
            }
        }

        // Updates are sent while holding the lock so that the insertion and
        // removal of a row are always observed in that order.
        let mut rows = self.rows.lock().expect("lock poisoned");
        if rows.contains_key(&id) {
            return Err(DataflowError::DuplicateRow(id));
        }
        trace!(%id, %row, "inserting row");
        rows.insert(id, row.clone());
        self.collection.send(Update::insert(id, row));
        Ok(())
    }

    /// Removes the row with identity `id` from the table.
    ///
    /// Returns the removed row, or `None` if no such row was present.
    pub fn remove(&self, id: RowId) -> Option<Row> {
        let mut rows = self.rows.lock().expect("lock poisoned");
        let row = rows.remove(&id)?;
        trace!(%id, %row, "removing row");
        self.collection.send(Update::retract(id, row.clone()));
        Some(row)
    }

    /// Returns the row with identity `id`, if it is present.
    pub fn get(&self, id: RowId) -> Option<Row> {
        self.rows.lock().expect("lock poisoned").get(&id).cloned()
    }

    /// Returns the number of live rows in the table.
    pub fn len(&self) -> usize {
        self.rows.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
