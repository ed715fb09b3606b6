// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Appending requests to the input table.

use std::fmt;
use std::sync::Arc;

use rc_dataflow::InputHandle;
use rc_repr::{Row, RowId, RowIdGen};
use tracing::trace;

use crate::error::{RestError, WriteError};

/// The input side of the computation answering requests.
pub trait TableWriter: Send + Sync + 'static {
    /// Appends the insertion of `row` under identity `id`.
    fn insert(&self, id: RowId, row: Row) -> Result<(), WriteError>;

    /// Appends the removal of the row with identity `id`.
    ///
    /// Removing a row that is not present is not an error.
    fn remove(&self, id: RowId) -> Result<(), WriteError>;
}

impl TableWriter for InputHandle {
    fn insert(&self, id: RowId, row: Row) -> Result<(), WriteError> {
        InputHandle::insert(self, id, row).map_err(WriteError::from)
    }

    fn remove(&self, id: RowId) -> Result<(), WriteError> {
        InputHandle::remove(self, id);
        Ok(())
    }
}

/// Assigns identities to requests and appends them to the input table.
#[derive(Clone)]
pub struct Ingestor {
    ids: Arc<RowIdGen>,
    writer: Arc<dyn TableWriter>,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor").field("ids", &self.ids).finish_non_exhaustive()
    }
}

impl Ingestor {
    pub fn new(writer: Arc<dyn TableWriter>) -> Ingestor {
        Ingestor {
            ids: Arc::new(RowIdGen::default()),
            writer,
        }
    }

    /// Ingests `row` under a fresh identity.
    ///
    /// `register` runs with the identity before the row is appended, so
    /// anything it sets up is in place before the computation can react to
    /// the row. If the append fails, whatever `register` returned is dropped.
    pub fn ingest<T, F>(&self, row: Row, register: F) -> Result<(RowId, T), RestError>
    where
        F: FnOnce(RowId) -> Result<T, RestError>,
    {
        let id = self.ids.allocate_id();
        let registration = register(id)?;
        trace!(%id, %row, "ingesting request");
        self.writer.insert(id, row)?;
        Ok((id, registration))
    }

    /// Appends the removal of the row with identity `id`.
    pub fn remove(&self, id: RowId) -> Result<(), WriteError> {
        trace!(%id, "removing request");
        self.writer.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use rc_dataflow::{new_input, DataflowError};
    use rc_repr::{Datum, RelationDesc, ScalarType};

    use super::*;

    fn input() -> InputHandle {
        let desc = RelationDesc::empty().with_column("query", ScalarType::String.nullable(false));
        new_input(desc).0
    }

    #[test]
    fn registers_before_insert() {
        let input = input();
        let ingestor = Ingestor::new(Arc::new(input.clone()));

        let row = Row::new(vec![Datum::from("one")]);
        let (id, seen) = ingestor
            .ingest(row.clone(), |id| Ok(input.get(id)))
            .unwrap();
        // The row was not yet visible while registering.
        assert_eq!(seen, None);
        assert_eq!(input.get(id), Some(row));

        ingestor.remove(id).unwrap();
        assert!(input.is_empty());
        // Removing twice is harmless.
        ingestor.remove(id).unwrap();
    }

    #[test]
    fn identities_are_distinct() {
        let ingestor = Ingestor::new(Arc::new(input()));
        let (a, ()) = ingestor
            .ingest(Row::new(vec![Datum::from("one")]), |_| Ok(()))
            .unwrap();
        let (b, ()) = ingestor
            .ingest(Row::new(vec![Datum::from("one")]), |_| Ok(()))
            .unwrap();
        assert_ne!(a, b);
        assert!(a.is_input() && b.is_input());
    }

    #[test]
    fn failed_registration_skips_insert() {
        let input = input();
        let ingestor = Ingestor::new(Arc::new(input.clone()));
        let result = ingestor.ingest(Row::new(vec![Datum::from("one")]), |_| {
            Err::<(), _>(RestError::ShuttingDown)
        });
        assert!(matches!(result, Err(RestError::ShuttingDown)));
        assert!(input.is_empty());
    }

    #[test]
    fn rejected_rows() {
        let ingestor = Ingestor::new(Arc::new(input()));
        let result = ingestor.ingest(Row::new(vec![Datum::Null]), |_| Ok(()));
        assert!(matches!(
            result,
            Err(RestError::Write(WriteError::Rejected(
                DataflowError::TypeMismatch { .. }
            )))
        ));
    }
}
