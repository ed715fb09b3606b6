// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Operators that derive collections from collections.

use std::collections::BTreeMap;

use futures::StreamExt;
use rc_repr::{Datum, Diff, RelationDesc, Row, RowId, ScalarType};
use tracing::debug;

use crate::{check_numeric, Collection, DataflowError, Update};

impl Collection {
    /// Applies `logic` to every row of this collection.
    ///
    /// The output rows must have shape `desc`. Identities and diffs are
    /// preserved, so an output row can always be traced back to the input
    /// row it was computed from.
    pub fn map<F>(&self, desc: RelationDesc, logic: F) -> Collection
    where
        F: Fn(RowId, &Row) -> Row + Send + 'static,
    {
        let mut input = self.subscribe();
        let output = Collection::new(desc);
        let handle = output.clone();
        tokio::spawn(async move {
            while let Some(Update { id, row, diff }) = input.next().await {
                let row = logic(id, &row);
                handle.send(Update { id, row, diff });
            }
            debug!("map input closed");
        });
        output
    }

    /// Retains only the rows of this collection for which `predicate` holds.
    pub fn filter<F>(&self, predicate: F) -> Collection
    where
        F: Fn(&Row) -> bool + Send + 'static,
    {
        let mut input = self.subscribe();
        let output = Collection::new(self.desc().clone());
        let handle = output.clone();
        tokio::spawn(async move {
            while let Some(update) = input.next().await {
                if predicate(&update.row) {
                    handle.send(update);
                }
            }
            debug!("filter input closed");
        });
        output
    }

    /// Groups the rows of this collection by the column named `key` and sums
    /// the column named `value` within each group.
    ///
    /// The output has one row per non-empty group, with columns `key` and
    /// `sum`. Whenever a group changes, its previous row is retracted before
    /// its new row is inserted. Nulls do not contribute to sums.
    pub fn reduce_sum(&self, key: &str, value: &str) -> Result<Collection, DataflowError> {
        let desc = self.desc();
        let (key_idx, key_typ) = desc
            .get_by_name(key)
            .ok_or_else(|| DataflowError::UnknownColumn(key.to_owned()))?;
        let (value_idx, value_typ) = desc
            .get_by_name(value)
            .ok_or_else(|| DataflowError::UnknownColumn(value.to_owned()))?;
        check_numeric(value, value_typ)?;

        let zero = match value_typ.scalar_type {
            ScalarType::Float64 => Datum::from(0.0),
            _ => Datum::from(0_i64),
        };
        let output_desc = RelationDesc::empty()
            .with_column(key, *key_typ)
            .with_column("sum", value_typ.scalar_type.nullable(false));

        let mut input = self.subscribe();
        let output = Collection::new(output_desc);
        let handle = output.clone();
        tokio::spawn(async move {
            let mut groups: BTreeMap<Datum, Group> = BTreeMap::new();
            while let Some(Update { row, diff, .. }) = input.next().await {
                let (Some(key), Some(value)) = (row.get(key_idx), row.get(value_idx)) else {
                    continue;
                };
                let key_row = Row::new(vec![key.clone()]);
                let id = RowId::derived(&key_row);

                let old = groups.remove(key);
                let mut new = old.clone().unwrap_or_else(|| Group {
                    sum: zero.clone(),
                    count: 0,
                });
                new.add(value, diff);

                if let Some(old) = old {
                    handle.send(Update::retract(id, old.row(key)));
                }
                if new.count > 0 {
                    handle.send(Update::insert(id, new.row(key)));
                    groups.insert(key.clone(), new);
                }
            }
            debug!("reduce input closed");
        });
        Ok(output)
    }
}

/// The accumulated state of one group of a reduction.
#[derive(Clone, Debug)]
struct Group {
    sum: Datum,
    count: Diff,
}

impl Group {
    fn add(&mut self, value: &Datum, diff: Diff) {
        self.count += diff;
        let sum = match (&self.sum, value) {
            (_, Datum::Null) => None,
            (Datum::Int64(acc), Datum::Int64(v)) => {
                Some(Datum::from(acc.wrapping_add(v.wrapping_mul(diff))))
            }
            (acc, v) => match (acc.as_float64(), v.as_float64()) {
                (Some(acc), Some(v)) => Some(Datum::from(acc + v * diff as f64)),
                _ => None,
            },
        };
        if let Some(sum) = sum {
            self.sum = sum;
        }
    }

    fn row(&self, key: &Datum) -> Row {
        Row::new(vec![key.clone(), self.sum.clone()])
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rc_repr::RowIdGen;

    use crate::{new_input, Subscription};

    use super::*;

    async fn next(updates: &mut Subscription) -> Update {
        tokio::time::timeout(Duration::from_secs(5), updates.next())
            .await
            .expect("timed out waiting for update")
            .expect("collection closed")
    }

    fn kv_desc() -> RelationDesc {
        RelationDesc::empty()
            .with_column("k", ScalarType::Int64.nullable(false))
            .with_column("v", ScalarType::Int64.nullable(true))
    }

    fn kv(k: i64, v: i64) -> Row {
        Row::new(vec![Datum::from(k), Datum::from(v)])
    }

    #[tokio::test]
    async fn map_preserves_identity_and_diff() {
        let desc = RelationDesc::empty().with_column("query", ScalarType::String.nullable(false));
        let (input, queries) = new_input(desc);
        let result_desc = RelationDesc::empty()
            .with_column("query_id", ScalarType::Id.nullable(false))
            .with_column("result", ScalarType::String.nullable(false));
        let results = queries.map(result_desc, |id, row| {
            let query = row.get(0).and_then(Datum::as_str).unwrap_or_default();
            Row::new(vec![Datum::from(id), Datum::from(query.to_uppercase())])
        });
        let mut updates = results.subscribe();

        let id = RowId::Input(7);
        input.insert(id, Row::new(vec![Datum::from("one")])).unwrap();
        input.remove(id);

        let expected = Row::new(vec![Datum::from(id), Datum::from("ONE")]);
        assert_eq!(next(&mut updates).await, Update::insert(id, expected.clone()));
        assert_eq!(next(&mut updates).await, Update::retract(id, expected));
    }

    #[tokio::test]
    async fn filter_drops_rows() {
        let (input, rows) = new_input(kv_desc());
        let mut updates = rows
            .filter(|row| row.get(1).and_then(Datum::as_int64) != Some(0))
            .subscribe();

        input.insert(RowId::Input(0), kv(1, 0)).unwrap();
        input.insert(RowId::Input(1), kv(1, 5)).unwrap();
        assert_eq!(
            next(&mut updates).await,
            Update::insert(RowId::Input(1), kv(1, 5))
        );
    }

    #[tokio::test]
    async fn reduce_sum_retracts_stale_aggregates() {
        let (input, rows) = new_input(kv_desc());
        let sums = rows.reduce_sum("k", "v").unwrap();
        assert_eq!(
            sums.desc().iter_names().map(|n| n.as_str()).collect::<Vec<_>>(),
            ["k", "sum"]
        );
        let mut updates = sums.subscribe();
        let ids = RowIdGen::default();

        let first = ids.allocate_id();
        input.insert(first, kv(1, 1)).unwrap();
        input.insert(ids.allocate_id(), kv(1, 2)).unwrap();

        let group = RowId::derived(&Row::new(vec![Datum::from(1_i64)]));
        assert_eq!(next(&mut updates).await, Update::insert(group, kv(1, 1)));
        assert_eq!(next(&mut updates).await, Update::retract(group, kv(1, 1)));
        assert_eq!(next(&mut updates).await, Update::insert(group, kv(1, 3)));

        // Removing an input row is reflected in the aggregate.
        input.remove(first);
        assert_eq!(next(&mut updates).await, Update::retract(group, kv(1, 3)));
        assert_eq!(next(&mut updates).await, Update::insert(group, kv(1, 2)));
    }

    #[tokio::test]
    async fn reduce_sum_drops_empty_groups() {
        let (input, rows) = new_input(kv_desc());
        let mut updates = rows.reduce_sum("k", "v").unwrap().subscribe();

        input.insert(RowId::Input(0), kv(4, 10)).unwrap();
        input.remove(RowId::Input(0));
        input.insert(RowId::Input(1), kv(4, 1)).unwrap();

        let group = RowId::derived(&Row::new(vec![Datum::from(4_i64)]));
        assert_eq!(next(&mut updates).await, Update::insert(group, kv(4, 10)));
        assert_eq!(next(&mut updates).await, Update::retract(group, kv(4, 10)));
        // The group was empty, so there is no stale aggregate to retract.
        assert_eq!(next(&mut updates).await, Update::insert(group, kv(4, 1)));
    }

    #[tokio::test]
    async fn reduce_sum_validates_columns() {
        let desc = kv_desc().with_column("name", ScalarType::String.nullable(false));
        let (_input, rows) = new_input(desc);
        assert_eq!(
            rows.reduce_sum("missing", "v").unwrap_err(),
            DataflowError::UnknownColumn("missing".into())
        );
        assert!(matches!(
            rows.reduce_sum("k", "name"),
            Err(DataflowError::InvalidColumnType { .. })
        ));
    }
}
