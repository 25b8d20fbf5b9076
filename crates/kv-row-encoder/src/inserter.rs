//! Reference row inserter.
//!
//! [`RecordInserter`] stores each row as a single pair: the record key
//! `t{table_id}_r{handle}` and a JSON object mapping column IDs to values.
//! The handle column itself is not repeated in the value. Handles already
//! written by this inserter are rejected as duplicates.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use tracing::trace;

use crate::core::kv::encode_record_key;
use crate::core::{Datum, InsertedRow, KvPair, KvPairs, RowInserter, TableInfo};
use crate::error::{EncodeError, Result};

#[derive(Debug, Default)]
pub struct RecordInserter {
    seen: HashSet<i64>,
}

impl RecordInserter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct handles written so far.
    pub fn rows_written(&self) -> usize {
        self.seen.len()
    }

    fn handle_of(table: &TableInfo, record: &[Datum]) -> Result<(i64, Option<usize>)> {
        let offset = table.handle_column().map(|col| col.offset);
        let datum = record.get(offset.unwrap_or(table.columns.len()));
        let handle = datum.and_then(Datum::as_i64).ok_or_else(|| {
            EncodeError::Insert(format!(
                "row handle of table `{}` must be an integer, got {}",
                table.name,
                datum.map_or("nothing", |d| d.kind().name())
            ))
        })?;
        Ok((handle, offset))
    }
}

impl RowInserter for RecordInserter {
    fn add_record(&mut self, table: &TableInfo, record: &[Datum]) -> Result<InsertedRow> {
        let expected = table.columns.len() + usize::from(table.has_implicit_handle());
        if record.len() != expected {
            return Err(EncodeError::Insert(format!(
                "table `{}` expects {} values per record, got {}",
                table.name,
                expected,
                record.len()
            )));
        }

        let (handle, handle_offset) = Self::handle_of(table, record)?;
        if self.seen.contains(&handle) {
            return Err(EncodeError::Insert(format!(
                "Duplicate entry '{}' for key '{}.PRIMARY'",
                handle, table.name
            )));
        }

        let mut row = Map::with_capacity(table.columns.len());
        for (pos, (col, datum)) in table.columns.iter().zip(record).enumerate() {
            if Some(pos) == handle_offset {
                continue;
            }
            let value = serde_json::to_value(datum)
                .map_err(|e| EncodeError::Insert(format!("column `{}`: {}", col.name, e)))?;
            row.insert(col.id.to_string(), value);
        }
        let val = serde_json::to_vec(&Value::Object(row))
            .map_err(|e| EncodeError::Insert(e.to_string()))?;

        self.seen.insert(handle);
        trace!(table = %table.name, handle, bytes = val.len(), "record encoded");

        Ok(InsertedRow {
            handle,
            pairs: KvPairs::new(vec![KvPair::new(encode_record_key(table.id, handle), val)]),
        })
    }
}

/// Decode a value written by [`RecordInserter`] into column ID → datum.
pub fn decode_record_value(val: &[u8]) -> Result<BTreeMap<i64, Datum>> {
    let raw: BTreeMap<String, Datum> =
        serde_json::from_slice(val).map_err(|e| EncodeError::Insert(e.to_string()))?;
    raw.into_iter()
        .map(|(id, datum)| {
            let id = id
                .parse::<i64>()
                .map_err(|_| EncodeError::Insert(format!("invalid column id `{}`", id)))?;
            Ok((id, datum))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kv::decode_record_key;
    use crate::core::{ColumnInfo, FieldType, MysqlType};
    use crate::error::ErrorKind;

    fn handle_table() -> TableInfo {
        let mut table = TableInfo::new(
            5,
            "users",
            vec![
                ColumnInfo::new(1, "id", 0, FieldType::new(MysqlType::LongLong).not_null())
                    .primary_key(),
                ColumnInfo::new(2, "name", 1, FieldType::new(MysqlType::Varchar)),
            ],
        );
        table.pk_is_handle = true;
        table
    }

    #[test]
    fn test_integer_handle_record() {
        let table = handle_table();
        let mut inserter = RecordInserter::new();
        let inserted = inserter
            .add_record(&table, &[Datum::Int64(9), Datum::from("ann")])
            .unwrap();
        assert_eq!(inserted.handle, 9);
        assert_eq!(inserted.pairs.len(), 1);

        let pair = &inserted.pairs.pairs[0];
        assert_eq!(decode_record_key(&pair.key).unwrap(), (5, 9));
        let values = decode_record_value(&pair.val).unwrap();
        assert_eq!(values.len(), 1, "handle column is not repeated");
        assert_eq!(values[&2], Datum::from("ann"));
    }

    #[test]
    fn test_implicit_handle_record() {
        let table = TableInfo::new(
            6,
            "logs",
            vec![ColumnInfo::new(1, "msg", 0, FieldType::new(MysqlType::Varchar))],
        );
        let mut inserter = RecordInserter::new();
        let inserted = inserter
            .add_record(&table, &[Datum::Null, Datum::Int64(77)])
            .unwrap();
        assert_eq!(inserted.handle, 77);
        let values = decode_record_value(&inserted.pairs.pairs[0].val).unwrap();
        assert_eq!(values[&1], Datum::Null);
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let table = handle_table();
        let mut inserter = RecordInserter::new();
        inserter
            .add_record(&table, &[Datum::Int64(1), Datum::from("a")])
            .unwrap();
        let err = inserter
            .add_record(&table, &[Datum::Int64(1), Datum::from("b")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsertFailure);
        assert!(err.to_string().contains("Duplicate entry '1'"));
        assert_eq!(inserter.rows_written(), 1);
    }

    #[test]
    fn test_record_length_checked() {
        let table = handle_table();
        let err = RecordInserter::new()
            .add_record(&table, &[Datum::Int64(1)])
            .unwrap_err();
        assert!(err.to_string().contains("expects 2 values"));
    }

    #[test]
    fn test_non_integer_handle_rejected() {
        let table = handle_table();
        let err = RecordInserter::new()
            .add_record(&table, &[Datum::from("x"), Datum::Null])
            .unwrap_err();
        assert!(err.to_string().contains("must be an integer"));
    }
}
