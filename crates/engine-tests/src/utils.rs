#![allow(dead_code)]

use connectors::memory::MemoryAdapter;
use model::{core::value::Value, records::row::RowData};

pub fn assert_row_count(adapter: &MemoryAdapter, database: &str, table: &str, expected: usize) {
    let actual = adapter.row_count(database, table);
    assert_eq!(
        actual, expected,
        "Row count mismatch for {database}.{table}: expected {expected}, got {actual}"
    );
}

/// The single row of `table` whose `column` equals `value`.
pub fn find_row(
    adapter: &MemoryAdapter,
    database: &str,
    table: &str,
    column: &str,
    value: &str,
) -> RowData {
    let matches: Vec<RowData> = adapter
        .rows(database, table)
        .into_iter()
        .filter(|row| row.get_value(column).loose_eq(&Value::from(value)))
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "Expected one row in {database}.{table} with {column} = {value}, found {}",
        matches.len()
    );
    matches.into_iter().next().expect("one row")
}

/// Row counts of every listed table, for before/after comparisons.
pub fn row_counts(adapter: &MemoryAdapter, database: &str, tables: &[&str]) -> Vec<usize> {
    tables
        .iter()
        .map(|table| adapter.row_count(database, table))
        .collect()
}

pub fn id_of(row: &RowData) -> i64 {
    row.get_value("id").as_i64().expect("integer id")
}
