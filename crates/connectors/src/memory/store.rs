use crate::sql::base::{
    error::DbError,
    requests::{FetchRowsRequest, InsertStatement, KeyLookup, WriteOutcome},
};
use model::{core::value::Value, records::row::RowData};
use std::collections::{HashMap, HashSet};

/// Shape of an in-memory table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Option<String>,
    pub unique: Vec<Vec<String>>,
}

impl TableSpec {
    pub fn new(name: &str) -> Self {
        TableSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Auto-increment primary key, placed first.
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = Some(column.to_string());
        if !self.has_column(column) {
            self.columns.insert(0, column.to_string());
        }
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            if !self.has_column(column.as_ref()) {
                self.columns.push(column.as_ref().to_string());
            }
        }
        self
    }

    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        self = self.columns(set.iter());
        self.unique.push(set);
        self
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryTable {
    pub spec: TableSpec,
    pub rows: Vec<RowData>,
    next_id: i64,
}

impl MemoryTable {
    fn new(spec: TableSpec) -> Self {
        MemoryTable {
            spec,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn column_name(&self, column: &str) -> Option<&str> {
        self.spec
            .columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(column))
            .map(String::as_str)
    }

    fn key_sets(&self) -> impl Iterator<Item = Vec<&str>> {
        self.spec
            .primary_key
            .iter()
            .map(|pk| vec![pk.as_str()])
            .chain(
                self.spec
                    .unique
                    .iter()
                    .map(|set| set.iter().map(String::as_str).collect()),
            )
    }

    /// Index of an existing row colliding with `row` on any unique key.
    /// NULLs never collide.
    fn conflict(&self, row: &RowData) -> Option<usize> {
        let sets: Vec<Vec<&str>> = self.key_sets().collect();
        self.rows.iter().position(|existing| {
            sets.iter().any(|set| {
                set.iter().all(|col| {
                    let new = row.get_value(col);
                    !new.is_null() && new.loose_eq(&existing.get_value(col))
                })
            })
        })
    }

    pub fn insert(&mut self, statement: &InsertStatement) -> Result<WriteOutcome, DbError> {
        let mut row = RowData::new(&self.spec.name, Vec::new());
        for column in &self.spec.columns {
            row.set(column, Value::Null);
        }
        for (column, value) in statement.columns.iter().zip(&statement.values) {
            let Some(name) = self.column_name(column).map(str::to_string) else {
                return Err(DbError::Write(format!(
                    "Unknown column '{column}' in '{}'",
                    self.spec.name
                )));
            };
            row.set(&name, value.clone());
        }

        let mut generated = None;
        if let Some(pk) = self.spec.primary_key.clone() {
            match row.get_value(&pk).as_i64() {
                Some(explicit) => {
                    generated = Some(explicit);
                }
                None if row.get_value(&pk).is_null() => {
                    row.set(&pk, Value::Int(self.next_id));
                    generated = Some(self.next_id);
                }
                None => {}
            }
        }

        if let Some(index) = self.conflict(&row) {
            let Some(update) = &statement.on_duplicate else {
                return Err(DbError::Write(format!(
                    "Duplicate entry for a unique key of '{}'",
                    self.spec.name
                )));
            };
            let existing = &mut self.rows[index];
            let mut changed = false;
            for column in update {
                let value = row.get_value(column);
                if existing.get_value(column) != value {
                    existing.set(column, value);
                    changed = true;
                }
            }
            return Ok(WriteOutcome {
                affected_rows: if changed { 2 } else { 0 },
                last_insert_id: None,
            });
        }

        if let Some(id) = generated {
            self.next_id = self.next_id.max(id + 1);
        }
        self.rows.push(row);
        Ok(WriteOutcome {
            affected_rows: 1,
            last_insert_id: generated.and_then(|id| u64::try_from(id).ok()),
        })
    }

    pub fn find(&self, keys: &[(String, Value)]) -> Option<&RowData> {
        self.rows.iter().find(|row| {
            keys.iter()
                .all(|(column, value)| value.loose_eq(&row.get_value(column)))
        })
    }
}

/// Databases → tables. Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    pub databases: HashMap<String, HashMap<String, MemoryTable>>,
    pub failures: FailurePlan,
}

/// Injected failures, used to exercise error paths.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailurePlan {
    pub begin: HashSet<String>,
    pub commit: HashSet<String>,
    pub inserts: Vec<InsertFailure>,
}

#[derive(Debug, Clone)]
pub(crate) struct InsertFailure {
    pub database: String,
    pub table: String,
    pub when: Option<(String, Value)>,
}

impl FailurePlan {
    pub fn insert_fails(&self, database: &str, statement: &InsertStatement) -> bool {
        self.inserts.iter().any(|rule| {
            rule.database == key(database)
                && rule.table == key(&statement.table)
                && match &rule.when {
                    Some((column, value)) => statement
                        .value_of(column)
                        .is_some_and(|v| v.loose_eq(value)),
                    None => true,
                }
        })
    }
}

pub(crate) fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl MemoryStore {
    pub fn create_table(&mut self, database: &str, spec: TableSpec) {
        self.databases
            .entry(key(database))
            .or_default()
            .insert(key(&spec.name), MemoryTable::new(spec));
    }

    pub fn table(&self, database: &str, table: &str) -> Option<&MemoryTable> {
        self.databases.get(&key(database))?.get(&key(table))
    }

    pub fn table_mut(&mut self, database: &str, table: &str) -> Result<&mut MemoryTable, DbError> {
        self.databases
            .get_mut(&key(database))
            .and_then(|tables| tables.get_mut(&key(table)))
            .ok_or_else(|| DbError::Write(format!("Table '{database}.{table}' doesn't exist")))
    }

    pub fn fetch(&self, request: &FetchRowsRequest) -> Vec<RowData> {
        let Some(table) = self.table(&request.database, &request.table) else {
            return Vec::new();
        };
        table
            .rows
            .iter()
            .filter(|row| {
                request.filters.iter().all(|(column, value)| {
                    let actual = row.get_value(column);
                    if value.is_null() {
                        actual.is_null()
                    } else {
                        value.loose_eq(&actual)
                    }
                })
            })
            .take(request.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn find_primary_key(&self, lookup: &KeyLookup) -> Option<i64> {
        self.table(&lookup.database, &lookup.table)?
            .find(&lookup.keys)?
            .get_value(&lookup.primary_key)
            .as_i64()
    }
}
