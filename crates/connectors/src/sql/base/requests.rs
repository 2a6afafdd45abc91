use model::core::value::Value;

/// Equality-filtered read of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRowsRequest {
    pub database: String,
    pub table: String,
    /// `column = value` conjuncts; empty means every row.
    pub filters: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl FetchRowsRequest {
    pub fn new(database: &str, table: &str) -> Self {
        FetchRowsRequest {
            database: database.to_string(),
            table: table.to_string(),
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, column: &str, value: Value) -> Self {
        self.filters.push((column.to_string(), value));
        self
    }

    pub fn filters(mut self, filters: Vec<(String, Value)>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Single-row insert, optionally upgraded to an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    /// Columns refreshed from the new row when a unique key collides.
    /// `Some(vec![])` turns a collision into a no-op instead of an error.
    pub on_duplicate: Option<Vec<String>>,
}

impl InsertStatement {
    pub fn new(table: &str, pairs: Vec<(String, Value)>) -> Self {
        let (columns, values) = pairs.into_iter().unzip();
        InsertStatement {
            table: table.to_string(),
            columns,
            values,
            on_duplicate: None,
        }
    }

    pub fn on_duplicate_update(mut self, columns: Vec<String>) -> Self {
        self.on_duplicate = Some(columns);
        self
    }

    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }
}

/// What the driver reported for one insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

impl WriteOutcome {
    /// The generated id, only when the statement inserted exactly one new row.
    pub fn inserted_id(&self) -> Option<i64> {
        match (self.affected_rows, self.last_insert_id) {
            (1, Some(id)) if id > 0 => i64::try_from(id).ok(),
            _ => None,
        }
    }
}

/// Primary-key lookup by column equality.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyLookup {
    pub database: String,
    pub table: String,
    pub primary_key: String,
    pub keys: Vec<(String, Value)>,
}

impl KeyLookup {
    pub fn new(database: &str, table: &str, primary_key: &str) -> Self {
        KeyLookup {
            database: database.to_string(),
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            keys: Vec::new(),
        }
    }

    pub fn key(mut self, column: &str, value: Value) -> Self {
        self.keys.push((column.to_string(), value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_id_requires_a_single_new_row() {
        let fresh = WriteOutcome {
            affected_rows: 1,
            last_insert_id: Some(12),
        };
        let updated = WriteOutcome {
            affected_rows: 2,
            last_insert_id: Some(12),
        };
        let zero = WriteOutcome {
            affected_rows: 1,
            last_insert_id: Some(0),
        };
        assert_eq!(fresh.inserted_id(), Some(12));
        assert_eq!(updated.inserted_id(), None);
        assert_eq!(zero.inserted_id(), None);
        assert_eq!(WriteOutcome::default().inserted_id(), None);
    }
}
