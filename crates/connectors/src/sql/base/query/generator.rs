use crate::sql::base::{
    query::dialect::Dialect,
    requests::{FetchRowsRequest, InsertStatement, KeyLookup},
};
use model::core::value::Value;

const QUERY_TABLE_COLUMNS_SQL: &str = "SELECT COLUMN_NAME FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

const QUERY_UNIQUE_KEYS_SQL: &str = "SELECT INDEX_NAME, COLUMN_NAME FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND NON_UNIQUE = 0 AND INDEX_NAME <> 'PRIMARY' \
     ORDER BY INDEX_NAME, SEQ_IN_INDEX";

const QUERY_PRIMARY_KEY_SQL: &str = "SELECT COLUMN_NAME FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME = 'PRIMARY' \
     ORDER BY SEQ_IN_INDEX";

/// Renders parameterized statements. Identifiers are quoted, values are
/// always bound through placeholders.
pub struct QueryGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn table_columns(&self, database: &str, table: &str) -> (String, Vec<Value>) {
        (
            QUERY_TABLE_COLUMNS_SQL.to_string(),
            vec![Value::from(database), Value::from(table)],
        )
    }

    pub fn unique_keys(&self, database: &str, table: &str) -> (String, Vec<Value>) {
        (
            QUERY_UNIQUE_KEYS_SQL.to_string(),
            vec![Value::from(database), Value::from(table)],
        )
    }

    pub fn primary_key(&self, database: &str, table: &str) -> (String, Vec<Value>) {
        (
            QUERY_PRIMARY_KEY_SQL.to_string(),
            vec![Value::from(database), Value::from(table)],
        )
    }

    pub fn use_database(&self, database: &str) -> String {
        format!("USE {}", self.dialect.quote_identifier(database))
    }

    /// `SELECT * FROM db.table WHERE c1 = ? AND ... [LIMIT n]`.
    pub fn select(&self, request: &FetchRowsRequest) -> (String, Vec<Value>) {
        let mut sql = format!(
            "SELECT * FROM {}",
            self.qualified(&request.database, &request.table)
        );
        let (clause, params) = self.where_clause(&request.filters);
        sql.push_str(&clause);
        if let Some(limit) = request.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        (sql, params)
    }

    /// `INSERT INTO table (..) VALUES (..) [ON DUPLICATE KEY UPDATE ..]`.
    pub fn insert(&self, statement: &InsertStatement) -> (String, Vec<Value>) {
        let columns = statement
            .columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (0..statement.values.len())
            .map(|i| self.dialect.get_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            self.dialect.quote_identifier(&statement.table)
        );

        if let Some(update) = &statement.on_duplicate {
            let assignments = if update.is_empty() {
                // Nothing to refresh: a self-assignment keeps the collision silent.
                statement
                    .columns
                    .first()
                    .map(|c| {
                        let col = self.dialect.quote_identifier(c);
                        format!("{col} = {col}")
                    })
                    .into_iter()
                    .collect::<Vec<_>>()
            } else {
                update
                    .iter()
                    .map(|c| {
                        let col = self.dialect.quote_identifier(c);
                        format!("{col} = VALUES({col})")
                    })
                    .collect()
            };
            if !assignments.is_empty() {
                sql.push_str(" ON DUPLICATE KEY UPDATE ");
                sql.push_str(&assignments.join(", "));
            }
        }

        (sql, statement.values.clone())
    }

    /// `SELECT pk FROM db.table WHERE k1 = ? AND ... LIMIT 1`.
    pub fn find_primary_key(&self, lookup: &KeyLookup) -> (String, Vec<Value>) {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.dialect.quote_identifier(&lookup.primary_key),
            self.qualified(&lookup.database, &lookup.table)
        );
        let (clause, params) = self.where_clause(&lookup.keys);
        sql.push_str(&clause);
        sql.push_str(" LIMIT 1");
        (sql, params)
    }

    fn qualified(&self, database: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.dialect.quote_identifier(database),
            self.dialect.quote_identifier(table)
        )
    }

    fn where_clause(&self, filters: &[(String, Value)]) -> (String, Vec<Value>) {
        if filters.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut params = Vec::new();
        let conditions = filters
            .iter()
            .map(|(column, value)| {
                let col = self.dialect.quote_identifier(column);
                if value.is_null() {
                    format!("{col} IS NULL")
                } else {
                    let placeholder = self.dialect.get_placeholder(params.len());
                    params.push(value.clone());
                    format!("{col} = {placeholder}")
                }
            })
            .collect::<Vec<_>>();

        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}
