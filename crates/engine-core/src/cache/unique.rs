use connectors::sql::base::{adapter::SqlAdapter, error::DbError};
use model::records::row::RowData;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Key layout of one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKeys {
    pub primary_key: String,
    /// Unique column sets, primary key excluded.
    pub unique_sets: Vec<Vec<String>>,
}

impl TableKeys {
    /// Unique sets whose columns all carry a non-NULL value in `row`.
    pub fn applicable_sets(&self, row: &RowData) -> Vec<&[String]> {
        self.unique_sets
            .iter()
            .filter(|set| set.iter().all(|col| !row.get_value(col).is_null()))
            .map(Vec::as_slice)
            .collect()
    }
}

/// Memoized `database.table` → [`TableKeys`].
#[derive(Debug, Default, Clone)]
pub struct UniqueConstraintCache {
    tables: HashMap<String, TableKeys>,
}

impl UniqueConstraintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn table_keys(
        &mut self,
        adapter: &dyn SqlAdapter,
        database: &str,
        table: &str,
    ) -> Result<TableKeys, DbError> {
        let key = format!("{database}.{table}").to_ascii_lowercase();
        if let Some(keys) = self.tables.get(&key) {
            return Ok(keys.clone());
        }

        let primary_key = adapter
            .primary_key_column(database, table)
            .await?
            .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string());
        let unique_sets: Vec<Vec<String>> = adapter
            .unique_key_sets(database, table)
            .await?
            .into_iter()
            .filter(|set| {
                !set.is_empty() && !(set.len() == 1 && set[0].eq_ignore_ascii_case(&primary_key))
            })
            .collect();

        debug!(
            database = %database,
            table = %table,
            primary_key = %primary_key,
            unique_sets = ?unique_sets,
            "Inspected unique constraints"
        );

        let keys = TableKeys {
            primary_key,
            unique_sets,
        };
        self.tables.insert(key, keys.clone());
        Ok(keys)
    }

    pub async fn unique_sets(
        &mut self,
        adapter: &dyn SqlAdapter,
        database: &str,
        table: &str,
    ) -> Result<Vec<Vec<String>>, DbError> {
        Ok(self.table_keys(adapter, database, table).await?.unique_sets)
    }

    pub async fn primary_key(
        &mut self,
        adapter: &dyn SqlAdapter,
        database: &str,
        table: &str,
    ) -> Result<String, DbError> {
        Ok(self.table_keys(adapter, database, table).await?.primary_key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::memory::{MemoryAdapter, TableSpec};
    use model::core::value::Value;

    #[tokio::test]
    async fn memoizes_per_database_table() {
        let adapter = MemoryAdapter::new();
        adapter.create_table(
            "central",
            TableSpec::new("sites_registry")
                .primary_key("id")
                .unique(["site_uuid"])
                .unique(["site_name"]),
        );

        let mut cache = UniqueConstraintCache::new();
        let keys = cache.table_keys(&adapter, "central", "sites_registry").await.unwrap();
        assert_eq!(keys.primary_key, "id");
        assert_eq!(keys.unique_sets, vec![vec!["site_uuid"], vec!["site_name"]]);
        assert_eq!(cache.len(), 1);

        // Memoized: later schema changes are not observed.
        adapter.create_table("central", TableSpec::new("sites_registry").primary_key("uuid"));
        assert_eq!(
            cache.primary_key(&adapter, "central", "sites_registry").await.unwrap(),
            "id"
        );
    }

    #[tokio::test]
    async fn missing_primary_key_defaults_to_id() {
        let adapter = MemoryAdapter::new();
        adapter.create_table("t", TableSpec::new("logs").columns(["line"]));
        let mut cache = UniqueConstraintCache::new();
        assert_eq!(cache.primary_key(&adapter, "t", "logs").await.unwrap(), "id");
        assert!(cache.unique_sets(&adapter, "t", "logs").await.unwrap().is_empty());
    }

    #[test]
    fn applicable_sets_need_every_column() {
        let keys = TableKeys {
            primary_key: "id".into(),
            unique_sets: vec![
                vec!["username".into()],
                vec!["site_id".into(), "email".into()],
            ],
        };
        let row = RowData::from_pairs(
            "users",
            [("username", Value::from("alice")), ("email", Value::from("a@x"))],
        );
        assert_eq!(keys.applicable_sets(&row), vec![&["username".to_string()][..]]);
        let row = RowData::from_pairs("users", [("username", Value::Null)]);
        assert!(keys.applicable_sets(&row).is_empty());
    }
}
