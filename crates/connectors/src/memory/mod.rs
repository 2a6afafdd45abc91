//! In-process stand-in for a MySQL server: several databases, tables with an
//! auto-increment primary key and unique column sets, transactional sessions.

mod session;
mod store;

pub use store::TableSpec;

use crate::sql::base::{
    adapter::{DatabaseKind, SqlAdapter, WriteSession},
    error::DbError,
    requests::{FetchRowsRequest, InsertStatement, KeyLookup},
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};
use session::MemorySession;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use store::{InsertFailure, MemoryStore, key};

#[derive(Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_table(&self, database: &str, spec: TableSpec) -> &Self {
        self.lock().create_table(database, spec);
        self
    }

    /// Seeds one row outside any session. Returns the primary key it got.
    pub fn insert_row<I, K, V>(
        &self,
        database: &str,
        table: &str,
        pairs: I,
    ) -> Result<Option<i64>, DbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();
        let statement = InsertStatement::new(table, pairs);
        let outcome = self.lock().table_mut(database, table)?.insert(&statement)?;
        Ok(outcome.last_insert_id.and_then(|id| i64::try_from(id).ok()))
    }

    pub fn rows(&self, database: &str, table: &str) -> Vec<RowData> {
        self.lock()
            .table(database, table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, database: &str, table: &str) -> usize {
        self.lock()
            .table(database, table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Every insert into `database.table` fails, or only those whose
    /// `column` carries `value`.
    pub fn fail_inserts(&self, database: &str, table: &str, when: Option<(&str, Value)>) {
        self.lock().failures.inserts.push(InsertFailure {
            database: key(database),
            table: key(table),
            when: when.map(|(c, v)| (c.to_string(), v)),
        });
    }

    pub fn fail_begin(&self, database: &str) {
        self.lock().failures.begin.insert(key(database));
    }

    pub fn fail_commit(&self, database: &str) {
        self.lock().failures.commit.insert(key(database));
    }
}

#[async_trait]
impl SqlAdapter for MemoryAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Memory
    }

    async fn table_columns(&self, database: &str, table: &str) -> Result<Vec<String>, DbError> {
        Ok(self
            .lock()
            .table(database, table)
            .map(|t| t.spec.columns.clone())
            .unwrap_or_default())
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        Ok(self.lock().fetch(&request))
    }

    async fn unique_key_sets(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<Vec<String>>, DbError> {
        Ok(self
            .lock()
            .table(database, table)
            .map(|t| t.spec.unique.clone())
            .unwrap_or_default())
    }

    async fn primary_key_column(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<String>, DbError> {
        Ok(self
            .lock()
            .table(database, table)
            .and_then(|t| t.spec.primary_key.clone()))
    }

    async fn find_primary_key(&self, lookup: &KeyLookup) -> Result<Option<i64>, DbError> {
        Ok(self.lock().find_primary_key(lookup))
    }

    async fn begin(&self, database: &str) -> Result<Box<dyn WriteSession>, DbError> {
        let store = self.lock();
        if store.failures.begin.contains(&key(database)) {
            return Err(DbError::Unknown(format!(
                "Lost connection while opening a session on '{database}'"
            )));
        }
        let snapshot = store
            .databases
            .get(&key(database))
            .cloned()
            .unwrap_or_default();
        drop(store);

        Ok(Box::new(MemorySession::new(
            Arc::clone(&self.store),
            database,
            snapshot,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MemoryAdapter {
        let adapter = MemoryAdapter::new();
        adapter.create_table(
            "tenant",
            TableSpec::new("users")
                .primary_key("id")
                .columns(["email"])
                .unique(["username"]),
        );
        adapter
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_upserts_on_unique_collision() {
        let adapter = adapter();
        let mut session = adapter.begin("tenant").await.unwrap();

        let first = InsertStatement::new(
            "users",
            vec![("username".into(), Value::from("alice")), ("email".into(), Value::from("a@x"))],
        );
        let outcome = session.insert(&first).await.unwrap();
        assert_eq!(outcome.inserted_id(), Some(1));

        let again = InsertStatement::new(
            "users",
            vec![("username".into(), Value::from("alice")), ("email".into(), Value::from("b@x"))],
        )
        .on_duplicate_update(vec!["username".into(), "email".into()]);
        let outcome = session.insert(&again).await.unwrap();
        assert_eq!(outcome.affected_rows, 2);
        assert_eq!(outcome.inserted_id(), None);

        assert!(session.insert(&first).await.is_err());

        let lookup = KeyLookup::new("tenant", "users", "id").key("username", Value::from("alice"));
        assert_eq!(session.find_primary_key(&lookup).await.unwrap(), Some(1));
        assert_eq!(adapter.row_count("tenant", "users"), 0);

        session.commit().await.unwrap();
        let rows = adapter.rows("tenant", "users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_value("email"), Value::from("b@x"));
        assert_eq!(adapter.find_primary_key(&lookup).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let adapter = adapter();
        let mut session = adapter.begin("tenant").await.unwrap();
        session
            .insert(&InsertStatement::new(
                "users",
                vec![("username".into(), Value::from("bob"))],
            ))
            .await
            .unwrap();
        session.rollback().await.unwrap();
        assert_eq!(adapter.row_count("tenant", "users"), 0);
        assert!(session.commit().await.is_err());
    }

    #[tokio::test]
    async fn introspection_and_filtered_reads() {
        let adapter = adapter();
        adapter
            .insert_row("tenant", "users", [("username", "alice"), ("email", "a@x")])
            .unwrap();
        adapter
            .insert_row("tenant", "users", [("username", "bob"), ("email", "b@x")])
            .unwrap();

        assert_eq!(
            adapter.table_columns("tenant", "users").await.unwrap(),
            vec!["id", "email", "username"]
        );
        assert_eq!(
            adapter.unique_key_sets("tenant", "users").await.unwrap(),
            vec![vec!["username".to_string()]]
        );
        assert_eq!(
            adapter.primary_key_column("tenant", "users").await.unwrap(),
            Some("id".to_string())
        );
        assert!(adapter.table_columns("tenant", "nope").await.unwrap().is_empty());

        let rows = adapter
            .fetch_rows(
                FetchRowsRequest::new("tenant", "users").filter("username", Value::from("bob")),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_value("id"), Value::Int(2));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let adapter = adapter();
        adapter.fail_inserts("tenant", "users", Some(("username", Value::from("mallory"))));
        adapter.fail_commit("tenant");

        let mut session = adapter.begin("tenant").await.unwrap();
        let bad = InsertStatement::new("users", vec![("username".into(), Value::from("mallory"))]);
        let good = InsertStatement::new("users", vec![("username".into(), Value::from("carol"))]);
        assert!(session.insert(&bad).await.is_err());
        assert!(session.insert(&good).await.is_ok());
        assert!(session.commit().await.is_err());

        adapter.fail_begin("central");
        assert!(adapter.begin("central").await.is_err());
    }
}
