use super::store::{MemoryStore, MemoryTable, key};
use crate::sql::base::{
    adapter::WriteSession,
    error::DbError,
    requests::{InsertStatement, KeyLookup, WriteOutcome},
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

/// Writes go to a private copy of the database, published on commit.
pub(crate) struct MemorySession {
    store: Arc<Mutex<MemoryStore>>,
    database: String,
    staged: HashMap<String, MemoryTable>,
    touched: HashSet<String>,
    open: bool,
}

impl MemorySession {
    pub fn new(
        store: Arc<Mutex<MemoryStore>>,
        database: &str,
        staged: HashMap<String, MemoryTable>,
    ) -> Self {
        MemorySession {
            store,
            database: database.to_string(),
            staged,
            touched: HashSet::new(),
            open: true,
        }
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::SessionClosed(self.database.clone()))
        }
    }
}

#[async_trait]
impl WriteSession for MemorySession {
    fn database(&self) -> &str {
        &self.database
    }

    async fn insert(&mut self, statement: &InsertStatement) -> Result<WriteOutcome, DbError> {
        self.ensure_open()?;
        let fails = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .insert_fails(&self.database, statement);
        if fails {
            return Err(DbError::Write(format!(
                "Injected failure inserting into '{}'",
                statement.table
            )));
        }

        let table = self.staged.get_mut(&key(&statement.table)).ok_or_else(|| {
            DbError::Write(format!(
                "Table '{}.{}' doesn't exist",
                self.database, statement.table
            ))
        })?;
        let outcome = table.insert(statement)?;
        self.touched.insert(key(&statement.table));
        Ok(outcome)
    }

    async fn find_primary_key(&mut self, lookup: &KeyLookup) -> Result<Option<i64>, DbError> {
        self.ensure_open()?;
        Ok(self
            .staged
            .get(&key(&lookup.table))
            .and_then(|t| t.find(&lookup.keys))
            .and_then(|row| row.get_value(&lookup.primary_key).as_i64()))
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.open = false;

        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if store.failures.commit.contains(&key(&self.database)) {
            return Err(DbError::Unknown(format!(
                "Lost connection while committing '{}'",
                self.database
            )));
        }
        let tables = store.databases.entry(key(&self.database)).or_default();
        for name in self.touched.drain() {
            if let Some(table) = self.staged.remove(&name) {
                tables.insert(name, table);
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.open = false;
        self.staged.clear();
        self.touched.clear();
        Ok(())
    }
}
