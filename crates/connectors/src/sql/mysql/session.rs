use crate::sql::{
    base::{
        adapter::WriteSession,
        error::DbError,
        query::{dialect, generator::QueryGenerator},
        requests::{InsertStatement, KeyLookup, WriteOutcome},
    },
    mysql::{adapter::first_id, params::MySqlParamStore},
};
use async_trait::async_trait;
use mysql_async::{Conn, Row, prelude::*};
use tracing::{debug, trace};

/// A pooled connection switched to one database with an open transaction.
pub struct MySqlSession {
    conn: Conn,
    database: String,
    dialect: dialect::MySql,
    open: bool,
}

impl MySqlSession {
    pub(crate) async fn start(mut conn: Conn, database: &str) -> Result<Self, DbError> {
        let dialect = dialect::MySql;
        let use_sql = QueryGenerator::new(&dialect).use_database(database);
        conn.query_drop(use_sql).await?;
        conn.query_drop("START TRANSACTION").await?;
        debug!(database = %database, "Transaction started");

        Ok(MySqlSession {
            conn,
            database: database.to_string(),
            dialect,
            open: true,
        })
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
impl WriteSession for MySqlSession {
    fn database(&self) -> &str {
        &self.database
    }

    async fn insert(&mut self, statement: &InsertStatement) -> Result<WriteOutcome, DbError> {
        self.ensure_open()?;
        let (sql, params) = QueryGenerator::new(&self.dialect).insert(statement);
        trace!(sql = %sql, "Executing insert");

        self.conn
            .exec_drop(sql, MySqlParamStore::from_values(&params).params())
            .await?;

        Ok(WriteOutcome {
            affected_rows: self.conn.affected_rows(),
            last_insert_id: self.conn.last_insert_id(),
        })
    }

    async fn find_primary_key(&mut self, lookup: &KeyLookup) -> Result<Option<i64>, DbError> {
        self.ensure_open()?;
        let (sql, params) = QueryGenerator::new(&self.dialect).find_primary_key(lookup);
        let rows: Vec<Row> = self
            .conn
            .exec(sql, MySqlParamStore::from_values(&params).params())
            .await?;
        Ok(first_id(&rows))
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.conn.query_drop("COMMIT").await?;
        self.open = false;
        debug!(database = %self.database, "Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.conn.query_drop("ROLLBACK").await?;
        debug!(database = %self.database, "Transaction rolled back");
        Ok(())
    }
}
