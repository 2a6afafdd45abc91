use crate::sql::{
    base::{
        adapter::{DatabaseKind, SqlAdapter, WriteSession},
        error::{ConnectorError, DbError},
        query::{dialect, generator::QueryGenerator},
        requests::{FetchRowsRequest, KeyLookup},
    },
    mysql::{params::MySqlParamStore, row::to_row_data, session::MySqlSession},
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};
use mysql_async::{Opts, Pool, Row, prelude::*};
use tracing::{debug, info};

#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
    dialect: dialect::MySql,
}

impl MySqlAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(mysql_async::Error::Url)?;
        let pool = Pool::new(opts);

        // Fail fast on bad credentials instead of at the first query.
        let conn = pool.get_conn().await?;
        drop(conn);

        Ok(MySqlAdapter {
            pool,
            dialect: dialect::MySql,
        })
    }

    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await?;
        Ok(())
    }

    async fn query(&self, sql: String, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let rows = conn
            .exec(sql, MySqlParamStore::from_values(&params).params())
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SqlAdapter for MySqlAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    async fn table_columns(&self, database: &str, table: &str) -> Result<Vec<String>, DbError> {
        let (sql, params) = QueryGenerator::new(&self.dialect).table_columns(database, table);
        let rows = self.query(sql, params).await?;
        Ok(rows.iter().filter_map(|row| text_at(row, 0)).collect())
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        let (sql, params) = QueryGenerator::new(&self.dialect).select(&request);
        debug!(sql = %sql, params = params.len(), "Fetching rows");

        let rows = self.query(sql, params).await?;
        info!(table = %request.table, rows = rows.len(), "Fetched source rows");
        Ok(rows
            .iter()
            .map(|row| to_row_data(row, &request.table))
            .collect())
    }

    async fn unique_key_sets(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<Vec<String>>, DbError> {
        let (sql, params) = QueryGenerator::new(&self.dialect).unique_keys(database, table);
        let rows = self.query(sql, params).await?;

        // Rows arrive ordered by index name, then position inside the index.
        let mut sets: Vec<(String, Vec<String>)> = Vec::new();
        for row in &rows {
            let (Some(index), Some(column)) = (text_at(row, 0), text_at(row, 1)) else {
                continue;
            };
            match sets.last_mut() {
                Some((name, columns)) if *name == index => columns.push(column),
                _ => sets.push((index, vec![column])),
            }
        }
        Ok(sets.into_iter().map(|(_, columns)| columns).collect())
    }

    async fn primary_key_column(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<String>, DbError> {
        let (sql, params) = QueryGenerator::new(&self.dialect).primary_key(database, table);
        let rows = self.query(sql, params).await?;
        Ok(rows.first().and_then(|row| text_at(row, 0)))
    }

    async fn find_primary_key(&self, lookup: &KeyLookup) -> Result<Option<i64>, DbError> {
        let (sql, params) = QueryGenerator::new(&self.dialect).find_primary_key(lookup);
        let rows = self.query(sql, params).await?;
        Ok(first_id(&rows))
    }

    async fn begin(&self, database: &str) -> Result<Box<dyn WriteSession>, DbError> {
        let conn = self.pool.get_conn().await?;
        let session = MySqlSession::start(conn, database).await?;
        Ok(Box::new(session))
    }
}

fn text_at(row: &Row, index: usize) -> Option<String> {
    match row.as_ref(index)? {
        mysql_async::Value::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
        mysql_async::Value::NULL => None,
        other => Some(other.as_sql(true).trim_matches('\'').to_string()),
    }
}

/// First column of the first row read as an integer id.
pub(crate) fn first_id(rows: &[Row]) -> Option<i64> {
    match rows.first()?.as_ref(0)? {
        mysql_async::Value::Int(i) => Some(*i),
        mysql_async::Value::UInt(u) => i64::try_from(*u).ok(),
        mysql_async::Value::Bytes(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}
