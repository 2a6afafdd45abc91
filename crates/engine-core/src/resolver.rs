use crate::{error::MigrationError, migration_state::MigrationState, migrator::DatabaseHandle};
use connectors::sql::base::{
    adapter::WriteSession,
    requests::{FetchRowsRequest, KeyLookup},
};
use model::{
    core::{identifiers::IdentifierAllowList, value::Value},
    mapping::LookupStep,
    records::row::RowData,
};
use tracing::{debug, trace};

/// Follows lookup chains from a legacy row to a destination primary key.
pub struct ChainResolver<'a> {
    source: DatabaseHandle<'a>,
    target: DatabaseHandle<'a>,
    allow_list: &'a IdentifierAllowList,
}

impl<'a> ChainResolver<'a> {
    pub fn new(
        source: DatabaseHandle<'a>,
        target: DatabaseHandle<'a>,
        allow_list: &'a IdentifierAllowList,
    ) -> Self {
        ChainResolver {
            source,
            target,
            allow_list,
        }
    }

    /// `Ok(None)` is a resolution miss, not an error: the field is written as NULL.
    ///
    /// `session` must be open on the target database. When given, destination
    /// lookups see the rows it has written but not yet committed.
    pub async fn resolve<'s>(
        &self,
        row: &RowData,
        chain: &[LookupStep],
        state: &mut MigrationState,
        mut session: Option<&mut (dyn WriteSession + 's)>,
    ) -> Result<Option<i64>, MigrationError> {
        let Some((first, rest)) = chain.split_first() else {
            return Ok(None);
        };
        let Some(source_column) = first.source_column.as_deref() else {
            return Ok(None);
        };

        let mut current = row.get_value(source_column);
        if current.is_null() {
            trace!(column = %source_column, "Lookup chain start value is NULL");
            return Ok(None);
        }

        // Step 0 may also carry hops of its own.
        for step in std::iter::once(first).chain(rest) {
            if let Some((table, column, return_column)) = step.intra_source_hop() {
                match self.hop(table, column, return_column, &current).await? {
                    Some(next) => current = next,
                    None => {
                        debug!(
                            table = %table,
                            column = %column,
                            value = %current,
                            "Lookup hop found no row"
                        );
                        return Ok(None);
                    }
                }
            }

            if let Some((table, column)) = step.final_hop()
                && let Some(id) = self
                    .final_hop(table, column, &current, state, session.as_deref_mut())
                    .await?
            {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    /// Reads one legacy row by equality and picks the value to carry on.
    async fn hop(
        &self,
        table: &str,
        column: &str,
        return_column: Option<&str>,
        current: &Value,
    ) -> Result<Option<Value>, MigrationError> {
        self.check_table(table)?;
        self.check_column(column)?;

        let request = FetchRowsRequest::new(self.source.database, table)
            .filter(column, current.clone())
            .limit(1);
        let Some(found) = self.source.adapter.fetch_rows(request).await?.into_iter().next() else {
            return Ok(None);
        };

        let next = match return_column {
            Some(name) => found.get_value(name),
            None if found.contains("username") => found.get_value("username"),
            None => found
                .field_values
                .iter()
                .filter(|f| !is_identifier_column(&f.name))
                .find_map(|f| f.value.clone())
                .unwrap_or(Value::Null),
        };

        Ok((!next.is_null()).then_some(next))
    }

    /// ID cache first, then a direct lookup in the destination database.
    async fn final_hop<'s>(
        &self,
        table: &str,
        column: &str,
        current: &Value,
        state: &mut MigrationState,
        session: Option<&mut (dyn WriteSession + 's)>,
    ) -> Result<Option<i64>, MigrationError> {
        let database = self.target.database;
        if let Some(id) = state.id_map.resolve(database, table, column, current) {
            trace!(table = %table, column = %column, id, "Resolved from id cache");
            return Ok(Some(id));
        }

        self.check_table(table)?;
        self.check_column(column)?;

        let primary_key = state
            .unique
            .primary_key(self.target.adapter, database, table)
            .await?;
        let lookup = KeyLookup::new(database, table, &primary_key).key(column, current.clone());
        let found = match session {
            Some(session) => session.find_primary_key(&lookup).await?,
            None => self.target.adapter.find_primary_key(&lookup).await?,
        };

        if let Some(id) = found {
            state.id_map.record_key(database, table, column, current, id);
        }
        Ok(found)
    }

    fn check_table(&self, table: &str) -> Result<(), MigrationError> {
        if self.allow_list.is_table_allowed(table) {
            Ok(())
        } else {
            Err(MigrationError::Identifier(table.to_string()))
        }
    }

    fn check_column(&self, column: &str) -> Result<(), MigrationError> {
        if self.allow_list.is_column_allowed(column) {
            Ok(())
        } else {
            Err(MigrationError::Identifier(column.to_string()))
        }
    }
}

/// `id`, `*_id`, `*ID` and `*Id` columns hold references, not carryable values.
pub fn is_identifier_column(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "id" || lower.ends_with("_id") || name.ends_with("ID") || name.ends_with("Id")
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::{
        memory::{MemoryAdapter, TableSpec},
        sql::base::{adapter::SqlAdapter, requests::InsertStatement},
    };
    use model::mapping::MappingDocument;
    use serde_json::json;

    fn chain_mapping() -> MappingDocument {
        MappingDocument::load(json!({
            "series": {
                "PatientID": {"targets": [{
                    "table": "series",
                    "column": "user_id",
                    "lookup_chain": [
                        {"source_table": "series", "source_column": "PatientID"},
                        {"lookup_in": "patients", "lookup_column": "PatientID", "return_column": "username"},
                        {"new_table": "users", "new_column": "username"}
                    ]
                }]}
            }
        }))
        .unwrap()
    }

    fn chain(doc: &MappingDocument) -> Vec<LookupStep> {
        doc.fields_for("series").unwrap().targets_for("PatientID").unwrap()[0]
            .lookup_chain
            .clone()
            .unwrap()
    }

    fn source() -> MemoryAdapter {
        let source = MemoryAdapter::new();
        source.create_table(
            "legacy",
            TableSpec::new("patients").primary_key("id").columns(["PatientID", "username"]),
        );
        source
            .insert_row("legacy", "patients", [("PatientID", "PAT001"), ("username", "alice")])
            .unwrap();
        source
    }

    #[tokio::test]
    async fn resolves_through_source_hop_and_id_cache() {
        let doc = chain_mapping();
        let source = source();
        let target = MemoryAdapter::new();
        let mut state = MigrationState::default();
        state
            .id_map
            .record_key("tenant_alice", "users", "username", &Value::from("alice"), 42);

        let resolver = ChainResolver::new(
            DatabaseHandle::new(&source, "legacy"),
            DatabaseHandle::new(&target, "tenant_alice"),
            doc.allow_list(),
        );
        let row = RowData::from_pairs("series", [("PatientID", "PAT001")]);
        let id = resolver.resolve(&row, &chain(&doc), &mut state, None).await.unwrap();
        assert_eq!(id, Some(42));
    }

    #[tokio::test]
    async fn falls_back_to_destination_query() {
        let doc = chain_mapping();
        let source = source();
        let target = MemoryAdapter::new();
        target.create_table(
            "tenant_alice",
            TableSpec::new("users").primary_key("id").unique(["username"]),
        );
        target.insert_row("tenant_alice", "users", [("username", "zed")]).unwrap();
        target.insert_row("tenant_alice", "users", [("username", "alice")]).unwrap();

        let mut state = MigrationState::default();
        let resolver = ChainResolver::new(
            DatabaseHandle::new(&source, "legacy"),
            DatabaseHandle::new(&target, "tenant_alice"),
            doc.allow_list(),
        );
        let row = RowData::from_pairs("series", [("PatientID", "PAT001")]);
        let id = resolver.resolve(&row, &chain(&doc), &mut state, None).await.unwrap();
        assert_eq!(id, Some(2));
        assert_eq!(
            state.id_map.resolve("tenant_alice", "users", "username", &Value::from("alice")),
            Some(2)
        );
    }

    #[tokio::test]
    async fn misses_are_not_errors() {
        let doc = chain_mapping();
        let source = source();
        let target = MemoryAdapter::new();
        let mut state = MigrationState::default();
        let resolver = ChainResolver::new(
            DatabaseHandle::new(&source, "legacy"),
            DatabaseHandle::new(&target, "tenant_alice"),
            doc.allow_list(),
        );
        let chain = chain(&doc);

        let null_start = RowData::from_pairs("series", [("PatientID", Value::Null)]);
        let id = resolver.resolve(&null_start, &chain, &mut state, None).await.unwrap();
        assert_eq!(id, None);

        let unknown = RowData::from_pairs("series", [("PatientID", "PAT999")]);
        let id = resolver.resolve(&unknown, &chain, &mut state, None).await.unwrap();
        assert_eq!(id, None);

        let no_target_row = RowData::from_pairs("series", [("PatientID", "PAT001")]);
        let id = resolver.resolve(&no_target_row, &chain, &mut state, None).await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn session_lookup_sees_uncommitted_rows() {
        let doc = chain_mapping();
        let source = source();
        let target = MemoryAdapter::new();
        target.create_table(
            "tenant_alice",
            TableSpec::new("users").primary_key("id").unique(["username"]),
        );
        let mut session = target.begin("tenant_alice").await.unwrap();
        session
            .insert(&InsertStatement::new(
                "users",
                vec![("username".to_string(), Value::from("alice"))],
            ))
            .await
            .unwrap();

        let resolver = ChainResolver::new(
            DatabaseHandle::new(&source, "legacy"),
            DatabaseHandle::new(&target, "tenant_alice"),
            doc.allow_list(),
        );
        let chain = chain(&doc);
        let row = RowData::from_pairs("series", [("PatientID", "PAT001")]);

        let mut state = MigrationState::default();
        let committed_only = resolver.resolve(&row, &chain, &mut state, None).await.unwrap();
        assert_eq!(committed_only, None);

        let id = resolver
            .resolve(&row, &chain, &mut state, Some(session.as_mut()))
            .await
            .unwrap();
        assert_eq!(id, Some(1));
        session.rollback().await.unwrap();
    }

    #[test]
    fn identifier_columns() {
        for name in ["id", "ID", "user_id", "PatientID", "studyId"] {
            assert!(is_identifier_column(name), "{name}");
        }
        for name in ["username", "idea", "paid"] {
            assert!(!is_identifier_column(name), "{name}");
        }
    }
}
