use crate::{
    cache::TableKeys, error::MigrationError, migration_state::MigrationState,
    ordering::DependencyGraph, resolver::ChainResolver, retry::RetryPolicy,
};
use connectors::sql::base::{
    adapter::{SqlAdapter, WriteSession},
    error::DbError,
    requests::{FetchRowsRequest, InsertStatement, KeyLookup, WriteOutcome},
};
use expression_engine::{CompiledExpression, Evaluator};
use model::{
    core::{identifiers::is_valid_identifier, value::Value},
    mapping::{DbKind, MappingDocument, Target},
    records::row::RowData,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Columns never overwritten by an upsert.
const PRESERVED_ON_UPDATE: &[&str] = &["id", "created_at", "created_on", "date_created"];

/// An adapter plus the database it is pointed at.
#[derive(Clone, Copy)]
pub struct DatabaseHandle<'a> {
    pub adapter: &'a dyn SqlAdapter,
    pub database: &'a str,
}

impl<'a> DatabaseHandle<'a> {
    pub fn new(adapter: &'a dyn SqlAdapter, database: &'a str) -> Self {
        DatabaseHandle { adapter, database }
    }
}

/// One `(source table, db kind)` migration step.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    pub source_table: String,
    pub kind: DbKind,
    /// `column = value` filters on the source table; empty reads every row.
    pub filters: Vec<(String, Value)>,
}

impl TableRequest {
    pub fn new(source_table: &str, kind: DbKind) -> Self {
        TableRequest {
            source_table: source_table.to_string(),
            kind,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, column: &str, value: Value) -> Self {
        self.filters.push((column.to_string(), value));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub row_errors: usize,
    /// Destination tables committed with at least one row.
    pub tables_written: Vec<String>,
    pub failures: Vec<TableFailure>,
}

impl TableOutcome {
    pub fn absorb(&mut self, other: TableOutcome) {
        self.rows_written += other.rows_written;
        self.rows_skipped += other.rows_skipped;
        self.row_errors += other.row_errors;
        for table in other.tables_written {
            if !self
                .tables_written
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&table))
            {
                self.tables_written.push(table);
            }
        }
        self.failures.extend(other.failures);
    }
}

/// A target with its expressions compiled once per table.
struct PreparedField<'m> {
    source_column: &'m str,
    target: &'m Target,
    transform: Option<CompiledExpression>,
    condition: Option<CompiledExpression>,
}

struct DestinationGroup<'m> {
    table: String,
    fields: Vec<PreparedField<'m>>,
}

#[derive(Default)]
struct DestinationOutcome {
    written: usize,
    skipped: usize,
    errors: usize,
}

/// A value written into every row of one destination table, whatever the
/// mapping produces for that column.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedColumn {
    pub table: String,
    pub column: String,
    pub value: Value,
}

/// Writes the rows of one source table into the destination tables of one
/// database kind.
pub struct TableMigrator<'a> {
    mapping: &'a MappingDocument,
    source: DatabaseHandle<'a>,
    target: DatabaseHandle<'a>,
    graph: &'a DependencyGraph,
    retry: &'a RetryPolicy,
    pinned: Vec<PinnedColumn>,
}

impl<'a> TableMigrator<'a> {
    pub fn new(
        mapping: &'a MappingDocument,
        source: DatabaseHandle<'a>,
        target: DatabaseHandle<'a>,
        graph: &'a DependencyGraph,
        retry: &'a RetryPolicy,
    ) -> Self {
        TableMigrator {
            mapping,
            source,
            target,
            graph,
            retry,
            pinned: Vec::new(),
        }
    }

    pub fn pin_column(mut self, table: &str, column: &str, value: Value) -> Self {
        self.pinned.push(PinnedColumn {
            table: table.to_string(),
            column: column.to_string(),
            value,
        });
        self
    }

    pub fn target_database(&self) -> &str {
        self.target.database
    }

    /// Fetch, group by destination table, order, write.
    ///
    /// Row failures and destination-table failures are reported in the
    /// outcome. An `Err` means the source side could not be read at all.
    pub async fn migrate_table(
        &self,
        request: &TableRequest,
        state: &mut MigrationState,
    ) -> Result<TableOutcome, MigrationError> {
        let table = request.source_table.as_str();
        let fields = self
            .mapping
            .fields_for(table)
            .ok_or_else(|| MigrationError::UnknownTable(table.to_string()))?;

        if !self.mapping.allow_list().is_table_allowed(table) {
            return Err(MigrationError::Identifier(table.to_string()));
        }
        if let Some((column, _)) = request
            .filters
            .iter()
            .find(|(column, _)| !is_valid_identifier(column))
        {
            return Err(MigrationError::Identifier(column.clone()));
        }

        let fetch =
            FetchRowsRequest::new(self.source.database, table).filters(request.filters.clone());
        let rows = self.source.adapter.fetch_rows(fetch).await?;
        if rows.is_empty() {
            debug!(table = %table, kind = %request.kind, "No source rows");
            return Ok(TableOutcome::default());
        }

        let groups = group_by_destination(fields.targets(), request.kind);
        if groups.is_empty() {
            return Ok(TableOutcome::default());
        }

        let names: Vec<&str> = groups.iter().map(|g| g.table.as_str()).collect();
        let order = self.graph.order(&names);

        info!(
            table = %table,
            kind = %request.kind,
            database = %self.target.database,
            rows = rows.len(),
            destinations = ?order,
            "Migrating table"
        );

        let mut outcome = TableOutcome::default();
        for name in &order {
            let Some(group) = groups.iter().find(|g| g.table.eq_ignore_ascii_case(name)) else {
                continue;
            };

            match self.migrate_destination(group, &rows, state).await {
                Ok(written) => {
                    outcome.rows_written += written.written;
                    outcome.rows_skipped += written.skipped;
                    outcome.row_errors += written.errors;
                    if written.written > 0 {
                        outcome.tables_written.push(group.table.clone());
                    }
                }
                Err(err) => {
                    warn!(
                        source_table = %table,
                        table = %group.table,
                        database = %self.target.database,
                        error = %err,
                        "Destination table failed"
                    );
                    outcome.failures.push(TableFailure {
                        table: group.table.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    async fn migrate_destination(
        &self,
        group: &DestinationGroup<'_>,
        rows: &[RowData],
        state: &mut MigrationState,
    ) -> Result<DestinationOutcome, MigrationError> {
        let allow = self.mapping.allow_list();
        let table = allow
            .table(&group.table)
            .ok_or_else(|| MigrationError::Identifier(group.table.clone()))?;
        if let Some(field) = group
            .fields
            .iter()
            .find(|f| !allow.is_column_allowed(&f.target.column))
        {
            return Err(MigrationError::Identifier(field.target.column.clone()));
        }
        if let Some(pin) = self
            .pinned
            .iter()
            .find(|p| !is_valid_identifier(&p.column))
        {
            return Err(MigrationError::Identifier(pin.column.clone()));
        }

        let database = self.target.database;
        let keys = state
            .unique
            .table_keys(self.target.adapter, database, table)
            .await?;

        let adapter = self.target.adapter;
        let mut session = self
            .retry
            .run("begin transaction", || adapter.begin(database))
            .await?;

        let resolver = ChainResolver::new(self.source, self.target, allow);
        let mut outcome = DestinationOutcome::default();

        // Ids are cached as soon as a row is written so later rows of the same
        // table can resolve against it. The journal takes them back if the
        // transaction does not commit.
        state.id_map.begin_journal();
        for row in rows {
            match self
                .write_row(session.as_mut(), &resolver, group, &keys, row, state)
                .await
            {
                Ok(Some((inserted, id))) => {
                    outcome.written += 1;
                    if let Some(id) = id {
                        state.id_map.record(database, &group.table, &inserted, row, id);
                    }
                }
                Ok(None) => outcome.skipped += 1,
                Err(err) => {
                    outcome.errors += 1;
                    warn!(
                        table = %group.table,
                        database = %database,
                        legacy_id = %row.get_value("id"),
                        error = %err,
                        "Row failed"
                    );
                }
            }
        }

        // Dry runs keep their ids so dependent tables still resolve.
        let finished = if state.is_dry_run() {
            session.rollback().await
        } else {
            session.commit().await
        };
        match finished {
            Ok(()) => state.id_map.commit_journal(),
            Err(err) => {
                let dropped = state.id_map.rollback_journal();
                debug!(table = %group.table, dropped, "Dropped ids of uncommitted rows");
                return Err(err.into());
            }
        }

        info!(
            table = %group.table,
            database = %database,
            written = outcome.written,
            skipped = outcome.skipped,
            errors = outcome.errors,
            dry_run = state.is_dry_run(),
            "Destination table done"
        );
        Ok(outcome)
    }

    /// `Ok(None)` when the row produced no value at all.
    async fn write_row(
        &self,
        session: &mut dyn WriteSession,
        resolver: &ChainResolver<'_>,
        group: &DestinationGroup<'_>,
        keys: &TableKeys,
        row: &RowData,
        state: &mut MigrationState,
    ) -> Result<Option<(RowData, Option<i64>)>, MigrationError> {
        let mut inserted = RowData::new(&group.table, Vec::new());
        for field in &group.fields {
            if let Some(condition) = &field.condition
                && !condition.is_true(row)
            {
                continue;
            }

            let value = match (&field.target.lookup_chain, &field.transform) {
                (Some(chain), _) => resolver
                    .resolve(row, chain, state, Some(&mut *session))
                    .await?
                    .map(Value::Int)
                    .unwrap_or(Value::Null),
                (None, Some(transform)) => transform.evaluate(row),
                (None, None) => row.get_value(field.source_column),
            };
            inserted.set(&field.target.column, value);
        }

        if inserted.field_values.iter().all(|f| f.value.is_none()) {
            return Ok(None);
        }
        for pin in self
            .pinned
            .iter()
            .filter(|p| p.table.eq_ignore_ascii_case(&group.table))
        {
            inserted.set(&pin.column, pin.value.clone());
        }

        let pairs = inserted
            .field_values
            .iter()
            .map(|f| (f.name.clone(), f.value.clone().unwrap_or(Value::Null)))
            .collect();
        let mut statement = InsertStatement::new(&group.table, pairs);

        let applicable = keys.applicable_sets(&inserted);
        if !applicable.is_empty() {
            let update = statement
                .columns
                .iter()
                .filter(|c| {
                    !c.eq_ignore_ascii_case(&keys.primary_key)
                        && !PRESERVED_ON_UPDATE.iter().any(|p| c.eq_ignore_ascii_case(p))
                })
                .cloned()
                .collect();
            statement = statement.on_duplicate_update(update);
        }

        let outcome = session.insert(&statement).await?;
        let id = recover_id(
            session,
            &outcome,
            self.target.database,
            &group.table,
            keys,
            &inserted,
        )
        .await?;
        if id.is_none() {
            debug!(table = %group.table, "Primary key of written row could not be determined");
        }
        Ok(Some((inserted, id)))
    }
}

/// Driver id for a fresh insert, the explicit primary key if one was written,
/// otherwise the first applicable unique set, in declaration order, that finds
/// the row.
async fn recover_id(
    session: &mut dyn WriteSession,
    outcome: &WriteOutcome,
    database: &str,
    table: &str,
    keys: &TableKeys,
    inserted: &RowData,
) -> Result<Option<i64>, DbError> {
    if let Some(id) = outcome.inserted_id() {
        return Ok(Some(id));
    }
    if let Some(id) = inserted.get_value(&keys.primary_key).as_i64() {
        return Ok(Some(id));
    }

    for set in keys.applicable_sets(inserted) {
        let lookup = set
            .iter()
            .fold(KeyLookup::new(database, table, &keys.primary_key), |lookup, column| {
                lookup.key(column, inserted.get_value(column))
            });
        if let Some(id) = session.find_primary_key(&lookup).await? {
            debug!(table = %table, unique_set = ?set, id, "Recovered id of existing row");
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Targets of `kind` grouped by destination table, in first-seen order.
fn group_by_destination<'m>(
    targets: impl Iterator<Item = (&'m str, &'m Target)>,
    kind: DbKind,
) -> Vec<DestinationGroup<'m>> {
    let mut groups: Vec<DestinationGroup<'m>> = Vec::new();
    for (source_column, target) in targets.filter(|(_, t)| t.db == kind) {
        let field = PreparedField {
            source_column,
            target,
            transform: target.sql.as_deref().map(CompiledExpression::compile),
            condition: target.condition.as_deref().map(CompiledExpression::compile),
        };
        match groups
            .iter_mut()
            .find(|g| g.table.eq_ignore_ascii_case(&target.table))
        {
            Some(group) => group.fields.push(field),
            None => groups.push(DestinationGroup {
                table: target.table.clone(),
                fields: vec![field],
            }),
        }
    }
    groups
}
