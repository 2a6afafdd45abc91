use chrono::{DateTime, Utc};
use engine_core::TableOutcome;
use model::{mapping::DbKind, site::SiteContext};
use serde::Serialize;
use uuid::Uuid;

/// A table that failed, by name, with the error text.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TableError {
    pub table: String,
    pub error: String,
}

/// Destination tables that received rows, per database kind.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub tenant: Vec<String>,
    pub central: Vec<String>,
}

/// Result of migrating one site.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub site_uuid: Uuid,
    pub username: String,
    pub tenant_database: String,
    pub dry_run: bool,
    pub rows_migrated: usize,
    pub rows_skipped: usize,
    pub row_errors: usize,
    pub tenant_tables: usize,
    pub central_tables: usize,
    pub destinations: Destinations,
    /// Source tables without a usable per-site filter.
    pub tables_skipped: Vec<String>,
    pub errors: Vec<TableError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationReport {
    pub fn new(site: &SiteContext, dry_run: bool) -> Self {
        MigrationReport {
            site_uuid: site.site_uuid,
            username: site.username.clone(),
            tenant_database: site.tenant_database.clone(),
            dry_run,
            rows_migrated: 0,
            rows_skipped: 0,
            row_errors: 0,
            tenant_tables: 0,
            central_tables: 0,
            destinations: Destinations::default(),
            tables_skipped: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Folds one table migration into the totals.
    pub fn record_outcome(&mut self, kind: DbKind, outcome: TableOutcome) {
        self.rows_migrated += outcome.rows_written;
        self.rows_skipped += outcome.rows_skipped;
        self.row_errors += outcome.row_errors;

        let tables = match kind {
            DbKind::Tenant => &mut self.destinations.tenant,
            DbKind::Central => &mut self.destinations.central,
        };
        for table in outcome.tables_written {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
                tables.push(table);
            }
        }
        self.tenant_tables = self.destinations.tenant.len();
        self.central_tables = self.destinations.central.len();

        self.errors.extend(outcome.failures.into_iter().map(|f| TableError {
            table: f.table,
            error: f.error,
        }));
    }

    pub fn record_error(&mut self, table: &str, error: impl ToString) {
        self.errors.push(TableError {
            table: table.to_string(),
            error: error.to_string(),
        });
    }

    pub fn record_skipped(&mut self, table: &str) {
        self.tables_skipped.push(table.to_string());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.row_errors == 0
    }
}
