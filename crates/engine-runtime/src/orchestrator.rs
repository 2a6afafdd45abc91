use crate::{
    error::{MigrationError, RuntimeError},
    factory::{Adapters, connect_adapters},
};
use connectors::sql::base::{
    error::DbError,
    requests::{InsertStatement, KeyLookup},
};
use engine_config::{report::MigrationReport, settings::validated::ValidatedSettings};
use engine_core::{
    DatabaseHandle, MigrationState, TableMigrator, TableOutcome, TableRequest,
};
use model::{
    core::value::Value,
    mapping::{DbKind, MappingDocument},
    site::{SiteContext, SiteInput},
};
use tracing::{debug, info, warn};

/// Migrates whole sites: registry row first, then every mapped table in
/// dependency order, tenant side before central side.
///
/// The id and unique-constraint caches live as long as the migrator and are
/// shared by every site it migrates.
pub struct SiteMigrator {
    mapping: MappingDocument,
    settings: ValidatedSettings,
    adapters: Adapters,
    state: MigrationState,
}

impl SiteMigrator {
    pub fn new(mapping: MappingDocument, settings: ValidatedSettings, adapters: Adapters) -> Self {
        let state = MigrationState::new(settings.is_dry_run());
        SiteMigrator {
            mapping,
            settings,
            adapters,
            state,
        }
    }

    /// Loads the mapping document and connects every adapter named in `settings`.
    pub async fn connect(settings: ValidatedSettings) -> Result<Self, RuntimeError> {
        let mapping = MappingDocument::from_path(&settings.mapping_path)?;
        let adapters = connect_adapters(&settings).await?;
        Ok(Self::new(mapping, settings, adapters))
    }

    pub fn mapping(&self) -> &MappingDocument {
        &self.mapping
    }

    pub fn settings(&self) -> &ValidatedSettings {
        &self.settings
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    /// Forgets every cached id and constraint, e.g. between unrelated runs.
    pub fn reset_state(&mut self) {
        self.state.reset();
    }

    pub fn site_context(&self, input: SiteInput) -> Result<SiteContext, MigrationError> {
        Ok(SiteContext::resolve(input, &self.settings.tenant_prefix)?)
    }

    /// Mapped source tables in the order they are migrated.
    pub fn table_order(&self) -> Vec<String> {
        let tables: Vec<&str> = self.mapping.tables().collect();
        self.settings.site_graph.order(&tables)
    }

    pub async fn migrate_site(
        &mut self,
        site: &SiteContext,
    ) -> Result<MigrationReport, MigrationError> {
        info!(
            site = %site.username,
            site_uuid = %site.site_uuid,
            tenant_database = %site.tenant_database,
            dry_run = self.state.is_dry_run(),
            "Migrating site"
        );

        self.register_site(site).await?;

        let mut report = MigrationReport::new(site, self.state.is_dry_run());
        let order = self.table_order();
        let total = order.len();

        for (idx, table) in order.iter().enumerate() {
            let filters = match self.site_filters(table, site).await {
                Ok(Some(filters)) => filters,
                Ok(None) => {
                    info!(table = %table, "No site filter column, table skipped");
                    report.record_skipped(table);
                    continue;
                }
                Err(err) => {
                    warn!(table = %table, error = %err, "Failed to inspect source table");
                    report.record_error(table, err);
                    continue;
                }
            };

            debug!(table = %table, step = idx + 1, total, filters = ?filters, "Processing table");

            for kind in [DbKind::Tenant, DbKind::Central] {
                if !self
                    .mapping
                    .fields_for(table)
                    .is_some_and(|fields| fields.has_targets_in(kind))
                {
                    continue;
                }

                let request = TableRequest {
                    source_table: table.clone(),
                    kind,
                    filters: filters.clone(),
                };
                match self.run_table(site, &request).await {
                    Ok(outcome) => report.record_outcome(kind, outcome),
                    Err(err) => {
                        warn!(table = %table, kind = %kind, error = %err, "Table migration failed");
                        report.record_error(table, err);
                    }
                }
            }
        }

        report.finish();
        info!(
            site = %site.username,
            rows = report.rows_migrated,
            skipped = report.rows_skipped,
            row_errors = report.row_errors,
            tenant_tables = report.tenant_tables,
            central_tables = report.central_tables,
            errors = report.errors.len(),
            "Site migration completed"
        );
        Ok(report)
    }

    /// Runs one source table for one destination kind with explicit filters.
    pub async fn migrate_table(
        &mut self,
        site: &SiteContext,
        source_table: &str,
        kind: DbKind,
        filters: Vec<(String, Value)>,
    ) -> Result<TableOutcome, MigrationError> {
        let request = TableRequest {
            source_table: source_table.to_string(),
            kind,
            filters,
        };
        self.run_table(site, &request).await
    }

    async fn run_table(
        &mut self,
        site: &SiteContext,
        request: &TableRequest,
    ) -> Result<TableOutcome, MigrationError> {
        let (adapter, database) = match request.kind {
            DbKind::Tenant => (self.adapters.target.as_ref(), site.tenant_database.as_str()),
            DbKind::Central => (
                self.adapters.central.as_ref(),
                self.settings.central_database.as_str(),
            ),
        };

        let mut migrator = TableMigrator::new(
            &self.mapping,
            DatabaseHandle::new(self.adapters.source.as_ref(), &self.settings.source_database),
            DatabaseHandle::new(adapter, database),
            &self.settings.target_graph,
            &self.settings.retry,
        );
        // Central rows aimed at the registry land on the site's own registry row.
        if request.kind == DbKind::Central {
            let registry = &self.settings.registry;
            migrator = migrator.pin_column(
                &registry.table,
                &registry.uuid_column,
                Value::String(site.site_uuid.to_string()),
            );
        }
        migrator.migrate_table(request, &mut self.state).await
    }

    /// `Some` when at least one configured filter column exists on the
    /// source table and the site has a value for it.
    async fn site_filters(
        &self,
        table: &str,
        site: &SiteContext,
    ) -> Result<Option<Vec<(String, Value)>>, MigrationError> {
        let columns = self
            .adapters
            .source
            .table_columns(&self.settings.source_database, table)
            .await?;
        let find = |name: &str| columns.iter().find(|c| c.eq_ignore_ascii_case(name)).cloned();

        let mut filters = Vec::new();
        if let Some(column) = find(&self.settings.filters.username) {
            filters.push((column, Value::from(site.username.as_str())));
        }
        if let (Some(column), Some(id)) = (find(&self.settings.filters.legacy_id), site.legacy_id) {
            filters.push((column, Value::Int(id)));
        }

        Ok((!filters.is_empty()).then_some(filters))
    }

    /// Upserts the central registry row keyed by site UUID.
    async fn register_site(&mut self, site: &SiteContext) -> Result<(), MigrationError> {
        let registry = &self.settings.registry;
        let database = self.settings.central_database.as_str();
        let central = self.adapters.central.as_ref();
        let registry_error = |source: DbError| MigrationError::Registry {
            site: site.username.clone(),
            source,
        };

        let primary_key = self
            .state
            .unique
            .primary_key(central, database, &registry.table)
            .await
            .map_err(registry_error)?;

        let uuid = Value::String(site.site_uuid.to_string());
        let statement = InsertStatement::new(
            &registry.table,
            vec![
                (registry.uuid_column.clone(), uuid.clone()),
                (registry.name_column.clone(), Value::from(site.site_name.as_str())),
                (
                    registry.database_column.clone(),
                    Value::from(site.tenant_database.as_str()),
                ),
            ],
        )
        .on_duplicate_update(vec![
            registry.name_column.clone(),
            registry.database_column.clone(),
        ]);

        let mut session = self
            .settings
            .retry
            .run("register site", || central.begin(database))
            .await
            .map_err(registry_error)?;

        let written = match session.insert(&statement).await {
            Ok(outcome) => match outcome.inserted_id() {
                Some(id) => Ok(Some(id)),
                None => {
                    let lookup = KeyLookup::new(database, &registry.table, &primary_key)
                        .key(&registry.uuid_column, uuid.clone());
                    session.find_primary_key(&lookup).await
                }
            },
            Err(err) => Err(err),
        };
        let id = match written {
            Ok(id) => id,
            Err(err) => {
                if let Err(rollback) = session.rollback().await {
                    warn!(error = %rollback, "Rollback of registry session failed");
                }
                return Err(registry_error(err));
            }
        };

        if self.state.is_dry_run() {
            session.rollback().await.map_err(registry_error)?;
        } else {
            session.commit().await.map_err(registry_error)?;
        }

        if let Some(id) = id {
            let table = &registry.table;
            self.state
                .id_map
                .record_key(database, table, &registry.uuid_column, &uuid, id);
            self.state.id_map.record_key(
                database,
                table,
                &registry.name_column,
                &Value::from(site.site_name.as_str()),
                id,
            );
        }

        info!(
            site = %site.username,
            site_uuid = %site.site_uuid,
            registry = %registry.table,
            id = ?id,
            "Registered site"
        );
        Ok(())
    }
}
