use crate::settings::{
    DEFAULT_CENTRAL_DATABASE, DEFAULT_TENANT_PREFIX, FilterColumns, RegistrySettings,
};
use engine_core::{DependencyGraph, RetryPolicy};
use std::path::PathBuf;

/// Immutable, validated configuration used throughout a migration run.
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    pub source_url: String,
    pub source_database: String,
    pub target_url: String,
    pub central_url: String,
    pub central_database: String,
    /// Prepended to the sanitized username to name a tenant database.
    pub tenant_prefix: String,
    pub mapping_path: PathBuf,
    pub registry: RegistrySettings,
    pub filters: FilterColumns,
    /// Orders source tables within a site.
    pub site_graph: DependencyGraph,
    /// Orders destination tables fed by one source table.
    pub target_graph: DependencyGraph,
    pub retry: RetryPolicy,
    /// Whether this is a dry run (no changes applied)
    pub dry_run: bool,
}

impl ValidatedSettings {
    /// Built-in defaults for adapters that are already connected.
    pub fn new(source_database: &str) -> Self {
        ValidatedSettings {
            source_url: String::new(),
            source_database: source_database.to_string(),
            target_url: String::new(),
            central_url: String::new(),
            central_database: DEFAULT_CENTRAL_DATABASE.to_string(),
            tenant_prefix: DEFAULT_TENANT_PREFIX.to_string(),
            mapping_path: PathBuf::new(),
            registry: RegistrySettings::default(),
            filters: FilterColumns::default(),
            site_graph: DependencyGraph::site_tables(),
            target_graph: DependencyGraph::target_tables(),
            retry: RetryPolicy::default(),
            dry_run: false,
        }
    }

    pub fn with_central_database(mut self, database: &str) -> Self {
        self.central_database = database.to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
