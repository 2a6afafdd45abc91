//! The settings file: where the databases live, where the mapping document
//! is, and the knobs around registry, filters, ordering and retries.

pub mod error;
pub mod expand;
pub mod validated;

use crate::settings::{error::SettingsError, expand::expand_vars, validated::ValidatedSettings};
use engine_core::{DependencyGraph, RetryPolicy};
use model::core::identifiers::is_valid_identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_TENANT_PREFIX: &str = "tenant_";
pub const DEFAULT_CENTRAL_DATABASE: &str = "central";

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSettings {
    pub source: SourceSettings,
    pub target: TargetSettings,
    #[serde(default)]
    pub central: CentralSettings,
    pub mapping: PathBuf,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub filters: FilterColumns,
    #[serde(default)]
    pub dependencies: DependencyOverrides,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub url: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSettings {
    pub url: String,
    #[serde(default = "default_tenant_prefix")]
    pub tenant_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CentralSettings {
    /// Defaults to the target server.
    pub url: Option<String>,
    pub database: String,
}

impl Default for CentralSettings {
    fn default() -> Self {
        CentralSettings {
            url: None,
            database: DEFAULT_CENTRAL_DATABASE.to_string(),
        }
    }
}

/// Central table that gets one row per migrated site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub table: String,
    pub uuid_column: String,
    pub name_column: String,
    pub database_column: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        RegistrySettings {
            table: "sites_registry".to_string(),
            uuid_column: "site_uuid".to_string(),
            name_column: "site_name".to_string(),
            database_column: "database_name".to_string(),
        }
    }
}

/// Source columns that scope a legacy table to one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterColumns {
    /// Matched against the site username.
    pub username: String,
    /// Matched against the legacy account id.
    pub legacy_id: String,
}

impl Default for FilterColumns {
    fn default() -> Self {
        FilterColumns {
            username: "username".to_string(),
            legacy_id: "account_id".to_string(),
        }
    }
}

/// Parent lists that replace (or, with `replace_defaults`, fully define)
/// the built-in ordering graphs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DependencyOverrides {
    pub replace_defaults: bool,
    pub site_tables: BTreeMap<String, Vec<String>>,
    pub target_tables: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

fn default_tenant_prefix() -> String {
    DEFAULT_TENANT_PREFIX.to_string()
}

impl MigrationSettings {
    /// Reads a settings file. A relative mapping path is taken relative to
    /// the settings file.
    pub fn from_path(
        path: impl AsRef<Path>,
        vars: &HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings = Self::from_json_str(&text, vars)?;
        if settings.mapping.is_relative()
            && let Some(dir) = path.parent()
        {
            settings.mapping = dir.join(&settings.mapping);
        }
        debug!(path = %path.display(), mapping = %settings.mapping.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_json_str(
        text: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let mut raw: JsonValue = serde_json::from_str(text)?;
        expand_vars(&mut raw, vars)?;
        Ok(serde_json::from_value(raw)?)
    }

    pub fn validate(self) -> Result<ValidatedSettings, SettingsError> {
        require_non_empty("source.url", &self.source.url)?;
        require_non_empty("target.url", &self.target.url)?;
        require_identifier("source.database", &self.source.database)?;
        require_identifier("central.database", &self.central.database)?;
        if !self.target.tenant_prefix.is_empty() {
            require_identifier("target.tenant_prefix", &self.target.tenant_prefix)?;
        }
        if self.mapping.as_os_str().is_empty() {
            return Err(SettingsError::invalid("mapping", "path is empty"));
        }

        require_identifier("registry.table", &self.registry.table)?;
        require_identifier("registry.uuid_column", &self.registry.uuid_column)?;
        require_identifier("registry.name_column", &self.registry.name_column)?;
        require_identifier("registry.database_column", &self.registry.database_column)?;
        require_identifier("filters.username", &self.filters.username)?;
        require_identifier("filters.legacy_id", &self.filters.legacy_id)?;

        let replace = self.dependencies.replace_defaults;
        let site_graph = build_graph(
            "dependencies.site_tables",
            DependencyGraph::site_tables(),
            &self.dependencies.site_tables,
            replace,
        )?;
        let target_graph = build_graph(
            "dependencies.target_tables",
            DependencyGraph::target_tables(),
            &self.dependencies.target_tables,
            replace,
        )?;

        if self.retry.max_attempts == 0 {
            return Err(SettingsError::invalid("retry.max_attempts", "must be at least 1"));
        }
        let retry = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        );

        let central_url = self.central.url.unwrap_or_else(|| self.target.url.clone());
        Ok(ValidatedSettings {
            source_url: self.source.url,
            source_database: self.source.database,
            target_url: self.target.url,
            central_url,
            central_database: self.central.database,
            tenant_prefix: self.target.tenant_prefix,
            mapping_path: self.mapping,
            registry: self.registry,
            filters: self.filters,
            site_graph,
            target_graph,
            retry,
            dry_run: self.dry_run,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), SettingsError> {
    if value.trim().is_empty() {
        Err(SettingsError::invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn require_identifier(field: &str, value: &str) -> Result<(), SettingsError> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(SettingsError::invalid(
            field,
            format!("'{value}' is not a valid identifier"),
        ))
    }
}

fn build_graph(
    field: &str,
    defaults: DependencyGraph,
    overrides: &BTreeMap<String, Vec<String>>,
    replace: bool,
) -> Result<DependencyGraph, SettingsError> {
    let mut graph = if replace { DependencyGraph::new() } else { defaults };
    for (child, parents) in overrides {
        require_identifier(field, child)?;
        for parent in parents {
            require_identifier(field, parent)?;
        }
        graph.set_parents(child, parents);
    }
    Ok(graph)
}
