use crate::{core::identifiers::is_valid_identifier, mapping::ConfigurationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Site description as supplied by the caller. Only `username` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteInput {
    pub username: String,
    #[serde(default, alias = "siteName")]
    pub site_name: Option<String>,
    #[serde(default, alias = "adminEmail")]
    pub admin_email: Option<String>,
    #[serde(default, alias = "id")]
    pub legacy_id: Option<i64>,
    #[serde(default, alias = "tenantDatabase")]
    pub tenant_database: Option<String>,
    #[serde(default, alias = "siteUuid")]
    pub site_uuid: Option<Uuid>,
}

impl SiteInput {
    pub fn new(username: &str) -> Self {
        SiteInput {
            username: username.to_string(),
            ..Default::default()
        }
    }
}

/// One tenant being migrated, with every default resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteContext {
    pub username: String,
    pub site_name: String,
    pub admin_email: Option<String>,
    pub legacy_id: Option<i64>,
    pub tenant_database: String,
    pub site_uuid: Uuid,
}

impl SiteContext {
    /// Fills in the tenant database (`prefix` + sanitized username) and the
    /// site UUID when the input leaves them out.
    pub fn resolve(input: SiteInput, database_prefix: &str) -> Result<Self, ConfigurationError> {
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(ConfigurationError::InvalidSite("username is required".into()));
        }

        let tenant_database = input
            .tenant_database
            .unwrap_or_else(|| format!("{database_prefix}{}", sanitize(&username)));
        if !is_valid_identifier(&tenant_database) {
            return Err(ConfigurationError::InvalidSite(format!(
                "'{tenant_database}' is not a usable database name"
            )));
        }

        Ok(SiteContext {
            site_name: input.site_name.unwrap_or_else(|| username.clone()),
            admin_email: input.admin_email,
            legacy_id: input.legacy_id,
            tenant_database,
            site_uuid: input
                .site_uuid
                .unwrap_or_else(|| default_site_uuid(&username)),
            username,
        })
    }
}

/// Name-based (v5) UUID of a username, so every run registers the same site.
pub fn default_site_uuid(username: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("site:{username}").as_bytes())
}

fn sanitize(username: &str) -> String {
    username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
