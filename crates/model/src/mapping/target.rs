use super::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which destination a target writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    #[default]
    Tenant,
    Central,
}

impl DbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::Tenant => "tenant",
            DbKind::Central => "central",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tenant" => Some(DbKind::Tenant),
            "central" => Some(DbKind::Central),
            _ => None,
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hop of a lookup chain.
///
/// A step may carry any combination of the three parts; the resolver applies
/// the ones that are present, in order: source read (step 0 only), intra-source
/// hop, final hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column: Option<String>,
}

impl LookupStep {
    /// `(lookup_in, lookup_column, return_column)` when the step hops inside the source database.
    pub fn intra_source_hop(&self) -> Option<(&str, &str, Option<&str>)> {
        match (&self.lookup_in, &self.lookup_column) {
            (Some(table), Some(column)) => {
                Some((table.as_str(), column.as_str(), self.return_column.as_deref()))
            }
            _ => None,
        }
    }

    /// `(new_table, new_column)` when the step resolves against the destination.
    pub fn final_hop(&self) -> Option<(&str, &str)> {
        match (&self.new_table, &self.new_column) {
            (Some(table), Some(column)) => Some((table.as_str(), column.as_str())),
            _ => None,
        }
    }

    pub(crate) fn validate(
        &self,
        index: usize,
        table: &str,
        column: &str,
    ) -> Result<(), ConfigurationError> {
        let fail = |message: String| ConfigurationError::InvalidLookupChain {
            table: table.to_string(),
            column: column.to_string(),
            message,
        };

        if index == 0 && self.source_column.is_none() {
            return Err(fail("step 0 must declare source_column".into()));
        }
        if self.lookup_in.is_some() && self.lookup_column.is_none() {
            return Err(fail(format!("step {index} has lookup_in without lookup_column")));
        }
        if self.new_table.is_some() && self.new_column.is_none() {
            return Err(fail(format!("step {index} has new_table without new_column")));
        }
        Ok(())
    }

    /// Every identifier the step names, for allow-list construction.
    pub(crate) fn tables(&self) -> impl Iterator<Item = &str> {
        [&self.source_table, &self.lookup_in, &self.new_table]
            .into_iter()
            .filter_map(|t| t.as_deref())
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = &str> {
        [
            &self.source_column,
            &self.lookup_column,
            &self.return_column,
            &self.new_column,
        ]
        .into_iter()
        .filter_map(|c| c.as_deref())
    }
}

/// A single destination for one source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub db: DbKind,
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_chain: Option<Vec<LookupStep>>,
}

impl Target {
    pub fn new(db: DbKind, table: &str, column: &str) -> Self {
        Target {
            db,
            table: table.to_string(),
            column: column.to_string(),
            sql: None,
            condition: None,
            lookup_chain: None,
        }
    }

    pub fn with_sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_lookup_chain(mut self, chain: Vec<LookupStep>) -> Self {
        self.lookup_chain = Some(chain);
        self
    }

    /// Parses the legacy `"table.column"` form.
    pub fn from_legacy(
        source_table: &str,
        source_column: &str,
        spec: &str,
    ) -> Result<Self, ConfigurationError> {
        match spec.split_once('.') {
            Some((table, column))
                if !table.trim().is_empty()
                    && !column.trim().is_empty()
                    && !column.contains('.') =>
            {
                Ok(Target::new(DbKind::Tenant, table.trim(), column.trim()))
            }
            _ => Err(ConfigurationError::InvalidTarget {
                table: source_table.to_string(),
                column: source_column.to_string(),
                message: format!("legacy target '{spec}' is not of the form table.column"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_kind_defaults_to_tenant() {
        let target: Target =
            serde_json::from_value(serde_json::json!({"table": "users", "column": "email"}))
                .unwrap();
        assert_eq!(target.db, DbKind::Tenant);
        assert_eq!(DbKind::parse("CENTRAL"), Some(DbKind::Central));
        assert_eq!(DbKind::parse("archive"), None);
    }

    #[test]
    fn legacy_target_splits_once() {
        let target = Target::from_legacy("accounts", "email", "users.email").unwrap();
        assert_eq!(target.table, "users");
        assert_eq!(target.column, "email");
        assert!(Target::from_legacy("accounts", "email", "users").is_err());
        assert!(Target::from_legacy("accounts", "email", "a.b.c").is_err());
        assert!(Target::from_legacy("accounts", "email", ".email").is_err());
    }

    #[test]
    fn step_parts_are_detected() {
        let step = LookupStep {
            lookup_in: Some("patients".into()),
            lookup_column: Some("PatientID".into()),
            new_table: Some("users".into()),
            new_column: Some("username".into()),
            ..Default::default()
        };
        assert_eq!(step.intra_source_hop(), Some(("patients", "PatientID", None)));
        assert_eq!(step.final_hop(), Some(("users", "username")));
        assert!(step.validate(1, "series", "patient_ref").is_ok());
        assert!(step.validate(0, "series", "patient_ref").is_err());
    }
}
