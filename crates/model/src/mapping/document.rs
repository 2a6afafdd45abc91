use super::{
    error::ConfigurationError,
    target::{DbKind, LookupStep, Target},
};
use crate::core::identifiers::{IdentifierAllowList, is_valid_identifier};
use serde_json::{Map, Value as JsonValue};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
};
use tracing::{debug, warn};

const META_PREFIX: char = '_';
const DEPRECATED_TABLES_KEY: &str = "_deprecated_tables";
const DEPRECATED_COLUMNS_KEY: &str = "_deprecated_columns";

/// Targets of one source column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub source_column: String,
    pub targets: Vec<Target>,
    pub notes: Option<String>,
}

/// Source column → ordered list of targets, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    columns: Vec<ColumnMapping>,
}

impl FieldMapping {
    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn targets_for(&self, column: &str) -> Option<&[Target]> {
        self.columns
            .iter()
            .find(|c| c.source_column.eq_ignore_ascii_case(column))
            .map(|c| c.targets.as_slice())
    }

    /// Flattened `(source column, target)` pairs.
    pub fn targets(&self) -> impl Iterator<Item = (&str, &Target)> {
        self.columns.iter().flat_map(|c| {
            c.targets
                .iter()
                .map(move |t| (c.source_column.as_str(), t))
        })
    }

    pub fn has_targets_in(&self, db: DbKind) -> bool {
        self.targets().any(|(_, t)| t.db == db)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(|c| c.targets.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableMapping {
    pub name: String,
    pub fields: FieldMapping,
}

/// A loaded, normalized and validated mapping document. Immutable after load.
#[derive(Debug, Clone, Default)]
pub struct MappingDocument {
    tables: Vec<TableMapping>,
    metadata: Map<String, JsonValue>,
    deprecated_tables: HashSet<String>,
    deprecated_columns: HashMap<String, HashSet<String>>,
    allow_list: IdentifierAllowList,
}

impl MappingDocument {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        let raw: JsonValue = serde_json::from_str(text)?;
        Self::load(raw)
    }

    pub fn load(raw: JsonValue) -> Result<Self, ConfigurationError> {
        let JsonValue::Object(entries) = raw else {
            return Err(ConfigurationError::InvalidDocument(
                "top level must be an object keyed by source table".into(),
            ));
        };

        let mut doc = MappingDocument::default();

        for (key, value) in entries.iter() {
            if key.starts_with(META_PREFIX) {
                doc.metadata.insert(key.clone(), value.clone());
            }
        }
        doc.deprecated_tables = parse_deprecated_tables(doc.metadata.get(DEPRECATED_TABLES_KEY))?;
        doc.deprecated_columns =
            parse_deprecated_columns(doc.metadata.get(DEPRECATED_COLUMNS_KEY))?;

        for (table, entry) in entries {
            if table.starts_with(META_PREFIX) {
                continue;
            }
            if doc.deprecated_tables.contains(&table.to_ascii_lowercase()) {
                debug!(table = %table, "Skipping deprecated table");
                continue;
            }
            let fields = doc.parse_table(&table, entry)?;
            doc.tables.push(TableMapping {
                name: table,
                fields,
            });
        }

        debug!(tables = doc.tables.len(), "Loaded mapping document");
        Ok(doc)
    }

    pub fn fields_for(&self, table: &str) -> Option<&FieldMapping> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(table))
            .map(|t| &t.fields)
    }

    pub fn is_known_table(&self, table: &str) -> bool {
        self.fields_for(table).is_some()
    }

    /// Mapped source tables in document order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn table_mappings(&self) -> &[TableMapping] {
        &self.tables
    }

    pub fn allow_list(&self) -> &IdentifierAllowList {
        &self.allow_list
    }

    /// Every `_`-prefixed entry of the document, verbatim.
    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }

    pub fn is_deprecated_table(&self, table: &str) -> bool {
        self.deprecated_tables.contains(&table.to_ascii_lowercase())
    }

    fn is_deprecated_column(&self, table: &str, column: &str) -> bool {
        self.deprecated_columns
            .get(&table.to_ascii_lowercase())
            .is_some_and(|cols| cols.contains(&column.to_ascii_lowercase()))
    }

    fn parse_table(
        &mut self,
        table: &str,
        entry: JsonValue,
    ) -> Result<FieldMapping, ConfigurationError> {
        let JsonValue::Object(columns) = entry else {
            return Err(ConfigurationError::InvalidTable {
                table: table.to_string(),
                message: "entry must be an object keyed by source column".into(),
            });
        };

        self.check_identifier(table)?;
        self.allow_list.allow_table(table);

        let mut fields = FieldMapping::default();
        for (column, spec) in columns {
            if column.starts_with(META_PREFIX) {
                continue;
            }
            if self.is_deprecated_column(table, &column) {
                debug!(table = %table, column = %column, "Skipping deprecated column");
                continue;
            }
            self.check_identifier(&column)?;
            self.allow_list.allow_column(&column);

            let (targets, notes) = parse_column(table, &column, spec)?;
            for target in &targets {
                self.register_target(target)?;
            }
            fields.columns.push(ColumnMapping {
                source_column: column,
                targets,
                notes,
            });
        }
        Ok(fields)
    }

    fn register_target(&mut self, target: &Target) -> Result<(), ConfigurationError> {
        self.check_identifier(&target.table)?;
        self.check_identifier(&target.column)?;
        self.allow_list.allow_table(&target.table);
        self.allow_list.allow_column(&target.column);

        for step in target.lookup_chain.iter().flatten() {
            for table in step.tables() {
                self.check_identifier(table)?;
                self.allow_list.allow_table(table);
            }
            for column in step.columns() {
                self.check_identifier(column)?;
                self.allow_list.allow_column(column);
            }
        }
        Ok(())
    }

    fn check_identifier(&self, name: &str) -> Result<(), ConfigurationError> {
        if is_valid_identifier(name) {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidIdentifier(name.to_string()))
        }
    }
}

fn parse_column(
    table: &str,
    column: &str,
    spec: JsonValue,
) -> Result<(Vec<Target>, Option<String>), ConfigurationError> {
    let invalid = |message: &str| ConfigurationError::InvalidTarget {
        table: table.to_string(),
        column: column.to_string(),
        message: message.to_string(),
    };

    let mut entry = match spec {
        JsonValue::String(legacy) => {
            return Ok((vec![Target::from_legacy(table, column, &legacy)?], None));
        }
        JsonValue::Null => return Ok((Vec::new(), None)),
        JsonValue::Object(entry) => entry,
        _ => return Err(invalid("entry must be a string or an object")),
    };

    let notes = entry
        .get("notes")
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    if entry
        .get("deprecated")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
    {
        return Ok((Vec::new(), notes));
    }

    if let Some(targets) = entry.remove("targets") {
        let JsonValue::Array(targets) = targets else {
            return Err(invalid("'targets' must be a list"));
        };
        let targets = targets
            .into_iter()
            .map(|t| match t {
                JsonValue::Object(obj) => parse_target(table, column, obj),
                _ => Err(invalid("each target must be an object")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((targets, notes));
    }

    match entry.remove("target") {
        Some(JsonValue::String(legacy)) => {
            let mut target = Target::from_legacy(table, column, &legacy)?;
            target.sql = optional_string(&entry, "sql");
            target.condition = optional_string(&entry, "condition");
            target.lookup_chain = parse_chain(table, column, entry.remove("lookup_chain"))?;
            Ok((vec![target], notes))
        }
        Some(_) => Err(invalid("'target' must be a \"table.column\" string")),
        None => {
            warn!(table = %table, column = %column, "Column entry declares no targets");
            Ok((Vec::new(), notes))
        }
    }
}

fn parse_target(
    table: &str,
    column: &str,
    mut obj: Map<String, JsonValue>,
) -> Result<Target, ConfigurationError> {
    let db = match obj.get("db") {
        None | Some(JsonValue::Null) => DbKind::default(),
        Some(JsonValue::String(kind)) => {
            DbKind::parse(kind).ok_or_else(|| ConfigurationError::UnknownDbKind {
                table: table.to_string(),
                column: column.to_string(),
                db: kind.clone(),
            })?
        }
        Some(other) => {
            return Err(ConfigurationError::UnknownDbKind {
                table: table.to_string(),
                column: column.to_string(),
                db: other.to_string(),
            });
        }
    };

    let required = |key: &str| {
        optional_string(&obj, key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigurationError::InvalidTarget {
                table: table.to_string(),
                column: column.to_string(),
                message: format!("missing '{key}'"),
            })
    };
    let dest_table = required("table")?;
    let dest_column = required("column")?;

    Ok(Target {
        db,
        table: dest_table,
        column: dest_column,
        sql: optional_string(&obj, "sql"),
        condition: optional_string(&obj, "condition"),
        lookup_chain: parse_chain(table, column, obj.remove("lookup_chain"))?,
    })
}

fn parse_chain(
    table: &str,
    column: &str,
    raw: Option<JsonValue>,
) -> Result<Option<Vec<LookupStep>>, ConfigurationError> {
    let fail = |message: String| ConfigurationError::InvalidLookupChain {
        table: table.to_string(),
        column: column.to_string(),
        message,
    };

    let raw = match raw {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(raw) => raw,
    };
    let steps: Vec<LookupStep> =
        serde_json::from_value(raw).map_err(|e| fail(e.to_string()))?;
    if steps.is_empty() {
        return Err(fail("chain is empty".into()));
    }
    for (index, step) in steps.iter().enumerate() {
        step.validate(index, table, column)?;
    }
    Ok(Some(steps))
}

fn optional_string(obj: &Map<String, JsonValue>, key: &str) -> Option<String> {
    obj.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn parse_deprecated_tables(raw: Option<&JsonValue>) -> Result<HashSet<String>, ConfigurationError> {
    match raw {
        None | Some(JsonValue::Null) => Ok(HashSet::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_ascii_lowercase)
                    .ok_or_else(|| {
                        ConfigurationError::InvalidDocument(format!(
                            "{DEPRECATED_TABLES_KEY} entries must be table names"
                        ))
                    })
            })
            .collect(),
        Some(JsonValue::Object(map)) => Ok(map.keys().map(|k| k.to_ascii_lowercase()).collect()),
        Some(_) => Err(ConfigurationError::InvalidDocument(format!(
            "{DEPRECATED_TABLES_KEY} must be a list or an object"
        ))),
    }
}

fn parse_deprecated_columns(
    raw: Option<&JsonValue>,
) -> Result<HashMap<String, HashSet<String>>, ConfigurationError> {
    let Some(raw) = raw.filter(|r| !r.is_null()) else {
        return Ok(HashMap::new());
    };
    let JsonValue::Object(map) = raw else {
        return Err(ConfigurationError::InvalidDocument(format!(
            "{DEPRECATED_COLUMNS_KEY} must be an object keyed by table"
        )));
    };

    let mut result = HashMap::new();
    for (table, columns) in map {
        let names: HashSet<String> = match columns {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_ascii_lowercase)
                .collect(),
            JsonValue::Object(cols) => cols.keys().map(|k| k.to_ascii_lowercase()).collect(),
            _ => {
                return Err(ConfigurationError::InvalidDocument(format!(
                    "{DEPRECATED_COLUMNS_KEY}.{table} must be a list or an object"
                )));
            }
        };
        result.insert(table.to_ascii_lowercase(), names);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample() -> JsonValue {
        json!({
            "_meta": {"version": 2},
            "accounts": {
                "account_name": {
                    "targets": [
                        {"db": "tenant", "table": "site", "column": "site_name"},
                        {"db": "central", "table": "sites_registry", "column": "site_name"}
                    ]
                },
                "email": {"target": "users.email", "sql": "LOWER(email)"},
                "legacy_flag": {"deprecated": true, "notes": "unused since 2019"}
            },
            "series": {
                "PatientID": {
                    "targets": [{
                        "table": "series",
                        "column": "patient_user_id",
                        "lookup_chain": [
                            {"source_table": "series", "source_column": "PatientID"},
                            {"lookup_in": "patients", "lookup_column": "PatientID", "return_column": "username"},
                            {"new_table": "users", "new_column": "username"}
                        ]
                    }]
                }
            }
        })
    }

    #[test]
    fn normalizes_legacy_entries_to_tenant_targets() {
        let doc = MappingDocument::load(sample()).unwrap();
        let targets = doc.fields_for("accounts").unwrap().targets_for("email").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].db, DbKind::Tenant);
        assert_eq!(targets[0].table, "users");
        assert_eq!(targets[0].column, "email");
        assert_eq!(targets[0].sql.as_deref(), Some("LOWER(email)"));
    }

    #[test]
    fn plain_string_entry_is_legacy_form() {
        let doc = MappingDocument::load(json!({"accounts": {"email": "users.email"}})).unwrap();
        let targets = doc.fields_for("accounts").unwrap().targets_for("email").unwrap();
        assert_eq!(targets, &[Target::new(DbKind::Tenant, "users", "email")]);
    }

    #[test]
    fn metadata_keys_are_not_tables() {
        let doc = MappingDocument::load(sample()).unwrap();
        assert_eq!(doc.tables().collect::<Vec<_>>(), vec!["accounts", "series"]);
        assert!(!doc.is_known_table("_meta"));
        assert!(doc.is_known_table("ACCOUNTS"));
        assert_eq!(doc.metadata()["_meta"]["version"], 2);
    }

    #[test]
    fn deprecated_column_contributes_no_targets() {
        let doc = MappingDocument::load(sample()).unwrap();
        let fields = doc.fields_for("accounts").unwrap();
        assert_eq!(fields.targets_for("legacy_flag"), Some(&[][..]));
        assert_eq!(fields.targets().count(), 3);
    }

    #[test]
    fn deprecated_tables_and_columns_are_skipped() {
        let doc = MappingDocument::load(json!({
            "_deprecated_tables": ["old_logs"],
            "_deprecated_columns": {"accounts": ["fax"]},
            "old_logs": {"line": "logs.line"},
            "accounts": {"fax": "site.fax", "email": "users.email"}
        }))
        .unwrap();
        assert!(!doc.is_known_table("old_logs"));
        assert!(doc.is_deprecated_table("OLD_LOGS"));
        let fields = doc.fields_for("accounts").unwrap();
        assert!(fields.targets_for("fax").is_none());
        assert!(fields.targets_for("email").is_some());
    }

    #[test]
    fn unknown_db_kind_is_rejected() {
        let err = MappingDocument::load(json!({
            "accounts": {"email": {"targets": [{"db": "archive", "table": "users", "column": "email"}]}}
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownDbKind { ref db, .. } if db == "archive"));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        let cases = [
            json!([1, 2]),
            json!({"accounts": "users.email"}),
            json!({"accounts": {"email": "users"}}),
            json!({"accounts": {"email": {"targets": [{"table": "users"}]}}}),
            json!({"accounts": {"email": {"targets": [{"table": "users", "column": "email", "lookup_chain": []}]}}}),
            json!({"accounts": {"email": {"targets": [{"table": "users", "column": "email",
                "lookup_chain": [{"lookup_in": "users"}]}]}}}),
            json!({"accounts": {"email": {"targets": [{"table": "users", "column": "email",
                "lookup_chain": [{"source_column": "email"}, {"new_table": "users"}]}]}}}),
            json!({"accounts": {"email": "users.e`mail"}}),
        ];
        for case in cases {
            assert!(MappingDocument::load(case.clone()).is_err(), "{case} should fail");
        }
    }

    #[test]
    fn allow_list_covers_chain_identifiers() {
        let doc = MappingDocument::load(sample()).unwrap();
        let allow = doc.allow_list();
        for table in ["accounts", "series", "patients", "users", "site", "sites_registry"] {
            assert!(allow.is_table_allowed(table), "{table}");
        }
        for column in ["PatientID", "username", "patient_user_id", "site_name"] {
            assert!(allow.is_column_allowed(column), "{column}");
        }
        assert!(!allow.is_table_allowed("mysql"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample()).unwrap();
        let doc = MappingDocument::from_path(file.path()).unwrap();
        assert!(doc.fields_for("series").unwrap().has_targets_in(DbKind::Tenant));
        assert!(!doc.fields_for("series").unwrap().has_targets_in(DbKind::Central));
    }
}
