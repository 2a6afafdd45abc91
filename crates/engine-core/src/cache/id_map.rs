use model::{core::value::Value, records::row::RowData};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Column of the legacy row whose value is always recorded.
pub const LEGACY_ID_COLUMN: &str = "id";

/// Natural keys recorded when present in the inserted data (lowercase).
pub const NATURAL_KEYS: &[&str] = &[
    "username",
    "patient_id",
    "patientid",
    "study_instance_uid",
    "studyinstanceuid",
    "series_instance_uid",
    "seriesinstanceuid",
];

type ColumnIndex = HashMap<String, HashMap<String, i64>>;
type TableKey = (String, String);

/// `(database, table) → column → old value → new primary key`.
///
/// Append-only: a second record for the same key with a different id is
/// ignored and logged. While a journal is open, new entries are also noted
/// so an uncommitted transaction can take them back.
#[derive(Debug, Default, Clone)]
pub struct IdMappingCache {
    tables: HashMap<TableKey, ColumnIndex>,
    journal: Option<Vec<(TableKey, String, String)>>,
}

impl IdMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `new_id` under the legacy id of `source_row` and every natural
    /// key present in `inserted`. Returns how many keys were stored.
    pub fn record(
        &mut self,
        database: &str,
        table: &str,
        inserted: &RowData,
        source_row: &RowData,
        new_id: i64,
    ) -> usize {
        let mut stored = 0;

        let legacy = source_row.get_value(LEGACY_ID_COLUMN);
        if self.record_key(database, table, LEGACY_ID_COLUMN, &legacy, new_id) {
            stored += 1;
        }

        for field in &inserted.field_values {
            let column = field.name.to_ascii_lowercase();
            if !NATURAL_KEYS.contains(&column.as_str()) {
                continue;
            }
            let value = field.value.clone().unwrap_or(Value::Null);
            if self.record_key(database, table, &column, &value, new_id) {
                stored += 1;
            }
        }

        stored
    }

    /// Stores one `(column, value) → new_id` entry. NULL values are not keys.
    pub fn record_key(
        &mut self,
        database: &str,
        table: &str,
        column: &str,
        value: &Value,
        new_id: i64,
    ) -> bool {
        let Some(old) = value.as_string() else {
            return false;
        };

        let key = table_key(database, table);
        let column_key = column.to_ascii_lowercase();
        let values = self
            .tables
            .entry(key.clone())
            .or_default()
            .entry(column_key.clone())
            .or_default();

        match values.get(&old) {
            Some(existing) if *existing != new_id => {
                warn!(
                    database = %database,
                    table = %table,
                    column = %column,
                    value = %old,
                    kept = existing,
                    ignored = new_id,
                    "Conflicting id mapping ignored"
                );
                false
            }
            Some(_) => false,
            None => {
                trace!(
                    table = %table,
                    column = %column,
                    value = %old,
                    new_id,
                    "Recorded id mapping"
                );
                values.insert(old.clone(), new_id);
                if let Some(journal) = &mut self.journal {
                    journal.push((key, column_key, old));
                }
                true
            }
        }
    }

    /// Starts noting new entries. An open journal is discarded first.
    pub fn begin_journal(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keeps every entry noted since [`Self::begin_journal`].
    pub fn commit_journal(&mut self) {
        self.journal = None;
    }

    /// Removes every entry noted since [`Self::begin_journal`] and returns how many.
    pub fn rollback_journal(&mut self) -> usize {
        let Some(entries) = self.journal.take() else {
            return 0;
        };
        let removed = entries.len();
        for (key, column, old) in entries {
            if let Some(values) = self
                .tables
                .get_mut(&key)
                .and_then(|columns| columns.get_mut(&column))
            {
                values.remove(&old);
            }
        }
        removed
    }

    pub fn resolve(&self, database: &str, table: &str, column: &str, old: &Value) -> Option<i64> {
        let old = old.as_string()?;
        self.tables
            .get(&table_key(database, table))?
            .get(&column.to_ascii_lowercase())?
            .get(&old)
            .copied()
    }

    /// Total number of stored keys.
    pub fn len(&self) -> usize {
        self.tables
            .values()
            .flat_map(|columns| columns.values())
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.journal = None;
    }
}

fn table_key(database: &str, table: &str) -> (String, String) {
    (database.to_ascii_lowercase(), table.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_legacy_id_and_natural_keys() {
        let mut cache = IdMappingCache::new();
        let source = RowData::from_pairs("patients", [("id", Value::Int(9))]);
        let inserted = RowData::from_pairs(
            "patients",
            [("PatientID", "PAT001"), ("name", "Ann"), ("username", "alice")],
        );
        assert_eq!(cache.record("tenant_a", "patients", &inserted, &source, 42), 3);

        assert_eq!(cache.resolve("tenant_a", "patients", "id", &Value::from("9")), Some(42));
        assert_eq!(
            cache.resolve("tenant_a", "patients", "patientid", &Value::from("PAT001")),
            Some(42)
        );
        assert_eq!(
            cache.resolve("TENANT_A", "Patients", "PatientID", &Value::from("PAT001")),
            Some(42)
        );
        assert_eq!(cache.resolve("tenant_a", "patients", "name", &Value::from("Ann")), None);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn databases_are_isolated() {
        let mut cache = IdMappingCache::new();
        cache.record_key("tenant_a", "users", "username", &Value::from("alice"), 1);
        assert_eq!(
            cache.resolve("tenant_b", "users", "username", &Value::from("alice")),
            None
        );
    }

    #[test]
    fn first_mapping_wins() {
        let mut cache = IdMappingCache::new();
        assert!(cache.record_key("t", "users", "username", &Value::from("alice"), 1));
        assert!(!cache.record_key("t", "users", "username", &Value::from("alice"), 2));
        assert!(!cache.record_key("t", "users", "username", &Value::Null, 3));
        assert_eq!(cache.resolve("t", "users", "username", &Value::from("alice")), Some(1));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn journal_rollback_forgets_only_new_entries() {
        let mut cache = IdMappingCache::new();
        cache.record_key("t", "users", "username", &Value::from("alice"), 1);

        cache.begin_journal();
        cache.record_key("t", "users", "username", &Value::from("bob"), 2);
        cache.record_key("t", "users", "username", &Value::from("alice"), 1);
        assert_eq!(cache.rollback_journal(), 1);

        assert_eq!(cache.resolve("t", "users", "username", &Value::from("alice")), Some(1));
        assert_eq!(cache.resolve("t", "users", "username", &Value::from("bob")), None);

        cache.begin_journal();
        cache.record_key("t", "users", "username", &Value::from("carol"), 3);
        cache.commit_journal();
        assert_eq!(cache.rollback_journal(), 0);
        assert_eq!(cache.resolve("t", "users", "username", &Value::from("carol")), Some(3));
    }
}
