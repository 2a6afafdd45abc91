use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// One row read from (or written to) a table, columns kept in driver order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(entity: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            entity: entity.to_string(),
            field_values,
        }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(entity: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let field_values = pairs
            .into_iter()
            .map(|(name, value)| FieldValue::new(name.as_ref(), value.into()))
            .collect();
        RowData::new(entity, field_values)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .and_then(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Replaces the value of an existing column or appends a new one.
    pub fn set(&mut self, field: &str, value: Value) {
        match self
            .field_values
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(field))
        {
            Some(existing) => existing.value = (!value.is_null()).then_some(value),
            None => self.field_values.push(FieldValue::new(field, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.field_values.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let row = RowData::from_pairs("patients", [("PatientID", "PAT001")]);
        assert_eq!(row.get_value("patientid"), Value::String("PAT001".into()));
        assert_eq!(row.get_value("missing"), Value::Null);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut row = RowData::from_pairs("users", [("username", "alice")]);
        row.set("USERNAME", Value::from("bob"));
        row.set("email", Value::Null);
        assert_eq!(row.field_values.len(), 2);
        assert_eq!(row.get_value("username"), Value::from("bob"));
        assert!(row.contains("email"));
    }
}
