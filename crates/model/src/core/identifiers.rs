use std::collections::HashSet;

/// `[A-Za-z_][A-Za-z0-9_$]*`, the unquoted identifier shape of MySQL.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Every table and column name the mapping document is allowed to reach.
///
/// Names are compared case-insensitively, matching MySQL's behaviour for
/// column names.
#[derive(Clone, Debug, Default)]
pub struct IdentifierAllowList {
    tables: HashSet<String>,
    columns: HashSet<String>,
}

impl IdentifierAllowList {
    pub fn allow_table(&mut self, table: &str) {
        self.tables.insert(table.to_ascii_lowercase());
    }

    pub fn allow_column(&mut self, column: &str) {
        self.columns.insert(column.to_ascii_lowercase());
    }

    /// `name` when it is listed and safe to quote into SQL.
    pub fn table<'n>(&self, name: &'n str) -> Option<&'n str> {
        (self.tables.contains(&name.to_ascii_lowercase()) && is_valid_identifier(name))
            .then_some(name)
    }

    pub fn column<'n>(&self, name: &'n str) -> Option<&'n str> {
        (self.columns.contains(&name.to_ascii_lowercase()) && is_valid_identifier(name))
            .then_some(name)
    }

    pub fn is_table_allowed(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn is_column_allowed(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_injection_shapes() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("_tmp$1"));
        assert!(!is_valid_identifier("users; DROP TABLE x"));
        assert!(!is_valid_identifier("a`b"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier(""));

        let mut list = IdentifierAllowList::default();
        list.allow_table("users; DROP TABLE x");
        assert_eq!(list.table("users; DROP TABLE x"), None);
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let mut list = IdentifierAllowList::default();
        list.allow_table("Users");
        list.allow_column("PatientID");
        assert!(list.is_table_allowed("users"));
        assert!(list.is_column_allowed("patientid"));
        assert!(!list.is_column_allowed("password"));
    }
}
