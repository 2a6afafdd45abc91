use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Table → tables that must be migrated before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    parents: HashMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legacy source tables of a site, coarse-grained.
    pub fn site_tables() -> Self {
        Self::from_edges(&[
            ("users", &["accounts"]),
            ("sessions", &["users"]),
            ("audit_log", &["users"]),
            ("devlog", &["users"]),
            ("patients", &["users"]),
            ("studies", &["patients"]),
            ("series", &["studies"]),
            ("processing_jobs", &["series", "users"]),
            ("products", &["accounts"]),
            ("orders", &["users", "products"]),
            ("payments", &["orders"]),
        ])
    }

    /// Destination tables written from one source table.
    pub fn target_tables() -> Self {
        Self::from_edges(&[
            ("users", &["site"]),
            ("user_registry", &["sites_registry"]),
            ("sessions", &["users"]),
            ("audit_log", &["users"]),
            ("devlog", &["users"]),
            ("studies", &["patients"]),
            ("series", &["studies"]),
            ("processing_jobs", &["series", "users"]),
            ("orders", &["users", "products"]),
            ("payments", &["orders"]),
        ])
    }

    fn from_edges(edges: &[(&str, &[&str])]) -> Self {
        let mut graph = Self::new();
        for (child, parents) in edges {
            for parent in *parents {
                graph.add_dependency(child, parent);
            }
        }
        graph
    }

    /// Declares that `parent` must come before `child`.
    pub fn add_dependency(&mut self, child: &str, parent: &str) {
        let parents = self.parents.entry(child.to_ascii_lowercase()).or_default();
        let parent = parent.to_ascii_lowercase();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    /// Replaces the parent list of `child`.
    pub fn set_parents<I, S>(&mut self, child: &str, parents: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.parents.insert(
            child.to_ascii_lowercase(),
            parents
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .collect(),
        );
    }

    /// Overlays `other`: its parent lists replace those of the same child.
    pub fn merge(&mut self, other: &DependencyGraph) {
        for (child, parents) in &other.parents {
            self.parents.insert(child.clone(), parents.clone());
        }
    }

    pub fn parents_of(&self, table: &str) -> &[String] {
        self.parents
            .get(&table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Depth-first topological order of `tables`: parents first, otherwise
    /// input order. Parents outside `tables` are ignored and a cycle is broken
    /// at the edge that closes it.
    pub fn order<S: AsRef<str>>(&self, tables: &[S]) -> Vec<String> {
        let present: HashMap<String, &str> = tables
            .iter()
            .map(|t| (t.as_ref().to_ascii_lowercase(), t.as_ref()))
            .collect();

        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut emitted: HashSet<String> = HashSet::new();
        let mut ordered = Vec::with_capacity(tables.len());

        for table in tables {
            self.visit(
                &table.as_ref().to_ascii_lowercase(),
                &present,
                &mut marks,
                &mut emitted,
                &mut ordered,
            );
        }
        ordered
    }

    fn visit(
        &self,
        table: &str,
        present: &HashMap<String, &str>,
        marks: &mut HashMap<String, Mark>,
        emitted: &mut HashSet<String>,
        ordered: &mut Vec<String>,
    ) {
        match marks.get(table) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                warn!(table = %table, "Dependency cycle detected, edge skipped");
                return;
            }
            None => {}
        }
        marks.insert(table.to_string(), Mark::Visiting);

        for parent in self.parents_of(table) {
            if present.contains_key(parent) {
                self.visit(parent, present, marks, emitted, ordered);
            }
        }

        marks.insert(table.to_string(), Mark::Done);
        if let Some(original) = present.get(table)
            && emitted.insert(table.to_string())
        {
            ordered.push(original.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[String], table: &str) -> usize {
        order.iter().position(|t| t == table).unwrap()
    }

    #[test]
    fn parents_come_before_children() {
        let graph = DependencyGraph::site_tables();
        let order = graph.order(&[
            "series", "payments", "users", "accounts", "orders", "patients", "studies", "products",
        ]);
        assert_eq!(order.len(), 8);
        for (child, parent) in [
            ("users", "accounts"),
            ("patients", "users"),
            ("studies", "patients"),
            ("series", "studies"),
            ("orders", "users"),
            ("orders", "products"),
            ("payments", "orders"),
        ] {
            assert!(position(&order, parent) < position(&order, child), "{parent} before {child}");
        }
    }

    #[test]
    fn unrelated_tables_keep_input_order() {
        let graph = DependencyGraph::new();
        assert_eq!(graph.order(&["b", "a", "c"]), vec!["b", "a", "c"]);
    }

    #[test]
    fn absent_parents_are_ignored() {
        let graph = DependencyGraph::target_tables();
        assert_eq!(graph.order(&["payments", "audit_log"]), vec!["payments", "audit_log"]);
    }

    #[test]
    fn cycles_are_broken_not_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "a");
        let order = graph.order(&["a", "b"]);
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn merge_replaces_parent_lists() {
        let mut graph = DependencyGraph::target_tables();
        let mut overrides = DependencyGraph::new();
        overrides.set_parents("users", ["accounts_map"]);
        graph.merge(&overrides);
        assert_eq!(graph.parents_of("USERS"), ["accounts_map".to_string()]);
        assert_eq!(graph.order(&["users", "site"]), vec!["users", "site"]);
    }

    #[test]
    fn preserves_original_spelling() {
        let graph = DependencyGraph::site_tables();
        assert_eq!(graph.order(&["Users", "Accounts"]), vec!["Accounts", "Users"]);
    }
}
