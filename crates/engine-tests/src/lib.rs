#![allow(dead_code)]

use connectors::memory::{MemoryAdapter, TableSpec};
use engine_config::settings::validated::ValidatedSettings;
use engine_core::RetryPolicy;
use engine_runtime::{SiteMigrator, factory::Adapters};
use model::{
    core::value::Value,
    mapping::MappingDocument,
    site::{SiteContext, SiteInput},
};
use serde_json::json;
use std::sync::Arc;

pub mod integration;
pub mod utils;

pub const LEGACY_DB: &str = "legacy";
pub const CENTRAL_DB: &str = "central";
pub const TENANT_DB: &str = "tenant_alice";

/// Source, tenant and central servers of one test run.
pub struct TestServers {
    pub source: MemoryAdapter,
    pub target: MemoryAdapter,
    pub central: MemoryAdapter,
}

impl TestServers {
    pub fn new() -> Self {
        let servers = TestServers {
            source: legacy_server(),
            target: MemoryAdapter::new(),
            central: central_server(),
        };
        create_tenant_schema(&servers.target, TENANT_DB);
        servers
    }

    pub fn migrator(&self, settings: ValidatedSettings) -> SiteMigrator {
        let adapters = Adapters::new(Arc::new(self.source.clone()), Arc::new(self.target.clone()))
            .with_central(Arc::new(self.central.clone()));
        SiteMigrator::new(mapping_document(), settings, adapters)
    }
}

impl Default for TestServers {
    fn default() -> Self {
        Self::new()
    }
}

pub fn settings() -> ValidatedSettings {
    ValidatedSettings::new(LEGACY_DB)
        .with_central_database(CENTRAL_DB)
        .with_retry(RetryPolicy::none())
}

/// `{"username": "alice", "siteName": "Alice Co", "id": 7}`
pub fn alice(migrator: &SiteMigrator) -> SiteContext {
    let input: SiteInput =
        serde_json::from_value(json!({"username": "alice", "siteName": "Alice Co", "id": 7}))
            .expect("site input");
    migrator.site_context(input).expect("site context")
}

pub fn mapping_document() -> MappingDocument {
    MappingDocument::load(json!({
        "_meta": {"version": 2, "owner": "migrations"},
        "_deprecated_tables": ["legacy_audit"],
        "accounts": {
            "account_name": {"targets": [
                {"db": "tenant", "table": "site", "column": "site_name"},
                {"db": "central", "table": "sites_registry", "column": "site_name"}
            ]},
            "email": {"targets": [{"table": "site", "column": "admin_email"}]},
            "plan": {"deprecated": true, "notes": "Billing moved out"}
        },
        "users": {
            "login": {"targets": [
                {"table": "users", "column": "username"},
                {"db": "central", "table": "user_registry", "column": "username"}
            ]},
            "email": {
                "target": "users.email",
                "sql": "CASE WHEN email IS NULL THEN 'unknown@example.com' ELSE email END"
            },
            "active": {"targets": [{"table": "users", "column": "is_active"}]},
            "created_at": {"targets": [{"table": "users", "column": "created_at"}]}
        },
        "patients": {
            "PatientID": {"targets": [{"table": "patients", "column": "patient_id"}]},
            "owner": {"targets": [{
                "table": "patients",
                "column": "user_id",
                "lookup_chain": [
                    {"source_table": "patients", "source_column": "owner"},
                    {"new_table": "users", "new_column": "username"}
                ]
            }]},
            "name": {"targets": [{"table": "patients", "column": "name"}]}
        },
        "studies": {
            "StudyInstanceUID": {"targets": [{"table": "studies", "column": "study_instance_uid"}]},
            "PatientID": {"targets": [{
                "table": "studies",
                "column": "patient_id",
                "lookup_chain": [
                    {"source_table": "studies", "source_column": "PatientID"},
                    {"new_table": "patients", "new_column": "patient_id"}
                ]
            }]},
            "Modality": {"targets": [{
                "table": "studies",
                "column": "modality",
                "sql": "CASE Modality WHEN 'CT' THEN 'computed_tomography' WHEN 'MR' THEN 'magnetic_resonance' ELSE 'other' END"
            }]}
        },
        "series": {
            "SeriesInstanceUID": {"targets": [{"table": "series", "column": "series_instance_uid"}]},
            "StudyInstanceUID": {"targets": [{
                "table": "series",
                "column": "study_id",
                "lookup_chain": [
                    {"source_table": "series", "source_column": "StudyInstanceUID"},
                    {"new_table": "studies", "new_column": "study_instance_uid"}
                ]
            }]},
            "PatientID": {"targets": [{
                "table": "series",
                "column": "user_id",
                "lookup_chain": [
                    {"source_table": "series", "source_column": "PatientID"},
                    {"lookup_in": "patients", "lookup_column": "PatientID", "return_column": "owner"},
                    {"new_table": "users", "new_column": "username"}
                ]
            }]},
            "Description": {"targets": [{
                "table": "series",
                "column": "description",
                "condition": "Description IS NOT NULL AND Description != ''"
            }]}
        },
        "products": {
            "title": {"targets": [{"table": "products", "column": "title"}]}
        },
        "legacy_audit": {
            "line": {"targets": [{"table": "audit_log", "column": "line"}]}
        }
    }))
    .expect("mapping document")
}

fn legacy_server() -> MemoryAdapter {
    let source = MemoryAdapter::new();
    source
        .create_table(
            LEGACY_DB,
            TableSpec::new("accounts")
                .primary_key("id")
                .columns(["username", "account_name", "email", "plan"]),
        )
        .create_table(
            LEGACY_DB,
            TableSpec::new("users")
                .primary_key("id")
                .columns(["account_id", "login", "email", "active", "created_at"]),
        )
        .create_table(
            LEGACY_DB,
            TableSpec::new("patients")
                .primary_key("id")
                .columns(["account_id", "PatientID", "owner", "name"]),
        )
        .create_table(
            LEGACY_DB,
            TableSpec::new("studies")
                .primary_key("id")
                .columns(["account_id", "StudyInstanceUID", "PatientID", "Modality"]),
        )
        .create_table(
            LEGACY_DB,
            TableSpec::new("series")
                .primary_key("id")
                .columns([
                    "account_id",
                    "SeriesInstanceUID",
                    "StudyInstanceUID",
                    "PatientID",
                    "Description",
                ]),
        )
        .create_table(LEGACY_DB, TableSpec::new("products").primary_key("id").columns(["title"]));

    let rows: Vec<(&str, Vec<(&str, Value)>)> = vec![
        ("accounts", vec![
            ("id", Value::Int(7)),
            ("username", Value::from("alice")),
            ("account_name", Value::from("Alice Co")),
            ("email", Value::from("admin@alice.co")),
            ("plan", Value::from("gold")),
        ]),
        ("accounts", vec![
            ("id", Value::Int(8)),
            ("username", Value::from("bob")),
            ("account_name", Value::from("Bob Ltd")),
            ("email", Value::from("admin@bob.io")),
        ]),
        ("users", vec![
            ("account_id", Value::Int(7)),
            ("login", Value::from("alice")),
            ("email", Value::from("alice@alice.co")),
            ("active", Value::Int(1)),
            ("created_at", Value::Date(date(2019, 3, 14))),
        ]),
        ("users", vec![
            ("account_id", Value::Int(7)),
            ("login", Value::from("carol")),
            ("email", Value::Null),
            ("active", Value::Int(0)),
            ("created_at", Value::Date(date(2021, 11, 2))),
        ]),
        ("users", vec![
            ("account_id", Value::Int(8)),
            ("login", Value::from("dave")),
            ("email", Value::from("dave@bob.io")),
            ("active", Value::Int(1)),
        ]),
        ("patients", vec![
            ("account_id", Value::Int(7)),
            ("PatientID", Value::from("PAT001")),
            ("owner", Value::from("alice")),
            ("name", Value::from("Ann O'Neil")),
        ]),
        ("patients", vec![
            ("account_id", Value::Int(7)),
            ("PatientID", Value::from("PAT002")),
            ("owner", Value::from("carol")),
            ("name", Value::from("Ben")),
        ]),
        ("patients", vec![
            ("account_id", Value::Int(8)),
            ("PatientID", Value::from("PAT900")),
            ("owner", Value::from("dave")),
            ("name", Value::from("Dee")),
        ]),
        ("studies", vec![
            ("account_id", Value::Int(7)),
            ("StudyInstanceUID", Value::from("1.2.1")),
            ("PatientID", Value::from("PAT001")),
            ("Modality", Value::from("CT")),
        ]),
        ("studies", vec![
            ("account_id", Value::Int(7)),
            ("StudyInstanceUID", Value::from("1.2.2")),
            ("PatientID", Value::from("PAT002")),
            ("Modality", Value::from("US")),
        ]),
        ("series", vec![
            ("account_id", Value::Int(7)),
            ("SeriesInstanceUID", Value::from("1.2.1.1")),
            ("StudyInstanceUID", Value::from("1.2.1")),
            ("PatientID", Value::from("PAT001")),
            ("Description", Value::from("Axial")),
        ]),
        ("series", vec![
            ("account_id", Value::Int(7)),
            ("SeriesInstanceUID", Value::from("1.2.2.1")),
            ("StudyInstanceUID", Value::from("1.2.2")),
            ("PatientID", Value::from("PAT002")),
            ("Description", Value::from("")),
        ]),
        ("products", vec![("title", Value::from("Viewer licence"))]),
    ];
    for (table, row) in rows {
        source.insert_row(LEGACY_DB, table, row).expect("seed legacy row");
    }
    source
}

pub fn create_tenant_schema(target: &MemoryAdapter, database: &str) {
    target
        .create_table(
            database,
            TableSpec::new("site")
                .primary_key("id")
                .unique(["site_name"])
                .columns(["admin_email"]),
        )
        .create_table(
            database,
            TableSpec::new("users")
                .primary_key("id")
                .unique(["username"])
                .columns(["email", "is_active", "created_at"]),
        )
        .create_table(
            database,
            TableSpec::new("patients")
                .primary_key("id")
                .unique(["patient_id"])
                .columns(["user_id", "name"]),
        )
        .create_table(
            database,
            TableSpec::new("studies")
                .primary_key("id")
                .unique(["study_instance_uid"])
                .columns(["patient_id", "modality"]),
        )
        .create_table(
            database,
            TableSpec::new("series")
                .primary_key("id")
                .unique(["series_instance_uid"])
                .columns(["study_id", "user_id", "description"]),
        );
}

fn central_server() -> MemoryAdapter {
    let central = MemoryAdapter::new();
    central
        .create_table(
            CENTRAL_DB,
            TableSpec::new("sites_registry")
                .primary_key("id")
                .unique(["site_uuid"])
                .columns(["site_name", "database_name"]),
        )
        .create_table(
            CENTRAL_DB,
            TableSpec::new("user_registry").primary_key("id").unique(["username"]),
        );
    central
}

fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}
