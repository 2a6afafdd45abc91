#[cfg(test)]
mod tests {
    use crate::{
        CENTRAL_DB, LEGACY_DB, TENANT_DB, TestServers, alice, settings,
        utils::{assert_row_count, find_row, id_of, row_counts},
    };
    use model::{core::value::Value, mapping::DbKind};
    use tracing_test::traced_test;

    const TENANT_TABLES: &[&str] = &["site", "users", "patients", "studies", "series"];
    const CENTRAL_TABLES: &[&str] = &["sites_registry", "user_registry"];

    // Scenario: site {"username": "alice", "siteName": "Alice Co", "id": 7} with accounts.account_name
    // mapped to both tenant `site` and central `sites_registry`.
    // Expected Outcome: one `site` row, one `sites_registry` row, no errors.
    #[traced_test]
    #[tokio::test]
    async fn alice_end_to_end() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);

        let report = migrator.migrate_site(&site).await.unwrap();

        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert!(report.tenant_tables >= 1);
        assert!(report.central_tables >= 1);
        assert_eq!(report.tenant_tables, 5);
        assert_eq!(report.central_tables, 2);
        assert_eq!(report.rows_migrated, 12);
        assert_eq!(report.row_errors, 0);
        assert_eq!(report.tables_skipped, vec!["products"]);
        assert_eq!(report.tenant_database, TENANT_DB);

        assert_row_count(&servers.target, TENANT_DB, "site", 1);
        assert_row_count(&servers.central, CENTRAL_DB, "sites_registry", 1);

        let site_row = find_row(&servers.target, TENANT_DB, "site", "site_name", "Alice Co");
        assert_eq!(site_row.get_value("admin_email"), Value::from("admin@alice.co"));

        let registry = find_row(
            &servers.central,
            CENTRAL_DB,
            "sites_registry",
            "site_name",
            "Alice Co",
        );
        assert_eq!(registry.get_value("site_uuid"), Value::from(site.site_uuid.to_string()));
        assert_eq!(registry.get_value("database_name"), Value::from(TENANT_DB));
    }

    // Scenario: rows of other accounts share the legacy tables.
    // Expected Outcome: only account 7 rows reach the tenant database.
    #[traced_test]
    #[tokio::test]
    async fn migrates_only_rows_of_the_site() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);
        migrator.migrate_site(&site).await.unwrap();

        assert_eq!(row_counts(&servers.target, TENANT_DB, TENANT_TABLES), vec![1, 2, 2, 2, 2]);
        assert!(
            servers
                .target
                .rows(TENANT_DB, "users")
                .iter()
                .all(|row| row.get_value("username") != Value::from("dave"))
        );
        assert_row_count(&servers.central, CENTRAL_DB, "user_registry", 2);
    }

    // Scenario: lookup chains through the id cache and through a legacy hop.
    // Expected Outcome: foreign keys point at the new primary keys.
    #[traced_test]
    #[tokio::test]
    async fn foreign_keys_are_remapped() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);
        migrator.migrate_site(&site).await.unwrap();

        let t = &servers.target;
        let alice_user = id_of(&find_row(t, TENANT_DB, "users", "username", "alice"));
        let carol_user = id_of(&find_row(t, TENANT_DB, "users", "username", "carol"));

        let pat1 = find_row(t, TENANT_DB, "patients", "patient_id", "PAT001");
        let pat2 = find_row(t, TENANT_DB, "patients", "patient_id", "PAT002");
        assert_eq!(pat1.get_value("user_id"), Value::Int(alice_user));
        assert_eq!(pat2.get_value("user_id"), Value::Int(carol_user));

        let study1 = find_row(t, TENANT_DB, "studies", "study_instance_uid", "1.2.1");
        assert_eq!(study1.get_value("patient_id"), Value::Int(id_of(&pat1)));
        assert_eq!(study1.get_value("modality"), Value::from("computed_tomography"));
        let study2 = find_row(t, TENANT_DB, "studies", "study_instance_uid", "1.2.2");
        assert_eq!(study2.get_value("modality"), Value::from("other"));

        // series.user_id goes series -> patients (legacy) -> users (tenant).
        let series1 = find_row(t, TENANT_DB, "series", "series_instance_uid", "1.2.1.1");
        assert_eq!(series1.get_value("study_id"), Value::Int(id_of(&study1)));
        assert_eq!(series1.get_value("user_id"), Value::Int(alice_user));
        assert_eq!(series1.get_value("description"), Value::from("Axial"));

        let series2 = find_row(t, TENANT_DB, "series", "series_instance_uid", "1.2.2.1");
        assert_eq!(series2.get_value("user_id"), Value::Int(carol_user));
        assert_eq!(series2.get_value("description"), Value::Null);

        let cached = migrator
            .state()
            .id_map
            .resolve(TENANT_DB, "users", "username", &Value::from("carol"));
        assert_eq!(cached, Some(carol_user));
    }

    // Scenario: the same site migrated twice, with and without warm caches.
    // Expected Outcome: identical row counts, upserts instead of duplicates.
    #[traced_test]
    #[tokio::test]
    async fn remigration_is_idempotent() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);

        migrator.migrate_site(&site).await.unwrap();
        let tenant = row_counts(&servers.target, TENANT_DB, TENANT_TABLES);
        let central = row_counts(&servers.central, CENTRAL_DB, CENTRAL_TABLES);

        let again = migrator.migrate_site(&site).await.unwrap();
        assert!(again.errors.is_empty(), "errors: {:?}", again.errors);
        assert_eq!(again.row_errors, 0);
        assert_eq!(row_counts(&servers.target, TENANT_DB, TENANT_TABLES), tenant);
        assert_eq!(row_counts(&servers.central, CENTRAL_DB, CENTRAL_TABLES), central);

        migrator.reset_state();
        let cold = migrator.migrate_site(&site).await.unwrap();
        assert!(cold.errors.is_empty(), "errors: {:?}", cold.errors);
        assert_eq!(row_counts(&servers.target, TENANT_DB, TENANT_TABLES), tenant);
        assert_eq!(row_counts(&servers.central, CENTRAL_DB, CENTRAL_TABLES), central);

        // A site resolved again from the same input registers the same row.
        let fresh = alice(&migrator);
        assert_eq!(fresh.site_uuid, site.site_uuid);
        let rerun = migrator.migrate_site(&fresh).await.unwrap();
        assert!(rerun.errors.is_empty(), "errors: {:?}", rerun.errors);
        assert_row_count(&servers.central, CENTRAL_DB, "sites_registry", 1);
        assert_eq!(row_counts(&servers.central, CENTRAL_DB, CENTRAL_TABLES), central);

        // Recovered ids still resolve foreign keys after a cold start.
        let alice_user = id_of(&find_row(&servers.target, TENANT_DB, "users", "username", "alice"));
        let pat1 = find_row(&servers.target, TENANT_DB, "patients", "patient_id", "PAT001");
        assert_eq!(pat1.get_value("user_id"), Value::Int(alice_user));
    }

    // Scenario: fields without transformation or lookup chain.
    // Expected Outcome: values read back equal the source values exactly.
    #[traced_test]
    #[tokio::test]
    async fn passthrough_values_round_trip() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);
        migrator.migrate_site(&site).await.unwrap();

        for login in ["alice", "carol"] {
            let source = find_row(&servers.source, LEGACY_DB, "users", "login", login);
            let target = find_row(&servers.target, TENANT_DB, "users", "username", login);
            assert_eq!(target.get_value("is_active"), source.get_value("active"));
            assert_eq!(target.get_value("created_at"), source.get_value("created_at"));
        }

        let source = find_row(&servers.source, LEGACY_DB, "patients", "PatientID", "PAT001");
        let target = find_row(&servers.target, TENANT_DB, "patients", "patient_id", "PAT001");
        assert_eq!(target.get_value("name"), source.get_value("name"));

        let carol = find_row(&servers.target, TENANT_DB, "users", "username", "carol");
        assert_eq!(carol.get_value("email"), Value::from("unknown@example.com"));
    }

    // Scenario: one patient insert fails.
    // Expected Outcome: the row is counted as a row error, the rest of the site migrates
    // and the dependent study gets a NULL foreign key.
    #[traced_test]
    #[tokio::test]
    async fn row_failure_is_contained() {
        let servers = TestServers::new();
        servers
            .target
            .fail_inserts(TENANT_DB, "patients", Some(("patient_id", Value::from("PAT002"))));
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);

        let report = migrator.migrate_site(&site).await.unwrap();
        assert_eq!(report.row_errors, 1);
        assert!(report.errors.is_empty());
        assert_row_count(&servers.target, TENANT_DB, "patients", 1);
        assert_row_count(&servers.target, TENANT_DB, "series", 2);

        let study2 = find_row(&servers.target, TENANT_DB, "studies", "study_instance_uid", "1.2.2");
        assert_eq!(study2.get_value("patient_id"), Value::Null);
    }

    // Scenario: the tenant server refuses to open transactions.
    // Expected Outcome: every tenant destination table is reported, the central side
    // still migrates and the run does not abort.
    #[traced_test]
    #[tokio::test]
    async fn destination_failures_are_reported_per_table() {
        let servers = TestServers::new();
        servers.target.fail_begin(TENANT_DB);
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);

        let report = migrator.migrate_site(&site).await.unwrap();
        let failed: Vec<&str> = report.errors.iter().map(|e| e.table.as_str()).collect();
        assert_eq!(failed, TENANT_TABLES.to_vec());
        assert_eq!(report.tenant_tables, 0);
        assert_eq!(report.central_tables, 2);
        assert_row_count(&servers.central, CENTRAL_DB, "user_registry", 2);
    }

    // Scenario: dry run.
    // Expected Outcome: the report counts rows but nothing is committed anywhere.
    #[traced_test]
    #[tokio::test]
    async fn dry_run_commits_nothing() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings().with_dry_run(true));
        let site = alice(&migrator);

        let report = migrator.migrate_site(&site).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.rows_migrated, 12);
        assert_eq!(row_counts(&servers.target, TENANT_DB, TENANT_TABLES), vec![0; 5]);
        assert_eq!(row_counts(&servers.central, CENTRAL_DB, CENTRAL_TABLES), vec![0; 2]);
    }

    // Scenario: two sites migrated through one migrator into separate tenant databases.
    // Expected Outcome: tenant ids never leak between sites.
    #[traced_test]
    #[tokio::test]
    async fn sites_do_not_share_tenant_ids() {
        let servers = TestServers::new();
        crate::create_tenant_schema(&servers.target, "tenant_bob");
        let mut migrator = servers.migrator(settings());

        let alice_site = alice(&migrator);
        migrator.migrate_site(&alice_site).await.unwrap();

        let bob_input: model::site::SiteInput =
            serde_json::from_value(serde_json::json!({"username": "bob", "siteName": "Bob Ltd", "id": 8})).unwrap();
        let bob = migrator.site_context(bob_input).unwrap();
        let report = migrator.migrate_site(&bob).await.unwrap();
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);

        let dave = id_of(&find_row(&servers.target, "tenant_bob", "users", "username", "dave"));
        let pat = find_row(&servers.target, "tenant_bob", "patients", "patient_id", "PAT900");
        assert_eq!(pat.get_value("user_id"), Value::Int(dave));
        assert_eq!(dave, 1);
        assert_row_count(&servers.central, CENTRAL_DB, "sites_registry", 2);
    }

    // Scenario: a single table run outside a full site migration.
    #[traced_test]
    #[tokio::test]
    async fn single_table_run() {
        let servers = TestServers::new();
        let mut migrator = servers.migrator(settings());
        let site = alice(&migrator);

        let outcome = migrator
            .migrate_table(
                &site,
                "users",
                DbKind::Central,
                vec![("account_id".into(), Value::Int(8))],
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_written, 1);
        assert_eq!(outcome.tables_written, vec!["user_registry"]);
        assert_row_count(&servers.central, CENTRAL_DB, "user_registry", 1);
        assert_row_count(&servers.target, TENANT_DB, "users", 0);
    }
}
