use crate::{commands::Commands, env::EnvManager, error::CliError};
use clap::Parser;
use engine_config::settings::{MigrationSettings, validated::ValidatedSettings};
use engine_runtime::SiteMigrator;
use model::mapping::{DbKind, MappingDocument};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod env;
pub mod error;
pub mod output;

#[derive(Parser)]
#[command(name = "tenant-migrate", version, about = "Mapping-driven tenant migration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Migrate(args) => {
            let mut settings = load_settings(&args.config)?;
            if args.dry_run {
                settings = settings.with_dry_run(true);
            }
            let input = args.site_input()?;

            let mut migrator = SiteMigrator::connect(settings).await?;
            let site = migrator.site_context(input)?;
            let report = migrator.migrate_site(&site).await?;
            output::emit_report(&report, args.output.as_deref())?;

            if !report.is_clean() {
                warn!(
                    table_errors = report.errors.len(),
                    row_errors = report.row_errors,
                    "Migration finished with errors"
                );
                return Err(CliError::Incomplete {
                    tables: report.errors.len(),
                    rows: report.row_errors,
                });
            }
        }
        Commands::Validate { config } => {
            let settings = load_settings(&config)?;
            let mapping = MappingDocument::from_path(&settings.mapping_path)?;
            output::print_json(&mapping_summary(&mapping, &settings))?;
            info!(tables = mapping.table_mappings().len(), "Settings and mapping are valid");
        }
        Commands::Order { config } => {
            let settings = load_settings(&config)?;
            let mapping = MappingDocument::from_path(&settings.mapping_path)?;
            let tables: Vec<&str> = mapping.tables().collect();
            let destinations = destination_tables(&mapping, DbKind::Tenant);
            output::print_json(&json!({
                "source_tables": settings.site_graph.order(&tables),
                "tenant_tables": settings.target_graph.order(&destinations),
            }))?;
        }
    }

    Ok(())
}

fn load_settings(config: &commands::ConfigArgs) -> Result<ValidatedSettings, CliError> {
    let env = EnvManager::load(config.env_file.as_deref())?;
    Ok(MigrationSettings::from_path(&config.settings, env.all())?.validate()?)
}

fn destination_tables(mapping: &MappingDocument, kind: DbKind) -> Vec<String> {
    let tables: BTreeSet<String> = mapping
        .table_mappings()
        .iter()
        .flat_map(|t| t.fields.targets())
        .filter(|(_, target)| target.db == kind)
        .map(|(_, target)| target.table.clone())
        .collect();
    tables.into_iter().collect()
}

fn mapping_summary(mapping: &MappingDocument, settings: &ValidatedSettings) -> serde_json::Value {
    json!({
        "source_database": settings.source_database,
        "central_database": settings.central_database,
        "tenant_prefix": settings.tenant_prefix,
        "dry_run": settings.is_dry_run(),
        "mapping": settings.mapping_path.display().to_string(),
        "metadata": mapping.metadata(),
        "source_tables": mapping.tables().collect::<Vec<_>>(),
        "tenant_tables": destination_tables(mapping, DbKind::Tenant),
        "central_tables": destination_tables(mapping, DbKind::Central),
    })
}
