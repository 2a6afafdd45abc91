use crate::error::CliError;
use clap::{Args, Subcommand};
use model::site::SiteInput;
use std::{fs, path::PathBuf};

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate one site from the legacy database into its tenant database
    #[command(name = "migrate")]
    Migrate(MigrateArgs),

    /// Load settings and mapping without connecting anywhere
    #[command(name = "validate")]
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the order in which source and destination tables are processed
    #[command(name = "order")]
    Order {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, short = 's', help = "Path to the settings file (JSON)")]
    pub settings: PathBuf,

    #[arg(long, help = "Path to a .env file (defaults to ./.env when present)")]
    pub env_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(
        long,
        conflicts_with = "username",
        help = "JSON file describing the site (username, siteName, adminEmail, id)"
    )]
    pub site: Option<PathBuf>,

    #[arg(
        long,
        short = 'u',
        required_unless_present = "site",
        help = "Legacy username of the site"
    )]
    pub username: Option<String>,

    #[arg(long, help = "Display name of the site (defaults to the username)")]
    pub site_name: Option<String>,

    #[arg(long, help = "Administrator e-mail of the site")]
    pub admin_email: Option<String>,

    #[arg(long, help = "Legacy account id used to filter source rows")]
    pub legacy_id: Option<i64>,

    #[arg(long, help = "Tenant database name (defaults to prefix + username)")]
    pub tenant_database: Option<String>,

    #[arg(long, default_value_t = false, help = "Roll back every write instead of committing")]
    pub dry_run: bool,

    #[arg(long, short = 'o', help = "Write the report to this file instead of stdout")]
    pub output: Option<PathBuf>,
}

impl MigrateArgs {
    /// Builds the site description from `--site` or from the individual flags.
    /// Flags given alongside `--site` override the file's values.
    pub fn site_input(&self) -> Result<SiteInput, CliError> {
        let mut input = match (&self.site, &self.username) {
            (Some(path), _) => {
                let text = fs::read_to_string(path)?;
                serde_json::from_str::<SiteInput>(&text).map_err(CliError::SiteInput)?
            }
            (None, Some(username)) => SiteInput::new(username),
            (None, None) => SiteInput::default(),
        };

        if let Some(name) = &self.site_name {
            input.site_name = Some(name.clone());
        }
        if let Some(email) = &self.admin_email {
            input.admin_email = Some(email.clone());
        }
        if let Some(id) = self.legacy_id {
            input.legacy_id = Some(id);
        }
        if let Some(db) = &self.tenant_database {
            input.tenant_database = Some(db.clone());
        }
        Ok(input)
    }
}
