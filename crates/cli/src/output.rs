use crate::error::CliError;
use engine_config::report::MigrationReport;
use serde_json::Value as JsonValue;
use std::{fs, path::Path};
use tracing::info;

/// Writes the report as pretty JSON to `path`, or to stdout when no path is given.
pub fn emit_report(report: &MigrationReport, path: Option<&Path>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(report).map_err(CliError::JsonSerialize)?;
    match path {
        Some(path) => {
            fs::write(path, json)?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn print_json(value: &JsonValue) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(CliError::JsonSerialize)?;
    println!("{json}");
    Ok(())
}
