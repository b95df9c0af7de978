pub mod analysis;
pub mod cli;
pub mod commands;
pub mod error;
pub mod models;

use cli::{Cli, Command};
use commands::{db, report, settings};
use serde::Serialize;

pub async fn run(cli: Cli) -> Result<(), String> {
    let workspace = cli.workspace.to_string_lossy().to_string();
    let settings = settings::load_effective_settings(&workspace)?;

    match cli.command {
        Command::Init => {
            println!("Settings: {}", settings::settings_path(&workspace).display());
            println!("History server: {}", settings.history.url);
            println!("Single-version server: {}", settings.single.url);
            println!("Export file: {}", settings.export_path.display());
            Ok(())
        }
        Command::DebtHistory => {
            let client = report::history_client(&settings)?;
            let histories = report::run_version_debt_history(&client, &settings).await?;
            print_json(cli.json, &histories)?;

            let mut conn = open_export(&settings)?;
            let run_id = db::write_version_debt(&mut conn, &histories).map_err(|e| format!("Export error: {e}"))?;
            log::info!("Version debt history stored as run {run_id}");
            Ok(())
        }
        Command::Characterize => {
            let history = report::history_client(&settings)?;
            let single = report::single_client(&settings)?;
            let projects = report::run_characterization(&history, &single, &settings).await?;
            print_json(cli.json, &projects)?;

            let mut conn = open_export(&settings)?;
            let run_id = db::write_characterization(&mut conn, &projects).map_err(|e| format!("Export error: {e}"))?;
            log::info!("Characterization stored as run {run_id}");
            Ok(())
        }
        Command::PackageHistory => {
            if settings.projects.is_empty() {
                return Err("No applications configured under \"projects\" in settings.json".to_string());
            }
            let client = report::single_client(&settings)?;
            let histories = report::run_package_history(&client, &settings).await?;
            print_json(cli.json, &histories)?;

            let mut conn = open_export(&settings)?;
            let run_id = db::write_package_history(&mut conn, &histories).map_err(|e| format!("Export error: {e}"))?;
            log::info!("Package history stored as run {run_id}");
            Ok(())
        }
        Command::Runs => {
            let conn = open_export(&settings)?;
            let runs = db::list_runs(&conn).map_err(|e| format!("Query error: {e}"))?;
            if cli.json {
                return print_json(true, &runs);
            }
            for run in runs {
                let created = chrono::DateTime::from_timestamp(run.created_at, 0)
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default();
                println!("{}  {:<16}  {:>6} rows  {}", run.id, run.kind, run.row_count, created);
            }
            Ok(())
        }
    }
}

fn open_export(settings: &settings::EffectiveSettings) -> Result<rusqlite::Connection, String> {
    db::get_db_connection(&settings.export_path).map_err(|e| format!("DB error: {e}"))
}

fn print_json<T: Serialize>(enabled: bool, value: &T) -> Result<(), String> {
    if enabled {
        let raw = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{raw}");
    }
    Ok(())
}
