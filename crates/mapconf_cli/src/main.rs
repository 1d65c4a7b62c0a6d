//! `mapconf` inspection binary.
//!
//! # Responsibility
//! - Open the configured record store and print what it holds as JSON.
//! - Answer "who references this record" before a manual delete.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use mapconf_core::db::open_db;
use mapconf_core::{
    init_from_config, DependencyService, GetAllOptions, RecordId, RecordRepository, Section,
    SqliteRecordRepository, StoreConfig,
};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Inspect a map-service configuration store.
#[derive(Parser, Debug)]
#[command(name = "mapconf")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML config naming the store location and log settings
    #[arg(short, long, global = true, default_value = "mapconf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print core version and a liveness probe; needs no store
    Ping,
    /// List project names
    Projects,
    /// Print every section of a project
    Dump { project: String },
    /// List records referencing a record
    Deps {
        project: String,
        section: Section,
        id: RecordId,
        /// `section:field` pairs to scan; defaults depend on the target section
        #[arg(long = "look-for", value_parser = parse_look_for)]
        look_for: Vec<(Section, String)>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = match cli.command {
        Command::Ping => json!({
            "ping": mapconf_core::ping(),
            "version": mapconf_core::core_version(),
        }),
        Command::Projects => {
            let conn = open_store(&cli.config)?;
            let repo = SqliteRecordRepository::try_new(&conn)?;
            serde_json::to_value(repo.list_projects()?)?
        }
        Command::Dump { project } => {
            let conn = open_store(&cli.config)?;
            dump_project(&SqliteRecordRepository::try_new(&conn)?, &project)?
        }
        Command::Deps {
            project,
            section,
            id,
            look_for,
        } => {
            let look_for = if look_for.is_empty() {
                default_look_for(section)
            } else {
                look_for
            };
            if look_for.is_empty() {
                bail!("no default references for section `{section}`; pass --look-for");
            }
            let pairs: Vec<(Section, &str)> = look_for
                .iter()
                .map(|(section, field)| (*section, field.as_str()))
                .collect();

            let conn = open_store(&cli.config)?;
            let service = DependencyService::new(SqliteRecordRepository::try_new(&conn)?);
            let report = service.check_dependencies(id, &project, &pairs)?;
            info!(
                "event=deps_check module=cli status=ok section={section} id={id} dependent_sections={}",
                report.len()
            );
            serde_json::to_value(report)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Loads the config, starts logging when configured and opens the store.
fn open_store(config_path: &Path) -> Result<Connection> {
    let config = StoreConfig::from_file(config_path)?;
    init_from_config(&config).context("failed to start logging")?;
    let db_path = config.db_path();
    open_db(&db_path).with_context(|| format!("failed to open store `{}`", db_path.display()))
}

fn dump_project(repo: &SqliteRecordRepository<'_>, project: &str) -> Result<Value> {
    let mut sections = Map::new();
    for section in Section::ALL {
        let records = repo.get_all(section, project, &GetAllOptions::all())?;
        if records.is_empty() {
            continue;
        }
        let records: Map<String, Value> = records
            .into_iter()
            .map(|(id, payload)| (id.to_string(), Value::Object(payload)))
            .collect();
        sections.insert(section.as_str().to_string(), Value::Object(records));
    }
    Ok(Value::Object(sections))
}

/// Fields through which records of `target` are usually referenced.
fn default_look_for(target: Section) -> Vec<(Section, String)> {
    let pairs: &[(Section, &str)] = match target {
        Section::Sources | Section::Caches => {
            &[(Section::Layers, "sources"), (Section::Caches, "sources")]
        }
        Section::Grids => &[(Section::Caches, "grids"), (Section::Sources, "grids")],
        _ => &[],
    };
    pairs
        .iter()
        .map(|(section, field)| (*section, field.to_string()))
        .collect()
}

fn parse_look_for(raw: &str) -> Result<(Section, String), String> {
    let (section, field) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `section:field`, got `{raw}`"))?;
    if field.is_empty() {
        return Err(format!("empty field in `{raw}`"));
    }
    let section = section.parse::<Section>().map_err(|err| err.to_string())?;
    Ok((section, field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{default_look_for, parse_look_for};
    use mapconf_core::Section;

    #[test]
    fn parse_look_for_splits_section_and_field() {
        assert_eq!(
            parse_look_for("layers:sources").unwrap(),
            (Section::Layers, "sources".to_string())
        );
        assert!(parse_look_for("layers").is_err());
        assert!(parse_look_for("layers:").is_err());
        assert!(parse_look_for("tiles:sources").is_err());
    }

    #[test]
    fn sources_default_to_layer_and_cache_references() {
        let pairs = default_look_for(Section::Sources);
        assert!(pairs.contains(&(Section::Layers, "sources".to_string())));
        assert!(pairs.contains(&(Section::Caches, "sources".to_string())));
        assert!(default_look_for(Section::Globals).is_empty());
    }
}
