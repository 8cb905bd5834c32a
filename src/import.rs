//! JSON catalog import
//!
//! Walks a data directory for `resources.json`, `machines.json` and
//! `recipes.json` files and loads their contents into the catalog database.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use rusqlite::Connection;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use walkdir::WalkDir;

use crate::db;
use crate::error::ConfigError;
use crate::graph::port::{PortDirection, PortId};
use crate::models::{MachineConfiguration, MachineTemplate, PortTemplate, RecipeEntry, Resource};

/// Kinds of catalog file, in the order they must be imported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CatalogFile {
    Resources,
    Machines,
    Recipes,
}

impl CatalogFile {
    fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "resources.json" => Some(CatalogFile::Resources),
            "machines.json" => Some(CatalogFile::Machines),
            "recipes.json" => Some(CatalogFile::Recipes),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceRecord {
    name: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Input,
    Output,
}

impl From<Mode> for PortDirection {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Input => PortDirection::Input,
            Mode::Output => PortDirection::Output,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PortRecord {
    id: PortId,
    mode: Mode,
}

#[derive(Debug, Deserialize)]
struct MachineRecord {
    id: i64,
    name: String,
    ports: Vec<PortRecord>,
}

#[derive(Debug, Deserialize)]
struct EntryRecord {
    resource: String,
    flow: f64,
    #[serde(default)]
    port: Option<PortId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipeRecord {
    name: String,
    target_machine: String,
    #[serde(default)]
    inputs: Vec<EntryRecord>,
    #[serde(default)]
    output: Vec<EntryRecord>,
}

/// Find all catalog JSON files below `data_dir`, resources first
pub fn find_catalog_files(data_dir: &Path) -> Result<Vec<(CatalogFile, PathBuf)>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(data_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let kind = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(CatalogFile::from_file_name);
        if let Some(kind) = kind {
            files.push((kind, path.to_path_buf()));
        }
    }

    files.sort();
    Ok(files)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn import_resources(conn: &Connection, path: &Path) -> Result<usize> {
    let records: Vec<ResourceRecord> = read_json(path)?;
    for record in &records {
        db::insert_resource(conn, &Resource::new(record.name.as_str()))?;
    }
    Ok(records.len())
}

fn import_machines(conn: &Connection, path: &Path) -> Result<usize> {
    let records: Vec<MachineRecord> = read_json(path)?;
    for record in &records {
        let machine = MachineTemplate {
            id: record.id,
            name: record.name.clone(),
            ports: record
                .ports
                .iter()
                .map(|p| PortTemplate {
                    id: p.id,
                    direction: p.mode.into(),
                })
                .collect(),
        };
        db::upsert_machine(conn, &machine)?;
    }
    Ok(records.len())
}

fn import_recipes(conn: &Connection, path: &Path) -> Result<usize> {
    let records: Vec<RecipeRecord> = read_json(path)?;
    let known = db::list_resources(conn)?;

    let to_entries = |entries: &[EntryRecord]| -> Result<Vec<RecipeEntry>> {
        entries
            .iter()
            .map(|e| -> Result<RecipeEntry> {
                let resource = Resource::new(e.resource.as_str());
                if !known.contains(&resource) {
                    return Err(ConfigError::UnknownResource(e.resource.clone()).into());
                }
                Ok(RecipeEntry {
                    resource,
                    rate: e.flow,
                    port: e.port,
                })
            })
            .collect()
    };

    let mut recipes = Vec::new();
    for record in &records {
        let recipe = MachineConfiguration {
            name: record.name.clone(),
            target_machine: record.target_machine.clone(),
            inputs: to_entries(&record.inputs)
                .with_context(|| format!("recipe {} is invalid", record.name))?,
            outputs: to_entries(&record.output)
                .with_context(|| format!("recipe {} is invalid", record.name))?,
        };
        recipes.push(recipe);
    }

    for recipe in &recipes {
        db::upsert_recipe(conn, recipe)?;
    }
    Ok(recipes.len())
}

/// Import every catalog file found below `data_dir` into the database
pub fn import_to_database(conn: &Connection, data_dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    info!("Scanning {} for catalog files...", data_dir.display());
    let files = find_catalog_files(data_dir)?;
    info!("Found {} catalog files", files.len());

    for (kind, path) in &files {
        let result = match kind {
            CatalogFile::Resources => import_resources(conn, path).map(|n| stats.resources += n),
            CatalogFile::Machines => import_machines(conn, path).map(|n| stats.machines += n),
            CatalogFile::Recipes => import_recipes(conn, path).map(|n| stats.recipes += n),
        };
        match result {
            Ok(()) => {
                stats.files += 1;
                info!("  Imported {}", path.display());
            }
            Err(e) => {
                warn!("  Error importing {}: {:#}", path.display(), e);
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub resources: usize,
    pub machines: usize,
    pub recipes: usize,
    pub errors: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} files ({} resources, {} machines, {} recipes). Errors: {}",
            self.files, self.resources, self.machines, self.recipes, self.errors
        )
    }
}
