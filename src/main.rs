//! Factory Planner
//!
//! Command line driver for the factory flow network model.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use factory_planner::graph::NodeGraph;
use factory_planner::graph::port::PortDirection;
use factory_planner::models::RecipeEntry;
use factory_planner::plan::Plan;
use factory_planner::{db, import};

#[derive(Parser)]
#[command(name = "factory-planner")]
#[command(about = "Plan factory assembly lines as a flow network")]
struct Cli {
    /// Path to the SQLite catalog database
    #[arg(short, long, default_value = "factory.db")]
    database: PathBuf,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load a small built-in catalog for testing
    LoadSample,

    /// Import resources.json, machines.json and recipes.json files from a directory
    Import {
        /// Directory holding the catalog files
        data_dir: PathBuf,

        /// Clear existing catalog before importing
        #[arg(long)]
        clear: bool,
    },

    /// List all resources in the catalog
    ListResources,

    /// List all machines in the catalog
    ListMachines,

    /// List recipes, optionally only those for one machine
    ListRecipes {
        #[arg(short, long)]
        machine: Option<String>,
    },

    /// Show ports and recipes of a machine
    Machine {
        /// Machine name (e.g., "Smelter")
        name: String,
    },

    /// Run a plan script and print the resulting flows
    Plan {
        /// Path to the plan script
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            let recipes = db::load_sample_data(&conn)?;
            println!("Sample data loaded successfully! ({} recipes)", recipes);
        }

        Commands::Import { data_dir, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }

            let stats = import::import_to_database(&conn, &data_dir)?;
            println!("\n{}", stats);
        }

        Commands::ListResources => {
            let resources = db::list_resources(&conn)?;
            if resources.is_empty() {
                println!("No resources in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("Resources:");
                for r in resources {
                    println!("  {}", r);
                }
            }
        }

        Commands::ListMachines => {
            let machines = db::list_machines(&conn)?;
            if machines.is_empty() {
                println!("No machines in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<6} {:<24} {:>6} {:>7}", "Id", "Machine", "Inputs", "Outputs");
                println!("{}", "-".repeat(46));
                for m in machines {
                    let inputs = m.ports.iter().filter(|p| p.direction == PortDirection::Input).count();
                    println!(
                        "{:<6} {:<24} {:>6} {:>7}",
                        m.id,
                        m.name,
                        inputs,
                        m.ports.len() - inputs
                    );
                }
            }
        }

        Commands::ListRecipes { machine } => {
            let recipes = db::list_recipes(&conn, machine.as_deref())?;
            if recipes.is_empty() {
                println!("No recipes found.");
            } else {
                println!("{:<28} {:<16}", "Recipe", "Machine");
                println!("{}", "-".repeat(44));
                for r in recipes {
                    println!("{:<28} {:<16}", r.name, r.target_machine);
                }
            }
        }

        Commands::Machine { name } => {
            let catalog = db::load_catalog(&conn)?;
            if let Some(m) = catalog.machine_template(&name) {
                println!("Machine: {}", m.name);
                println!("  ID: {}", m.id);
                println!("  Ports:");
                for p in &m.ports {
                    println!("    {} ({})", p.id, p.direction);
                }

                let recipes: Vec<_> = catalog.recipes_for(&m.name).collect();
                if !recipes.is_empty() {
                    println!("  Recipes:");
                    for r in recipes {
                        let describe = |entries: &[RecipeEntry]| {
                            entries
                                .iter()
                                .map(|e| format!("{} @ {}/min", e.resource, e.rate))
                                .collect::<Vec<_>>()
                                .join(", ")
                        };
                        println!(
                            "    {}: [{}] -> [{}]",
                            r.name,
                            describe(&r.inputs),
                            describe(&r.outputs)
                        );
                    }
                }
            } else {
                println!("Machine '{}' not found", name);
            }
        }

        Commands::Plan { file } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let plan = Plan::parse(&source)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let catalog = db::load_catalog(&conn)?;

            let mut graph = NodeGraph::new();
            let report = plan.apply(&catalog, &mut graph)?;
            println!("{}", report);
        }
    }

    Ok(())
}
