//! Catalog database schema and operations

use anyhow::{Context, Result};
use log::debug;
use rusqlite::Connection;

use crate::catalog::Catalog;
use crate::error::ConfigError;
use crate::graph::port::{PortDirection, PortId};
use crate::models::{MachineConfiguration, MachineTemplate, PortTemplate, RecipeEntry, Resource};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            name TEXT PRIMARY KEY
        );

        -- Machine types and their fixed port layout
        CREATE TABLE IF NOT EXISTS machines (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS machine_ports (
            machine_id INTEGER NOT NULL,
            port_id INTEGER NOT NULL,
            direction TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (machine_id, port_id)
        );

        -- Recipes; entries keep their order, which drives port assignment
        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            target_machine TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recipe_entries (
            recipe_name TEXT NOT NULL,
            direction TEXT NOT NULL,
            position INTEGER NOT NULL,
            resource TEXT NOT NULL,
            rate REAL NOT NULL,
            port_id INTEGER,
            PRIMARY KEY (recipe_name, direction, position)
        );

        CREATE INDEX IF NOT EXISTS idx_recipes_target ON recipes(target_machine);
        "#,
    )?;
    Ok(())
}

/// Insert a resource, ignoring names already present
pub fn insert_resource(conn: &Connection, resource: &Resource) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO resources (name) VALUES (?1)",
        [&resource.name],
    )?;
    Ok(())
}

/// Insert or replace a machine template and its ports
pub fn upsert_machine(conn: &Connection, machine: &MachineTemplate) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO machines (id, name) VALUES (?1, ?2)",
        (machine.id, &machine.name),
    )?;
    conn.execute(
        "DELETE FROM machine_ports WHERE machine_id = ?1",
        [machine.id],
    )?;
    for (position, port) in machine.ports.iter().enumerate() {
        conn.execute(
            "INSERT INTO machine_ports (machine_id, port_id, direction, position)
             VALUES (?1, ?2, ?3, ?4)",
            (machine.id, port.id, port.direction.to_string(), position as i64),
        )?;
    }
    Ok(())
}

/// Insert or replace a recipe and its entries
pub fn upsert_recipe(conn: &Connection, recipe: &MachineConfiguration) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO recipes (name, target_machine) VALUES (?1, ?2)",
        (&recipe.name, &recipe.target_machine),
    )?;
    conn.execute(
        "DELETE FROM recipe_entries WHERE recipe_name = ?1",
        [&recipe.name],
    )?;
    for direction in [PortDirection::Input, PortDirection::Output] {
        for (position, entry) in recipe.entries(direction).iter().enumerate() {
            conn.execute(
                "INSERT INTO recipe_entries (recipe_name, direction, position, resource, rate, port_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    &recipe.name,
                    direction.to_string(),
                    position as i64,
                    &entry.resource.name,
                    entry.rate,
                    entry.port,
                ),
            )?;
        }
    }
    Ok(())
}

/// Clear all catalog data (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_entries;
        DELETE FROM recipes;
        DELETE FROM machine_ports;
        DELETE FROM machines;
        DELETE FROM resources;
        "#,
    )?;
    Ok(())
}

/// List all resource names
pub fn list_resources(conn: &Connection) -> Result<Vec<Resource>> {
    let mut stmt = conn.prepare("SELECT name FROM resources ORDER BY name")?;
    let rows = stmt.query_map([], |row| Ok(Resource::new(row.get::<_, String>(0)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all machine templates with their ports in declaration order
pub fn list_machines(conn: &Connection) -> Result<Vec<MachineTemplate>> {
    let mut stmt = conn.prepare("SELECT id, name FROM machines ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

    let mut machines = Vec::new();
    for row in rows {
        let (id, name) = row?;
        machines.push(MachineTemplate {
            id,
            name,
            ports: get_machine_ports(conn, id)?,
        });
    }
    Ok(machines)
}

fn get_machine_ports(conn: &Connection, machine_id: i64) -> Result<Vec<PortTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT port_id, direction FROM machine_ports
         WHERE machine_id = ?1
         ORDER BY position",
    )?;
    let rows = stmt.query_map([machine_id], |row| {
        Ok((row.get::<_, PortId>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut ports = Vec::new();
    for row in rows {
        let (id, direction) = row?;
        ports.push(PortTemplate {
            id,
            direction: direction.parse()?,
        });
    }
    Ok(ports)
}

/// List all recipes, optionally only those for one machine
pub fn list_recipes(conn: &Connection, machine: Option<&str>) -> Result<Vec<MachineConfiguration>> {
    let mut stmt = conn.prepare(
        "SELECT name, target_machine FROM recipes
         WHERE ?1 IS NULL OR target_machine = ?1
         ORDER BY name",
    )?;
    let rows = stmt.query_map([machine], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut recipes = Vec::new();
    for row in rows {
        let (name, target_machine) = row?;
        let inputs = get_recipe_entries(conn, &name, PortDirection::Input)?;
        let outputs = get_recipe_entries(conn, &name, PortDirection::Output)?;
        recipes.push(MachineConfiguration {
            name,
            target_machine,
            inputs,
            outputs,
        });
    }
    Ok(recipes)
}

fn get_recipe_entries(
    conn: &Connection,
    recipe: &str,
    direction: PortDirection,
) -> Result<Vec<RecipeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT resource, rate, port_id FROM recipe_entries
         WHERE recipe_name = ?1 AND direction = ?2
         ORDER BY position",
    )?;
    let rows = stmt.query_map((recipe, direction.to_string()), |row| {
        Ok(RecipeEntry {
            resource: Resource::new(row.get::<_, String>(0)?),
            rate: row.get(1)?,
            port: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Load the whole catalog, checking that recipes only use known resources
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let resources = list_resources(conn)?;
    let machines = list_machines(conn)?;
    let recipes = list_recipes(conn, None)?;

    for recipe in &recipes {
        for entry in recipe.inputs.iter().chain(&recipe.outputs) {
            if !resources.contains(&entry.resource) {
                return Err(ConfigError::UnknownResource(entry.resource.name.clone()))
                    .with_context(|| format!("recipe {} is invalid", recipe.name));
            }
        }
    }

    debug!(
        "loaded catalog: {} resources, {} machines, {} recipes",
        resources.len(),
        machines.len(),
        recipes.len()
    );
    Ok(Catalog::new(resources, machines, recipes))
}

/// Load a small built-in catalog for trying the planner without data files
pub fn load_sample_data(conn: &Connection) -> Result<usize> {
    clear_catalog(conn)?;

    for name in [
        "Iron Ore",
        "Iron Ingot",
        "Iron Plate",
        "Iron Rod",
        "Screw",
        "Reinforced Iron Plate",
        "Copper Ore",
        "Copper Ingot",
        "Wire",
    ] {
        insert_resource(conn, &Resource::new(name))?;
    }

    let machines = [
        (1, "Miner", &["output"][..]),
        (2, "Smelter", &["input", "output"][..]),
        (3, "Constructor", &["input", "output"][..]),
        (4, "Assembler", &["input", "input", "output"][..]),
    ];
    for (id, name, directions) in machines {
        let mut ports = Vec::new();
        for (port, direction) in directions.iter().enumerate() {
            ports.push(PortTemplate {
                id: port as PortId,
                direction: direction.parse()?,
            });
        }
        upsert_machine(
            conn,
            &MachineTemplate {
                id,
                name: name.to_string(),
                ports,
            },
        )?;
    }

    let recipes: [(&str, &str, &[(&str, f64)], &[(&str, f64)]); 9] = [
        ("Iron Ore", "Miner", &[], &[("Iron Ore", 60.0)]),
        ("Copper Ore", "Miner", &[], &[("Copper Ore", 60.0)]),
        ("Iron Ingot", "Smelter", &[("Iron Ore", 30.0)], &[("Iron Ingot", 30.0)]),
        ("Copper Ingot", "Smelter", &[("Copper Ore", 30.0)], &[("Copper Ingot", 30.0)]),
        ("Iron Plate", "Constructor", &[("Iron Ingot", 30.0)], &[("Iron Plate", 20.0)]),
        ("Iron Rod", "Constructor", &[("Iron Ingot", 15.0)], &[("Iron Rod", 15.0)]),
        ("Screw", "Constructor", &[("Iron Rod", 10.0)], &[("Screw", 40.0)]),
        ("Wire", "Constructor", &[("Copper Ingot", 15.0)], &[("Wire", 30.0)]),
        (
            "Reinforced Iron Plate",
            "Assembler",
            &[("Iron Plate", 30.0), ("Screw", 60.0)],
            &[("Reinforced Iron Plate", 5.0)],
        ),
    ];
    for (name, target, inputs, outputs) in recipes {
        upsert_recipe(
            conn,
            &MachineConfiguration {
                name: name.to_string(),
                target_machine: target.to_string(),
                inputs: entries(inputs),
                outputs: entries(outputs),
            },
        )?;
    }

    Ok(recipes.len())
}

fn entries(list: &[(&str, f64)]) -> Vec<RecipeEntry> {
    list.iter()
        .map(|(resource, rate)| RecipeEntry::new(Resource::new(*resource), *rate))
        .collect()
}
