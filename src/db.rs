//! Database schema and operations
//!
//! SQLite is only the storage side of the catalog: everything is loaded into
//! a [`GameData`] before any calculation runs.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::Connection;

use crate::catalog::GameData;
use crate::models::{Item, Machine, MachineCategory, Recipe, RecipeId, RecipeStack};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        -- One row per machine rank (Arc Smelter, Plane Smelter, ...)
        CREATE TABLE IF NOT EXISTS machines (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            rank INTEGER NOT NULL,
            speed REAL NOT NULL,
            work_power_kw REAL NOT NULL,
            idle_power_kw REAL NOT NULL,
            dyson_powered INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            time_s REAL NOT NULL,
            allow_production_bonus INTEGER NOT NULL DEFAULT 1
        );

        -- position keeps the in-game stack order; the first output is primary
        CREATE TABLE IF NOT EXISTS recipe_inputs (
            recipe_id INTEGER,
            position INTEGER,
            item_id INTEGER NOT NULL,
            count REAL NOT NULL,
            PRIMARY KEY (recipe_id, position)
        );

        CREATE TABLE IF NOT EXISTS recipe_outputs (
            recipe_id INTEGER,
            position INTEGER,
            item_id INTEGER NOT NULL,
            count REAL NOT NULL,
            PRIMARY KEY (recipe_id, position)
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_outputs_item ON recipe_outputs(item_id);
        CREATE INDEX IF NOT EXISTS idx_machines_category ON machines(category, rank);
        "#,
    )?;
    Ok(())
}

/// Insert or replace an item
pub fn upsert_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO items (id, name) VALUES (?1, ?2)",
        (item.id, &item.name),
    )?;
    Ok(())
}

/// Insert or replace a machine
pub fn upsert_machine(conn: &Connection, machine: &Machine) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO machines
             (id, name, category, rank, speed, work_power_kw, idle_power_kw, dyson_powered)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            machine.id,
            &machine.name,
            machine.category.as_str(),
            machine.rank,
            machine.speed,
            machine.work_power_kw,
            machine.idle_power_kw,
            machine.dyson_powered,
        ),
    )?;
    Ok(())
}

/// Insert or replace a recipe together with its input and output stacks
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO recipes (id, name, category, time_s, allow_production_bonus)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            recipe.id,
            &recipe.name,
            recipe.category.as_str(),
            recipe.time_s,
            recipe.allow_production_bonus,
        ),
    )?;

    conn.execute("DELETE FROM recipe_inputs WHERE recipe_id = ?1", [recipe.id])?;
    conn.execute("DELETE FROM recipe_outputs WHERE recipe_id = ?1", [recipe.id])?;

    for (position, stack) in recipe.inputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_inputs (recipe_id, position, item_id, count) VALUES (?1, ?2, ?3, ?4)",
            (recipe.id, position as i64, stack.item_id, stack.count),
        )?;
    }
    for (position, stack) in recipe.outputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_outputs (recipe_id, position, item_id, count) VALUES (?1, ?2, ?3, ?4)",
            (recipe.id, position as i64, stack.item_id, stack.count),
        )?;
    }
    Ok(())
}

/// Clear all game data (for re-extraction)
pub fn clear_game_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_outputs;
        DELETE FROM recipe_inputs;
        DELETE FROM recipes;
        DELETE FROM machines;
        DELETE FROM items;
        "#,
    )?;
    Ok(())
}

/// Write a whole catalog in one transaction
pub fn store_catalog(conn: &Connection, data: &GameData) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for item in data.items() {
        upsert_item(&tx, item)?;
    }
    for machine in data.machines() {
        upsert_machine(&tx, machine)?;
    }
    for recipe in data.recipes() {
        upsert_recipe(&tx, recipe)?;
    }
    tx.commit()?;
    Ok(())
}

/// Load everything into an in-memory catalog
pub fn load_catalog(conn: &Connection) -> Result<GameData> {
    let items = load_items(conn)?;
    let machines = load_machines(conn)?;
    let recipes = load_recipes(conn)?;
    debug!(
        "loaded {} items, {} machines, {} recipes",
        items.len(),
        machines.len(),
        recipes.len()
    );
    Ok(GameData::new(items, machines, recipes))
}

fn load_items(conn: &Connection) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare("SELECT id, name FROM items ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Item {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

fn load_machines(conn: &Connection) -> Result<Vec<Machine>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, rank, speed, work_power_kw, idle_power_kw, dyson_powered
         FROM machines ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u8>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, bool>(7)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, name, category, rank, speed, work_power_kw, idle_power_kw, dyson_powered) = row?;
        results.push(Machine {
            id,
            name,
            category: parse_category(&category)?,
            rank,
            speed,
            work_power_kw,
            idle_power_kw,
            dyson_powered,
        });
    }
    Ok(results)
}

fn load_recipes(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut inputs = load_stacks(conn, "recipe_inputs")?;
    let mut outputs = load_stacks(conn, "recipe_outputs")?;

    let mut stmt = conn.prepare(
        "SELECT id, name, category, time_s, allow_production_bonus FROM recipes ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, bool>(4)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, name, category, time_s, allow_production_bonus) = row?;
        results.push(Recipe {
            id,
            name,
            category: parse_category(&category)?,
            time_s,
            inputs: inputs.remove(&id).unwrap_or_default(),
            outputs: outputs.remove(&id).unwrap_or_default(),
            allow_production_bonus,
        });
    }
    Ok(results)
}

fn load_stacks(conn: &Connection, table: &str) -> Result<BTreeMap<RecipeId, Vec<RecipeStack>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT recipe_id, item_id, count FROM {table} ORDER BY recipe_id, position"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            RecipeStack {
                item_id: row.get(1)?,
                count: row.get(2)?,
            },
        ))
    })?;

    let mut by_recipe: BTreeMap<RecipeId, Vec<RecipeStack>> = BTreeMap::new();
    for row in rows {
        let (recipe_id, stack) = row?;
        by_recipe.entry(recipe_id).or_default().push(stack);
    }
    Ok(by_recipe)
}

fn parse_category(s: &str) -> Result<MachineCategory> {
    s.parse::<MachineCategory>()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("bad category in database: {s}"))
}

/// Every item that at least one recipe outputs, with its name
pub fn list_producible_items(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT o.item_id, COALESCE(i.name, 'Item #' || o.item_id)
         FROM recipe_outputs o
         LEFT JOIN items i ON i.id = o.item_id
         ORDER BY o.item_id",
    )?;

    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ids, recipes, sample_catalog};

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn catalog_survives_a_round_trip() {
        let conn = memory_db();
        let data = sample_catalog();
        store_catalog(&conn, &data).unwrap();

        let loaded = load_catalog(&conn).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn stack_order_is_preserved() {
        let conn = memory_db();
        store_catalog(&conn, &sample_catalog()).unwrap();
        let loaded = load_catalog(&conn).unwrap();

        let refining = loaded.recipe(recipes::PLASMA_REFINING).unwrap();
        assert_eq!(refining.primary_output(), Some(ids::REFINED_OIL));
        assert_eq!(refining.outputs[1].item_id, ids::HYDROGEN);
        assert!(!refining.allow_production_bonus);
    }

    #[test]
    fn upsert_replaces_stacks() {
        let conn = memory_db();
        let data = sample_catalog();
        store_catalog(&conn, &data).unwrap();

        let mut gear = data.recipe(recipes::GEAR).unwrap().clone();
        gear.inputs[0].count = 2.0;
        upsert_recipe(&conn, &gear).unwrap();

        let loaded = load_catalog(&conn).unwrap();
        let gear = loaded.recipe(recipes::GEAR).unwrap();
        assert_eq!(gear.inputs.len(), 1);
        assert_eq!(gear.inputs[0].count, 2.0);
    }

    #[test]
    fn clear_empties_everything() {
        let conn = memory_db();
        store_catalog(&conn, &sample_catalog()).unwrap();
        clear_game_data(&conn).unwrap();
        assert!(load_catalog(&conn).unwrap().is_empty());
        assert!(list_producible_items(&conn).unwrap().is_empty());
    }

    #[test]
    fn producible_items_have_names() {
        let conn = memory_db();
        store_catalog(&conn, &sample_catalog()).unwrap();
        let items = list_producible_items(&conn).unwrap();
        assert!(items.contains(&(ids::GEAR, "Gear".to_string())));
        // ores are never outputs
        assert!(!items.iter().any(|(id, _)| *id == ids::IRON_ORE));
    }

    #[test]
    fn bad_category_is_an_error() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO machines VALUES (1, 'Mystery', 'teleporter', 1, 1.0, 1.0, 0.0, 0)",
            [],
        )
        .unwrap();
        assert!(load_catalog(&conn).is_err());
    }
}
