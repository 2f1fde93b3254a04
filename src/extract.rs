//! Game data extraction from exported proto XML
//!
//! The game's proto sets (`ItemProtoSet`, `RecipeProtoSet`, ...) can be dumped
//! to XML by the usual modding tools. Each proto is a single element whose
//! attributes carry the fields we need:
//!
//! ```xml
//! <ItemProto ID="1101" Name="Iron Ingot" />
//! <MachineProto ID="2302" Name="Arc Smelter" Category="smelter" Rank="1"
//!               Speed="1" WorkEnergyKW="360" IdleEnergyKW="12" />
//! <RecipeProto ID="1" Name="Iron Ingot" Category="smelter" TimeSpend="60"
//!              Items="1001" ItemCounts="1" Results="1101" ResultCounts="1" />
//! ```
//!
//! `TimeSpend` is in game ticks (60 per second).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use regex::Regex;
use rusqlite::Connection;
use walkdir::WalkDir;

use crate::db;
use crate::models::{Item, Machine, MachineCategory, Recipe, RecipeStack};

const TICKS_PER_SECOND: f64 = 60.0;

/// Find all *.xml files under the dump directory
pub fn find_xml_files(dump_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dump_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "xml"))
        .collect();

    files.sort();
    files
}

/// Whether a file's content holds any proto definitions
fn has_protos(content: &str) -> bool {
    content.contains("Proto ")
}

/// Compiled patterns, built once per extraction run.
struct ProtoPatterns {
    element: Regex,
    attribute: Regex,
}

impl ProtoPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            element: Regex::new(r"<(ItemProto|MachineProto|RecipeProto)\b([^>]*?)/?>")?,
            attribute: Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#)?,
        })
    }
}

/// Protos parsed out of one file
#[derive(Debug, Default)]
struct ParsedFile {
    items: Vec<Item>,
    machines: Vec<Machine>,
    recipes: Vec<Recipe>,
    skipped: usize,
}

/// Attribute lookup over one element
struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| anyhow!("missing attribute {name}"))
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.required(name)?;
        raw.trim()
            .parse()
            .map_err(|_| anyhow!("{name}=\"{raw}\" is not a number"))
    }

    fn number_or<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.get(name) {
            Some(_) => self.number(name),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

/// Zip `Items="1001,1002"` with `ItemCounts="2,1"`
fn stacks(attrs: &Attrs, ids: &str, counts: &str) -> Result<Vec<RecipeStack>> {
    let ids = split_list(attrs.get(ids).unwrap_or(""));
    let counts = split_list(attrs.get(counts).unwrap_or(""));
    if ids.len() != counts.len() {
        return Err(anyhow!(
            "{} ids but {} counts",
            ids.len(),
            counts.len()
        ));
    }

    ids.iter()
        .zip(&counts)
        .map(|(id, count)| {
            Ok(RecipeStack {
                item_id: id.parse().with_context(|| format!("bad item id {id}"))?,
                count: count.parse().with_context(|| format!("bad count {count}"))?,
            })
        })
        .collect()
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_category(attrs: &Attrs) -> Result<MachineCategory> {
    attrs
        .required("Category")?
        .parse::<MachineCategory>()
        .map_err(|e| anyhow!(e))
}

fn parse_item(attrs: &Attrs) -> Result<Item> {
    Ok(Item {
        id: attrs.number("ID")?,
        name: attrs.required("Name")?.to_string(),
    })
}

fn parse_machine(attrs: &Attrs) -> Result<Machine> {
    Ok(Machine {
        id: attrs.number("ID")?,
        name: attrs.required("Name")?.to_string(),
        category: parse_category(attrs)?,
        rank: attrs.number_or("Rank", 1)?,
        speed: attrs.number_or("Speed", 1.0)?,
        work_power_kw: attrs.number("WorkEnergyKW")?,
        idle_power_kw: attrs.number_or("IdleEnergyKW", 0.0)?,
        dyson_powered: attrs.flag("DysonPowered"),
    })
}

fn parse_recipe(attrs: &Attrs) -> Result<Recipe> {
    let ticks: f64 = attrs.number("TimeSpend")?;
    if ticks <= 0.0 {
        return Err(anyhow!("TimeSpend must be positive"));
    }
    let outputs = stacks(attrs, "Results", "ResultCounts")?;
    if outputs.is_empty() {
        return Err(anyhow!("recipe has no results"));
    }

    Ok(Recipe {
        id: attrs.number("ID")?,
        name: attrs.required("Name")?.to_string(),
        category: parse_category(attrs)?,
        time_s: ticks / TICKS_PER_SECOND,
        inputs: stacks(attrs, "Items", "ItemCounts")?,
        outputs,
        allow_production_bonus: !attrs.flag("NonProductive"),
    })
}

fn parse_protos(content: &str, patterns: &ProtoPatterns) -> ParsedFile {
    let mut parsed = ParsedFile::default();

    for cap in patterns.element.captures_iter(content) {
        let attrs = Attrs(
            patterns
                .attribute
                .captures_iter(&cap[2])
                .map(|a| (a[1].to_string(), a[2].to_string()))
                .collect(),
        );

        let outcome = match &cap[1] {
            "ItemProto" => parse_item(&attrs).map(|i| parsed.items.push(i)),
            "MachineProto" => parse_machine(&attrs).map(|m| parsed.machines.push(m)),
            _ => parse_recipe(&attrs).map(|r| parsed.recipes.push(r)),
        };

        if let Err(e) = outcome {
            warn!(
                "skipping {} {}: {e}",
                &cap[1],
                attrs.get("ID").unwrap_or("?")
            );
            parsed.skipped += 1;
        }
    }

    parsed
}

/// Extract all protos from a dump directory and populate the database
pub fn extract_to_database(conn: &Connection, dump_dir: &Path) -> Result<ExtractStats> {
    let mut stats = ExtractStats::default();
    let patterns = ProtoPatterns::new()?;

    info!("Scanning {} for proto dumps...", dump_dir.display());
    let files = find_xml_files(dump_dir);
    info!("Found {} xml files", files.len());

    let tx = conn.unchecked_transaction()?;
    for path in &files {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Error reading {}: {e}", path.display());
                stats.errors += 1;
                continue;
            }
        };
        if !has_protos(&content) {
            debug!("  No protos in {}", path.display());
            continue;
        }

        let parsed = parse_protos(&content, &patterns);
        for item in &parsed.items {
            db::upsert_item(&tx, item)?;
        }
        for machine in &parsed.machines {
            db::upsert_machine(&tx, machine)?;
        }
        for recipe in &parsed.recipes {
            db::upsert_recipe(&tx, recipe)?;
        }

        debug!(
            "  Parsed {}: {} items, {} machines, {} recipes",
            path.display(),
            parsed.items.len(),
            parsed.machines.len(),
            parsed.recipes.len()
        );
        stats.files += 1;
        stats.items += parsed.items.len();
        stats.machines += parsed.machines.len();
        stats.recipes += parsed.recipes.len();
        stats.skipped += parsed.skipped;
    }
    tx.commit()?;

    Ok(stats)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub items: usize,
    pub machines: usize,
    pub recipes: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Extracted {} items, {} machines, {} recipes from {} files. Skipped: {}, Errors: {}",
            self.items, self.machines, self.recipes, self.files, self.skipped, self.errors
        )
    }
}
