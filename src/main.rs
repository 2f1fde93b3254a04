//! DSP Production Calculator
//!
//! Command-line front end for Dyson Sphere Program production planning.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use rusqlite::Connection;

use dsp_calculator::analyzer::{self, AnalysisOptions, Objective, Ranking};
use dsp_calculator::calculator;
use dsp_calculator::catalog::GameData;
use dsp_calculator::db;
use dsp_calculator::extract;
use dsp_calculator::models::{ItemId, RecipeId};
use dsp_calculator::power::{self, PowerAllocation, PowerPolicy};
use dsp_calculator::sample;
use dsp_calculator::settings::{
    BeltTier, ProliferatorMode, ProliferatorTier, SettingsSnapshot, SettingsTemplate, SorterTier,
};

#[derive(Parser)]
#[command(name = "dsp-calculator")]
#[command(about = "Production chain calculator for Dyson Sphere Program")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "dsp_data.db")]
    database: PathBuf,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load the built-in sample catalog
    LoadSample,

    /// Extract game data from a directory of proto XML dumps
    Extract {
        /// Directory holding the dumped *.xml files
        dump_dir: PathBuf,

        /// Clear existing data before extraction
        #[arg(long)]
        clear: bool,
    },

    /// List all recipes in the database
    ListRecipes,

    /// List all machines in the database
    ListMachines,

    /// List all producible items
    ListItems,

    /// Compare every recipe that makes an item
    Alternatives {
        /// Item id or name (e.g. "1123" or "Graphene")
        item: String,

        /// Target output in items per minute
        #[arg(short, long, default_value = "60")]
        rate: f64,

        #[command(flatten)]
        settings: SettingsArgs,

        /// power, facilities, efficiency or balanced
        #[arg(long, default_value = "balanced")]
        objective: Objective,
    },

    /// Calculate the production chain for a recipe
    Calc {
        /// Recipe id or name (e.g. "50" or "Circuit Board")
        recipe: String,

        /// Target output in items per minute
        #[arg(short, long, default_value = "60")]
        rate: f64,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Show the full production tree
        #[arg(long)]
        tree: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Write the settings used to this file
        #[arg(long)]
        save_settings: Option<PathBuf>,
    },

    /// Cover a power requirement with generators
    Power {
        /// Required power in kW
        kw: f64,

        #[command(flatten)]
        power: PowerArgs,
    },

    /// Find bottlenecks in a production chain
    Analyze {
        /// Recipe id or name
        recipe: String,

        /// Target output in items per minute
        #[arg(short, long, default_value = "60")]
        rate: f64,

        #[command(flatten)]
        settings: SettingsArgs,

        /// What a proliferator upgrade must improve
        #[arg(long, default_value = "balanced")]
        objective: Objective,

        /// Apply every suggested fix and recalculate
        #[arg(long)]
        fix: bool,

        /// Write the fixed settings to this file (with --fix)
        #[arg(long)]
        save_settings: Option<PathBuf>,
    },

    /// Rank the settings templates for a target
    Compare {
        /// Recipe id or name
        recipe: String,

        /// Target output in items per minute
        #[arg(short, long, default_value = "60")]
        rate: f64,

        #[command(flatten)]
        settings: SettingsArgs,

        /// power, facilities, efficiency or balanced
        #[arg(long, default_value = "balanced")]
        objective: Objective,
    },
}

#[derive(Args)]
struct PowerArgs {
    /// Generation template (earlyGame, midGame, lateGame, endGame, renewable)
    #[arg(long, conflicts_with = "generator")]
    power_template: Option<String>,

    /// Use this generator instead of a template
    #[arg(long)]
    generator: Option<String>,

    /// Fuel for --generator
    #[arg(long, requires = "generator")]
    fuel: Option<String>,
}

impl PowerArgs {
    fn policy(&self) -> Option<PowerPolicy> {
        if let Some(generator) = &self.generator {
            return Some(PowerPolicy::Manual {
                generator: generator.clone(),
                fuel: self.fuel.clone(),
            });
        }
        self.power_template
            .as_ref()
            .map(|name| PowerPolicy::Template { name: name.clone() })
    }
}

#[derive(Args)]
struct SettingsArgs {
    /// Settings template (earlyGame, midGame, lateGame, endGame, powerSaver)
    #[arg(short, long, default_value = "earlyGame")]
    template: SettingsTemplate,

    /// Load a saved settings snapshot (JSON) instead of a template
    #[arg(long, conflicts_with = "template")]
    settings: Option<PathBuf>,

    /// Proliferator tier (none, mk1, mk2, mk3)
    #[arg(long)]
    proliferator: Option<ProliferatorTier>,

    /// Proliferator mode (speed, production)
    #[arg(long)]
    mode: Option<ProliferatorMode>,

    /// Belt tier (mk1, mk2, mk3)
    #[arg(long)]
    belt: Option<BeltTier>,

    /// Items stacked per belt slot (1-4)
    #[arg(long)]
    stack: Option<u8>,

    /// Sorter tier (mk1, mk2, mk3, pile)
    #[arg(long)]
    sorter: Option<SorterTier>,

    /// Pick a recipe for an item, as ITEM=RECIPE ids (repeatable)
    #[arg(long = "use-recipe", value_parser = parse_choice)]
    recipe_choices: Vec<(ItemId, RecipeId)>,

    #[command(flatten)]
    power: PowerArgs,
}

impl SettingsArgs {
    fn snapshot(&self) -> Result<SettingsSnapshot> {
        let mut snapshot = match &self.settings {
            Some(path) => load_settings(path)?,
            None => SettingsSnapshot::new(self.template.settings()),
        };

        let global = &mut snapshot.global;
        if let Some(tier) = self.proliferator {
            global.proliferator.tier = tier;
        }
        if let Some(mode) = self.mode {
            global.proliferator.mode = mode;
        }
        if let Some(tier) = self.belt {
            global.belt.tier = tier;
        }
        if let Some(stack) = self.stack {
            global.belt.stack = stack;
        }
        if let Some(sorter) = self.sorter {
            global.sorter = sorter;
        }
        global.recipe_choices.extend(self.recipe_choices.iter().copied());
        if let Some(policy) = self.power.policy() {
            global.power = policy;
        }

        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn parse_choice(s: &str) -> Result<(ItemId, RecipeId), String> {
    let (item, recipe) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM=RECIPE, got '{s}'"))?;
    let item = item.trim().parse().map_err(|_| format!("bad item id '{item}'"))?;
    let recipe = recipe
        .trim()
        .parse()
        .map_err(|_| format!("bad recipe id '{recipe}'"))?;
    Ok((item, recipe))
}

fn load_settings(path: &Path) -> Result<SettingsSnapshot> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid settings in {}", path.display()))
}

fn save_settings(path: &Path, snapshot: &SettingsSnapshot) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(snapshot)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved settings to {}", path.display());
    Ok(())
}

fn load_catalog(conn: &Connection) -> Result<GameData> {
    let data = db::load_catalog(conn)?;
    if data.is_empty() {
        bail!("No recipes in database. Run 'extract' or 'load-sample' first.");
    }
    Ok(data)
}

/// Accept an item id or a (case-insensitive) item name.
fn resolve_item(data: &GameData, arg: &str) -> Result<ItemId> {
    if let Ok(id) = arg.parse::<ItemId>() {
        return Ok(id);
    }
    data.items()
        .find(|i| i.name.eq_ignore_ascii_case(arg))
        .map(|i| i.id)
        .ok_or_else(|| anyhow!("No item named '{arg}'. Try 'list-items'."))
}

fn print_ranking(ranking: &Ranking) {
    println!(
        "{:>3} {:<24} {:>12} {:>10} {:>12} {:>10}",
        "#", "Scenario", "Power", "Machines", "Raw/output", "Score"
    );
    println!("{}", "-".repeat(76));
    for (i, r) in ranking.ranked.iter().enumerate() {
        println!(
            "{:>3} {:<24} {:>12} {:>10.2} {:>12.3} {:>10.3}",
            i + 1,
            r.name,
            power::format_power(r.metrics.power_kw),
            r.metrics.machines,
            r.metrics.raw_per_output,
            r.score
        );
    }
    for (name, reason) in &ranking.rejected {
        println!("    {name}: rejected ({reason})");
    }
}

/// Accept a recipe id or a (case-insensitive) recipe name.
fn resolve_recipe(data: &GameData, arg: &str) -> Result<RecipeId> {
    if let Ok(id) = arg.parse::<RecipeId>() {
        return Ok(id);
    }
    data.recipes()
        .find(|r| r.name.eq_ignore_ascii_case(arg))
        .map(|r| r.id)
        .ok_or_else(|| anyhow!("No recipe named '{arg}'. Try 'list-recipes'."))
}

fn print_allocation(allocation: &PowerAllocation) {
    if allocation.allocations.is_empty() {
        println!("No generators needed.");
        return;
    }
    for a in &allocation.allocations {
        match a.fuel {
            Some(fuel) => println!(
                "  {}x {} on {} ({:.2}/min)",
                a.unit_count, a.generator.display_key, fuel.key, a.fuel_per_min
            ),
            None => println!("  {}x {}", a.unit_count, a.generator.display_key),
        }
    }
    println!(
        "  Output: {} for {} required",
        power::format_power(allocation.total_output_kw()),
        power::format_power(allocation.required_kw)
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Initialized {}", cli.database.display());
        }

        Commands::LoadSample => {
            let data = sample::sample_catalog();
            db::store_catalog(&conn, &data)?;
            println!(
                "Loaded {} sample items, {} machines, {} recipes",
                data.items().count(),
                data.machines().count(),
                data.recipes().count()
            );
        }

        Commands::Extract { dump_dir, clear } => {
            if clear {
                info!("Clearing existing data...");
                db::clear_game_data(&conn)?;
            }

            let stats = extract::extract_to_database(&conn, &dump_dir)?;
            println!("{}", stats);
        }

        Commands::ListRecipes => {
            let data = load_catalog(&conn)?;
            println!("{:>6} {:<30} {:<12} {:>6}", "ID", "Recipe", "Category", "Time");
            println!("{}", "-".repeat(57));
            for r in data.recipes() {
                println!(
                    "{:>6} {:<30} {:<12} {:>5}s",
                    r.id, r.name, r.category, r.time_s
                );
            }
        }

        Commands::ListMachines => {
            let data = load_catalog(&conn)?;
            println!(
                "{:<30} {:<12} {:>4} {:>6} {:>10} {:>10}",
                "Machine", "Category", "Rank", "Speed", "Power", "Idle"
            );
            println!("{}", "-".repeat(77));
            for m in data.machines() {
                println!(
                    "{:<30} {:<12} {:>4} {:>6.2} {:>10} {:>10}",
                    m.name,
                    m.category,
                    m.rank,
                    m.speed,
                    power::format_power(m.work_power_kw),
                    power::format_power(m.idle_power_kw)
                );
            }
        }

        Commands::ListItems => {
            let items = db::list_producible_items(&conn)?;
            if items.is_empty() {
                println!("No items in database. Run 'extract' or 'load-sample' first.");
            } else {
                println!("Producible items:");
                for (id, name) in items {
                    println!("  {:>6} {}", id, name);
                }
            }
        }

        Commands::Alternatives {
            item,
            rate,
            settings,
            objective,
        } => {
            let data = load_catalog(&conn)?;
            let item = resolve_item(&data, &item)?;
            let snapshot = settings.snapshot()?;
            let ranking = analyzer::rank_alternatives(&data, item, rate, &snapshot, objective)?;
            println!("Recipes for {} @ {}/min:", data.item_name(item), rate);
            print_ranking(&ranking);
        }

        Commands::Calc {
            recipe,
            rate,
            settings,
            tree,
            json,
            save_settings: save_to,
        } => {
            let data = load_catalog(&conn)?;
            let recipe = resolve_recipe(&data, &recipe)?;
            let snapshot = settings.snapshot()?;
            let result = calculator::calculate(&data, recipe, rate, &snapshot)?;

            if let Some(path) = save_to {
                save_settings(&path, &snapshot)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            if tree {
                println!("Production chain:\n");
                println!("{}", calculator::format_production_chain(&result.root, &data, 0));
            }
            println!("{}", calculator::summarize(&result, &data));

            let allocation = power::allocate(result.required_power(), &snapshot.global.power)?;
            println!("Generators:");
            print_allocation(&allocation);
        }

        Commands::Power { kw, power: args } => {
            let policy = args.policy().unwrap_or_default();
            let allocation = power::allocate(kw, &policy)?;
            println!("Generators for {}:", power::format_power(kw));
            print_allocation(&allocation);
        }

        Commands::Analyze {
            recipe,
            rate,
            settings,
            objective,
            fix,
            save_settings: save_to,
        } => {
            let data = load_catalog(&conn)?;
            let recipe = resolve_recipe(&data, &recipe)?;
            let snapshot = settings.snapshot()?;
            let result = calculator::calculate(&data, recipe, rate, &snapshot)?;
            let options = AnalysisOptions {
                objective,
                ..AnalysisOptions::for_result(&result)
            };

            let bottlenecks = analyzer::analyze(&data, &result, &options)?;
            if bottlenecks.is_empty() {
                println!("No bottlenecks found.");
                return Ok(());
            }
            for b in &bottlenecks {
                println!("[{}] {} (node {})", b.severity, b.description, b.node);
                if let analyzer::Fix::Unresolvable { reason } = &b.fix {
                    println!("       no fix: {reason}");
                }
            }

            if fix {
                let outcome = analyzer::fix_all(&data, &result, &options)?;
                println!("\nAfter applying {} fix(es):\n", outcome.fixed.len());
                println!("{}", calculator::summarize(&outcome.result, &data));
                if let Some(path) = save_to {
                    save_settings(&path, &outcome.settings)?;
                }
            }
        }

        Commands::Compare {
            recipe,
            rate,
            settings,
            objective,
        } => {
            let data = load_catalog(&conn)?;
            let recipe = resolve_recipe(&data, &recipe)?;
            let base = settings.snapshot()?;
            let ranking = analyzer::rank_scenarios(
                &data,
                recipe,
                rate,
                &base,
                &analyzer::template_scenarios(),
                objective,
            )?;

            print_ranking(&ranking);
        }
    }

    Ok(())
}
