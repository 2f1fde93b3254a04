//! Built-in sample game data
//!
//! A slice of the real item/recipe tables: iron and copper chains, circuit
//! boards, electromagnetic matrices, graphene with an alternative recipe,
//! oil refining with hydrogen byproduct, and the critical photon →
//! antimatter → fuel rod chain that draws Dyson sphere power.

use crate::catalog::GameData;
use crate::models::{Item, Machine, MachineCategory, Recipe, RecipeStack};

pub mod ids {
    use crate::models::ItemId;

    pub const IRON_ORE: ItemId = 1001;
    pub const COPPER_ORE: ItemId = 1002;
    pub const TITANIUM_ORE: ItemId = 1004;
    pub const COAL: ItemId = 1006;
    pub const CRUDE_OIL: ItemId = 1007;
    pub const FIRE_ICE: ItemId = 1011;
    pub const IRON_INGOT: ItemId = 1101;
    pub const MAGNET: ItemId = 1102;
    pub const COPPER_INGOT: ItemId = 1104;
    pub const TITANIUM_INGOT: ItemId = 1106;
    pub const ENERGETIC_GRAPHITE: ItemId = 1109;
    pub const REFINED_OIL: ItemId = 1114;
    pub const HYDROGEN: ItemId = 1120;
    pub const ANTIMATTER: ItemId = 1122;
    pub const GRAPHENE: ItemId = 1123;
    pub const GEAR: ItemId = 1201;
    pub const MAGNETIC_COIL: ItemId = 1202;
    pub const CRITICAL_PHOTON: ItemId = 1208;
    pub const CIRCUIT_BOARD: ItemId = 1301;
    pub const ANTIMATTER_FUEL_ROD: ItemId = 1803;
    pub const ELECTROMAGNETIC_MATRIX: ItemId = 6001;
}

pub mod recipes {
    use crate::models::RecipeId;

    pub const IRON_INGOT: RecipeId = 1;
    pub const MAGNET: RecipeId = 2;
    pub const COPPER_INGOT: RecipeId = 3;
    pub const GEAR: RecipeId = 5;
    pub const MAGNETIC_COIL: RecipeId = 6;
    pub const ELECTROMAGNETIC_MATRIX: RecipeId = 9;
    pub const TITANIUM_INGOT: RecipeId = 12;
    pub const PLASMA_REFINING: RecipeId = 16;
    pub const ENERGETIC_GRAPHITE: RecipeId = 17;
    pub const GRAPHENE: RecipeId = 31;
    pub const GRAPHENE_FROM_ICE: RecipeId = 32;
    pub const ANTIMATTER_FUEL_ROD: RecipeId = 44;
    pub const CIRCUIT_BOARD: RecipeId = 50;
    pub const X_RAY_CRACKING: RecipeId = 58;
    pub const ANTIMATTER: RecipeId = 74;
    pub const CRITICAL_PHOTON: RecipeId = 208;
}

fn item(id: i64, name: &str) -> Item {
    Item {
        id,
        name: name.to_string(),
    }
}

fn machine(
    id: i64,
    name: &str,
    category: MachineCategory,
    rank: u8,
    speed: f64,
    work_power_kw: f64,
    idle_power_kw: f64,
) -> Machine {
    Machine {
        id,
        name: name.to_string(),
        category,
        rank,
        speed,
        work_power_kw,
        idle_power_kw,
        dyson_powered: false,
    }
}

fn stacks(list: &[(i64, f64)]) -> Vec<RecipeStack> {
    list.iter()
        .map(|&(item_id, count)| RecipeStack { item_id, count })
        .collect()
}

fn recipe(
    id: i64,
    name: &str,
    category: MachineCategory,
    time_s: f64,
    inputs: &[(i64, f64)],
    outputs: &[(i64, f64)],
    allow_production_bonus: bool,
) -> Recipe {
    Recipe {
        id,
        name: name.to_string(),
        category,
        time_s,
        inputs: stacks(inputs),
        outputs: stacks(outputs),
        allow_production_bonus,
    }
}

pub fn sample_items() -> Vec<Item> {
    use ids::*;

    vec![
        item(IRON_ORE, "Iron Ore"),
        item(COPPER_ORE, "Copper Ore"),
        item(TITANIUM_ORE, "Titanium Ore"),
        item(COAL, "Coal"),
        item(CRUDE_OIL, "Crude Oil"),
        item(FIRE_ICE, "Fire Ice"),
        item(IRON_INGOT, "Iron Ingot"),
        item(MAGNET, "Magnet"),
        item(COPPER_INGOT, "Copper Ingot"),
        item(TITANIUM_INGOT, "Titanium Ingot"),
        item(ENERGETIC_GRAPHITE, "Energetic Graphite"),
        item(REFINED_OIL, "Refined Oil"),
        item(HYDROGEN, "Hydrogen"),
        item(ANTIMATTER, "Antimatter"),
        item(GRAPHENE, "Graphene"),
        item(GEAR, "Gear"),
        item(MAGNETIC_COIL, "Magnetic Coil"),
        item(CRITICAL_PHOTON, "Critical Photon"),
        item(CIRCUIT_BOARD, "Circuit Board"),
        item(ANTIMATTER_FUEL_ROD, "Antimatter Fuel Rod"),
        item(ELECTROMAGNETIC_MATRIX, "Electromagnetic Matrix"),
    ]
}

pub fn sample_machines() -> Vec<Machine> {
    use MachineCategory::*;

    let mut ray_receiver = machine(2208, "Ray Receiver", RayReceiver, 1, 1.0, 15000.0, 0.0);
    ray_receiver.dyson_powered = true;

    vec![
        machine(2302, "Arc Smelter", Smelter, 1, 1.0, 360.0, 12.0),
        machine(2315, "Plane Smelter", Smelter, 2, 2.0, 1440.0, 48.0),
        machine(2319, "Negentropy Smelter", Smelter, 3, 3.0, 2880.0, 96.0),
        machine(2303, "Assembling Machine Mk.I", Assembler, 1, 0.75, 270.0, 12.0),
        machine(2304, "Assembling Machine Mk.II", Assembler, 2, 1.0, 480.0, 15.0),
        machine(2305, "Assembling Machine Mk.III", Assembler, 3, 1.5, 780.0, 18.0),
        machine(2318, "Re-composing Assembler", Assembler, 4, 3.0, 1440.0, 48.0),
        machine(2309, "Chemical Plant", Chemical, 1, 1.0, 720.0, 24.0),
        machine(2317, "Quantum Chemical Plant", Chemical, 2, 2.0, 1440.0, 48.0),
        machine(2308, "Oil Refinery", Refinery, 1, 1.0, 960.0, 24.0),
        machine(2901, "Matrix Lab", Research, 1, 1.0, 480.0, 12.0),
        machine(2902, "Self-evolution Lab", Research, 2, 3.0, 1920.0, 48.0),
        machine(2310, "Miniature Particle Collider", Collider, 1, 1.0, 12000.0, 120.0),
        ray_receiver,
    ]
}

pub fn sample_recipes() -> Vec<Recipe> {
    use MachineCategory::*;
    use ids::*;

    vec![
        recipe(recipes::IRON_INGOT, "Iron Ingot", Smelter, 1.0, &[(IRON_ORE, 1.0)], &[(IRON_INGOT, 1.0)], true),
        recipe(recipes::MAGNET, "Magnet", Smelter, 1.5, &[(IRON_ORE, 1.0)], &[(MAGNET, 1.0)], true),
        recipe(recipes::COPPER_INGOT, "Copper Ingot", Smelter, 1.0, &[(COPPER_ORE, 1.0)], &[(COPPER_INGOT, 1.0)], true),
        recipe(recipes::GEAR, "Gear", Assembler, 1.0, &[(IRON_INGOT, 1.0)], &[(GEAR, 1.0)], true),
        recipe(
            recipes::MAGNETIC_COIL,
            "Magnetic Coil",
            Assembler,
            1.0,
            &[(MAGNET, 2.0), (COPPER_INGOT, 1.0)],
            &[(MAGNETIC_COIL, 2.0)],
            true,
        ),
        recipe(
            recipes::ELECTROMAGNETIC_MATRIX,
            "Electromagnetic Matrix",
            Research,
            3.0,
            &[(MAGNETIC_COIL, 1.0), (CIRCUIT_BOARD, 1.0)],
            &[(ELECTROMAGNETIC_MATRIX, 1.0)],
            true,
        ),
        recipe(
            recipes::TITANIUM_INGOT,
            "Titanium Ingot",
            Smelter,
            2.0,
            &[(TITANIUM_ORE, 2.0)],
            &[(TITANIUM_INGOT, 1.0)],
            true,
        ),
        recipe(
            recipes::PLASMA_REFINING,
            "Plasma Refining",
            Refinery,
            4.0,
            &[(CRUDE_OIL, 2.0)],
            &[(REFINED_OIL, 2.0), (HYDROGEN, 1.0)],
            false,
        ),
        recipe(
            recipes::ENERGETIC_GRAPHITE,
            "Energetic Graphite",
            Smelter,
            2.0,
            &[(COAL, 2.0)],
            &[(ENERGETIC_GRAPHITE, 1.0)],
            true,
        ),
        recipe(
            recipes::GRAPHENE,
            "Graphene",
            Chemical,
            3.0,
            &[(ENERGETIC_GRAPHITE, 3.0)],
            &[(GRAPHENE, 2.0)],
            true,
        ),
        recipe(
            recipes::GRAPHENE_FROM_ICE,
            "Graphene (Fire Ice)",
            Chemical,
            2.0,
            &[(FIRE_ICE, 2.0)],
            &[(GRAPHENE, 2.0), (HYDROGEN, 1.0)],
            false,
        ),
        recipe(
            recipes::ANTIMATTER_FUEL_ROD,
            "Antimatter Fuel Rod",
            Assembler,
            12.0,
            &[(ANTIMATTER, 10.0), (HYDROGEN, 10.0), (TITANIUM_INGOT, 1.0)],
            &[(ANTIMATTER_FUEL_ROD, 2.0)],
            true,
        ),
        recipe(
            recipes::CIRCUIT_BOARD,
            "Circuit Board",
            Assembler,
            1.0,
            &[(IRON_INGOT, 2.0), (COPPER_INGOT, 1.0)],
            &[(CIRCUIT_BOARD, 2.0)],
            true,
        ),
        recipe(
            recipes::X_RAY_CRACKING,
            "X-Ray Cracking",
            Refinery,
            4.0,
            &[(REFINED_OIL, 1.0), (HYDROGEN, 2.0)],
            &[(HYDROGEN, 3.0), (ENERGETIC_GRAPHITE, 1.0)],
            false,
        ),
        recipe(
            recipes::ANTIMATTER,
            "Antimatter",
            Collider,
            2.0,
            &[(CRITICAL_PHOTON, 2.0)],
            &[(ANTIMATTER, 2.0), (HYDROGEN, 2.0)],
            false,
        ),
        recipe(
            recipes::CRITICAL_PHOTON,
            "Critical Photon",
            RayReceiver,
            6.0,
            &[],
            &[(CRITICAL_PHOTON, 1.0)],
            false,
        ),
    ]
}

pub fn sample_catalog() -> GameData {
    GameData::new(sample_items(), sample_machines(), sample_recipes())
}
