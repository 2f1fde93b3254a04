//! Data models for DSP game data and calculation results

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::settings::{ProliferatorMode, ProliferatorTier, SettingsSnapshot};

pub type ItemId = i64;
pub type MachineId = i64;
pub type RecipeId = i64;

/// Production building family. A recipe names a category; the settings
/// pick which rank of that category actually runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineCategory {
    Smelter,
    Assembler,
    Chemical,
    Refinery,
    Research,
    Collider,
    RayReceiver,
}

impl MachineCategory {
    pub const ALL: [MachineCategory; 7] = [
        MachineCategory::Smelter,
        MachineCategory::Assembler,
        MachineCategory::Chemical,
        MachineCategory::Refinery,
        MachineCategory::Research,
        MachineCategory::Collider,
        MachineCategory::RayReceiver,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MachineCategory::Smelter => "smelter",
            MachineCategory::Assembler => "assembler",
            MachineCategory::Chemical => "chemical",
            MachineCategory::Refinery => "refinery",
            MachineCategory::Research => "research",
            MachineCategory::Collider => "collider",
            MachineCategory::RayReceiver => "rayReceiver",
        }
    }
}

impl fmt::Display for MachineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown machine category '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub category: MachineCategory,
    /// 1 = first tier of the category.
    pub rank: u8,
    /// Production speed multiplier relative to the recipe's base time.
    pub speed: f64,
    pub work_power_kw: f64,
    /// Shown in listings only. Power totals assume every machine is working.
    pub idle_power_kw: f64,
    /// Draws its working power from the Dyson sphere instead of the grid.
    pub dyson_powered: bool,
}

/// Item count per recipe cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStack {
    pub item_id: ItemId,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub category: MachineCategory,
    /// Seconds per cycle at speed 1.0.
    pub time_s: f64,
    pub inputs: Vec<RecipeStack>,
    pub outputs: Vec<RecipeStack>,
    pub allow_production_bonus: bool,
}

impl Recipe {
    /// Output count per cycle for `item`, or `None` if the recipe doesn't make it.
    pub fn output_count(&self, item: ItemId) -> Option<f64> {
        self.outputs
            .iter()
            .find(|o| o.item_id == item)
            .map(|o| o.count)
    }

    pub fn primary_output(&self) -> Option<ItemId> {
        self.outputs.first().map(|o| o.item_id)
    }
}

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

/// Stable identity of a node: the recipe ids on the path from the root.
///
/// Raw-material leaves have no recipe of their own, so their key is the
/// parent's path with the item id appended after a `#`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeKey {
    pub recipes: Vec<RecipeId>,
    pub raw_item: Option<ItemId>,
}

impl NodeKey {
    pub fn root(recipe: RecipeId) -> Self {
        Self {
            recipes: vec![recipe],
            raw_item: None,
        }
    }

    pub fn child(&self, recipe: RecipeId) -> Self {
        let mut recipes = self.recipes.clone();
        recipes.push(recipe);
        Self {
            recipes,
            raw_item: None,
        }
    }

    pub fn raw(&self, item: ItemId) -> Self {
        Self {
            recipes: self.recipes.clone(),
            raw_item: Some(item),
        }
    }

    pub fn depth(&self) -> usize {
        self.recipes.len()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.recipes.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", path.join(">"))?;
        if let Some(item) = self.raw_item {
            write!(f, "#{item}")?;
        }
        Ok(())
    }
}

impl FromStr for NodeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, raw) = match s.split_once('#') {
            Some((path, item)) => {
                let item = item
                    .parse::<ItemId>()
                    .map_err(|e| format!("bad item id in node key '{s}': {e}"))?;
                (path, Some(item))
            }
            None => (s, None),
        };

        let recipes = if path.is_empty() {
            Vec::new()
        } else {
            path.split('>')
                .map(|p| {
                    p.parse::<RecipeId>()
                        .map_err(|e| format!("bad recipe id in node key '{s}': {e}"))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            recipes,
            raw_item: raw,
        })
    }
}

impl From<NodeKey> for String {
    fn from(key: NodeKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for NodeKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Calculation output
// ---------------------------------------------------------------------------

/// Power draw split by source, in kW.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerBreakdown {
    pub machines: f64,
    pub sorters: f64,
    /// Supplied by the Dyson sphere, never part of grid demand.
    pub dyson_sphere: f64,
}

impl PowerBreakdown {
    /// Power the grid has to supply.
    pub fn required(&self) -> f64 {
        self.machines + self.sorters
    }

    pub fn add(&mut self, other: &PowerBreakdown) {
        self.machines += other.machines;
        self.sorters += other.sorters;
        self.dyson_sphere += other.dyson_sphere;
    }
}

/// Proliferator settings that were actually applied to a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedProliferator {
    pub tier: ProliferatorTier,
    pub mode: ProliferatorMode,
}

/// A flow of one item, items per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRate {
    pub item_id: ItemId,
    pub per_min: f64,
}

/// One recipe's share of the production tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionNode {
    pub key: NodeKey,
    /// `None` for a raw-material leaf.
    pub recipe: Option<RecipeId>,
    pub item: ItemId,
    pub label: String,
    pub machine: Option<MachineId>,
    pub machine_name: Option<String>,
    /// Output rate of `item` demanded from this node, items per minute.
    pub rate_per_min: f64,
    pub machine_count: f64,
    pub belts: f64,
    pub sorters: f64,
    pub power: PowerBreakdown,
    pub proliferator: AppliedProliferator,
    /// Production mode was requested globally but the recipe forbids it.
    pub production_bonus_blocked: bool,
    /// Every declared recipe output, byproducts included. Empty for leaves.
    pub outputs: Vec<ItemRate>,
    pub inputs: Vec<ItemRate>,
    pub children: Vec<ProductionNode>,
}

impl ProductionNode {
    pub fn is_raw(&self) -> bool {
        self.recipe.is_none()
    }

    /// Depth-first walk over this node and every descendant.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ProductionNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn find(&self, key: &NodeKey) -> Option<&ProductionNode> {
        if &self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }
}

/// Produced and consumed rate of one item, items per minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFlow {
    pub produced: f64,
    pub consumed: f64,
}

impl ItemFlow {
    pub fn net(&self) -> f64 {
        self.produced - self.consumed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_machines: f64,
    /// Grid power in kW (machines + sorters).
    pub total_power: f64,
    pub total_sorters: f64,
    pub item_statistics: BTreeMap<ItemId, ItemFlow>,
}

/// Something the caller should surface without treating it as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    /// The target rate was clamped into the supported range.
    TargetClamped { requested: f64, applied: f64 },
    /// The requested rate exceeded the supported ceiling.
    OutOfRange { requested: f64, ceiling: f64 },
    /// A recipe cycle was cut by treating the item as a raw input.
    CycleCut { item: ItemId },
}

/// Immutable snapshot produced by one calculation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub target_recipe: RecipeId,
    pub target_item: ItemId,
    pub target_rate: f64,
    pub settings: SettingsSnapshot,
    pub root: ProductionNode,
    pub statistics: Statistics,
    pub total_power: PowerBreakdown,
    pub notices: Vec<Notice>,
}

impl CalculationResult {
    /// Grid power to feed into generator allocation, in kW.
    pub fn required_power(&self) -> f64 {
        self.total_power.required()
    }
}
