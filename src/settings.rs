//! Settings snapshot consumed by every calculation pass
//!
//! The calculator never reads ambient state: callers hand it a
//! [`SettingsSnapshot`] (global settings plus per-node overrides) and get a
//! fresh result back. Per-node overrides shadow the global value through
//! [`resolve_effective`], which is the only place that precedence lives.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, CalcResult};
use crate::models::{AppliedProliferator, ItemId, MachineCategory, NodeKey, RecipeId};
use crate::power::PowerPolicy;

// ---------------------------------------------------------------------------
// Proliferator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProliferatorTier {
    #[default]
    None,
    Mk1,
    Mk2,
    Mk3,
}

impl ProliferatorTier {
    pub const MAX: ProliferatorTier = ProliferatorTier::Mk3;

    /// Extra products per cycle in production mode.
    pub fn extra_products(self) -> f64 {
        match self {
            ProliferatorTier::None => 0.0,
            ProliferatorTier::Mk1 => 0.125,
            ProliferatorTier::Mk2 => 0.2,
            ProliferatorTier::Mk3 => 0.25,
        }
    }

    /// Cycle-rate bonus in speed mode.
    pub fn speedup(self) -> f64 {
        match self {
            ProliferatorTier::None => 0.0,
            ProliferatorTier::Mk1 => 0.25,
            ProliferatorTier::Mk2 => 0.5,
            ProliferatorTier::Mk3 => 1.0,
        }
    }

    /// Extra machine power while sprayed items are processed, either mode.
    pub fn power_increase(self) -> f64 {
        match self {
            ProliferatorTier::None => 0.0,
            ProliferatorTier::Mk1 => 0.3,
            ProliferatorTier::Mk2 => 0.7,
            ProliferatorTier::Mk3 => 1.5,
        }
    }
}

impl FromStr for ProliferatorTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(ProliferatorTier::None),
            "mk1" | "1" => Ok(ProliferatorTier::Mk1),
            "mk2" | "2" => Ok(ProliferatorTier::Mk2),
            "mk3" | "3" => Ok(ProliferatorTier::Mk3),
            _ => Err(format!("unknown proliferator tier '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProliferatorMode {
    #[default]
    Speed,
    Production,
}

impl FromStr for ProliferatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "speed" => Ok(ProliferatorMode::Speed),
            "production" | "extra" => Ok(ProliferatorMode::Production),
            _ => Err(format!("unknown proliferator mode '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProliferatorSetting {
    pub tier: ProliferatorTier,
    pub mode: ProliferatorMode,
}

// ---------------------------------------------------------------------------
// Logistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BeltTier {
    #[default]
    Mk1,
    Mk2,
    Mk3,
}

impl BeltTier {
    pub const ALL: [BeltTier; 3] = [BeltTier::Mk1, BeltTier::Mk2, BeltTier::Mk3];

    /// Single-stack capacity, items per minute.
    pub fn items_per_min(self) -> f64 {
        match self {
            BeltTier::Mk1 => 360.0,
            BeltTier::Mk2 => 720.0,
            BeltTier::Mk3 => 1800.0,
        }
    }
}

impl FromStr for BeltTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mk1" | "1" => Ok(BeltTier::Mk1),
            "mk2" | "2" => Ok(BeltTier::Mk2),
            "mk3" | "3" => Ok(BeltTier::Mk3),
            _ => Err(format!("unknown belt tier '{s}'")),
        }
    }
}

pub const MAX_BELT_STACK: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeltSetting {
    pub tier: BeltTier,
    /// Items stacked per belt slot, 1..=4.
    pub stack: u8,
}

impl Default for BeltSetting {
    fn default() -> Self {
        Self {
            tier: BeltTier::Mk1,
            stack: 1,
        }
    }
}

impl BeltSetting {
    /// Effective belt capacity, items per minute.
    pub fn capacity_per_min(&self) -> f64 {
        self.tier.items_per_min() * f64::from(self.stack)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SorterTier {
    #[default]
    Mk1,
    Mk2,
    Mk3,
    Pile,
}

impl SorterTier {
    /// Single-item transfers per minute.
    pub fn items_per_min(self) -> f64 {
        match self {
            SorterTier::Mk1 => 90.0,
            SorterTier::Mk2 => 180.0,
            SorterTier::Mk3 => 360.0,
            SorterTier::Pile => 720.0,
        }
    }

    pub fn work_power_kw(self) -> f64 {
        match self {
            SorterTier::Mk1 => 18.0,
            SorterTier::Mk2 => 36.0,
            SorterTier::Mk3 => 54.0,
            SorterTier::Pile => 72.0,
        }
    }
}

impl FromStr for SorterTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mk1" | "1" => Ok(SorterTier::Mk1),
            "mk2" | "2" => Ok(SorterTier::Mk2),
            "mk3" | "3" => Ok(SorterTier::Mk3),
            "pile" => Ok(SorterTier::Pile),
            _ => Err(format!("unknown sorter tier '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    pub proliferator: ProliferatorSetting,
    /// Rank per machine category. Missing categories run at rank 1.
    pub machine_ranks: BTreeMap<MachineCategory, u8>,
    pub belt: BeltSetting,
    pub sorter: SorterTier,
    pub power: PowerPolicy,
    /// Preferred recipe per item, for items with alternatives.
    pub recipe_choices: BTreeMap<ItemId, RecipeId>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        SettingsTemplate::EarlyGame.settings()
    }
}

impl GlobalSettings {
    pub fn machine_rank(&self, category: MachineCategory) -> u8 {
        self.machine_ranks.get(&category).copied().unwrap_or(1)
    }
}

/// Per-node settings. Any field left `None` falls through to the global value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proliferator_tier: Option<ProliferatorTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proliferator_mode: Option<ProliferatorMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_rank: Option<u8>,
}

impl NodeOverride {
    pub fn is_empty(&self) -> bool {
        self.proliferator_tier.is_none()
            && self.proliferator_mode.is_none()
            && self.machine_rank.is_none()
    }

    /// Proliferator production mode was asked for explicitly on this node.
    pub fn requests_production(&self) -> bool {
        self.proliferator_mode == Some(ProliferatorMode::Production)
            && self.proliferator_tier != Some(ProliferatorTier::None)
    }
}

/// Everything a calculation pass reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub global: GlobalSettings,
    #[serde(default)]
    pub overrides: BTreeMap<NodeKey, NodeOverride>,
}

impl SettingsSnapshot {
    pub fn new(global: GlobalSettings) -> Self {
        Self {
            global,
            overrides: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> CalcResult<()> {
        validate_stack(self.global.belt.stack)?;
        for (category, rank) in &self.global.machine_ranks {
            if *rank == 0 {
                return Err(CalcError::InvalidInput {
                    detail: format!("machine rank for {category} must be at least 1"),
                });
            }
        }
        for (key, o) in &self.overrides {
            if o.machine_rank == Some(0) {
                return Err(CalcError::InvalidInput {
                    detail: format!("machine rank override on node {key} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

fn validate_stack(stack: u8) -> CalcResult<()> {
    if (1..=MAX_BELT_STACK).contains(&stack) {
        Ok(())
    } else {
        Err(CalcError::InvalidInput {
            detail: format!("belt stack must be between 1 and {MAX_BELT_STACK}, got {stack}"),
        })
    }
}

/// Settings after per-node overrides are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveSettings {
    pub proliferator: AppliedProliferator,
    pub machine_rank: u8,
}

/// Resolve the settings that apply at one node: override first, then global.
pub fn resolve_effective(
    global: &GlobalSettings,
    node: Option<&NodeOverride>,
    category: MachineCategory,
) -> EffectiveSettings {
    let tier = node
        .and_then(|o| o.proliferator_tier)
        .unwrap_or(global.proliferator.tier);
    let mode = node
        .and_then(|o| o.proliferator_mode)
        .unwrap_or(global.proliferator.mode);
    let machine_rank = node
        .and_then(|o| o.machine_rank)
        .unwrap_or_else(|| global.machine_rank(category));

    EffectiveSettings {
        proliferator: AppliedProliferator { tier, mode },
        machine_rank,
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Named bundles of machine ranks, proliferator and logistics tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingsTemplate {
    EarlyGame,
    MidGame,
    LateGame,
    EndGame,
    PowerSaver,
}

impl SettingsTemplate {
    pub const ALL: [SettingsTemplate; 5] = [
        SettingsTemplate::EarlyGame,
        SettingsTemplate::MidGame,
        SettingsTemplate::LateGame,
        SettingsTemplate::EndGame,
        SettingsTemplate::PowerSaver,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingsTemplate::EarlyGame => "earlyGame",
            SettingsTemplate::MidGame => "midGame",
            SettingsTemplate::LateGame => "lateGame",
            SettingsTemplate::EndGame => "endGame",
            SettingsTemplate::PowerSaver => "powerSaver",
        }
    }

    pub fn settings(self) -> GlobalSettings {
        use MachineCategory::*;

        let (smelter, assembler, chemical, research, proliferator, belt, sorter, power) =
            match self {
                SettingsTemplate::EarlyGame => (
                    1,
                    1,
                    1,
                    1,
                    ProliferatorSetting::default(),
                    BeltSetting::default(),
                    SorterTier::Mk1,
                    "earlyGame",
                ),
                SettingsTemplate::MidGame => (
                    1,
                    2,
                    1,
                    1,
                    ProliferatorSetting {
                        tier: ProliferatorTier::Mk1,
                        mode: ProliferatorMode::Speed,
                    },
                    BeltSetting {
                        tier: BeltTier::Mk2,
                        stack: 1,
                    },
                    SorterTier::Mk2,
                    "midGame",
                ),
                SettingsTemplate::LateGame => (
                    2,
                    3,
                    2,
                    1,
                    ProliferatorSetting {
                        tier: ProliferatorTier::Mk2,
                        mode: ProliferatorMode::Speed,
                    },
                    BeltSetting {
                        tier: BeltTier::Mk3,
                        stack: 2,
                    },
                    SorterTier::Mk3,
                    "lateGame",
                ),
                SettingsTemplate::EndGame => (
                    3,
                    4,
                    2,
                    2,
                    ProliferatorSetting {
                        tier: ProliferatorTier::Mk3,
                        mode: ProliferatorMode::Speed,
                    },
                    BeltSetting {
                        tier: BeltTier::Mk3,
                        stack: MAX_BELT_STACK,
                    },
                    SorterTier::Pile,
                    "endGame",
                ),
                SettingsTemplate::PowerSaver => (
                    1,
                    2,
                    1,
                    1,
                    ProliferatorSetting {
                        tier: ProliferatorTier::Mk3,
                        mode: ProliferatorMode::Production,
                    },
                    BeltSetting {
                        tier: BeltTier::Mk3,
                        stack: MAX_BELT_STACK,
                    },
                    SorterTier::Pile,
                    "renewable",
                ),
            };

        GlobalSettings {
            proliferator,
            machine_ranks: BTreeMap::from([
                (Smelter, smelter),
                (Assembler, assembler),
                (Chemical, chemical),
                (Refinery, 1),
                (Research, research),
                (Collider, 1),
                (RayReceiver, 1),
            ]),
            belt,
            sorter,
            power: PowerPolicy::Template {
                name: power.to_string(),
            },
            recipe_choices: BTreeMap::new(),
        }
    }
}

impl fmt::Display for SettingsTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingsTemplate {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingsTemplate::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CalcError::UnknownTemplate {
                name: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Patches
// ---------------------------------------------------------------------------

/// A partial settings update. Applying a patch never touches fields it
/// leaves as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proliferator_tier: Option<ProliferatorTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proliferator_mode: Option<ProliferatorMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belt_tier: Option<BeltTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belt_stack: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorter: Option<SorterTier>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub machine_ranks: BTreeMap<MachineCategory, u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_overrides: BTreeMap<NodeKey, NodeOverride>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    /// Every global field of `template`. Node overrides are left alone.
    pub fn from_template(template: SettingsTemplate) -> Self {
        let s = template.settings();
        SettingsPatch {
            proliferator_tier: Some(s.proliferator.tier),
            proliferator_mode: Some(s.proliferator.mode),
            belt_tier: Some(s.belt.tier),
            belt_stack: Some(s.belt.stack),
            sorter: Some(s.sorter),
            machine_ranks: s.machine_ranks,
            node_overrides: BTreeMap::new(),
        }
    }

    /// Apply to a snapshot, producing a new one. The input is not modified.
    pub fn apply(&self, snapshot: &SettingsSnapshot) -> CalcResult<SettingsSnapshot> {
        let mut next = snapshot.clone();
        let global = &mut next.global;

        if let Some(tier) = self.proliferator_tier {
            global.proliferator.tier = tier;
        }
        if let Some(mode) = self.proliferator_mode {
            global.proliferator.mode = mode;
        }
        if let Some(tier) = self.belt_tier {
            global.belt.tier = tier;
        }
        if let Some(stack) = self.belt_stack {
            validate_stack(stack)?;
            global.belt.stack = stack;
        }
        if let Some(sorter) = self.sorter {
            global.sorter = sorter;
        }
        for (category, rank) in &self.machine_ranks {
            global.machine_ranks.insert(*category, *rank);
        }
        for (key, o) in &self.node_overrides {
            if o.is_empty() {
                next.overrides.remove(key);
            } else {
                next.overrides.insert(key.clone(), *o);
            }
        }

        next.validate()?;
        Ok(next)
    }
}
