//! Production chain calculator logic

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::catalog::GameData;
use crate::error::{CalcError, CalcResult};
use crate::models::{
    AppliedProliferator, CalculationResult, ItemId, ItemRate, Notice, NodeKey,
    PowerBreakdown, ProductionNode, Recipe, RecipeId, Statistics,
};
use crate::power::format_power;
use crate::settings::{
    resolve_effective, EffectiveSettings, NodeOverride, ProliferatorMode, ProliferatorTier,
    SettingsSnapshot,
};

/// Smallest target rate, items per minute. Anything lower is raised to it.
pub const MIN_TARGET_RATE: f64 = 0.1;
/// Largest target rate, items per minute. Anything higher is clamped.
pub const MAX_TARGET_RATE: f64 = 1e9;

const MAX_DEPTH: usize = 32;

/// Calculate the production chain for `recipe` at `rate_per_min`.
///
/// Builds the tree, aggregates it and checks that nothing went non-finite.
/// The result is a fresh snapshot; nothing is cached between calls.
pub fn calculate(
    data: &GameData,
    recipe: RecipeId,
    rate_per_min: f64,
    settings: &SettingsSnapshot,
) -> CalcResult<CalculationResult> {
    let item = primary_item(data, recipe)?;
    calculate_item(data, recipe, item, rate_per_min, settings)
}

/// Like [`calculate`], but `recipe` is the producer of `item`, which need
/// not be its primary output (hydrogen from X-ray cracking, say).
pub fn calculate_item(
    data: &GameData,
    recipe: RecipeId,
    item: ItemId,
    rate_per_min: f64,
    settings: &SettingsSnapshot,
) -> CalcResult<CalculationResult> {
    let mut notices = Vec::new();
    let (root, rate) = build_tree(data, recipe, item, rate_per_min, settings, &mut notices)?;

    let (statistics, total_power) = aggregate(&root);
    ensure_finite(&root, &statistics)?;

    Ok(CalculationResult {
        target_recipe: recipe,
        target_item: item,
        target_rate: rate,
        settings: settings.clone(),
        root,
        statistics,
        total_power,
        notices,
    })
}

/// Build the tree for `recipe` without aggregating it.
pub fn build(
    data: &GameData,
    recipe: RecipeId,
    rate_per_min: f64,
    settings: &SettingsSnapshot,
) -> CalcResult<ProductionNode> {
    let item = primary_item(data, recipe)?;
    let mut notices = Vec::new();
    build_tree(data, recipe, item, rate_per_min, settings, &mut notices).map(|(root, _)| root)
}

fn primary_item(data: &GameData, recipe: RecipeId) -> CalcResult<ItemId> {
    data.recipe(recipe)
        .ok_or(CalcError::UnknownRecipe { id: recipe })?
        .primary_output()
        .ok_or_else(|| CalcError::InvalidInput {
            detail: format!("recipe {recipe} has no outputs"),
        })
}

/// Returns the root and the target rate after clamping.
fn build_tree(
    data: &GameData,
    recipe: RecipeId,
    item: ItemId,
    rate_per_min: f64,
    settings: &SettingsSnapshot,
    notices: &mut Vec<Notice>,
) -> CalcResult<(ProductionNode, f64)> {
    settings.validate()?;
    let rate = clamp_target(rate_per_min, notices)?;

    let target = data
        .recipe(recipe)
        .ok_or(CalcError::UnknownRecipe { id: recipe })?;

    let mut builder = TreeBuilder {
        data,
        settings,
        notices,
    };
    let root = builder.expand_recipe(target, item, rate, NodeKey::root(recipe))?;
    Ok((root, rate))
}

/// Ids of every recipe that can make `item`, for side-by-side comparison.
pub fn alternatives(data: &GameData, item: ItemId) -> Vec<RecipeId> {
    data.producers(item).iter().map(|r| r.id).collect()
}

fn clamp_target(rate: f64, notices: &mut Vec<Notice>) -> CalcResult<f64> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(CalcError::InvalidInput {
            detail: format!("target rate must be a finite value >= 0, got {rate}"),
        });
    }

    if rate < MIN_TARGET_RATE {
        debug!("target rate {rate} raised to {MIN_TARGET_RATE}");
        notices.push(Notice::TargetClamped {
            requested: rate,
            applied: MIN_TARGET_RATE,
        });
        return Ok(MIN_TARGET_RATE);
    }

    if rate > MAX_TARGET_RATE {
        warn!("target rate {rate} exceeds {MAX_TARGET_RATE}/min, clamping");
        notices.push(Notice::OutOfRange {
            requested: rate,
            ceiling: MAX_TARGET_RATE,
        });
        notices.push(Notice::TargetClamped {
            requested: rate,
            applied: MAX_TARGET_RATE,
        });
        return Ok(MAX_TARGET_RATE);
    }

    Ok(rate)
}

struct TreeBuilder<'a> {
    data: &'a GameData,
    settings: &'a SettingsSnapshot,
    notices: &'a mut Vec<Notice>,
}

impl TreeBuilder<'_> {
    fn expand_recipe(
        &mut self,
        recipe: &Recipe,
        item: ItemId,
        rate: f64,
        key: NodeKey,
    ) -> CalcResult<ProductionNode> {
        let (data, settings) = (self.data, self.settings);
        let global = &settings.global;
        let node_override = settings.overrides.get(&key);
        let effective = resolve_effective(global, node_override, recipe.category);

        let (proliferator, blocked) = check_capability(recipe, node_override, effective)?;

        let machine = data
            .machine_for(recipe.category, effective.machine_rank)
            .ok_or_else(|| CalcError::MissingMachine {
                recipe: recipe.id,
                category: recipe.category.to_string(),
            })?;

        let bonus = Bonus::from(proliferator);
        let out_count = recipe.output_count(item).ok_or_else(|| CalcError::InvalidInput {
            detail: format!("recipe {} does not produce item {item}", recipe.id),
        })?;

        let machine_cycles_per_min = 60.0 / recipe.time_s * machine.speed * bonus.speed;
        let cycles_per_min = rate / (out_count * bonus.production);
        let machine_count = cycles_per_min / machine_cycles_per_min;

        let outputs: Vec<ItemRate> = recipe
            .outputs
            .iter()
            .map(|o| ItemRate {
                item_id: o.item_id,
                per_min: o.count * bonus.production * cycles_per_min,
            })
            .collect();
        let inputs: Vec<ItemRate> = recipe
            .inputs
            .iter()
            .map(|i| ItemRate {
                item_id: i.item_id,
                per_min: i.count * cycles_per_min,
            })
            .collect();

        // One sorter lane per input and output, sized by a single machine's flow.
        let sorter = global.sorter;
        let sorter_capacity = sorter.items_per_min() * f64::from(global.belt.stack);
        let sorters_per_machine: f64 = recipe
            .inputs
            .iter()
            .map(|i| i.count)
            .chain(recipe.outputs.iter().map(|o| o.count * bonus.production))
            .map(|count| (count * machine_cycles_per_min / sorter_capacity).ceil())
            .sum();
        let sorters = machine_count * sorters_per_machine;

        let machine_power = machine_count * machine.work_power_kw * bonus.power;
        let power = PowerBreakdown {
            machines: if machine.dyson_powered { 0.0 } else { machine_power },
            sorters: sorters * sorter.work_power_kw(),
            dyson_sphere: if machine.dyson_powered { machine_power } else { 0.0 },
        };

        let mut children = Vec::with_capacity(inputs.len());
        for input in &inputs {
            children.push(self.expand_item(input.item_id, input.per_min, &key)?);
        }

        Ok(ProductionNode {
            belts: belts_for(rate, settings),
            key,
            recipe: Some(recipe.id),
            item,
            label: recipe.name.clone(),
            machine: Some(machine.id),
            machine_name: Some(machine.name.clone()),
            rate_per_min: rate,
            machine_count,
            sorters,
            power,
            proliferator,
            production_bonus_blocked: blocked,
            outputs,
            inputs,
            children,
        })
    }

    fn expand_item(
        &mut self,
        item: ItemId,
        rate: f64,
        parent: &NodeKey,
    ) -> CalcResult<ProductionNode> {
        let data = self.data;
        let producer = data.producer_for(item, &self.settings.global.recipe_choices);

        match producer {
            Some(recipe) if parent.recipes.contains(&recipe.id) => {
                debug!(
                    "cycle through recipe {} at {parent}, treating item {item} as raw",
                    recipe.id
                );
                if !self.notices.contains(&Notice::CycleCut { item }) {
                    self.notices.push(Notice::CycleCut { item });
                }
                Ok(self.raw_leaf(item, rate, parent))
            }
            Some(recipe) => {
                if parent.depth() >= MAX_DEPTH {
                    return Err(CalcError::RecursionLimit { item });
                }
                self.expand_recipe(recipe, item, rate, parent.child(recipe.id))
            }
            None => Ok(self.raw_leaf(item, rate, parent)),
        }
    }

    fn raw_leaf(&self, item: ItemId, rate: f64, parent: &NodeKey) -> ProductionNode {
        ProductionNode {
            key: parent.raw(item),
            recipe: None,
            item,
            label: self.data.item_name(item),
            machine: None,
            machine_name: None,
            rate_per_min: rate,
            machine_count: 0.0,
            belts: belts_for(rate, self.settings),
            sorters: 0.0,
            power: PowerBreakdown::default(),
            proliferator: AppliedProliferator {
                tier: ProliferatorTier::None,
                mode: self.settings.global.proliferator.mode,
            },
            production_bonus_blocked: false,
            outputs: Vec::new(),
            inputs: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Production mode on a recipe that forbids it: an explicit node
/// override is an error, an inherited global setting is dropped for
/// this node and flagged.
fn check_capability(
    recipe: &Recipe,
    node_override: Option<&NodeOverride>,
    effective: EffectiveSettings,
) -> CalcResult<(AppliedProliferator, bool)> {
    let applied = effective.proliferator;
    let wants_production =
        applied.mode == ProliferatorMode::Production && applied.tier != ProliferatorTier::None;

    if !wants_production || recipe.allow_production_bonus {
        return Ok((applied, false));
    }

    if node_override.is_some_and(|o| o.requests_production()) {
        return Err(CalcError::CapabilityViolation {
            recipe: recipe.id,
            capability: "proliferator production mode",
        });
    }

    let blocked = AppliedProliferator {
        tier: ProliferatorTier::None,
        mode: applied.mode,
    };
    Ok((blocked, true))
}

/// Multipliers a proliferator setting applies to one node.
struct Bonus {
    production: f64,
    speed: f64,
    power: f64,
}

impl From<AppliedProliferator> for Bonus {
    fn from(p: AppliedProliferator) -> Self {
        let (production, speed) = match p.mode {
            ProliferatorMode::Production => (1.0 + p.tier.extra_products(), 1.0),
            ProliferatorMode::Speed => (1.0, 1.0 + p.tier.speedup()),
        };
        Bonus {
            production,
            speed,
            power: 1.0 + p.tier.power_increase(),
        }
    }
}

fn belts_for(rate: f64, settings: &SettingsSnapshot) -> f64 {
    (rate / settings.global.belt.capacity_per_min()).ceil()
}

/// Sum machines, power and item flows over the whole tree.
pub fn aggregate(root: &ProductionNode) -> (Statistics, PowerBreakdown) {
    let mut statistics = Statistics::default();
    let mut total_power = PowerBreakdown::default();

    root.walk(&mut |node| {
        statistics.total_machines += node.machine_count;
        statistics.total_sorters += node.sorters;
        total_power.add(&node.power);

        for output in &node.outputs {
            statistics
                .item_statistics
                .entry(output.item_id)
                .or_default()
                .produced += output.per_min;
        }
        for input in &node.inputs {
            statistics
                .item_statistics
                .entry(input.item_id)
                .or_default()
                .consumed += input.per_min;
        }
    });

    statistics.total_power = total_power.required();
    (statistics, total_power)
}

fn ensure_finite(root: &ProductionNode, statistics: &Statistics) -> CalcResult<()> {
    let mut bad: Option<NodeKey> = None;
    root.walk(&mut |node| {
        let values = [
            node.machine_count,
            node.belts,
            node.sorters,
            node.power.machines,
            node.power.sorters,
            node.power.dyson_sphere,
        ];
        if bad.is_none() && values.iter().any(|v| !v.is_finite()) {
            bad = Some(node.key.clone());
        }
    });
    if let Some(key) = bad {
        return Err(CalcError::OutOfRange {
            detail: format!("node {key} produced a non-finite value"),
        });
    }

    let mut totals = vec![
        statistics.total_machines,
        statistics.total_power,
        statistics.total_sorters,
    ];
    totals.extend(
        statistics
            .item_statistics
            .values()
            .flat_map(|f| [f.produced, f.consumed]),
    );
    if totals.iter().any(|v| !v.is_finite()) {
        return Err(CalcError::OutOfRange {
            detail: "aggregated statistics are not finite".to_string(),
        });
    }

    Ok(())
}

/// Format a production chain as a readable string
pub fn format_production_chain(node: &ProductionNode, data: &GameData, indent: usize) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);

    if node.is_raw() {
        output.push_str(&format!(
            "{}→ {} @ {:.2}/min (raw input)\n",
            prefix, node.label, node.rate_per_min
        ));
        return output;
    }

    let machine = node.machine_name.as_deref().unwrap_or("?");
    let mut power = format_power(node.power.required());
    if node.power.dyson_sphere > 0.0 {
        power.push_str(&format!(" + {} from sphere", format_power(node.power.dyson_sphere)));
    }
    output.push_str(&format!(
        "{}{:.2}x {} [{}] → {} @ {:.2}/min ({})\n",
        prefix,
        node.machine_count,
        machine,
        node.label,
        data.item_name(node.item),
        node.rate_per_min,
        power
    ));
    if node.production_bonus_blocked {
        output.push_str(&format!("{prefix}  (production bonus not available)\n"));
    }

    for child in &node.children {
        output.push_str(&format_production_chain(child, data, indent + 1));
    }

    output
}

/// Summary of a production chain calculation
#[derive(Debug)]
pub struct ChainSummary {
    pub target: String,
    pub target_rate: f64,
    pub machines: Vec<(String, f64)>,
    pub raw_inputs: Vec<(String, f64)>,
    pub byproducts: Vec<(String, f64)>,
    pub power: PowerBreakdown,
    pub total_sorters: f64,
    pub notices: Vec<Notice>,
}

/// Generate a summary of the production chain
pub fn summarize(result: &CalculationResult, data: &GameData) -> ChainSummary {
    let mut machines: BTreeMap<String, f64> = BTreeMap::new();
    let mut raw_inputs: BTreeMap<String, f64> = BTreeMap::new();

    result.root.walk(&mut |node| match &node.machine_name {
        Some(name) => *machines.entry(name.clone()).or_default() += node.machine_count,
        None => *raw_inputs.entry(node.label.clone()).or_default() += node.rate_per_min,
    });

    let byproducts = result
        .statistics
        .item_statistics
        .iter()
        .filter(|(id, flow)| **id != result.target_item && flow.net() > 1e-9)
        .map(|(id, flow)| (data.item_name(*id), flow.net()))
        .collect();

    ChainSummary {
        target: data.item_name(result.target_item),
        target_rate: result.target_rate,
        machines: machines.into_iter().collect(),
        raw_inputs: raw_inputs.into_iter().collect(),
        byproducts,
        power: result.total_power,
        total_sorters: result.statistics.total_sorters,
        notices: result.notices.clone(),
    }
}

impl std::fmt::Display for ChainSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Production Summary ===")?;
        writeln!(f, "Target: {} @ {:.2}/min", self.target, self.target_rate)?;
        writeln!(f)?;

        writeln!(f, "Machines required:")?;
        for (name, count) in &self.machines {
            writeln!(f, "  {:.2}x {}", count, name)?;
        }
        writeln!(f, "  {:.2}x sorters", self.total_sorters)?;
        writeln!(f)?;

        writeln!(f, "Raw inputs required:")?;
        for (name, rate) in &self.raw_inputs {
            writeln!(f, "  {} @ {:.2}/min", name, rate)?;
        }

        if !self.byproducts.is_empty() {
            writeln!(f)?;
            writeln!(f, "Surplus byproducts:")?;
            for (name, rate) in &self.byproducts {
                writeln!(f, "  {} @ {:.2}/min", name, rate)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Power:")?;
        writeln!(f, "  Machines:     {}", format_power(self.power.machines))?;
        writeln!(f, "  Sorters:      {}", format_power(self.power.sorters))?;
        writeln!(f, "  Required:     {}", format_power(self.power.required()))?;
        if self.power.dyson_sphere > 0.0 {
            writeln!(f, "  Dyson sphere: {}", format_power(self.power.dyson_sphere))?;
        }

        for notice in &self.notices {
            match notice {
                Notice::TargetClamped { requested, applied } => {
                    writeln!(f, "note: target {requested}/min adjusted to {applied}/min")?
                }
                Notice::OutOfRange { requested, ceiling } => {
                    writeln!(f, "note: {requested}/min is above the {ceiling}/min ceiling")?
                }
                Notice::CycleCut { item } => {
                    writeln!(f, "note: item {item} is part of a recipe loop and is treated as raw input")?
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ids, recipes, sample_catalog};
    use crate::settings::{BeltTier, ProliferatorSetting, SettingsTemplate, SorterTier};

    fn early() -> SettingsSnapshot {
        SettingsSnapshot::new(SettingsTemplate::EarlyGame.settings())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    // -----------------------------------------------------------------------
    // Tree shape and machine counts
    // -----------------------------------------------------------------------

    #[test]
    fn single_step_machine_count() {
        let data = sample_catalog();
        // arc smelter: 60 ingots/min per machine
        let result = calculate(&data, recipes::IRON_INGOT, 120.0, &early()).unwrap();

        assert!(close(result.root.machine_count, 2.0));
        assert!(close(result.root.power.machines, 720.0));
        assert_eq!(result.root.children.len(), 1);

        let ore = &result.root.children[0];
        assert!(ore.is_raw());
        assert_eq!(ore.machine_count, 0.0);
        assert_eq!(ore.power, PowerBreakdown::default());
        assert!(close(ore.rate_per_min, 120.0));
        assert_eq!(ore.label, "Iron Ore");
    }

    #[test]
    fn nested_chain_propagates_demand() {
        let data = sample_catalog();
        // 60 circuits/min → 30 cycles/min at 45 cycles/min per Mk.I assembler
        let result = calculate(&data, recipes::CIRCUIT_BOARD, 60.0, &early()).unwrap();

        assert!(close(result.root.machine_count, 30.0 / 45.0));
        let iron = result
            .root
            .children
            .iter()
            .find(|c| c.item == ids::IRON_INGOT)
            .unwrap();
        assert!(close(iron.rate_per_min, 60.0));
        assert_eq!(iron.recipe, Some(recipes::IRON_INGOT));
        assert_eq!(iron.key, NodeKey::root(recipes::CIRCUIT_BOARD).child(recipes::IRON_INGOT));

        let flows = &result.statistics.item_statistics;
        assert!(close(flows[&ids::IRON_ORE].consumed, 60.0));
        assert!(close(flows[&ids::COPPER_ORE].consumed, 30.0));
        assert!(close(flows[&ids::CIRCUIT_BOARD].produced, 60.0));
    }

    #[test]
    fn byproducts_show_up_in_item_statistics() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::PLASMA_REFINING, 60.0, &early()).unwrap();

        let flows = &result.statistics.item_statistics;
        assert!(close(flows[&ids::REFINED_OIL].produced, 60.0));
        assert!(close(flows[&ids::HYDROGEN].produced, 30.0));
        assert!(close(flows[&ids::CRUDE_OIL].consumed, 60.0));
    }

    #[test]
    fn totals_are_sum_of_nodes() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::ELECTROMAGNETIC_MATRIX, 30.0, &early()).unwrap();

        let mut machines = 0.0;
        let mut power = 0.0;
        result.root.walk(&mut |n| {
            machines += n.machine_count;
            power += n.power.required();
        });
        assert!(close(result.statistics.total_machines, machines));
        assert!(close(result.statistics.total_power, power));
        assert!(close(result.required_power(), power));
    }

    // -----------------------------------------------------------------------
    // Target clamping
    // -----------------------------------------------------------------------

    #[test]
    fn tiny_target_is_raised_to_floor() {
        let data = sample_catalog();
        let tiny = calculate(&data, recipes::GEAR, 0.0001, &early()).unwrap();
        let floor = calculate(&data, recipes::GEAR, 0.1, &early()).unwrap();

        assert_eq!(tiny.root, floor.root);
        assert_eq!(tiny.statistics, floor.statistics);
        assert!(tiny.notices.contains(&Notice::TargetClamped {
            requested: 0.0001,
            applied: 0.1
        }));
        assert!(floor.notices.is_empty());
    }

    #[test]
    fn negative_and_nan_targets_rejected() {
        let data = sample_catalog();
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                calculate(&data, recipes::GEAR, bad, &early()),
                Err(CalcError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn huge_target_is_clamped_and_reported() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::GEAR, 1e20, &early()).unwrap();
        assert_eq!(result.target_rate, MAX_TARGET_RATE);
        assert!(result
            .notices
            .iter()
            .any(|n| matches!(n, Notice::OutOfRange { .. })));
        assert!(result.statistics.total_power.is_finite());
    }

    #[test]
    fn unknown_recipe() {
        let data = sample_catalog();
        assert_eq!(
            calculate(&data, 9999, 1.0, &early()).unwrap_err(),
            CalcError::UnknownRecipe { id: 9999 }
        );
    }

    // -----------------------------------------------------------------------
    // Settings effects
    // -----------------------------------------------------------------------

    #[test]
    fn machine_rank_changes_count_and_power() {
        let data = sample_catalog();
        let mk1 = calculate(&data, recipes::GEAR, 90.0, &early()).unwrap();
        let late = SettingsSnapshot::new(SettingsTemplate::LateGame.settings());
        let mk3 = calculate(&data, recipes::GEAR, 90.0, &late).unwrap();

        assert!(close(mk1.root.machine_count, 2.0));
        assert!(close(mk3.root.machine_count, 1.0));
        assert_ne!(mk1.total_power.machines, mk3.total_power.machines);
    }

    #[test]
    fn speed_mode_cuts_machines_and_raises_power_per_machine() {
        let data = sample_catalog();
        let mut snap = early();
        let plain = calculate(&data, recipes::IRON_INGOT, 120.0, &snap).unwrap();

        snap.global.proliferator = ProliferatorSetting {
            tier: ProliferatorTier::Mk3,
            mode: ProliferatorMode::Speed,
        };
        let sprayed = calculate(&data, recipes::IRON_INGOT, 120.0, &snap).unwrap();

        assert!(close(sprayed.root.machine_count, 1.0));
        // one machine at 2.5x power
        assert!(close(sprayed.root.power.machines, 900.0));
        assert!(plain.root.power.machines != sprayed.root.power.machines);
    }

    #[test]
    fn production_mode_reduces_inputs() {
        let data = sample_catalog();
        let mut snap = early();
        snap.global.proliferator = ProliferatorSetting {
            tier: ProliferatorTier::Mk3,
            mode: ProliferatorMode::Production,
        };
        let result = calculate(&data, recipes::IRON_INGOT, 125.0, &snap).unwrap();

        assert!(close(result.root.children[0].rate_per_min, 100.0));
        assert!(close(result.root.machine_count, 100.0 / 60.0));
    }

    #[test]
    fn global_production_mode_is_flagged_on_forbidding_recipe() {
        let data = sample_catalog();
        let mut snap = early();
        snap.global.proliferator = ProliferatorSetting {
            tier: ProliferatorTier::Mk2,
            mode: ProliferatorMode::Production,
        };
        let result = calculate(&data, recipes::PLASMA_REFINING, 60.0, &snap).unwrap();

        assert!(result.root.production_bonus_blocked);
        assert_eq!(result.root.proliferator.tier, ProliferatorTier::None);
        // no bonus: plain refinery power
        assert!(close(result.root.power.machines, result.root.machine_count * 960.0));
    }

    #[test]
    fn explicit_production_override_on_forbidding_recipe_is_rejected() {
        let data = sample_catalog();
        let mut snap = early();
        snap.overrides.insert(
            NodeKey::root(recipes::PLASMA_REFINING),
            NodeOverride {
                proliferator_tier: Some(ProliferatorTier::Mk3),
                proliferator_mode: Some(ProliferatorMode::Production),
                machine_rank: None,
            },
        );

        assert_eq!(
            calculate(&data, recipes::PLASMA_REFINING, 60.0, &snap).unwrap_err(),
            CalcError::CapabilityViolation {
                recipe: recipes::PLASMA_REFINING,
                capability: "proliferator production mode",
            }
        );
    }

    #[test]
    fn node_override_only_touches_that_node() {
        let data = sample_catalog();
        let mut snap = early();
        let iron_key = NodeKey::root(recipes::GEAR).child(recipes::IRON_INGOT);
        snap.overrides.insert(
            iron_key.clone(),
            NodeOverride {
                machine_rank: Some(3),
                ..Default::default()
            },
        );

        let result = calculate(&data, recipes::GEAR, 60.0, &snap).unwrap();
        let iron = result.root.find(&iron_key).unwrap();
        assert_eq!(iron.machine_name.as_deref(), Some("Negentropy Smelter"));
        assert_eq!(
            result.root.machine_name.as_deref(),
            Some("Assembling Machine Mk.I")
        );
    }

    #[test]
    fn belt_and_sorter_settings_change_logistics() {
        let data = sample_catalog();
        let mut snap = early();
        let slow = calculate(&data, recipes::IRON_INGOT, 1000.0, &snap).unwrap();

        snap.global.belt.tier = BeltTier::Mk3;
        snap.global.belt.stack = 4;
        snap.global.sorter = SorterTier::Pile;
        let fast = calculate(&data, recipes::IRON_INGOT, 1000.0, &snap).unwrap();

        assert_eq!(slow.root.belts, 3.0);
        assert_eq!(fast.root.belts, 1.0);
        assert_ne!(slow.total_power.sorters, fast.total_power.sorters);
    }

    // -----------------------------------------------------------------------
    // Recipe choice and cycles
    // -----------------------------------------------------------------------

    #[test]
    fn alternative_recipe_choice_is_followed() {
        let data = sample_catalog();
        assert_eq!(
            alternatives(&data, ids::GRAPHENE),
            vec![recipes::GRAPHENE, recipes::GRAPHENE_FROM_ICE]
        );
        assert_eq!(
            alternatives(&data, ids::HYDROGEN),
            vec![
                recipes::PLASMA_REFINING,
                recipes::GRAPHENE_FROM_ICE,
                recipes::X_RAY_CRACKING,
                recipes::ANTIMATTER
            ]
        );
    }

    #[test]
    fn secondary_output_can_be_the_target() {
        let data = sample_catalog();
        // 1 hydrogen per 4 s cycle, 15 cycles/min per refinery
        let result =
            calculate_item(&data, recipes::PLASMA_REFINING, ids::HYDROGEN, 30.0, &early()).unwrap();

        assert_eq!(result.target_item, ids::HYDROGEN);
        assert_eq!(result.root.item, ids::HYDROGEN);
        assert!(close(result.root.machine_count, 2.0));
        let refined = result.statistics.item_statistics[&ids::REFINED_OIL];
        assert!(close(refined.net(), 60.0));

        let err = calculate_item(&data, recipes::GEAR, ids::HYDROGEN, 30.0, &early()).unwrap_err();
        assert!(matches!(err, CalcError::InvalidInput { .. }));
    }

    #[test]
    fn build_matches_calculated_tree() {
        let data = sample_catalog();
        let tree = build(&data, recipes::CIRCUIT_BOARD, 90.0, &early()).unwrap();
        let result = calculate(&data, recipes::CIRCUIT_BOARD, 90.0, &early()).unwrap();
        assert_eq!(tree, result.root);
    }

    #[test]
    fn recipe_loop_is_cut_at_repeat() {
        let data = sample_catalog();
        let mut snap = early();
        snap.global
            .recipe_choices
            .insert(ids::HYDROGEN, recipes::X_RAY_CRACKING);

        let result = calculate(&data, recipes::X_RAY_CRACKING, 30.0, &snap).unwrap();
        assert!(result.notices.contains(&Notice::CycleCut { item: ids::HYDROGEN }));

        let hydrogen = result
            .root
            .children
            .iter()
            .find(|c| c.item == ids::HYDROGEN)
            .unwrap();
        assert!(hydrogen.is_raw());
    }

    // -----------------------------------------------------------------------
    // Dyson sphere power
    // -----------------------------------------------------------------------

    #[test]
    fn ray_receiver_power_is_not_grid_demand() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::ANTIMATTER, 60.0, &early()).unwrap();

        let photon = result
            .root
            .children
            .iter()
            .find(|c| c.item == ids::CRITICAL_PHOTON)
            .unwrap();
        assert!(photon.power.dyson_sphere > 0.0);
        assert_eq!(photon.power.machines, 0.0);
        assert!(result.total_power.dyson_sphere > 0.0);
        assert!(close(
            result.required_power(),
            result.total_power.machines + result.total_power.sorters
        ));
    }

    #[test]
    fn summary_lists_raw_inputs_and_byproducts() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::PLASMA_REFINING, 60.0, &early()).unwrap();
        let summary = summarize(&result, &data);

        assert_eq!(summary.target, "Refined Oil");
        assert_eq!(summary.raw_inputs, vec![("Crude Oil".to_string(), 60.0)]);
        assert_eq!(summary.byproducts.len(), 1);
        assert_eq!(summary.byproducts[0].0, "Hydrogen");

        let text = summary.to_string();
        assert!(text.contains("Oil Refinery"));
        assert!(text.contains("Required:"));
    }

    #[test]
    fn tree_format_marks_raw_inputs() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::GEAR, 60.0, &early()).unwrap();
        let text = format_production_chain(&result.root, &data, 0);
        assert!(text.contains("Iron Ore @ 60.00/min (raw input)"));
        assert!(text.starts_with("1.33x Assembling Machine Mk.I [Gear]"));
    }
}
