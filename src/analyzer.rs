//! Bottleneck detection and what-if comparison
//!
//! Works on finished [`CalculationResult`] snapshots. Anything that needs a
//! different setting is evaluated by running the calculator again with a
//! patched copy of the settings; results are never edited in place.

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::calculator::{alternatives, calculate, calculate_item};
use crate::catalog::GameData;
use crate::error::{CalcError, CalcResult};
use crate::models::{CalculationResult, ItemId, NodeKey, ProductionNode, RecipeId};
use crate::settings::{
    BeltSetting, BeltTier, ProliferatorMode, ProliferatorTier, SettingsPatch, SettingsSnapshot,
    SettingsTemplate, MAX_BELT_STACK,
};

/// Belt load at which a node is first reported.
pub const SATURATION_LOW: f64 = 0.8;
pub const SATURATION_MEDIUM: f64 = 0.9;
pub const SATURATION_HIGH: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BottleneckKind {
    BeltSaturation { saturation: f64 },
    MissingProliferator { current: ProliferatorTier },
}

/// What to do about a bottleneck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Fix {
    Patch { patch: SettingsPatch },
    /// No available setting resolves it; must be reported to the caller.
    Unresolvable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub severity: Severity,
    pub kind: BottleneckKind,
    pub description: String,
    pub node: NodeKey,
    pub fix: Fix,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Objective {
    MinimizePower,
    MinimizeFacilities,
    /// Fewest raw materials per unit of target output.
    MaximizeEfficiency,
    #[default]
    Balanced,
}

impl Objective {
    /// Used when two scenarios score exactly the same.
    fn secondary(self) -> Objective {
        match self {
            Objective::MinimizeFacilities => Objective::MinimizePower,
            _ => Objective::MinimizeFacilities,
        }
    }
}

impl std::str::FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "power" | "minimizepower" => Ok(Objective::MinimizePower),
            "facilities" | "machines" | "minimizefacilities" => Ok(Objective::MinimizeFacilities),
            "efficiency" | "maximizeefficiency" => Ok(Objective::MaximizeEfficiency),
            "balanced" => Ok(Objective::Balanced),
            _ => Err(format!("unknown objective '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub belt_capacity_per_min: f64,
    pub objective: Objective,
}

impl AnalysisOptions {
    /// Options matching the settings a result was computed with.
    pub fn for_result(result: &CalculationResult) -> Self {
        Self {
            belt_capacity_per_min: result.settings.global.belt.capacity_per_min(),
            objective: Objective::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// The aggregate numbers objectives are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub power_kw: f64,
    pub machines: f64,
    /// Raw input items consumed per target item produced.
    pub raw_per_output: f64,
}

impl Metrics {
    pub fn of(result: &CalculationResult) -> Self {
        let mut raw = 0.0;
        result.root.walk(&mut |n| {
            if n.is_raw() {
                raw += n.rate_per_min;
            }
        });
        Self {
            power_kw: result.statistics.total_power,
            machines: result.statistics.total_machines,
            raw_per_output: raw / result.target_rate,
        }
    }

    /// Lower is better. `reference` normalizes the balanced objective.
    pub fn score(&self, objective: Objective, reference: &Metrics) -> f64 {
        match objective {
            Objective::MinimizePower => self.power_kw,
            Objective::MinimizeFacilities => self.machines,
            Objective::MaximizeEfficiency => self.raw_per_output,
            Objective::Balanced => {
                self.power_kw / reference.power_kw.max(f64::EPSILON)
                    + self.machines / reference.machines.max(f64::EPSILON)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Scan a result for saturated belts and an under-used proliferator.
///
/// `data` is needed to test whether a proliferator upgrade actually helps.
pub fn analyze(
    data: &GameData,
    result: &CalculationResult,
    options: &AnalysisOptions,
) -> CalcResult<Vec<Bottleneck>> {
    if !options.belt_capacity_per_min.is_finite() || options.belt_capacity_per_min <= 0.0 {
        return Err(CalcError::InvalidInput {
            detail: format!(
                "belt capacity must be positive, got {}",
                options.belt_capacity_per_min
            ),
        });
    }

    let mut bottlenecks = Vec::new();
    let current_belt = result.settings.global.belt;
    result.root.walk(&mut |node| {
        if let Some(b) = belt_bottleneck(node, options.belt_capacity_per_min, current_belt) {
            bottlenecks.push(b);
        }
    });

    if let Some(b) = proliferator_bottleneck(data, result, options.objective)? {
        bottlenecks.push(b);
    }

    bottlenecks.sort_by(|a, b| b.severity.cmp(&a.severity));
    Ok(bottlenecks)
}

fn belt_bottleneck(
    node: &ProductionNode,
    capacity: f64,
    current: BeltSetting,
) -> Option<Bottleneck> {
    let saturation = node.rate_per_min / capacity;
    let severity = if saturation >= SATURATION_HIGH {
        Severity::High
    } else if saturation >= SATURATION_MEDIUM {
        Severity::Medium
    } else if saturation >= SATURATION_LOW {
        Severity::Low
    } else {
        return None;
    };

    let fix = match smallest_belt_for(node.rate_per_min, current) {
        // the configured belt already carries it; only the analyzed capacity is short
        Some(belt) if belt == current => Fix::Unresolvable {
            reason: format!(
                "{} already fits the configured {:.0}/min belt; analyzed capacity is {:.0}/min",
                node.label,
                current.capacity_per_min(),
                capacity
            ),
        },
        Some(belt) => Fix::Patch {
            patch: SettingsPatch {
                belt_tier: Some(belt.tier),
                belt_stack: Some(belt.stack),
                ..Default::default()
            },
        },
        None => Fix::Unresolvable {
            reason: format!(
                "{:.1}/min exceeds the fastest belt for {}",
                node.rate_per_min, node.label
            ),
        },
    };

    Some(Bottleneck {
        severity,
        kind: BottleneckKind::BeltSaturation { saturation },
        description: format!(
            "{} output belt at {:.0}% ({:.1}/min)",
            node.label,
            saturation * 100.0,
            node.rate_per_min
        ),
        node: node.key.clone(),
        fix,
    })
}

/// The lowest-capacity belt, no worse than `current`, that keeps `rate`
/// under the reporting threshold.
fn smallest_belt_for(rate: f64, current: BeltSetting) -> Option<BeltSetting> {
    let mut options: Vec<BeltSetting> = BeltTier::ALL
        .into_iter()
        .filter(|t| *t >= current.tier)
        .flat_map(|tier| (current.stack..=MAX_BELT_STACK).map(move |stack| BeltSetting { tier, stack }))
        .collect();
    options.sort_by(|a, b| {
        a.capacity_per_min()
            .total_cmp(&b.capacity_per_min())
            .then(a.tier.cmp(&b.tier))
    });
    options
        .into_iter()
        .find(|b| rate < b.capacity_per_min() * SATURATION_LOW)
}

fn proliferator_bottleneck(
    data: &GameData,
    result: &CalculationResult,
    objective: Objective,
) -> CalcResult<Option<Bottleneck>> {
    let current = result.settings.global.proliferator;
    if current.tier >= ProliferatorTier::MAX {
        return Ok(None);
    }

    let baseline = Metrics::of(result);
    let baseline_score = baseline.score(objective, &baseline);

    let mut best: Option<(SettingsPatch, f64)> = None;
    for mode in [current.mode, other_mode(current.mode)] {
        let patch = SettingsPatch {
            proliferator_tier: Some(ProliferatorTier::MAX),
            proliferator_mode: Some(mode),
            ..Default::default()
        };
        let next = patch.apply(&result.settings)?;
        let candidate = match calculate_item(
            data,
            result.target_recipe,
            result.target_item,
            result.target_rate,
            &next,
        ) {
            Ok(c) => c,
            // a node override may forbid this mode; the other mode may still work
            Err(CalcError::CapabilityViolation { .. }) => continue,
            Err(e) => return Err(e),
        };
        let score = Metrics::of(&candidate).score(objective, &baseline);
        if score < baseline_score && best.as_ref().is_none_or(|(_, s)| score < *s) {
            best = Some((patch, score));
        }
    }

    Ok(best.map(|(patch, _)| Bottleneck {
        severity: Severity::Medium,
        kind: BottleneckKind::MissingProliferator {
            current: current.tier,
        },
        description: format!(
            "proliferator {:?} is below {:?}; upgrading improves {:?}",
            current.tier,
            ProliferatorTier::MAX,
            objective
        ),
        node: result.root.key.clone(),
        fix: Fix::Patch { patch },
    }))
}

fn other_mode(mode: ProliferatorMode) -> ProliferatorMode {
    match mode {
        ProliferatorMode::Speed => ProliferatorMode::Production,
        ProliferatorMode::Production => ProliferatorMode::Speed,
    }
}

// ---------------------------------------------------------------------------
// Fixes
// ---------------------------------------------------------------------------

/// The suggested fix for each bottleneck, in the same order.
pub fn suggest_fixes(bottlenecks: &[Bottleneck]) -> Vec<Fix> {
    bottlenecks.iter().map(|b| b.fix.clone()).collect()
}

/// Merge every fix into one patch and apply it as a single update.
///
/// Either all fixes apply or none do: unresolvable or conflicting fixes are
/// collected into [`CalcError::FixesRejected`] and the input is untouched.
pub fn apply_fixes(snapshot: &SettingsSnapshot, fixes: &[Fix]) -> CalcResult<SettingsSnapshot> {
    let mut merged = SettingsPatch::default();
    let mut rejected = Vec::new();

    for fix in fixes {
        match fix {
            Fix::Patch { patch } => {
                if let Err(reason) = merge_patch(&mut merged, patch) {
                    rejected.push(reason);
                }
            }
            Fix::Unresolvable { reason } => rejected.push(reason.clone()),
        }
    }

    if !rejected.is_empty() {
        for reason in &rejected {
            warn!("fix rejected: {reason}");
        }
        return Err(CalcError::FixesRejected(rejected));
    }

    merged
        .apply(snapshot)
        .map_err(|e| CalcError::FixesRejected(vec![e.to_string()]))
}

/// Union of two patches. Tiers take the higher value; differing
/// proliferator modes or node overrides conflict.
fn merge_patch(into: &mut SettingsPatch, patch: &SettingsPatch) -> Result<(), String> {
    if let (Some(a), Some(b)) = (into.proliferator_mode, patch.proliferator_mode) {
        if a != b {
            return Err(format!("conflicting proliferator modes {a:?} and {b:?}"));
        }
    }
    for (key, o) in &patch.node_overrides {
        if let Some(existing) = into.node_overrides.get(key) {
            if existing != o {
                return Err(format!("conflicting overrides for node {key}"));
            }
        }
    }

    into.proliferator_tier = into.proliferator_tier.max(patch.proliferator_tier);
    into.proliferator_mode = into.proliferator_mode.or(patch.proliferator_mode);
    into.belt_tier = into.belt_tier.max(patch.belt_tier);
    into.belt_stack = into.belt_stack.max(patch.belt_stack);
    into.sorter = into.sorter.max(patch.sorter);
    for (category, rank) in &patch.machine_ranks {
        let entry = into.machine_ranks.entry(*category).or_insert(*rank);
        *entry = (*entry).max(*rank);
    }
    for (key, o) in &patch.node_overrides {
        into.node_overrides.insert(key.clone(), *o);
    }
    Ok(())
}

/// Outcome of fixing every bottleneck in one step.
#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub settings: SettingsSnapshot,
    pub result: CalculationResult,
    pub fixed: Vec<Bottleneck>,
}

/// Analyze, apply every suggested fix atomically, and recalculate.
pub fn fix_all(
    data: &GameData,
    result: &CalculationResult,
    options: &AnalysisOptions,
) -> CalcResult<FixOutcome> {
    let bottlenecks = analyze(data, result, options)?;
    let fixes = suggest_fixes(&bottlenecks);
    let settings = apply_fixes(&result.settings, &fixes)?;
    let recalculated = calculate_item(
        data,
        result.target_recipe,
        result.target_item,
        result.target_rate,
        &settings,
    )?;

    info!(
        "applied {} fix(es): {} -> {}",
        bottlenecks.len(),
        crate::power::format_power(result.required_power()),
        crate::power::format_power(recalculated.required_power())
    );

    Ok(FixOutcome {
        settings,
        result: recalculated,
        fixed: bottlenecks,
    })
}

// ---------------------------------------------------------------------------
// Scenario ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub patch: SettingsPatch,
}

/// One scenario per settings template.
pub fn template_scenarios() -> Vec<Scenario> {
    SettingsTemplate::ALL
        .into_iter()
        .map(|t| Scenario {
            name: t.name().to_string(),
            patch: SettingsPatch::from_template(t),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedScenario {
    pub name: String,
    pub recipe: RecipeId,
    pub patch: SettingsPatch,
    pub metrics: Metrics,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub objective: Objective,
    /// Best first.
    pub ranked: Vec<RankedScenario>,
    /// Scenarios whose settings could not be evaluated, with the reason.
    pub rejected: Vec<(String, String)>,
}

/// Evaluate every candidate against `base` and order them by `objective`.
///
/// Ties on the objective fall back to a secondary objective, then to the
/// order the candidates were given in.
pub fn rank_scenarios(
    data: &GameData,
    recipe: RecipeId,
    rate_per_min: f64,
    base: &SettingsSnapshot,
    candidates: &[Scenario],
    objective: Objective,
) -> CalcResult<Ranking> {
    check_rate(rate_per_min)?;

    let mut evaluated = Vec::new();
    let mut rejected = Vec::new();

    for scenario in candidates {
        let outcome = scenario
            .patch
            .apply(base)
            .and_then(|settings| calculate(data, recipe, rate_per_min, &settings));
        match outcome {
            Ok(result) => evaluated.push(RankedScenario {
                name: scenario.name.clone(),
                recipe,
                patch: scenario.patch.clone(),
                metrics: Metrics::of(&result),
                score: 0.0,
            }),
            Err(e) => rejected.push((scenario.name.clone(), e.to_string())),
        }
    }

    Ok(order(evaluated, rejected, objective))
}

/// Rank every recipe that makes `item`, all under the same settings.
pub fn rank_alternatives(
    data: &GameData,
    item: ItemId,
    rate_per_min: f64,
    settings: &SettingsSnapshot,
    objective: Objective,
) -> CalcResult<Ranking> {
    check_rate(rate_per_min)?;

    let recipes = alternatives(data, item);
    if recipes.is_empty() {
        return Err(CalcError::InvalidInput {
            detail: format!("no recipe produces {}", data.item_name(item)),
        });
    }

    let mut evaluated = Vec::new();
    let mut rejected = Vec::new();
    for recipe in recipes {
        match calculate_item(data, recipe, item, rate_per_min, settings) {
            Ok(result) => evaluated.push(RankedScenario {
                name: data.recipe_name(recipe),
                recipe,
                patch: SettingsPatch::default(),
                metrics: Metrics::of(&result),
                score: 0.0,
            }),
            Err(e) => rejected.push((data.recipe_name(recipe), e.to_string())),
        }
    }

    Ok(order(evaluated, rejected, objective))
}

fn check_rate(rate_per_min: f64) -> CalcResult<()> {
    if rate_per_min.is_finite() && rate_per_min >= 0.0 {
        Ok(())
    } else {
        Err(CalcError::InvalidInput {
            detail: format!("target rate must be a finite value >= 0, got {rate_per_min}"),
        })
    }
}

/// Score against the best value of each metric and sort. The sort is
/// stable, so full ties keep the given order.
fn order(
    mut evaluated: Vec<RankedScenario>,
    rejected: Vec<(String, String)>,
    objective: Objective,
) -> Ranking {
    let reference = Metrics {
        power_kw: min_of(evaluated.iter().map(|r| r.metrics.power_kw)),
        machines: min_of(evaluated.iter().map(|r| r.metrics.machines)),
        raw_per_output: min_of(evaluated.iter().map(|r| r.metrics.raw_per_output)),
    };
    let secondary = objective.secondary();

    for r in &mut evaluated {
        r.score = r.metrics.score(objective, &reference);
    }
    evaluated.sort_by(|a, b| {
        a.score.total_cmp(&b.score).then_with(|| {
            a.metrics
                .score(secondary, &reference)
                .total_cmp(&b.metrics.score(secondary, &reference))
        })
    });

    Ranking {
        objective,
        ranked: evaluated,
        rejected,
    }
}

fn min_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::INFINITY, f64::min)
}

impl Ranking {
    pub fn best(&self) -> Option<&RankedScenario> {
        self.ranked.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ids, recipes, sample_catalog};
    use crate::settings::{NodeOverride, ProliferatorSetting, SorterTier};

    fn snapshot(template: SettingsTemplate) -> SettingsSnapshot {
        SettingsSnapshot::new(template.settings())
    }

    // -----------------------------------------------------------------------
    // Belt saturation
    // -----------------------------------------------------------------------

    #[test]
    fn light_load_has_no_belt_bottleneck() {
        let data = sample_catalog();
        let result = calculate(&data, recipes::IRON_INGOT, 60.0, &snapshot(SettingsTemplate::EarlyGame)).unwrap();
        let found = analyze(&data, &result, &AnalysisOptions::for_result(&result)).unwrap();
        assert!(found
            .iter()
            .all(|b| !matches!(b.kind, BottleneckKind::BeltSaturation { .. })));
    }

    #[test]
    fn severity_escalates_with_load() {
        let data = sample_catalog();
        let snap = snapshot(SettingsTemplate::EarlyGame);
        let cases = [
            (300.0, Severity::Low),
            (330.0, Severity::Medium),
            (400.0, Severity::High),
        ];
        for (rate, expected) in cases {
            let result = calculate(&data, recipes::IRON_INGOT, rate, &snap).unwrap();
            let found = analyze(&data, &result, &AnalysisOptions::for_result(&result)).unwrap();
            let root = found
                .iter()
                .find(|b| {
                    b.node == result.root.key
                        && matches!(b.kind, BottleneckKind::BeltSaturation { .. })
                })
                .expect("root belt flagged");
            assert_eq!(root.severity, expected, "rate {rate}");
        }
    }

    #[test]
    fn belt_fix_picks_smallest_sufficient_belt() {
        let current = BeltSetting {
            tier: BeltTier::Mk1,
            stack: 1,
        };
        // 500/min needs > 625/min of capacity
        let belt = smallest_belt_for(500.0, current).unwrap();
        assert_eq!(belt.capacity_per_min(), 720.0);
        assert!(smallest_belt_for(1e6, current).is_none());
    }

    #[test]
    fn belt_fix_never_downgrades() {
        let current = BeltSetting {
            tier: BeltTier::Mk3,
            stack: 2,
        };
        let belt = smallest_belt_for(10.0, current).unwrap();
        assert_eq!(belt, current);
    }

    // -----------------------------------------------------------------------
    // Proliferator
    // -----------------------------------------------------------------------

    #[test]
    fn max_proliferator_is_never_flagged() {
        let data = sample_catalog();
        let result =
            calculate(&data, recipes::CIRCUIT_BOARD, 60.0, &snapshot(SettingsTemplate::EndGame)).unwrap();
        let found = analyze(&data, &result, &AnalysisOptions::for_result(&result)).unwrap();
        assert!(found
            .iter()
            .all(|b| !matches!(b.kind, BottleneckKind::MissingProliferator { .. })));
    }

    #[test]
    fn missing_proliferator_flagged_for_facility_objective() {
        let data = sample_catalog();
        let result =
            calculate(&data, recipes::CIRCUIT_BOARD, 60.0, &snapshot(SettingsTemplate::EarlyGame)).unwrap();
        let options = AnalysisOptions {
            belt_capacity_per_min: 1e9,
            objective: Objective::MinimizeFacilities,
        };
        let found = analyze(&data, &result, &options).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Medium);
        let Fix::Patch { patch } = &found[0].fix else {
            panic!("expected a patch");
        };
        assert_eq!(patch.proliferator_tier, Some(ProliferatorTier::Mk3));
        assert_eq!(patch.proliferator_mode, Some(ProliferatorMode::Speed));
    }

    #[test]
    fn efficiency_objective_prefers_production_mode() {
        let data = sample_catalog();
        let result =
            calculate(&data, recipes::CIRCUIT_BOARD, 60.0, &snapshot(SettingsTemplate::EarlyGame)).unwrap();
        let options = AnalysisOptions {
            belt_capacity_per_min: 1e9,
            objective: Objective::MaximizeEfficiency,
        };
        let found = analyze(&data, &result, &options).unwrap();
        let Fix::Patch { patch } = &found[0].fix else {
            panic!("expected a patch");
        };
        assert_eq!(patch.proliferator_mode, Some(ProliferatorMode::Production));
    }

    #[test]
    fn rejects_nonpositive_capacity() {
        let data = sample_catalog();
        let result =
            calculate(&data, recipes::GEAR, 60.0, &snapshot(SettingsTemplate::EarlyGame)).unwrap();
        let options = AnalysisOptions {
            belt_capacity_per_min: 0.0,
            objective: Objective::Balanced,
        };
        assert!(matches!(
            analyze(&data, &result, &options),
            Err(CalcError::InvalidInput { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Applying fixes
    // -----------------------------------------------------------------------

    #[test]
    fn fix_all_clears_every_bottleneck() {
        let data = sample_catalog();
        let mut snap = snapshot(SettingsTemplate::EarlyGame);
        snap.global.proliferator = ProliferatorSetting {
            tier: ProliferatorTier::Mk1,
            mode: ProliferatorMode::Speed,
        };
        let result = calculate(&data, recipes::IRON_INGOT, 600.0, &snap).unwrap();
        let options = AnalysisOptions::for_result(&result);
        assert!(!analyze(&data, &result, &options).unwrap().is_empty());

        let outcome = fix_all(&data, &result, &options).unwrap();
        let after = analyze(&data, &outcome.result, &AnalysisOptions::for_result(&outcome.result)).unwrap();
        assert!(after.is_empty(), "remaining: {after:?}");
        assert_eq!(outcome.settings.global.proliferator.tier, ProliferatorTier::MAX);
        let capacity = outcome.settings.global.belt.capacity_per_min();
        assert!(600.0 / capacity < SATURATION_LOW);
    }

    #[test]
    fn unresolvable_fix_rejects_the_whole_batch() {
        let base = snapshot(SettingsTemplate::EarlyGame);
        let fixes = vec![
            Fix::Patch {
                patch: SettingsPatch {
                    belt_tier: Some(BeltTier::Mk2),
                    ..Default::default()
                },
            },
            Fix::Unresolvable {
                reason: "too fast".to_string(),
            },
        ];
        assert_eq!(
            apply_fixes(&base, &fixes).unwrap_err(),
            CalcError::FixesRejected(vec!["too fast".to_string()])
        );
    }

    #[test]
    fn conflicting_modes_are_reported() {
        let base = snapshot(SettingsTemplate::EarlyGame);
        let speed = SettingsPatch {
            proliferator_mode: Some(ProliferatorMode::Speed),
            ..Default::default()
        };
        let production = SettingsPatch {
            proliferator_mode: Some(ProliferatorMode::Production),
            ..Default::default()
        };
        let err = apply_fixes(
            &base,
            &[Fix::Patch { patch: speed }, Fix::Patch { patch: production }],
        )
        .unwrap_err();
        assert!(matches!(err, CalcError::FixesRejected(ref r) if r.len() == 1));
    }

    #[test]
    fn merged_patches_take_the_stronger_value() {
        let base = snapshot(SettingsTemplate::EarlyGame);
        let a = SettingsPatch {
            belt_tier: Some(BeltTier::Mk2),
            belt_stack: Some(4),
            ..Default::default()
        };
        let b = SettingsPatch {
            belt_tier: Some(BeltTier::Mk3),
            belt_stack: Some(1),
            sorter: Some(SorterTier::Mk3),
            ..Default::default()
        };
        let next = apply_fixes(&base, &[Fix::Patch { patch: a }, Fix::Patch { patch: b }]).unwrap();
        assert_eq!(next.global.belt.tier, BeltTier::Mk3);
        assert_eq!(next.global.belt.stack, 4);
        assert_eq!(next.global.sorter, SorterTier::Mk3);
    }

    // -----------------------------------------------------------------------
    // Ranking
    // -----------------------------------------------------------------------

    #[test]
    fn facility_ranking_puts_end_game_first() {
        let data = sample_catalog();
        let base = snapshot(SettingsTemplate::EarlyGame);
        let ranking = rank_scenarios(
            &data,
            recipes::CIRCUIT_BOARD,
            120.0,
            &base,
            &template_scenarios(),
            Objective::MinimizeFacilities,
        )
        .unwrap();

        assert_eq!(ranking.ranked.len(), 5);
        assert!(ranking.rejected.is_empty());
        assert_eq!(ranking.best().unwrap().name, "endGame");
        for pair in ranking.ranked.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
    }

    #[test]
    fn ties_keep_declaration_order() {
        let data = sample_catalog();
        let base = snapshot(SettingsTemplate::MidGame);
        let same = SettingsPatch::default();
        let candidates = vec![
            Scenario {
                name: "first".to_string(),
                patch: same.clone(),
            },
            Scenario {
                name: "second".to_string(),
                patch: same,
            },
        ];
        let ranking = rank_scenarios(
            &data,
            recipes::GEAR,
            60.0,
            &base,
            &candidates,
            Objective::MinimizePower,
        )
        .unwrap();
        let names: Vec<_> = ranking.ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn invalid_candidate_is_reported_not_dropped() {
        let data = sample_catalog();
        let base = snapshot(SettingsTemplate::MidGame);
        let candidates = vec![Scenario {
            name: "broken".to_string(),
            patch: SettingsPatch {
                belt_stack: Some(0),
                ..Default::default()
            },
        }];
        let ranking = rank_scenarios(
            &data,
            recipes::GEAR,
            60.0,
            &base,
            &candidates,
            Objective::Balanced,
        )
        .unwrap();
        assert!(ranking.ranked.is_empty());
        assert_eq!(ranking.rejected.len(), 1);
        assert_eq!(ranking.rejected[0].0, "broken");
    }

    #[test]
    fn ranks_alternative_recipes_for_an_item() {
        let data = sample_catalog();
        let ranking = rank_alternatives(
            &data,
            ids::GRAPHENE,
            60.0,
            &snapshot(SettingsTemplate::EarlyGame),
            Objective::MaximizeEfficiency,
        )
        .unwrap();

        // fire ice: 1 raw per graphene, coal route: 3
        let order: Vec<_> = ranking.ranked.iter().map(|r| r.recipe).collect();
        assert_eq!(order, vec![recipes::GRAPHENE_FROM_ICE, recipes::GRAPHENE]);
        assert_eq!(ranking.ranked[0].name, "Graphene (Fire Ice)");
        assert!((ranking.ranked[1].metrics.raw_per_output - 3.0).abs() < 1e-9);
    }

    #[test]
    fn raw_items_have_no_alternatives() {
        let data = sample_catalog();
        let err = rank_alternatives(
            &data,
            ids::IRON_ORE,
            60.0,
            &snapshot(SettingsTemplate::EarlyGame),
            Objective::Balanced,
        )
        .unwrap_err();
        assert!(matches!(err, CalcError::InvalidInput { .. }));
    }

    #[test]
    fn bad_rate_is_rejected_once() {
        let data = sample_catalog();
        let base = snapshot(SettingsTemplate::MidGame);
        for rate in [-1.0, f64::NAN, f64::INFINITY] {
            let err = rank_scenarios(
                &data,
                recipes::GEAR,
                rate,
                &base,
                &template_scenarios(),
                Objective::Balanced,
            )
            .unwrap_err();
            assert!(matches!(err, CalcError::InvalidInput { .. }), "rate {rate}");
        }
    }

    // -----------------------------------------------------------------------
    // Capacity and overrides
    // -----------------------------------------------------------------------

    #[test]
    fn analyzed_capacity_below_configured_belt_is_unresolvable() {
        let data = sample_catalog();
        // Mk3 x4 belt already carries 300/min; only the analyzed 360/min is short
        let result =
            calculate(&data, recipes::IRON_INGOT, 300.0, &snapshot(SettingsTemplate::EndGame)).unwrap();
        let options = AnalysisOptions {
            belt_capacity_per_min: 360.0,
            objective: Objective::Balanced,
        };

        let found = analyze(&data, &result, &options).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|b| matches!(b.fix, Fix::Unresolvable { .. })));

        let err = fix_all(&data, &result, &options).unwrap_err();
        assert!(matches!(err, CalcError::FixesRejected(ref r) if r.len() == 2));
    }

    #[test]
    fn upgrade_that_hurts_the_objective_is_not_flagged() {
        let data = sample_catalog();
        // speed raises draw by 25%, production by ~90%
        let result =
            calculate(&data, recipes::IRON_INGOT, 60.0, &snapshot(SettingsTemplate::EarlyGame)).unwrap();
        assert!(result.settings.global.proliferator.tier < ProliferatorTier::MAX);
        let options = AnalysisOptions {
            belt_capacity_per_min: 1e9,
            objective: Objective::MinimizePower,
        };
        assert!(analyze(&data, &result, &options).unwrap().is_empty());
    }

    #[test]
    fn fix_all_keeps_node_overrides() {
        let data = sample_catalog();
        let mut snap = snapshot(SettingsTemplate::EarlyGame);
        snap.global.proliferator = ProliferatorSetting {
            tier: ProliferatorTier::Mk1,
            mode: ProliferatorMode::Speed,
        };
        let smelting = NodeKey::root(recipes::GEAR).child(recipes::IRON_INGOT);
        let plane = NodeOverride {
            machine_rank: Some(2),
            ..Default::default()
        };
        snap.overrides.insert(smelting.clone(), plane);

        let result = calculate(&data, recipes::GEAR, 500.0, &snap).unwrap();
        let options = AnalysisOptions::for_result(&result);
        assert!(!analyze(&data, &result, &options).unwrap().is_empty());

        let outcome = fix_all(&data, &result, &options).unwrap();
        assert_eq!(outcome.settings.overrides.get(&smelting), Some(&plane));
        let node = outcome.result.root.find(&smelting).unwrap();
        assert_eq!(node.machine_name.as_deref(), Some("Plane Smelter"));

        let after = analyze(&data, &outcome.result, &AnalysisOptions::for_result(&outcome.result)).unwrap();
        assert!(after.is_empty(), "remaining: {after:?}");
    }
}
