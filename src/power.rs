//! Power generation planning
//!
//! Maps a grid power requirement onto generators. Generator and fuel data
//! are static registries; [`allocate`] is a pure function of its inputs and
//! those tables.
//!
//! # Model
//!
//! - A generator delivers `base_output_kw * operating_rate * fuel multiplier`
//!   per unit. Variable sources (wind, solar, geothermal) use a fixed
//!   long-run average as their operating rate.
//! - Unit counts are whole numbers, rounded up so that supply covers demand.
//! - Fuel is burned at the full-load draw of every unit.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CalcError, CalcResult};
use crate::models::ItemId;

/// Ceiling on generator units before a request is reported as out of range.
const MAX_UNITS: f64 = 1e15;

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FuelCategory {
    Chemical,
    Fusion,
    Antimatter,
}

impl fmt::Display for FuelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FuelCategory::Chemical => "chemical",
            FuelCategory::Fusion => "fusion",
            FuelCategory::Antimatter => "antimatter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSpec {
    pub key: &'static str,
    pub display_key: &'static str,
    /// Nominal full-rate output per unit, kW.
    pub base_output_kw: f64,
    /// Output / fuel energy drawn. Ignored for fuel-less generators.
    pub efficiency: f64,
    /// Empty when the generator needs no fuel.
    pub fuel_categories: &'static [FuelCategory],
    /// Long-run fraction of nominal output actually delivered, 0..=1.
    pub operating_rate: f64,
    pub variable_output: bool,
}

impl GeneratorSpec {
    pub fn needs_fuel(&self) -> bool {
        !self.fuel_categories.is_empty()
    }

    pub fn accepts(&self, fuel: &FuelSpec) -> bool {
        self.fuel_categories.contains(&fuel.category)
    }

    /// Fuel energy drawn per unit at full load, kW.
    pub fn fuel_draw_kw(&self) -> f64 {
        if self.needs_fuel() {
            self.base_output_kw / self.efficiency
        } else {
            0.0
        }
    }

    /// Output one unit delivers with the given fuel, kW.
    pub fn effective_output_kw(&self, fuel: Option<&FuelSpec>) -> f64 {
        let multiplier = fuel.map_or(1.0, |f| f.output_multiplier);
        self.base_output_kw * self.operating_rate * multiplier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelSpec {
    pub key: &'static str,
    pub item_id: ItemId,
    pub category: FuelCategory,
    /// Energy per item, MJ.
    pub energy_mj: f64,
    /// Output boost granted when burned in a fuel chamber.
    pub output_multiplier: f64,
}

pub static GENERATORS: &[GeneratorSpec] = &[
    GeneratorSpec {
        key: "windTurbine",
        display_key: "Wind Turbine",
        base_output_kw: 300.0,
        efficiency: 1.0,
        fuel_categories: &[],
        operating_rate: 0.75,
        variable_output: true,
    },
    GeneratorSpec {
        key: "solarPanel",
        display_key: "Solar Panel",
        base_output_kw: 360.0,
        efficiency: 1.0,
        fuel_categories: &[],
        operating_rate: 0.5,
        variable_output: true,
    },
    GeneratorSpec {
        key: "geothermalPowerStation",
        display_key: "Geothermal Power Station",
        base_output_kw: 4800.0,
        efficiency: 1.0,
        fuel_categories: &[],
        operating_rate: 0.5,
        variable_output: true,
    },
    GeneratorSpec {
        key: "thermalPowerPlant",
        display_key: "Thermal Power Plant",
        base_output_kw: 2160.0,
        efficiency: 0.8,
        fuel_categories: &[FuelCategory::Chemical],
        operating_rate: 1.0,
        variable_output: false,
    },
    GeneratorSpec {
        key: "miniFusionPowerPlant",
        display_key: "Mini Fusion Power Plant",
        base_output_kw: 9000.0,
        efficiency: 1.0,
        fuel_categories: &[FuelCategory::Fusion],
        operating_rate: 1.0,
        variable_output: false,
    },
    GeneratorSpec {
        key: "artificialStar",
        display_key: "Artificial Star",
        base_output_kw: 72000.0,
        efficiency: 1.0,
        fuel_categories: &[FuelCategory::Antimatter],
        operating_rate: 1.0,
        variable_output: false,
    },
];

/// Declaration order is the auto-pick order within a category.
pub static FUELS: &[FuelSpec] = &[
    FuelSpec {
        key: "coal",
        item_id: 1006,
        category: FuelCategory::Chemical,
        energy_mj: 2.7,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "energeticGraphite",
        item_id: 1109,
        category: FuelCategory::Chemical,
        energy_mj: 6.3,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "refinedOil",
        item_id: 1114,
        category: FuelCategory::Chemical,
        energy_mj: 4.0,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "hydrogen",
        item_id: 1120,
        category: FuelCategory::Chemical,
        energy_mj: 8.0,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "combustibleUnit",
        item_id: 1128,
        category: FuelCategory::Chemical,
        energy_mj: 9.0,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "deuteronFuelRod",
        item_id: 1802,
        category: FuelCategory::Fusion,
        energy_mj: 600.0,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "antimatterFuelRod",
        item_id: 1803,
        category: FuelCategory::Antimatter,
        energy_mj: 7500.0,
        output_multiplier: 1.0,
    },
    FuelSpec {
        key: "strangeAnnihilationFuelRod",
        item_id: 1804,
        category: FuelCategory::Antimatter,
        energy_mj: 15000.0,
        output_multiplier: 2.0,
    },
];

/// Generation templates, each an ordered preference list of generator keys.
pub static POWER_TEMPLATES: &[(&str, &[&str])] = &[
    ("earlyGame", &["thermalPowerPlant", "windTurbine"]),
    ("midGame", &["thermalPowerPlant", "solarPanel", "windTurbine"]),
    (
        "lateGame",
        &["miniFusionPowerPlant", "thermalPowerPlant", "solarPanel"],
    ),
    ("endGame", &["artificialStar", "miniFusionPowerPlant"]),
    (
        "renewable",
        &["geothermalPowerStation", "solarPanel", "windTurbine"],
    ),
];

pub fn generator(key: &str) -> CalcResult<&'static GeneratorSpec> {
    GENERATORS
        .iter()
        .find(|g| g.key == key)
        .ok_or_else(|| CalcError::UnknownGenerator {
            key: key.to_string(),
        })
}

pub fn fuel(key: &str) -> CalcResult<&'static FuelSpec> {
    FUELS
        .iter()
        .find(|f| f.key == key)
        .ok_or_else(|| CalcError::UnknownFuel {
            key: key.to_string(),
        })
}

pub fn template(name: &str) -> CalcResult<&'static [&'static str]> {
    POWER_TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, list)| *list)
        .ok_or_else(|| CalcError::UnknownTemplate {
            name: name.to_string(),
        })
}

/// First registered fuel any of the generator's categories accepts.
pub fn default_fuel(generator: &GeneratorSpec) -> Option<&'static FuelSpec> {
    generator
        .fuel_categories
        .iter()
        .find_map(|cat| FUELS.iter().find(|f| f.category == *cat))
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// How generators are chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PowerPolicy {
    Template {
        name: String,
    },
    /// Use exactly this generator. Without a fuel the first compatible
    /// fuel is picked.
    Manual {
        generator: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fuel: Option<String>,
    },
}

impl Default for PowerPolicy {
    fn default() -> Self {
        PowerPolicy::Template {
            name: "endGame".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub generator: &'static GeneratorSpec,
    pub fuel: Option<&'static FuelSpec>,
    pub unit_count: u64,
    pub total_output_kw: f64,
    /// Fuel items per minute across all units.
    pub fuel_per_min: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerAllocation {
    pub required_kw: f64,
    pub allocations: Vec<Allocation>,
    pub total_units: u64,
    /// Fuel item id → items per minute.
    pub fuel_totals: BTreeMap<ItemId, f64>,
}

impl PowerAllocation {
    pub fn total_output_kw(&self) -> f64 {
        self.allocations.iter().map(|a| a.total_output_kw).sum()
    }
}

/// Pick the generator and fuel a policy resolves to.
pub fn resolve_policy(
    policy: &PowerPolicy,
) -> CalcResult<(&'static GeneratorSpec, Option<&'static FuelSpec>)> {
    match policy {
        PowerPolicy::Manual {
            generator: key,
            fuel: fuel_key,
        } => {
            let generator = generator(key)?;
            let fuel = match fuel_key {
                Some(fuel_key) => {
                    let fuel = fuel(fuel_key)?;
                    if !generator.accepts(fuel) {
                        return Err(CalcError::IncompatibleFuel {
                            generator: generator.key.to_string(),
                            fuel: fuel.key.to_string(),
                        });
                    }
                    Some(fuel)
                }
                None => auto_fuel(generator)?,
            };
            Ok((generator, fuel))
        }
        PowerPolicy::Template { name } => {
            let mut best: Option<(&'static GeneratorSpec, Option<&'static FuelSpec>, f64)> =
                None;
            for key in template(name)? {
                let generator = generator(key)?;
                let fuel = auto_fuel(generator)?;
                let output = generator.effective_output_kw(fuel);
                // strictly greater, so the earlier entry wins a tie
                if best.is_none_or(|(_, _, b)| output > b) {
                    best = Some((generator, fuel, output));
                }
            }
            best.map(|(g, f, _)| (g, f))
                .ok_or_else(|| CalcError::UnknownTemplate { name: name.clone() })
        }
    }
}

fn auto_fuel(generator: &GeneratorSpec) -> CalcResult<Option<&'static FuelSpec>> {
    if !generator.needs_fuel() {
        return Ok(None);
    }
    default_fuel(generator)
        .map(Some)
        .ok_or_else(|| CalcError::IncompatibleFuel {
            generator: generator.key.to_string(),
            fuel: "<none registered>".to_string(),
        })
}

/// Cover `required_kw` with generators chosen by `policy`.
pub fn allocate(required_kw: f64, policy: &PowerPolicy) -> CalcResult<PowerAllocation> {
    if !required_kw.is_finite() || required_kw < 0.0 {
        return Err(CalcError::InvalidInput {
            detail: format!("required power must be a finite value >= 0, got {required_kw}"),
        });
    }

    let (generator, fuel) = resolve_policy(policy)?;

    if required_kw == 0.0 {
        return Ok(PowerAllocation::default());
    }

    let per_unit = generator.effective_output_kw(fuel);
    let mut units = (required_kw / per_unit).ceil();
    // the division can round down onto an integer
    if units * per_unit < required_kw {
        units += 1.0;
    }
    if !units.is_finite() || units > MAX_UNITS {
        return Err(CalcError::OutOfRange {
            detail: format!(
                "{required_kw} kW needs more than {MAX_UNITS} units of {}",
                generator.key
            ),
        });
    }
    let unit_count = units as u64;

    // MJ/s at full load → items per minute
    let fuel_per_min = fuel.map_or(0.0, |f| {
        units * generator.fuel_draw_kw() / 1000.0 * 60.0 / f.energy_mj
    });

    debug!(
        "allocated {unit_count}x {} ({}) for {required_kw:.1} kW",
        generator.key,
        fuel.map_or("no fuel", |f| f.key)
    );

    let mut fuel_totals = BTreeMap::new();
    if let Some(f) = fuel {
        *fuel_totals.entry(f.item_id).or_insert(0.0) += fuel_per_min;
    }

    Ok(PowerAllocation {
        required_kw,
        allocations: vec![Allocation {
            generator,
            fuel,
            unit_count,
            total_output_kw: units * per_unit,
            fuel_per_min,
        }],
        total_units: unit_count,
        fuel_totals,
    })
}

/// Render a kW figure with the largest fitting unit, e.g. `1.1 MW`.
pub fn format_power(kw: f64) -> String {
    if !kw.is_finite() {
        return "n/a".to_string();
    }

    let (value, unit) = if kw.abs() >= 1_000_000.0 {
        (kw / 1_000_000.0, "GW")
    } else if kw.abs() >= 1000.0 {
        (kw / 1000.0, "MW")
    } else {
        (kw, "kW")
    };

    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {unit}")
}
