use dsp_calculator::models::PowerBreakdown;
use dsp_calculator::power::{POWER_TEMPLATES, PowerPolicy, allocate, format_power};
use proptest::prelude::*;

fn template(name: &str) -> PowerPolicy {
    PowerPolicy::Template {
        name: name.to_string(),
    }
}

fn manual(generator: &str, fuel: Option<&str>) -> PowerPolicy {
    PowerPolicy::Manual {
        generator: generator.to_string(),
        fuel: fuel.map(str::to_string),
    }
}

fn any_policy() -> impl Strategy<Value = PowerPolicy> {
    let templates: Vec<PowerPolicy> = POWER_TEMPLATES.iter().map(|(n, _)| template(n)).collect();
    let manuals = vec![
        manual("windTurbine", None),
        manual("thermalPowerPlant", Some("hydrogen")),
        manual("miniFusionPowerPlant", None),
        manual("artificialStar", Some("strangeAnnihilationFuelRod")),
    ];
    prop::sample::select(templates.into_iter().chain(manuals).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn allocation_covers_demand(kw in 0.0f64..1e9, policy in any_policy()) {
        let allocation = allocate(kw, &policy).unwrap();
        prop_assert!(allocation.total_output_kw() >= kw);
        let units: u64 = allocation.allocations.iter().map(|a| a.unit_count).sum();
        prop_assert_eq!(units, allocation.total_units);
    }

    #[test]
    fn more_demand_never_needs_fewer_units(
        a in 0.0f64..1e8,
        b in 0.0f64..1e8,
        policy in any_policy(),
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = allocate(lo, &policy).unwrap();
        let hi = allocate(hi, &policy).unwrap();
        prop_assert!(lo.total_units <= hi.total_units);
        let fuel = |p: &dsp_calculator::power::PowerAllocation| p.fuel_totals.values().sum::<f64>();
        prop_assert!(fuel(&lo) <= fuel(&hi));
    }

    #[test]
    fn formatting_never_panics(kw in prop::num::f64::ANY) {
        let s = format_power(kw);
        prop_assert!(!s.is_empty());
    }
}

#[test]
fn zero_demand_allocates_nothing_for_every_template() {
    for (name, _) in POWER_TEMPLATES {
        let allocation = allocate(0.0, &template(name)).unwrap();
        assert_eq!(allocation.total_units, 0);
        assert!(allocation.fuel_totals.values().all(|f| *f == 0.0));
    }
}

#[test]
fn dyson_power_is_not_grid_demand() {
    let power = PowerBreakdown {
        machines: 1000.0,
        sorters: 100.0,
        dyson_sphere: 500.0,
    };
    assert_eq!(power.required(), 1100.0);
    assert_eq!(format_power(power.required()), "1.1 MW");
}

#[test]
fn strange_rods_halve_fuel_for_the_same_star() {
    let antimatter = allocate(30_000.0, &template("endGame")).unwrap();
    let strange = allocate(
        30_000.0,
        &manual("artificialStar", Some("strangeAnnihilationFuelRod")),
    )
    .unwrap();

    assert_eq!(antimatter.total_units, 1);
    assert_eq!(strange.total_units, 1);
    let ratio = strange.allocations[0].fuel_per_min / antimatter.allocations[0].fuel_per_min;
    assert!((ratio - 0.5).abs() < 1e-12);
}
