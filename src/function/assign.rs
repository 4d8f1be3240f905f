use super::{FunctionCatalog, FunctionFamily, FunctionParam};
use crate::config::FunctionRatios;
use crate::error::BenchError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The generator function bound to one sensor index for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFunction {
    pub sensor_index: usize,
    pub function_id: String,
    pub param: FunctionParam,
}

/// Partitions `sensors` across the families by ratio.
///
/// `[0, 1)` is split into cumulative ranges in the order constant, line, random,
/// sin, square. One generator seeded with `seed` is drawn once per sensor, in
/// sensor order, to pick the family; a second generator seeded with
/// `seed + 1 + i` picks the entry inside that family's catalog.
pub fn assign_functions(
    ratios: FunctionRatios,
    sensors: usize,
    seed: u64,
    catalog: &FunctionCatalog,
) -> Result<Vec<SensorFunction>, BenchError> {
    let families = [
        (FunctionFamily::Constant, ratios.constant),
        (FunctionFamily::Line, ratios.line),
        (FunctionFamily::Random, ratios.random),
        (FunctionFamily::Sin, ratios.sin),
        (FunctionFamily::Square, ratios.square),
    ];
    if let Some((family, ratio)) = families.iter().find(|(_, r)| !r.is_finite() || *r < 0.0) {
        return Err(BenchError::config(format!(
            "{family} ratio must be non-negative, got {ratio}"
        )));
    }
    let total: f64 = families.iter().map(|(_, r)| r).sum();
    if total <= 0.0 {
        return Err(BenchError::config("sum of function ratios must be positive"));
    }

    let mut bounds = [0.0; 5];
    let mut acc = 0.0;
    for (slot, (_, ratio)) in families.iter().enumerate() {
        acc += ratio / total;
        bounds[slot] = acc;
    }
    // Rounding can leave the last bound just under 1.0.
    let last_positive = families
        .iter()
        .rposition(|(_, ratio)| *ratio > 0.0)
        .unwrap_or(families.len() - 1);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut assigned = Vec::with_capacity(sensors);
    for sensor_index in 0..sensors {
        let property: f64 = rng.gen();
        let slot = families
            .iter()
            .zip(bounds)
            .position(|((_, ratio), bound)| *ratio > 0.0 && property < bound)
            .unwrap_or(last_positive);
        let family = families[slot].0;

        let entries = catalog.family(family);
        if entries.is_empty() {
            return Err(BenchError::config(format!(
                "function catalog has no {family} entries"
            )));
        }
        let mut pick = StdRng::seed_from_u64(seed.wrapping_add(1 + sensor_index as u64));
        let middle: f64 = pick.gen();
        let index = ((middle * entries.len() as f64) as usize).min(entries.len() - 1);
        let entry = &entries[index];

        tracing::trace!(sensor_index, %family, function = %entry.id, "assigned sensor function");
        assigned.push(SensorFunction {
            sensor_index,
            function_id: entry.id.clone(),
            param: entry.param,
        });
    }
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ratios(constant: f64, line: f64, random: f64, sin: f64, square: f64) -> FunctionRatios {
        FunctionRatios {
            constant,
            line,
            random,
            sin,
            square,
        }
    }

    #[test]
    fn same_seed_same_assignment() {
        let catalog = FunctionCatalog::builtin().unwrap();
        let r = ratios(0.352, 0.054, 0.512, 0.036, 0.054);
        let a = assign_functions(r, 64, 666, &catalog).unwrap();
        let b = assign_functions(r, 64, 666, &catalog).unwrap();
        assert_eq!(a, b);
        let c = assign_functions(r, 64, 667, &catalog).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn single_family_takes_every_sensor() {
        let catalog = FunctionCatalog::builtin().unwrap();
        let assigned =
            assign_functions(ratios(0.0, 0.0, 0.0, 1.0, 0.0), 30, 1, &catalog).unwrap();
        assert!(assigned
            .iter()
            .all(|f| f.param.family() == FunctionFamily::Sin));
    }

    #[test]
    fn family_shares_track_ratios() {
        let catalog = FunctionCatalog::builtin().unwrap();
        let assigned =
            assign_functions(ratios(0.5, 0.0, 0.5, 0.0, 0.0), 4000, 666, &catalog).unwrap();
        let mut counts: HashMap<FunctionFamily, usize> = HashMap::new();
        for f in &assigned {
            *counts.entry(f.param.family()).or_default() += 1;
        }
        let constant = counts[&FunctionFamily::Constant] as f64 / 4000.0;
        assert!((constant - 0.5).abs() < 0.05, "constant share {constant}");
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn rejects_zero_and_negative_ratios() {
        let catalog = FunctionCatalog::builtin().unwrap();
        assert!(matches!(
            assign_functions(ratios(0.0, 0.0, 0.0, 0.0, 0.0), 3, 1, &catalog),
            Err(BenchError::Configuration(_))
        ));
        assert!(assign_functions(ratios(1.0, -0.1, 0.0, 0.0, 0.0), 3, 1, &catalog).is_err());
    }

    #[test]
    fn empty_selected_family_is_fatal() {
        let catalog = FunctionCatalog::parse(
            r#"
            [[constant]]
            id = "only"
            value = 1.0
            "#,
        )
        .unwrap();
        let err = assign_functions(ratios(0.0, 1.0, 0.0, 0.0, 0.0), 2, 1, &catalog).unwrap_err();
        assert!(err.to_string().contains("LINE"));
        assert!(assign_functions(ratios(1.0, 0.0, 0.0, 0.0, 0.0), 2, 1, &catalog).is_ok());
    }
}
