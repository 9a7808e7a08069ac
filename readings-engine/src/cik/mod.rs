//! Compiled conversion index: direct unit-to-unit transforms built from the
//! declared conversion graph.

mod suffix;
mod transform;

use std::collections::{BTreeMap, HashMap, VecDeque};

use readings_client::{Conversion, Displayable, Unit, UnitId, UnitType};
use serde::Serialize;

pub use transform::AffineTransform;

use crate::error::EngineError;

/// Who is asking for display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Viewer,
    Admin,
}

impl Role {
    pub fn can_see(self, displayable: Displayable) -> bool {
        match displayable {
            Displayable::All => true,
            Displayable::Admin => self == Role::Admin,
            Displayable::None => false,
        }
    }
}

/// One compiled meter-unit to display-unit transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CikEntry {
    pub meter_unit_id: UnitId,
    pub non_meter_unit_id: UnitId,
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub to: UnitId,
    pub transform: AffineTransform,
}

pub(crate) type Adjacency = BTreeMap<UnitId, Vec<Edge>>;

/// Immutable table of composed transforms between every connected pair of units.
#[derive(Debug, Clone)]
pub struct Cik {
    units: BTreeMap<UnitId, Unit>,
    transforms: HashMap<(UnitId, UnitId), AffineTransform>,
    derived: Vec<UnitId>,
}

impl Cik {
    /// Compile declared units and conversions.
    ///
    /// Fails when a conversion is malformed or when two paths between the same
    /// pair of units disagree beyond `tolerance`.
    pub fn compile(
        units: &[Unit],
        conversions: &[Conversion],
        tolerance: f64,
    ) -> Result<Self, EngineError> {
        let mut units: BTreeMap<UnitId, Unit> = units.iter().map(|u| (u.id, u.clone())).collect();
        let mut adjacency = build_adjacency(&units, conversions)?;
        let derived = suffix::expand_suffix_units(&mut units, &mut adjacency, tolerance)?;

        let mut transforms = HashMap::new();
        for &source in units.keys() {
            for (target, transform) in reach(&adjacency, source, tolerance)? {
                if target != source {
                    transforms.insert((source, target), transform);
                }
            }
        }

        Ok(Self {
            units,
            transforms,
            derived,
        })
    }

    /// Composed transform from `source` to `target`, or `None` when no path exists.
    pub fn transform(&self, source: UnitId, target: UnitId) -> Option<AffineTransform> {
        if source == target && self.units.contains_key(&source) {
            return Some(AffineTransform::IDENTITY);
        }
        self.transforms.get(&(source, target)).copied()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Declared and derived units, ordered by id.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Units generated from suffix units while compiling.
    pub fn derived_units(&self) -> impl Iterator<Item = &Unit> {
        self.derived.iter().filter_map(|id| self.units.get(id))
    }

    /// Look up a declared or derived unit by name.
    pub fn resolve(&self, name: &str) -> Option<&Unit> {
        let name = name.trim();
        self.units.values().find(|u| u.name == name)
    }

    /// Every compiled transform from a meter unit to a non-meter unit.
    pub fn entries(&self) -> Vec<CikEntry> {
        let mut entries: Vec<CikEntry> = self
            .transforms
            .iter()
            .filter(|((source, target), _)| {
                self.type_of(*source) == Some(UnitType::Meter)
                    && self.type_of(*target).is_some_and(|t| t != UnitType::Meter)
            })
            .map(|(&(source, target), t)| CikEntry {
                meter_unit_id: source,
                non_meter_unit_id: target,
                slope: t.slope,
                intercept: t.intercept,
            })
            .collect();
        entries.sort_by_key(|e| (e.meter_unit_id, e.non_meter_unit_id));
        entries
    }

    /// Display units a meter in `meter_unit` can be graphed in, for `role`.
    pub fn targets_for(&self, meter_unit: UnitId, role: Role) -> Vec<&Unit> {
        self.units
            .values()
            .filter(|u| u.id != meter_unit)
            .filter(|u| u.type_of_unit == UnitType::Unit && role.can_see(u.displayable))
            .filter(|u| self.transforms.contains_key(&(meter_unit, u.id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    fn type_of(&self, id: UnitId) -> Option<UnitType> {
        self.units.get(&id).map(|u| u.type_of_unit)
    }
}

fn build_adjacency(
    units: &BTreeMap<UnitId, Unit>,
    conversions: &[Conversion],
) -> Result<Adjacency, EngineError> {
    let mut adjacency = Adjacency::new();

    for c in conversions {
        let invalid = |reason: &str| EngineError::InvalidConversion {
            source_unit: c.source_id,
            destination_unit: c.destination_id,
            reason: reason.to_string(),
        };

        for id in [c.source_id, c.destination_id] {
            if !units.contains_key(&id) {
                return Err(EngineError::UnknownUnit(id));
            }
        }
        if c.source_id == c.destination_id {
            return Err(invalid("source and destination are the same unit"));
        }
        if !c.slope.is_finite() || !c.intercept.is_finite() {
            return Err(invalid("slope and intercept must be finite"));
        }

        let forward = AffineTransform::new(c.slope, c.intercept);
        adjacency.entry(c.source_id).or_default().push(Edge {
            to: c.destination_id,
            transform: forward,
        });

        if c.bidirectional {
            let inverse = forward
                .inverse()
                .ok_or_else(|| invalid("a bidirectional conversion needs a nonzero slope"))?;
            adjacency.entry(c.destination_id).or_default().push(Edge {
                to: c.source_id,
                transform: inverse,
            });
        }
    }

    for edges in adjacency.values_mut() {
        edges.sort_by_key(|e| e.to);
    }

    Ok(adjacency)
}

/// Breadth-first walk from `source`, composing edge transforms along the way.
///
/// Every edge leaving a reached unit is checked against the transform already
/// recorded for its destination, so two disagreeing paths are reported
/// instead of one being picked silently.
fn reach(
    adjacency: &Adjacency,
    source: UnitId,
    tolerance: f64,
) -> Result<BTreeMap<UnitId, AffineTransform>, EngineError> {
    let mut found = BTreeMap::from([(source, AffineTransform::IDENTITY)]);
    let mut queue = VecDeque::from([source]);

    while let Some(unit) = queue.pop_front() {
        let here = found[&unit];
        for edge in adjacency.get(&unit).into_iter().flatten() {
            let candidate = here.then(&edge.transform);
            match found.get(&edge.to) {
                None => {
                    found.insert(edge.to, candidate);
                    queue.push_back(edge.to);
                }
                Some(existing) if !existing.approx_eq(&candidate, tolerance) => {
                    return Err(EngineError::InconsistentConversionGraph {
                        source_unit: source,
                        target_unit: edge.to,
                        first_slope: existing.slope,
                        first_intercept: existing.intercept,
                        second_slope: candidate.slope,
                        second_intercept: candidate.intercept,
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use readings_client::UnitRepresent;

    fn unit(id: UnitId, name: &str, type_of_unit: UnitType, displayable: Displayable) -> Unit {
        Unit {
            id,
            name: name.to_string(),
            identifier: String::new(),
            unit_represent: UnitRepresent::Quantity,
            sec_in_rate: 3600,
            type_of_unit,
            suffix: String::new(),
            displayable,
            preferred_display: false,
            note: None,
        }
    }

    fn conversion(source_id: UnitId, destination_id: UnitId, bidirectional: bool, slope: f64, intercept: f64) -> Conversion {
        Conversion {
            source_id,
            destination_id,
            bidirectional,
            slope,
            intercept,
            note: None,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
            "{actual} != {expected}"
        );
    }

    /// Electric_Utility -> kg CO₂ -> kg <-> metric ton <-> pound.
    fn co2_chain() -> (Vec<Unit>, Vec<Conversion>) {
        let mut kg_co2 = unit(12, "kg CO₂", UnitType::Unit, Displayable::All);
        kg_co2.suffix = "CO₂".to_string();
        let mut pound = unit(13, "pound", UnitType::Unit, Displayable::All);
        pound.identifier = "lb".to_string();
        let units = vec![
            unit(2, "Electric_Utility", UnitType::Meter, Displayable::None),
            unit(10, "kg", UnitType::Unit, Displayable::All),
            unit(11, "metric ton", UnitType::Unit, Displayable::All),
            kg_co2,
            pound,
        ];
        let conversions = vec![
            conversion(2, 12, false, 0.709, 0.0),
            conversion(12, 10, false, 1.0, 0.0),
            conversion(10, 11, true, 1e-3, 0.0),
            conversion(13, 11, true, 454.545454, 0.0),
        ];
        (units, conversions)
    }

    #[test]
    fn chained_and_reversed_conversions_compose() {
        let (units, conversions) = co2_chain();
        let cik = Cik::compile(&units, &conversions, 1e-9).unwrap();

        let pound_of_co2 = cik.resolve("pound of CO₂").expect("derived unit");
        assert_eq!(pound_of_co2.type_of_unit, UnitType::Suffix);
        assert_eq!(pound_of_co2.identifier, "lb of CO₂");

        let t = cik.transform(2, pound_of_co2.id).unwrap();
        assert_close(t.slope, 0.709 * 1e-3 / 454.545454);
        assert_eq!(t.intercept, 0.0);

        // A day of usage in kWh expressed as pounds of CO₂.
        let pounds = t.apply(3120.01835362067);
        assert!((pounds - 0.00486660462797753).abs() < 1e-8 * 0.00486660462797753);
    }

    #[test]
    fn suffix_unit_hides_its_plain_destinations() {
        let (units, conversions) = co2_chain();
        let cik = Cik::compile(&units, &conversions, 1e-9).unwrap();

        assert_close(cik.transform(2, 12).unwrap().slope, 0.709);
        assert!(cik.transform(2, 10).is_none());
        assert!(cik.transform(2, 13).is_none());
        // kg itself still converts to pounds.
        assert_close(cik.transform(10, 13).unwrap().slope, 1e-3 / 454.545454);

        let derived: Vec<&str> = cik.derived_units().map(|u| u.name.as_str()).collect();
        assert_eq!(derived, ["kg of CO₂", "metric ton of CO₂", "pound of CO₂"]);
        assert_eq!(cik.derived_units().map(|u| u.id).collect::<Vec<_>>(), [14, 15, 16]);
    }

    #[test]
    fn offerable_targets_exclude_meter_and_suffix_units() {
        let (units, conversions) = co2_chain();
        let cik = Cik::compile(&units, &conversions, 1e-9).unwrap();

        let targets: Vec<&str> = cik
            .targets_for(2, Role::Viewer)
            .into_iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(targets, ["kg CO₂"]);

        let entries = cik.entries();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.meter_unit_id == 2));
    }

    #[test]
    fn admin_only_units_are_hidden_from_viewers() {
        let units = vec![
            unit(1, "Electric_kWh", UnitType::Meter, Displayable::None),
            unit(2, "kWh", UnitType::Unit, Displayable::All),
            unit(3, "MJ", UnitType::Unit, Displayable::Admin),
        ];
        let conversions = vec![conversion(1, 2, false, 1.0, 0.0), conversion(2, 3, true, 3.6, 0.0)];
        let cik = Cik::compile(&units, &conversions, 1e-9).unwrap();

        assert_eq!(cik.targets_for(1, Role::Viewer).len(), 1);
        assert_eq!(cik.targets_for(1, Role::Admin).len(), 2);
        assert_close(cik.transform(1, 3).unwrap().slope, 3.6);
    }

    #[test]
    fn bidirectional_round_trip_is_identity() {
        let units = vec![
            unit(1, "C", UnitType::Unit, Displayable::All),
            unit(2, "F", UnitType::Unit, Displayable::All),
            unit(3, "K", UnitType::Unit, Displayable::All),
        ];
        let conversions = vec![
            conversion(1, 2, true, 1.8, 32.0),
            conversion(3, 1, true, 1.0, -273.15),
        ];
        let cik = Cik::compile(&units, &conversions, 1e-9).unwrap();

        for a in 1..=3 {
            for b in 1..=3 {
                let there = cik.transform(a, b).unwrap();
                let back = cik.transform(b, a).unwrap();
                assert!(there.then(&back).approx_eq(&AffineTransform::IDENTITY, 1e-9));
            }
        }
        assert!((cik.transform(3, 2).unwrap().apply(373.15) - 212.0).abs() < 1e-9);
    }

    #[test]
    fn disconnected_units_have_no_transform() {
        let units = vec![
            unit(1, "Electric", UnitType::Meter, Displayable::None),
            unit(2, "kW", UnitType::Unit, Displayable::All),
            unit(3, "liter", UnitType::Unit, Displayable::All),
        ];
        let cik = Cik::compile(&units, &[conversion(1, 2, false, 1.0, 0.0)], 1e-9).unwrap();
        assert!(cik.transform(1, 3).is_none());
        assert!(cik.transform(2, 1).is_none());
        assert_eq!(cik.transform(3, 3), Some(AffineTransform::IDENTITY));
        assert_eq!(cik.transform(99, 99), None);
    }

    #[test]
    fn disagreeing_paths_are_rejected() {
        let units = vec![
            unit(1, "kWh", UnitType::Unit, Displayable::All),
            unit(2, "MJ", UnitType::Unit, Displayable::All),
            unit(3, "BTU", UnitType::Unit, Displayable::All),
        ];
        let conversions = vec![
            conversion(1, 2, false, 3.6, 0.0),
            conversion(2, 3, false, 947.8, 0.0),
            conversion(1, 3, false, 3000.0, 0.0),
        ];
        let err = Cik::compile(&units, &conversions, 1e-9).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InconsistentConversionGraph {
                source_unit: 1,
                target_unit: 3,
                ..
            }
        ));
    }

    #[test]
    fn disagreeing_tiny_slopes_are_rejected() {
        let units = vec![
            unit(1, "Wh", UnitType::Unit, Displayable::All),
            unit(2, "TWh", UnitType::Unit, Displayable::All),
            unit(3, "TWh (grid)", UnitType::Unit, Displayable::All),
        ];
        let conversions = vec![
            conversion(1, 2, false, 1e-12, 0.0),
            conversion(2, 3, false, 1.0, 0.0),
            conversion(1, 3, false, 1.5e-12, 0.0),
        ];
        let err = Cik::compile(&units, &conversions, 1e-9).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InconsistentConversionGraph {
                source_unit: 1,
                target_unit: 3,
                ..
            }
        ));

        let agreeing = vec![
            conversion(1, 2, false, 1e-12, 0.0),
            conversion(2, 3, false, 1.0, 0.0),
            conversion(1, 3, false, 1e-12, 0.0),
        ];
        assert!(Cik::compile(&units, &agreeing, 1e-9).is_ok());
    }

    #[test]
    fn agreeing_paths_within_tolerance_are_accepted() {
        let units = vec![
            unit(1, "kWh", UnitType::Unit, Displayable::All),
            unit(2, "MJ", UnitType::Unit, Displayable::All),
            unit(3, "GJ", UnitType::Unit, Displayable::All),
        ];
        let conversions = vec![
            conversion(1, 2, true, 3.6, 0.0),
            conversion(2, 3, true, 1e-3, 0.0),
            conversion(1, 3, false, 3.6e-3, 0.0),
        ];
        let cik = Cik::compile(&units, &conversions, 1e-9).unwrap();
        assert_close(cik.transform(3, 1).unwrap().slope, 1.0 / 3.6e-3);
    }

    #[test]
    fn malformed_conversions_are_rejected() {
        let units = vec![
            unit(1, "a", UnitType::Unit, Displayable::All),
            unit(2, "b", UnitType::Unit, Displayable::All),
        ];
        assert!(matches!(
            Cik::compile(&units, &[conversion(1, 2, true, 0.0, 1.0)], 1e-9),
            Err(EngineError::InvalidConversion { .. })
        ));
        assert!(matches!(
            Cik::compile(&units, &[conversion(1, 1, false, 1.0, 0.0)], 1e-9),
            Err(EngineError::InvalidConversion { .. })
        ));
        assert!(matches!(
            Cik::compile(&units, &[conversion(1, 7, false, 1.0, 0.0)], 1e-9),
            Err(EngineError::UnknownUnit(7))
        ));
        // A one-way zero slope is allowed; it just cannot be inverted.
        assert!(Cik::compile(&units, &[conversion(1, 2, false, 0.0, 1.0)], 1e-9).is_ok());
    }
}
