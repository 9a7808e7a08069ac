use std::collections::BTreeMap;

use readings_client::{Unit, UnitId, UnitType};

use super::{reach, Adjacency, Edge};
use crate::error::EngineError;

/// Expand every unit carrying a suffix into derived "`<unit> of <suffix>`" units.
///
/// For a suffix unit `s` each unit `v` reachable from `s` gets a derived unit
/// linked from `s` by the composed transform `s -> v`. The declared edges
/// leaving `s` are then removed, so a meter converting into `kg CO₂` reaches
/// `pound of CO₂` but not plain `pound`.
///
/// Returns the ids of the units created, in creation order.
pub(super) fn expand_suffix_units(
    units: &mut BTreeMap<UnitId, Unit>,
    adjacency: &mut Adjacency,
    tolerance: f64,
) -> Result<Vec<UnitId>, EngineError> {
    let suffix_ids: Vec<UnitId> = units
        .values()
        .filter(|u| u.has_suffix())
        .map(|u| u.id)
        .collect();
    let mut next_id = units.keys().next_back().map_or(1, |id| id + 1);
    let mut created = Vec::new();

    for suffix_id in suffix_ids {
        let reached = reach(adjacency, suffix_id, tolerance)?;
        let Some(suffix_unit) = units.get(&suffix_id).cloned() else {
            continue;
        };
        let suffix = suffix_unit.suffix.trim().to_string();

        let mut edges = Vec::new();
        for (target_id, transform) in reached {
            if target_id == suffix_id {
                continue;
            }
            let Some(target) = units.get(&target_id) else {
                continue;
            };
            if matches!(target.type_of_unit, UnitType::Meter | UnitType::Suffix) {
                continue;
            }

            let name = format!("{} of {suffix}", target.name);
            let identifier = if target.identifier.trim().is_empty() {
                name.clone()
            } else {
                format!("{} of {suffix}", target.identifier)
            };
            let derived = Unit {
                id: next_id,
                name,
                identifier,
                unit_represent: target.unit_represent,
                sec_in_rate: target.sec_in_rate,
                type_of_unit: UnitType::Suffix,
                suffix: String::new(),
                displayable: suffix_unit.displayable,
                preferred_display: false,
                note: Some(format!("derived from suffix unit {}", suffix_unit.name)),
            };

            let existing = units.values().find(|u| u.name == derived.name).map(|u| u.id);
            let derived_id = match existing {
                Some(id) => id,
                None => {
                    tracing::debug!(
                        unit_id = derived.id,
                        name = %derived.name,
                        suffix_unit = suffix_id,
                        "created suffix unit"
                    );
                    let id = derived.id;
                    units.insert(id, derived);
                    created.push(id);
                    next_id += 1;
                    id
                }
            };
            edges.push(Edge {
                to: derived_id,
                transform,
            });
        }

        edges.sort_by_key(|e| e.to);
        adjacency.insert(suffix_id, edges);
    }

    Ok(created)
}
