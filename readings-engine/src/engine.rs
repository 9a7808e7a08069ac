//! Request-level entry points: load from the store, compile or reuse the
//! conversion table, aggregate.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};

use futures::future::try_join_all;
use readings_client::{Conversion, GroupId, MeterId, Reading, Unit, UnitId};
use tokio_util::sync::CancellationToken;

use crate::{
    aggregate::{aggregate, aggregate_group, deep_meters, AggregationMode, GroupInputs, Series},
    cik::{Cik, Role},
    compare::{compare_group, compare_meter, ComparePeriods, CompareTotals},
    config::EngineConfig,
    error::EngineError,
    interval::{TimeInterval, Timestamp},
    shift::CalendarShift,
    store::ReadingStore,
};

/// What a compare request totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareTarget {
    Meter(MeterId),
    Group(GroupId),
}

struct CachedCik {
    fingerprint: blake3::Hash,
    cik: Arc<Cik>,
}

pub struct Engine<S> {
    store: S,
    config: EngineConfig,
    cik: RwLock<Option<CachedCik>>,
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

/// Stable fingerprint of everything the conversion table is compiled from.
fn fingerprint(units: &[Unit], conversions: &[Conversion]) -> blake3::Hash {
    let mut units: Vec<&Unit> = units.iter().collect();
    units.sort_by_key(|u| u.id);
    let mut conversions: Vec<&Conversion> = conversions.iter().collect();
    conversions.sort_by_key(|c| (c.source_id, c.destination_id));

    let mut h = blake3::Hasher::new();
    h.update(&(units.len() as u64).to_le_bytes());
    for u in units {
        h.update(&u.id.to_le_bytes());
        hash_str(&mut h, &u.name);
        hash_str(&mut h, &u.identifier);
        hash_str(&mut h, u.unit_represent.as_str());
        h.update(&u.sec_in_rate.to_le_bytes());
        hash_str(&mut h, u.type_of_unit.as_str());
        hash_str(&mut h, &u.suffix);
        hash_str(&mut h, u.displayable.as_str());
    }
    h.update(&(conversions.len() as u64).to_le_bytes());
    for c in conversions {
        h.update(&c.source_id.to_le_bytes());
        h.update(&c.destination_id.to_le_bytes());
        h.update(&[u8::from(c.bidirectional)]);
        hash_f64(&mut h, c.slope);
        hash_f64(&mut h, c.intercept);
    }
    h.finalize()
}

impl<S: ReadingStore> Engine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            cik: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current conversion table, recompiled only when units or conversions changed.
    pub async fn cik(&self) -> Result<Arc<Cik>, EngineError> {
        let (units, conversions) =
            futures::try_join!(self.store.list_units(), self.store.list_conversions())?;
        let fp = fingerprint(&units, &conversions);

        {
            let slot = self.cik.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = slot.as_ref().filter(|c| c.fingerprint == fp) {
                metrics::counter!("cik_cache_hits_total").increment(1);
                return Ok(Arc::clone(&cached.cik));
            }
        }

        let cik = Arc::new(Cik::compile(
            &units,
            &conversions,
            self.config.consistency_tolerance,
        )?);
        tracing::info!(
            units = units.len(),
            conversions = conversions.len(),
            entries = cik.len(),
            fingerprint = %fp.to_hex(),
            "conversion table rebuilt"
        );
        metrics::counter!("cik_rebuilds_total").increment(1);

        let mut slot = self.cik.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CachedCik {
            fingerprint: fp,
            cik: Arc::clone(&cik),
        });
        Ok(cik)
    }

    /// Display units a meter can be graphed in, as seen by `role`.
    pub async fn graphic_units(&self, meter_id: MeterId, role: Role) -> Result<Vec<Unit>, EngineError> {
        observe("graphic_units", async {
            let (meter, cik) = futures::try_join!(self.store.get_meter(meter_id), self.cik())?;
            Ok(cik
                .targets_for(meter.unit_id, role)
                .into_iter()
                .cloned()
                .collect())
        })
        .await
    }

    pub async fn meter_line(
        &self,
        meter_id: MeterId,
        interval: &TimeInterval,
        graphic_unit: UnitId,
    ) -> Result<Series, EngineError> {
        observe("meter_line", self.meter_series(meter_id, interval, graphic_unit, AggregationMode::Line))
            .await
    }

    pub async fn meter_bar(
        &self,
        meter_id: MeterId,
        interval: &TimeInterval,
        graphic_unit: UnitId,
        width_days: u32,
    ) -> Result<Series, EngineError> {
        observe(
            "meter_bar",
            self.meter_series(meter_id, interval, graphic_unit, AggregationMode::Bar { width_days }),
        )
        .await
    }

    pub async fn group_line(
        &self,
        group_id: GroupId,
        interval: &TimeInterval,
        graphic_unit: UnitId,
        cancel: &CancellationToken,
    ) -> Result<Series, EngineError> {
        observe(
            "group_line",
            self.group_series(group_id, interval, graphic_unit, AggregationMode::Line, cancel),
        )
        .await
    }

    pub async fn group_bar(
        &self,
        group_id: GroupId,
        interval: &TimeInterval,
        graphic_unit: UnitId,
        width_days: u32,
        cancel: &CancellationToken,
    ) -> Result<Series, EngineError> {
        observe(
            "group_bar",
            self.group_series(
                group_id,
                interval,
                graphic_unit,
                AggregationMode::Bar { width_days },
                cancel,
            ),
        )
        .await
    }

    /// Totals over `[curr_start, curr_end)` and the same span moved back by `shift`.
    pub async fn compare(
        &self,
        target: CompareTarget,
        curr_start: Timestamp,
        curr_end: Timestamp,
        shift: &CalendarShift,
        graphic_unit: UnitId,
        cancel: &CancellationToken,
    ) -> Result<CompareTotals, EngineError> {
        observe("compare", async {
            let periods = ComparePeriods::new(curr_start, curr_end, shift)?;
            let fetch = periods.fetch_interval()?;
            match target {
                CompareTarget::Meter(meter_id) => {
                    let (meter, readings, cik) = futures::try_join!(
                        self.store.get_meter(meter_id),
                        self.store.get_readings(meter_id, &fetch),
                        self.cik()
                    )?;
                    compare_meter(&meter, &readings, &periods, &cik, graphic_unit)
                }
                CompareTarget::Group(group_id) => {
                    let (inputs, cik) =
                        futures::try_join!(self.group_inputs(group_id, &fetch, cancel), self.cik())?;
                    compare_group(group_id, &inputs, &periods, &cik, graphic_unit, cancel)
                }
            }
        })
        .await
    }

    async fn meter_series(
        &self,
        meter_id: MeterId,
        interval: &TimeInterval,
        graphic_unit: UnitId,
        mode: AggregationMode,
    ) -> Result<Series, EngineError> {
        let (meter, readings, cik) = futures::try_join!(
            self.store.get_meter(meter_id),
            self.store.get_readings(meter_id, interval),
            self.cik()
        )?;
        aggregate(&meter, &readings, interval, &cik, graphic_unit, mode, &self.config)
    }

    async fn group_series(
        &self,
        group_id: GroupId,
        interval: &TimeInterval,
        graphic_unit: UnitId,
        mode: AggregationMode,
        cancel: &CancellationToken,
    ) -> Result<Series, EngineError> {
        let (inputs, cik) =
            futures::try_join!(self.group_inputs(group_id, interval, cancel), self.cik())?;
        aggregate_group(
            group_id,
            &inputs,
            interval,
            &cik,
            graphic_unit,
            mode,
            &self.config,
            cancel,
        )
    }

    /// Fetch the group tree level by level, then every deep meter and its
    /// readings concurrently.
    async fn group_inputs(
        &self,
        root: GroupId,
        interval: &TimeInterval,
        cancel: &CancellationToken,
    ) -> Result<GroupInputs, EngineError> {
        let mut inputs = GroupInputs::default();
        let mut seen = HashSet::from([root]);
        let mut level = vec![root];

        while !level.is_empty() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let fetched = try_join_all(level.iter().map(|&gid| self.store.get_group(gid))).await?;
            level = fetched
                .iter()
                .flat_map(|g| g.child_groups.iter().copied())
                .filter(|gid| seen.insert(*gid))
                .collect();
            inputs.groups.extend(fetched.into_iter().map(|g| (g.id, g)));
        }

        let meter_ids = deep_meters(root, &inputs.groups)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let (meters, readings) = futures::try_join!(
            try_join_all(meter_ids.iter().map(|&id| self.store.get_meter(id))),
            try_join_all(meter_ids.iter().map(|&id| self.store.get_readings(id, interval))),
        )?;
        inputs.meters = meters.into_iter().map(|m| (m.id, m)).collect();
        inputs.readings = meter_ids
            .into_iter()
            .zip(readings)
            .collect::<HashMap<MeterId, Vec<Reading>>>();

        tracing::debug!(
            group_id = root,
            groups = inputs.groups.len(),
            meters = inputs.meters.len(),
            "group inputs loaded"
        );
        Ok(inputs)
    }
}

/// Count, time and classify one request.
async fn observe<T>(
    kind: &'static str,
    request: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    metrics::counter!("aggregation_requests_total", "kind" => kind).increment(1);
    let started = Instant::now();
    let result = request.await;
    metrics::histogram!("aggregation_duration_seconds", "kind" => kind)
        .record(started.elapsed().as_secs_f64());

    if let Err(e) = &result {
        metrics::counter!("aggregation_errors_total", "kind" => kind, "error" => e.kind())
            .increment(1);
        if e.is_client_error() {
            tracing::debug!(kind, error = %e, "request rejected");
        } else {
            tracing::warn!(kind, error = %e, "request failed");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::BarBucket, store::MemoryStore};
    use readings_client::{Displayable, Group, Meter, UnitRepresent, UnitType};
    use std::path::PathBuf;
    use time::{macros::datetime, Duration};

    fn unit(id: UnitId, name: &str, represent: UnitRepresent, type_of_unit: UnitType) -> Unit {
        Unit {
            id,
            name: name.to_string(),
            identifier: String::new(),
            unit_represent: represent,
            sec_in_rate: 3600,
            type_of_unit,
            suffix: String::new(),
            displayable: Displayable::All,
            preferred_display: false,
            note: None,
        }
    }

    fn conversion(source_id: UnitId, destination_id: UnitId, bidirectional: bool, slope: f64) -> Conversion {
        Conversion {
            source_id,
            destination_id,
            bidirectional,
            slope,
            intercept: 0.0,
            note: None,
        }
    }

    fn meter(id: MeterId, unit_id: UnitId) -> Meter {
        Meter {
            id,
            name: format!("meter {id}"),
            unit_id,
            default_graphic_unit: None,
            reading_frequency: Duration::minutes(15),
            displayable: true,
        }
    }

    fn steady(start: Timestamp, minutes: i64, count: i64, value: f64) -> Vec<Reading> {
        (0..count)
            .map(|i| Reading {
                meter_id: 0,
                value,
                start_timestamp: start + Duration::minutes(minutes * i),
                end_timestamp: start + Duration::minutes(minutes * (i + 1)),
            })
            .collect()
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    /// Electric_Utility (2) -> kg CO₂ -> kg <-> metric ton <-> pound; the
    /// derived "pound of CO₂" unit gets id 16.
    fn co2_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_unit(unit(2, "Electric_Utility", UnitRepresent::Quantity, UnitType::Meter));
        store.insert_unit(unit(10, "kg", UnitRepresent::Quantity, UnitType::Unit));
        store.insert_unit(unit(11, "metric ton", UnitRepresent::Quantity, UnitType::Unit));
        let mut kg_co2 = unit(12, "kg CO₂", UnitRepresent::Quantity, UnitType::Unit);
        kg_co2.suffix = "CO₂".to_string();
        store.insert_unit(kg_co2);
        store.insert_unit(unit(13, "pound", UnitRepresent::Quantity, UnitType::Unit));
        store.insert_conversion(conversion(2, 12, false, 0.709));
        store.insert_conversion(conversion(12, 10, false, 1.0));
        store.insert_conversion(conversion(10, 11, true, 1e-3));
        store.insert_conversion(conversion(13, 11, true, 454.545454));
        store.insert_meter(meter(1, 2));
        store
    }

    fn engine(store: MemoryStore) -> Engine<MemoryStore> {
        Engine::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn compare_in_pounds_of_co2_through_the_suffix_chain() {
        let store = co2_store();
        // 1 kWh every 15 minutes from 2022-10-30 00:00 to 2022-10-31 12:00.
        store.insert_readings(1, steady(datetime!(2022-10-30 00:00:00), 15, 144, 1.0));
        let engine = engine(store);

        let cik = engine.cik().await.unwrap();
        let pound_of_co2 = cik.resolve("pound of CO₂").unwrap().id;
        let factor = 0.709 * 1e-3 / 454.545454;

        let totals = engine
            .compare(
                CompareTarget::Meter(1),
                datetime!(2022-10-31 00:00:00),
                datetime!(2022-10-31 17:00:00),
                &"P1D".parse().unwrap(),
                pound_of_co2,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // The current period runs past the data and only counts the 48 readings present.
        assert!((totals.curr_use - 48.0 * factor).abs() < 1e-15);
        assert!((totals.prev_use - 68.0 * factor).abs() < 1e-15);
    }

    #[tokio::test]
    async fn compare_with_no_data_in_either_period_is_zero() {
        let engine = engine(co2_store());
        let totals = engine
            .compare(
                CompareTarget::Meter(1),
                datetime!(2023-01-10 00:00:00),
                datetime!(2023-01-11 00:00:00),
                &CalendarShift::days(7),
                12,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(totals, CompareTotals { curr_use: 0.0, prev_use: 0.0 });
    }

    #[tokio::test]
    async fn incompatible_unit_fails_the_request() {
        let engine = engine(co2_store());
        let err = engine
            .meter_bar(1, &TimeInterval::unbounded(), 10, 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::IncompatibleUnit {
                source_unit: 2,
                target_unit: 10
            }
        );
    }

    #[tokio::test]
    async fn conversion_table_is_reused_until_conversions_change() {
        let store = co2_store();
        let engine = engine(store);

        let first = engine.cik().await.unwrap();
        let second = engine.cik().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        engine.store().insert_conversion(conversion(2, 12, false, 0.5));
        let third = engine.cik().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.transform(2, 12).unwrap().slope, 0.5);
        // The earlier table is untouched for readers still holding it.
        assert_eq!(first.transform(2, 12).unwrap().slope, 0.709);
    }

    #[tokio::test]
    async fn inconsistent_conversions_are_surfaced() {
        let store = co2_store();
        store.insert_unit(unit(20, "kWh", UnitRepresent::Quantity, UnitType::Unit));
        store.insert_conversion(conversion(2, 20, false, 1.0));
        store.insert_conversion(conversion(20, 12, false, 0.8));
        let err = engine(store).cik().await.unwrap_err();
        assert!(matches!(err, EngineError::InconsistentConversionGraph { .. }));
    }

    fn flow_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_unit(unit(1, "Electric", UnitRepresent::Flow, UnitType::Meter));
        store.insert_unit(unit(2, "kW", UnitRepresent::Flow, UnitType::Unit));
        store.insert_conversion(conversion(1, 2, false, 1.0));
        store.insert_meter(meter(15, 1));
        store.insert_meter(meter(20, 1));
        store.insert_group(Group {
            id: 1,
            name: "15 and 20 minute meters".to_string(),
            default_graphic_unit: Some(2),
            child_meters: vec![15, 20],
            child_groups: vec![],
            displayable: true,
        });
        store
            .load_readings_csv(15, fixture("flow_15_min.csv"))
            .unwrap();
        store
            .load_readings_csv(20, fixture("flow_20_min.csv"))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn group_bars_equal_the_sum_of_member_bars() {
        let engine = engine(flow_store());
        let all = TimeInterval::unbounded();
        let no_cancel = CancellationToken::new();

        let Series::Bar(group) = engine.group_bar(1, &all, 2, 1, &no_cancel).await.unwrap() else {
            panic!("expected bars");
        };
        let Series::Bar(a) = engine.meter_bar(15, &all, 2, 1).await.unwrap() else {
            panic!("expected bars");
        };
        let Series::Bar(b) = engine.meter_bar(20, &all, 2, 1).await.unwrap() else {
            panic!("expected bars");
        };

        assert_eq!(group.len(), 2);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        for ((g, a), b) in group.iter().zip(&a).zip(&b) {
            assert_eq!(g.start_timestamp, a.start_timestamp);
            assert!((g.value - (a.value + b.value)).abs() < 1e-9);
        }
        assert_eq!(group[0].start_timestamp, datetime!(2022-10-30 00:00:00));
        assert_eq!(group[1].end_timestamp, datetime!(2022-11-01 00:00:00));
        assert!(group.iter().all(|bar: &BarBucket| bar.value > 0.0));
    }

    #[tokio::test]
    async fn cyclic_groups_fail_fast() {
        let store = flow_store();
        store.insert_group(Group {
            id: 2,
            name: "loop a".to_string(),
            default_graphic_unit: None,
            child_meters: vec![15],
            child_groups: vec![3],
            displayable: true,
        });
        store.insert_group(Group {
            id: 3,
            name: "loop b".to_string(),
            default_graphic_unit: None,
            child_meters: vec![20],
            child_groups: vec![2],
            displayable: true,
        });

        let err = engine(store)
            .group_line(2, &TimeInterval::unbounded(), 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::CyclicGroup {
                group_id: 2,
                path: vec![2, 3, 2]
            }
        );
    }

    #[tokio::test]
    async fn cancelled_group_requests_stop() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine(flow_store())
            .group_bar(1, &TimeInterval::unbounded(), 2, 1, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    #[tokio::test]
    async fn graphic_units_follow_role_visibility() {
        let store = flow_store();
        let mut admin_only = unit(3, "MW", UnitRepresent::Flow, UnitType::Unit);
        admin_only.displayable = Displayable::Admin;
        store.insert_unit(admin_only);
        store.insert_conversion(conversion(2, 3, true, 1e-3));
        let engine = engine(store);

        let names = |units: Vec<Unit>| units.into_iter().map(|u| u.name).collect::<Vec<_>>();
        assert_eq!(names(engine.graphic_units(15, Role::Viewer).await.unwrap()), ["kW"]);
        assert_eq!(
            names(engine.graphic_units(15, Role::Admin).await.unwrap()),
            ["kW", "MW"]
        );
    }
}
