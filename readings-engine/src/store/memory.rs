use std::{
    collections::HashMap,
    fs::File,
    path::Path,
    sync::{PoisonError, RwLock},
};

use csv::StringRecord;
use readings_client::{Conversion, Group, GroupId, Meter, MeterId, Reading, Unit, UnitId};

use super::ReadingStore;
use crate::{
    error::EngineError,
    interval::{parse_timestamp, Span, TimeInterval},
};

#[derive(Debug, Default)]
struct Tables {
    units: HashMap<UnitId, Unit>,
    conversions: Vec<Conversion>,
    meters: HashMap<MeterId, Meter>,
    groups: HashMap<GroupId, Group>,
    readings: HashMap<MeterId, Vec<Reading>>,
}

/// In-memory store, used by tests and for replaying exported readings.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&tables)
    }

    pub fn insert_unit(&self, unit: Unit) {
        self.write(|t| t.units.insert(unit.id, unit));
    }

    pub fn insert_conversion(&self, conversion: Conversion) {
        self.write(|t| {
            t.conversions.retain(|c| {
                (c.source_id, c.destination_id) != (conversion.source_id, conversion.destination_id)
            });
            t.conversions.push(conversion);
        });
    }

    pub fn remove_conversion(&self, source_id: UnitId, destination_id: UnitId) {
        self.write(|t| {
            t.conversions
                .retain(|c| (c.source_id, c.destination_id) != (source_id, destination_id))
        });
    }

    pub fn insert_meter(&self, meter: Meter) {
        self.write(|t| t.meters.insert(meter.id, meter));
    }

    pub fn insert_group(&self, group: Group) {
        self.write(|t| t.groups.insert(group.id, group));
    }

    pub fn insert_readings(&self, meter_id: MeterId, readings: impl IntoIterator<Item = Reading>) {
        self.write(|t| {
            let stored = t.readings.entry(meter_id).or_default();
            stored.extend(readings.into_iter().map(|r| Reading { meter_id, ..r }));
            stored.sort_by_key(|r| r.start_timestamp);
        });
    }

    /// Load readings for `meter_id` from a CSV export.
    ///
    /// Expected header columns (by name): `reading`, `start_timestamp`,
    /// `end_timestamp`. Returns the number of readings loaded.
    pub fn load_readings_csv(
        &self,
        meter_id: MeterId,
        path: impl AsRef<Path>,
    ) -> Result<usize, EngineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            EngineError::Store(format!("failed to open CSV file {}: {e}", path.display()))
        })?;
        let mut rdr = csv::Reader::from_reader(file);
        let headers = rdr
            .headers()
            .map_err(|e| EngineError::Store(format!("failed to read CSV headers: {e}")))?
            .clone();

        let mut readings = Vec::new();
        for result in rdr.records() {
            let record = result
                .map_err(|e| EngineError::Store(format!("failed to read CSV record: {e}")))?;
            readings.push(record_to_reading(meter_id, &record, &headers)?);
        }

        let count = readings.len();
        tracing::debug!(meter_id, count, path = %path.display(), "loaded readings from CSV");
        self.insert_readings(meter_id, readings);
        Ok(count)
    }
}

fn record_to_reading(
    meter_id: MeterId,
    record: &StringRecord,
    headers: &StringRecord,
) -> Result<Reading, EngineError> {
    let get = |name: &str| -> Result<&str, EngineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .ok_or_else(|| EngineError::Store(format!("missing column '{name}' in CSV record")))
    };

    let value_str = get("reading")?;
    let value: f64 = value_str
        .parse()
        .map_err(|e| EngineError::Store(format!("invalid reading '{value_str}': {e}")))?;
    let start_timestamp = parse_timestamp(get("start_timestamp")?)?;
    let end_timestamp = parse_timestamp(get("end_timestamp")?)?;

    Ok(Reading {
        meter_id,
        value,
        start_timestamp,
        end_timestamp,
    })
}

#[async_trait::async_trait]
impl ReadingStore for MemoryStore {
    async fn list_units(&self) -> Result<Vec<Unit>, EngineError> {
        Ok(self.read(|t| {
            let mut units: Vec<Unit> = t.units.values().cloned().collect();
            units.sort_by_key(|u| u.id);
            units
        }))
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>, EngineError> {
        Ok(self.read(|t| t.conversions.clone()))
    }

    async fn get_meter(&self, meter_id: MeterId) -> Result<Meter, EngineError> {
        self.read(|t| t.meters.get(&meter_id).cloned())
            .ok_or(EngineError::UnknownMeter(meter_id))
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Group, EngineError> {
        self.read(|t| t.groups.get(&group_id).cloned())
            .ok_or(EngineError::UnknownGroup(group_id))
    }

    async fn get_readings(
        &self,
        meter_id: MeterId,
        interval: &TimeInterval,
    ) -> Result<Vec<Reading>, EngineError> {
        Ok(self.read(|t| {
            t.readings
                .get(&meter_id)
                .map(|readings| {
                    readings
                        .iter()
                        .filter(|r| Span::of_reading(r).is_ok_and(|s| interval.touches(&s)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use time::macros::datetime;

    #[tokio::test]
    async fn csv_readings_load_and_filter_by_interval() {
        let path = std::env::temp_dir().join(format!(
            "readings-engine-memory-{}.csv",
            std::process::id()
        ));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "reading,start_timestamp,end_timestamp").unwrap();
        writeln!(file, "1.5,2022-10-30 00:00:00,2022-10-30 00:15:00").unwrap();
        writeln!(file, "2.5,2022-10-30 00:15:00,2022-10-30 00:30:00").unwrap();
        writeln!(file, "3.5,2022-10-30 00:30:00,2022-10-30 00:45:00").unwrap();
        drop(file);

        let store = MemoryStore::new();
        assert_eq!(store.load_readings_csv(7, &path).unwrap(), 3);
        std::fs::remove_file(&path).unwrap();

        let all = store.get_readings(7, &TimeInterval::unbounded()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.meter_id == 7));

        let later = TimeInterval::new(Some(datetime!(2022-10-30 00:20:00)), None).unwrap();
        let values: Vec<f64> = store
            .get_readings(7, &later)
            .await
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![2.5, 3.5]);

        assert!(store.get_readings(8, &later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_rows_are_unknown() {
        let store = MemoryStore::new();
        assert_eq!(store.get_meter(3).await, Err(EngineError::UnknownMeter(3)));
        assert_eq!(store.get_group(4).await, Err(EngineError::UnknownGroup(4)));
    }

    #[test]
    fn missing_column_is_reported() {
        let headers = StringRecord::from(vec!["reading", "start_timestamp"]);
        let record = StringRecord::from(vec!["1", "2022-10-30 00:00:00"]);
        let err = record_to_reading(1, &record, &headers).unwrap_err();
        assert_eq!(
            err,
            EngineError::Store("missing column 'end_timestamp' in CSV record".to_string())
        );
    }
}
