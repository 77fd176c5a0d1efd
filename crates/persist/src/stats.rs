use crate::store::{StoreError, check_schema, move_aside, write_atomic};
use blastmend_recovery::{StatsSink, StatsSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STATS_SCHEMA_VERSION: u32 = 1;

/// On-disk form of `stats.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsFile {
    pub schema_version: u32,
    pub blocks_recovered: u64,
    pub explosions_recovered: u64,
    pub updated_at: DateTime<Utc>,
}

/// JSON-backed store for the recovery counters.
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read persisted counters. A missing file yields zeroed counters.
    pub fn load(&self) -> Result<StatsSnapshot, StoreError> {
        if !self.path.exists() {
            return Ok(StatsSnapshot::default());
        }
        let file: StatsFile = serde_json::from_reader(std::fs::File::open(&self.path)?)?;
        check_schema(file.schema_version, STATS_SCHEMA_VERSION)?;
        Ok(StatsSnapshot {
            blocks_recovered: file.blocks_recovered,
            explosions_recovered: file.explosions_recovered,
        })
    }

    pub fn save(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        let file = StatsFile {
            schema_version: STATS_SCHEMA_VERSION,
            blocks_recovered: snapshot.blocks_recovered,
            explosions_recovered: snapshot.explosions_recovered,
            updated_at: Utc::now(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?)?;
        tracing::debug!(path = %self.path.display(), "stats saved");
        Ok(())
    }

    /// Move an unreadable stats file aside so the next save does not replace it.
    pub fn quarantine(&self) -> Result<Option<PathBuf>, StoreError> {
        move_aside(&self.path)
    }
}

impl StatsSink for StatsStore {
    type Error = StoreError;

    fn persist(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        self.save(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastmend_recovery::Stats;

    #[test]
    fn missing_file_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatsStore::new(tmp.path().join("stats.json"));
        assert_eq!(store.load().unwrap(), StatsSnapshot::default());
    }

    #[test]
    fn saved_counters_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stats.json");
        let stats = Stats::new();
        stats.record_blocks(12);
        stats.record_explosions(3);
        stats.tick(&StatsStore::new(&path));

        let loaded = StatsStore::new(&path).load().unwrap();
        assert_eq!(loaded.blocks_recovered, 12);
        assert_eq!(loaded.explosions_recovered, 3);
    }

    #[test]
    fn schema_mismatch_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stats.json");
        let store = StatsStore::new(&path);
        store.save(&StatsSnapshot::default()).unwrap();

        let mut file: StatsFile =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        file.schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&path).unwrap(), &file).unwrap();

        match store.load() {
            Err(StoreError::SchemaMismatch { file_version, .. }) => assert_eq!(file_version, 999),
            other => panic!("expected SchemaMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_json_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stats.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(StatsStore::new(&path).load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn quarantined_file_survives_the_next_save() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stats.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = StatsStore::new(&path);
        assert!(store.load().is_err());

        let moved = store.quarantine().unwrap().unwrap();
        store.save(&StatsSnapshot::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "{ not json");
        assert_eq!(store.load().unwrap(), StatsSnapshot::default());
    }
}
