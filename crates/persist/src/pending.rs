//! Pending-queue persistence.
//!
//! Layout inside the store directory:
//! ```text
//! pending.cbor.zst       - CBOR+zstd compressed list of pending explosions
//! pending.manifest.json  - schema version, counts and SHA-256 of the data file
//! ```

use crate::store::{
    StoreError, cbor_deserialize, cbor_serialize, check_schema, move_aside, remove_if_exists,
    sha256_hex, write_atomic, zstd_compress, zstd_decompress,
};
use blastmend_recovery::Explosion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PENDING_SCHEMA_VERSION: u32 = 1;
const DATA_FILE: &str = "pending.cbor.zst";
const MANIFEST_FILE: &str = "pending.manifest.json";

/// Describes the data file written alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingManifest {
    pub schema_version: u32,
    pub sha256: String,
    pub explosions: usize,
    pub blocks: usize,
    pub written_at: DateTime<Utc>,
}

/// Stores explosions that were still pending when the host stopped.
#[derive(Debug, Clone)]
pub struct PendingStore {
    root: PathBuf,
}

impl PendingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Write `explosions`, replacing anything stored before.
    ///
    /// An empty list clears the store instead.
    pub fn save(&self, explosions: &[Explosion]) -> Result<PendingManifest, StoreError> {
        let blocks = explosions.iter().map(Explosion::len).sum();
        let compressed = zstd_compress(&cbor_serialize(explosions)?)?;
        let manifest = PendingManifest {
            schema_version: PENDING_SCHEMA_VERSION,
            sha256: sha256_hex(&compressed),
            explosions: explosions.len(),
            blocks,
            written_at: Utc::now(),
        };
        if explosions.is_empty() {
            self.clear()?;
            return Ok(manifest);
        }
        write_atomic(&self.data_path(), &compressed)?;
        write_atomic(&self.manifest_path(), &serde_json::to_vec_pretty(&manifest)?)?;
        tracing::info!(
            explosions = manifest.explosions,
            blocks = manifest.blocks,
            "pending restorations saved"
        );
        Ok(manifest)
    }

    /// Read stored explosions. Nothing stored yields an empty list.
    ///
    /// Fails closed: a hash or schema mismatch is an error, never a partial load.
    pub fn load(&self) -> Result<Vec<Explosion>, StoreError> {
        let data_path = self.data_path();
        let manifest_path = self.manifest_path();
        if !data_path.exists() {
            return Ok(Vec::new());
        }
        if !manifest_path.exists() {
            return Err(StoreError::MissingManifest);
        }
        let manifest: PendingManifest =
            serde_json::from_reader(std::fs::File::open(&manifest_path)?)?;
        check_schema(manifest.schema_version, PENDING_SCHEMA_VERSION)?;

        let compressed = std::fs::read(&data_path)?;
        let actual = sha256_hex(&compressed);
        if actual != manifest.sha256 {
            return Err(StoreError::IntegrityMismatch {
                expected: manifest.sha256,
                actual,
            });
        }
        let explosions: Vec<Explosion> = cbor_deserialize(&zstd_decompress(&compressed)?)?;
        tracing::debug!(explosions = explosions.len(), "pending restorations loaded");
        Ok(explosions)
    }

    /// Remove stored data, typically after it was re-enqueued.
    pub fn clear(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.data_path())?;
        remove_if_exists(&self.manifest_path())
    }

    /// Move unreadable pending files aside so a later save does not replace them.
    ///
    /// Returns the paths the files were moved to.
    pub fn quarantine(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut moved = Vec::new();
        for path in [self.data_path(), self.manifest_path()] {
            moved.extend(move_aside(&path)?);
        }
        Ok(moved)
    }
}
