use crate::settings::RecoverConfig;
use blastmend_common::{InvalidMaterial, Material};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Errors from loading, validating or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    InvalidMaterial(#[from] InvalidMaterial),
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Materials actually added to or removed from the protected set.
///
/// Empty when the requested material was already in (or absent from) the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedChange {
    pub changed: Vec<Material>,
}

impl ProtectedChange {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Shared, reloadable configuration.
///
/// Readers take a cheap `Arc` snapshot; writers build a new config, persist it,
/// then swap it in.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<RecoverConfig>>,
}

impl ConfigStore {
    /// Load configuration from `path`, writing the defaults there if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = if path.exists() {
            read_config(&path)?
        } else {
            let config = RecoverConfig::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_config(&path, &config)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            config
        };
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(config: RecoverConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current configuration.
    pub fn snapshot(&self) -> Arc<RecoverConfig> {
        Arc::clone(&self.current.read())
    }

    pub fn debug_enabled(&self) -> bool {
        self.current.read().debug
    }

    /// Re-read the backing file. In-memory stores keep their current values.
    ///
    /// On error the previous configuration stays in effect.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let config = read_config(path)?;
        *self.current.write() = Arc::new(config);
        tracing::info!(path = %path.display(), "configuration reloaded");
        Ok(())
    }

    /// Add `material` (and its wall/floor pair) to the protected set and persist.
    pub fn add_protected(&self, material: &Material) -> Result<ProtectedChange, ConfigError> {
        self.update(|config| {
            let mut change = ProtectedChange::default();
            if config.protected_blocks.insert(material.clone()) {
                change.changed.push(material.clone());
            }
            if let Some(pair) = material.wall_pair() {
                if config.protected_blocks.insert(pair.clone()) {
                    change.changed.push(pair);
                }
            }
            change
        })
    }

    /// Remove `material` (and its wall/floor pair) from the protected set and persist.
    pub fn remove_protected(&self, material: &Material) -> Result<ProtectedChange, ConfigError> {
        self.update(|config| {
            let mut change = ProtectedChange::default();
            if config.protected_blocks.remove(material) {
                change.changed.push(material.clone());
            }
            if let Some(pair) = material.wall_pair() {
                if config.protected_blocks.remove(&pair) {
                    change.changed.push(pair);
                }
            }
            change
        })
    }

    /// Set the debug flag and persist. Returns false if it already had that value.
    pub fn set_debug(&self, enabled: bool) -> Result<bool, ConfigError> {
        self.update(|config| {
            let changed = config.debug != enabled;
            config.debug = enabled;
            changed
        })
    }

    /// Apply `f` to a copy of the config, persist it, then publish it.
    ///
    /// The write lock is held throughout so concurrent updates cannot lose each other.
    fn update<T>(&self, f: impl FnOnce(&mut RecoverConfig) -> T) -> Result<T, ConfigError> {
        let mut guard = self.current.write();
        let mut next = RecoverConfig::clone(&guard);
        let out = f(&mut next);
        if next != **guard {
            if let Some(path) = &self.path {
                write_config(path, &next)?;
            }
            *guard = Arc::new(next);
        }
        Ok(out)
    }
}

fn read_config(path: &Path) -> Result<RecoverConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: RecoverConfig = serde_yaml::from_str(&text)?;
    config
        .validate()
        .map_err(|reason| ConfigError::Invalid { reason })?;
    Ok(config)
}

fn write_config(path: &Path, config: &RecoverConfig) -> Result<(), ConfigError> {
    let text = serde_yaml::to_string(config)?;
    std::fs::write(path, text)?;
    Ok(())
}
