use blastmend_common::Location;
use serde::{Deserialize, Serialize};

/// Errors from an external region-protection provider.
///
/// The gate treats every variant as "provider unavailable".
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("region provider {0} is not available")]
    Unavailable(String),
    #[error("region query failed: {0}")]
    Query(String),
    #[error("failed to load region definitions: {0}")]
    Load(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A flag value explicitly set on a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagValue {
    Allow,
    Deny,
}

/// Effective value of the recovery flag at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryFlag {
    Allow,
    Deny,
    Unset,
}

impl From<Option<FlagValue>> for RecoveryFlag {
    fn from(value: Option<FlagValue>) -> Self {
        match value {
            Some(FlagValue::Allow) => Self::Allow,
            Some(FlagValue::Deny) => Self::Deny,
            None => Self::Unset,
        }
    }
}

/// Capability interface onto an external region-protection system.
///
/// One implementation per backend, chosen at startup. Calls happen on the
/// host's world context and must not block for long.
pub trait RegionProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the backend is present and usable.
    fn is_available(&self) -> bool;

    /// Effective recovery flag at `location`.
    fn query_recovery_flag(&self, location: &Location) -> Result<RecoveryFlag, IntegrationError>;

    /// Whether a non-global region at `location` explicitly allows TNT while the
    /// world's global region does not.
    fn tnt_allowed_in_subregion(&self, location: &Location) -> Result<bool, IntegrationError>;
}

/// Provider used when no region system is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegions;

impl RegionProvider for NoRegions {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn query_recovery_flag(&self, _location: &Location) -> Result<RecoveryFlag, IntegrationError> {
        Err(IntegrationError::Unavailable(self.name().to_owned()))
    }

    fn tnt_allowed_in_subregion(&self, _location: &Location) -> Result<bool, IntegrationError> {
        Err(IntegrationError::Unavailable(self.name().to_owned()))
    }
}
