use crate::region::{NoRegions, RecoveryFlag, RegionProvider};
use blastmend_common::{Location, Material};
use blastmend_config::RecoverConfig;
use std::fmt;
use std::sync::Arc;

/// Region flag that opts a location in to (`allow`) or out of (`deny`) recovery.
pub const RECOVERY_FLAG: &str = "explosion-recover";
/// Region flag consulted by the TNT fallback check.
pub const TNT_FLAG: &str = "tnt";

/// What happens to one block of an explosion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyDecision {
    /// Never destroyed; removed from the explosion entirely.
    AlwaysProtected,
    /// Destroyed and never restored.
    Blacklisted,
    /// Destroyed and not restored because recovery does not apply here.
    RecoveryBlocked,
    /// Destroyed, captured and queued for restoration.
    Recoverable,
}

/// Why the location-level gate resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    /// Region integration disabled in config, or the provider is not installed.
    ProviderUnavailable,
    /// The provider failed; treated as unavailable.
    ProviderError,
    FlagAllow,
    FlagDeny,
    /// Flag unset and a sub-region explicitly allows TNT.
    TntSubregion,
    /// Flag unset and nothing opts out.
    Unset,
    /// The explosion source is not in the configured source list.
    SourceFiltered,
}

impl GateReason {
    /// Whether recovery applies at the location.
    pub fn applies(self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable | Self::ProviderError | Self::FlagAllow | Self::Unset
        )
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ProviderUnavailable => "no region provider",
            Self::ProviderError => "region provider failed, defaulting to allow",
            Self::FlagAllow => "'explosion-recover' flag is allow",
            Self::FlagDeny => "'explosion-recover' flag is deny",
            Self::TntSubregion => "TNT explicitly allowed in a sub-region",
            Self::Unset => "no region opts out",
            Self::SourceFiltered => "explosion source not handled",
        };
        f.write_str(text)
    }
}

/// Outcome of running the gate over one explosion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// One decision per input block, in input order.
    pub decisions: Vec<PolicyDecision>,
    pub gate: GateReason,
}

impl Resolution {
    pub fn applies(&self) -> bool {
        self.gate.applies()
    }

    pub fn count(&self, decision: PolicyDecision) -> usize {
        self.decisions.iter().filter(|d| **d == decision).count()
    }
}

/// Resolves protection, blacklist and region policy into one decision per block.
#[derive(Clone)]
pub struct PolicyGate {
    provider: Arc<dyn RegionProvider>,
}

impl PolicyGate {
    pub fn new(provider: Arc<dyn RegionProvider>) -> Self {
        Self { provider }
    }

    /// A gate with no region system behind it.
    pub fn without_regions() -> Self {
        Self::new(Arc::new(NoRegions))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Decide the fate of every block of an explosion caused by `source` at `location`.
    pub fn resolve<'a, I>(
        &self,
        config: &RecoverConfig,
        source: &str,
        location: &Location,
        materials: I,
    ) -> Resolution
    where
        I: IntoIterator<Item = &'a Material>,
    {
        let gate = self.location_gate(config, source, location);
        let applies = gate.applies();
        let decisions = materials
            .into_iter()
            .map(|material| {
                if config.is_protected(material) {
                    PolicyDecision::AlwaysProtected
                } else if !applies {
                    PolicyDecision::RecoveryBlocked
                } else if config.is_blacklisted(material) {
                    PolicyDecision::Blacklisted
                } else {
                    PolicyDecision::Recoverable
                }
            })
            .collect();
        Resolution { decisions, gate }
    }

    /// Location-level gate, evaluated once per explosion.
    pub fn location_gate(
        &self,
        config: &RecoverConfig,
        source: &str,
        location: &Location,
    ) -> GateReason {
        if !config.allows_source(source) {
            return GateReason::SourceFiltered;
        }
        if !config.regions.integration || !self.provider.is_available() {
            return GateReason::ProviderUnavailable;
        }

        match self.provider.query_recovery_flag(location) {
            Ok(RecoveryFlag::Allow) => return GateReason::FlagAllow,
            Ok(RecoveryFlag::Deny) => return GateReason::FlagDeny,
            Ok(RecoveryFlag::Unset) => {}
            Err(err) => {
                tracing::debug!(provider = self.provider.name(), %err, "recovery flag query failed");
                return GateReason::ProviderError;
            }
        }

        if !config.regions.tnt_check {
            return GateReason::Unset;
        }
        match self.provider.tnt_allowed_in_subregion(location) {
            Ok(true) => GateReason::TntSubregion,
            Ok(false) => GateReason::Unset,
            Err(err) => {
                tracing::debug!(provider = self.provider.name(), %err, "TNT flag lookup failed");
                GateReason::ProviderError
            }
        }
    }
}

impl fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyGate")
            .field("provider", &self.provider.name())
            .finish()
    }
}
