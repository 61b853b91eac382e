//! When sync may touch the network.

use crate::config::SyncConfig;
use parking_lot::Mutex;
use serde::Serialize;

/// Link state reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connectivity {
    pub connected: bool,
    /// Cellular or otherwise billed link.
    pub metered: bool,
}

impl Connectivity {
    pub const OFFLINE: Self = Self {
        connected: false,
        metered: false,
    };

    pub const UNMETERED: Self = Self {
        connected: true,
        metered: false,
    };

    pub const METERED: Self = Self {
        connected: true,
        metered: true,
    };
}

/// Environment-supplied connectivity source.
pub trait ConnectivityProbe: Send + Sync {
    fn current(&self) -> Connectivity;
}

/// Probe whose state the host pushes in (network callbacks, CLI flags).
#[derive(Debug)]
pub struct SharedConnectivity {
    state: Mutex<Connectivity>,
}

impl SharedConnectivity {
    pub fn new(initial: Connectivity) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn set(&self, state: Connectivity) {
        *self.state.lock() = state;
    }
}

impl ConnectivityProbe for SharedConnectivity {
    fn current(&self) -> Connectivity {
        *self.state.lock()
    }
}

/// Why a sync step was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    MeteredLink,
    NoConsent,
    NotConfigured,
}

/// Trust and cost rules for network use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub unmetered_only: bool,
    pub upload_consent: bool,
}

impl SyncPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            unmetered_only: config.unmetered_only,
            upload_consent: config.upload_consent,
        }
    }

    /// Gate for any network step.
    pub fn network_allowed(&self, link: Connectivity) -> Result<(), SkipReason> {
        if !link.connected {
            return Err(SkipReason::Offline);
        }
        if self.unmetered_only && link.metered {
            return Err(SkipReason::MeteredLink);
        }
        Ok(())
    }

    /// Gate for uploading training data.
    pub fn upload_allowed(&self, link: Connectivity) -> Result<(), SkipReason> {
        self.network_allowed(link)?;
        if !self.upload_consent {
            return Err(SkipReason::NoConsent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRICT: SyncPolicy = SyncPolicy {
        unmetered_only: true,
        upload_consent: true,
    };

    #[test]
    fn offline_blocks_everything() {
        assert_eq!(STRICT.network_allowed(Connectivity::OFFLINE), Err(SkipReason::Offline));
        assert_eq!(STRICT.upload_allowed(Connectivity::OFFLINE), Err(SkipReason::Offline));
    }

    #[test]
    fn metered_link_respects_policy() {
        assert_eq!(STRICT.network_allowed(Connectivity::METERED), Err(SkipReason::MeteredLink));
        let relaxed = SyncPolicy {
            unmetered_only: false,
            ..STRICT
        };
        assert!(relaxed.network_allowed(Connectivity::METERED).is_ok());
    }

    #[test]
    fn upload_needs_consent() {
        let no_consent = SyncPolicy {
            upload_consent: false,
            ..STRICT
        };
        assert!(no_consent.network_allowed(Connectivity::UNMETERED).is_ok());
        assert_eq!(
            no_consent.upload_allowed(Connectivity::UNMETERED),
            Err(SkipReason::NoConsent)
        );
    }

    #[test]
    fn shared_probe_reflects_updates() {
        let probe = SharedConnectivity::new(Connectivity::OFFLINE);
        assert!(!probe.current().connected);
        probe.set(Connectivity::UNMETERED);
        assert_eq!(probe.current(), Connectivity::UNMETERED);
    }
}
