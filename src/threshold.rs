use std::{
    sync::RwLock,
    time::SystemTime,
};

use crate::{api::ApiClient, error::AnalyzerError};

/// Where the active threshold came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdProvenance {
    /// Bundled with the autoencoder's metadata; immutable after load.
    Fallback,
    /// Pulled from the backend settings endpoint.
    Remote,
}

#[derive(Clone, Copy, Debug)]
pub struct ThresholdConfig {
    pub value: f64,
    pub provenance: ThresholdProvenance,
    pub updated_at: SystemTime,
}

/// Holds the active classification threshold.
///
/// Resolution is two-slot: the fallback is fixed at construction and the
/// remote override replaces it only when the fetch succeeds with a valid
/// value. A failed or invalid refresh leaves the previous value intact, so
/// readers always observe one complete threshold.
pub struct ThresholdStore {
    fallback: f64,
    active: RwLock<ThresholdConfig>,
}

impl ThresholdStore {
    /// Build the store around the bundled fallback. A non-positive or
    /// non-finite fallback means the model metadata is unusable and
    /// classification must not start.
    pub fn new(fallback: f64) -> Result<Self, AnalyzerError> {
        if !is_valid_threshold(fallback) {
            return Err(AnalyzerError::InvalidThreshold(fallback));
        }

        Ok(Self {
            fallback,
            active: RwLock::new(ThresholdConfig {
                value: fallback,
                provenance: ThresholdProvenance::Fallback,
                updated_at: SystemTime::now(),
            }),
        })
    }

    pub fn value(&self) -> f64 {
        self.active().value
    }

    pub fn active(&self) -> ThresholdConfig {
        match self.active.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn fallback(&self) -> f64 {
        self.fallback
    }

    /// Re-pull the remote override. Failures are logged and swallowed; the
    /// previous value stays active.
    pub fn refresh(&self, api: &ApiClient) {
        match api.fetch_threshold() {
            Ok(value) => {
                if self.apply_remote(value) {
                    log::info!("threshold updated from backend: {value}");
                } else {
                    log::warn!("backend returned invalid threshold {value}, keeping previous");
                }
            }
            Err(err) => {
                log::warn!("threshold refresh failed, keeping previous value: {err}");
            }
        }
    }

    /// Install a remote override if it is positive and finite. Returns
    /// whether the value was applied.
    pub fn apply_remote(&self, value: f64) -> bool {
        if !is_valid_threshold(value) {
            return false;
        }

        let next = ThresholdConfig {
            value,
            provenance: ThresholdProvenance::Remote,
            updated_at: SystemTime::now(),
        };
        match self.active.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        true
    }
}

fn is_valid_threshold(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
