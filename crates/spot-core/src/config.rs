//! Rescheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReschedulerError, Result};

/// Default time between housekeeping cycles.
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(10);

/// Default time to wait after a drain attempt before the next one.
pub const DEFAULT_NODE_DRAIN_DELAY: Duration = Duration::from_secs(10 * 60);

/// Default time to keep retrying the eviction of a single pod.
pub const DEFAULT_POD_EVICTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Default upper bound on a pod's graceful termination period.
pub const DEFAULT_MAX_GRACEFUL_TERMINATION: Duration = Duration::from_secs(2 * 60);

/// Default label key identifying on-demand worker nodes.
pub const DEFAULT_ON_DEMAND_LABEL: &str = "node-role.kubernetes.io/worker";

/// Default label key identifying spot worker nodes.
pub const DEFAULT_SPOT_LABEL: &str = "node-role.kubernetes.io/spot-worker";

/// Configuration of the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReschedulerConfig {
    /// Time between housekeeping cycles.
    pub housekeeping_interval: Duration,
    /// Cooldown after every drain attempt, successful or not.
    pub node_drain_delay: Duration,
    /// How long to keep retrying the eviction of one pod.
    pub pod_eviction_timeout: Duration,
    /// Grace period cap handed to each eviction.
    pub max_graceful_termination: Duration,
    /// Label key marking on-demand nodes.
    pub on_demand_label: String,
    /// Label key marking spot nodes.
    pub spot_label: String,
    /// Plan and log drains without evicting anything.
    pub dry_run: bool,
}

impl Default for ReschedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ReschedulerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            housekeeping_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
            node_drain_delay: DEFAULT_NODE_DRAIN_DELAY,
            pod_eviction_timeout: DEFAULT_POD_EVICTION_TIMEOUT,
            max_graceful_termination: DEFAULT_MAX_GRACEFUL_TERMINATION,
            on_demand_label: DEFAULT_ON_DEMAND_LABEL.to_string(),
            spot_label: DEFAULT_SPOT_LABEL.to_string(),
            dry_run: false,
        }
    }

    /// Sets the housekeeping interval.
    #[must_use]
    pub const fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    /// Sets the delay between drain attempts.
    #[must_use]
    pub const fn with_node_drain_delay(mut self, delay: Duration) -> Self {
        self.node_drain_delay = delay;
        self
    }

    /// Sets the per-pod eviction timeout.
    #[must_use]
    pub const fn with_pod_eviction_timeout(mut self, timeout: Duration) -> Self {
        self.pod_eviction_timeout = timeout;
        self
    }

    /// Sets the graceful termination cap.
    #[must_use]
    pub const fn with_max_graceful_termination(mut self, grace: Duration) -> Self {
        self.max_graceful_termination = grace;
        self
    }

    /// Sets the on-demand node label key.
    #[must_use]
    pub fn with_on_demand_label(mut self, label: impl Into<String>) -> Self {
        self.on_demand_label = label.into();
        self
    }

    /// Sets the spot node label key.
    #[must_use]
    pub fn with_spot_label(mut self, label: impl Into<String>) -> Self {
        self.spot_label = label.into();
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an interval is zero or the label keys are empty or equal.
    pub fn validate(&self) -> Result<()> {
        if self.housekeeping_interval.is_zero() {
            return Err(invalid("housekeeping interval must be greater than zero"));
        }
        if self.pod_eviction_timeout.is_zero() {
            return Err(invalid("pod eviction timeout must be greater than zero"));
        }
        if self.on_demand_label.trim().is_empty() {
            return Err(invalid("on-demand node label must not be empty"));
        }
        if self.spot_label.trim().is_empty() {
            return Err(invalid("spot node label must not be empty"));
        }
        if self.on_demand_label == self.spot_label {
            return Err(invalid("on-demand and spot node labels must differ"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ReschedulerError {
    ReschedulerError::InvalidConfig {
        reason: reason.to_string(),
    }
}
