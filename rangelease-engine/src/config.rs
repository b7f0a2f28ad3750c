use rangelease_core::lease::LeaseType;
use rangelease_core::{LeaseError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Length of expiration-based leases
    pub range_lease_duration: Duration,
    /// How long to wait for a lease proposal to commit before reporting an
    /// ambiguous outcome
    pub proposal_timeout: Duration,
    /// Flavor of leases acquired by this store
    pub lease_type: LeaseType,
    /// Buffer size of the lease-change broadcast channel
    pub notification_capacity: usize,
    pub max_clock_offset: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            range_lease_duration: Duration::from_secs(6),
            proposal_timeout: Duration::from_secs(10),
            lease_type: LeaseType::Epoch,
            notification_capacity: 1024,
            max_clock_offset: Duration::from_millis(500),
        }
    }
}

impl LeaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range_lease_duration(mut self, duration: Duration) -> Self {
        self.range_lease_duration = duration;
        self
    }

    pub fn with_proposal_timeout(mut self, timeout: Duration) -> Self {
        self.proposal_timeout = timeout;
        self
    }

    pub fn with_lease_type(mut self, lease_type: LeaseType) -> Self {
        self.lease_type = lease_type;
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn with_max_clock_offset(mut self, offset: Duration) -> Self {
        self.max_clock_offset = offset;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.range_lease_duration.is_zero() {
            return Err(LeaseError::internal("range lease duration must be positive"));
        }
        if self.proposal_timeout.is_zero() {
            return Err(LeaseError::internal("proposal timeout must be positive"));
        }
        if self.notification_capacity == 0 {
            return Err(LeaseError::internal(
                "notification capacity must be positive",
            ));
        }
        // An expiration lease shorter than the clock uncertainty could be
        // considered valid by two holders at once.
        if self.lease_type == LeaseType::Expiration
            && self.range_lease_duration <= self.max_clock_offset
        {
            return Err(LeaseError::internal(format!(
                "range lease duration {:?} must exceed max clock offset {:?}",
                self.range_lease_duration, self.max_clock_offset
            )));
        }
        Ok(())
    }
}
