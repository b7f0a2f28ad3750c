//! Scripted and random faults for the in-memory consensus log.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// How a single proposal misbehaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusFault {
    /// The proposal is definitely not committed
    Reject,
    /// The proposal commits, but the proposer is told the outcome is unknown
    AmbiguousCommitted,
    /// The proposal is lost, and the proposer is told the outcome is unknown
    AmbiguousDropped,
    /// The proposal commits after the given delay
    Delay(Duration),
    /// The proposal never resolves
    Hang,
}

impl ConsensusFault {
    /// Returns true if the effect reaches the log despite the fault.
    pub fn commits(&self) -> bool {
        matches!(
            self,
            ConsensusFault::AmbiguousCommitted | ConsensusFault::Delay(_)
        )
    }
}

/// Hands out faults for successive proposals.
///
/// Scripted faults are consumed first, in order. Once the script is empty,
/// proposals are rejected at random with the configured rate.
#[derive(Debug, Default)]
pub struct FaultInjector {
    scripted: Mutex<VecDeque<ConsensusFault>>,
    reject_rate: Mutex<f64>,
    injected: AtomicU64,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fault for the next unscripted proposal.
    pub fn inject(&self, fault: ConsensusFault) {
        self.scripted.lock().push_back(fault);
    }

    pub fn inject_all(&self, faults: impl IntoIterator<Item = ConsensusFault>) {
        self.scripted.lock().extend(faults);
    }

    /// Rejects each unscripted proposal with probability `rate`.
    pub fn set_reject_rate(&self, rate: f64) {
        *self.reject_rate.lock() = rate.clamp(0.0, 1.0);
    }

    pub fn clear(&self) {
        self.scripted.lock().clear();
        *self.reject_rate.lock() = 0.0;
    }

    pub fn pending(&self) -> usize {
        self.scripted.lock().len()
    }

    pub fn injected_count(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    pub fn next_fault(&self) -> Option<ConsensusFault> {
        let fault = self.scripted.lock().pop_front().or_else(|| {
            let rate = *self.reject_rate.lock();
            (rate > 0.0 && rand::thread_rng().gen_bool(rate)).then_some(ConsensusFault::Reject)
        });
        if let Some(fault) = &fault {
            self.injected.fetch_add(1, Ordering::Relaxed);
            debug!("Injecting consensus fault {:?}", fault);
        }
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_faults_in_order() {
        let injector = FaultInjector::new();
        injector.inject_all([ConsensusFault::Reject, ConsensusFault::Hang]);
        assert_eq!(injector.pending(), 2);
        assert_eq!(injector.next_fault(), Some(ConsensusFault::Reject));
        assert_eq!(injector.next_fault(), Some(ConsensusFault::Hang));
        assert_eq!(injector.next_fault(), None);
        assert_eq!(injector.injected_count(), 2);
    }

    #[test]
    fn test_reject_rate_extremes() {
        let injector = FaultInjector::new();
        injector.set_reject_rate(1.0);
        assert_eq!(injector.next_fault(), Some(ConsensusFault::Reject));
        injector.clear();
        assert!((0..100).all(|_| injector.next_fault().is_none()));
    }

    #[test]
    fn test_commit_classification() {
        assert!(ConsensusFault::AmbiguousCommitted.commits());
        assert!(ConsensusFault::Delay(Duration::from_millis(1)).commits());
        assert!(!ConsensusFault::AmbiguousDropped.commits());
        assert!(!ConsensusFault::Reject.commits());
    }
}
