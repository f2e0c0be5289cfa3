use std::fmt;

use serde::{Deserialize, Serialize};

/// Routing state of one provider. Ordered from most to least preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderState {
    Healthy,
    Degraded,
    Unavailable,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderState::Healthy => "healthy",
            ProviderState::Degraded => "degraded",
            ProviderState::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// What the orchestrator observed about a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// A routed call failed or timed out
    CallFailed,
    ProbeSucceeded,
    ProbeFailed,
}

/// Per-provider state machine.
///
/// A failed call can only degrade a provider. Probes decide everything
/// else: one success restores `Healthy`, `unavailable_after` consecutive
/// failures make it `Unavailable`.
#[derive(Debug, Clone)]
pub(crate) struct HealthTracker {
    state: ProviderState,
    failed_probes: u32,
    unavailable_after: u32,
}

impl HealthTracker {
    pub fn new(unavailable_after: u32) -> Self {
        Self {
            state: ProviderState::Healthy,
            failed_probes: 0,
            unavailable_after: unavailable_after.max(1),
        }
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    /// Apply `event`, returning `(from, to)` when the state changed.
    pub fn record(&mut self, event: HealthEvent) -> Option<(ProviderState, ProviderState)> {
        let before = self.state;
        match event {
            HealthEvent::CallFailed => {
                if self.state == ProviderState::Healthy {
                    self.state = ProviderState::Degraded;
                }
            }
            HealthEvent::ProbeSucceeded => {
                self.failed_probes = 0;
                self.state = ProviderState::Healthy;
            }
            HealthEvent::ProbeFailed => {
                self.failed_probes = self.failed_probes.saturating_add(1);
                self.state = if self.failed_probes >= self.unavailable_after {
                    ProviderState::Unavailable
                } else {
                    ProviderState::Degraded
                };
            }
        }
        (before != self.state).then_some((before, self.state))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_call_failures_only_degrade() {
        let mut tracker = HealthTracker::new(3);
        assert_eq!(
            tracker.record(HealthEvent::CallFailed),
            Some((ProviderState::Healthy, ProviderState::Degraded))
        );
        for _ in 0..10 {
            assert_eq!(tracker.record(HealthEvent::CallFailed), None);
        }
        assert_eq!(tracker.state(), ProviderState::Degraded);
    }

    #[test]
    fn test_health_checks_drive_unavailable_and_recovery() {
        let mut tracker = HealthTracker::new(3);
        tracker.record(HealthEvent::ProbeFailed);
        tracker.record(HealthEvent::ProbeFailed);
        assert_eq!(tracker.state(), ProviderState::Degraded);
        assert_eq!(
            tracker.record(HealthEvent::ProbeFailed),
            Some((ProviderState::Degraded, ProviderState::Unavailable))
        );
        assert_eq!(
            tracker.record(HealthEvent::ProbeSucceeded),
            Some((ProviderState::Unavailable, ProviderState::Healthy))
        );
        tracker.record(HealthEvent::ProbeFailed);
        assert_eq!(tracker.state(), ProviderState::Degraded);
    }
}
