// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LIVELINESS QoS policy (DDS v1.4 Sec.2.2.3.10).

use std::time::Duration;

/// LIVELINESS QoS kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivelinessKind {
    /// The engine asserts liveliness on every write and from its send task.
    #[default]
    Automatic,
    /// Application asserts through the participant.
    ManualByParticipant,
    /// Application asserts per writer.
    ManualByTopic,
}

/// LIVELINESS QoS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    pub lease_duration: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: Duration::from_secs(u64::MAX),
        }
    }
}

impl Liveliness {
    #[must_use]
    pub fn new(kind: LivelinessKind, lease_duration: Duration) -> Self {
        Self {
            kind,
            lease_duration,
        }
    }

    #[must_use]
    pub fn automatic(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::Automatic, lease_duration)
    }

    #[must_use]
    pub fn manual_by_participant(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::ManualByParticipant, lease_duration)
    }

    #[must_use]
    pub fn manual_by_topic(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::ManualByTopic, lease_duration)
    }

    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.lease_duration == Duration::from_secs(u64::MAX)
    }

    /// Interval at which the assert task fires: `lease * factor / 100`,
    /// never below one microsecond.
    #[must_use]
    pub fn send_interval(&self, factor_percent: u32) -> Duration {
        let scaled = self.lease_duration.as_secs_f64() * (f64::from(factor_percent) / 100.0);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.lease_duration)
            .max(Duration::from_micros(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_infinite_automatic() {
        let l = Liveliness::default();
        assert_eq!(l.kind, LivelinessKind::Automatic);
        assert!(l.is_infinite());
    }

    #[test]
    fn test_send_interval_scales_with_factor() {
        let l = Liveliness::automatic(Duration::from_millis(100));
        assert_eq!(l.send_interval(80), Duration::from_millis(80));
        assert_eq!(l.send_interval(0), Duration::from_micros(1));
    }
}
