// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS policies governing one publication.
//!
//! Validation (`is_valid`, `is_consistent`) and the immutable-after-enable
//! rule (`changeable_to`) live here so `set_qos` stays a thin sequence of
//! checks.
//!
//! # Examples
//!
//! ```
//! use hdds_publication::qos::{DataWriterQos, Durability, History};
//! use std::time::Duration;
//!
//! let qos = DataWriterQos::reliable()
//!     .durability(Durability::TransientLocal)
//!     .history(History::KeepLast(5))
//!     .lifespan(Duration::from_secs(10));
//! assert!(qos.is_valid() && qos.is_consistent());
//! ```

mod liveliness;
mod presentation;

pub use liveliness::{Liveliness, LivelinessKind};
pub use presentation::{Presentation, PresentationAccessScope};

use std::time::Duration;

/// DDS `LENGTH_UNLIMITED` for resource limits.
pub const LENGTH_UNLIMITED: usize = usize::MAX;

/// Duration used for "infinite" policies.
pub const DURATION_INFINITE: Duration = Duration::from_secs(u64::MAX);

/// Reliability policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Reliability {
    /// Fire-and-forget (no ACKs).
    #[default]
    BestEffort,
    /// Acknowledged delivery; enables `wait_for_acknowledgments`.
    Reliable,
}

/// Durability policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Durability {
    /// Late joiners get nothing.
    #[default]
    Volatile,
    /// Writer replays retained history to late-joining durable readers.
    TransientLocal,
}

/// History policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep last N samples per instance, evicting the oldest.
    KeepLast(u32),
    /// Keep all samples within resource limits (writes block when full).
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(1)
    }
}

/// Resource limits for the sample store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: usize,
    pub max_instances: usize,
    pub max_samples_per_instance: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: LENGTH_UNLIMITED,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
        }
    }
}

/// LIFESPAN QoS policy: maximum validity of a written sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifespan {
    pub duration: Duration,
}

impl Default for Lifespan {
    fn default() -> Self {
        Self {
            duration: DURATION_INFINITE,
        }
    }
}

impl Lifespan {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn is_infinite(&self) -> bool {
        self.duration == DURATION_INFINITE
    }

    /// Whether a sample of age `age` is still valid.
    pub fn admits(&self, age: Duration) -> bool {
        self.is_infinite() || age <= self.duration
    }
}

/// DEADLINE QoS policy: maximum period between updates of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub period: Duration,
}

impl Default for Deadline {
    fn default() -> Self {
        Self {
            period: DURATION_INFINITE,
        }
    }
}

/// WRITER_DATA_LIFECYCLE QoS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterDataLifecycle {
    /// Unregister also disposes (DISPOSE_UNREGISTER_INSTANCE).
    pub autodispose_unregistered_instances: bool,
}

impl Default for WriterDataLifecycle {
    fn default() -> Self {
        Self {
            autodispose_unregistered_instances: true,
        }
    }
}

/// QoS of one DataWriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataWriterQos {
    pub reliability: Reliability,
    /// Upper bound on buffer acquisition under resource back-pressure.
    pub max_blocking_time: Duration,
    pub durability: Durability,
    pub history: History,
    pub resource_limits: ResourceLimits,
    pub liveliness: Liveliness,
    pub lifespan: Lifespan,
    pub deadline: Deadline,
    pub writer_data_lifecycle: WriterDataLifecycle,
    pub ownership_strength: i32,
}

impl Default for DataWriterQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            max_blocking_time: Duration::from_millis(100),
            durability: Durability::Volatile,
            history: History::default(),
            resource_limits: ResourceLimits::default(),
            liveliness: Liveliness::default(),
            lifespan: Lifespan::default(),
            deadline: Deadline::default(),
            writer_data_lifecycle: WriterDataLifecycle::default(),
            ownership_strength: 0,
        }
    }
}

impl DataWriterQos {
    #[must_use]
    pub fn best_effort() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    #[must_use]
    pub fn history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    #[must_use]
    pub fn liveliness(mut self, liveliness: Liveliness) -> Self {
        self.liveliness = liveliness;
        self
    }

    #[must_use]
    pub fn lifespan(mut self, duration: Duration) -> Self {
        self.lifespan = Lifespan::new(duration);
        self
    }

    #[must_use]
    pub fn max_blocking_time(mut self, duration: Duration) -> Self {
        self.max_blocking_time = duration;
        self
    }

    #[must_use]
    pub fn autodispose(mut self, enabled: bool) -> Self {
        self.writer_data_lifecycle.autodispose_unregistered_instances = enabled;
        self
    }

    pub fn is_reliable(&self) -> bool {
        self.reliability == Reliability::Reliable
    }

    pub fn is_durable(&self) -> bool {
        self.durability > Durability::Volatile
    }

    /// Every individual policy holds a legal value.
    pub fn is_valid(&self) -> bool {
        let limits = &self.resource_limits;
        if matches!(self.history, History::KeepLast(0)) {
            return false;
        }
        limits.max_samples > 0 && limits.max_instances > 0 && limits.max_samples_per_instance > 0
    }

    /// Policies agree with each other.
    pub fn is_consistent(&self) -> bool {
        let limits = &self.resource_limits;
        if limits.max_samples_per_instance > limits.max_samples {
            return false;
        }
        match self.history {
            History::KeepLast(depth) => depth as usize <= limits.max_samples_per_instance,
            History::KeepAll => true,
        }
    }

    /// Whether an enabled writer may switch from `self` to `new`.
    ///
    /// Returns the name of the first immutable policy that differs.
    pub fn changeable_to(&self, new: &DataWriterQos) -> Result<(), &'static str> {
        if self.reliability != new.reliability {
            return Err("RELIABILITY");
        }
        if self.durability != new.durability {
            return Err("DURABILITY");
        }
        if self.history != new.history {
            return Err("HISTORY");
        }
        if self.resource_limits != new.resource_limits {
            return Err("RESOURCE_LIMITS");
        }
        if self.liveliness != new.liveliness {
            return Err("LIVELINESS");
        }
        Ok(())
    }
}

/// QoS of the owning publisher that the engine consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublisherQos {
    pub presentation: Presentation,
}
