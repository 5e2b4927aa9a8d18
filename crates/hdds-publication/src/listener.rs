// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer listener, observer and communication status types.
//!
//! # Thread Safety
//!
//! Callbacks run on application threads, the liveliness timer threads or
//! transport completion threads, always with the engine's main lock
//! released. They may call back into the engine but should not block.

use crate::types::{Guid, InstanceHandle, SequenceNumber};
use std::ops::{BitAnd, BitOr, Not};

/// DDS QoS policy ids reported by OFFERED_INCOMPATIBLE_QOS.
pub mod policy_id {
    pub const DURABILITY: u32 = 2;
    pub const PRESENTATION: u32 = 3;
    pub const DEADLINE: u32 = 4;
    pub const OWNERSHIP: u32 = 6;
    pub const LIVELINESS: u32 = 8;
    pub const RELIABILITY: u32 = 11;
    pub const DESTINATION_ORDER: u32 = 12;
}

/// Bit mask selecting communication statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusMask(u32);

impl StatusMask {
    pub const NONE: StatusMask = StatusMask(0);
    pub const ALL: StatusMask = StatusMask(0xFFFF_FFFF);

    /// Liveliness lost (DataWriter)
    pub const LIVELINESS_LOST: StatusMask = StatusMask(1 << 7);

    /// Offered deadline missed (DataWriter)
    pub const OFFERED_DEADLINE_MISSED: StatusMask = StatusMask(1 << 8);

    /// Offered incompatible QoS (DataWriter)
    pub const OFFERED_INCOMPATIBLE_QOS: StatusMask = StatusMask(1 << 9);

    /// Publication matched (DataWriter)
    pub const PUBLICATION_MATCHED: StatusMask = StatusMask(1 << 10);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        StatusMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: StatusMask) -> bool {
        (self.0 & other.0) == other.0
    }

    #[must_use]
    pub const fn or(self, other: StatusMask) -> StatusMask {
        StatusMask(self.0 | other.0)
    }

    #[must_use]
    pub const fn and(self, other: StatusMask) -> StatusMask {
        StatusMask(self.0 & other.0)
    }
}

impl BitOr for StatusMask {
    type Output = StatusMask;

    fn bitor(self, rhs: StatusMask) -> StatusMask {
        self.or(rhs)
    }
}

impl BitAnd for StatusMask {
    type Output = StatusMask;

    fn bitand(self, rhs: StatusMask) -> StatusMask {
        self.and(rhs)
    }
}

impl Not for StatusMask {
    type Output = StatusMask;

    fn not(self) -> StatusMask {
        StatusMask(!self.0)
    }
}

/// Status information for publication matching events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationMatchedStatus {
    /// Total cumulative count of matched subscriptions.
    pub total_count: u32,
    /// Change in total_count since the status was last read.
    pub total_count_change: i32,
    /// Current number of matched subscriptions.
    pub current_count: u32,
    /// Change in current_count since the status was last read.
    pub current_count_change: i32,
    /// Handle of the last matched/unmatched subscription.
    pub last_subscription_handle: InstanceHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivelinessLostStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferedDeadlineMissedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_instance_handle: InstanceHandle,
}

/// Per-policy incompatibility counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosPolicyCount {
    pub policy_id: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferedIncompatibleQosStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_policy_id: u32,
    pub policies: Vec<QosPolicyCount>,
}

impl OfferedIncompatibleQosStatus {
    /// Count one incompatible reader against each policy in `policies`.
    pub fn record(&mut self, policies: &[u32]) {
        self.total_count += 1;
        self.total_count_change += 1;
        if let Some(last) = policies.first() {
            self.last_policy_id = *last;
        }
        for id in policies {
            match self.policies.iter_mut().find(|p| p.policy_id == *id) {
                Some(entry) => entry.count += 1,
                None => self.policies.push(QosPolicyCount {
                    policy_id: *id,
                    count: 1,
                }),
            }
        }
    }
}

/// Information about one matched subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBuiltinTopicData {
    pub key: Guid,
    pub handle: InstanceHandle,
    pub durable: bool,
    pub filter_class: Option<String>,
    pub filter_expression: Option<String>,
    pub filter_params: Vec<String>,
    pub expected_sequence: SequenceNumber,
}

/// Listener for DataWriter communication statuses.
///
/// All methods have default no-op implementations.
///
/// # Example
///
/// ```ignore
/// struct MyWriterListener;
///
/// impl DataWriterListener for MyWriterListener {
///     fn on_publication_matched(&self, status: PublicationMatchedStatus) {
///         println!("Matched with {} readers", status.current_count);
///     }
/// }
/// ```
pub trait DataWriterListener: Send + Sync {
    fn on_publication_matched(&self, status: PublicationMatchedStatus) {
        let _ = status;
    }

    /// Called once per transition into "liveliness lost".
    fn on_liveliness_lost(&self, status: LivelinessLostStatus) {
        let _ = status;
    }

    fn on_offered_deadline_missed(&self, status: OfferedDeadlineMissedStatus) {
        let _ = status;
    }

    fn on_offered_incompatible_qos(&self, status: OfferedIncompatibleQosStatus) {
        let _ = status;
    }

    /// Transport lost contact with `readers` (may reconnect).
    fn on_publication_disconnected(&self, readers: &[Guid]) {
        let _ = readers;
    }

    fn on_publication_reconnected(&self, readers: &[Guid]) {
        let _ = readers;
    }

    /// Transport gave up on `readers`.
    fn on_publication_lost(&self, readers: &[Guid]) {
        let _ = readers;
    }
}

/// Instrumentation hook over writer lifecycle events.
///
/// Distinct from [`DataWriterListener`]: observers see every event
/// regardless of status masks and never influence the engine.
pub trait WriterObserver: Send + Sync {
    fn on_enabled(&self, publication: &Guid) {
        let _ = publication;
    }

    fn on_deleted(&self, publication: &Guid) {
        let _ = publication;
    }

    fn on_qos_changed(&self, publication: &Guid) {
        let _ = publication;
    }

    fn on_associated(&self, publication: &Guid, reader: &Guid) {
        let _ = (publication, reader);
    }

    fn on_disassociated(&self, publication: &Guid, reader: &Guid) {
        let _ = (publication, reader);
    }

    fn on_sample_sent(&self, publication: &Guid, instance: InstanceHandle, sequence: SequenceNumber) {
        let _ = (publication, instance, sequence);
    }

    fn on_disposed(&self, publication: &Guid, instance: InstanceHandle) {
        let _ = (publication, instance);
    }

    fn on_unregistered(&self, publication: &Guid, instance: InstanceHandle) {
        let _ = (publication, instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mask_ops() {
        let mask = StatusMask::LIVELINESS_LOST | StatusMask::PUBLICATION_MATCHED;
        assert!(mask.contains(StatusMask::LIVELINESS_LOST));
        assert!(!mask.contains(StatusMask::OFFERED_DEADLINE_MISSED));
        assert_eq!((mask & StatusMask::PUBLICATION_MATCHED), StatusMask::PUBLICATION_MATCHED);
        assert_eq!(StatusMask::from_bits(1 << 9), StatusMask::OFFERED_INCOMPATIBLE_QOS);
        assert!(StatusMask::ALL.contains(mask));
    }

    #[test]
    fn test_incompatible_qos_record() {
        let mut status = OfferedIncompatibleQosStatus::default();
        status.record(&[policy_id::RELIABILITY]);
        status.record(&[policy_id::DURABILITY, policy_id::RELIABILITY]);
        assert_eq!(status.total_count, 2);
        assert_eq!(status.last_policy_id, policy_id::DURABILITY);
        let rel = status
            .policies
            .iter()
            .find(|p| p.policy_id == policy_id::RELIABILITY)
            .unwrap();
        assert_eq!(rel.count, 2);
    }
}
