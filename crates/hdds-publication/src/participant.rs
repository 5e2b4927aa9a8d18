// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owner contracts: the domain participant and the publisher.
//!
//! The engine holds both as `Weak` back-references, resolved on use. A
//! failed upgrade means the owner is being torn down and the engine treats
//! it as absent.

use crate::error::Result;
use crate::filter::FilterCache;
use crate::listener::{DataWriterListener, StatusMask};
use crate::qos::Presentation;
use crate::types::{Guid, InstanceHandle};
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Security plugin hooks consulted before instance mutations.
pub trait AccessControl: Send + Sync {
    fn check_register_instance(&self, publication: &Guid, key: &[u8]) -> bool;

    fn check_dispose_instance(&self, publication: &Guid, key: &[u8]) -> bool;
}

pub trait DomainParticipant: Send + Sync {
    fn participant_id(&self) -> Guid;

    /// Allocate a process-scoped handle (instances, matched readers).
    fn assign_handle(&self) -> InstanceHandle;

    fn return_handle(&self, handle: InstanceHandle);

    /// Shared content-filter evaluator cache.
    fn filter_cache(&self) -> Arc<FilterCache>;

    /// Participant-wide liveliness assertion (MANUAL_BY_PARTICIPANT).
    fn assert_liveliness(&self) -> Result<()>;

    fn access_control(&self) -> Option<Arc<dyn AccessControl>> {
        None
    }
}

pub trait PublisherRef: Send + Sync {
    fn publisher_id(&self) -> Guid;

    fn is_enabled(&self) -> bool;

    /// Publications are being held back (`suspend_publications`).
    fn is_suspended(&self) -> bool;

    fn presentation(&self) -> Presentation;

    /// Publisher listener when its mask covers `status`.
    fn listener_for(&self, status: StatusMask) -> Option<Arc<dyn DataWriterListener>> {
        let _ = status;
        None
    }

    fn writer_enabled(&self, publication: &Guid) {
        let _ = publication;
    }
}

/// Handle allocator for participant implementations.
///
/// Returned handles are recycled before fresh ones are minted; handle 0 is
/// never issued.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU32,
    free: SegQueue<InstanceHandle>,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            free: SegQueue::new(),
        }
    }

    pub fn allocate(&self) -> InstanceHandle {
        self.free
            .pop()
            .unwrap_or_else(|| InstanceHandle(self.next.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn release(&self, handle: InstanceHandle) {
        if !handle.is_nil() {
            self.free.push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_recycled() {
        let alloc = HandleAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a, InstanceHandle(1));
        assert_eq!(b, InstanceHandle(2));
        alloc.release(a);
        alloc.release(InstanceHandle::NIL);
        assert_eq!(alloc.allocate(), a);
        assert_eq!(alloc.allocate(), InstanceHandle(3));
    }
}
