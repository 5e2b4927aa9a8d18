// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample store contract.
//!
//! The store owns every queued item once enqueued: history retention,
//! resource limits, blocking buffer acquisition and acknowledgment
//! tracking. The engine drives it through [`SampleStore`] and never keeps
//! payload references after enqueue.
//!
//! [`MemorySampleStore`] is the in-process implementation.

mod memory;

pub use memory::MemorySampleStore;

use crate::error::Result;
use crate::filter::ReaderFilter;
use crate::message::QueuedItem;
use crate::qos::Lifespan;
use crate::types::{Guid, InstanceHandle, SequenceNumber};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Capacity reserved for one message between `obtain_*` and `enqueue*`.
///
/// Must be handed back through `enqueue`/`enqueue_control` or
/// `release_buffer`.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferLease {
    id: u64,
    instance: InstanceHandle,
    control: bool,
}

impl BufferLease {
    pub fn new(id: u64, instance: InstanceHandle, control: bool) -> Self {
        Self {
            id,
            instance,
            control,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn is_control(&self) -> bool {
        self.control
    }
}

/// Storage collaborator of the publication engine.
pub trait SampleStore: Send + Sync {
    /// Create storage for a newly registered instance.
    fn register_instance(&self, handle: InstanceHandle, key: Arc<[u8]>) -> Result<()>;

    /// Reserve room for one sample of `handle`, blocking up to
    /// `max_blocking` under resource back-pressure (then `Error::Timeout`).
    fn obtain_buffer(&self, handle: InstanceHandle, max_blocking: Duration) -> Result<BufferLease>;

    /// Reserve room for one control message. Never blocks.
    fn obtain_buffer_for_control(&self) -> Result<BufferLease>;

    /// Give back a lease whose message was never enqueued.
    fn release_buffer(&self, lease: BufferLease);

    fn enqueue(&self, lease: &BufferLease, item: QueuedItem) -> Result<()>;

    fn enqueue_control(&self, lease: &BufferLease, item: QueuedItem) -> Result<()>;

    /// Drain everything enqueued since the previous call, in enqueue order.
    fn get_unsent_data(&self) -> Vec<QueuedItem>;

    fn unregister(&self, handle: InstanceHandle) -> Result<()>;

    fn dispose(&self, handle: InstanceHandle) -> Result<()>;

    /// Stage retained samples for `reader` that are still valid under
    /// `lifespan` and pass `filter`. Returns whether anything was staged.
    fn reenqueue_all(&self, reader: &Guid, lifespan: &Lifespan, filter: Option<&ReaderFilter>) -> bool;

    /// Drain the items staged by `reenqueue_all`.
    fn get_resend_data(&self) -> Vec<QueuedItem>;

    /// Block until every tracked reader acknowledged `sequence`, or
    /// `deadline` passes (`Error::Timeout`).
    fn wait_ack_of_sequence(&self, deadline: Instant, sequence: SequenceNumber) -> Result<()>;

    /// Start ack tracking for `reader`, treating everything up to `max_sn`
    /// as already acknowledged.
    fn add_reader_acks(&self, reader: &Guid, max_sn: SequenceNumber);

    fn remove_reader_acks(&self, reader: &Guid);

    fn data_delivered(&self, item: &QueuedItem);

    fn data_dropped(&self, item: &QueuedItem, dropped_by_transport: bool);

    /// Samples currently held for `handle`.
    fn num_samples(&self, handle: InstanceHandle) -> usize;
}
