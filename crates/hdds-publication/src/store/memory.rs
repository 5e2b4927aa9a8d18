// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process sample store.
//!
//! Retains data samples per instance under the writer's HISTORY and
//! RESOURCE_LIMITS:
//! - KEEP_LAST(n): the oldest sample of the instance is evicted to make room
//! - KEEP_ALL: `obtain_buffer` waits on a condvar until space frees up or
//!   `max_blocking_time` elapses
//!
//! Samples leave the history when every tracked reader acknowledged them
//! (reliable, volatile), when the transport reports them delivered or
//! dropped (best-effort volatile, or reliable volatile with no tracked
//! reader), or when evicted. TRANSIENT_LOCAL writers
//! keep them for late-joiner replay.

use super::{BufferLease, SampleStore};
use crate::error::{Error, Result};
use crate::filter::ReaderFilter;
use crate::message::QueuedItem;
use crate::qos::{DataWriterQos, Durability, History, Lifespan, Reliability, ResourceLimits};
use crate::types::{deadline_after, Guid, InstanceHandle, SequenceNumber};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug)]
struct InstanceSlot {
    key: Arc<[u8]>,
    samples: VecDeque<SequenceNumber>,
    disposed: bool,
}

#[derive(Debug, Default)]
struct StoreInner {
    instances: HashMap<InstanceHandle, InstanceSlot>,
    /// Data samples still held, by sequence number.
    history: BTreeMap<SequenceNumber, QueuedItem>,
    unsent: Vec<QueuedItem>,
    resend: Vec<QueuedItem>,
    /// Outstanding leases -> instance (NIL for control leases).
    leases: HashMap<u64, InstanceHandle>,
    next_lease: u64,
    /// Highest acknowledged sequence number per tracked reader.
    acks: HashMap<Guid, SequenceNumber>,
    delivered: u64,
    dropped: u64,
}

impl StoreInner {
    fn data_leases_for(&self, handle: InstanceHandle) -> usize {
        self.leases.values().filter(|h| **h == handle).count()
    }

    fn data_leases(&self) -> usize {
        self.leases.values().filter(|h| !h.is_nil()).count()
    }

    fn evict(&mut self, sequence: SequenceNumber) -> bool {
        let Some(item) = self.history.remove(&sequence) else {
            return false;
        };
        if let Some(slot) = self.instances.get_mut(&item.instance) {
            slot.samples.retain(|s| *s != sequence);
        }
        true
    }

    fn evict_oldest_of(&mut self, handle: InstanceHandle) -> bool {
        let oldest = self
            .instances
            .get(&handle)
            .and_then(|slot| slot.samples.front().copied());
        oldest.is_some_and(|seq| self.evict(seq))
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self.history.keys().next().copied();
        oldest.is_some_and(|seq| self.evict(seq))
    }

    fn min_ack(&self) -> Option<SequenceNumber> {
        self.acks.values().min().copied()
    }
}

/// Heap-backed [`SampleStore`] with per-instance history.
pub struct MemorySampleStore {
    history: History,
    limits: ResourceLimits,
    durability: Durability,
    reliability: Reliability,
    inner: Mutex<StoreInner>,
    /// Signalled when history space frees up.
    space: Condvar,
    /// Signalled when a reader acknowledgment advances.
    acked: Condvar,
}

impl MemorySampleStore {
    pub fn new(qos: &DataWriterQos) -> Self {
        Self {
            history: qos.history,
            limits: qos.resource_limits,
            durability: qos.durability,
            reliability: qos.reliability,
            inner: Mutex::new(StoreInner::default()),
            space: Condvar::new(),
            acked: Condvar::new(),
        }
    }

    /// Record that `reader` acknowledged everything up to `sequence`.
    ///
    /// Called by the reliability layer on ACKNACK reception.
    pub fn acknowledge(&self, reader: &Guid, sequence: SequenceNumber) {
        let mut inner = self.inner.lock();
        match inner.acks.get_mut(reader) {
            Some(acked) if sequence > *acked => *acked = sequence,
            Some(_) => return,
            None => {
                log::debug!("[store] ack from untracked reader {}", reader);
                return;
            }
        }
        self.purge_acknowledged(&mut inner);
        drop(inner);
        self.acked.notify_all();
    }

    /// Total samples held across instances.
    pub fn retained(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn delivered_count(&self) -> u64 {
        self.inner.lock().delivered
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn outstanding_leases(&self) -> usize {
        self.inner.lock().leases.len()
    }

    pub fn instance_key(&self, handle: InstanceHandle) -> Option<Arc<[u8]>> {
        self.inner
            .lock()
            .instances
            .get(&handle)
            .map(|slot| Arc::clone(&slot.key))
    }

    pub fn is_disposed(&self, handle: InstanceHandle) -> bool {
        self.inner
            .lock()
            .instances
            .get(&handle)
            .is_some_and(|slot| slot.disposed)
    }

    fn volatile(&self) -> bool {
        self.durability == Durability::Volatile
    }

    /// Reliable volatile writers drop samples every reader acknowledged.
    /// With no reader tracked nothing can acknowledge, so all of it goes.
    fn purge_acknowledged(&self, inner: &mut StoreInner) {
        if !self.volatile() || self.reliability != Reliability::Reliable {
            return;
        }
        let acked: Vec<SequenceNumber> = match inner.min_ack() {
            Some(floor) => inner.history.range(..=floor).map(|(s, _)| *s).collect(),
            None => inner.history.keys().copied().collect(),
        };
        let freed = !acked.is_empty();
        for seq in acked {
            inner.evict(seq);
        }
        if freed {
            self.space.notify_all();
        }
    }

    fn release_sent(&self, item: &QueuedItem) {
        if !self.volatile() {
            return;
        }
        let mut inner = self.inner.lock();
        if self.reliability == Reliability::Reliable {
            self.purge_acknowledged(&mut inner);
            if !inner.acks.is_empty() {
                return;
            }
        }
        if inner.evict(item.sequence()) {
            self.space.notify_all();
        }
    }

    fn has_room(&self, inner: &StoreInner, handle: InstanceHandle) -> bool {
        let per_instance = inner
            .instances
            .get(&handle)
            .map_or(0, |slot| slot.samples.len())
            + inner.data_leases_for(handle);
        let total = inner.history.len() + inner.data_leases();
        per_instance < self.limits.max_samples_per_instance && total < self.limits.max_samples
    }
}

impl SampleStore for MemorySampleStore {
    fn register_instance(&self, handle: InstanceHandle, key: Arc<[u8]>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.instances.contains_key(&handle) {
            return Ok(());
        }
        if inner.instances.len() >= self.limits.max_instances {
            return Err(Error::ResourceExhausted(format!(
                "max_instances {} reached",
                self.limits.max_instances
            )));
        }
        inner.instances.insert(
            handle,
            InstanceSlot {
                key,
                samples: VecDeque::new(),
                disposed: false,
            },
        );
        Ok(())
    }

    fn obtain_buffer(&self, handle: InstanceHandle, max_blocking: Duration) -> Result<BufferLease> {
        let deadline = deadline_after(max_blocking);
        let mut inner = self.inner.lock();
        if !inner.instances.contains_key(&handle) {
            return Err(Error::BadParameter(format!("instance {} not registered", handle)));
        }

        match self.history {
            History::KeepLast(depth) => {
                let depth = (depth.max(1) as usize).min(self.limits.max_samples_per_instance);
                while inner.instances.get(&handle).map_or(0, |s| s.samples.len())
                    + inner.data_leases_for(handle)
                    >= depth
                {
                    if !inner.evict_oldest_of(handle) {
                        break;
                    }
                }
                while inner.history.len() + inner.data_leases() >= self.limits.max_samples {
                    if !inner.evict_oldest() {
                        return Err(Error::ResourceExhausted("max_samples in flight".into()));
                    }
                }
            }
            History::KeepAll => {
                while !self.has_room(&inner, handle) {
                    if self.space.wait_until(&mut inner, deadline).timed_out()
                        && !self.has_room(&inner, handle)
                    {
                        log::debug!("[store] obtain_buffer for {} timed out", handle);
                        return Err(Error::Timeout);
                    }
                }
            }
        }

        inner.next_lease += 1;
        let id = inner.next_lease;
        inner.leases.insert(id, handle);
        Ok(BufferLease::new(id, handle, false))
    }

    fn obtain_buffer_for_control(&self) -> Result<BufferLease> {
        let mut inner = self.inner.lock();
        inner.next_lease += 1;
        let id = inner.next_lease;
        inner.leases.insert(id, InstanceHandle::NIL);
        Ok(BufferLease::new(id, InstanceHandle::NIL, true))
    }

    fn release_buffer(&self, lease: BufferLease) {
        let released = self.inner.lock().leases.remove(&lease.id()).is_some();
        if released {
            self.space.notify_all();
        }
    }

    fn enqueue(&self, lease: &BufferLease, item: QueuedItem) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.leases.remove(&lease.id()).is_none() {
            return Err(Error::PreconditionNotMet(format!("unknown lease {}", lease.id())));
        }
        let sequence = item.sequence();
        match inner.instances.get_mut(&item.instance) {
            Some(slot) => slot.samples.push_back(sequence),
            None => {
                return Err(Error::PreconditionNotMet(format!(
                    "instance {} not registered",
                    item.instance
                )))
            }
        }
        inner.history.insert(sequence, item.clone());
        inner.unsent.push(item);
        Ok(())
    }

    fn enqueue_control(&self, lease: &BufferLease, item: QueuedItem) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.leases.remove(&lease.id()).is_none() {
            return Err(Error::PreconditionNotMet(format!("unknown lease {}", lease.id())));
        }
        inner.unsent.push(item);
        Ok(())
    }

    fn get_unsent_data(&self) -> Vec<QueuedItem> {
        std::mem::take(&mut self.inner.lock().unsent)
    }

    fn unregister(&self, handle: InstanceHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .instances
            .remove(&handle)
            .ok_or_else(|| Error::PreconditionNotMet(format!("instance {} not registered", handle)))?;
        // Volatile history has no late joiners to serve.
        if self.volatile() {
            for seq in slot.samples {
                inner.history.remove(&seq);
            }
            drop(inner);
            self.space.notify_all();
        }
        Ok(())
    }

    fn dispose(&self, handle: InstanceHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .instances
            .get_mut(&handle)
            .ok_or_else(|| Error::PreconditionNotMet(format!("instance {} not registered", handle)))?;
        slot.disposed = true;
        Ok(())
    }

    fn reenqueue_all(&self, reader: &Guid, lifespan: &Lifespan, filter: Option<&ReaderFilter>) -> bool {
        if self.volatile() {
            return false;
        }
        let now = SystemTime::now();
        let mut inner = self.inner.lock();
        let staged: Vec<QueuedItem> = inner
            .history
            .values()
            .filter(|item| lifespan.admits(item.header.source_timestamp.age_at(now)))
            .filter(|item| filter.map_or(true, |f| f.admits(item)))
            .map(|item| {
                let mut copy = item.clone();
                copy.exclude = None;
                copy.destination = Some(*reader);
                copy
            })
            .collect();
        let any = !staged.is_empty();
        inner.resend.extend(staged);
        any
    }

    fn get_resend_data(&self) -> Vec<QueuedItem> {
        std::mem::take(&mut self.inner.lock().resend)
    }

    fn wait_ack_of_sequence(&self, deadline: Instant, sequence: SequenceNumber) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            if inner.acks.values().all(|acked| *acked >= sequence) {
                return Ok(());
            }
            if self.acked.wait_until(&mut inner, deadline).timed_out() {
                return if inner.acks.values().all(|acked| *acked >= sequence) {
                    Ok(())
                } else {
                    Err(Error::Timeout)
                };
            }
        }
    }

    fn add_reader_acks(&self, reader: &Guid, max_sn: SequenceNumber) {
        self.inner.lock().acks.insert(*reader, max_sn);
    }

    fn remove_reader_acks(&self, reader: &Guid) {
        let mut inner = self.inner.lock();
        if inner.acks.remove(reader).is_some() {
            self.purge_acknowledged(&mut inner);
            drop(inner);
            self.acked.notify_all();
        }
    }

    fn data_delivered(&self, item: &QueuedItem) {
        self.inner.lock().delivered += 1;
        self.release_sent(item);
    }

    fn data_dropped(&self, item: &QueuedItem, dropped_by_transport: bool) {
        self.inner.lock().dropped += 1;
        if dropped_by_transport {
            log::debug!("[store] transport dropped seq {}", item.sequence());
        }
        self.release_sent(item);
    }

    fn num_samples(&self, handle: InstanceHandle) -> usize {
        self.inner
            .lock()
            .instances
            .get(&handle)
            .map_or(0, |slot| slot.samples.len())
    }
}
