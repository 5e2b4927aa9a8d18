// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write, register, unregister and dispose.

use super::PublicationEngine;
use crate::error::{Error, Result};
use crate::filter::FieldMap;
use crate::instances::InstanceState;
use crate::message::{MessageKind, QueuedItem};
use crate::participant::{DomainParticipant, PublisherRef};
use crate::qos::LivelinessKind;
use crate::store::BufferLease;
use crate::types::{InstanceHandle, SequenceNumber, Timestamp};
use std::sync::Arc;
use std::time::Instant;

/// One serialized sample handed to [`PublicationEngine::write`].
#[derive(Debug, Clone)]
pub struct SampleData {
    /// Serialized key fields only.
    pub key: Arc<[u8]>,
    pub payload: Arc<[u8]>,
    /// Field values for writer-side content filtering.
    pub fields: Option<FieldMap>,
    pub source_timestamp: Timestamp,
}

impl SampleData {
    pub fn new(key: impl Into<Arc<[u8]>>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            fields: None,
            source_timestamp: Timestamp::now(),
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = Some(fields);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.source_timestamp = timestamp;
        self
    }
}

/// Observer events owed for one unregistration.
#[must_use]
struct Unregistered {
    handle: InstanceHandle,
    disposed: bool,
}

impl Unregistered {
    fn notify(self, engine: &PublicationEngine) {
        let handle = self.handle;
        if self.disposed {
            engine.observe(|o, id| o.on_disposed(id, handle));
        }
        engine.observe(|o, id| o.on_unregistered(id, handle));
    }
}

impl PublicationEngine {
    /// Publish one sample.
    ///
    /// A nil `handle` registers the sample's key on the fly; otherwise the
    /// handle must name a live instance whose key matches the sample.
    /// Blocks up to `max_blocking_time` when the store is full and returns
    /// `Error::Timeout` after that.
    pub fn write(&self, sample: SampleData, handle: InstanceHandle) -> Result<SequenceNumber> {
        self.check_writable()?;

        let handle = if handle.is_nil() {
            self.register_instance(Arc::clone(&sample.key), sample.source_timestamp)?
        } else {
            self.state.lock().instances.must_exist(handle, Some(&*sample.key))?.handle
        };

        let max_blocking = {
            let st = self.state.lock();
            if st.qos.max_blocking_time.is_zero() {
                self.config.max_blocking_time_default
            } else {
                st.qos.max_blocking_time
            }
        };
        // No engine lock while the store may block.
        let lease = self.store.obtain_buffer(handle, max_blocking)?;

        let publisher = match self.publisher() {
            Ok(publisher) => publisher,
            Err(e) => {
                self.store.release_buffer(lease);
                return Err(e);
            }
        };

        let mut st = self.state.lock();
        if let Err(e) = st.instances.must_exist(handle, None) {
            self.store.release_buffer(lease);
            return Err(e);
        }

        let item = self.build_sample(&st, handle, sample, publisher.as_ref());
        let sequence = item.sequence();
        if let Err(e) = self.store.enqueue(&lease, item) {
            self.store.release_buffer(lease);
            log::warn!("[writer] enqueue of seq {} failed: {}", sequence, e);
            return Err(e);
        }

        st.instances.set_state(handle, InstanceState::Registered);
        if st.qos.liveliness.kind == LivelinessKind::Automatic {
            st.liveliness.record_activity(Instant::now());
        }
        if st.coherent.in_set {
            st.coherent.samples += 1;
        }

        let pending = self.stage_unsent(&mut st);
        drop(st);
        self.dispatch(pending);

        self.observe(|o, id| o.on_sample_sent(id, handle, sequence));
        Ok(sequence)
    }

    /// Stamp a data message. Caller holds the main lock.
    fn build_sample(
        &self,
        st: &super::EngineState,
        handle: InstanceHandle,
        sample: SampleData,
        publisher: &dyn PublisherRef,
    ) -> QueuedItem {
        let mut header = self.base_header(
            MessageKind::SampleData,
            &publisher.publisher_id(),
            sample.source_timestamp,
        );
        header.coherent_change = st.coherent.in_set;
        header.group_coherent = publisher.presentation().is_group_scope();
        if !st.qos.lifespan.is_infinite() {
            header.lifespan = Some(st.qos.lifespan.duration);
        }
        header.message_length = u32::try_from(sample.payload.len()).unwrap_or(u32::MAX);

        let fields = sample.fields.map(Arc::new);
        let excluded = {
            let mut readers = self.readers.lock();
            let excluded = match &fields {
                Some(fields) if self.config.publisher_content_filter => {
                    readers.sample_exclusions(fields)
                }
                _ => None,
            };
            let stamp = self.sequencer.stamp(&readers);
            readers.advance_unfiltered(stamp.sequence, excluded.as_ref());
            header.sequence = stamp.sequence;
            header.sequence_repair = stamp.repair;
            excluded
        };
        header.content_filter = excluded.is_some();

        let mut item = QueuedItem::new(header, Some(sample.payload));
        item.instance = handle;
        item.fields = fields;
        item.exclude = excluded.filter(|set| !set.is_empty()).map(Arc::new);
        item
    }

    /// Register `key`, returning its handle.
    ///
    /// Registering a known key returns the existing handle and sends
    /// nothing. A new key consumes a sequence number for its
    /// INSTANCE_REGISTRATION message.
    pub fn register_instance(&self, key: Arc<[u8]>, timestamp: Timestamp) -> Result<InstanceHandle> {
        self.check_writable()?;
        let participant = self.participant()?;
        if let Some(access) = participant.access_control() {
            if !access.check_register_instance(&self.publication_id(), &key) {
                log::warn!("[writer] register_instance denied by access control");
                return Err(Error::NotAllowedBySecurity);
            }
        }

        let mut st = self.state.lock();
        if let Some(existing) = st.instances.lookup(&key) {
            return Ok(existing);
        }

        let lease = self.store.obtain_buffer_for_control()?;
        let handle = participant.assign_handle();
        if let Err(e) = self.store.register_instance(handle, Arc::clone(&key)) {
            self.abandon_registration(participant.as_ref(), handle, lease, false);
            return Err(e);
        }

        let built = self.build_control(
            &st,
            MessageKind::InstanceRegistration,
            handle,
            Some(Arc::clone(&key)),
            timestamp,
        );
        let item = match built {
            Ok(item) => item,
            Err(e) => {
                self.abandon_registration(participant.as_ref(), handle, lease, true);
                return Err(e);
            }
        };
        if let Err(e) = self.store.enqueue_control(&lease, item) {
            self.abandon_registration(participant.as_ref(), handle, lease, true);
            return Err(e);
        }

        st.instances.insert(key, handle, timestamp);
        let pending = self.stage_unsent(&mut st);
        drop(st);
        self.dispatch(pending);

        verbose!(self, "registered instance {}", handle);
        Ok(handle)
    }

    fn abandon_registration(
        &self,
        participant: &dyn DomainParticipant,
        handle: InstanceHandle,
        lease: BufferLease,
        in_store: bool,
    ) {
        if in_store {
            let _ = self.store.unregister(handle);
        }
        self.store.release_buffer(lease);
        participant.return_handle(handle);
    }

    /// Unregister an instance by handle, or by key when `handle` is nil.
    ///
    /// With `autodispose_unregistered_instances` the instance is disposed
    /// too and a single DISPOSE_UNREGISTER message is sent.
    pub fn unregister_instance(
        &self,
        handle: InstanceHandle,
        key: Option<&[u8]>,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.check_writable()?;
        let done = self.unregister_inner(handle, key, timestamp)?;
        done.notify(self);
        Ok(())
    }

    /// Callers fire the returned events once no engine lock is held.
    fn unregister_inner(
        &self,
        handle: InstanceHandle,
        key: Option<&[u8]>,
        timestamp: Timestamp,
    ) -> Result<Unregistered> {
        let participant = self.participant.upgrade();
        let mut st = self.state.lock();
        let (handle, instance_key) = {
            let entry = st.instances.must_exist(handle, key)?;
            (entry.handle, Arc::clone(&entry.key))
        };

        let autodispose = st.qos.writer_data_lifecycle.autodispose_unregistered_instances;
        if autodispose {
            if let Some(access) = participant.as_ref().and_then(|p| p.access_control()) {
                if !access.check_dispose_instance(&self.publication_id(), &instance_key) {
                    log::warn!("[writer] dispose of {} denied by access control", handle);
                    return Err(Error::NotAllowedBySecurity);
                }
            }
        }

        let kind = if autodispose {
            MessageKind::DisposeUnregisterInstance
        } else {
            MessageKind::UnregisterInstance
        };
        self.enqueue_instance_control(&st, kind, handle, instance_key, timestamp)?;

        let stored = if autodispose {
            self.store
                .dispose(handle)
                .and_then(|()| self.store.unregister(handle))
        } else {
            self.store.unregister(handle)
        };
        if let Err(e) = stored {
            log::warn!("[writer] store unregister of {} failed: {}", handle, e);
        }

        st.instances.remove(handle);
        if let Some(participant) = &participant {
            participant.return_handle(handle);
        }
        let pending = self.stage_unsent(&mut st);
        drop(st);
        self.dispatch(pending);

        Ok(Unregistered {
            handle,
            disposed: autodispose,
        })
    }

    /// Dispose an instance. The instance stays registered.
    pub fn dispose_instance(
        &self,
        handle: InstanceHandle,
        key: Option<&[u8]>,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.check_writable()?;
        let participant = self.participant()?;

        let mut st = self.state.lock();
        let (handle, instance_key) = {
            let entry = st.instances.must_exist(handle, key)?;
            (entry.handle, Arc::clone(&entry.key))
        };
        if let Some(access) = participant.access_control() {
            if !access.check_dispose_instance(&self.publication_id(), &instance_key) {
                log::warn!("[writer] dispose of {} denied by access control", handle);
                return Err(Error::NotAllowedBySecurity);
            }
        }

        self.enqueue_instance_control(
            &st,
            MessageKind::DisposeInstance,
            handle,
            instance_key,
            timestamp,
        )?;
        if let Err(e) = self.store.dispose(handle) {
            log::warn!("[writer] store dispose of {} failed: {}", handle, e);
        }
        st.instances.set_state(handle, InstanceState::Disposed);

        let pending = self.stage_unsent(&mut st);
        drop(st);
        self.dispatch(pending);

        self.observe(|o, id| o.on_disposed(id, handle));
        Ok(())
    }

    /// Build and enqueue an instance control message, releasing the lease
    /// on any failure.
    fn enqueue_instance_control(
        &self,
        st: &super::EngineState,
        kind: MessageKind,
        handle: InstanceHandle,
        key: Arc<[u8]>,
        timestamp: Timestamp,
    ) -> Result<()> {
        let lease = self.store.obtain_buffer_for_control()?;
        let item = match self.build_control(st, kind, handle, Some(key), timestamp) {
            Ok(item) => item,
            Err(e) => {
                self.store.release_buffer(lease);
                return Err(e);
            }
        };
        if let Err(e) = self.store.enqueue_control(&lease, item) {
            self.store.release_buffer(lease);
            log::warn!("[writer] enqueue of {} failed: {}", kind.name(), e);
            return Err(e);
        }
        Ok(())
    }

    /// Unregister every live instance (teardown path, ignores `enabled`).
    pub fn unregister_all(&self) {
        let removal = self.removal.lock();
        let handles = self.state.lock().instances.handles();
        let now = Timestamp::now();
        let mut done = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.unregister_inner(handle, None, now) {
                Ok(events) => done.push(events),
                Err(e) => {
                    log::warn!("[writer] unregister of {} during teardown failed: {}", handle, e);
                }
            }
        }
        drop(removal);

        for events in done {
            events.notify(self);
        }
    }

    /// Handle registered for `key`, or `InstanceHandle::NIL`.
    pub fn lookup_instance(&self, key: &[u8]) -> InstanceHandle {
        self.state
            .lock()
            .instances
            .lookup(key)
            .unwrap_or(InstanceHandle::NIL)
    }

    /// Serialized key of a live instance.
    pub fn get_key_value(&self, handle: InstanceHandle) -> Result<Arc<[u8]>> {
        self.state
            .lock()
            .instances
            .get(handle)
            .map(|entry| Arc::clone(&entry.key))
            .ok_or_else(|| Error::BadParameter(format!("unknown instance {}", handle)))
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }
}
