// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Construction, enable, QoS and listeners, status accessors, transport
//! completion callbacks and teardown.

use super::{EngineContext, ListenerBinding, ObserverSlot, PublicationEngine};
use crate::config::EngineConfig;
use crate::control_tracker::ControlCounts;
use crate::error::{Error, Result};
use crate::listener::{
    DataWriterListener, OfferedDeadlineMissedStatus, OfferedIncompatibleQosStatus,
    PublicationMatchedStatus, StatusMask, WriterObserver,
};
use crate::message::QueuedItem;
use crate::qos::DataWriterQos;
use crate::types::{Guid, InstanceHandle};
use parking_lot::MutexGuard;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

impl PublicationEngine {
    /// Create a disabled engine.
    ///
    /// # Errors
    ///
    /// - `Error::InconsistentPolicy` if `qos` is invalid or self-contradictory
    /// - `Error::BadParameter` if `config.liveliness_factor` is outside 1..=100
    pub fn new(qos: DataWriterQos, config: EngineConfig, ctx: EngineContext) -> Result<Arc<Self>> {
        if !qos.is_valid() {
            return Err(Error::InconsistentPolicy("invalid writer QoS".into()));
        }
        if !qos.is_consistent() {
            return Err(Error::InconsistentPolicy(
                "history depth exceeds resource limits".into(),
            ));
        }
        if !(1..=100).contains(&config.liveliness_factor) {
            return Err(Error::BadParameter(format!(
                "liveliness_factor {} not in 1..=100",
                config.liveliness_factor
            )));
        }
        Ok(Self::with_context(qos, config, ctx))
    }

    /// Announce the publication and start its liveliness tasks.
    ///
    /// The owning publisher must be enabled. Enabling twice is a no-op.
    pub fn enable(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::AlreadyDeleted);
        }
        if self.enabled.load(Ordering::Acquire) {
            return Ok(());
        }
        let publisher = self
            .publisher
            .upgrade()
            .ok_or_else(|| Error::PreconditionNotMet("publisher gone".into()))?;
        if !publisher.is_enabled() {
            return Err(Error::PreconditionNotMet("publisher not enabled".into()));
        }

        let qos = {
            let mut st = self.state.lock();
            if !st.qos.liveliness.is_infinite() {
                st.liveliness.send_interval =
                    st.qos.liveliness.send_interval(self.config.liveliness_factor);
                st.liveliness.lost_interval = st.qos.liveliness.lease_duration;
            }
            st.liveliness.record_activity(Instant::now());
            st.qos.clone()
        };

        let enabling = self.enabling.lock();
        if self.enabled.load(Ordering::Acquire) {
            return Ok(());
        }

        let id = match self.discovery.add_publication(&publisher.publisher_id(), &qos) {
            Ok(id) if !id.is_unknown() => id,
            Ok(_) => {
                return Err(Error::Internal("discovery assigned no publication id".into()));
            }
            Err(e) => {
                log::warn!("[writer] add_publication failed: {}", e);
                return Err(e);
            }
        };
        // The id is in place before any write can pass `check_writable`.
        self.publication_id.store(Arc::new(id));
        self.enabled.store(true, Ordering::Release);

        if let Err(e) = self.transport.enable(&id) {
            log::warn!("[writer] transport enable for {} failed: {}", id, e);
            self.rollback_enable(&id);
            return Err(e);
        }
        if let Err(e) = self.start_liveliness_tasks(&qos) {
            log::warn!("[writer] liveliness tasks for {} not started: {}", id, e);
            self.cancel_liveliness_tasks();
            self.transport.stop();
            self.rollback_enable(&id);
            return Err(e);
        }

        drop(enabling);

        publisher.writer_enabled(&id);
        log::debug!(
            "[writer] enabled {} ({:?}, {:?})",
            id,
            qos.reliability,
            qos.durability
        );
        self.observe(|o, id| o.on_enabled(id));
        Ok(())
    }

    fn rollback_enable(&self, id: &Guid) {
        self.enabled.store(false, Ordering::Release);
        self.discovery.remove_publication(id);
        self.publication_id.store(Arc::new(Guid::UNKNOWN));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Replace the QoS. Once enabled, only mutable policies may change and
    /// discovery is told about the new values.
    pub fn set_qos(&self, qos: DataWriterQos) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::AlreadyDeleted);
        }
        if !qos.is_valid() || !qos.is_consistent() {
            return Err(Error::InconsistentPolicy("rejected writer QoS".into()));
        }
        let enabled = self.is_enabled();
        {
            let st = self.state.lock();
            if enabled {
                st.qos
                    .changeable_to(&qos)
                    .map_err(|policy| Error::ImmutablePolicy(policy.to_string()))?;
            }
            if st.qos == qos {
                return Ok(());
            }
        }
        // Discovery must accept the change before it becomes visible.
        if enabled {
            self.discovery
                .update_publication_qos(&self.publication_id(), &qos)?;
        }
        self.state.lock().qos = qos;
        if enabled {
            self.observe(|o, id| o.on_qos_changed(id));
        }
        Ok(())
    }

    pub fn get_qos(&self) -> DataWriterQos {
        self.state.lock().qos.clone()
    }

    /// Bind a listener for the statuses in `mask`. `None` unbinds.
    pub fn set_listener(&self, listener: Option<Arc<dyn DataWriterListener>>, mask: StatusMask) {
        self.listener
            .store(listener.map(|listener| Arc::new(ListenerBinding { listener, mask })));
    }

    pub fn get_listener(&self) -> Option<Arc<dyn DataWriterListener>> {
        self.listener
            .load_full()
            .map(|binding| Arc::clone(&binding.listener))
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn WriterObserver>>) {
        self.observer
            .store(observer.map(|observer| Arc::new(ObserverSlot(observer))));
    }

    /// Listener for `status`: our own if its mask covers it, else the
    /// publisher's.
    pub fn listener_for(&self, status: StatusMask) -> Option<Arc<dyn DataWriterListener>> {
        if let Some(binding) = self.listener.load_full() {
            if binding.mask.contains(status) {
                return Some(Arc::clone(&binding.listener));
            }
        }
        self.publisher
            .upgrade()
            .and_then(|publisher| publisher.listener_for(status))
    }

    // ========================================================================
    // Status accessors (reading resets the change counters)
    // ========================================================================

    pub fn get_publication_matched_status(&self) -> PublicationMatchedStatus {
        let mut st = self.state.lock();
        let status = st.matched.clone();
        st.matched.total_count_change = 0;
        st.matched.current_count_change = 0;
        st.status_changes = st.status_changes & !StatusMask::PUBLICATION_MATCHED;
        status
    }

    pub fn get_offered_deadline_missed_status(&self) -> OfferedDeadlineMissedStatus {
        let mut st = self.state.lock();
        let status = st.deadline_missed.clone();
        st.deadline_missed.total_count_change = 0;
        st.status_changes = st.status_changes & !StatusMask::OFFERED_DEADLINE_MISSED;
        status
    }

    pub fn get_offered_incompatible_qos_status(&self) -> OfferedIncompatibleQosStatus {
        let mut st = self.state.lock();
        let status = st.incompatible_qos.clone();
        st.incompatible_qos.total_count_change = 0;
        st.status_changes = st.status_changes & !StatusMask::OFFERED_INCOMPATIBLE_QOS;
        status
    }

    /// Statuses changed since they were last read.
    pub fn get_status_changes(&self) -> StatusMask {
        self.state.lock().status_changes
    }

    /// Discovery found readers whose QoS cannot match ours.
    pub fn update_incompatible_qos(&self, policies: &[u32]) {
        let mut st = self.state.lock();
        st.incompatible_qos.record(policies);
        st.status_changes = st.status_changes | StatusMask::OFFERED_INCOMPATIBLE_QOS;
        if let Some(listener) = self.listener_for(StatusMask::OFFERED_INCOMPATIBLE_QOS) {
            let status = st.incompatible_qos.clone();
            MutexGuard::unlocked(&mut st, || listener.on_offered_incompatible_qos(status));
            st.incompatible_qos.total_count_change = 0;
        }
    }

    /// The deadline of `instance` passed without a write.
    pub fn offered_deadline_missed(&self, instance: InstanceHandle) {
        let mut st = self.state.lock();
        st.deadline_missed.total_count += 1;
        st.deadline_missed.total_count_change += 1;
        st.deadline_missed.last_instance_handle = instance;
        st.status_changes = st.status_changes | StatusMask::OFFERED_DEADLINE_MISSED;
        if let Some(listener) = self.listener_for(StatusMask::OFFERED_DEADLINE_MISSED) {
            let status = st.deadline_missed.clone();
            MutexGuard::unlocked(&mut st, || listener.on_offered_deadline_missed(status));
            st.deadline_missed.total_count_change = 0;
        }
    }

    // ========================================================================
    // Transport completion callbacks
    // ========================================================================

    fn owns(&self, item: &QueuedItem) -> bool {
        let ours = item.header.publication_id == self.publication_id();
        if !ours {
            log::error!(
                "[writer] {} got completion for foreign publication {}",
                self.publication_id(),
                item.header.publication_id
            );
        }
        ours
    }

    pub fn data_delivered(&self, item: &QueuedItem) {
        if !self.owns(item) {
            return;
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.store.data_delivered(item);
    }

    pub fn data_dropped(&self, item: &QueuedItem, dropped_by_transport: bool) {
        if !self.owns(item) {
            return;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.store.data_dropped(item, dropped_by_transport);
    }

    /// Completion of a message sent with `send_control` or
    /// `send_with_control`.
    pub fn control_delivered(&self, item: &QueuedItem) {
        if self.owns(item) {
            self.control_tracker.message_delivered();
        }
    }

    pub fn control_dropped(&self, item: &QueuedItem, dropped_by_transport: bool) {
        if self.owns(item) {
            if dropped_by_transport {
                log::debug!("[control] transport dropped {}", item.kind().name());
            }
            self.control_tracker.message_dropped();
        }
    }

    /// Wait until every directly sent control message completed. Returns
    /// false at `deadline`.
    pub fn wait_pending(&self, deadline: Instant) -> bool {
        self.control_tracker.wait_messages_pending(deadline)
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn control_counts(&self) -> ControlCounts {
        self.control_tracker.snapshot()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// First stage of deletion: refuse further writes, drop deferred data
    /// and unregister every instance.
    pub fn prepare_to_delete(&self) {
        if self.deleted.swap(true, Ordering::AcqRel) {
            return;
        }
        let readers = self.readers.lock().reader_ids();
        self.transport.stop_associating(&readers);
        self.terminate_send_if_suspended();
        self.unregister_all();
        log::debug!("[writer] {} prepared for deletion", self.publication_id());
        self.observe(|o, id| o.on_deleted(id));
    }

    /// Full teardown. The engine cannot be enabled again.
    pub fn shutdown(&self) {
        self.cancel_liveliness_tasks();
        self.prepare_to_delete();
        self.remove_all_associations();
        let id = self.publication_id();
        if !id.is_unknown() {
            self.discovery.remove_publication(&id);
        }
        self.transport.stop();
        self.enabled.store(false, Ordering::Release);
        log::debug!("[writer] {} shut down", id);
    }
}

impl Drop for PublicationEngine {
    fn drop(&mut self) {
        let tasks = std::mem::take(self.liveliness_tasks.get_mut());
        drop(tasks);
    }
}
