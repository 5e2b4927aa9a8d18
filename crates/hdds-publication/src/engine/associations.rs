// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader association lifecycle, matched status and durable replay.
//!
//! A reader enters the table as `Pending` with its cursor at the current
//! max sequence number, so it never expects anything written before it
//! matched. Once the transport link completes it counts as matched and, if
//! durable, receives the retained history followed by an
//! END_HISTORIC_SAMPLES marker addressed to it alone.

use super::{EngineState, PublicationEngine};
use crate::association::ReaderInfo;
use crate::discovery::ReaderAssociation;
use crate::error::{Error, Result};
use crate::filter::ReaderFilter;
use crate::listener::{StatusMask, SubscriptionBuiltinTopicData};
use crate::message::MessageKind;
use crate::transport::{AssociationProgress, SendControlStatus};
use crate::types::{Guid, InstanceHandle, SequenceNumber, Timestamp};
use parking_lot::MutexGuard;
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl PublicationEngine {
    /// Start associating with a reader matched by discovery.
    ///
    /// Ignored after deletion. A reader already in the table is left as is.
    pub fn add_association(&self, association: ReaderAssociation, active: bool) -> Result<()> {
        if self.is_deleted() {
            log::debug!(
                "[writer] ignoring reader {} on deleted writer",
                association.reader
            );
            return Ok(());
        }
        if !self.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }

        let reader = association.reader;
        let filter = if association.has_filter() && self.config.publisher_content_filter {
            let lease = self
                .participant()?
                .filter_cache()
                .acquire(&association.filter_expression)?;
            Some(ReaderFilter::new(
                association.filter_class.as_str(),
                lease,
                association.filter_params.clone(),
            ))
        } else {
            None
        };

        {
            let mut readers = self.readers.lock();
            let info = ReaderInfo::new(reader, association.durable, filter, self.sequencer.max());
            if !readers.insert_pending(info) {
                log::debug!("[writer] reader {} already known", reader);
                return Ok(());
            }
        }
        verbose!(self, "associating reader {} (durable={})", reader, association.durable);

        match self.transport.associate(&reader, active) {
            Ok(progress) => {
                self.observe(|o, id| o.on_associated(id, &reader));
                if progress == AssociationProgress::Complete {
                    self.association_complete(&reader);
                }
                Ok(())
            }
            Err(e) => {
                self.readers.lock().remove(&reader);
                log::warn!("[writer] transport refused reader {}: {}", reader, e);
                Err(Error::AssociationFailed(format!("{}: {}", reader, e)))
            }
        }
    }

    /// Transport callback: the link to `reader` could not be established.
    pub fn association_failed(&self, reader: &Guid) {
        log::warn!("[writer] association with {} failed", reader);
        self.remove_associations(&[*reader], true);
    }

    /// Transport callback: the link to `reader` is up.
    ///
    /// Counts the reader as matched, notifies PUBLICATION_MATCHED and
    /// replays history to durable readers. Runs at most once per reader.
    pub fn association_complete(&self, reader: &Guid) {
        let Some(participant) = self.participant.upgrade() else {
            log::debug!("[writer] participant gone, dropping completion of {}", reader);
            return;
        };

        let mut st = self.state.lock();
        let durable = {
            let mut readers = self.readers.lock();
            match readers.mark_associated(reader) {
                Some(info) => info.durable,
                None => return,
            }
        };
        self.store.add_reader_acks(reader, self.sequencer.max());

        let handle = participant.assign_handle();
        st.subscription_handles.insert(*reader, handle);
        let current = u32::try_from(st.subscription_handles.len()).unwrap_or(u32::MAX);
        st.matched.total_count += 1;
        st.matched.total_count_change += 1;
        st.matched.current_count = current;
        st.matched.current_count_change += 1;
        st.matched.last_subscription_handle = handle;
        st.status_changes = st.status_changes | StatusMask::PUBLICATION_MATCHED;
        log::debug!(
            "[writer] {} matched reader {} as {}",
            self.publication_id(),
            reader,
            handle
        );

        self.notify_matched(&mut st);
        if durable {
            self.replay_durable_locked(st, reader);
        }
    }

    fn notify_matched(&self, st: &mut MutexGuard<'_, EngineState>) {
        if let Some(listener) = self.listener_for(StatusMask::PUBLICATION_MATCHED) {
            let status = st.matched.clone();
            MutexGuard::unlocked(st, || listener.on_publication_matched(status));
            st.matched.total_count_change = 0;
            st.matched.current_count_change = 0;
        }
    }

    /// Replay retained history to a fully associated durable reader.
    pub fn replay_durable_data_for(&self, reader: &Guid) -> Result<()> {
        let st = self.state.lock();
        let durable = self
            .readers
            .lock()
            .get(reader)
            .filter(|info| info.is_associated())
            .map(|info| info.durable);
        match durable {
            None => Err(Error::BadParameter(format!("reader {} not associated", reader))),
            Some(false) => Err(Error::PreconditionNotMet(format!(
                "reader {} is not durable",
                reader
            ))),
            Some(true) => {
                self.replay_durable_locked(st, reader);
                Ok(())
            }
        }
    }

    /// Consumes the main lock: the batch and its terminator go out with no
    /// engine lock held.
    fn replay_durable_locked(&self, mut st: MutexGuard<'_, EngineState>, reader: &Guid) {
        let lifespan = st.qos.lifespan;
        let staged = {
            let readers = self.readers.lock();
            let filter = readers.get(reader).and_then(|info| info.filter.as_ref());
            self.store.reenqueue_all(reader, &lifespan, filter)
        };
        let mut items = self.store.get_resend_data();
        verbose!(self, "replay to {}: staged={} items={}", reader, staged, items.len());

        let mut highest = SequenceNumber::UNKNOWN;
        for item in &mut items {
            item.header.historic_sample = true;
            highest = highest.max(item.sequence());
        }
        if !highest.is_unknown() {
            self.readers.lock().raise_cursor(reader, highest);
        }

        if self.publisher_holds_releases() {
            // Flushed with the rest on resume; no terminator while suspended.
            st.suspend.append(items);
            return;
        }

        let payload: Arc<[u8]> = Arc::from(&reader.as_bytes()[..]);
        let mut control = match self.build_control(
            &st,
            MessageKind::EndHistoricSamples,
            InstanceHandle::NIL,
            Some(payload),
            Timestamp::now(),
        ) {
            Ok(control) => control,
            Err(e) => {
                drop(st);
                log::warn!("[writer] replay to {} abandoned: {}", reader, e);
                for item in &items {
                    self.store.data_dropped(item, false);
                }
                return;
            }
        };
        control.destination = Some(*reader);
        self.control_tracker.message_sent();
        drop(st);

        log::debug!(
            "[writer] replaying {} historic item(s) to {}",
            items.len(),
            reader
        );
        if self.transport.send_with_control(items, control, reader) == SendControlStatus::Error {
            log::warn!("[writer] END_HISTORIC_SAMPLES to {} not sent", reader);
            self.control_tracker.message_dropped();
        }
    }

    /// Drop the given readers. Returns the subscription handles of those
    /// that were fully associated.
    pub fn remove_associations(&self, readers: &[Guid], notify_lost: bool) -> Vec<InstanceHandle> {
        if readers.is_empty() {
            return Vec::new();
        }
        for reader in readers {
            self.observe(|o, id| o.on_disassociated(id, reader));
        }
        self.transport.stop_associating(readers);

        let removal = self.removal.lock();
        let participant = self.participant.upgrade();
        let mut st = self.state.lock();

        let mut removed = Vec::new();
        let mut associated = Vec::new();
        {
            let mut table = self.readers.lock();
            for reader in readers {
                if let Some(info) = table.remove(reader) {
                    removed.push(*reader);
                    if info.is_associated() {
                        associated.push(*reader);
                    }
                }
            }
        }
        for reader in &removed {
            self.store.remove_reader_acks(reader);
        }

        let mut handles = Vec::with_capacity(associated.len());
        for reader in &associated {
            if let Some(handle) = st.subscription_handles.remove(reader) {
                handles.push(handle);
                if let Some(participant) = &participant {
                    participant.return_handle(handle);
                }
            }
        }

        let current = u32::try_from(st.subscription_handles.len()).unwrap_or(u32::MAX);
        let mut notify = None;
        if current != st.matched.current_count {
            let previous = st.matched.current_count;
            st.matched.current_count_change += current as i32 - previous as i32;
            st.matched.current_count = current;
            if let Some(last) = handles.last() {
                st.matched.last_subscription_handle = *last;
            }
            st.status_changes = st.status_changes | StatusMask::PUBLICATION_MATCHED;
            if let Some(listener) = self.listener_for(StatusMask::PUBLICATION_MATCHED) {
                notify = Some((listener, st.matched.clone()));
            }
        }
        drop(st);
        drop(removal);

        if let Some((listener, status)) = notify {
            listener.on_publication_matched(status);
            let mut st = self.state.lock();
            st.matched.total_count_change = 0;
            st.matched.current_count_change = 0;
        }

        for reader in &associated {
            self.transport.disassociate(reader);
        }
        if !removed.is_empty() {
            log::debug!(
                "[writer] {} removed {} reader(s)",
                self.publication_id(),
                removed.len()
            );
            if notify_lost {
                self.notify_publication_lost(&removed);
            }
        }
        handles
    }

    pub fn remove_all_associations(&self) -> Vec<InstanceHandle> {
        let readers = self.readers.lock().reader_ids();
        self.remove_associations(&readers, false)
    }

    /// Replace the filter parameters of a matched reader.
    pub fn update_subscription_params(&self, reader: &Guid, params: Vec<String>) -> Result<()> {
        let mut table = self.readers.lock();
        let info = table
            .get_mut(reader)
            .ok_or_else(|| Error::BadParameter(format!("unknown reader {}", reader)))?;
        match info.filter.as_mut() {
            Some(filter) => filter.set_params(params),
            None => log::debug!("[writer] reader {} has no writer-side filter", reader),
        }
        Ok(())
    }

    /// Reader's expected-sequence cursor.
    pub fn expected_sequence_for(&self, reader: &Guid) -> Option<SequenceNumber> {
        self.readers.lock().cursor(reader)
    }

    /// Readers in the table, pending ones included.
    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn get_matched_subscriptions(&self) -> Result<Vec<InstanceHandle>> {
        if !self.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }
        let mut handles: Vec<_> = self
            .state
            .lock()
            .subscription_handles
            .values()
            .copied()
            .collect();
        handles.sort_unstable();
        Ok(handles)
    }

    pub fn get_matched_subscription_data(
        &self,
        handle: InstanceHandle,
    ) -> Result<SubscriptionBuiltinTopicData> {
        if !self.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }
        let st = self.state.lock();
        let reader = st
            .subscription_handles
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(reader, _)| *reader)
            .ok_or_else(|| Error::BadParameter(format!("no subscription {}", handle)))?;
        let table = self.readers.lock();
        let info = table
            .get(&reader)
            .ok_or_else(|| Error::BadParameter(format!("no subscription {}", handle)))?;
        Ok(SubscriptionBuiltinTopicData {
            key: reader,
            handle,
            durable: info.durable,
            filter_class: info.filter.as_ref().map(|f| f.class().to_string()),
            filter_expression: info.filter.as_ref().map(|f| f.expression().to_string()),
            filter_params: info
                .filter
                .as_ref()
                .map(|f| f.params().to_vec())
                .unwrap_or_default(),
            expected_sequence: info.expected_sequence,
        })
    }

    pub fn notify_publication_disconnected(&self, readers: &[Guid]) {
        if let Some(binding) = self.listener.load_full() {
            binding.listener.on_publication_disconnected(readers);
        }
    }

    pub fn notify_publication_reconnected(&self, readers: &[Guid]) {
        if let Some(binding) = self.listener.load_full() {
            binding.listener.on_publication_reconnected(readers);
        }
    }

    pub fn notify_publication_lost(&self, readers: &[Guid]) {
        if let Some(binding) = self.listener.load_full() {
            binding.listener.on_publication_lost(readers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, reader, sample};
    use super::super::SampleData;
    use super::*;
    use crate::filter::{FieldMap, FieldValue};
    use crate::listener::{DataWriterListener, PublicationMatchedStatus};
    use crate::qos::{DataWriterQos, Durability, History};
    use parking_lot::Mutex;

    fn durable_qos() -> DataWriterQos {
        DataWriterQos::reliable()
            .durability(Durability::TransientLocal)
            .history(History::KeepLast(5))
    }

    fn sample_with_x(key: u8, x: i64) -> SampleData {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), FieldValue::Int(i64::from(key)));
        fields.insert("x".to_string(), FieldValue::Int(x));
        sample(key, 0).with_fields(fields)
    }

    #[test]
    fn test_late_reader_starts_at_current_max() {
        let h = harness(DataWriterQos::default());
        for v in 0..3 {
            h.engine.write(sample(1, v), InstanceHandle::NIL).unwrap();
        }
        h.engine
            .add_association(ReaderAssociation::new(reader(1)), true)
            .unwrap();
        assert_eq!(h.engine.expected_sequence_for(&reader(1)), Some(SequenceNumber::new(4)));

        let seq = h.engine.write(sample(1, 9), InstanceHandle::NIL).unwrap();
        assert_eq!(h.engine.expected_sequence_for(&reader(1)), Some(seq));
        // Volatile writer: no replay, no terminator.
        assert!(h.transport.control_kinds().is_empty());
    }

    #[test]
    fn test_durable_reader_gets_history_then_terminator() {
        let h = harness(durable_qos());
        let mut last = SequenceNumber::UNKNOWN;
        for v in 0..3 {
            last = h.engine.write(sample(1, v), InstanceHandle::NIL).unwrap();
        }
        h.engine
            .add_association(ReaderAssociation::new(reader(1)).durable(true), true)
            .unwrap();

        let sent = h.transport.sent.lock();
        let (replayed, _) = sent.last().unwrap();
        assert_eq!(replayed.len(), 3);
        assert!(replayed.iter().all(|i| i.header.historic_sample));
        assert!(replayed.iter().all(|i| i.destination == Some(reader(1))));
        drop(sent);

        let controls = h.transport.controls.lock();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].kind(), MessageKind::EndHistoricSamples);
        assert_eq!(controls[0].destination, Some(reader(1)));
        assert_eq!(controls[0].payload.as_deref(), Some(&reader(1).as_bytes()[..]));
        drop(controls);

        assert_eq!(h.engine.expected_sequence_for(&reader(1)), Some(last));
        assert_eq!(h.engine.control_counts().sent, 1);
    }

    #[test]
    fn test_durable_reader_with_empty_history_still_terminated() {
        let h = harness(durable_qos());
        h.engine
            .add_association(ReaderAssociation::new(reader(2)).durable(true), true)
            .unwrap();
        assert_eq!(
            h.transport.control_kinds(),
            vec![MessageKind::EndHistoricSamples]
        );
        assert!(h.engine.replay_durable_data_for(&reader(2)).is_ok());
        assert_eq!(h.transport.control_kinds().len(), 2);
        assert!(matches!(
            h.engine.replay_durable_data_for(&reader(3)),
            Err(Error::BadParameter(_))
        ));
    }

    #[test]
    fn test_content_filter_excludes_reader() {
        let h = harness(DataWriterQos::default());
        h.engine
            .add_association(
                ReaderAssociation::new(reader(1)).filter("DDSSQL", "x > %0", vec!["5".into()]),
                true,
            )
            .unwrap();
        h.engine
            .add_association(ReaderAssociation::new(reader(2)), true)
            .unwrap();

        let rejected = h.engine.write(sample_with_x(1, 3), InstanceHandle::NIL).unwrap();
        let accepted = h.engine.write(sample_with_x(1, 7), InstanceHandle::NIL).unwrap();

        let sent = h.transport.sent.lock();
        let find = |seq| {
            sent.iter()
                .flat_map(|(items, _)| items.iter())
                .find(|i| i.sequence() == seq)
                .cloned()
                .unwrap()
        };
        let low = find(rejected);
        assert!(low.header.content_filter);
        assert!(!low.is_for(&reader(1)));
        assert!(low.is_for(&reader(2)));
        let high = find(accepted);
        assert!(high.header.content_filter);
        assert!(high.exclude.is_none());
        drop(sent);

        assert_eq!(h.engine.expected_sequence_for(&reader(1)), Some(accepted));
        h.engine
            .update_subscription_params(&reader(1), vec!["10".into()])
            .unwrap();
        let data = h.engine.get_matched_subscriptions().unwrap();
        let info = data
            .iter()
            .map(|handle| h.engine.get_matched_subscription_data(*handle).unwrap())
            .find(|d| d.key == reader(1))
            .unwrap();
        assert_eq!(info.filter_params, vec!["10".to_string()]);
        assert_eq!(info.filter_expression.as_deref(), Some("x > %0"));
    }

    #[derive(Default)]
    struct MatchedLog(Mutex<Vec<PublicationMatchedStatus>>);

    impl DataWriterListener for MatchedLog {
        fn on_publication_matched(&self, status: PublicationMatchedStatus) {
            self.0.lock().push(status);
        }
    }

    #[test]
    fn test_matched_status_through_add_and_remove() {
        let h = harness(DataWriterQos::default());
        let log = Arc::new(MatchedLog::default());
        h.engine
            .set_listener(Some(log.clone()), StatusMask::PUBLICATION_MATCHED);

        h.engine
            .add_association(ReaderAssociation::new(reader(1)), true)
            .unwrap();
        h.engine
            .add_association(ReaderAssociation::new(reader(2)), true)
            .unwrap();
        // Duplicate is ignored.
        h.engine
            .add_association(ReaderAssociation::new(reader(2)), true)
            .unwrap();
        assert_eq!(h.engine.reader_count(), 2);
        assert_eq!(h.engine.get_matched_subscriptions().unwrap().len(), 2);

        let removed = h.engine.remove_associations(&[reader(1)], false);
        assert_eq!(removed.len(), 1);
        assert!(matches!(
            h.engine.get_matched_subscription_data(removed[0]),
            Err(Error::BadParameter(_))
        ));

        let calls = log.0.lock().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].total_count, 2);
        assert_eq!(calls[1].current_count, 2);
        assert_eq!(calls[2].current_count, 1);
        assert_eq!(calls[2].current_count_change, -1);

        let status = h.engine.get_publication_matched_status();
        assert_eq!(status.total_count, 2);
        assert_eq!(status.current_count, 1);
        assert_eq!(status.current_count_change, 0);
        assert_eq!(h.engine.reader_count(), 1);
    }

    #[test]
    fn test_unknown_reader_params_rejected() {
        let h = harness(DataWriterQos::default());
        assert!(matches!(
            h.engine.update_subscription_params(&reader(7), Vec::new()),
            Err(Error::BadParameter(_))
        ));
        assert!(h.engine.remove_associations(&[reader(7)], true).is_empty());
    }
}
