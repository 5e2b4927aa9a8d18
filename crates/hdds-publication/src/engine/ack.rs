// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acknowledgment waiting (`wait_for_acknowledgments`).

use super::PublicationEngine;
use crate::error::Result;
use crate::message::MessageKind;
use crate::types::{deadline_after, InstanceHandle, SequenceNumber, Timestamp};
use std::time::{Duration, Instant};

/// Target of one acknowledgment wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckToken {
    /// Every reader must acknowledge up to here.
    pub sequence: SequenceNumber,
    pub deadline: Instant,
}

impl AckToken {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

impl PublicationEngine {
    /// Capture the current max sequence number with a deadline `max_wait`
    /// from now.
    pub fn create_ack_token(&self, max_wait: Duration) -> AckToken {
        AckToken {
            sequence: self.sequencer.max(),
            deadline: deadline_after(max_wait),
        }
    }

    /// Enqueue and release a REQUEST_ACK (sequenced, no payload).
    pub fn send_request_ack(&self) -> Result<()> {
        let mut st = self.state.lock();
        let lease = self.store.obtain_buffer_for_control()?;
        let item = match self.build_control(
            &st,
            MessageKind::RequestAck,
            InstanceHandle::NIL,
            None,
            Timestamp::now(),
        ) {
            Ok(item) => item,
            Err(e) => {
                self.store.release_buffer(lease);
                return Err(e);
            }
        };
        if let Err(e) = self.store.enqueue_control(&lease, item) {
            self.store.release_buffer(lease);
            return Err(e);
        }
        let pending = self.stage_unsent(&mut st);
        drop(st);
        self.dispatch(pending);
        Ok(())
    }

    /// Block until every matched reader acknowledged everything written so
    /// far, or `max_wait` elapses (`Error::Timeout`).
    ///
    /// Returns immediately for a best-effort writer, enabled or not.
    pub fn wait_for_acknowledgments(&self, max_wait: Duration) -> Result<()> {
        if !self.state.lock().qos.is_reliable() {
            return Ok(());
        }
        self.check_writable()?;
        self.send_request_ack()?;
        let token = self.create_ack_token(max_wait);
        self.wait_for_specific_ack(&token)
    }

    /// Block on `token`. No engine lock is held while waiting.
    pub fn wait_for_specific_ack(&self, token: &AckToken) -> Result<()> {
        verbose!(self, "waiting for acks up to {}", token.sequence);
        let result = self.store.wait_ack_of_sequence(token.deadline, token.sequence);
        if let Err(e) = &result {
            log::debug!(
                "[writer] ack wait for seq {} ended: {}",
                token.sequence,
                e
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, reader, sample};
    use super::*;
    use crate::discovery::ReaderAssociation;
    use crate::error::Error;
    use crate::qos::DataWriterQos;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_best_effort_returns_immediately() {
        let h = harness(DataWriterQos::best_effort());
        h.engine
            .add_association(ReaderAssociation::new(reader(1)), true)
            .unwrap();
        h.engine.write(sample(1, 1), InstanceHandle::NIL).unwrap();
        let start = Instant::now();
        h.engine
            .wait_for_acknowledgments(Duration::from_secs(5))
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        // No REQUEST_ACK for best-effort writers.
        assert!(!h.transport.sent_kinds().contains(&MessageKind::RequestAck));
    }

    #[test]
    fn test_reliable_times_out_then_succeeds() {
        let h = harness(DataWriterQos::reliable());
        h.engine
            .add_association(ReaderAssociation::new(reader(1)), true)
            .unwrap();
        h.engine.write(sample(1, 1), InstanceHandle::NIL).unwrap();

        let err = h
            .engine
            .wait_for_acknowledgments(Duration::from_millis(30))
            .unwrap_err();
        assert_eq!(err, Error::Timeout);
        assert!(h.transport.sent_kinds().contains(&MessageKind::RequestAck));

        let store = Arc::clone(&h.store);
        let acker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            store.acknowledge(&reader(1), SequenceNumber::new(1_000));
        });
        h.engine
            .wait_for_acknowledgments(Duration::from_secs(5))
            .unwrap();
        acker.join().unwrap();
    }

    #[test]
    fn test_token_captures_max_sequence() {
        let h = harness(DataWriterQos::reliable());
        h.engine.write(sample(2, 1), InstanceHandle::NIL).unwrap();
        let token = h.engine.create_ack_token(Duration::ZERO);
        assert_eq!(token.sequence, h.engine.max_sequence());
        assert!(token.is_expired(Instant::now()));
        // No reader to wait for.
        h.engine.wait_for_specific_ack(&token).unwrap();
    }
}
