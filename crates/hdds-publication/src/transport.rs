// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport collaborator contract.
//!
//! The engine hands the transport fully stamped [`QueuedItem`]s; socket I/O,
//! fragmentation and retransmission live behind this trait. Completion is
//! reported back through `PublicationEngine::data_delivered` /
//! `data_dropped` / `control_delivered` / `control_dropped` and
//! `association_complete`.

use crate::error::Result;
use crate::message::{MessageKind, QueuedItem};
use crate::types::{Guid, SequenceNumber, Timestamp, TransactionId};
use std::collections::{BTreeMap, HashSet};

/// Outcome of `Transport::associate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationProgress {
    /// Link established synchronously.
    Complete,
    /// Link in progress; the transport calls `association_complete` later.
    Pending,
}

/// Outcome of a control send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendControlStatus {
    Ok,
    /// No link could take the message.
    NoLinks,
    Error,
}

impl SendControlStatus {
    pub fn is_ok(self) -> bool {
        self == SendControlStatus::Ok
    }
}

pub trait Transport: Send + Sync {
    /// Bind the transport to the publication id assigned at enable.
    fn enable(&self, publication: &Guid) -> Result<()>;

    /// Begin linking to `reader`. `active` is true when this side initiates.
    fn associate(&self, reader: &Guid, active: bool) -> Result<AssociationProgress>;

    fn disassociate(&self, reader: &Guid);

    /// Abort pending link attempts (deletion in progress).
    fn stop_associating(&self, readers: &[Guid]);

    /// Send one released batch. `transaction` orders batches released while
    /// the publisher was suspended (0 = unordered).
    fn send(&self, items: Vec<QueuedItem>, transaction: TransactionId);

    fn send_control(&self, item: QueuedItem) -> SendControlStatus;

    /// Send `items` then `control`, all addressed to `reader` (historic replay).
    fn send_with_control(&self, items: Vec<QueuedItem>, control: QueuedItem, reader: &Guid) -> SendControlStatus;

    /// Release links and stop any transport threads.
    fn stop(&self);
}

/// Restores release order of batches arriving with transaction ids.
///
/// Batch `expected` is delivered together with every held batch up to the
/// highest id seen so far; anything ahead of `expected` waits. Batches
/// released twice (suspend flush) are de-duplicated.
#[derive(Debug)]
pub struct TransactionGate {
    expected: TransactionId,
    max_seen: TransactionId,
    held: BTreeMap<TransactionId, Vec<QueuedItem>>,
}

impl Default for TransactionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Hash, PartialEq, Eq)]
enum DedupKey {
    Sequenced(SequenceNumber),
    Unsequenced(u8, Option<Guid>, Timestamp),
}

impl DedupKey {
    fn of(item: &QueuedItem) -> Self {
        if item.sequence().is_unknown() {
            let kind: MessageKind = item.kind();
            DedupKey::Unsequenced(kind as u8, item.destination, item.header.source_timestamp)
        } else {
            DedupKey::Sequenced(item.sequence())
        }
    }
}

impl TransactionGate {
    pub fn new() -> Self {
        Self {
            expected: 1,
            max_seen: 0,
            held: BTreeMap::new(),
        }
    }

    pub fn expected(&self) -> TransactionId {
        self.expected
    }

    /// Number of batches waiting for an earlier transaction.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Admit one batch; returns what may be sent now, in order.
    pub fn admit(&mut self, items: Vec<QueuedItem>, transaction: TransactionId) -> Vec<QueuedItem> {
        if transaction == 0 || transaction < self.expected {
            return items;
        }
        self.max_seen = self.max_seen.max(transaction);
        if transaction > self.expected {
            self.held.entry(transaction).or_default().extend(items);
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(items.len());
        let ready: Vec<TransactionId> = self.held.range(..=self.max_seen).map(|(id, _)| *id).collect();
        let batches = std::iter::once(items).chain(ready.into_iter().filter_map(|id| self.held.remove(&id)));
        for batch in batches {
            for item in batch {
                if seen.insert(DedupKey::of(&item)) {
                    out.push(item);
                }
            }
        }
        self.expected = self.max_seen + 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageHeader;

    fn data(seq: u64) -> QueuedItem {
        let mut header = MessageHeader::new(MessageKind::SampleData);
        header.sequence = SequenceNumber::new(seq);
        QueuedItem::new(header, None)
    }

    fn seqs(items: &[QueuedItem]) -> Vec<u64> {
        items.iter().map(|i| i.sequence().value()).collect()
    }

    #[test]
    fn test_in_order_passes_through() {
        let mut gate = TransactionGate::new();
        assert_eq!(seqs(&gate.admit(vec![data(1)], 1)), vec![1]);
        assert_eq!(seqs(&gate.admit(vec![data(2)], 2)), vec![2]);
        assert_eq!(gate.expected(), 3);
        assert_eq!(seqs(&gate.admit(vec![data(9)], 0)), vec![9]);
    }

    #[test]
    fn test_high_then_low_releases_once() {
        let mut gate = TransactionGate::new();
        gate.admit(vec![data(1)], 1);

        // Resume flush: same batch under the high then the low watermark.
        let batch = vec![data(2), data(3)];
        assert!(gate.admit(batch.clone(), 3).is_empty());
        assert_eq!(gate.held(), 1);
        assert_eq!(seqs(&gate.admit(batch, 2)), vec![2, 3]);
        assert_eq!(gate.held(), 0);
        assert_eq!(gate.expected(), 4);
    }
}
