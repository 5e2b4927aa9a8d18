// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Suspend/resume queue.
//!
//! While the publisher is suspended, released batches pile up in one list.
//! The first deferred transaction sets the low watermark, later ones move
//! the high watermark. On resume the list goes out under the high
//! watermark, then under the low one; the transport releases it once the
//! low transaction is reached, so ordering against batches released
//! after resume is kept.

use super::PublicationEngine;
use crate::message::QueuedItem;
use crate::types::TransactionId;

#[derive(Debug, Default)]
pub(crate) struct SuspendQueue {
    pending: Vec<QueuedItem>,
    min_transaction: TransactionId,
    max_transaction: TransactionId,
}

impl SuspendQueue {
    /// Defer one released batch.
    pub(crate) fn defer(&mut self, items: Vec<QueuedItem>, transaction: TransactionId) {
        if self.min_transaction == 0 {
            self.min_transaction = transaction;
        } else {
            self.max_transaction = transaction;
        }
        self.pending.extend(items);
    }

    /// Add items without a transaction of their own (historic replay).
    pub(crate) fn append(&mut self, items: Vec<QueuedItem>) {
        self.pending.extend(items);
    }

    pub(crate) fn watermarks(&self) -> (TransactionId, TransactionId) {
        (self.min_transaction, self.max_transaction)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self) -> (Vec<QueuedItem>, TransactionId, TransactionId) {
        let min = std::mem::take(&mut self.min_transaction);
        let max = std::mem::take(&mut self.max_transaction);
        (std::mem::take(&mut self.pending), min, max)
    }
}

impl PublicationEngine {
    /// Flush everything deferred while the publisher was suspended.
    pub fn send_suspended_data(&self) {
        let (items, min, max) = self.state.lock().suspend.take();
        if items.is_empty() {
            return;
        }
        log::debug!(
            "[suspend] flushing {} item(s), transactions {}..={}",
            items.len(),
            min,
            max.max(min)
        );
        if max != 0 {
            self.transport.send(items.clone(), max);
        }
        self.transport.send(items, min);
    }

    /// `(low, high)` deferred transaction ids, `(0, 0)` when nothing waits.
    pub fn suspended_watermarks(&self) -> (TransactionId, TransactionId) {
        self.state.lock().suspend.watermarks()
    }

    pub fn suspended_len(&self) -> usize {
        self.state.lock().suspend.len()
    }

    /// Drop whatever is still deferred (writer deletion).
    pub fn terminate_send_if_suspended(&self) {
        let (items, _, _) = self.state.lock().suspend.take();
        if items.is_empty() {
            return;
        }
        log::debug!("[suspend] dropping {} deferred item(s)", items.len());
        for item in &items {
            self.store.data_dropped(item, false);
        }
    }
}
