// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outstanding control-message accounting.
//!
//! Every control message handed to the transport is counted as sent; the
//! transport reports it delivered or dropped. `wait_messages_pending` lets
//! shutdown drain them before tearing links down.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlCounts {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
}

impl ControlCounts {
    pub fn pending(&self) -> u64 {
        self.sent.saturating_sub(self.delivered + self.dropped)
    }
}

#[derive(Debug, Default)]
pub struct ControlTracker {
    counts: Mutex<ControlCounts>,
    drained: Condvar,
}

impl ControlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_sent(&self) {
        self.counts.lock().sent += 1;
    }

    pub fn message_delivered(&self) {
        let mut counts = self.counts.lock();
        counts.delivered += 1;
        if counts.pending() == 0 {
            self.drained.notify_all();
        }
    }

    pub fn message_dropped(&self) {
        let mut counts = self.counts.lock();
        counts.dropped += 1;
        if counts.pending() == 0 {
            self.drained.notify_all();
        }
    }

    pub fn snapshot(&self) -> ControlCounts {
        *self.counts.lock()
    }

    /// Block until no control message is outstanding. Returns false on
    /// deadline.
    pub fn wait_messages_pending(&self, deadline: Instant) -> bool {
        let mut counts = self.counts.lock();
        while counts.pending() > 0 {
            if self.drained.wait_until(&mut counts, deadline).timed_out() {
                let remaining = counts.pending();
                if remaining > 0 {
                    log::debug!("[control] timed out with {} control messages pending", remaining);
                    return false;
                }
            }
        }
        true
    }
}
