// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sequence number assignment for one publication.
//!
//! Numbers are strictly increasing, never reused, and never equal to the
//! `UNKNOWN` sentinel. Stamping needs the reader table so the repair flag
//! and the new number are computed against the same reader cursors.

use crate::association::ReaderAssociationTable;
use crate::types::SequenceNumber;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of stamping one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub sequence: SequenceNumber,
    /// Some reader's cursor lagged behind the previous maximum.
    pub repair: bool,
}

/// Sequence number generator (per-publication).
///
/// # Thread Safety
///
/// `stamp()` takes the reader table by reference, which in the engine means
/// the reader-table lock is held. `max()` is a lock-free read for transport
/// callbacks and ack tokens.
#[derive(Debug, Default)]
pub struct Sequencer {
    /// Highest number assigned so far (0 = none yet).
    last: AtomicU64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current maximum sequence number (`UNKNOWN` before the first stamp).
    #[inline]
    pub fn max(&self) -> SequenceNumber {
        SequenceNumber::new(self.last.load(Ordering::Acquire))
    }

    /// Assign the next number and compute the repair flag.
    ///
    /// The flag is set when any reader's expected cursor differs from the
    /// maximum *before* this assignment, i.e. that reader cannot assume the
    /// new number directly follows what it has seen.
    pub fn stamp(&self, readers: &ReaderAssociationTable) -> Stamp {
        let repair = readers.needs_repair(self.max());
        // fetch_add returns the previous value.
        let sequence = SequenceNumber::new(self.last.fetch_add(1, Ordering::AcqRel) + 1);
        Stamp { sequence, repair }
    }
}
