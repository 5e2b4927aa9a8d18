// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ReaderAssociationTable - per matched reader bookkeeping for one writer.
//!
//! Lifecycle of a record: `Pending` (match reported, transport link in
//! progress) -> `Associated` (link complete, counted in matched status) ->
//! removed (record dropped, filter lease released).
//!
//! The engine keeps this table behind its own mutex, separate from the main
//! engine lock. Lock order is always main -> readers.

use crate::filter::{FieldMap, ReaderFilter};
use crate::types::{Guid, GuidSet, SequenceNumber};
use std::collections::HashMap;

/// Association lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    Pending,
    Associated,
}

/// One matched remote reader.
#[derive(Debug)]
pub struct ReaderInfo {
    pub reader: Guid,
    pub state: AssociationState,
    /// Reader requested durable (TRANSIENT_LOCAL or stronger) delivery.
    pub durable: bool,
    pub filter: Option<ReaderFilter>,
    /// Highest sequence number this reader is expected to have seen.
    pub expected_sequence: SequenceNumber,
}

impl ReaderInfo {
    pub fn new(
        reader: Guid,
        durable: bool,
        filter: Option<ReaderFilter>,
        expected_sequence: SequenceNumber,
    ) -> Self {
        Self {
            reader,
            state: AssociationState::Pending,
            durable,
            filter,
            expected_sequence,
        }
    }

    pub fn is_associated(&self) -> bool {
        self.state == AssociationState::Associated
    }
}

/// Table of reader records keyed by reader identity.
#[derive(Debug, Default)]
pub struct ReaderAssociationTable {
    readers: HashMap<Guid, ReaderInfo>,
}

impl ReaderAssociationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending record. Returns false if the reader is already known.
    pub fn insert_pending(&mut self, info: ReaderInfo) -> bool {
        if self.readers.contains_key(&info.reader) {
            return false;
        }
        self.readers.insert(info.reader, info);
        true
    }

    /// Move a pending record to `Associated`.
    ///
    /// Returns `None` if the record is gone or was already associated, so
    /// completion side effects run at most once per reader.
    pub fn mark_associated(&mut self, reader: &Guid) -> Option<&ReaderInfo> {
        let info = self.readers.get_mut(reader)?;
        if info.state == AssociationState::Associated {
            return None;
        }
        info.state = AssociationState::Associated;
        Some(info)
    }

    pub fn get(&self, reader: &Guid) -> Option<&ReaderInfo> {
        self.readers.get(reader)
    }

    pub fn get_mut(&mut self, reader: &Guid) -> Option<&mut ReaderInfo> {
        self.readers.get_mut(reader)
    }

    pub fn remove(&mut self, reader: &Guid) -> Option<ReaderInfo> {
        self.readers.remove(reader)
    }

    pub fn contains(&self, reader: &Guid) -> bool {
        self.readers.contains_key(reader)
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    pub fn reader_ids(&self) -> Vec<Guid> {
        self.readers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReaderInfo> {
        self.readers.values()
    }

    pub fn cursor(&self, reader: &Guid) -> Option<SequenceNumber> {
        self.readers.get(reader).map(|r| r.expected_sequence)
    }

    /// True if any reader's cursor differs from `current`.
    ///
    /// O(readers) per stamped message.
    pub fn needs_repair(&self, current: SequenceNumber) -> bool {
        self.readers
            .values()
            .any(|r| r.expected_sequence != current)
    }

    /// Control messages: every reader is expected to see `sequence`.
    pub fn advance_all(&mut self, sequence: SequenceNumber) {
        for info in self.readers.values_mut() {
            info.expected_sequence = sequence;
        }
    }

    /// Data messages: only readers not filtered out see `sequence`.
    pub fn advance_unfiltered(&mut self, sequence: SequenceNumber, excluded: Option<&GuidSet>) {
        for info in self.readers.values_mut() {
            if excluded.is_some_and(|set| set.contains(&info.reader)) {
                continue;
            }
            info.expected_sequence = sequence;
        }
    }

    /// Raise one reader's cursor to at least `sequence`.
    pub fn raise_cursor(&mut self, reader: &Guid, sequence: SequenceNumber) {
        if let Some(info) = self.readers.get_mut(reader) {
            if sequence > info.expected_sequence {
                info.expected_sequence = sequence;
            }
        }
    }

    /// Associated readers whose filter rejects a sample with `fields`.
    ///
    /// Returns `None` when no associated reader carries an evaluated filter.
    pub fn sample_exclusions(&self, fields: &FieldMap) -> Option<GuidSet> {
        let mut filtered = false;
        let mut excluded = GuidSet::new();
        for info in self.readers.values().filter(|r| r.is_associated()) {
            if let Some(filter) = info.filter.as_ref().filter(|f| f.is_evaluated()) {
                filtered = true;
                if filter.excludes_sample(fields) {
                    excluded.insert(info.reader);
                }
            }
        }
        filtered.then_some(excluded)
    }

    /// Readers whose filter cannot be applied to a key-only control message.
    pub fn control_exclusions(&self, key_fields: &[String]) -> Option<GuidSet> {
        let excluded: GuidSet = self
            .readers
            .values()
            .filter(|r| {
                r.filter
                    .as_ref()
                    .is_some_and(|f| f.excludes_control(key_fields))
            })
            .map(|r| r.reader)
            .collect();
        (!excluded.is_empty()).then_some(excluded)
    }
}
