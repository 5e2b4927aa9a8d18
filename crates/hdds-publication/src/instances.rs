// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance registry: serialized key -> handle, handle -> instance.
//!
//! Keys are the key-only serialization of a sample, held as a shared
//! read-only copy so equality lookups never touch the full sample.
//! Mutated only under the engine's main lock.

use crate::error::{Error, Result};
use crate::types::{InstanceHandle, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;

/// Registration state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Registered,
    Disposed,
    Unregistered,
}

/// One live instance.
#[derive(Debug, Clone)]
pub struct InstanceEntry {
    pub handle: InstanceHandle,
    pub key: Arc<[u8]>,
    pub state: InstanceState,
    pub registered_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    by_key: HashMap<Arc<[u8]>, InstanceHandle>,
    by_handle: HashMap<InstanceHandle, InstanceEntry>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &[u8]) -> Option<InstanceHandle> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, handle: InstanceHandle) -> Option<&InstanceEntry> {
        self.by_handle.get(&handle)
    }

    pub fn insert(&mut self, key: Arc<[u8]>, handle: InstanceHandle, at: Timestamp) {
        self.by_key.insert(Arc::clone(&key), handle);
        self.by_handle.insert(
            handle,
            InstanceEntry {
                handle,
                key,
                state: InstanceState::Registered,
                registered_at: at,
            },
        );
    }

    pub fn set_state(&mut self, handle: InstanceHandle, state: InstanceState) {
        if let Some(entry) = self.by_handle.get_mut(&handle) {
            entry.state = state;
        }
    }

    pub fn remove(&mut self, handle: InstanceHandle) -> Option<InstanceEntry> {
        let entry = self.by_handle.remove(&handle)?;
        self.by_key.remove(&entry.key);
        Some(entry)
    }

    /// Resolve `handle` (and optionally check it against `key`) for
    /// unregister/dispose.
    ///
    /// A nil handle is resolved from the key. An unknown instance or a
    /// handle that does not match the key is a precondition failure.
    pub fn must_exist(&self, handle: InstanceHandle, key: Option<&[u8]>) -> Result<&InstanceEntry> {
        let resolved = match (handle.is_nil(), key) {
            (true, Some(key)) => self
                .lookup(key)
                .ok_or_else(|| Error::PreconditionNotMet("instance not registered".into()))?,
            (true, None) => {
                return Err(Error::BadParameter("nil handle without key".into()));
            }
            (false, Some(key)) => {
                let by_key = self
                    .lookup(key)
                    .ok_or_else(|| Error::PreconditionNotMet("instance not registered".into()))?;
                if by_key != handle {
                    return Err(Error::PreconditionNotMet(format!(
                        "handle {} does not match key (registered as {})",
                        handle, by_key
                    )));
                }
                handle
            }
            (false, None) => handle,
        };
        self.by_handle
            .get(&resolved)
            .ok_or_else(|| Error::PreconditionNotMet(format!("unknown instance {}", resolved)))
    }

    pub fn handles(&self) -> Vec<InstanceHandle> {
        let mut handles: Vec<_> = self.by_handle.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
