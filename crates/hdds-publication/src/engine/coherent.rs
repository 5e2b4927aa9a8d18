// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Coherent change sets (`begin_coherent_changes` / `end_coherent_changes`).

use super::PublicationEngine;
use crate::error::{Error, Result};
use crate::message::{CoherentChangeControl, GroupCoherentSamples, MessageKind};
use crate::types::{Guid, InstanceHandle, Timestamp};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CoherentState {
    pub(crate) in_set: bool,
    /// Samples written since `begin`.
    pub(crate) samples: u32,
}

impl PublicationEngine {
    /// Open a coherent set. A second `begin` before `end` is rejected with
    /// `Error::InvalidState`.
    pub fn begin_coherent_changes(&self) -> Result<()> {
        self.check_writable()?;
        let mut st = self.state.lock();
        if st.coherent.in_set {
            return Err(Error::InvalidState("coherent set already open".into()));
        }
        st.coherent = CoherentState {
            in_set: true,
            samples: 0,
        };
        Ok(())
    }

    /// Close the open set and send END_COHERENT_CHANGES.
    ///
    /// `group` carries the per-writer summaries of a GROUP-scoped
    /// publisher and is ignored otherwise. Without an open set this returns
    /// `Error::PreconditionNotMet` and changes nothing. A failed send is
    /// logged; the set is closed regardless.
    pub fn end_coherent_changes(&self, group: &GroupCoherentSamples) -> Result<()> {
        let publisher = self.publisher()?;
        let mut st = self.state.lock();
        if !st.coherent.in_set {
            return Err(Error::PreconditionNotMet("no coherent set open".into()));
        }

        let group_coherent = publisher.presentation().is_group_scope();
        let control = CoherentChangeControl {
            num_samples: st.coherent.samples,
            last_sample: self.sequencer.max(),
            group_coherent,
            publisher_id: if group_coherent {
                publisher.publisher_id()
            } else {
                Guid::UNKNOWN
            },
            group_samples: if group_coherent {
                group.clone()
            } else {
                GroupCoherentSamples::new()
            },
        };
        let payload: Arc<[u8]> = control.encode().into();
        let built = self.build_control(
            &st,
            MessageKind::EndCoherentChanges,
            InstanceHandle::NIL,
            Some(payload),
            Timestamp::now(),
        );
        st.coherent = CoherentState::default();
        drop(st);

        match built {
            Ok(mut item) => {
                item.header.group_coherent = group_coherent;
                if !self.send_control_item(item).is_ok() {
                    log::warn!(
                        "[writer] END_COHERENT_CHANGES ({} samples) not sent",
                        control.num_samples
                    );
                }
            }
            Err(e) => log::warn!("[writer] cannot build END_COHERENT_CHANGES: {}", e),
        }
        Ok(())
    }

    pub fn coherent_changes_pending(&self) -> bool {
        self.state.lock().coherent.in_set
    }

    /// Samples written in the open set.
    pub fn coherent_samples(&self) -> u32 {
        self.state.lock().coherent.samples
    }
}
