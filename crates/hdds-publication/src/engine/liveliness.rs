// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Liveliness monitor.
//!
//! Two sporadic tasks per writer:
//!
//! - **send** (AUTOMATIC only): asserts liveliness once `send_interval`
//!   passed without activity
//! - **lost**: flags LIVELINESS_LOST once `lost_interval` passed without
//!   activity, notifying once per transition
//!
//! Both re-arm from the time of the last activity, so writes and manual
//! assertions push the deadlines out without touching the timers.

use super::{EngineState, PublicationEngine};
use crate::error::{Error, Result};
use crate::listener::{LivelinessLostStatus, StatusMask};
use crate::message::MessageKind;
use crate::qos::{DataWriterQos, LivelinessKind};
use crate::timer::SporadicTask;
use crate::transport::SendControlStatus;
use crate::types::{InstanceHandle, Timestamp};
use parking_lot::MutexGuard;
use std::time::{Duration, Instant};

/// Liveliness bookkeeping of one writer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LivelinessState {
    pub(crate) send_interval: Duration,
    pub(crate) lost_interval: Duration,
    pub(crate) last_activity: Instant,
    pub(crate) lost: bool,
}

impl LivelinessState {
    pub(crate) fn new() -> Self {
        Self {
            send_interval: Duration::MAX,
            lost_interval: Duration::MAX,
            last_activity: Instant::now(),
            lost: false,
        }
    }

    pub(crate) fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.lost = false;
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

impl PublicationEngine {
    /// Body of the send task. Returns the delay until its next run.
    pub fn handle_liveliness_send_timeout(&self, now: Instant) -> Option<Duration> {
        let mut st = self.state.lock();
        let interval = st.liveliness.send_interval;
        let elapsed = st.liveliness.elapsed(now);
        if elapsed < interval {
            return Some(interval - elapsed);
        }
        if !self.send_liveliness(&mut st, now) {
            log::debug!("[liveliness] assertion by {} failed", self.publication_id());
        }
        Some(interval)
    }

    /// Body of the lost task. Returns the delay until its next run.
    pub fn handle_liveliness_lost_timeout(&self, now: Instant) -> Option<Duration> {
        let mut st = self.state.lock();
        let lost_interval = st.liveliness.lost_interval;
        let elapsed = st.liveliness.elapsed(now);
        if elapsed < lost_interval {
            return Some(lost_interval - elapsed);
        }

        let notify = !st.liveliness.lost;
        st.liveliness.lost = true;
        if notify {
            st.liveliness_lost.total_count += 1;
            st.liveliness_lost.total_count_change += 1;
            st.status_changes = st.status_changes | StatusMask::LIVELINESS_LOST;
            log::debug!(
                "[liveliness] {} lost liveliness after {:?}",
                self.publication_id(),
                elapsed
            );
            if let Some(listener) = self.listener_for(StatusMask::LIVELINESS_LOST) {
                let status = st.liveliness_lost.clone();
                MutexGuard::unlocked(&mut st, || listener.on_liveliness_lost(status));
                st.liveliness_lost.total_count_change = 0;
            }
        }
        Some(lost_interval)
    }

    /// Send DATAWRITER_LIVELINESS unless discovery asserts for us, then
    /// record the activity. Returns false if the send failed.
    fn send_liveliness(&self, st: &mut MutexGuard<'_, EngineState>, now: Instant) -> bool {
        let kind = st.qos.liveliness.kind;
        if kind == LivelinessKind::ManualByTopic || !self.discovery.supports_liveliness() {
            let item = match self.build_control(
                st,
                MessageKind::DatawriterLiveliness,
                InstanceHandle::NIL,
                None,
                Timestamp::now(),
            ) {
                Ok(item) => item,
                Err(e) => {
                    log::debug!("[liveliness] cannot build assertion: {}", e);
                    return false;
                }
            };
            let status = MutexGuard::unlocked(st, || self.send_control_item(item));
            if status == SendControlStatus::Error {
                return false;
            }
        }
        st.liveliness.record_activity(now);
        true
    }

    /// `assert_liveliness` of the DataWriter API.
    ///
    /// AUTOMATIC: no-op. MANUAL_BY_PARTICIPANT: asserts through the
    /// participant. MANUAL_BY_TOPIC: sends an assertion now.
    pub fn assert_liveliness(&self) -> Result<()> {
        self.check_writable()?;
        let kind = self.state.lock().qos.liveliness.kind;
        match kind {
            LivelinessKind::Automatic => Ok(()),
            LivelinessKind::ManualByParticipant => self.participant()?.assert_liveliness(),
            LivelinessKind::ManualByTopic => {
                let mut st = self.state.lock();
                if self.send_liveliness(&mut st, Instant::now()) {
                    Ok(())
                } else {
                    Err(Error::Internal("liveliness assertion not sent".into()))
                }
            }
        }
    }

    /// Called by the participant when it asserts liveliness on behalf of
    /// its MANUAL_BY_PARTICIPANT writers.
    pub fn assert_liveliness_by_participant(&self) -> bool {
        let mut st = self.state.lock();
        if st.qos.liveliness.kind != LivelinessKind::ManualByParticipant {
            return true;
        }
        self.send_liveliness(&mut st, Instant::now())
    }

    /// Send interval when this writer uses `kind`, else `Duration::MAX`.
    pub fn liveliness_check_interval(&self, kind: LivelinessKind) -> Duration {
        let st = self.state.lock();
        if st.qos.liveliness.kind == kind {
            st.liveliness.send_interval
        } else {
            Duration::MAX
        }
    }

    /// MANUAL_BY_PARTICIPANT writer active after `since`.
    pub fn participant_liveliness_activity_after(&self, since: Instant) -> bool {
        let st = self.state.lock();
        st.qos.liveliness.kind == LivelinessKind::ManualByParticipant
            && st.liveliness.last_activity > since
    }

    pub fn get_liveliness_lost_status(&self) -> LivelinessLostStatus {
        let mut st = self.state.lock();
        let status = st.liveliness_lost.clone();
        st.liveliness_lost.total_count_change = 0;
        st.status_changes = st.status_changes & !StatusMask::LIVELINESS_LOST;
        status
    }

    /// Spawn and arm the liveliness tasks for a finite lease.
    pub(super) fn start_liveliness_tasks(&self, qos: &DataWriterQos) -> Result<()> {
        if qos.liveliness.is_infinite() {
            return Ok(());
        }
        let (send_interval, lost_interval) = {
            let st = self.state.lock();
            (st.liveliness.send_interval, st.liveliness.lost_interval)
        };

        let mut tasks = self.liveliness_tasks.lock();
        if qos.liveliness.kind == LivelinessKind::Automatic {
            let engine = self.self_ref.clone();
            let task = SporadicTask::spawn("hdds-liveliness-send", move |now| {
                engine
                    .upgrade()
                    .and_then(|e| e.handle_liveliness_send_timeout(now))
            })?;
            task.schedule(send_interval);
            tasks.send = Some(task);
        }

        let engine = self.self_ref.clone();
        let task = SporadicTask::spawn("hdds-liveliness-lost", move |now| {
            engine
                .upgrade()
                .and_then(|e| e.handle_liveliness_lost_timeout(now))
        })?;
        task.schedule(lost_interval);
        tasks.lost = Some(task);

        log::debug!(
            "[liveliness] {} armed: send every {:?}, lost after {:?}",
            self.publication_id(),
            send_interval,
            lost_interval
        );
        Ok(())
    }

    /// Stop both tasks and join their threads.
    pub(super) fn cancel_liveliness_tasks(&self) {
        let tasks = std::mem::take(&mut *self.liveliness_tasks.lock());
        drop(tasks);
    }
}
