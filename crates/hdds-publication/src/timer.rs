// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sporadic (one-shot, re-armable) background task.
//!
//! Each task owns a named thread that sleeps until either a command arrives
//! or the armed deadline passes. On expiry the callback runs and its return
//! value re-arms the task (`Some(delay)`) or leaves it idle (`None`).
//!
//! ```ignore
//! let task = SporadicTask::spawn("hdds-liveliness", move |now| {
//!     weak.upgrade().and_then(|engine| engine.on_tick(now))
//! })?;
//! task.schedule(Duration::from_millis(100));
//! ```

use crate::error::Result;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Commands accepted by the task thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCommand {
    /// (Re-)arm to fire `delay` from now.
    Schedule(Duration),
    /// Disarm without stopping the thread.
    Cancel,
    Shutdown,
}

pub struct SporadicTask {
    name: String,
    cmd_tx: Sender<TaskCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SporadicTask {
    /// Spawn the task thread. The task starts disarmed.
    pub fn spawn<F>(name: &str, callback: F) -> Result<Self>
    where
        F: FnMut(Instant) -> Option<Duration> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = channel::unbounded();
        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run_thread(cmd_rx, callback))?;
        Ok(Self {
            name: name.to_string(),
            cmd_tx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self, delay: Duration) {
        let _ = self.cmd_tx.send(TaskCommand::Schedule(delay));
    }

    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(TaskCommand::Cancel);
    }

    fn run_thread<F>(cmd_rx: Receiver<TaskCommand>, mut callback: F)
    where
        F: FnMut(Instant) -> Option<Duration>,
    {
        let mut due: Option<Instant> = None;
        loop {
            let command = match due {
                None => match cmd_rx.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => return,
                },
                Some(at) => {
                    let now = Instant::now();
                    if at <= now {
                        None
                    } else {
                        match cmd_rx.recv_timeout(at - now) {
                            Ok(cmd) => Some(cmd),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                }
            };

            match command {
                Some(TaskCommand::Schedule(delay)) => due = Instant::now().checked_add(delay),
                Some(TaskCommand::Cancel) => due = None,
                Some(TaskCommand::Shutdown) => return,
                None => {
                    let now = Instant::now();
                    due = callback(now).and_then(|next| now.checked_add(next));
                }
            }
        }
    }
}

impl Drop for SporadicTask {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(TaskCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            // The last engine reference may be released from inside the
            // callback; joining our own thread would never return.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fires_and_reschedules() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let task = SporadicTask::spawn("hdds-test-task", move |_now| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            (n < 3).then_some(Duration::from_millis(5))
        })
        .unwrap();
        task.schedule(Duration::from_millis(5));

        let deadline = Instant::now() + Duration::from_secs(2);
        while fired.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(30));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let task = SporadicTask::spawn("hdds-test-cancel", move |_now| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        })
        .unwrap();
        task.schedule(Duration::from_millis(50));
        task.cancel();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(task.name(), "hdds-test-cancel");
    }
}
