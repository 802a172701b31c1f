// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Owns the control loop threads.
//!
//! Each loop runs on its own named OS thread with its own [`StopToken`].
//! [`Supervisor::request_stop`] forwards a stop request to every loop and
//! [`Supervisor::join`] waits for all of them. A loop that fails or panics
//! terminates its siblings, so the daemon never keeps running on one leg.

use crate::error::Result;
use crate::stop::{StopReason, StopToken};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

struct Worker {
    name: String,
    handle: JoinHandle<Result<()>>,
}

/// How a control loop ended.
#[derive(Debug)]
pub enum LoopExit {
    /// Returned normally after a stop request.
    Stopped,
    /// Returned an error.
    Failed(crate::error::Error),
    /// Panicked.
    Panicked,
}

#[derive(Default)]
pub struct Supervisor {
    workers: Vec<Worker>,
    stopper: Stopper,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `body` on a new thread named `name`. If `body` returns an
    /// error or panics, every other loop is asked to terminate.
    pub fn spawn<F>(&mut self, name: &str, body: F) -> io::Result<()>
    where
        F: FnOnce(StopToken) -> Result<()> + Send + 'static,
    {
        let token = StopToken::new();
        self.stopper.register(token.clone());
        let siblings = self.stopper.clone();
        let loop_name = name.to_string();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(token)));
            if !matches!(outcome, Ok(Ok(()))) {
                log::warn!("{loop_name} ended abnormally, stopping the other loops");
                siblings.request(StopReason::Terminate);
            }
            match outcome {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            }
        })?;
        log::debug!("Started {name}");
        self.workers.push(Worker {
            name: name.to_string(),
            handle,
        });
        Ok(())
    }

    /// Handle that can stop every loop from another thread.
    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    /// Forward a stop request to every loop.
    pub fn request_stop(&self, reason: StopReason) {
        self.stopper.request(reason);
    }

    /// Terminate every loop and wait for them.
    pub fn shutdown(self) -> Vec<(String, LoopExit)> {
        self.request_stop(StopReason::Terminate);
        self.join()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every loop to finish and report how each one ended.
    pub fn join(self) -> Vec<(String, LoopExit)> {
        self.workers
            .into_iter()
            .map(|worker| {
                let exit = match worker.handle.join() {
                    Ok(Ok(())) => {
                        log::info!("{} stopped", worker.name);
                        LoopExit::Stopped
                    }
                    Ok(Err(e)) => {
                        log::error!("{} failed: {e}", worker.name);
                        LoopExit::Failed(e)
                    }
                    Err(_) => {
                        log::error!("{} panicked", worker.name);
                        LoopExit::Panicked
                    }
                };
                (worker.name, exit)
            })
            .collect()
    }
}

/// Cloneable fan-out of stop requests to the supervised loops. Loops
/// registered after a request inherit it.
#[derive(Debug, Clone, Default)]
pub struct Stopper {
    inner: Arc<Mutex<StopperState>>,
}

#[derive(Debug, Default)]
struct StopperState {
    tokens: Vec<StopToken>,
    requested: Option<StopReason>,
}

impl Stopper {
    pub fn request(&self, reason: StopReason) {
        let mut state = self.lock();
        if state.requested.is_none_or(|current| reason > current) {
            state.requested = Some(reason);
        }
        for token in &state.tokens {
            token.request(reason);
        }
    }

    fn register(&self, token: StopToken) {
        let mut state = self.lock();
        if let Some(reason) = state.requested {
            token.request(reason);
        }
        state.tokens.push(token);
    }

    fn lock(&self) -> MutexGuard<'_, StopperState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::Duration;

    fn wait_for_stop(stop: StopToken) -> Result<()> {
        while stop.sleep(Duration::from_secs(60)).is_none() {}
        Ok(())
    }

    /// Join on a helper thread so a hang fails the test instead of blocking.
    fn join_within(supervisor: Supervisor, limit: Duration) -> Vec<(String, LoopExit)> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(supervisor.join());
        });
        rx.recv_timeout(limit).expect("supervisor.join() did not return")
    }

    #[test]
    fn test_stop_reaches_every_loop() {
        let mut supervisor = Supervisor::new();
        for name in ["fan_ctrl", "pwr_ctrl"] {
            supervisor.spawn(name, wait_for_stop).unwrap();
        }
        assert_eq!(supervisor.len(), 2);

        supervisor.request_stop(StopReason::Terminate);
        let exits = supervisor.join();

        assert_eq!(exits.len(), 2);
        assert_eq!(exits[0].0, "fan_ctrl");
        assert_eq!(exits[1].0, "pwr_ctrl");
        assert!(exits.iter().all(|(_, e)| matches!(e, LoopExit::Stopped)));
    }

    #[test]
    fn test_loops_see_their_stop_reason() {
        let mut supervisor = Supervisor::new();
        supervisor
            .spawn("waiter", |stop| match stop.sleep(Duration::from_secs(60)) {
                Some(StopReason::Interrupt) => Ok(()),
                other => Err(Error::Gpio(format!("unexpected {other:?}"))),
            })
            .unwrap();

        let stopper = supervisor.stopper();
        stopper.request(StopReason::Interrupt);

        let exits = supervisor.join();
        assert!(matches!(exits[0].1, LoopExit::Stopped));
    }

    #[test]
    fn test_failed_and_panicked_loops_reported() {
        let mut supervisor = Supervisor::new();
        supervisor
            .spawn("broken", |_| Err(Error::Bus("no ack".to_string())))
            .unwrap();
        supervisor
            .spawn("crashing", |_| panic!("boom"))
            .unwrap();

        let exits = supervisor.join();
        assert!(matches!(exits[0].1, LoopExit::Failed(Error::Bus(_))));
        assert!(matches!(exits[1].1, LoopExit::Panicked));
    }

    #[test]
    fn test_failed_loop_terminates_the_other() {
        let mut supervisor = Supervisor::new();
        supervisor
            .spawn("fan_ctrl", |_| {
                Err(Error::SensorRead {
                    path: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
                    reason: "gone".to_string(),
                })
            })
            .unwrap();
        supervisor
            .spawn("pwr_ctrl", |stop| match stop.sleep(Duration::from_secs(60)) {
                Some(StopReason::Terminate) => Ok(()),
                other => Err(Error::Gpio(format!("unexpected {other:?}"))),
            })
            .unwrap();

        let exits = join_within(supervisor, Duration::from_secs(10));

        assert!(matches!(exits[0].1, LoopExit::Failed(Error::SensorRead { .. })));
        assert!(matches!(exits[1].1, LoopExit::Stopped));
    }

    #[test]
    fn test_panicked_loop_terminates_the_other() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("pwr_ctrl", wait_for_stop).unwrap();
        supervisor.spawn("fan_ctrl", |_| panic!("bus gone")).unwrap();

        let exits = join_within(supervisor, Duration::from_secs(10));

        assert!(matches!(exits[0].1, LoopExit::Stopped));
        assert!(matches!(exits[1].1, LoopExit::Panicked));
    }

    #[test]
    fn test_clean_exit_does_not_stop_siblings() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("quick", |_| Ok(())).unwrap();
        supervisor.spawn("waiter", wait_for_stop).unwrap();

        let stopper = supervisor.stopper();
        thread::sleep(Duration::from_millis(50));
        assert!(stopper.lock().requested.is_none());

        supervisor.request_stop(StopReason::Interrupt);
        let exits = supervisor.join();
        assert!(exits.iter().all(|(_, e)| matches!(e, LoopExit::Stopped)));
    }

    #[test]
    fn test_late_loop_inherits_earlier_request() {
        let mut supervisor = Supervisor::new();
        supervisor.request_stop(StopReason::Terminate);
        supervisor
            .spawn("late", |stop| match stop.reason() {
                Some(StopReason::Terminate) => Ok(()),
                other => Err(Error::Gpio(format!("unexpected {other:?}"))),
            })
            .unwrap();

        let exits = join_within(supervisor, Duration::from_secs(10));
        assert!(matches!(exits[0].1, LoopExit::Stopped));
    }

    #[test]
    fn test_shutdown_stops_running_loops() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("fan_ctrl", wait_for_stop).unwrap();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(supervisor.shutdown());
        });
        let exits = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(exits[0].1, LoopExit::Stopped));
    }
}
