// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Stop requests delivered from the signal thread to the control loops.
//!
//! Each control loop owns a [`StopToken`]. Blocking waits inside the loops
//! go through the token (or poll it between short hardware waits), so a
//! request is observed even while a loop is sleeping.

use nix::sys::signal::Signal;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Why a loop was asked to stop.
///
/// Ordered by severity: a `Terminate` request replaces a pending
/// `Interrupt`, never the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopReason {
    /// Interactive cancel (SIGINT). The power decoder defers it while a
    /// button press is being measured.
    Interrupt,
    /// Polite terminate (SIGTERM).
    Terminate,
}

impl StopReason {
    /// Signals the daemon listens for.
    pub const SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

    /// Stop request carried by a received signal, `None` for signals the
    /// daemon does not stop on.
    pub fn from_signal(sig: i32) -> Option<Self> {
        match sig {
            SIGINT => Some(StopReason::Interrupt),
            SIGTERM => Some(StopReason::Terminate),
            _ => None,
        }
    }
}

/// Name of a signal number for log messages.
pub fn signal_name(sig: i32) -> &'static str {
    Signal::try_from(sig).map_or("unknown signal", Signal::as_str)
}

#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<(Mutex<Option<StopReason>>, Condvar)>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stop request and wake any thread sleeping on this token.
    pub fn request(&self, reason: StopReason) {
        let (_, cvar) = &*self.inner;
        let mut pending = self.lock();
        if pending.is_none_or(|current| reason > current) {
            *pending = Some(reason);
        }
        cvar.notify_all();
    }

    /// The pending request, if any.
    pub fn reason(&self) -> Option<StopReason> {
        *self.lock()
    }

    /// Sleep for `duration` or until a stop request arrives, whichever is
    /// first. Returns the request that cut the sleep short.
    pub fn sleep(&self, duration: Duration) -> Option<StopReason> {
        let (_, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut pending = self.lock();

        while pending.is_none() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            pending = match cvar.wait_timeout(pending, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *pending
    }

    fn lock(&self) -> MutexGuard<'_, Option<StopReason>> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
