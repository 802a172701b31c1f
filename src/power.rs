// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Power button pulse decoder.
//!
//! The board signals a button press as a high pulse on the input line. Its
//! width selects the action: a short pulse (at most the threshold) asks for
//! a reboot, a longer one for a poweroff.
//!
//! While a pulse is being measured an interactive interrupt is held back
//! until the measurement completes; only a terminate request aborts it.

use crate::error::Result;
use crate::gpio::{Edge, EdgeKind, EdgeSource};
use crate::stop::{StopReason, StopToken};
use std::fmt;
use std::process::Command;
use std::time::Duration;

/// How long a single edge wait blocks before the stop token is re-checked.
pub const EDGE_POLL_SLICE: Duration = Duration::from_millis(200);

const REBOOT_ARGS: &[&str] = &[];
const POWEROFF_ARGS: &[&str] = &["-h", "now"];

/// What a button pulse asks the host to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Reboot,
    Poweroff,
}

impl PowerAction {
    /// Program and arguments that carry out the action.
    pub fn command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            PowerAction::Reboot => ("reboot", REBOOT_ARGS),
            PowerAction::Poweroff => ("shutdown", POWEROFF_ARGS),
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerAction::Reboot => write!(f, "reboot"),
            PowerAction::Poweroff => write!(f, "poweroff"),
        }
    }
}

/// Map a pulse width to an action. The threshold itself still counts as a
/// short pulse.
pub fn classify(pulse: Duration, threshold: Duration) -> PowerAction {
    if pulse <= threshold {
        PowerAction::Reboot
    } else {
        PowerAction::Poweroff
    }
}

// ---------------------------------------------------------------------------
// Action runners
// ---------------------------------------------------------------------------

/// Carries out power actions.
pub trait ActionRunner {
    fn run(&mut self, action: PowerAction);
}

/// Spawns the system's reboot/shutdown commands without waiting on them.
#[derive(Debug, Clone, Default)]
pub struct SystemCommands {
    dry_run: bool,
}

impl SystemCommands {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl ActionRunner for SystemCommands {
    fn run(&mut self, action: PowerAction) {
        let (program, args) = action.command();
        if self.dry_run {
            log::warn!("Dry run, not executing: {program} {}", args.join(" "));
            return;
        }
        match Command::new(program).args(args).spawn() {
            Ok(child) => log::debug!("Started {program} (pid {})", child.id()),
            Err(e) => log::error!("Failed to run {program}: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for a rising edge.
    Idle,
    /// Rising edge seen, waiting for the falling edge.
    Measuring { since: Duration },
    /// Input line released, loop finished.
    Released,
}

pub struct PulseDecoder<E, R> {
    edges: E,
    runner: R,
    threshold: Duration,
    poll_slice: Duration,
    state: DecoderState,
}

impl<E: EdgeSource, R: ActionRunner> PulseDecoder<E, R> {
    pub fn new(edges: E, runner: R, threshold: Duration) -> Self {
        Self {
            edges,
            runner,
            threshold,
            poll_slice: EDGE_POLL_SLICE,
            state: DecoderState::Idle,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn edges(&self) -> &E {
        &self.edges
    }

    /// Decode pulses until `stop` fires, then release the input line. The
    /// line is released on every exit path, errors included.
    pub fn run(&mut self, stop: &StopToken) -> Result<()> {
        let result = self.watch(stop);
        log::info!("Cleaning up power button...");
        self.edges.release();
        self.state = DecoderState::Released;
        result
    }

    fn watch(&mut self, stop: &StopToken) -> Result<()> {
        loop {
            self.state = DecoderState::Idle;
            if let Some(reason) = stop.reason() {
                log::info!("Stop requested ({reason:?})");
                return Ok(());
            }

            let Some(start) = self.wait_for(EdgeKind::Rising)? else {
                continue;
            };
            log::debug!("Detected rise at {start:?}");
            self.state = DecoderState::Measuring { since: start };

            let end = loop {
                if stop.reason() == Some(StopReason::Terminate) {
                    log::info!("Terminated while measuring a pulse");
                    return Ok(());
                }
                if let Some(end) = self.wait_for(EdgeKind::Falling)? {
                    break end;
                }
            };
            log::debug!("Detected fall at {end:?}");

            let pulse = end.saturating_sub(start);
            let action = classify(pulse, self.threshold);
            log::info!("Pulse of {pulse:?} (threshold {:?}): {action}", self.threshold);
            self.runner.run(action);
        }
    }

    /// Wait one poll slice for an edge of the given kind. Edges of the other
    /// kind are dropped.
    fn wait_for(&mut self, kind: EdgeKind) -> Result<Option<Duration>> {
        match self.edges.next_edge(self.poll_slice)? {
            Some(Edge { kind: k, at }) if k == kind => Ok(Some(at)),
            Some(edge) => {
                log::trace!("Ignoring {:?} edge while waiting for {kind:?}", edge.kind);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::gpio::testing::{ScriptedEdges, falling, rising};

    #[derive(Debug, Default)]
    struct RecordingRunner {
        actions: Vec<PowerAction>,
    }

    impl ActionRunner for RecordingRunner {
        fn run(&mut self, action: PowerAction) {
            self.actions.push(action);
        }
    }

    /// Raises a stop request whenever it hands out a rising edge.
    struct StopOnRise {
        inner: ScriptedEdges,
        stop: StopToken,
        reason: StopReason,
    }

    impl EdgeSource for StopOnRise {
        fn next_edge(&mut self, timeout: Duration) -> Result<Option<Edge>> {
            let edge = self.inner.next_edge(timeout)?;
            if matches!(edge, Some(Edge { kind: EdgeKind::Rising, .. })) {
                self.stop.request(self.reason);
            }
            Ok(edge)
        }

        fn release(&mut self) {
            self.inner.release();
        }
    }

    struct FailingEdges {
        released: bool,
    }

    impl EdgeSource for FailingEdges {
        fn next_edge(&mut self, _timeout: Duration) -> Result<Option<Edge>> {
            Err(Error::Gpio("poll failed".to_string()))
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    const THRESHOLD: Duration = Duration::from_millis(30);

    fn decode(script: Vec<Option<Edge>>) -> Vec<PowerAction> {
        let stop = StopToken::new();
        let edges = ScriptedEdges::new(script).terminate_when_done(&stop);
        let mut decoder = PulseDecoder::new(edges, RecordingRunner::default(), THRESHOLD);
        decoder.run(&stop).unwrap();
        assert!(decoder.edges().released);
        assert_eq!(decoder.state(), DecoderState::Released);
        decoder.runner().actions.clone()
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(Duration::from_millis(20), THRESHOLD), PowerAction::Reboot);
        assert_eq!(classify(Duration::from_millis(50), THRESHOLD), PowerAction::Poweroff);
        assert_eq!(classify(THRESHOLD, THRESHOLD), PowerAction::Reboot);
        assert_eq!(
            classify(THRESHOLD + Duration::from_micros(1), THRESHOLD),
            PowerAction::Poweroff
        );
        assert_eq!(classify(Duration::ZERO, THRESHOLD), PowerAction::Reboot);
    }

    #[test]
    fn test_commands() {
        let (program, args) = PowerAction::Reboot.command();
        assert_eq!(program, "reboot");
        assert!(args.is_empty());

        let (program, args) = PowerAction::Poweroff.command();
        assert_eq!(program, "shutdown");
        assert_eq!(args, ["-h", "now"]);
    }

    #[test]
    fn test_short_pulse_reboots() {
        assert_eq!(decode(vec![rising(1000), falling(1020)]), vec![PowerAction::Reboot]);
    }

    #[test]
    fn test_long_pulse_powers_off() {
        assert_eq!(decode(vec![rising(1000), falling(1050)]), vec![PowerAction::Poweroff]);
    }

    #[test]
    fn test_pulse_at_threshold_reboots() {
        assert_eq!(decode(vec![rising(500), falling(530)]), vec![PowerAction::Reboot]);
    }

    #[test]
    fn test_keeps_watching_after_action() {
        let actions = decode(vec![
            rising(0),
            falling(25),
            None,
            rising(1000),
            None,
            None,
            falling(1045),
        ]);
        assert_eq!(actions, vec![PowerAction::Reboot, PowerAction::Poweroff]);
    }

    #[test]
    fn test_stray_edges_ignored() {
        // A falling edge while idle and a second rise while measuring are
        // dropped; the pulse is timed from the first rise.
        let actions = decode(vec![falling(10), rising(100), rising(110), falling(140)]);
        assert_eq!(actions, vec![PowerAction::Poweroff]);
    }

    #[test]
    fn test_no_edges_no_action() {
        assert!(decode(vec![None, None]).is_empty());
    }

    #[test]
    fn test_interrupt_deferred_while_measuring() {
        let stop = StopToken::new();
        let edges = StopOnRise {
            inner: ScriptedEdges::new(vec![rising(0), None, None, falling(20), rising(500)]),
            stop: stop.clone(),
            reason: StopReason::Interrupt,
        };
        let mut decoder = PulseDecoder::new(edges, RecordingRunner::default(), THRESHOLD);

        decoder.run(&stop).unwrap();

        // The press in progress completes; the interrupt is honored back in
        // idle, before the next rise is read.
        assert_eq!(decoder.runner().actions, vec![PowerAction::Reboot]);
        assert_eq!(decoder.edges().inner.script.len(), 1);
        assert!(decoder.edges().inner.released);
    }

    #[test]
    fn test_terminate_aborts_measurement() {
        let stop = StopToken::new();
        let edges = StopOnRise {
            inner: ScriptedEdges::new(vec![rising(0), falling(20)]),
            stop: stop.clone(),
            reason: StopReason::Terminate,
        };
        let mut decoder = PulseDecoder::new(edges, RecordingRunner::default(), THRESHOLD);

        decoder.run(&stop).unwrap();

        assert!(decoder.runner().actions.is_empty());
        assert!(decoder.edges().inner.released);
    }

    #[test]
    fn test_stop_before_start_releases_line() {
        let stop = StopToken::new();
        stop.request(StopReason::Interrupt);
        let mut decoder = PulseDecoder::new(
            ScriptedEdges::new(vec![rising(0), falling(10)]),
            RecordingRunner::default(),
            THRESHOLD,
        );
        decoder.run(&stop).unwrap();
        assert!(decoder.runner().actions.is_empty());
        assert!(decoder.edges().released);
    }

    #[test]
    fn test_gpio_error_releases_line() {
        let stop = StopToken::new();
        let mut decoder = PulseDecoder::new(
            FailingEdges { released: false },
            RecordingRunner::default(),
            THRESHOLD,
        );
        assert!(matches!(decoder.run(&stop), Err(Error::Gpio(_))));
        assert!(decoder.edges().released);
    }

    #[test]
    fn test_dry_run_does_not_spawn() {
        let mut runner = SystemCommands::new(true);
        runner.run(PowerAction::Poweroff);
        runner.run(PowerAction::Reboot);
    }
}
