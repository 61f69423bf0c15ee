//! The link loop: one polled cycle multiplexing frames out and commands in
//!
//! Every tick runs, in order: connection check, one command read, actuator
//! update, one frame capture, frame write, frame release. Nothing past the
//! connection check happens while no peer is connected, and a peer lost
//! during the command read ends the tick before any capture.

pub mod command;
pub mod framing;
mod stats;

pub use command::{parse_command, parse_int_or_zero, Command, CommandError};
pub use framing::{decode_header, encode_frame, encode_header, write_frame, FramingError, HEADER_LEN};
pub use stats::LinkStats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::actuator::{ActuatorBank, ActuatorState};
use crate::camera::{CaptureError, FrameSource};
use crate::config::LinkConfig;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No peer connected
    Idle,
    /// Peer connected, frames flowing
    Active,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No peer; nothing read, captured or written
    Idle,
    /// Frame source had nothing to give
    CaptureFailed,
    /// A frame was captured but could not be written
    SendFailed,
    /// A frame went out; `bytes` includes the length prefix
    FrameSent { bytes: usize },
}

pub struct LinkLoop<T, F, A> {
    transport: T,
    frames: F,
    bank: A,
    actuators: ActuatorState,
    state: LinkState,
    config: LinkConfig,
    stats: LinkStats,
    last_report: (LinkStats, Instant),
}

impl<T, F, A> LinkLoop<T, F, A>
where
    T: Transport,
    F: FrameSource,
    A: ActuatorBank,
{
    /// Creates the loop and drives both actuators to their start angles
    pub fn new(transport: T, frames: F, mut bank: A, actuators: ActuatorState, config: LinkConfig) -> Self {
        actuators.sync(&mut bank);

        Self {
            transport,
            frames,
            bank,
            actuators,
            state: LinkState::Idle,
            config,
            stats: LinkStats::default(),
            last_report: (LinkStats::default(), Instant::now()),
        }
    }

    /// Runs ticks until `shutdown` is set, sleeping between them
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!("Link loop started");
        while !shutdown.load(Ordering::Relaxed) {
            let outcome = self.tick();
            thread::sleep(self.delay_after(&outcome));
        }
        log::info!(
            "Link loop stopped after {} ticks, {} frames sent",
            self.stats.ticks,
            self.stats.frames_sent
        );
    }

    /// Executes one iteration without sleeping
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        let connected = self.transport.is_connected();
        self.observe_link(connected);
        if !connected {
            self.stats.idle_ticks += 1;
            return TickOutcome::Idle;
        }

        self.poll_command();
        if !self.transport.is_open() {
            // Peer hung up while the command was being read
            self.observe_link(false);
            self.stats.idle_ticks += 1;
            return TickOutcome::Idle;
        }

        let frame = match self.frames.acquire_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.record_capture_failure(&e);
                return TickOutcome::CaptureFailed;
            }
        };
        self.stats.consecutive_capture_failures = 0;

        let result = write_frame(&mut self.transport, frame.as_bytes());
        let frame_len = frame.len();
        self.frames.release_frame(frame);

        match result {
            Ok(bytes) => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += bytes as u64;
                log::debug!("Sent frame of {} bytes", frame_len);
                self.maybe_report();
                TickOutcome::FrameSent { bytes }
            }
            Err(e) => {
                self.stats.write_errors += 1;
                log::warn!("Failed to send frame of {} bytes: {}", frame_len, e);
                TickOutcome::SendFailed
            }
        }
    }

    /// Wait owed after a tick with the given outcome
    pub fn delay_after(&self, outcome: &TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Idle => self.config.idle_wait(),
            TickOutcome::CaptureFailed => self.config.capture_backoff(),
            TickOutcome::SendFailed | TickOutcome::FrameSent { .. } => self.config.frame_interval(),
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.state
    }

    pub fn actuators(&self) -> &ActuatorState {
        &self.actuators
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn frame_source(&self) -> &F {
        &self.frames
    }

    pub fn frame_source_mut(&mut self) -> &mut F {
        &mut self.frames
    }

    pub fn bank(&self) -> &A {
        &self.bank
    }

    fn observe_link(&mut self, connected: bool) {
        let next = if connected { LinkState::Active } else { LinkState::Idle };
        if next == self.state {
            if next == LinkState::Idle {
                log::debug!("No client connected. Waiting...");
            }
            return;
        }

        match next {
            LinkState::Active => log::info!("Client connected, streaming"),
            LinkState::Idle => log::info!("Client gone, link idle"),
        }
        self.state = next;
    }

    fn poll_command(&mut self) {
        let Some(line) = self.transport.read_line() else {
            return;
        };

        match parse_command(&line) {
            Ok(Some(command)) => {
                self.actuators.apply_command(command, &mut self.bank);
                self.stats.commands_applied += 1;
                log::info!(
                    "Servo A set to {}°, servo B set to {}°",
                    command.angle_a,
                    command.angle_b
                );

                if let Err(e) = self.transport.write_bytes(command.confirmation().as_bytes()) {
                    self.stats.write_errors += 1;
                    log::warn!("Failed to send command confirmation: {}", e);
                }
            }
            Ok(None) => {
                self.stats.ignored_lines += 1;
                log::debug!("Ignoring non-command line ({} bytes)", line.len());
            }
            Err(e) => {
                self.stats.malformed_commands += 1;
                log::warn!("{}", e);
            }
        }
    }

    fn record_capture_failure(&mut self, err: &CaptureError) {
        self.stats.capture_failures += 1;
        self.stats.consecutive_capture_failures += 1;

        let streak = self.stats.consecutive_capture_failures;
        let threshold = self.config.capture_failure_warn_threshold;
        if threshold > 0 && streak >= threshold && (streak - threshold) % threshold == 0 {
            log::warn!("Camera capture failed {} times in a row: {}", streak, err);
        } else {
            log::debug!("Camera capture failed: {}", err);
        }
    }

    fn maybe_report(&mut self) {
        let interval = self.config.stats_interval_frames;
        if interval == 0 || self.stats.frames_sent % interval != 0 {
            return;
        }

        let (previous, since) = &self.last_report;
        let elapsed = since.elapsed().as_secs_f64();
        log::info!(
            "Stats: {} frames sent ({:.2} fps, {:.1} kbps), {} commands, {} capture failures ({:.1}%), {} write errors",
            self.stats.frames_sent,
            self.stats.calculate_fps(previous, elapsed),
            self.stats.calculate_bitrate_kbps(previous, elapsed),
            self.stats.commands_applied,
            self.stats.capture_failures,
            self.stats.capture_failure_rate() * 100.0,
            self.stats.write_errors
        );
        self.last_report = (self.stats.clone(), Instant::now());
    }
}
