//! In-memory doubles for the link loop collaborators
//!
//! All three share one event log so tests can assert the per-tick ordering.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use glasses_link::camera::{CaptureError, Frame, FrameSource};
use glasses_link::config::LinkConfig;
use glasses_link::transport::{Transport, TransportError};
use glasses_link::{ActuatorBank, ActuatorId, ActuatorState, Angle, LinkLoop};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConnectedCheck(bool),
    ReadLine(Option<String>),
    Write(Vec<u8>),
    SetAngle(ActuatorId, u8),
    Acquire,
    Release(usize),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub struct MockTransport {
    log: EventLog,
    /// Per-tick connection answers; `connected` is used once exhausted
    pub connected_script: VecDeque<bool>,
    pub connected: bool,
    pub inbound: VecDeque<String>,
    pub written: Vec<Vec<u8>>,
    pub fail_writes: bool,
    /// Next `read_line` sees the peer hang up instead of a line
    pub hangup_on_read: bool,
    open: bool,
}

impl MockTransport {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            connected_script: VecDeque::new(),
            connected: true,
            inbound: VecDeque::new(),
            written: Vec::new(),
            fail_writes: false,
            hangup_on_read: false,
            open: false,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.inbound.push_back(line.to_string());
    }

    /// Everything written, concatenated
    pub fn wire(&self) -> Vec<u8> {
        self.written.concat()
    }
}

impl Transport for MockTransport {
    fn is_connected(&mut self) -> bool {
        let connected = self.connected_script.pop_front().unwrap_or(self.connected);
        self.log.borrow_mut().push(Event::ConnectedCheck(connected));
        self.open = connected;
        connected
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_line(&mut self) -> Option<String> {
        if self.hangup_on_read {
            self.hangup_on_read = false;
            self.open = false;
            self.connected = false;
            self.inbound.clear();
            self.log.borrow_mut().push(Event::ReadLine(None));
            return None;
        }

        let line = self.inbound.pop_front();
        self.log.borrow_mut().push(Event::ReadLine(line.clone()));
        line
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::NotConnected);
        }
        self.log.borrow_mut().push(Event::Write(bytes.to_vec()));
        self.written.push(bytes.to_vec());
        Ok(())
    }
}

pub struct MockCamera {
    log: EventLog,
    /// `false` entries make the matching acquisition fail
    pub schedule: VecDeque<bool>,
    pub frame_len: usize,
    pub acquired: usize,
    pub released: usize,
    in_flight: bool,
}

impl MockCamera {
    pub fn new(log: EventLog, frame_len: usize) -> Self {
        Self {
            log,
            schedule: VecDeque::new(),
            frame_len,
            acquired: 0,
            released: 0,
            in_flight: false,
        }
    }
}

impl FrameSource for MockCamera {
    fn acquire_frame(&mut self) -> Result<Frame, CaptureError> {
        self.log.borrow_mut().push(Event::Acquire);
        assert!(!self.in_flight, "frame acquired while another is in flight");

        if !self.schedule.pop_front().unwrap_or(true) {
            return Err(CaptureError::EmptyFrame);
        }

        self.acquired += 1;
        self.in_flight = true;
        let fill = (self.acquired % 256) as u8;
        Ok(Frame::new(vec![fill; self.frame_len]))
    }

    fn release_frame(&mut self, frame: Frame) {
        self.log.borrow_mut().push(Event::Release(frame.len()));
        self.released += 1;
        self.in_flight = false;
    }
}

pub struct MockBank {
    log: EventLog,
    pub moves: Vec<(ActuatorId, u8)>,
}

impl MockBank {
    pub fn new(log: EventLog) -> Self {
        Self { log, moves: Vec::new() }
    }
}

impl ActuatorBank for MockBank {
    fn set_angle(&mut self, id: ActuatorId, angle: Angle) {
        self.log.borrow_mut().push(Event::SetAngle(id, angle.degrees()));
        self.moves.push((id, angle.degrees()));
    }
}

pub type MockLink = LinkLoop<MockTransport, MockCamera, MockBank>;

pub fn test_config() -> LinkConfig {
    LinkConfig {
        idle_wait_ms: 500,
        capture_backoff_ms: 1000,
        frame_interval_ms: 200,
        capture_failure_warn_threshold: 3,
        stats_interval_frames: 10,
        max_line_len: 256,
        max_queued_lines: 4,
    }
}

/// Link with A=30, B=120, 8-byte frames and an always-connected transport
pub fn new_link() -> (MockLink, EventLog) {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let link = LinkLoop::new(
        MockTransport::new(log.clone()),
        MockCamera::new(log.clone(), 8),
        MockBank::new(log.clone()),
        ActuatorState::new(Angle::clamped(30), Angle::clamped(120)),
        test_config(),
    );
    // Start-up positioning is not part of any tick
    log.borrow_mut().clear();
    (link, log)
}

pub fn angles(link: &MockLink) -> (u8, u8) {
    let state = link.actuators();
    (state.angle(ActuatorId::A).degrees(), state.angle(ActuatorId::B).degrees())
}
