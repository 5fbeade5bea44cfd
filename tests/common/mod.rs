//! Scripted stand-ins for the serial port list and serial links.

#![allow(dead_code)]

use squeezegauge::{
    Connector, GaugeConfig, GaugeError, GaugeReader, Notification, PortCandidate, PortEnumerator,
};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

pub const GAUGE_PATH: &str = "/dev/ttyACM0";

/// Port list that contains the gauge only while `present` is set.
#[derive(Clone)]
pub struct ScriptedPorts {
    pub present: Arc<AtomicBool>,
}

impl ScriptedPorts {
    pub fn new(present: bool) -> Self {
        ScriptedPorts {
            present: Arc::new(AtomicBool::new(present)),
        }
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }
}

impl PortEnumerator for ScriptedPorts {
    fn candidates(&self) -> squeezegauge::Result<Vec<PortCandidate>> {
        let mut ports = vec![PortCandidate::new("/dev/ttyS0")];
        if self.present.load(Ordering::SeqCst) {
            ports.push(
                PortCandidate::new(GAUGE_PATH)
                    .with_manufacturer("MicroPython")
                    .with_description("Board in FS mode"),
            );
        }
        Ok(ports)
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

pub fn data(text: &str) -> Step {
    Step::Data(text.as_bytes().to_vec())
}

/// What a single `open` call should do.
#[derive(Debug, Clone)]
pub enum Session {
    Refuse,
    Steps(Vec<Step>),
}

/// Hands out one scripted session per `open` call and counts opens and closes.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    sessions: Arc<Mutex<VecDeque<Session>>>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(sessions: Vec<Session>) -> Self {
        ScriptedConnector {
            sessions: Arc::new(Mutex::new(sessions.into())),
            ..Default::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Link = ScriptedLink;

    fn open(&self, candidate: &PortCandidate) -> squeezegauge::Result<ScriptedLink> {
        let session = self.sessions.lock().unwrap().pop_front();
        match session {
            Some(Session::Steps(steps)) => {
                self.opens.fetch_add(1, Ordering::SeqCst);
                Ok(ScriptedLink {
                    steps: steps.into(),
                    closes: Arc::clone(&self.closes),
                })
            }
            Some(Session::Refuse) | None => Err(GaugeError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is busy", candidate.path),
            ))),
        }
    }
}

/// Plays back its steps, then behaves like an idle port that times out.
pub struct ScriptedLink {
    steps: VecDeque<Step>,
    closes: Arc<AtomicUsize>,
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Step::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Step::Data(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
            None => {
                thread::sleep(Duration::from_millis(5));
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
        }
    }
}

impl Drop for ScriptedLink {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn fast_config() -> GaugeConfig {
    GaugeConfig {
        read_timeout_ms: 5,
        discovery_interval_ms: 20,
        idle_yield_ms: 1,
        ..GaugeConfig::default()
    }
}

/// Collect notifications until `done` returns true or `timeout` elapses.
pub fn collect_until(
    reader: &GaugeReader,
    timeout: Duration,
    mut done: impl FnMut(&[Notification]) -> bool,
) -> Vec<Notification> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while Instant::now() < deadline && !done(&seen) {
        if let Ok(Some(n)) = reader.recv_timeout(Duration::from_millis(10)) {
            seen.push(n);
        }
    }
    seen
}

/// Drain everything still queued after the worker has stopped.
pub fn drain(reader: &GaugeReader) -> Vec<Notification> {
    let mut rest = Vec::new();
    while let Ok(Some(n)) = reader.try_recv() {
        rest.push(n);
    }
    rest
}
