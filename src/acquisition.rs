//! The acquisition worker: discover the gauge, hold the connection, read and classify
//! lines, and reconnect whenever the transport goes away.
//!
//! ```text
//!  Disconnected ──start──▶ Discovering ◀──────────────┐
//!                           │  ▲  no match / open failed: wait, retry
//!                           │  └──┘                     │
//!                           ▼                           │
//!                        Connected ──transport lost──▶ Reconnecting
//!                           │
//!                 any state │ stop requested
//!                           ▼
//!                      Disconnected
//! ```
//!
//! No I/O error ends the worker. It only exits when a stop is requested or every
//! event receiver has been dropped.

use chrono::Local;
use log::{debug, error, info, warn};
use serialport::{ClearBuffer, SerialPort};
use std::fmt;
use std::io::{self, Read};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use crate::codec::{AssembledLine, LineAssembler, Sample};
use crate::config::GaugeConfig;
use crate::discovery::{DeviceMatcher, PortCandidate, PortEnumerator, discover};
use crate::dispatch::{Dispatcher, Reading, SendOutcome};
use crate::error::{DecodeError, Result};
use crate::level::LevelTable;

const READ_CHUNK_SIZE: usize = 256;

/// Longest single sleep while waiting, so a stop request is seen promptly.
const STOP_POLL_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Connection lifecycle as seen by consumers.
pub enum ConnectionState {
    Disconnected,
    Discovering,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Discovering => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Discovering,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Discovering => "Searching for device",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Connection lost, reconnecting",
        };
        f.write_str(text)
    }
}

/// Latest state, written by the worker and read from anywhere.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        StateCell(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Cooperative stop flag shared between the worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop. Takes effect at the next iteration boundary.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for up to `duration`, returning early (with `true`) if a stop is requested.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(STOP_POLL_SLICE));
        }
    }
}

/// Counters maintained by the worker.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    samples: AtomicU64,
    malformed: AtomicU64,
    dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl AcquisitionStats {
    /// Samples handed to the consumer queue
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Lines that failed to decode, including overlong ones
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Samples discarded because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Connections lost after being established
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub(crate) fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
}

/// Opens a byte stream to a discovered port.
///
/// The returned link is owned by the worker alone and closed by dropping it.
pub trait Connector: Send + 'static {
    type Link: Read + Send;

    fn open(&self, candidate: &PortCandidate) -> Result<Self::Link>;
}

/// Opens real serial ports through `serialport`.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        SerialConnector {
            baud_rate,
            read_timeout,
        }
    }

    pub fn from_config(config: &GaugeConfig) -> Self {
        Self::new(config.baud_rate, config.read_timeout())
    }
}

impl Connector for SerialConnector {
    type Link = Box<dyn SerialPort>;

    fn open(&self, candidate: &PortCandidate) -> Result<Self::Link> {
        info!("Opening serial port: {} at {} baud", candidate.path, self.baud_rate);
        let mut port = serialport::new(&candidate.path, self.baud_rate)
            .timeout(self.read_timeout)
            .open()?;
        // Some CDC stacks hold output until DTR is raised
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!("Could not raise DTR on {}: {}", candidate.path, e);
        }
        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!("Could not clear input buffer on {}: {}", candidate.path, e);
        }
        info!("Serial port opened successfully.");
        Ok(port)
    }
}

#[derive(Debug)]
enum LinkOutcome {
    Stopped,
    Lost(io::Error),
}

/// Read errors that just mean "no data yet".
fn is_idle(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// The worker. Consumed by [`Acquisition::run`] on its own thread.
pub(crate) struct Acquisition<E: PortEnumerator, C: Connector> {
    enumerator: E,
    connector: C,
    matcher: DeviceMatcher,
    levels: LevelTable,
    discovery_interval: Duration,
    idle_yield: Duration,
    max_line_len: usize,
    dispatcher: Dispatcher,
    stop: StopHandle,
    state: Arc<StateCell>,
    stats: Arc<AcquisitionStats>,
}

pub(crate) struct Shared {
    pub stop: StopHandle,
    pub state: Arc<StateCell>,
    pub stats: Arc<AcquisitionStats>,
}

impl<E: PortEnumerator, C: Connector> Acquisition<E, C> {
    pub fn new(
        config: &GaugeConfig,
        levels: LevelTable,
        enumerator: E,
        connector: C,
        dispatcher: Dispatcher,
        shared: Shared,
    ) -> Self {
        Acquisition {
            enumerator,
            connector,
            matcher: DeviceMatcher::from_config(&config.matcher),
            levels,
            discovery_interval: config.discovery_interval(),
            idle_yield: config.idle_yield(),
            max_line_len: config.max_line_len,
            dispatcher,
            stop: shared.stop,
            state: shared.state,
            stats: shared.stats,
        }
    }

    pub fn run(mut self) {
        info!("Acquisition thread started.");

        while !self.stop.is_requested() {
            self.set_state(ConnectionState::Discovering, None);
            let Some(candidate) = self.wait_for_device() else {
                break;
            };

            let link = match self.connector.open(&candidate) {
                Ok(link) => link,
                Err(e) => {
                    warn!("Failed to open {}: {}", candidate.path, e);
                    self.report_error(format!("Failed to open {}: {}", candidate.path, e));
                    self.stop.wait(self.discovery_interval);
                    continue;
                }
            };

            info!("Connected to {}", candidate.path);
            self.set_state(ConnectionState::Connected, Some(candidate.path.clone()));

            match self.read_link(link) {
                LinkOutcome::Stopped => break,
                LinkOutcome::Lost(e) => {
                    warn!("Lost connection to {}: {}", candidate.path, e);
                    self.stats.record_reconnect();
                    self.set_state(ConnectionState::Reconnecting, None);
                    self.report_error(format!("Lost connection to {}: {}", candidate.path, e));
                }
            }
        }

        // Always announced, even if stopped before the first transition
        self.state.set(ConnectionState::Disconnected);
        let _ = self.dispatcher.state(ConnectionState::Disconnected, None);
        info!("Acquisition thread finished.");
    }

    /// Poll discovery at a fixed interval until a port matches or a stop is requested.
    fn wait_for_device(&mut self) -> Option<PortCandidate> {
        loop {
            if self.stop.is_requested() {
                return None;
            }
            if let Some(candidate) = discover(&self.enumerator, &self.matcher) {
                return Some(candidate);
            }
            debug!("Device not found, retrying in {:?}", self.discovery_interval);
            if self.stop.wait(self.discovery_interval) {
                return None;
            }
        }
    }

    /// Steady-state read cycle. The link is dropped, and so closed, on return.
    fn read_link(&mut self, mut link: C::Link) -> LinkOutcome {
        let mut assembler = LineAssembler::new(self.max_line_len);
        let mut buf = [0u8; READ_CHUNK_SIZE];

        loop {
            if self.stop.is_requested() {
                return LinkOutcome::Stopped;
            }
            match link.read(&mut buf) {
                Ok(0) => {
                    self.stop.wait(self.idle_yield);
                }
                Ok(n) => {
                    for line in assembler.push(&buf[..n]) {
                        self.handle_line(line);
                    }
                }
                Err(e) if is_idle(&e) => {
                    self.stop.wait(self.idle_yield);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return LinkOutcome::Lost(e),
            }
        }
    }

    fn handle_line(&mut self, line: AssembledLine) {
        match line {
            AssembledLine::Line(text) => match Sample::decode(&text, Local::now()) {
                Ok(sample) => {
                    let level = self.levels.get(self.levels.classify(sample.value)).cloned();
                    let outcome = self.dispatcher.sample(Reading { sample, level });
                    self.check_outcome(outcome);
                }
                Err(DecodeError::Empty) => {
                    self.stats.record_malformed();
                    debug!("Ignoring blank line");
                }
                Err(e) => {
                    self.stats.record_malformed();
                    warn!("Invalid data: {}", e);
                }
            },
            AssembledLine::Overflow(len) => {
                self.stats.record_malformed();
                warn!("Discarded {} byte line longer than {} bytes", len, self.max_line_len);
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState, port: Option<String>) {
        if self.state.get() == state && port.is_none() {
            return;
        }
        debug!("Connection state -> {:?}", state);
        self.state.set(state);
        let outcome = self.dispatcher.state(state, port);
        self.check_outcome(outcome);
    }

    fn report_error(&mut self, message: String) {
        let outcome = self.dispatcher.error(message);
        self.check_outcome(outcome);
    }

    fn check_outcome(&self, outcome: SendOutcome) {
        if outcome == SendOutcome::Closed && !self.stop.is_requested() {
            error!("Event receiver dropped. Stopping acquisition thread.");
            self.stop.request();
        }
    }
}
