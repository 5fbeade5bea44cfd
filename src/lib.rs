//! # squeezegauge
//!
//! This crate reads a USB serial force gauge that prints one reading per line, and classifies each
//! reading into named intensity levels.
//! It finds the device among attached serial ports, survives unplug/replug cycles, and delivers
//! readings and connection state to a consumer (UI, logger, ...) through an ordered, thread-safe queue.
//!
//! ```no_run
//! use squeezegauge::{Event, GaugeConfig, GaugeReader};
//!
//! # fn main() -> squeezegauge::Result<()> {
//! let mut reader = GaugeReader::start(GaugeConfig::default())?;
//! while let Ok(notification) = reader.recv() {
//!     if let Event::Sample(reading) = notification.event {
//!         let label = reading.level.map(|l| l.label).unwrap_or_default();
//!         println!("{} {}", reading.sample.value, label);
//!     }
//! }
//! reader.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod level;
pub mod reader;

pub use acquisition::{AcquisitionStats, ConnectionState, Connector, SerialConnector, StopHandle};
pub use codec::{AssembledLine, LineAssembler, Sample, decode_line};
pub use config::{GaugeConfig, MatcherConfig};
pub use discovery::{DeviceMatcher, MatchRule, PortCandidate, PortEnumerator, SystemPorts, discover};
pub use dispatch::{Consumer, Event, EventReceiver, Notification, Reading};
pub use error::{DecodeError, GaugeError, Result};
pub use level::{Classification, IntensityLevel, LevelTable, OutOfRangePolicy};
pub use reader::GaugeReader;
