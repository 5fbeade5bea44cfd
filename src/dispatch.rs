//! Hand-off from the acquisition worker to whichever context consumes readings.
//!
//! The worker owns a [`Dispatcher`]; the consumer owns an [`EventReceiver`]. Both ends
//! share one FIFO channel, so notifications arrive in the order they were produced and
//! carry a gapless sequence number. Consumers that run their own event loop call
//! [`EventReceiver::deliver_pending`] from that loop; the [`Consumer`] callbacks then
//! execute on the consumer's thread, never on the worker's.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::sync::Arc;
use std::time::Duration;

use crate::acquisition::{AcquisitionStats, ConnectionState};
use crate::codec::Sample;
use crate::error::{GaugeError, Result};
use crate::level::IntensityLevel;

#[derive(Debug, Clone, PartialEq)]
/// A decoded sample together with its band.
pub struct Reading {
    pub sample: Sample,
    /// `None` when the table's out-of-range policy left the value unclassified
    pub level: Option<IntensityLevel>,
}

#[derive(Debug, Clone, PartialEq)]
/// Something the worker wants the consumer to know.
pub enum Event {
    Sample(Reading),
    StateChanged {
        state: ConnectionState,
        /// Device path while connected
        port: Option<String>,
    },
    /// A recoverable failure, already handled by the worker
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
/// An [`Event`] tagged with its position in the stream.
pub struct Notification {
    pub seq: u64,
    pub event: Event,
}

/// Callbacks run in the consumer's context.
pub trait Consumer {
    fn on_sample(&mut self, reading: &Reading);

    fn on_state_change(&mut self, _state: ConnectionState, _port: Option<&str>) {}

    fn on_error(&mut self, _message: &str) {}
}

/// Worker side of the boundary. Never blocks.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    tx: Sender<Notification>,
    next_seq: u64,
    max_pending_samples: usize,
    stats: Arc<AcquisitionStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent,
    Dropped,
    /// Every receiver is gone
    Closed,
}

impl Dispatcher {
    /// Queue a sample, unless `max_pending_samples` or more notifications are already queued.
    pub fn sample(&mut self, reading: Reading) -> SendOutcome {
        if self.tx.len() >= self.max_pending_samples {
            self.stats.record_dropped();
            return SendOutcome::Dropped;
        }
        // Count first: a consumer never observes more samples than samples() reports
        self.stats.record_sample();
        self.send(Event::Sample(reading))
    }

    /// Queue a state change. Always enqueued regardless of backlog.
    pub fn state(&mut self, state: ConnectionState, port: Option<String>) -> SendOutcome {
        self.send(Event::StateChanged { state, port })
    }

    /// Queue an error report. Always enqueued regardless of backlog.
    pub fn error(&mut self, message: String) -> SendOutcome {
        self.send(Event::Error(message))
    }

    fn send(&mut self, event: Event) -> SendOutcome {
        let notification = Notification {
            seq: self.next_seq,
            event,
        };
        match self.tx.send(notification) {
            Ok(()) => {
                self.next_seq += 1;
                SendOutcome::Sent
            }
            Err(_) => SendOutcome::Closed,
        }
    }
}

/// Consumer side of the boundary.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<Notification>,
}

impl EventReceiver {
    /// Block until the next notification.
    ///
    /// # Errors
    /// Returns [`GaugeError::ChannelReceive`] once the worker has exited and the queue is drained.
    pub fn recv(&self) -> Result<Notification> {
        Ok(self.rx.recv()?)
    }

    /// - `Ok(Some(n))` if a notification is queued
    /// - `Ok(None)` if nothing is queued
    /// - `Err(GaugeError)` if the worker has exited and the queue is drained
    pub fn try_recv(&self) -> Result<Option<Notification>> {
        match self.rx.try_recv() {
            Ok(n) => Ok(Some(n)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(GaugeError::ThreadComm(
                "Acquisition thread disconnected".to_string(),
            )),
        }
    }

    /// Like [`try_recv`](Self::try_recv) but waits up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Notification>> {
        match self.rx.recv_timeout(timeout) {
            Ok(n) => Ok(Some(n)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(GaugeError::ThreadComm(
                "Acquisition thread disconnected".to_string(),
            )),
        }
    }

    /// Number of notifications waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Hand every queued notification to `consumer`, in order, on the calling thread.
    /// Returns how many were delivered.
    pub fn deliver_pending<C: Consumer + ?Sized>(&self, consumer: &mut C) -> usize {
        let mut delivered = 0;
        while let Ok(notification) = self.rx.try_recv() {
            deliver(consumer, &notification.event);
            delivered += 1;
        }
        delivered
    }
}

impl From<Receiver<Notification>> for EventReceiver {
    fn from(rx: Receiver<Notification>) -> Self {
        EventReceiver { rx }
    }
}

/// Route one event to the matching callback.
pub fn deliver<C: Consumer + ?Sized>(consumer: &mut C, event: &Event) {
    match event {
        Event::Sample(reading) => consumer.on_sample(reading),
        Event::StateChanged { state, port } => consumer.on_state_change(*state, port.as_deref()),
        Event::Error(message) => consumer.on_error(message),
    }
}

pub(crate) fn channel(
    max_pending_samples: usize,
    stats: Arc<AcquisitionStats>,
) -> (Dispatcher, EventReceiver) {
    let (tx, rx) = unbounded();
    (
        Dispatcher {
            tx,
            next_seq: 0,
            max_pending_samples,
            stats,
        },
        EventReceiver { rx },
    )
}
