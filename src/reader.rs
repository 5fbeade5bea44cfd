//! [`GaugeReader`]: owns the acquisition thread and the consumer end of its queue.

use crossbeam_channel::never;
use log::{error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::acquisition::{
    Acquisition, AcquisitionStats, ConnectionState, Connector, SerialConnector, Shared, StateCell,
    StopHandle,
};
use crate::config::GaugeConfig;
use crate::discovery::{PortEnumerator, SystemPorts};
use crate::dispatch::{self, Consumer, EventReceiver, Notification};
use crate::error::{GaugeError, Result};

/// Threaded reader for the gauge.
///
/// This struct spawns a background thread that finds the device, reads and classifies
/// samples, and reconnects on its own after unplugs. Everything it observes arrives
/// through [`recv`](Self::recv), [`try_recv`](Self::try_recv) or
/// [`deliver_pending`](Self::deliver_pending), in production order.
pub struct GaugeReader {
    events: EventReceiver,
    stop_handle: StopHandle,
    state: Arc<StateCell>,
    stats: Arc<AcquisitionStats>,
    worker: Option<JoinHandle<()>>,
}

impl GaugeReader {
    /// Start reading from whichever attached serial port matches `config.matcher`.
    ///
    /// Succeeds even when the device is not plugged in yet; the worker keeps looking.
    ///
    /// # Errors
    /// Returns [`GaugeError`] if the configuration is invalid or the thread cannot be spawned.
    pub fn start(config: GaugeConfig) -> Result<Self> {
        let connector = SerialConnector::from_config(&config);
        Self::with_backends(config, SystemPorts, connector)
    }

    /// Start with a custom port source and connector.
    pub fn with_backends<E: PortEnumerator, C: Connector>(
        config: GaugeConfig,
        enumerator: E,
        connector: C,
    ) -> Result<Self> {
        config.validate()?;
        let levels = config.level_table()?;

        let stop_handle = StopHandle::new();
        let state = Arc::new(StateCell::new(ConnectionState::Disconnected));
        let stats = Arc::new(AcquisitionStats::default());
        let (dispatcher, events) = dispatch::channel(config.max_pending_samples, Arc::clone(&stats));

        let acquisition = Acquisition::new(
            &config,
            levels,
            enumerator,
            connector,
            dispatcher,
            Shared {
                stop: stop_handle.clone(),
                state: Arc::clone(&state),
                stats: Arc::clone(&stats),
            },
        );

        let worker = thread::Builder::new()
            .name("gauge-acquisition".to_string())
            .spawn(move || acquisition.run())?;

        Ok(GaugeReader {
            events,
            stop_handle,
            state,
            stats,
            worker: Some(worker),
        })
    }

    /// Receive the next notification, blocking until available.
    ///
    /// # Errors
    /// Returns [`GaugeError`] once the worker has exited and the queue is drained.
    pub fn recv(&self) -> Result<Notification> {
        self.events.recv()
    }

    /// Try to receive a notification without blocking.
    ///
    /// # Returns
    /// - `Ok(Some(notification))` if one is queued
    /// - `Ok(None)` if nothing is queued
    /// - `Err(GaugeError)` if the worker has exited and the queue is drained
    pub fn try_recv(&self) -> Result<Option<Notification>> {
        self.events.try_recv()
    }

    /// Wait up to `timeout` for a notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Notification>> {
        self.events.recv_timeout(timeout)
    }

    /// Run `consumer`'s callbacks for everything queued, on the calling thread.
    pub fn deliver_pending<C: Consumer + ?Sized>(&self, consumer: &mut C) -> usize {
        self.events.deliver_pending(consumer)
    }

    /// Most recent connection state published by the worker.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Samples discarded because notifications were not consumed fast enough.
    pub fn dropped_count(&self) -> u64 {
        self.stats.dropped()
    }

    /// A cloneable handle that can request a stop from another thread (e.g. a signal handler).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Give up ownership of the worker, keeping only its queue and a stop handle.
    ///
    /// The thread is no longer joined on drop. It stops on [`StopHandle::request`], or
    /// by itself once the returned receiver is dropped and it next has something to report.
    pub fn detach(mut self) -> (EventReceiver, StopHandle) {
        let events = std::mem::replace(&mut self.events, EventReceiver::from(never()));
        // Dropping the handle detaches the thread
        self.worker.take();
        (events, self.stop_handle.clone())
    }

    /// Stop the background thread and close the serial port.
    ///
    /// Notifications produced before the stop, including the final
    /// [`ConnectionState::Disconnected`], stay queued.
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping gauge reader...");
        self.stop_handle.request();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                return Err(GaugeError::ThreadComm(
                    "Acquisition thread panicked".to_string(),
                ));
            }
        }
        info!("Gauge reader stopped.");
        Ok(())
    }
}

impl Drop for GaugeReader {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                error!("Error stopping acquisition thread during drop: {:?}", e);
            }
        }
    }
}
