use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver as EventReceiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use derivative::Derivative;
use fsevent::FsEvent;
use log::{debug, trace};

use crate::native::coalesce::Coalescer;
use crate::native::{
    CreateFlags, NativeFlags, NativeMessage, NativeSource, RawEvent, StreamConfig, Worker,
};
use crate::watcher::DEFAULT_LATENCY;
use crate::{Error, Result};

/// Max time forwarder waits before checking whether it should stop
const READ_INTERVAL: Duration = Duration::from_millis(10);

/// Native source backed by FSEvents
///
/// Stream itself is not bound to a device, so paths from different
/// volumes can be watched together.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FsEventSource {
    config: StreamConfig,
    tx: Option<Sender<NativeMessage>>,
    rx: Receiver<NativeMessage>,
    #[derivative(Debug = "ignore")]
    fsevent: Option<FsEvent>,
    forwarder: Option<Worker>,
}

// SAFETY: FsEvent holds reference to run loop of its observer thread and
// only uses it to stop that loop, which is allowed from any thread
unsafe impl Send for FsEventSource {}

impl FsEventSource {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        FsEventSource {
            config: StreamConfig::new(DEFAULT_LATENCY, CreateFlags::empty()),
            tx: Some(tx),
            rx,
            fsevent: None,
            forwarder: None,
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut fsevent) = self.fsevent.take() {
            fsevent.shutdown_observe();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.shutdown();
        }
    }

    fn respawn(&mut self) -> Result<()> {
        self.shutdown();
        let tx = match &self.tx {
            Some(tx) if !self.config.paths.is_empty() => tx.clone(),
            _ => return Ok(()),
        };

        let paths = self
            .config
            .paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let mut fsevent = FsEvent::new(paths);
        fsevent.observe_async(event_tx).map_err(|e| {
            Error::Native(io::Error::new(io::ErrorKind::Other, format!("{:?}", e)))
        })?;
        self.fsevent = Some(fsevent);
        debug!("fsevents stream started for {} paths", self.config.paths.len());

        let config = self.config.clone();
        self.forwarder = Some(Worker::spawn("fswatch-fsevent", move |should_stop| {
            forward_events(event_rx, &config, &tx, should_stop)
        })?);
        Ok(())
    }
}

impl Default for FsEventSource {
    fn default() -> Self {
        FsEventSource::new()
    }
}

impl NativeSource for FsEventSource {
    fn configure(&mut self, config: StreamConfig) {
        self.config = config;
    }

    fn start(&mut self) -> Result<()> {
        self.respawn()
    }

    fn restart(&mut self) -> Result<()> {
        self.respawn()
    }

    fn stop(&mut self) {
        self.shutdown();
        self.tx = None;
    }

    fn events(&self) -> Receiver<NativeMessage> {
        self.rx.clone()
    }
}

fn forward_events(
    event_rx: EventReceiver<fsevent::Event>,
    config: &StreamConfig,
    tx: &Sender<NativeMessage>,
    should_stop: &AtomicBool,
) {
    let file_events = config.flags.contains(CreateFlags::FILE_EVENTS);
    let mut coalescer = Coalescer::new(config.latency);

    while !should_stop.load(Ordering::SeqCst) {
        let timeout = coalescer.timeout(Instant::now(), READ_INTERVAL);
        match event_rx.recv_timeout(timeout.min(READ_INTERVAL)) {
            Ok(event) => {
                // both use FSEvents constants, so bits are the same
                let flags = NativeFlags::from_bits_truncate(event.flag.bits());
                let mut path = PathBuf::from(event.path);
                if !file_events && flags.contains(NativeFlags::ITEM_IS_FILE) {
                    path.pop();
                }
                coalescer.push(RawEvent::new(path, flags), Instant::now());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(batch) = coalescer.flush_due(Instant::now()) {
            trace!("fsevents batch of {} events", batch.len());
            if tx.send(NativeMessage::Batch(batch)).is_err() {
                return;
            }
        }
    }

    if let Some(batch) = coalescer.flush() {
        let _ = tx.send(NativeMessage::Batch(batch));
    }
}
