use std::io;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::native::{NativeMessage, NativeSource, RawEvent, StreamConfig};
use crate::{Error, Result};

/// Call made on [`ManualSource`], recorded in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceCall {
    Configure,
    Start,
    Restart,
    Stop,
}

#[derive(Debug, Default)]
struct Shared {
    tx: Option<Sender<NativeMessage>>,
    config: Option<StreamConfig>,
    calls: Vec<SourceCall>,
    running: bool,
    fail_next: bool,
}

/// Native source that doesn't watch anything by itself
///
/// Events are injected through [`ManualHandle`], which makes it useful
/// for testing consumers and replaying recorded streams.
#[derive(Debug)]
pub struct ManualSource {
    shared: Arc<Mutex<Shared>>,
    rx: Receiver<NativeMessage>,
    device_scoped: bool,
}

/// Controls [`ManualSource`] from outside
#[derive(Clone, Debug)]
pub struct ManualHandle {
    shared: Arc<Mutex<Shared>>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualHandle) {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Mutex::new(Shared {
            tx: Some(tx),
            ..Shared::default()
        }));

        let source = ManualSource {
            shared: Arc::clone(&shared),
            rx,
            device_scoped: false,
        };
        (source, ManualHandle { shared })
    }

    /// Make source report that it is bound to a single device
    pub fn with_device_scope(mut self, device_scoped: bool) -> Self {
        self.device_scoped = device_scoped;
        self
    }

    fn run(&mut self, call: SourceCall) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.calls.push(call);
        if shared.fail_next {
            shared.fail_next = false;
            return Err(Error::Native(io::Error::new(
                io::ErrorKind::Other,
                "injected failure",
            )));
        }
        shared.running = true;
        Ok(())
    }
}

impl NativeSource for ManualSource {
    fn configure(&mut self, config: StreamConfig) {
        let mut shared = self.shared.lock();
        shared.calls.push(SourceCall::Configure);
        shared.config = Some(config);
    }

    fn start(&mut self) -> Result<()> {
        self.run(SourceCall::Start)
    }

    fn restart(&mut self) -> Result<()> {
        self.run(SourceCall::Restart)
    }

    fn stop(&mut self) {
        let mut shared = self.shared.lock();
        shared.calls.push(SourceCall::Stop);
        shared.running = false;
        shared.tx = None;
    }

    fn events(&self) -> Receiver<NativeMessage> {
        self.rx.clone()
    }

    fn device_scoped(&self) -> bool {
        self.device_scoped
    }
}

impl ManualHandle {
    /// Deliver batch of raw events as if native source reported it
    ///
    /// Returns `false` if source was already stopped
    pub fn send_batch(&self, batch: Vec<RawEvent>) -> bool {
        self.send(NativeMessage::Batch(batch))
    }

    /// Deliver asynchronous error as if native source failed
    ///
    /// Returns `false` if source was already stopped
    pub fn send_error(&self, error: Error) -> bool {
        self.send(NativeMessage::Error(error))
    }

    fn send(&self, message: NativeMessage) -> bool {
        match &self.shared.lock().tx {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Make next start or restart fail
    pub fn fail_next(&self) {
        self.shared.lock().fail_next = true;
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.shared.lock().calls.clone()
    }

    /// Last configuration given to the source
    pub fn config(&self) -> Option<StreamConfig> {
        self.shared.lock().config.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock().tx.is_none()
    }
}
