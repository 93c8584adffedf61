use std::io;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use log::{debug, trace};

use crate::event::Event;
use crate::native::NativeMessage;
use crate::normalize::{is_overflow, normalize};
use crate::Error;

/// Moves raw native events to public conduits
///
/// Runs until native conduit is disconnected, which happens only after the
/// native source is stopped. Public senders are dropped when it finishes.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    pub native: Receiver<NativeMessage>,
    pub events: Sender<Event>,
    pub errors: Sender<Error>,

    /// Disconnected when watcher is closed
    pub done: Receiver<()>,

    /// Own ends of public conduits, used to discard leftovers on exit
    pub events_rx: Receiver<Event>,
    pub errors_rx: Receiver<Error>,
}

impl Dispatcher {
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("fswatch-dispatch".to_string())
            .spawn(move || self.run())
    }

    fn run(self) {
        // set once shutdown is observed, native conduit is still drained
        let mut closed = false;

        for message in self.native.iter() {
            if closed {
                continue;
            }
            match message {
                NativeMessage::Batch(batch) => {
                    trace!("dispatching batch of {} raw events", batch.len());
                    for raw in &batch {
                        if is_overflow(raw.flags)
                            && !self.deliver(&self.errors, Error::EventOverflow)
                        {
                            closed = true;
                            break;
                        }
                        if let Some(event) = normalize(raw) {
                            if !self.deliver(&self.events, event) {
                                closed = true;
                                break;
                            }
                        }
                    }
                }
                NativeMessage::Error(error) => {
                    closed = !self.deliver(&self.errors, error);
                }
            }
        }

        let mut discarded = 0;
        while self.events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        while self.errors_rx.try_recv().is_ok() {
            discarded += 1;
        }
        debug!("dispatch finished, {} undelivered items discarded", discarded);
    }

    fn is_done(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Returns `false` if item was dropped because watcher is closed
    fn deliver<T>(&self, tx: &Sender<T>, item: T) -> bool {
        // select picks randomly among ready operations, so shutdown
        // has to be checked before the send becomes a candidate
        if self.is_done() {
            return false;
        }
        select! {
            send(tx, item) -> res => res.is_ok(),
            recv(self.done) -> _ => false,
        }
    }
}
