use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use derivative::Derivative;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::dispatch::Dispatcher;
use crate::event::Event;
use crate::native::{default_source, CreateFlags, NativeSource, StreamConfig};
use crate::platform;
use crate::watches::WatchSet;
use crate::{Error, Result};

/// Default coalescing window of native sources
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Native changes within this window are delivered together
    pub latency: Duration,

    pub flags: CreateFlags,

    /// Capacity of `events` and `errors` conduits, zero means that each
    /// send waits for a receiver
    pub buffer: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            latency: DEFAULT_LATENCY,
            flags: CreateFlags::FILE_EVENTS | CreateFlags::WATCH_ROOT,
            buffer: 0,
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct State {
    #[derivative(Debug = "ignore")]
    source: Box<dyn NativeSource>,

    /// Configuration last given to the source
    stream: StreamConfig,

    watches: WatchSet,
    started: bool,
    closed: bool,

    /// Dropped on close to unblock pending sends of dispatcher
    done: Option<Sender<()>>,
}

/// Watches paths and reports their changes through [`Watcher::events`]
///
/// Asynchronous failures are reported through [`Watcher::errors`].
/// Both conduits are disconnected after the watcher is closed.
#[derive(Debug)]
pub struct Watcher {
    events: Receiver<Event>,
    errors: Receiver<Error>,
    state: Mutex<State>,

    /// Held during join, so every `close` returns only after dispatch finished
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    /// Create watcher backed by native source of current platform
    pub fn new() -> Result<Self> {
        Watcher::with_config(WatcherConfig::default())
    }

    pub fn with_config(config: WatcherConfig) -> Result<Self> {
        Watcher::from_boxed(default_source(), config)
    }

    /// Create watcher that takes raw events from given source
    pub fn with_source<S: NativeSource + 'static>(source: S, config: WatcherConfig) -> Result<Self> {
        Watcher::from_boxed(Box::new(source), config)
    }

    fn from_boxed(source: Box<dyn NativeSource>, config: WatcherConfig) -> Result<Self> {
        let (events_tx, events_rx) = bounded(config.buffer);
        let (errors_tx, errors_rx) = bounded(config.buffer);
        let (done_tx, done_rx) = bounded(0);

        let dispatch = Dispatcher {
            native: source.events(),
            events: events_tx,
            errors: errors_tx,
            done: done_rx,
            events_rx: events_rx.clone(),
            errors_rx: errors_rx.clone(),
        }
        .spawn()?;

        Ok(Watcher {
            events: events_rx,
            errors: errors_rx,
            state: Mutex::new(State {
                source,
                stream: StreamConfig::new(config.latency, config.flags),
                watches: WatchSet::default(),
                started: false,
                closed: false,
                done: Some(done_tx),
            }),
            dispatch: Mutex::new(Some(dispatch)),
        })
    }

    /// Start watching given path
    ///
    /// Adding a path that is already watched does nothing.
    pub fn add<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let device = platform::device_id(path).map_err(|source| Error::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        if state.watches.contains(path) {
            return Ok(());
        }
        if state.source.device_scoped() {
            if let Some(expected) = state.stream.device {
                if expected != device {
                    return Err(Error::CrossDevice {
                        path: path.to_path_buf(),
                        expected,
                        found: device,
                    });
                }
            }
        }

        let previous = state.stream.clone();
        state.watches.insert(path.to_path_buf());
        state.stream.paths.push(path.to_path_buf());
        state.stream.device.get_or_insert(device);

        if let Err(e) = state.apply() {
            state.watches.remove(path);
            state.stream = previous;
            state.recover();
            return Err(e);
        }
        Ok(())
    }

    /// Stop watching given path
    pub fn remove<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        if !state.watches.remove(path) {
            return Err(Error::NonExistentWatch(path.to_path_buf()));
        }

        state.stream.paths.retain(|p| p != path);
        if state.stream.paths.is_empty() {
            // next path may come from any device
            state.stream.device = None;
        }
        state.apply()
    }

    /// Watched paths in the order they were added
    pub fn watch_list(&self) -> Vec<PathBuf> {
        self.state.lock().watches.paths().to_vec()
    }

    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    pub fn errors(&self) -> &Receiver<Error> {
        &self.errors
    }

    /// Stop watching everything and disconnect both conduits
    ///
    /// Events not yet received are discarded. Calling it again does nothing,
    /// but still waits until the first call completes.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.closed {
                state.closed = true;
                // shutdown goes first, so nothing is delivered while source stops
                state.done = None;
                state.source.stop();
            }
        }

        let mut dispatch = self.dispatch.lock();
        if let Some(handle) = dispatch.take() {
            if handle.join().is_err() {
                warn!("dispatch thread panicked");
            }
            debug!("watcher closed");
        }
        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl State {
    /// Give current stream configuration to the source and (re)start it
    fn apply(&mut self) -> Result<()> {
        self.source.configure(self.stream.clone());
        if self.started {
            self.source.restart()?;
            debug!("native source restarted with {} paths", self.stream.paths.len());
        } else {
            self.source.start()?;
            self.started = true;
            debug!("native source started");
        }
        Ok(())
    }

    /// Bring source back to restored configuration after failed apply
    fn recover(&mut self) {
        self.source.configure(self.stream.clone());
        if self.started {
            if let Err(e) = self.source.restart() {
                warn!("unable to restore previous watches: {}", e);
            }
        }
    }
}
