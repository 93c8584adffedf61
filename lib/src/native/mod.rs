//! Native event sources
//!
//! A native source wraps an OS facility (or a polling loop) and produces batches
//! of [`RawEvent`]s tagged with [`NativeFlags`]. Flag values follow FSEvents
//! constants, other sources map their own masks onto them.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use bitflags::bitflags;
use crossbeam_channel::Receiver;
use log::warn;

#[cfg(target_os = "linux")]
pub use linux::InotifySource;
#[cfg(target_os = "macos")]
pub use macos::FsEventSource;
pub use manual::{ManualHandle, ManualSource, SourceCall};
pub use poll::PollSource;

use crate::platform::DeviceId;
use crate::{Error, Result};

mod coalesce;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
mod manual;
mod poll;

bitflags! {
    /// Flags attached to each raw native event
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NativeFlags: u32 {
        const MUST_SCAN_SUBDIRS = 0x0000_0001;
        const USER_DROPPED = 0x0000_0002;
        const KERNEL_DROPPED = 0x0000_0004;
        const EVENT_IDS_WRAPPED = 0x0000_0008;
        const HISTORY_DONE = 0x0000_0010;
        const ROOT_CHANGED = 0x0000_0020;
        const MOUNT = 0x0000_0040;
        const UNMOUNT = 0x0000_0080;
        const ITEM_CREATED = 0x0000_0100;
        const ITEM_REMOVED = 0x0000_0200;
        const ITEM_INODE_META_MOD = 0x0000_0400;
        const ITEM_RENAMED = 0x0000_0800;
        const ITEM_MODIFIED = 0x0000_1000;
        const ITEM_FINDER_INFO_MOD = 0x0000_2000;
        const ITEM_CHANGE_OWNER = 0x0000_4000;
        const ITEM_XATTR_MOD = 0x0000_8000;
        const ITEM_IS_FILE = 0x0001_0000;
        const ITEM_IS_DIR = 0x0002_0000;
        const ITEM_IS_SYMLINK = 0x0004_0000;
        const OWN_EVENT = 0x0008_0000;
        const ITEM_IS_HARDLINK = 0x0010_0000;
        const ITEM_IS_LAST_HARDLINK = 0x0020_0000;
        const ITEM_CLONED = 0x0040_0000;
    }
}

bitflags! {
    /// Flags used when creating native stream
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        const USE_CF_TYPES = 0x0000_0001;
        const NO_DEFER = 0x0000_0002;
        /// Report removal or rename of watched root itself
        const WATCH_ROOT = 0x0000_0004;
        const IGNORE_SELF = 0x0000_0008;
        /// Report changes per file instead of per containing directory
        const FILE_EVENTS = 0x0000_0010;
    }
}

/// Single change as reported by native source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub flags: NativeFlags,
}

impl RawEvent {
    pub fn new<P: Into<PathBuf>>(path: P, flags: NativeFlags) -> Self {
        RawEvent {
            path: path.into(),
            flags,
        }
    }
}

/// Item sent over native conduit
#[derive(Debug)]
pub enum NativeMessage {
    Batch(Vec<RawEvent>),

    /// Asynchronous failure inside native source
    Error(Error),
}

/// Configuration applied to native source on next start or restart
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub paths: Vec<PathBuf>,

    /// Device of the first watched path, `None` until something is watched
    pub device: Option<DeviceId>,

    /// Window during which native changes are coalesced into one batch
    pub latency: Duration,

    pub flags: CreateFlags,
}

impl StreamConfig {
    pub fn new(latency: Duration, flags: CreateFlags) -> Self {
        StreamConfig {
            paths: vec![],
            device: None,
            latency,
            flags,
        }
    }
}

/// Platform facility that watches paths and reports raw events
///
/// Conduit returned by `events` must be disconnected only after `stop`,
/// so consumer can rely on it to detect shutdown.
pub trait NativeSource: Send {
    fn configure(&mut self, config: StreamConfig);

    /// Start observation with last configuration
    fn start(&mut self) -> Result<()>;

    /// Apply last configuration to running observation
    ///
    /// Empty path set leaves source idle but alive
    fn restart(&mut self) -> Result<()>;

    /// Stop observation for good
    ///
    /// Blocks until internal workers are finished and drops the last sender
    /// of the conduit, so it disconnects once drained
    fn stop(&mut self);

    fn events(&self) -> Receiver<NativeMessage>;

    /// Returns `true` if stream is bound to a single device and can't
    /// observe paths from other devices
    fn device_scoped(&self) -> bool {
        false
    }
}

impl<S: NativeSource + ?Sized> NativeSource for Box<S> {
    fn configure(&mut self, config: StreamConfig) {
        (**self).configure(config)
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn restart(&mut self) -> Result<()> {
        (**self).restart()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn events(&self) -> Receiver<NativeMessage> {
        (**self).events()
    }

    fn device_scoped(&self) -> bool {
        (**self).device_scoped()
    }
}

/// Background thread owned by a native source
#[derive(Debug)]
pub(crate) struct Worker {
    should_stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn named thread, `f` should return soon after the flag is set
    pub fn spawn<F>(name: &str, f: F) -> io::Result<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let should_stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&should_stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || f(&flag))?;

        Ok(Worker {
            should_stop,
            handle,
        })
    }

    /// Ask worker to stop and wait until it finishes
    pub fn shutdown(self) {
        self.should_stop.store(true, Ordering::SeqCst);
        let name = self.handle.thread().name().unwrap_or("native").to_string();
        if self.handle.join().is_err() {
            warn!("{} worker panicked", name);
        }
    }
}

/// Returns native source recommended for current platform
#[cfg(target_os = "linux")]
pub fn default_source() -> Box<dyn NativeSource> {
    Box::new(InotifySource::new())
}

/// Returns native source recommended for current platform
#[cfg(target_os = "macos")]
pub fn default_source() -> Box<dyn NativeSource> {
    Box::new(FsEventSource::new())
}

/// Returns native source recommended for current platform
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn default_source() -> Box<dyn NativeSource> {
    Box::new(PollSource::new())
}
