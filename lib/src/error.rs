use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::platform::DeviceId;

#[derive(Debug, Error)]
pub enum Error {
    /// Path given to `Watcher::add` doesn't exist or can't be accessed
    #[error("unable to resolve {path:?}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path lives on another device than the one the native stream is bound to
    #[error("{path:?} is on device {found} but the stream is bound to device {expected}")]
    CrossDevice {
        path: PathBuf,
        expected: DeviceId,
        found: DeviceId,
    },

    /// Attempted to remove a path that is not watched
    #[error("can't remove non-existent watch: {0:?}")]
    NonExistentWatch(PathBuf),

    /// Watcher was already closed
    #[error("watcher already closed")]
    Closed,

    /// Native queue overflowed and some events were lost
    #[error("event queue overflow")]
    EventOverflow,

    /// Native watch limit was reached (`max_user_watches` for inotify)
    #[error("limit of native watches reached")]
    WatchLimitReached,

    #[error("native event source failed: {0}")]
    Native(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
