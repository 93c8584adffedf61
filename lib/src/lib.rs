#![warn(rust_2018_idioms, missing_debug_implementations)]

//! Filesystem change notifications with a portable event model
//!
//! [`Watcher`] takes batches of raw events from a [`NativeSource`]
//! (inotify, FSEvents or polling), turns them into portable [`Event`]s
//! and delivers them through a channel.

pub use error::{Error, Result};
pub use event::{Event, Op};
#[cfg(target_os = "linux")]
pub use native::InotifySource;
#[cfg(target_os = "macos")]
pub use native::FsEventSource;
pub use native::{
    default_source, CreateFlags, ManualHandle, ManualSource, NativeFlags, NativeMessage,
    NativeSource, PollSource, RawEvent, SourceCall, StreamConfig,
};
pub use normalize::normalize;
pub use platform::{device_id, DeviceId};
pub use watcher::{Watcher, WatcherConfig, DEFAULT_LATENCY};

mod dispatch;
mod error;
mod event;
mod native;
mod normalize;
mod platform;
mod watcher;
mod watches;
