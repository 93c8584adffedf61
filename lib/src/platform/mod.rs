use std::fmt::{Display, Formatter};

#[cfg(unix)]
pub use unix::*;
#[cfg(windows)]
pub use windows::*;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

/// Opaque identifier of the storage volume that contains a path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    pub fn new(id: u64) -> Self {
        DeviceId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Returns id of device that contains given path
///
/// On platforms without a notion of device id only checks that path exists
#[cfg(not(any(unix, windows)))]
pub fn device_id<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<DeviceId> {
    std::fs::symlink_metadata(path.as_ref())?;
    Ok(DeviceId(0))
}
