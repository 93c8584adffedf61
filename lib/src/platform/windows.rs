use std::fs::OpenOptions;
use std::io;
use std::mem::MaybeUninit;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::path::Path;

use windows_sys::Win32::Storage::FileSystem::{
    GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OPEN_REPARSE_POINT,
};

use crate::platform::DeviceId;

/// Returns serial number of volume that contains given path
pub fn device_id<P: AsRef<Path>>(path: P) -> io::Result<DeviceId> {
    // backup semantics are required to open directories,
    // reparse point flag prevents following symlinks
    let file = OpenOptions::new()
        .access_mode(0)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT)
        .open(path.as_ref())?;

    let mut info = MaybeUninit::<BY_HANDLE_FILE_INFORMATION>::uninit();

    // SAFETY: handle is valid while file is alive,
    // info points to memory of required size
    let status = unsafe { GetFileInformationByHandle(file.as_raw_handle() as _, info.as_mut_ptr()) };
    if status == 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: previous call returned success value => info was initialized
    let info = unsafe { info.assume_init() };
    Ok(DeviceId::new(info.dwVolumeSerialNumber as u64))
}
