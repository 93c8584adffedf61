use std::io;
use std::path::Path;

use crate::platform::DeviceId;

/// Returns id of device that contains given path
///
/// Symlinks are not followed, so for a link device of the link itself is returned
pub fn device_id<P: AsRef<Path>>(path: P) -> io::Result<DeviceId> {
    let stat = nix::sys::stat::lstat(path.as_ref())?;

    // dev_t is signed on macos and unsigned on linux
    #[allow(clippy::useless_conversion, clippy::unnecessary_cast)]
    Ok(DeviceId::new(stat.st_dev as u64))
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use crate::platform::device_id;

    #[test]
    fn same_device_for_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("b"), b"b").unwrap();

        let a = device_id(dir.path().join("a")).unwrap();
        let b = device_id(dir.path().join("b")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, device_id(dir.path()).unwrap());
    }

    #[test]
    fn missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = device_id(dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
