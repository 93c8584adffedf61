use std::path::{Path, PathBuf};

/// Ordered set of watched paths
///
/// Paths are compared as given, no canonicalization is done.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchSet {
    paths: Vec<PathBuf>,
}

impl WatchSet {
    /// Adds path to the end of the set
    ///
    /// Returns `false` if path is already present
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.paths.push(path);
        true
    }

    /// Returns `false` if path was not present
    pub fn remove(&mut self, path: &Path) -> bool {
        match self.paths.iter().position(|p| p == path) {
            Some(pos) => {
                self.paths.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Paths in insertion order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}
