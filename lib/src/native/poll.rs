use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};

use crate::native::{
    CreateFlags, NativeFlags, NativeMessage, NativeSource, RawEvent, StreamConfig, Worker,
};
use crate::watcher::DEFAULT_LATENCY;
use crate::Result;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// How often sleeping worker checks whether it should stop
const STOP_CHECK: Duration = Duration::from_millis(10);

/// Native source that periodically compares snapshots of watched paths
///
/// Works everywhere, but only sees the state at the time of each scan:
/// short-lived files are missed and renames show up as remove + create.
/// Directories are scanned one level deep.
#[derive(Debug)]
pub struct PollSource {
    config: StreamConfig,
    tx: Option<Sender<NativeMessage>>,
    rx: Receiver<NativeMessage>,
    worker: Option<Worker>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EntryState {
    modified: Option<SystemTime>,
    len: u64,
    mode: u32,
    is_dir: bool,
}

type Snapshot = BTreeMap<PathBuf, EntryState>;

impl PollSource {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        PollSource {
            config: StreamConfig::new(DEFAULT_LATENCY, CreateFlags::empty()),
            tx: Some(tx),
            rx,
            worker: None,
        }
    }

    fn respawn(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        let tx = match &self.tx {
            Some(tx) if !self.config.paths.is_empty() => tx.clone(),
            _ => return Ok(()),
        };

        let config = self.config.clone();
        let interval = config.latency.max(MIN_INTERVAL);
        debug!("polling {} paths every {:?}", config.paths.len(), interval);

        // baseline is taken before returning so changes made right after
        // start are not lost
        let mut snapshot = take_snapshot(&config.paths, &Snapshot::new());
        self.worker = Some(Worker::spawn("fswatch-poll", move |should_stop| {
            while sleep_unless_stopped(should_stop, interval) {
                let current = take_snapshot(&config.paths, &snapshot);
                let batch = diff(&snapshot, &current, &config);
                snapshot = current;
                if batch.is_empty() {
                    continue;
                }
                trace!("poll found {} changes", batch.len());
                if tx.send(NativeMessage::Batch(batch)).is_err() {
                    break;
                }
            }
        })?);
        Ok(())
    }
}

impl Default for PollSource {
    fn default() -> Self {
        PollSource::new()
    }
}

impl NativeSource for PollSource {
    fn configure(&mut self, config: StreamConfig) {
        self.config = config;
    }

    fn start(&mut self) -> Result<()> {
        self.respawn()
    }

    fn restart(&mut self) -> Result<()> {
        self.respawn()
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.tx = None;
    }

    fn events(&self) -> Receiver<NativeMessage> {
        self.rx.clone()
    }
}

/// Returns `false` if stop was requested before `duration` elapsed
fn sleep_unless_stopped(should_stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if should_stop.load(Ordering::SeqCst) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(STOP_CHECK));
    }
}

impl EntryState {
    fn new(metadata: &Metadata) -> Self {
        EntryState {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            mode: mode(metadata),
            is_dir: metadata.is_dir(),
        }
    }

    fn kind(&self) -> NativeFlags {
        if self.is_dir {
            NativeFlags::ITEM_IS_DIR
        } else {
            NativeFlags::ITEM_IS_FILE
        }
    }
}

#[cfg(unix)]
fn mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode(metadata: &Metadata) -> u32 {
    metadata.permissions().readonly() as u32
}

/// Collect state of watched paths and their direct children
///
/// If a watched directory can't be listed, its children from `previous`
/// are kept, so a transient failure doesn't look like mass removal.
fn take_snapshot(roots: &[PathBuf], previous: &Snapshot) -> Snapshot {
    snapshot_with(roots, previous, list_children)
}

fn snapshot_with<F>(roots: &[PathBuf], previous: &Snapshot, list: F) -> Snapshot
where
    F: Fn(&Path) -> io::Result<Vec<(PathBuf, EntryState)>>,
{
    let mut snapshot = Snapshot::new();
    for root in roots {
        let metadata = match std::fs::symlink_metadata(root) {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        snapshot.insert(root.clone(), EntryState::new(&metadata));
        if !metadata.is_dir() {
            continue;
        }

        match list(root) {
            Ok(children) => snapshot.extend(children),
            Err(e) => {
                trace!("unable to list {:?}: {}", root, e);
                let kept = previous
                    .iter()
                    .filter(|(path, _)| path.parent() == Some(root.as_path()));
                snapshot.extend(kept.map(|(path, state)| (path.clone(), *state)));
            }
        }
    }
    snapshot
}

/// Direct children of `dir`, entries that fail to read are skipped
fn list_children(dir: &Path) -> io::Result<Vec<(PathBuf, EntryState)>> {
    let children = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        // entry might be already removed
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            Some((entry.path(), EntryState::new(&metadata)))
        })
        .collect();
    Ok(children)
}

/// Build raw events that turn `old` snapshot into `new` one
fn diff(old: &Snapshot, new: &Snapshot, config: &StreamConfig) -> Vec<RawEvent> {
    let file_events = config.flags.contains(CreateFlags::FILE_EVENTS);
    let watch_root = config.flags.contains(CreateFlags::WATCH_ROOT);
    let is_root = |path: &Path| config.paths.iter().any(|p| p == path);

    let paths: BTreeSet<_> = old.keys().chain(new.keys()).collect();
    let mut events: Vec<RawEvent> = vec![];

    for path in paths {
        let flags = match (old.get(path), new.get(path)) {
            (None, Some(state)) => NativeFlags::ITEM_CREATED | state.kind(),
            (Some(state), None) => NativeFlags::ITEM_REMOVED | state.kind(),
            (Some(before), Some(after)) => {
                let mut flags = NativeFlags::empty();
                if before.is_dir != after.is_dir {
                    flags |= NativeFlags::ITEM_REMOVED | NativeFlags::ITEM_CREATED;
                } else if !after.is_dir
                    && (before.modified != after.modified || before.len != after.len)
                {
                    flags |= NativeFlags::ITEM_MODIFIED;
                }
                if before.mode != after.mode {
                    flags |= NativeFlags::ITEM_INODE_META_MOD;
                }
                if flags.is_empty() {
                    continue;
                }
                flags | after.kind()
            }
            (None, None) => continue,
        };

        let root = is_root(path);
        if root
            && !watch_root
            && flags.intersects(NativeFlags::ITEM_CREATED | NativeFlags::ITEM_REMOVED)
        {
            continue;
        }

        // without file events changes are reported on directory level
        let reported = match path.parent() {
            Some(parent) if !file_events && !root => parent.to_path_buf(),
            _ => path.clone(),
        };
        match events.last_mut() {
            Some(last) if last.path == reported => last.flags |= flags,
            _ => events.push(RawEvent::new(reported, flags)),
        }
    }

    events
}
