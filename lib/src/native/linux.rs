use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use log::{debug, trace};
use nix::libc::ENOSPC;

use crate::native::coalesce::Coalescer;
use crate::native::{
    CreateFlags, NativeFlags, NativeMessage, NativeSource, RawEvent, StreamConfig, Worker,
};
use crate::watcher::DEFAULT_LATENCY;
use crate::{Error, Result};

const BUFFER_LEN: usize = 64 * 1024;

/// Max time between two reads of inotify queue
const READ_INTERVAL: Duration = Duration::from_millis(10);

/// Native source backed by inotify
///
/// Each watched path gets its own inotify watch, so only direct children
/// of watched directories are reported.
#[derive(Debug)]
pub struct InotifySource {
    config: StreamConfig,
    tx: Option<Sender<NativeMessage>>,
    rx: Receiver<NativeMessage>,
    worker: Option<Worker>,
}

impl InotifySource {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        InotifySource {
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

        let mut inotify = Inotify::init()?;
        let mask = watch_mask(self.config.flags);
        let mut map = HashMap::new();
        for path in &self.config.paths {
            let wd = inotify.add_watch(path, mask).map_err(|e| {
                if e.raw_os_error() == Some(ENOSPC) {
                    Error::WatchLimitReached
                } else {
                    Error::Native(e)
                }
            })?;
            map.insert(wd, path.clone());
        }
        debug!("inotify watches {} paths", map.len());

        let config = self.config.clone();
        self.worker = Some(Worker::spawn("fswatch-inotify", move |should_stop| {
            read_events(inotify, map, &config, &tx, should_stop)
        })?);
        Ok(())
    }
}

impl Default for InotifySource {
    fn default() -> Self {
        InotifySource::new()
    }
}

impl NativeSource for InotifySource {
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

fn watch_mask(flags: CreateFlags) -> WatchMask {
    let mut mask = WatchMask::MODIFY
        | WatchMask::MOVE
        | WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::ATTRIB;
    if flags.contains(CreateFlags::WATCH_ROOT) {
        mask |= WatchMask::DELETE_SELF | WatchMask::MOVE_SELF;
    }
    mask
}

/// Map inotify mask onto native flags, empty if nothing interesting happened
fn translate(mask: EventMask) -> NativeFlags {
    let mut flags = NativeFlags::empty();
    if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
        flags |= NativeFlags::ITEM_CREATED;
    }
    if mask.intersects(EventMask::DELETE | EventMask::DELETE_SELF) {
        flags |= NativeFlags::ITEM_REMOVED;
    }
    if mask.contains(EventMask::MODIFY) {
        flags |= NativeFlags::ITEM_MODIFIED;
    }
    if mask.intersects(EventMask::MOVED_FROM | EventMask::MOVE_SELF) {
        flags |= NativeFlags::ITEM_RENAMED;
    }
    if mask.contains(EventMask::ATTRIB) {
        flags |= NativeFlags::ITEM_INODE_META_MOD;
    }
    if flags.is_empty() {
        return flags;
    }

    if mask.contains(EventMask::ISDIR) {
        flags | NativeFlags::ITEM_IS_DIR
    } else {
        flags | NativeFlags::ITEM_IS_FILE
    }
}

fn read_events(
    mut inotify: Inotify,
    mut map: HashMap<WatchDescriptor, PathBuf>,
    config: &StreamConfig,
    tx: &Sender<NativeMessage>,
    should_stop: &AtomicBool,
) {
    let file_events = config.flags.contains(CreateFlags::FILE_EVENTS);
    let mut buffer = vec![0u8; BUFFER_LEN];
    let mut coalescer = Coalescer::new(config.latency);

    while !should_stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        match inotify.read_events(&mut buffer) {
            Ok(events) => {
                for event in events {
                    if event.mask.contains(EventMask::Q_OVERFLOW) {
                        let flags = NativeFlags::MUST_SCAN_SUBDIRS | NativeFlags::KERNEL_DROPPED;
                        coalescer.push(RawEvent::new(PathBuf::new(), flags), now);
                        continue;
                    }

                    let flags = translate(event.mask);
                    if !flags.is_empty() {
                        if let Some(root) = map.get(&event.wd) {
                            let path = match event.name {
                                Some(name) if file_events => root.join(name),
                                _ => root.clone(),
                            };
                            coalescer.push(RawEvent::new(path, flags), now);
                        }
                    }

                    if event.mask.contains(EventMask::IGNORED) {
                        // watch was removed so remove it from our map
                        map.remove(&event.wd);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                let _ = tx.send(NativeMessage::Error(Error::Native(e)));
                break;
            }
        }

        if let Some(batch) = coalescer.flush_due(Instant::now()) {
            trace!("inotify batch of {} events", batch.len());
            if tx.send(NativeMessage::Batch(batch)).is_err() {
                return;
            }
        }
        thread::sleep(coalescer.timeout(Instant::now(), READ_INTERVAL).min(READ_INTERVAL));
    }

    if let Some(batch) = coalescer.flush() {
        let _ = tx.send(NativeMessage::Batch(batch));
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::{Duration, Instant};

    use crossbeam_channel::Receiver;
    use inotify::EventMask;

    use crate::native::linux::translate;
    use crate::native::{
        CreateFlags, InotifySource, NativeFlags, NativeMessage, NativeSource, RawEvent,
        StreamConfig,
    };
    use crate::Error;

    fn start(root: &Path) -> (InotifySource, Collector) {
        let mut source = InotifySource::new();
        let collector = Collector {
            rx: source.events(),
            seen: vec![],
        };
        source.configure(StreamConfig {
            paths: vec![root.to_path_buf()],
            ..StreamConfig::new(
                Duration::from_millis(20),
                CreateFlags::FILE_EVENTS | CreateFlags::WATCH_ROOT,
            )
        });
        source.start().unwrap();
        (source, collector)
    }

    /// Raw events received so far and not yet matched
    struct Collector {
        rx: Receiver<NativeMessage>,
        seen: Vec<RawEvent>,
    }

    impl Collector {
        fn wait_for(&mut self, path: &Path, flags: NativeFlags) -> RawEvent {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                if let Some(pos) = self
                    .seen
                    .iter()
                    .position(|e| e.path == path && e.flags.contains(flags))
                {
                    return self.seen.remove(pos);
                }
                let timeout = deadline.saturating_duration_since(Instant::now());
                match self.rx.recv_timeout(timeout).expect("no matching event") {
                    NativeMessage::Batch(batch) => self.seen.extend(batch),
                    NativeMessage::Error(e) => panic!("unexpected error {}", e),
                }
            }
        }
    }

    #[test]
    fn translate_masks() {
        assert_eq!(
            translate(EventMask::CREATE),
            NativeFlags::ITEM_CREATED | NativeFlags::ITEM_IS_FILE
        );
        assert_eq!(
            translate(EventMask::MOVED_TO | EventMask::ISDIR),
            NativeFlags::ITEM_CREATED | NativeFlags::ITEM_IS_DIR
        );
        assert_eq!(
            translate(EventMask::DELETE_SELF),
            NativeFlags::ITEM_REMOVED | NativeFlags::ITEM_IS_FILE
        );
        assert_eq!(
            translate(EventMask::MOVED_FROM),
            NativeFlags::ITEM_RENAMED | NativeFlags::ITEM_IS_FILE
        );
        assert_eq!(
            translate(EventMask::MODIFY | EventMask::ATTRIB),
            NativeFlags::ITEM_MODIFIED
                | NativeFlags::ITEM_INODE_META_MOD
                | NativeFlags::ITEM_IS_FILE
        );
        assert!(translate(EventMask::OPEN | EventMask::CLOSE_NOWRITE).is_empty());
        assert!(translate(EventMask::IGNORED).is_empty());
    }

    #[test]
    fn reports_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let (mut source, mut events) = start(root);

        std::fs::write(root.join("f"), b"data").unwrap();
        events.wait_for(&root.join("f"), NativeFlags::ITEM_CREATED);

        std::fs::rename(root.join("f"), root.join("g")).unwrap();
        events.wait_for(&root.join("f"), NativeFlags::ITEM_RENAMED);
        events.wait_for(&root.join("g"), NativeFlags::ITEM_CREATED);

        std::fs::remove_file(root.join("g")).unwrap();
        events.wait_for(&root.join("g"), NativeFlags::ITEM_REMOVED);

        source.stop();
        while events.rx.recv_timeout(Duration::from_secs(5)).is_ok() {}
        assert!(events.rx.try_recv().is_err());
    }

    #[test]
    fn reports_root_removal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("watched");
        std::fs::create_dir(&root).unwrap();
        let (mut source, mut events) = start(&root);

        std::fs::remove_dir(&root).unwrap();
        events.wait_for(&root, NativeFlags::ITEM_REMOVED);

        source.stop();
    }

    #[test]
    fn missing_path_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = InotifySource::new();
        source.configure(StreamConfig {
            paths: vec![dir.path().join("missing")],
            ..StreamConfig::new(Duration::from_millis(20), CreateFlags::FILE_EVENTS)
        });

        match source.start() {
            Err(Error::Native(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected result {:?}", other),
        }
        source.stop();
    }
}
