//! Translation of raw native events into portable ones

use crate::event::{Event, Op};
use crate::native::{NativeFlags, RawEvent};

/// Native flags that mean some events were lost
const OVERFLOW: NativeFlags = NativeFlags::MUST_SCAN_SUBDIRS
    .union(NativeFlags::USER_DROPPED)
    .union(NativeFlags::KERNEL_DROPPED);

/// Convert raw native event into portable one
///
/// Each recognized flag is tested independently, unknown flags are ignored.
/// Returns `None` if no recognized flag is set.
pub fn normalize(raw: &RawEvent) -> Option<Event> {
    let f = raw.flags;
    let mut op = Op::empty();

    if f.contains(NativeFlags::ITEM_CREATED) {
        op |= Op::CREATE;
    }
    if f.contains(NativeFlags::ITEM_REMOVED) {
        op |= Op::REMOVE;
    }
    if f.contains(NativeFlags::ITEM_MODIFIED) {
        op |= Op::WRITE;
    }
    if f.contains(NativeFlags::ITEM_RENAMED) {
        op |= Op::RENAME;
    }
    if f.intersects(NativeFlags::ITEM_INODE_META_MOD | NativeFlags::ITEM_XATTR_MOD) {
        op |= Op::CHMOD;
    }

    if op.is_empty() {
        None
    } else {
        Some(Event::new(raw.path.clone(), op))
    }
}

/// Returns `true` if native source lost events and reported it with `flags`
pub fn is_overflow(flags: NativeFlags) -> bool {
    flags.intersects(OVERFLOW)
}
