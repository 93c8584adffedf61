use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    /// Set of portable operations that triggered an [`Event`]
    ///
    /// Flags are not mutually exclusive: a file that was created and
    /// immediately written to may be reported as `CREATE | WRITE`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Op: u32 {
        /// A new path was created
        const CREATE = 1 << 0;
        /// A file was written to (truncation is reported as a write too)
        const WRITE = 1 << 1;
        /// A path was removed
        const REMOVE = 1 << 2;
        /// A path was renamed, reported with the old name
        const RENAME = 1 << 3;
        /// Attributes (mode, owner, extended attributes) were changed
        const CHMOD = 1 << 4;
    }
}

/// Order in which operations are printed
const OP_NAMES: [(Op, &str); 5] = [
    (Op::CREATE, "CREATE"),
    (Op::REMOVE, "REMOVE"),
    (Op::WRITE, "WRITE"),
    (Op::RENAME, "RENAME"),
    (Op::CHMOD, "CHMOD"),
];

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "[no events]");
        }
        let mut first = true;
        for (op, name) in OP_NAMES {
            if self.contains(op) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Portable filesystem change notification
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Event {
    /// Path to the file or directory that changed
    ///
    /// Paths are relative to the input path given to `Watcher::add`
    /// if it was relative, absolute otherwise.
    pub name: PathBuf,

    /// Operations that happened with `name`, never empty
    pub op: Op,
}

impl Event {
    pub fn new<P: Into<PathBuf>>(name: P, op: Op) -> Self {
        Event {
            name: name.into(),
            op,
        }
    }

    /// Returns `true` if all operations from `op` are present in this event
    pub fn has(&self, op: Op) -> bool {
        self.op.contains(op)
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // pad separately since Op doesn't handle width itself
        write!(f, "{:<13} {:?}", self.op.to_string(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use crate::event::{Event, Op};

    #[test]
    fn op_display() {
        assert_eq!(Op::CREATE.to_string(), "CREATE");
        assert_eq!((Op::WRITE | Op::CREATE).to_string(), "CREATE|WRITE");
        assert_eq!(
            (Op::CHMOD | Op::RENAME | Op::WRITE | Op::REMOVE | Op::CREATE).to_string(),
            "CREATE|REMOVE|WRITE|RENAME|CHMOD"
        );
        assert_eq!(Op::empty().to_string(), "[no events]");
    }

    #[test]
    fn has() {
        let event = Event::new("/tmp/a/f", Op::CREATE | Op::WRITE);
        assert!(event.has(Op::CREATE));
        assert!(event.has(Op::WRITE));
        assert!(event.has(Op::CREATE | Op::WRITE));
        assert!(!event.has(Op::REMOVE));
        assert!(!event.has(Op::CREATE | Op::REMOVE));
    }

    #[test]
    fn event_display() {
        let event = Event::new("/tmp/a/f", Op::CREATE);
        assert_eq!(event.to_string(), "CREATE        \"/tmp/a/f\"");
    }
}
