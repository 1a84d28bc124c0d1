use std::os::unix::io::RawFd;
use std::rc::Rc;

use crate::{EventLoop, Mask};

/// Callback invoked when a registered descriptor becomes ready.
pub(crate) type FileProc = dyn Fn(&mut EventLoop, RawFd, Mask);

/// One registration slot, addressed by descriptor value.
///
/// A slot is registered iff `mask` is not `NONE`; the read callback is
/// present iff READABLE is set and the write callback iff WRITABLE is
/// set. Both directions may share one callback (a single `Rc`), which is
/// how the dispatcher recognises a duplex handler and invokes it once.
pub(crate) struct FileEvent {
    pub(crate) mask: Mask,
    pub(crate) read: Option<Rc<FileProc>>,
    pub(crate) write: Option<Rc<FileProc>>,
}

impl FileEvent {
    pub(crate) fn empty() -> FileEvent {
        FileEvent {
            mask: Mask::NONE,
            read: None,
            write: None,
        }
    }
}

/// A `(fd, mask)` pair produced by the backend poll.
///
/// Entries are only valid between the return of one poll and the start of
/// the next.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Fired {
    pub(crate) fd: RawFd,
    pub(crate) mask: Mask,
}
