use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{cmp, io, ptr};

use log::error;

use crate::event::{FileEvent, Fired};
use crate::Mask;

// Type of the `nchanges` and `nevents` parameters in the `kevent` function.
#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

// Type of the `filter` field in the `kevent` structure.
#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "openbsd"
))]
type Filter = libc::c_short;
#[cfg(any(
    target_os = "ios",
    target_os = "macos",
    target_os = "tvos",
    target_os = "watchos"
))]
type Filter = i16;
#[cfg(target_os = "netbsd")]
type Filter = u32;

// Type of the `flags` field in the `kevent` structure.
#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "openbsd"
))]
type Flags = libc::c_ushort;
#[cfg(any(
    target_os = "ios",
    target_os = "macos",
    target_os = "tvos",
    target_os = "watchos"
))]
type Flags = u16;
#[cfg(target_os = "netbsd")]
type Flags = u32;

// Type of the `udata` field in the `kevent` structure.
#[cfg(not(target_os = "netbsd"))]
type UData = *mut libc::c_void;
#[cfg(target_os = "netbsd")]
type UData = libc::intptr_t;

macro_rules! kevent {
    ($id: expr, $filter: expr, $flags: expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as Filter,
            flags: $flags as Flags,
            fflags: 0,
            data: 0,
            udata: 0 as UData,
        }
    };
}

// Marks an untouched slot of the pairing table.
const UNSEEN: u32 = u32::MAX;

pub(crate) struct Selector {
    kq: OwnedFd,
    events: Vec<libc::kevent>,
    // kqueue reports the two directions of one descriptor as separate
    // kevents; this table pairs them back up into a single fired entry,
    // indexed by fd, reset after every poll.
    merge: Vec<u32>,
}

impl Selector {
    pub(crate) fn new(setsize: usize) -> io::Result<Selector> {
        let kq = syscall!(kqueue())?;
        // SAFETY: `kqueue(2)` ensures the fd is valid.
        let kq = unsafe { OwnedFd::from_raw_fd(kq) };
        syscall!(fcntl(kq.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC))?;
        Ok(Selector {
            kq,
            events: Vec::with_capacity(setsize.max(1)),
            merge: vec![UNSEEN; setsize],
        })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        self.events = Vec::with_capacity(setsize.max(1));
        self.merge.resize(setsize, UNSEEN);
        Ok(())
    }

    pub(crate) fn name() -> &'static str {
        "kqueue"
    }

    pub(crate) fn add(&mut self, fd: RawFd, _old: Mask, added: Mask) -> io::Result<()> {
        let mut changes = [kevent!(0, 0, 0); 2];
        let mut n = 0;
        if added.is_readable() {
            changes[n] = kevent!(fd, libc::EVFILT_READ, libc::EV_ADD);
            n += 1;
        }
        if added.is_writable() {
            changes[n] = kevent!(fd, libc::EVFILT_WRITE, libc::EV_ADD);
            n += 1;
        }
        syscall!(kevent(
            self.kq.as_raw_fd(),
            changes.as_ptr(),
            n as Count,
            ptr::null_mut(),
            0,
            ptr::null(),
        ))
        .map(|_| ())
    }

    pub(crate) fn del(&mut self, fd: RawFd, _old: Mask, removed: Mask) {
        let mut changes = [kevent!(0, 0, 0); 2];
        let mut n = 0;
        if removed.is_readable() {
            changes[n] = kevent!(fd, libc::EVFILT_READ, libc::EV_DELETE);
            n += 1;
        }
        if removed.is_writable() {
            changes[n] = kevent!(fd, libc::EVFILT_WRITE, libc::EV_DELETE);
            n += 1;
        }
        if let Err(err) = syscall!(kevent(
            self.kq.as_raw_fd(),
            changes.as_ptr(),
            n as Count,
            ptr::null_mut(),
            0,
            ptr::null(),
        )) {
            error!("failed to update kqueue subscription for fd {}: {}", fd, err);
        }
    }

    pub(crate) fn poll(
        &mut self,
        _events: &[FileEvent],
        _max_fd: RawFd,
        timeout: Option<Duration>,
        fired: &mut Vec<Fired>,
    ) -> io::Result<usize> {
        let timespec = timeout.map(|to| libc::timespec {
            tv_sec: cmp::min(to.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
            // `Duration::subsec_nanos` is guaranteed to be less than one
            // billion, making the cast to i32 safe. The cast itself is
            // needed for platforms where C's long is only 32 bits.
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let timespec = timespec
            .as_ref()
            .map(|s| s as *const _)
            .unwrap_or(ptr::null());

        self.events.clear();
        let n = match syscall!(kevent(
            self.kq.as_raw_fd(),
            ptr::null(),
            0,
            self.events.as_mut_ptr(),
            self.events.capacity() as Count,
            timespec,
        )) {
            Ok(n) => n as usize,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => 0,
            Err(e) => return Err(e),
        };
        // SAFETY: `kevent` ensures that `n` events are assigned.
        unsafe { self.events.set_len(n) };

        fired.clear();
        for event in &self.events {
            let fd = event.ident as RawFd;
            let mut mask = Mask::NONE;
            if event.filter == libc::EVFILT_READ as Filter {
                mask |= Mask::READABLE;
            }
            if event.filter == libc::EVFILT_WRITE as Filter {
                mask |= Mask::WRITABLE;
            }
            match self.merge.get(fd as usize) {
                Some(&idx) if idx != UNSEEN => fired[idx as usize].mask |= mask,
                Some(_) => {
                    self.merge[fd as usize] = fired.len() as u32;
                    fired.push(Fired { fd, mask });
                }
                // A kevent for a descriptor beyond setsize; nothing to
                // dispatch it to.
                None => {}
            }
        }
        for entry in fired.iter() {
            self.merge[entry.fd as usize] = UNSEEN;
        }
        Ok(fired.len())
    }
}
