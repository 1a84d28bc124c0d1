use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use log::error;

use crate::event::{FileEvent, Fired};
use crate::Mask;

pub(crate) struct Selector {
    ep: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Selector {
    pub(crate) fn new(setsize: usize) -> io::Result<Selector> {
        // SAFETY: `epoll_create1(2)` ensures the fd is valid.
        let ep = unsafe { OwnedFd::from_raw_fd(syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?) };
        Ok(Selector {
            ep,
            events: Vec::with_capacity(setsize.max(1)),
        })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        self.events = Vec::with_capacity(setsize.max(1));
        Ok(())
    }

    pub(crate) fn name() -> &'static str {
        "epoll"
    }

    pub(crate) fn add(&mut self, fd: RawFd, old: Mask, added: Mask) -> io::Result<()> {
        // An already-watched descriptor must be modified, not re-added,
        // and the other direction's subscription must survive.
        let op = if old.is_none() {
            libc::EPOLL_CTL_ADD
        } else {
            libc::EPOLL_CTL_MOD
        };
        let mut event = libc::epoll_event {
            events: interest_bits(old | added),
            u64: fd as u64,
        };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), op, fd, &mut event)).map(|_| ())
    }

    pub(crate) fn del(&mut self, fd: RawFd, old: Mask, removed: Mask) {
        let remaining = old.remove(removed);
        let res = if remaining.is_none() {
            syscall!(epoll_ctl(
                self.ep.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                ptr::null_mut(),
            ))
        } else {
            let mut event = libc::epoll_event {
                events: interest_bits(remaining),
                u64: fd as u64,
            };
            syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_MOD, fd, &mut event))
        };
        if let Err(err) = res {
            error!("failed to update epoll subscription for fd {}: {}", fd, err);
        }
    }

    pub(crate) fn poll(
        &mut self,
        _events: &[FileEvent],
        _max_fd: RawFd,
        timeout: Option<Duration>,
        fired: &mut Vec<Fired>,
    ) -> io::Result<usize> {
        let timeout = timeout
            .map(|to| {
                // `Duration::as_millis` truncates, so round up. This avoids
                // turning sub-millisecond timeouts into a zero timeout,
                // unless the caller explicitly requests that by specifying
                // a zero timeout.
                to.checked_add(Duration::from_nanos(999_999))
                    .unwrap_or(to)
                    .as_millis() as libc::c_int
            })
            .unwrap_or(-1);

        self.events.clear();
        let n = match syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            self.events.as_mut_ptr(),
            self.events.capacity() as i32,
            timeout,
        )) {
            Ok(n) => n as usize,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => 0,
            Err(e) => return Err(e),
        };
        // SAFETY: `epoll_wait` ensures that `n` events are assigned.
        unsafe { self.events.set_len(n) };

        fired.clear();
        for event in &self.events {
            let bits = event.events as libc::c_int;
            let mut mask = Mask::NONE;
            if bits & libc::EPOLLIN != 0 {
                mask |= Mask::READABLE;
            }
            if bits & libc::EPOLLOUT != 0 {
                mask |= Mask::WRITABLE;
            }
            if bits & (libc::EPOLLERR | libc::EPOLLHUP) != 0 {
                mask |= Mask::WRITABLE;
            }
            fired.push(Fired {
                fd: event.u64 as RawFd,
                mask,
            });
        }
        Ok(fired.len())
    }
}

fn interest_bits(mask: Mask) -> u32 {
    // Level-triggered on purpose: no EPOLLET.
    let mut bits = 0;
    if mask.is_readable() {
        bits |= libc::EPOLLIN;
    }
    if mask.is_writable() {
        bits |= libc::EPOLLOUT;
    }
    bits as u32
}
