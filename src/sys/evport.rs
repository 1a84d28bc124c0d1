use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{cmp, io, ptr};

use log::error;

use crate::event::{FileEvent, Fired};
use crate::Mask;

pub(crate) struct Selector {
    port: OwnedFd,
    events: Vec<libc::port_event>,
    // Event ports dissociate a descriptor when delivering its event, so
    // everything handed out by the last poll must be re-associated with
    // its current mask before the next wait.
    delivered: Vec<RawFd>,
}

impl Selector {
    pub(crate) fn new(setsize: usize) -> io::Result<Selector> {
        // SAFETY: `port_create(2)` ensures the fd is valid.
        let port = unsafe { OwnedFd::from_raw_fd(syscall!(port_create())?) };
        Ok(Selector {
            port,
            events: Vec::with_capacity(setsize.max(1)),
            delivered: Vec::new(),
        })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        self.events = Vec::with_capacity(setsize.max(1));
        Ok(())
    }

    pub(crate) fn name() -> &'static str {
        "evport"
    }

    pub(crate) fn add(&mut self, fd: RawFd, old: Mask, added: Mask) -> io::Result<()> {
        // Re-association replaces the previous subscription wholesale, so
        // always submit the merged mask.
        self.associate(fd, old | added)
    }

    pub(crate) fn del(&mut self, fd: RawFd, old: Mask, removed: Mask) {
        let remaining = old.remove(removed);
        let res = if remaining.is_none() {
            syscall!(port_dissociate(
                self.port.as_raw_fd(),
                libc::PORT_SOURCE_FD,
                fd as libc::uintptr_t,
            ))
            .map(|_| ())
        } else {
            self.associate(fd, remaining)
        };
        if let Err(err) = res {
            error!("failed to update port subscription for fd {}: {}", fd, err);
        }
    }

    pub(crate) fn poll(
        &mut self,
        events: &[FileEvent],
        _max_fd: RawFd,
        timeout: Option<Duration>,
        fired: &mut Vec<Fired>,
    ) -> io::Result<usize> {
        // Restore the oneshot associations consumed by the previous
        // delivery, using whatever each slot's mask is now.
        for i in 0..self.delivered.len() {
            let fd = self.delivered[i];
            let mask = events
                .get(fd as usize)
                .map(|slot| slot.mask)
                .unwrap_or(Mask::NONE);
            if !mask.is_none() {
                if let Err(err) = self.associate(fd, mask) {
                    error!("failed to re-associate fd {}: {}", fd, err);
                }
            }
        }
        self.delivered.clear();

        let mut timespec = timeout.map(|to| libc::timespec {
            tv_sec: cmp::min(to.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let timespec = timespec
            .as_mut()
            .map(|s| s as *mut _)
            .unwrap_or(ptr::null_mut());

        let mut nget: libc::c_uint = 1;
        let res = unsafe {
            libc::port_getn(
                self.port.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.capacity() as libc::c_uint,
                &mut nget,
                timespec,
            )
        };
        if res == -1 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                // ETIME is the timeout case; events retrieved before the
                // deadline are still reported through `nget`.
                Some(libc::ETIME) => {}
                Some(libc::EINTR) => nget = 0,
                _ => return Err(err),
            }
        }
        // SAFETY: `port_getn` assigned `nget` entries.
        unsafe { self.events.set_len(nget as usize) };

        fired.clear();
        for event in &self.events {
            let fd = event.portev_object as RawFd;
            let bits = event.portev_events;
            let mut mask = Mask::NONE;
            if bits & libc::POLLIN as libc::c_int != 0 {
                mask |= Mask::READABLE;
            }
            if bits & libc::POLLOUT as libc::c_int != 0 {
                mask |= Mask::WRITABLE;
            }
            if bits & (libc::POLLERR as libc::c_int | libc::POLLHUP as libc::c_int) != 0 {
                mask |= Mask::WRITABLE;
            }
            fired.push(Fired { fd, mask });
            self.delivered.push(fd);
        }
        Ok(fired.len())
    }

    fn associate(&mut self, fd: RawFd, mask: Mask) -> io::Result<()> {
        let mut bits = 0;
        if mask.is_readable() {
            bits |= libc::POLLIN as libc::c_int;
        }
        if mask.is_writable() {
            bits |= libc::POLLOUT as libc::c_int;
        }
        syscall!(port_associate(
            self.port.as_raw_fd(),
            libc::PORT_SOURCE_FD,
            fd as libc::uintptr_t,
            bits,
            ptr::null_mut(),
        ))
        .map(|_| ())
    }
}
