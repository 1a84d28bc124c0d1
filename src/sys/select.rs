use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{io, mem, ptr};

use crate::event::{FileEvent, Fired};
use crate::Mask;

pub(crate) struct Selector {
    rfds: libc::fd_set,
    wfds: libc::fd_set,
}

impl Selector {
    pub(crate) fn new(setsize: usize) -> io::Result<Selector> {
        check_setsize(setsize)?;
        // SAFETY: an all-zero fd_set is the empty set; FD_ZERO makes that
        // explicit for platforms where the representation differs.
        let (rfds, wfds) = unsafe {
            let mut rfds = mem::zeroed();
            let mut wfds = mem::zeroed();
            libc::FD_ZERO(&mut rfds);
            libc::FD_ZERO(&mut wfds);
            (rfds, wfds)
        };
        Ok(Selector { rfds, wfds })
    }

    pub(crate) fn resize(&mut self, setsize: usize) -> io::Result<()> {
        check_setsize(setsize)
    }

    pub(crate) fn name() -> &'static str {
        "select"
    }

    pub(crate) fn add(&mut self, fd: RawFd, _old: Mask, added: Mask) -> io::Result<()> {
        unsafe {
            if added.is_readable() {
                libc::FD_SET(fd, &mut self.rfds);
            }
            if added.is_writable() {
                libc::FD_SET(fd, &mut self.wfds);
            }
        }
        Ok(())
    }

    pub(crate) fn del(&mut self, fd: RawFd, _old: Mask, removed: Mask) {
        unsafe {
            if removed.is_readable() {
                libc::FD_CLR(fd, &mut self.rfds);
            }
            if removed.is_writable() {
                libc::FD_CLR(fd, &mut self.wfds);
            }
        }
    }

    pub(crate) fn poll(
        &mut self,
        events: &[FileEvent],
        max_fd: RawFd,
        timeout: Option<Duration>,
        fired: &mut Vec<Fired>,
    ) -> io::Result<usize> {
        // select(2) mutates its sets, so it gets scratch copies.
        let mut rfds = self.rfds;
        let mut wfds = self.wfds;
        let mut timeval = timeout.map(|to| libc::timeval {
            tv_sec: clamp_secs(to),
            tv_usec: to.subsec_micros() as libc::suseconds_t,
        });
        let timeval = timeval
            .as_mut()
            .map(|t| t as *mut _)
            .unwrap_or(ptr::null_mut());

        let ready = match syscall!(select(
            max_fd + 1,
            &mut rfds,
            &mut wfds,
            ptr::null_mut(),
            timeval,
        )) {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => 0,
            Err(e) => return Err(e),
        };

        fired.clear();
        if ready > 0 {
            for fd in 0..=max_fd {
                let slot = &events[fd as usize];
                if slot.mask.is_none() {
                    continue;
                }
                let mut mask = Mask::NONE;
                if slot.mask.is_readable() && unsafe { libc::FD_ISSET(fd, &rfds) } {
                    mask |= Mask::READABLE;
                }
                if slot.mask.is_writable() && unsafe { libc::FD_ISSET(fd, &wfds) } {
                    mask |= Mask::WRITABLE;
                }
                if !mask.is_none() {
                    fired.push(Fired { fd, mask });
                }
            }
        }
        Ok(fired.len())
    }
}

fn check_setsize(setsize: usize) -> io::Result<()> {
    // Descriptors at or above FD_SETSIZE can never be watched by select.
    if setsize > libc::FD_SETSIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "setsize exceeds FD_SETSIZE",
        ));
    }
    Ok(())
}

fn clamp_secs(to: Duration) -> libc::time_t {
    std::cmp::min(to.as_secs(), libc::time_t::MAX as u64) as libc::time_t
}
