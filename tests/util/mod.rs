// Not all functions are used by all tests.
#![allow(dead_code)]

use std::os::unix::io::RawFd;
use std::sync::Once;

pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        env_logger::try_init().expect("unable to initialise logger");
    })
}

/// A nonblocking pipe; `.0` is the read end.
pub fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as libc::c_int; 2];
    assert_ne!(unsafe { libc::pipe(fds.as_mut_ptr()) }, -1);
    set_nonblock(fds[0]);
    set_nonblock(fds[1]);
    (fds[0], fds[1])
}

/// A nonblocking unix stream socket pair.
pub fn socketpair() -> (RawFd, RawFd) {
    let mut fds = [0 as libc::c_int; 2];
    assert_ne!(
        unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) },
        -1
    );
    set_nonblock(fds[0]);
    set_nonblock(fds[1]);
    (fds[0], fds[1])
}

pub fn set_nonblock(fd: RawFd) {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    assert_ne!(flags, -1);
    assert_ne!(
        unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) },
        -1
    );
}

pub fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

pub fn write_byte(fd: RawFd, byte: u8) -> isize {
    unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) }
}

pub fn read_byte(fd: RawFd) -> Option<u8> {
    let mut byte = 0u8;
    let n = unsafe { libc::read(fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
    if n == 1 {
        Some(byte)
    } else {
        None
    }
}
