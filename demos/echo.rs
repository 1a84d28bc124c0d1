//! Round-trips one message over a pipe, entirely inside the loop.
//!
//! Run with `cargo run --example echo`; set `RUST_LOG=trace` to watch
//! the ticks.

use std::io::{self, Write};
use std::time::Duration;

use evio::{EventLoop, Mask};

fn main() -> io::Result<()> {
    env_logger::init();

    let mut el = EventLoop::new(64)?;

    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    let (r, w) = (fds[0], fds[1]);

    el.add_file(w, Mask::WRITABLE, |el, fd, _mask| {
        let msg = b"hello from the loop\n";
        unsafe { libc::write(fd, msg.as_ptr().cast(), msg.len()) };
        el.del_file(fd, Mask::WRITABLE);
    })?;

    el.add_file(r, Mask::READABLE, |el, fd, _mask| {
        let mut buf = [0u8; 64];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n > 0 {
            io::stdout().write_all(&buf[..n as usize]).ok();
        }
        el.stop();
    })?;

    // Watchdog so a broken pipe cannot hang the demo.
    el.add_timer(Duration::from_secs(1), |el, _id| {
        el.stop();
        None
    });

    el.run()?;
    println!("served by the {} backend", EventLoop::backend_name());

    unsafe {
        libc::close(r);
        libc::close(w);
    }
    Ok(())
}
