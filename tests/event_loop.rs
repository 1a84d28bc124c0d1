use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use evio::{wait, EventLoop, Flags, Mask};

mod util;

use util::{close, init, pipe, read_byte, socketpair, write_byte};

#[test]
fn backend_has_a_name() {
    assert!(["evport", "epoll", "kqueue", "select"].contains(&EventLoop::backend_name()));
}

#[test]
fn echo_pipe() {
    init();

    let mut el = EventLoop::new(64).unwrap();
    let (r, w) = pipe();

    let byte = Rc::new(Cell::new(0u8));
    {
        let byte = Rc::clone(&byte);
        el.add_file(r, Mask::READABLE, move |el, fd, _mask| {
            byte.set(read_byte(fd).expect("readable callback without data"));
            el.stop();
        })
        .unwrap();
    }
    el.add_file(w, Mask::WRITABLE, move |el, fd, _mask| {
        assert_eq!(write_byte(fd, b'A'), 1);
        el.del_file(fd, Mask::WRITABLE);
    })
    .unwrap();

    let timed_out = Rc::new(Cell::new(false));
    {
        let timed_out = Rc::clone(&timed_out);
        el.add_timer(Duration::from_secs(2), move |el, _id| {
            timed_out.set(true);
            el.stop();
            None
        });
    }

    el.run().unwrap();

    assert!(!timed_out.get());
    assert_eq!(byte.get(), b'A');
    // The writer deregistered itself, so only the read end remains.
    assert_eq!(el.file_events(w), Mask::NONE);
    assert_eq!(el.file_events(r), Mask::READABLE);
    assert_eq!(el.max_fd(), r);

    close(r);
    close(w);
}

#[test]
fn max_fd_tracks_registrations() {
    init();

    let mut el = EventLoop::new(64).unwrap();
    assert_eq!(el.max_fd(), -1);

    let (r, w) = pipe();
    let (lo, hi) = if r < w { (r, w) } else { (w, r) };

    el.add_file(lo, Mask::READABLE, |_, _, _| {}).unwrap();
    assert_eq!(el.max_fd(), lo);
    el.add_file(hi, Mask::WRITABLE, |_, _, _| {}).unwrap();
    assert_eq!(el.max_fd(), hi);

    // Every registered descriptor sits at or below max_fd and inside the
    // table.
    for fd in 0..el.setsize() as i32 {
        if !el.file_events(fd).is_none() {
            assert!(fd <= el.max_fd());
        }
    }

    el.del_file(hi, Mask::WRITABLE);
    assert_eq!(el.file_events(hi), Mask::NONE);
    assert_eq!(el.max_fd(), lo);

    el.del_file(lo, Mask::READABLE);
    assert_eq!(el.max_fd(), -1);

    close(r);
    close(w);
}

#[test]
fn registration_is_additive() {
    init();

    let mut el = EventLoop::new(64).unwrap();
    let (a, b) = socketpair();
    // Make `a` readable as well as writable.
    assert_eq!(write_byte(b, b'x'), 1);

    let order = Rc::new(RefCell::new(Vec::new()));
    {
        let order = Rc::clone(&order);
        el.add_file(a, Mask::READABLE, move |_el, _fd, _mask| {
            order.borrow_mut().push('r');
        })
        .unwrap();
    }
    {
        let order = Rc::clone(&order);
        el.add_file(a, Mask::WRITABLE, move |_el, _fd, _mask| {
            order.borrow_mut().push('w');
        })
        .unwrap();
    }
    assert_eq!(el.file_events(a), Mask::READABLE | Mask::WRITABLE);

    el.process_events(Flags::FILE | Flags::DONT_WAIT).unwrap();

    // Both directions dispatched, read first.
    assert_eq!(*order.borrow(), ['r', 'w']);

    close(a);
    close(b);
}

#[test]
fn duplex_callback_runs_once() {
    init();

    let mut el = EventLoop::new(64).unwrap();
    let (a, b) = socketpair();
    assert_eq!(write_byte(b, b'x'), 1);

    let hits = Rc::new(Cell::new(0));
    {
        let hits = Rc::clone(&hits);
        el.add_file(a, Mask::READABLE | Mask::WRITABLE, move |_el, _fd, mask| {
            hits.set(hits.get() + 1);
            // One invocation carries the combined readiness.
            assert!(mask.is_readable());
            assert!(mask.is_writable());
        })
        .unwrap();
    }

    el.process_events(Flags::FILE | Flags::DONT_WAIT).unwrap();
    assert_eq!(hits.get(), 1);

    close(a);
    close(b);
}

#[test]
fn deleting_a_batch_mate_suppresses_its_callback() {
    init();

    let mut el = EventLoop::new(64).unwrap();
    let (r1, w1) = pipe();
    let (r2, w2) = pipe();

    // Both write ends are ready at once; whichever dispatches first
    // deregisters the other, which must then be skipped.
    let ran = Rc::new(Cell::new(0));
    {
        let ran = Rc::clone(&ran);
        el.add_file(w1, Mask::WRITABLE, move |el, _fd, _mask| {
            ran.set(ran.get() + 1);
            el.del_file(w2, Mask::WRITABLE);
        })
        .unwrap();
    }
    {
        let ran = Rc::clone(&ran);
        el.add_file(w2, Mask::WRITABLE, move |el, _fd, _mask| {
            ran.set(ran.get() + 1);
            el.del_file(w1, Mask::WRITABLE);
        })
        .unwrap();
    }

    el.process_events(Flags::FILE | Flags::DONT_WAIT).unwrap();
    assert_eq!(ran.get(), 1);

    for fd in [r1, w1, r2, w2] {
        close(fd);
    }
}

#[test]
fn out_of_range_descriptors() {
    init();

    let mut el = EventLoop::new(8).unwrap();
    let err = el
        .add_file(100, Mask::READABLE, |_, _, _| {})
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    assert_eq!(el.file_events(100), Mask::NONE);
    assert_eq!(el.max_fd(), -1);

    // Deleting out of range is a quiet no-op.
    el.del_file(100, Mask::READABLE);
}

#[test]
fn resize_preserves_registrations() {
    init();

    let mut el = EventLoop::new(400).unwrap();
    let (r, w) = pipe();
    let target = 333;
    assert_ne!(unsafe { libc::dup2(r, target) }, -1);

    el.add_file(target, Mask::READABLE, |_, _, _| {}).unwrap();
    assert_eq!(el.max_fd(), target);

    // Unchanged size is a no-op.
    el.resize(400).unwrap();
    // Shrinking over a registered descriptor is refused and changes
    // nothing.
    assert!(el.resize(333).is_err());
    assert!(el.resize(100).is_err());
    assert_eq!(el.setsize(), 400);
    assert_eq!(el.file_events(target), Mask::READABLE);

    el.resize(512).unwrap();
    assert_eq!(el.setsize(), 512);
    assert_eq!(el.file_events(target), Mask::READABLE);
    assert_eq!(el.max_fd(), target);

    // Shrinking down to just above the registration still works.
    el.resize(334).unwrap();
    assert_eq!(el.file_events(target), Mask::READABLE);

    close(target);
    close(r);
    close(w);
}

#[test]
fn before_sleep_runs_each_iteration() {
    init();

    let mut el = EventLoop::new(8).unwrap();
    let hooked = Rc::new(Cell::new(0));
    {
        let hooked = Rc::clone(&hooked);
        el.set_before_sleep(move |_el| {
            hooked.set(hooked.get() + 1);
        });
    }
    el.add_timer(Duration::from_millis(10), |el, _id| {
        el.stop();
        None
    });

    el.run().unwrap();
    assert!(hooked.get() >= 1);
}

#[test]
fn wait_reports_readiness() {
    init();

    let (r, w) = pipe();

    // Nothing buffered: the read end times out.
    assert_eq!(
        wait(r, Mask::READABLE, Duration::from_millis(10)).unwrap(),
        Mask::NONE
    );
    // An empty pipe is writable immediately.
    assert!(wait(w, Mask::WRITABLE, Duration::from_secs(1))
        .unwrap()
        .is_writable());

    assert_eq!(write_byte(w, b'z'), 1);
    assert_eq!(
        wait(r, Mask::READABLE, Duration::from_secs(1)).unwrap(),
        Mask::READABLE
    );

    close(r);
    close(w);
}
