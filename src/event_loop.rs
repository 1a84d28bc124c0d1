use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{fmt, io, ops};

use log::trace;

use crate::event::{FileEvent, FileProc, Fired};
use crate::list::Direction;
use crate::sys;
use crate::timer::{FinalizerProc, TimerId, TimerProc, Timers};
use crate::Mask;

/// Selects what one call to [`EventLoop::process_events`] services.
///
/// Combine with `|`: `Flags::ALL | Flags::DONT_WAIT` processes whatever
/// is already pending without sleeping.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Flags(u8);

const FILE: u8 = 0b001;
const TIME: u8 = 0b010;
const DONT_WAIT: u8 = 0b100;

impl Flags {
    /// Dispatch ready descriptors.
    pub const FILE: Flags = Flags(FILE);

    /// Fire ripe timers.
    pub const TIME: Flags = Flags(TIME);

    /// Both descriptors and timers.
    pub const ALL: Flags = Flags(FILE | TIME);

    /// Never block in the kernel, even if nothing is ready yet.
    pub const DONT_WAIT: Flags = Flags(DONT_WAIT);

    /// Returns true if file events are requested.
    pub const fn has_file(self) -> bool {
        (self.0 & FILE) != 0
    }

    /// Returns true if time events are requested.
    pub const fn has_time(self) -> bool {
        (self.0 & TIME) != 0
    }

    /// Returns true if the tick must not block.
    pub const fn dont_wait(self) -> bool {
        (self.0 & DONT_WAIT) != 0
    }
}

impl ops::BitOr for Flags {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self {
        Flags(self.0 | other.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one = false;
        for (bit, name) in [(FILE, "FILE"), (TIME, "TIME"), (DONT_WAIT, "DONT_WAIT")] {
            if self.0 & bit != 0 {
                if one {
                    write!(fmt, " | ")?;
                }
                write!(fmt, "{}", name)?;
                one = true;
            }
        }
        if !one {
            write!(fmt, "(empty)")?;
        }
        Ok(())
    }
}

/// A single-threaded readiness event loop.
///
/// Descriptors are registered with [`add_file`] and a direction mask;
/// timers with [`add_timer`]. [`run`] then blocks in the kernel's
/// readiness primitive and invokes the registered callbacks as
/// descriptors become ready and timers come due, until [`stop`] is
/// called from a callback.
///
/// Every callback receives `&mut EventLoop` and may freely register,
/// deregister, resize, schedule or delete timers, and stop the loop. The
/// loop is strictly single-threaded: it is not `Send`, and cross-thread
/// wakeups are the application's business (a self-pipe registered as a
/// file event is the usual arrangement).
///
/// The loop never closes a descriptor. Deregister before closing, or the
/// slot keeps a stale kernel subscription.
///
/// [`add_file`]: EventLoop::add_file
/// [`add_timer`]: EventLoop::add_timer
/// [`run`]: EventLoop::run
/// [`stop`]: EventLoop::stop
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use evio::EventLoop;
///
/// let mut el = EventLoop::new(64)?;
/// el.add_timer(Duration::from_millis(10), |el, _id| {
///     el.stop();
///     None
/// });
/// el.run()?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct EventLoop {
    /// Registration slots, indexed by descriptor value.
    events: Vec<FileEvent>,
    /// Scratch the backend fills with ready `(fd, mask)` pairs.
    fired: Vec<Fired>,
    timers: Timers,
    /// Largest registered descriptor, -1 when none.
    max_fd: RawFd,
    /// Wall-clock seconds at the last timer pass, for skew detection.
    last_time: u64,
    stop: bool,
    selector: sys::Selector,
    before_sleep: Option<Rc<dyn Fn(&mut EventLoop)>>,
    /// Milliseconds added to every clock read; tests use it to simulate
    /// wall-clock jumps.
    clock_shift: i64,
}

impl EventLoop {
    /// Returns a new loop able to monitor descriptors in `[0, setsize)`.
    ///
    /// Creating the kernel backend can fail; in that case no resources
    /// are retained.
    pub fn new(setsize: usize) -> io::Result<EventLoop> {
        let selector = sys::Selector::new(setsize)?;
        let mut events = Vec::new();
        events.resize_with(setsize, FileEvent::empty);
        let mut el = EventLoop {
            events,
            fired: Vec::with_capacity(setsize),
            timers: Timers::new(),
            max_fd: -1,
            last_time: 0,
            stop: false,
            selector,
            before_sleep: None,
            clock_shift: 0,
        };
        el.last_time = el.clock_ms() / 1000;
        Ok(el)
    }

    /// The name of the compiled-in readiness backend, e.g. `"epoll"`.
    pub fn backend_name() -> &'static str {
        sys::Selector::name()
    }

    /// Current capacity of the descriptor table.
    pub fn setsize(&self) -> usize {
        self.events.len()
    }

    /// Largest registered descriptor, `-1` when none is registered.
    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    /// Grows or shrinks the descriptor table to `setsize`.
    ///
    /// A no-op when the size is unchanged. Fails with
    /// [`io::ErrorKind::InvalidInput`] when the new size would drop a
    /// registered descriptor; on any failure the previous tables remain
    /// valid. Existing registrations are preserved.
    pub fn resize(&mut self, setsize: usize) -> io::Result<()> {
        if setsize == self.events.len() {
            return Ok(());
        }
        if self.max_fd as i64 >= setsize as i64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "setsize would drop a registered descriptor",
            ));
        }
        self.selector.resize(setsize)?;
        self.events.resize_with(setsize, FileEvent::empty);
        // Entries already fired this tick stay valid unless the shrink
        // cuts them off.
        self.fired.truncate(setsize);
        let spare = setsize.saturating_sub(self.fired.len());
        self.fired.reserve(spare);
        Ok(())
    }

    /// Registers `callback` for the directions in `mask` on `fd`.
    ///
    /// Registration is additive: a second call for the other direction
    /// leaves the first installed. Registering both directions in one
    /// call installs the same callback for both, and the dispatcher will
    /// invoke it once per tick even when the descriptor is ready both
    /// ways, with the combined readiness in its mask argument.
    ///
    /// Fails with [`io::ErrorKind::InvalidInput`] when `fd` is outside
    /// `[0, setsize)`, or with the kernel's error when the subscription
    /// is refused; in both cases the slot is unchanged.
    pub fn add_file<F>(&mut self, fd: RawFd, mask: Mask, callback: F) -> io::Result<()>
    where
        F: Fn(&mut EventLoop, RawFd, Mask) + 'static,
    {
        let callback: Rc<FileProc> = Rc::new(callback);
        if fd < 0 || fd as usize >= self.events.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "descriptor out of range",
            ));
        }
        let old = self.events[fd as usize].mask;
        self.selector.add(fd, old, mask)?;

        let slot = &mut self.events[fd as usize];
        slot.mask = old | mask;
        if mask.is_readable() {
            slot.read = Some(Rc::clone(&callback));
        }
        if mask.is_writable() {
            slot.write = Some(callback);
        }
        if fd > self.max_fd {
            self.max_fd = fd;
        }
        trace!("registered fd {} for {:?}", fd, mask);
        Ok(())
    }

    /// Drops the directions in `mask` from `fd`'s registration.
    ///
    /// A no-op for descriptors out of range or not registered. When the
    /// last direction goes, the slot becomes free and `max_fd` is
    /// recomputed.
    pub fn del_file(&mut self, fd: RawFd, mask: Mask) {
        if fd < 0 || fd as usize >= self.events.len() {
            return;
        }
        let old = self.events[fd as usize].mask;
        if old.is_none() {
            return;
        }
        self.selector.del(fd, old, mask);

        let slot = &mut self.events[fd as usize];
        slot.mask = old.remove(mask);
        if !slot.mask.is_readable() {
            slot.read = None;
        }
        if !slot.mask.is_writable() {
            slot.write = None;
        }
        if slot.mask.is_none() && fd == self.max_fd {
            let mut j = fd - 1;
            while j >= 0 && self.events[j as usize].mask.is_none() {
                j -= 1;
            }
            self.max_fd = j;
        }
        trace!("deregistered fd {} for {:?}", fd, mask);
    }

    /// Returns the directions `fd` is currently registered for;
    /// [`Mask::NONE`] for unregistered or out-of-range descriptors.
    pub fn file_events(&self, fd: RawFd) -> Mask {
        if fd < 0 || fd as usize >= self.events.len() {
            return Mask::NONE;
        }
        self.events[fd as usize].mask
    }

    /// Schedules `callback` to run once `after` has elapsed.
    ///
    /// The callback decides its own future: returning `Some(period)`
    /// reschedules it that far from now, `None` removes it.
    pub fn add_timer<F>(&mut self, after: Duration, callback: F) -> TimerId
    where
        F: Fn(&mut EventLoop, TimerId) -> Option<Duration> + 'static,
    {
        self.create_timer(after, Rc::new(callback), None)
    }

    /// Like [`add_timer`], with a finalizer that runs when the timer is
    /// removed — by [`del_timer`] or after a one-shot firing.
    ///
    /// [`add_timer`]: EventLoop::add_timer
    /// [`del_timer`]: EventLoop::del_timer
    pub fn add_timer_with_finalizer<F, G>(
        &mut self,
        after: Duration,
        callback: F,
        finalizer: G,
    ) -> TimerId
    where
        F: Fn(&mut EventLoop, TimerId) -> Option<Duration> + 'static,
        G: Fn(&mut EventLoop) + 'static,
    {
        self.create_timer(after, Rc::new(callback), Some(Rc::new(finalizer)))
    }

    fn create_timer(
        &mut self,
        after: Duration,
        callback: Rc<TimerProc>,
        finalizer: Option<Rc<FinalizerProc>>,
    ) -> TimerId {
        let when = self.clock_ms().saturating_add(after.as_millis() as u64);
        let id = self.timers.add(when, callback, finalizer);
        trace!("scheduled timer {:?} to fire in {:?}", id, after);
        id
    }

    /// Cancels the timer with the given id, invoking its finalizer.
    ///
    /// Fails with [`io::ErrorKind::NotFound`] for an unknown id (already
    /// fired one-shots included).
    pub fn del_timer(&mut self, id: TimerId) -> io::Result<()> {
        match self.timers.find(id) {
            Some(node) => {
                let event = self.timers.events.remove(node);
                if let Some(finalizer) = event.finalizer {
                    finalizer(self);
                }
                trace!("deleted timer {:?}", id);
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such timer")),
        }
    }

    /// Performs one tick: sleep in the backend, dispatch ready
    /// descriptors, then fire ripe timers, as selected by `flags`.
    ///
    /// The sleep is bounded by the nearest timer when timers are being
    /// processed, zero with [`Flags::DONT_WAIT`], and unbounded
    /// otherwise. Returns the number of dispatched events.
    pub fn process_events(&mut self, flags: Flags) -> io::Result<usize> {
        let mut processed = 0;

        if !flags.has_file() && !flags.has_time() {
            return Ok(0);
        }

        // The backend is entered even with no descriptor registered when
        // the sleep doubles as the timer wait.
        if self.max_fd != -1 || (flags.has_time() && !flags.dont_wait()) {
            let timeout = if flags.dont_wait() {
                Some(Duration::ZERO)
            } else if flags.has_time() {
                // Sleep until the nearest timer; clamp to zero when it is
                // already overdue (or the clock jumped forward past it).
                self.timers
                    .nearest()
                    .map(|when| Duration::from_millis(when.saturating_sub(self.clock_ms())))
            } else {
                None
            };

            trace!("polling {}; timeout {:?}", Self::backend_name(), timeout);
            let numevents =
                self.selector
                    .poll(&self.events, self.max_fd, timeout, &mut self.fired)?;

            for i in 0..numevents {
                let (fd, fired_mask) = match self.fired.get(i) {
                    Some(entry) => (entry.fd, entry.mask),
                    None => break,
                };

                // An earlier callback in this batch may have deleted or
                // reconfigured this slot, so its mask is consulted again
                // before every call.
                let read_cb = self
                    .events
                    .get(fd as usize)
                    .filter(|slot| (slot.mask & fired_mask).is_readable())
                    .and_then(|slot| slot.read.clone());
                let read_ran = read_cb.is_some();
                if let Some(callback) = read_cb.clone() {
                    trace!("fd {} readable", fd);
                    callback(self, fd, fired_mask);
                }

                let write_cb = self
                    .events
                    .get(fd as usize)
                    .filter(|slot| (slot.mask & fired_mask).is_writable())
                    .and_then(|slot| slot.write.clone());
                if let Some(callback) = write_cb {
                    // One function registered for both directions of a
                    // half-duplex handler runs once, not twice.
                    let duplicate = read_cb
                        .as_ref()
                        .map(|read| Rc::ptr_eq(read, &callback))
                        .unwrap_or(false);
                    if !read_ran || !duplicate {
                        trace!("fd {} writable", fd);
                        callback(self, fd, fired_mask);
                    }
                }

                processed += 1;
            }
        }

        if flags.has_time() {
            processed += self.process_time_events();
        }

        Ok(processed)
    }

    fn process_time_events(&mut self) -> usize {
        let mut processed = 0;
        let now_sec = self.clock_ms() / 1000;

        // A clock that jumped backwards makes every pending timer ripe:
        // firing early is strictly safer than stalling for the length of
        // the skew.
        if now_sec < self.last_time {
            let mut cursor = self.timers.events.cursor(Direction::FromHead);
            while let Some(node) = cursor.next(&self.timers.events) {
                self.timers.events[node].when = 0;
            }
        }
        self.last_time = now_sec;

        // Timers created by callbacks during this pass have ids at or
        // past this bound and wait for the next pass; a callback that
        // schedules an immediate timer cannot pin the loop here.
        let id_bound = self.timers.next_id;

        let mut cursor = self.timers.events.cursor(Direction::FromHead);
        while let Some(node) = cursor.next(&self.timers.events) {
            let event = &self.timers.events[node];
            if event.id >= id_bound {
                continue;
            }
            if self.clock_ms() < event.when {
                continue;
            }

            let id = TimerId(event.id);
            let callback = Rc::clone(&event.callback);
            trace!("firing timer {:?}", id);
            let again = callback(self, id);
            processed += 1;

            // The callback had the loop, so the timer list may be
            // arbitrarily different now: resolve by id, never by node.
            match again {
                Some(period) => {
                    let when = self.clock_ms().saturating_add(period.as_millis() as u64);
                    if let Some(node) = self.timers.find(id) {
                        self.timers.events[node].when = when;
                    }
                }
                None => {
                    let _ = self.del_timer(id);
                }
            }
            cursor.rewind(&self.timers.events);
        }
        processed
    }

    /// Runs the loop until [`stop`](EventLoop::stop) is called: each
    /// iteration invokes the before-sleep hook, then one
    /// [`process_events`](EventLoop::process_events) tick over
    /// [`Flags::ALL`].
    pub fn run(&mut self) -> io::Result<()> {
        self.stop = false;
        while !self.stop {
            if let Some(hook) = self.before_sleep.clone() {
                hook(self);
            }
            self.process_events(Flags::ALL)?;
        }
        Ok(())
    }

    /// Makes [`run`](EventLoop::run) return once the current iteration
    /// completes.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    /// Installs a hook invoked at the top of every [`run`] iteration,
    /// before the loop blocks.
    ///
    /// [`run`]: EventLoop::run
    pub fn set_before_sleep<F>(&mut self, hook: F)
    where
        F: Fn(&mut EventLoop) + 'static,
    {
        self.before_sleep = Some(Rc::new(hook));
    }

    fn clock_ms(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        (now.as_millis() as u64).saturating_add_signed(self.clock_shift)
    }

    #[cfg(test)]
    pub(crate) fn shift_clock(&mut self, delta_ms: i64) {
        self.clock_shift += delta_ms;
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("EventLoop")
            .field("setsize", &self.events.len())
            .field("max_fd", &self.max_fd)
            .field("timers", &self.timers.events.len())
            .field("stop", &self.stop)
            .finish()
    }
}

/// Blocks the current thread until `fd` is ready for one of the
/// directions in `mask`, or `timeout` elapses.
///
/// Standalone and loop-independent; useful for the blocking handshakes a
/// server performs outside its loop. Error and hangup conditions surface
/// as [`Mask::WRITABLE`]. A timeout yields [`Mask::NONE`].
pub fn wait(fd: RawFd, mask: Mask, timeout: Duration) -> io::Result<Mask> {
    let mut pfd = libc::pollfd {
        fd,
        events: 0,
        revents: 0,
    };
    if mask.is_readable() {
        pfd.events |= libc::POLLIN;
    }
    if mask.is_writable() {
        pfd.events |= libc::POLLOUT;
    }
    let millis = std::cmp::min(timeout.as_millis(), libc::c_int::MAX as u128) as libc::c_int;

    let ready = syscall!(poll(&mut pfd, 1, millis))?;
    let mut out = Mask::NONE;
    if ready > 0 {
        if pfd.revents & libc::POLLIN != 0 {
            out |= Mask::READABLE;
        }
        if pfd.revents & libc::POLLOUT != 0 {
            out |= Mask::WRITABLE;
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
            out |= Mask::WRITABLE;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::{EventLoop, Flags};

    #[test]
    fn backwards_clock_fires_every_timer() {
        let mut el = EventLoop::new(8).unwrap();
        let fired = Rc::new(Cell::new(0));
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let fired = Rc::clone(&fired);
                el.add_timer(Duration::from_secs(10), move |_, _| {
                    fired.set(fired.get() + 1);
                    None
                })
            })
            .collect();

        // Nothing is ripe yet on a healthy clock.
        el.process_events(Flags::TIME | Flags::DONT_WAIT).unwrap();
        assert_eq!(fired.get(), 0);

        // Jump the wall clock back an hour; the next pass must fire all
        // three rather than stall them for the skew length.
        el.shift_clock(-3_600_000);
        el.process_events(Flags::TIME | Flags::DONT_WAIT).unwrap();
        assert_eq!(fired.get(), 3);
        for id in ids {
            assert!(el.del_timer(id).is_err());
        }
    }

    #[test]
    fn empty_flags_do_nothing() {
        let mut el = EventLoop::new(8).unwrap();
        el.add_timer(Duration::ZERO, |_, _| None);
        assert_eq!(el.process_events(Flags::DONT_WAIT).unwrap(), 0);
    }
}
