//! A single-threaded, callback-driven readiness event loop.
//!
//! `evio` multiplexes I/O readiness over a set of file descriptors
//! together with user-scheduled timers, invoking plain-closure callbacks
//! as descriptors become ready and timers come due. It is the concurrency
//! core a small networked server is built on: register descriptors and
//! timers, then hand control to [`EventLoop::run`], which blocks in the
//! kernel's readiness primitive until there is work.
//!
//! Readiness is level-triggered and delivered through one of four
//! backends picked at compile time: event ports, epoll, kqueue or
//! select, all presenting identical semantics.
//! [`EventLoop::backend_name`] names the one compiled in.
//!
//! Everything runs on the caller's thread. Callbacks get `&mut
//! EventLoop` and may re-register descriptors, schedule timers, resize
//! the loop or stop it; no locking exists anywhere.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use evio::{EventLoop, Flags, Mask};
//!
//! let mut el = EventLoop::new(64)?;
//!
//! // A periodic heartbeat and a one-shot shutdown timer.
//! el.add_timer(Duration::from_millis(5), |_el, _id| {
//!     log::trace!("tick");
//!     Some(Duration::from_millis(5))
//! });
//! el.add_timer(Duration::from_millis(25), |el, _id| {
//!     el.stop();
//!     None
//! });
//!
//! el.run()?;
//! # Ok::<(), std::io::Error>(())
//! ```

#[macro_use]
mod sys;

mod event;
mod event_loop;
pub mod list;
mod mask;
mod timer;

pub use crate::event_loop::{wait, EventLoop, Flags};
pub use crate::list::List;
pub use crate::mask::Mask;
pub use crate::timer::TimerId;
