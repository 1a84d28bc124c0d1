use std::rc::Rc;
use std::time::Duration;

use crate::list::{List, NodeId};
use crate::EventLoop;

/// Identifier of a scheduled timer.
///
/// Identifiers are assigned densely and strictly increasing; within one
/// loop's lifetime an identifier is never reused, so a stale id held
/// after its timer fired simply fails to resolve.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct TimerId(pub(crate) u64);

/// Callback invoked when a timer comes due. Returning `Some(period)`
/// reschedules the timer that far into the future; `None` ends it.
pub(crate) type TimerProc = dyn Fn(&mut EventLoop, TimerId) -> Option<Duration>;

/// Hook invoked when a timer is removed, either explicitly or after a
/// one-shot firing.
pub(crate) type FinalizerProc = dyn Fn(&mut EventLoop);

pub(crate) struct TimeEvent {
    pub(crate) id: u64,
    // Absolute wall-clock fire time, in whole milliseconds.
    pub(crate) when: u64,
    pub(crate) callback: Rc<TimerProc>,
    pub(crate) finalizer: Option<Rc<FinalizerProc>>,
}

/// The pending-timer collection: unsorted, prepend-on-create, scanned
/// linearly. Fine for the handful of timers an event-driven server keeps;
/// a min-heap is the upgrade path if that ever changes.
pub(crate) struct Timers {
    pub(crate) events: List<TimeEvent>,
    pub(crate) next_id: u64,
}

impl Timers {
    pub(crate) fn new() -> Timers {
        Timers {
            events: List::new(),
            next_id: 0,
        }
    }

    pub(crate) fn add(
        &mut self,
        when: u64,
        callback: Rc<TimerProc>,
        finalizer: Option<Rc<FinalizerProc>>,
    ) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push_front(TimeEvent {
            id,
            when,
            callback,
            finalizer,
        });
        TimerId(id)
    }

    pub(crate) fn find(&self, id: TimerId) -> Option<NodeId> {
        self.events.find(|event| event.id == id.0)
    }

    /// Fire time of the timer due soonest, if any.
    pub(crate) fn nearest(&self) -> Option<u64> {
        self.events.iter().map(|event| event.when).min()
    }
}
