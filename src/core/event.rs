//! # Manual-Reset Event
//!
//! A small signalling primitive built on `Mutex` + `Condvar`. Once set, an
//! event stays set until explicitly reset, and every waiter (past or future)
//! observes it as signalled. This is the wake-up mechanism behind task
//! completion, queue "non-empty" notifications and thread exit requests.
//!
//! Besides the usual single-event waits, [`wait_any`] blocks on several
//! events at once and reports which one fired. Worker threads use this to
//! sleep on "exit requested OR new work available" with a single blocking
//! call.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

/// A clonable, thread-safe manual-reset event.
///
/// Clones share the same underlying state: setting the event through one
/// clone wakes waiters blocked through any other clone.
///
/// # Examples
/// ```
/// use std::thread;
/// use task_dispatch::core::ManualResetEvent;
///
/// let event = ManualResetEvent::new(false);
/// let signal = event.clone();
///
/// let waiter = thread::spawn(move || signal.wait());
/// event.set();
/// waiter.join().unwrap();
/// ```
#[derive(Clone)]
pub struct ManualResetEvent {
    inner: Arc<EventInner>,
}

struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

struct EventState {
    set: bool,
    // Waiters registered by `wait_any`, woken on the next `set`.
    waiters: Vec<(usize, Weak<WaitNode>)>,
}

// One multi-wait in progress. `fired` records the index of the first event
// that signalled it.
struct WaitNode {
    fired: Mutex<Option<usize>>,
    cond: Condvar,
}

impl ManualResetEvent {
    /// Creates a new event in the given state.
    pub fn new(initially_set: bool) -> Self {
        Self {
            inner: Arc::new(EventInner {
                state: Mutex::new(EventState {
                    set: initially_set,
                    waiters: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Signals the event, waking every current waiter. The event stays
    /// signalled until [`reset`](Self::reset) is called.
    pub fn set(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.set = true;
        self.inner.cond.notify_all();
        for (index, waiter) in state.waiters.drain(..) {
            if let Some(node) = waiter.upgrade() {
                node.fire(index);
            }
        }
    }

    /// Returns the event to the non-signalled state.
    pub fn reset(&self) {
        self.inner.state.lock().unwrap().set = false;
    }

    /// Returns whether the event is currently signalled, without blocking.
    pub fn is_set(&self) -> bool {
        self.inner.state.lock().unwrap().set
    }

    /// Blocks the calling thread until the event is signalled.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while !state.set {
            state = self.inner.cond.wait(state).unwrap();
        }
    }

    /// Blocks until the event is signalled or `timeout` elapses.
    ///
    /// Returns `true` when the event was signalled within the timeout and
    /// `false` on expiry.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();
        while !state.set {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => return false,
            };
            let (next, result) = self.inner.cond.wait_timeout(state, remaining).unwrap();
            state = next;
            if result.timed_out() && !state.set {
                return false;
            }
        }
        true
    }

    /// Registers a multi-wait node. Returns `true` when the event is already
    /// set, in which case nothing is registered.
    fn register(&self, index: usize, node: &Arc<WaitNode>) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if state.set {
            return true;
        }
        state.waiters.retain(|(_, w)| w.strong_count() > 0);
        state.waiters.push((index, Arc::downgrade(node)));
        false
    }
}

impl WaitNode {
    fn fire(&self, index: usize) {
        let mut fired = self.fired.lock().unwrap();
        if fired.is_none() {
            *fired = Some(index);
        }
        self.cond.notify_all();
    }
}

/// Blocks until one of `events` is signalled, or until `timeout` elapses when
/// one is given.
///
/// Returns the index of a signalled event, or `None` on timeout. When several
/// events are already set the lowest index wins. A wake-up is reported even
/// if the event has been reset again by the time the caller runs; callers are
/// expected to re-check their own condition, the way a worker re-checks its
/// queue after waking.
pub fn wait_any(events: &[&ManualResetEvent], timeout: Option<Duration>) -> Option<usize> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let node = Arc::new(WaitNode {
        fired: Mutex::new(None),
        cond: Condvar::new(),
    });

    for (index, event) in events.iter().enumerate() {
        if event.register(index, &node) {
            return Some(index);
        }
    }

    let mut fired = node.fired.lock().unwrap();
    loop {
        if let Some(index) = *fired {
            return Some(index);
        }
        match deadline {
            Some(deadline) => {
                let remaining = deadline.checked_duration_since(Instant::now())?;
                let (next, result) = node.cond.wait_timeout(fired, remaining).unwrap();
                fired = next;
                if result.timed_out() && fired.is_none() {
                    return None;
                }
            }
            None => {
                fired = node.cond.wait(fired).unwrap();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_in_requested_state() {
        assert!(!ManualResetEvent::new(false).is_set());
        assert!(ManualResetEvent::new(true).is_set());
    }

    #[test]
    fn set_is_sticky_until_reset() {
        let event = ManualResetEvent::new(false);
        event.set();
        assert!(event.is_set());
        assert!(event.wait_timeout(Duration::from_millis(1)));
        // A second waiter still sees the signalled state.
        assert!(event.wait_timeout(Duration::from_millis(1)));
        event.reset();
        assert!(!event.is_set());
    }

    #[test]
    fn wait_unblocks_on_set_from_another_thread() {
        let event = ManualResetEvent::new(false);
        let signal = event.clone();

        let waiter = thread::spawn(move || {
            signal.wait();
            true
        });

        thread::sleep(Duration::from_millis(20));
        event.set();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_timeout_expires() {
        let event = ManualResetEvent::new(false);
        let started = Instant::now();
        assert!(!event.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_any_returns_already_set_event() {
        let a = ManualResetEvent::new(false);
        let b = ManualResetEvent::new(true);
        assert_eq!(wait_any(&[&a, &b], None), Some(1));
    }

    #[test]
    fn wait_any_prefers_lowest_index() {
        let a = ManualResetEvent::new(true);
        let b = ManualResetEvent::new(true);
        assert_eq!(wait_any(&[&a, &b], None), Some(0));
    }

    #[test]
    fn wait_any_wakes_on_later_set() {
        let a = ManualResetEvent::new(false);
        let b = ManualResetEvent::new(false);
        let signal = b.clone();

        let waiter = {
            let a = a.clone();
            let b = b.clone();
            thread::spawn(move || wait_any(&[&a, &b], Some(Duration::from_secs(5))))
        };

        thread::sleep(Duration::from_millis(20));
        signal.set();
        assert_eq!(waiter.join().unwrap(), Some(1));
    }

    #[test]
    fn wait_any_times_out() {
        let a = ManualResetEvent::new(false);
        let b = ManualResetEvent::new(false);
        assert_eq!(wait_any(&[&a, &b], Some(Duration::from_millis(30))), None);
    }
}
