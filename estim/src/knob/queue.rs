/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Sequential, non-blocking event scheduling against a single [`Knob`].
//!
//! ```text
//!  producers ──pulse/ramp/callback──► VecDeque<Event> ──► worker task ──► Knob::set
//!                     clear() ──────────┘  (drop all)      │  hold: sleep ⟂ clear
//!                 wait_done() ◄──── idle flag ◄────────────┘
//! ```
//!
//! # Invariants
//! * Events run in enqueue order, one at a time: an event's action and its
//!   hold both finish before the next event is dequeued.
//! * The queue lock is only held to push, pop or clear, never across a
//!   device write, so enqueueing never waits on link latency.
//! * `clear` interrupts the hold of the in-flight event (including one whose
//!   action is still running when `clear` is called) but never an action.
//! * A failed `set` or a panicking callback is logged and the queue keeps
//!   going.
//! * Dropping the queue discards pending events and cuts the hold short, but
//!   lets an in-flight `set` finish so its device exchange completes.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{debug, trace, warn};

use super::Knob;

// ── Event ─────────────────────────────────────────────────────────────────────

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Action {
    Set(f64),
    Callback(Callback),
}

/// One scheduled unit: run `action`, then idle for `hold`.
struct Event {
    hold: Duration,
    action: Action,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Action::Set(value) => write!(f, "Set({value}) for {:?}", self.hold),
            Action::Callback(_) => write!(f, "Callback for {:?}", self.hold),
        }
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    events: Mutex<VecDeque<Event>>,
    /// Wakes an idle worker when work is pushed.
    work: Notify,
    /// Bumped by every `clear`; the worker watches it during holds.
    clear_generation: watch::Sender<u64>,
    /// `true` while the queue is empty and nothing is in flight.  Only
    /// written with `events` locked.
    idle: watch::Sender<bool>,
    /// Set once the owning `KnobQueue` is dropped.
    shutdown: AtomicBool,
}

impl Shared {
    fn events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        // Callbacks never run under this lock, so a poisoned guard still
        // holds a consistent queue.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── KnobQueue ─────────────────────────────────────────────────────────────────

/// A FIFO of timed operations executed by one background worker.
///
/// All methods except [`wait_done`](Self::wait_done) return immediately.
/// The worker is a tokio task started by [`new`](Self::new).  Dropping the
/// queue stops it after the action in flight, if any, completes.
pub struct KnobQueue {
    knob: Arc<dyn Knob>,
    shared: Arc<Shared>,
}

impl KnobQueue {
    /// Starts the worker for `knob`.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn new(knob: Arc<dyn Knob>) -> Self {
        let (clear_generation, _) = watch::channel(0);
        let (idle, _) = watch::channel(true);
        let shared = Arc::new(Shared {
            events: Mutex::new(VecDeque::new()),
            work: Notify::new(),
            clear_generation,
            idle,
            shutdown: AtomicBool::new(false),
        });

        tokio::spawn(run_worker(Arc::clone(&knob), Arc::clone(&shared)));

        Self { knob, shared }
    }

    /// The knob this queue drives.
    pub fn knob(&self) -> &Arc<dyn Knob> {
        &self.knob
    }

    pub fn resolution(&self) -> f64 {
        self.knob.resolution()
    }

    /// Events queued but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.events().len()
    }

    // ── Producers ─────────────────────────────────────────────────────────────

    /// Queues `f` to run between the surrounding events, with no hold.
    pub fn callback<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(std::iter::once(Event {
            hold: Duration::ZERO,
            action: Action::Callback(Box::new(f)),
        }));
    }

    /// Queues "set the knob to `value`, then hold for `hold`".
    pub fn pulse(&self, value: f64, hold: Duration) {
        trace!("Pulse of {value} for {hold:?}");
        self.push(std::iter::once(Event {
            hold,
            action: Action::Set(value),
        }));
    }

    /// Queues a stepped sweep from `start` towards `end` lasting `duration`.
    ///
    /// The sweep is `floor(|end - start| / resolution)` pulses, each one
    /// resolution step from the previous and held `duration / steps`.  The
    /// first pulse is at `start`; the last lands within one step of `end`.
    /// A range narrower than one step, or a non-finite endpoint, queues
    /// nothing.
    ///
    /// All steps are queued atomically with respect to [`clear`](Self::clear).
    pub fn ramp(&self, start: f64, end: f64, duration: Duration) {
        if !start.is_finite() || !end.is_finite() {
            warn!("Ignoring ramp with non-finite endpoint: {start} → {end}");
            return;
        }
        let resolution = self.resolution();
        let steps = ((end - start).abs() / resolution) as u32;
        if steps == 0 {
            debug!("Ramp {start} → {end} is below knob resolution, skipping");
            return;
        }

        let step = resolution.copysign(end - start);
        let hold = duration / steps;
        debug!("Ramp {start} → {end} over {duration:?}: {steps} step(s) of {hold:?}");

        let mut value = start;
        self.push((0..steps).map(|_| {
            let event = Event {
                hold,
                action: Action::Set(value),
            };
            value += step;
            event
        }));
    }

    fn push(&self, events: impl Iterator<Item = Event>) {
        let mut queue = self.shared.events();
        let before = queue.len();
        queue.extend(events);
        if queue.len() > before {
            self.shared.idle.send_replace(false);
        }
        drop(queue);
        self.shared.work.notify_one();
    }

    // ── Control ───────────────────────────────────────────────────────────────

    /// Drops every queued event and cuts the current hold short.
    ///
    /// An action that is already running finishes normally.  Other queues,
    /// even ones sharing the same device, are unaffected.
    pub fn clear(&self) {
        let mut queue = self.shared.events();
        let dropped = queue.len();
        queue.clear();
        self.shared.clear_generation.send_modify(|g| *g = g.wrapping_add(1));
        drop(queue);
        debug!("Cleared {dropped} pending event(s)");
    }

    /// Resolves once the queue has been idle (empty, nothing in flight) at
    /// some point after this call.  Any number of tasks may wait at once.
    ///
    /// New work may already be queued by the time this returns.
    pub async fn wait_done(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail.
        let _ = idle.wait_for(|&is_idle| is_idle).await;
    }
}

impl Drop for KnobQueue {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.clear();
        self.shared.work.notify_one();
    }
}

impl fmt::Debug for KnobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnobQueue")
            .field("pending", &self.pending())
            .field("idle", &*self.shared.idle.borrow())
            .finish_non_exhaustive()
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

async fn run_worker(knob: Arc<dyn Knob>, shared: Arc<Shared>) {
    let mut cleared = shared.clear_generation.subscribe();

    loop {
        let next = {
            let mut queue = shared.events();
            let next = queue.pop_front();
            if next.is_none() {
                shared.idle.send_replace(true);
            }
            // `clear` bumps the generation under this lock, so any clear
            // after the pop is still unseen and will cut the hold short.
            cleared.borrow_and_update();
            next
        };

        let Some(event) = next else {
            if shared.shutdown.load(Ordering::Acquire) {
                trace!("Queue dropped, worker exiting");
                return;
            }
            shared.work.notified().await;
            continue;
        };
        trace!("Running {event:?}");

        match event.action {
            Action::Set(value) => {
                if let Err(e) = knob.set(value).await {
                    warn!("Set to {value} failed, continuing with queue: {e}");
                }
            }
            Action::Callback(f) => {
                if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
                    warn!("Callback panicked, continuing with queue");
                }
            }
        }

        if event.hold.is_zero() {
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(event.hold) => {}
            _ = cleared.changed() => trace!("Hold interrupted by clear"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::knob::REGISTER_RESOLUTION;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use tokio::time::{timeout, Instant};

    // ── Test helpers ──────────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Set(f64),
        Call(&'static str),
    }

    type Log = Arc<Mutex<Vec<Step>>>;

    /// Records every completed `set`; optionally takes `latency` per set and
    /// fails sets of one specific value.
    struct RecordingKnob {
        log: Log,
        fail_on: Option<f64>,
        latency: Duration,
    }

    #[async_trait]
    impl Knob for RecordingKnob {
        async fn set(&self, value: f64) -> Result<(), DeviceError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.log.lock().unwrap().push(Step::Set(value));
            if self.fail_on == Some(value) {
                return Err(DeviceError::Transport(TransportError::Closed));
            }
            Ok(())
        }

        fn resolution(&self) -> f64 {
            REGISTER_RESOLUTION
        }
    }

    fn queue_with_log(fail_on: Option<f64>) -> (KnobQueue, Log) {
        let log: Log = Arc::default();
        let knob = RecordingKnob {
            log: Arc::clone(&log),
            fail_on,
            latency: Duration::ZERO,
        };
        (KnobQueue::new(Arc::new(knob)), log)
    }

    fn slow_queue(latency: Duration) -> (KnobQueue, Log) {
        let log: Log = Arc::default();
        let knob = RecordingKnob {
            log: Arc::clone(&log),
            fail_on: None,
            latency,
        };
        (KnobQueue::new(Arc::new(knob)), log)
    }

    fn call(log: &Log, tag: &'static str) -> impl FnOnce() + Send + 'static {
        let log = Arc::clone(log);
        move || log.lock().unwrap().push(Step::Call(tag))
    }

    fn set_values(log: &Log) -> Vec<f64> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Step::Set(v) => Some(*v),
                Step::Call(_) => None,
            })
            .collect()
    }

    const PROMPT: Duration = Duration::from_millis(100);

    // ── Ordering ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn callback_runs_strictly_between_pulses() {
        let (queue, log) = queue_with_log(None);

        queue.pulse(0.1, Duration::from_millis(5));
        queue.callback(call(&log, "between"));
        queue.pulse(0.3, Duration::from_millis(5));
        queue.wait_done().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![Step::Set(0.1), Step::Call("between"), Step::Set(0.3)]
        );
    }

    #[tokio::test]
    async fn pulse_holds_before_next_event() {
        let (queue, log) = queue_with_log(None);
        let hold = Duration::from_millis(30);

        let started = Instant::now();
        queue.pulse(0.5, hold);
        queue.callback(call(&log, "after"));
        queue.wait_done().await;

        assert!(started.elapsed() >= hold);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    // ── Ramp ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn ramp_queues_one_pulse_per_resolution_step() {
        let (queue, log) = queue_with_log(None);
        let (start, end) = (0.2, 0.4);
        let duration = Duration::from_millis(150);
        let expected_steps = ((end - start) / REGISTER_RESOLUTION) as u32;
        assert!((50..=51).contains(&expected_steps));

        let started = Instant::now();
        queue.ramp(start, end, duration);
        queue.wait_done().await;
        let elapsed = started.elapsed();

        let values = set_values(&log);
        assert_eq!(values.len(), expected_steps as usize);
        assert_eq!(values[0], start);
        for pair in values.windows(2) {
            assert!(pair[1] > pair[0], "ramp must be monotone: {pair:?}");
        }
        for v in &values {
            assert!(*v >= start - REGISTER_RESOLUTION && *v <= end + REGISTER_RESOLUTION);
        }
        // holds sum to at most `duration` and are all honoured
        let hold = duration / expected_steps;
        assert!(hold * expected_steps <= duration);
        assert!(elapsed >= hold * expected_steps);
    }

    #[tokio::test]
    async fn descending_ramp_steps_down() {
        let (queue, log) = queue_with_log(None);

        queue.ramp(0.3, 0.25, Duration::from_millis(20));
        queue.wait_done().await;

        let values = set_values(&log);
        assert_eq!(values.len(), ((0.3f64 - 0.25) / REGISTER_RESOLUTION) as usize);
        assert_eq!(values[0], 0.3);
        for pair in values.windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[tokio::test]
    async fn zero_width_ramp_is_noop() {
        let (queue, log) = queue_with_log(None);

        queue.ramp(0.5, 0.5, Duration::from_secs(10));
        queue.ramp(0.5, 0.5 + REGISTER_RESOLUTION / 2.0, Duration::from_secs(10));
        assert_eq!(queue.pending(), 0);

        timeout(PROMPT, queue.wait_done())
            .await
            .expect("nothing was queued");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ramp_with_non_finite_endpoint_is_ignored() {
        let (queue, log) = queue_with_log(None);

        queue.ramp(0.0, f64::INFINITY, Duration::from_secs(1));
        queue.ramp(f64::NAN, 0.5, Duration::from_secs(1));
        queue.ramp(f64::NEG_INFINITY, 0.0, Duration::from_secs(1));
        assert_eq!(queue.pending(), 0);

        timeout(PROMPT, queue.wait_done()).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ramp_queues_behind_in_flight_event() {
        let (queue, _log) = queue_with_log(None);

        // Worker is parked on a long hold, so nothing below is dequeued.
        queue.pulse(0.0, Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.ramp(0.0, 10.0 * REGISTER_RESOLUTION + 1e-9, Duration::from_millis(100));
        assert_eq!(queue.pending(), 10);
        queue.clear();
    }

    // ── Clear ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn clear_mid_sequence_drains_promptly() {
        let (queue, log) = queue_with_log(None);

        for i in 0..100 {
            queue.pulse(f64::from(i) / 100.0, Duration::from_millis(50));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.clear();
        assert_eq!(queue.pending(), 0);
        timeout(PROMPT, queue.wait_done())
            .await
            .expect("wait_done must return promptly after clear");
        assert_eq!(set_values(&log), vec![0.0]);
    }

    #[tokio::test]
    async fn clear_during_set_lets_set_finish_and_skips_hold() {
        let (queue, log) = slow_queue(Duration::from_millis(40));

        queue.pulse(0.5, Duration::from_secs(10));
        queue.pulse(0.9, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(log.lock().unwrap().is_empty(), "set still in flight");

        queue.clear();
        timeout(Duration::from_millis(500), queue.wait_done())
            .await
            .expect("hold after the in-flight set must be cut short");
        assert_eq!(set_values(&log), vec![0.5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clear_right_after_dequeue_still_cuts_hold() {
        let (queue, _log) = queue_with_log(None);

        for _ in 0..200 {
            queue.pulse(0.5, Duration::from_secs(10));
            tokio::task::yield_now().await;
            queue.clear();
            timeout(Duration::from_secs(1), queue.wait_done())
                .await
                .expect("clear must never miss the hold of a just-dequeued event");
        }
    }

    #[tokio::test]
    async fn queue_accepts_work_after_clear() {
        let (queue, log) = queue_with_log(None);

        queue.clear(); // clearing an idle queue is harmless
        queue.pulse(0.1, Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear();

        queue.pulse(0.2, Duration::ZERO);
        timeout(PROMPT, queue.wait_done()).await.unwrap();
        assert_eq!(set_values(&log), vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn clear_does_not_touch_other_queues() {
        let (a, _log_a) = queue_with_log(None);
        let (b, log_b) = queue_with_log(None);

        a.pulse(0.1, Duration::from_secs(10));
        b.pulse(0.2, Duration::from_millis(20));
        b.pulse(0.3, Duration::ZERO);
        a.clear();

        b.wait_done().await;
        assert_eq!(set_values(&log_b), vec![0.2, 0.3]);
    }

    // ── wait_done ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn wait_done_on_idle_queue_returns_immediately() {
        let (queue, _log) = queue_with_log(None);
        timeout(PROMPT, queue.wait_done()).await.unwrap();
    }

    #[tokio::test]
    async fn wait_done_releases_every_waiter() {
        let (queue, log) = queue_with_log(None);
        let queue = Arc::new(queue);

        for _ in 0..3 {
            queue.pulse(0.5, Duration::from_millis(15));
        }
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.wait_done().await })
            })
            .collect();

        for waiter in waiters {
            timeout(Duration::from_secs(2), waiter)
                .await
                .expect("waiter released")
                .unwrap();
        }
        assert_eq!(set_values(&log).len(), 3);
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn panicking_callback_does_not_stop_the_worker() {
        let (queue, log) = queue_with_log(None);

        queue.callback(|| panic!("callback blew up"));
        queue.callback(call(&log, "later"));
        queue.pulse(0.4, Duration::ZERO);

        timeout(Duration::from_secs(2), queue.wait_done())
            .await
            .expect("worker must survive a panicking callback");
        assert_eq!(
            *log.lock().unwrap(),
            vec![Step::Call("later"), Step::Set(0.4)]
        );
        assert_eq!(queue.pending(), 0);
    }

    // ── Drop ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn drop_mid_set_lets_the_set_complete() {
        let (queue, log) = slow_queue(Duration::from_millis(40));

        queue.pulse(0.5, Duration::from_secs(10));
        queue.pulse(0.9, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(queue);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(set_values(&log), vec![0.5], "pending pulses are discarded");
    }

    #[tokio::test]
    async fn dropped_queue_releases_its_knob() {
        let (queue, _log) = queue_with_log(None);
        let knob = Arc::clone(queue.knob());

        queue.pulse(0.5, Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(queue);

        timeout(PROMPT, async {
            while Arc::strong_count(&knob) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker exits once the queue is dropped");
    }

    #[tokio::test]
    async fn failed_set_does_not_strand_the_queue() {
        let (queue, log) = queue_with_log(Some(0.25));

        queue.pulse(0.25, Duration::ZERO);
        queue.callback(call(&log, "still runs"));
        queue.pulse(0.75, Duration::ZERO);
        queue.wait_done().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![Step::Set(0.25), Step::Call("still runs"), Step::Set(0.75)]
        );
    }
}
