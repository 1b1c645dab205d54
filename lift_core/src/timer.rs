//! Cancellable periodic tick sources.
//!
//! A [`TickSource`] calls a callback every interval until the returned
//! [`TickHandle`] is cancelled or dropped. Once `cancel` returns, the
//! callback is never invoked again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback invoked on every tick
pub type TickCallback = Box<dyn FnMut() + Send + 'static>;

/// Something that can drive a periodic callback
pub trait TickSource: Send {
    fn schedule(&self, every: Duration, callback: TickCallback) -> TickHandle;
}

/// Owner of a running tick schedule
pub struct TickHandle {
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TickHandle {
    fn new(cancelled: Arc<AtomicBool>, worker: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, worker }
    }

    /// Stop the schedule, waiting for an in-flight callback to return
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                tracing::warn!("Tick thread panicked");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Ticks from a background thread at a fixed interval
#[derive(Clone, Copy, Debug, Default)]
pub struct IntervalTicker;

impl TickSource for IntervalTicker {
    fn schedule(&self, every: Duration, mut callback: TickCallback) -> TickHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let worker = thread::spawn(move || loop {
            let deadline = Instant::now() + every;
            // park_timeout can wake early; keep waiting until the deadline
            loop {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
            if flag.load(Ordering::SeqCst) {
                return;
            }
            callback();
        });

        TickHandle::new(cancelled, Some(worker))
    }
}

struct Slot {
    cancelled: Arc<AtomicBool>,
    callback: TickCallback,
}

/// Test tick source: nothing happens until [`ManualTicker::fire`] is called
#[derive(Clone, Default)]
pub struct ManualTicker {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `count` ticks to every live schedule
    pub fn fire(&self, count: usize) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..count {
            slots.retain(|slot| !slot.cancelled.load(Ordering::SeqCst));
            for slot in slots.iter_mut() {
                (slot.callback)();
            }
        }
    }

    /// Number of schedules that have not been cancelled
    pub fn live_schedules(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .iter()
            .filter(|slot| !slot.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl TickSource for ManualTicker {
    fn schedule(&self, _every: Duration, callback: TickCallback) -> TickHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Slot {
                cancelled: Arc::clone(&cancelled),
                callback,
            });
        TickHandle::new(cancelled, None)
    }
}
