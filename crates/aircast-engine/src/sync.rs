// crates/aircast-engine/src/sync.rs
//
// One-shot promise/reply pairs and the loop pacing timer.
//
// `Reply<T>` is the engine's future: a single-use receiver a worker thread
// satisfies exactly once. Consumer `send` and the image mixer's flush
// return these; everything else in the control surface is synchronous.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

pub struct Promise<T> {
    tx: Sender<T>,
}

pub struct Reply<T> {
    rx: Receiver<T>,
}

/// Create a linked promise/reply pair.
pub fn oneshot<T>() -> (Promise<T>, Reply<T>) {
    let (tx, rx) = bounded(1);
    (Promise { tx }, Reply { rx })
}

/// A reply that is already satisfied.
pub fn ready<T>(value: T) -> Reply<T> {
    let (promise, reply) = oneshot();
    promise.set(value);
    reply
}

impl<T> Promise<T> {
    /// Satisfy the reply. A dropped receiver is fine — the waiter gave up.
    pub fn set(self, value: T) {
        let _ = self.tx.send(value);
    }
}

impl<T> Reply<T> {
    /// Block until the value arrives. `None` when the promise was dropped
    /// unsatisfied (worker died before answering).
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Non-blocking poll.
    pub fn try_wait(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Block with a timeout.
    pub fn wait_timeout(self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Paces a loop to a fixed interval against wall-clock deadlines rather
/// than sleeping a fixed amount, so per-tick jitter does not accumulate.
pub struct PaceTimer {
    deadline: Option<Instant>,
}

impl PaceTimer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Sleep until the current deadline, then arm the next one `interval`
    /// away. The first call returns immediately and just arms.
    pub fn tick(&mut self, interval: Duration) {
        let now = Instant::now();
        match self.deadline {
            None => self.deadline = Some(now + interval),
            Some(deadline) => {
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
                // If we overran, re-base on now instead of chasing an
                // unreachable schedule.
                let base = deadline.max(now - interval);
                self.deadline = Some(base + interval);
            }
        }
    }

    /// Drop the schedule (e.g. a clocked consumer appeared).
    pub fn reset(&mut self) {
        self.deadline = None;
    }
}

impl Default for PaceTimer {
    fn default() -> Self {
        Self::new()
    }
}
