//! `SyntheticTransport`: a non-goal-exempt test double. It performs no
//! device I/O and exists purely for the test tooling ambient concern
//! (property tests and the seed scenarios of spec.md §8) — not a real
//! USB backend.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{DeviceObservation, SharedTransportState, Status, Transport};

struct StopSignal {
    lock: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        StopSignal { lock: Mutex::new(false), cv: Condvar::new() }
    }

    fn signal(&self) {
        let mut stopped = self.lock.lock().unwrap();
        *stopped = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut stopped = self.lock.lock().unwrap();
        while !*stopped {
            stopped = self.cv.wait(stopped).unwrap();
        }
    }
}

/// Drives `SharedTransportState` from a background thread at a
/// configurable rate, used by property tests and end-to-end scenarios.
///
/// `device_rate` device-frames advance per second of wall time, scaled
/// by `drift_factor` (1.0 = exact device sample rate, matching spec.md
/// scenario 3's "0.02% fast" drift injection at `drift_factor =
/// 48010.0/48000.0`). `worker_period` is the simulated USB worker's
/// wakeup interval.
pub struct SyntheticTransport {
    state: Arc<SharedTransportState>,
    device_rate: f64,
    drift_factor: f64,
    worker_period: Duration,
    withhold: Arc<AtomicBool>,
    frames_advanced: Arc<AtomicI64>,
    stop: Arc<StopSignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticTransport {
    pub fn new(device_rate: f64, drift_factor: f64, worker_period: Duration) -> Self {
        SyntheticTransport {
            state: Arc::new(SharedTransportState::new()),
            device_rate,
            drift_factor,
            worker_period,
            withhold: Arc::new(AtomicBool::new(false)),
            frames_advanced: Arc::new(AtomicI64::new(0)),
            stop: Arc::new(StopSignal::new()),
            handle: Mutex::new(None),
        }
    }

    /// Stops publishing new observations without touching `status`, to
    /// model spec.md scenario 4 (transport starvation).
    pub fn withhold(&self, withheld: bool) {
        self.withhold.store(withheld, Ordering::SeqCst);
    }

    pub fn frames_advanced(&self) -> i64 {
        self.frames_advanced.load(Ordering::SeqCst)
    }
}

impl Transport for SyntheticTransport {
    fn state(&self) -> &SharedTransportState {
        &self.state
    }

    fn run(&self) {
        let state = Arc::clone(&self.state);
        let withhold = Arc::clone(&self.withhold);
        let frames_advanced = Arc::clone(&self.frames_advanced);
        let stop = Arc::clone(&self.stop);
        let rate = self.device_rate * self.drift_factor;
        let period = self.worker_period;

        let start = Instant::now();
        let mut handle_guard = self.handle.lock().unwrap();
        *handle_guard = Some(thread::spawn(move || {
            let mut count: i64 = 0;
            loop {
                if state.status() == Status::Stop {
                    stop.signal();
                    return;
                }
                thread::sleep(period);
                if !withhold.load(Ordering::SeqCst) {
                    let elapsed = start.elapsed().as_secs_f64();
                    count = (elapsed * rate) as i64;
                    frames_advanced.store(count, Ordering::SeqCst);
                    state.publish_observation(DeviceObservation {
                        frame_count: count,
                        time_secs: elapsed,
                    });
                }
            }
        }));
    }

    fn wait_until_stopped(&self) {
        self.stop.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_advancing_observations() {
        let t = SyntheticTransport::new(48_000.0, 1.0, Duration::from_millis(1));
        t.run();
        thread::sleep(Duration::from_millis(20));
        let (obs0, obs1) = t.snapshot();
        assert!(obs1.frame_count >= obs0.frame_count);
        t.set_status(Status::Stop);
        t.wait_until_stopped();
    }

    #[test]
    fn withholding_freezes_observations() {
        let t = SyntheticTransport::new(48_000.0, 1.0, Duration::from_millis(1));
        t.run();
        thread::sleep(Duration::from_millis(10));
        t.withhold(true);
        let (_, before) = t.snapshot();
        thread::sleep(Duration::from_millis(10));
        let (_, after) = t.snapshot();
        assert_eq!(before.frame_count, after.frame_count);
        t.set_status(Status::Stop);
        t.wait_until_stopped();
    }
}
