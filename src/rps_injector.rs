//! Fixed-rate request injector (RPS mode). Replaces the message thread loop
//! when `requests_per_sec > 0`: instead of echoing worker-initiated pushes,
//! it pushes `Request` tokens onto workers' own request lists at a paced
//! rate and wakes them directly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock;
use crate::config::Config;
use crate::worker::{Request, WorkerState};

const USEC_PER_SEC: u64 = 1_000_000;
const BATCH: u32 = 8;
const PENDING_BACKPRESSURE_LIMIT: u32 = 8;

pub struct RpsInjector {
    pub workers: Vec<Arc<WorkerState>>,
    pub cfg: Arc<Config>,
    pub message_threads: usize,
    pub stopping: Arc<AtomicBool>,
    rr_index: AtomicUsize,
}

impl RpsInjector {
    pub fn new(workers: Vec<Arc<WorkerState>>, cfg: Arc<Config>, message_threads: usize, stopping: Arc<AtomicBool>) -> Self {
        RpsInjector {
            workers,
            cfg,
            message_threads: message_threads.max(1),
            stopping,
            rr_index: AtomicUsize::new(0),
        }
    }

    pub fn run(self) {
        loop {
            let start = clock::now_us();
            let global_r = self.cfg.requests_per_sec();
            let local_r = global_r / self.message_threads as u32;

            if local_r > 0 {
                let sleep_time_us = (USEC_PER_SEC / local_r as u64) * BATCH as u64;
                for i in 0..local_r {
                    self.inject_one();
                    if (i + 1) % BATCH == 0 {
                        std::thread::sleep(Duration::from_micros(sleep_time_us));
                    }
                }
            }

            if self.stopping.load(Ordering::Acquire) {
                for w in &self.workers {
                    w.gate.post();
                }
                return;
            }

            let elapsed = clock::now_us().saturating_sub(start);
            if elapsed < USEC_PER_SEC {
                std::thread::sleep(Duration::from_micros(USEC_PER_SEC - elapsed));
            } else if elapsed > USEC_PER_SEC {
                log::warn!(
                    "RPS injector falling behind target: {}us to inject {} requests, budget was {}us",
                    elapsed,
                    local_r,
                    USEC_PER_SEC
                );
            }
        }
    }

    fn inject_one(&self) {
        let w = self.next_worker();
        if w.pending.load(Ordering::Relaxed) > PENDING_BACKPRESSURE_LIMIT {
            // Backpressure: this worker already has more than it can chew
            // through; skip this injection rather than queue unbounded.
            return;
        }
        w.pending.fetch_add(1, Ordering::Relaxed);

        let now = clock::now_us();
        let req = Box::into_raw(Box::new(Request::new(now)));
        w.push_request(req);
        w.wake_time_us.store(now, Ordering::Relaxed);
        w.gate.post();
    }

    fn next_worker(&self) -> &Arc<WorkerState> {
        let n = self.workers.len();
        let idx = self.rr_index.fetch_add(1, Ordering::Relaxed) % n;
        &self.workers[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawArgs;
    use clap::Parser;

    fn test_config(rps: &str) -> Arc<Config> {
        let raw = RawArgs::parse_from(["schedbench", "-F", "16", "-n", "1", "-R", rps]);
        Arc::new(Config::from_args(raw).unwrap())
    }

    #[test]
    fn round_robin_visits_every_worker_in_order() {
        let cfg = test_config("100");
        let workers: Vec<_> = (0..4).map(|_| Arc::new(WorkerState::new(&cfg))).collect();
        let injector = RpsInjector::new(workers.clone(), cfg, 1, Arc::new(AtomicBool::new(false)));
        let seen: Vec<usize> = (0..8)
            .map(|_| {
                let w = injector.next_worker();
                workers.iter().position(|x| Arc::ptr_eq(x, w)).unwrap()
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn backpressure_skips_overloaded_worker() {
        let cfg = test_config("100");
        let workers = vec![Arc::new(WorkerState::new(&cfg))];
        workers[0].pending.store(9, Ordering::Relaxed);
        let injector = RpsInjector::new(workers.clone(), cfg, 1, Arc::new(AtomicBool::new(false)));
        injector.inject_one();
        // pending should be untouched since the injection was skipped.
        assert_eq!(workers[0].pending.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn inject_one_increments_pending_and_posts_gate() {
        let cfg = test_config("100");
        let workers = vec![Arc::new(WorkerState::new(&cfg))];
        workers[0].gate.arm();
        let injector = RpsInjector::new(workers.clone(), cfg, 1, Arc::new(AtomicBool::new(false)));
        injector.inject_one();
        assert_eq!(workers[0].pending.load(Ordering::Relaxed), 1);
        // gate should now be RUNNING (post succeeded); a fresh wait returns
        // immediately rather than parking.
        assert_eq!(workers[0].gate.wait(Some(Duration::from_millis(100))), crate::block_gate::WaitResult::Ok);
    }

    #[test]
    fn stopping_posts_every_worker_gate() {
        let cfg = test_config("100");
        let workers: Vec<_> = (0..3).map(|_| Arc::new(WorkerState::new(&cfg))).collect();
        for w in &workers {
            w.gate.arm();
        }
        let stopping = Arc::new(AtomicBool::new(true));
        let injector = RpsInjector::new(workers.clone(), cfg, 1, stopping);
        injector.run();
        for w in &workers {
            assert_eq!(w.gate.wait(Some(Duration::from_millis(50))), crate::block_gate::WaitResult::Ok);
        }
    }
}
