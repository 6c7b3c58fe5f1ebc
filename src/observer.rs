//! Observer: runs the test from the orchestrator thread. Drives warmup,
//! periodic interval reports, periodic stat zeroing, autoscaling, and
//! termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::autoscaler::Autoscaler;
use crate::clock;
use crate::config::Config;
use crate::histogram::Histogram;
use crate::report::{self, RunReport};
use crate::worker::WorkerState;

const USEC_PER_SEC: u64 = 1_000_000;

pub struct Observer {
    pub cfg: Arc<Config>,
    pub workers: Vec<Arc<WorkerState>>,
    pub stopping: Arc<AtomicBool>,
    pub rps_stats: Arc<Histogram>,
    pub autoscaler: Option<Autoscaler>,
}

impl Observer {
    pub fn run(self) -> RunReport {
        let Observer {
            cfg,
            workers,
            stopping,
            rps_stats,
            autoscaler,
        } = self;

        let start = clock::now_us();
        let mut last_rps_calc = start;
        let mut last_loop_count: u64 = 0;
        let mut last_interval = start;
        let mut last_zero = start;
        let mut warmup_done = cfg.warmuptime_secs == 0;

        loop {
            let now = clock::now_us();
            let runtime_delta_us = clock::delta_us(now, start);
            let done = runtime_delta_us >= cfg.runtime_secs * USEC_PER_SEC;

            let triggered_warmup = !cfg.rps_mode()
                && !cfg.pipe_mode()
                && !warmup_done
                && runtime_delta_us > cfg.warmuptime_secs * USEC_PER_SEC;

            if triggered_warmup {
                log::info!("warmup done");
                for w in &workers {
                    w.wakeup_hist.clear();
                    w.request_hist.clear();
                }
                rps_stats.clear();
                warmup_done = true;
                last_rps_calc = now;
                last_loop_count = 0;
            } else if !cfg.pipe_mode() {
                let total_loop_count: u64 =
                    workers.iter().map(|w| w.loop_count.load(Ordering::Relaxed)).sum();
                let elapsed_since_rps = clock::delta_us(now, last_rps_calc);
                if elapsed_since_rps > 0 {
                    let instantaneous_rps = (total_loop_count.saturating_sub(last_loop_count)) as f64
                        * USEC_PER_SEC as f64
                        / elapsed_since_rps as f64;

                    let record_rps = match &autoscaler {
                        None => true,
                        Some(a) => a.target_hit(),
                    };
                    if record_rps {
                        rps_stats.record(instantaneous_rps.max(0.0) as u64);
                    }
                    last_rps_calc = now;
                    last_loop_count = total_loop_count;
                }

                if clock::delta_us(now, last_interval) >= cfg.intervaltime_secs * USEC_PER_SEC {
                    let wakeup = aggregate(&workers, |w| &w.wakeup_hist);
                    let request = aggregate(&workers, |w| &w.request_hist);
                    report::print_percentiles(
                        "Wakeup Latencies",
                        "usec",
                        &wakeup,
                        runtime_delta_us / USEC_PER_SEC,
                        &report::WAKEUP_PERCENTILES,
                        report::WAKEUP_STAR,
                    );
                    report::print_percentiles(
                        "Request Latencies",
                        "usec",
                        &request,
                        runtime_delta_us / USEC_PER_SEC,
                        &report::REQUEST_PERCENTILES,
                        report::REQUEST_STAR,
                    );
                    last_interval = now;
                }
            }

            if cfg.zerotime_secs > 0 && clock::delta_us(now, last_zero) >= cfg.zerotime_secs * USEC_PER_SEC
            {
                for w in &workers {
                    w.wakeup_hist.clear();
                    w.request_hist.clear();
                }
                last_zero = now;
            }

            if let Some(a) = &autoscaler {
                if let Err(e) = a.tick() {
                    log::warn!("autoscaler tick failed: {e}");
                }
            }

            if done {
                std::sync::atomic::fence(Ordering::SeqCst);
                stopping.store(true, Ordering::Release);
                break;
            }

            std::thread::sleep(Duration::from_secs(1));
        }

        let wakeup_hist = aggregate(&workers, |w| &w.wakeup_hist);
        let request_hist = aggregate(&workers, |w| &w.request_hist);
        let total_loop_count: u64 = workers.iter().map(|w| w.loop_count.load(Ordering::Relaxed)).sum();

        RunReport {
            runtime_secs: cfg.runtime_secs,
            wakeup_hist,
            request_hist,
            rps_stats,
            total_loop_count,
            pipe_mode: cfg.pipe_mode(),
            pipe_bytes: cfg.pipe_bytes,
            auto_rps: cfg.auto_rps_mode(),
            final_requests_per_sec: cfg.requests_per_sec(),
        }
    }
}

fn aggregate<'a, F>(workers: &'a [Arc<WorkerState>], select: F) -> Histogram
where
    F: Fn(&'a WorkerState) -> &'a Histogram,
{
    let out = Histogram::new();
    for w in workers {
        out.combine(select(w));
    }
    out
}
