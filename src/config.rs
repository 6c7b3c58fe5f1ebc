//! CLI surface and process-wide configuration.
//!
//! `RawArgs` is the `clap::Parser` struct matching the CLI 1:1; `Config` is
//! the immutable, `Arc`-shared settings handle built once from it. The only
//! mutable field is `requests_per_sec`, exposed as an `AtomicU32` so the
//! Autoscaler can adjust the target rate without an outer lock, mirroring
//! the teacher's own preference for one atomic field over a mutex-guarded
//! struct when only a single value changes after startup.

use std::sync::atomic::{AtomicU32, Ordering};

use clap::Parser;

use crate::error::{BenchError, Result};

const ONE_MIB: u64 = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "schedbench",
    about = "Scheduler wakeup-latency and throughput benchmark",
    disable_help_flag = true
)]
pub struct RawArgs {
    /// Number of message threads (outer fan-out)
    #[arg(short = 'm', long = "message-threads", default_value_t = 1)]
    pub message_threads: usize,

    /// Worker threads per message thread (default: ceil(num_cpus / m))
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Total test runtime in seconds
    #[arg(short = 'r', long = "runtime", default_value_t = 30)]
    pub runtime: u64,

    /// Warmup period in seconds before stats are first zeroed
    #[arg(short = 'w', long = "warmuptime", default_value_t = 0)]
    pub warmuptime: u64,

    /// Interval report cadence in seconds
    #[arg(short = 'i', long = "intervaltime", default_value_t = 10)]
    pub intervaltime: u64,

    /// Periodic stat-reset cadence in seconds (0 = never)
    #[arg(short = 'z', long = "zerotime", default_value_t = 0)]
    pub zerotime: u64,

    /// Per-worker matrix cache footprint in KiB
    #[arg(short = 'F', long = "cache_footprint", default_value_t = 256)]
    pub cache_footprint_kb: usize,

    /// Matrix multiplies per request
    #[arg(short = 'n', long = "operations", default_value_t = 5)]
    pub operations: u32,

    /// Target requests/sec (enables RPS mode)
    #[arg(short = 'R', long = "rps", default_value_t = 0)]
    pub rps: u32,

    /// Target host CPU-busy percent (enables autoscaling)
    #[arg(short = 'A', long = "auto-rps")]
    pub auto_rps: Option<u32>,

    /// Pipe-mode transfer size in bytes (enables pipe mode, capped at 1 MiB)
    #[arg(short = 'p', long = "pipe", default_value_t = 0)]
    pub pipe: u64,

    /// Calibration mode: skip locking, exclude the pre-sleep from timing
    #[arg(short = 'C', long = "calibrate", default_value_t = false)]
    pub calibrate: bool,

    /// Skip the per-CPU lock entirely
    #[arg(short = 'L', long = "no-locking", default_value_t = false)]
    pub no_locking: bool,

    #[arg(long = "help", action = clap::ArgAction::SetTrue, hide = true)]
    pub help: bool,
}

/// Immutable settings derived from `RawArgs`, shared across every thread via
/// `Arc<Config>`. `requests_per_sec` is the single exception to immutability:
/// the Autoscaler mutates it in place once per observer tick.
pub struct Config {
    pub message_threads: usize,
    pub worker_threads: usize,
    pub runtime_secs: u64,
    pub warmuptime_secs: u64,
    pub intervaltime_secs: u64,
    pub zerotime_secs: u64,
    pub cache_footprint_kb: usize,
    pub operations: u32,
    pub requests_per_sec: AtomicU32,
    pub auto_rps: Option<u32>,
    pub pipe_bytes: u64,
    pub calibrate_only: bool,
    pub skip_locking: bool,
}

impl Config {
    pub fn from_args(args: RawArgs) -> Result<Self> {
        if args.message_threads == 0 {
            return Err(BenchError::Config(
                "--message-threads must be at least 1".to_string(),
            ));
        }

        let worker_threads = match args.threads {
            Some(0) => {
                return Err(BenchError::Config(
                    "--threads must be at least 1".to_string(),
                ))
            }
            Some(t) => t,
            None => {
                let cpus = crate::percpu::cached_num_cpus();
                (cpus + args.message_threads - 1) / args.message_threads
            }
        };

        let pipe_bytes = args.pipe.min(ONE_MIB);
        let pipe_mode = pipe_bytes > 0;
        let auto_rps_mode = args.auto_rps.is_some();

        let mut requests_per_sec = args.rps;
        if auto_rps_mode && requests_per_sec == 0 {
            requests_per_sec = 10;
        }

        let warmuptime_secs = if args.runtime < 30 || pipe_mode || auto_rps_mode {
            0
        } else {
            args.warmuptime
        };

        if let Some(pct) = args.auto_rps {
            if pct == 0 || pct > 100 {
                return Err(BenchError::Config(
                    "--auto-rps must be between 1 and 100".to_string(),
                ));
            }
        }

        Ok(Config {
            message_threads: args.message_threads,
            worker_threads,
            runtime_secs: args.runtime,
            warmuptime_secs,
            intervaltime_secs: args.intervaltime,
            zerotime_secs: args.zerotime,
            cache_footprint_kb: args.cache_footprint_kb,
            operations: args.operations,
            requests_per_sec: AtomicU32::new(requests_per_sec),
            auto_rps: args.auto_rps,
            pipe_bytes,
            calibrate_only: args.calibrate,
            skip_locking: args.calibrate || args.no_locking,
        })
    }

    pub fn rps_mode(&self) -> bool {
        self.requests_per_sec.load(Ordering::Relaxed) > 0
    }

    pub fn pipe_mode(&self) -> bool {
        self.pipe_bytes > 0
    }

    pub fn auto_rps_mode(&self) -> bool {
        self.auto_rps.is_some()
    }

    pub fn requests_per_sec(&self) -> u32 {
        self.requests_per_sec.load(Ordering::Relaxed)
    }
}
