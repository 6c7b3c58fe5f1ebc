//! Autoscaler: nudges the global `requests_per_sec` target toward a desired
//! host CPU-busy percentage, polling `/proc/stat` once per observer tick.
//!
//! Grounded in the teacher's own `/proc`/`/sys` text-parsing idioms
//! (`thermal.rs`, `syscall.rs` read small line-oriented kernel files
//! directly rather than reaching for a crate) -- `/proc/stat`'s first line is
//! parsed by hand here for the same reason.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{BenchError, Result};
use crate::histogram::Histogram;

const OVERFLOW_LIMIT: f64 = (1u64 << 31) as f64;
const DEFAULT_PROC_STAT: &str = "/proc/stat";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HostStat {
    total: u64,
    idle: u64,
}

fn read_host_stat(path: &str) -> Result<HostStat> {
    let contents = fs::read_to_string(path)
        .map_err(|e| BenchError::AutoscaleParseFailure(format!("reading {path}: {e}")))?;
    let line = contents
        .lines()
        .next()
        .ok_or_else(|| BenchError::AutoscaleParseFailure(format!("{path} is empty")))?;

    let mut fields = line.split_whitespace();
    let label = fields
        .next()
        .ok_or_else(|| BenchError::AutoscaleParseFailure("missing cpu label".to_string()))?;
    if label != "cpu" {
        return Err(BenchError::AutoscaleParseFailure(format!(
            "expected aggregate 'cpu' line, got '{label}'"
        )));
    }

    let ticks: Vec<u64> = fields
        .map(|f| {
            f.parse::<u64>()
                .map_err(|e| BenchError::AutoscaleParseFailure(format!("bad tick value '{f}': {e}")))
        })
        .collect::<Result<Vec<u64>>>()?;

    if ticks.len() < 4 {
        return Err(BenchError::AutoscaleParseFailure(
            "cpu line has fewer than 4 tick fields".to_string(),
        ));
    }

    let idle = ticks[3] + ticks.get(4).copied().unwrap_or(0);
    let total: u64 = ticks.iter().sum();
    Ok(HostStat { total, idle })
}

pub struct Autoscaler {
    cfg: Arc<Config>,
    rps_stats: Arc<Histogram>,
    proc_stat_path: String,
    last: Mutex<Option<HostStat>>,
    target_hit: AtomicBool,
    overflow_warned: AtomicBool,
}

impl Autoscaler {
    pub fn new(cfg: Arc<Config>, rps_stats: Arc<Histogram>) -> Self {
        Autoscaler {
            cfg,
            rps_stats,
            proc_stat_path: DEFAULT_PROC_STAT.to_string(),
            last: Mutex::new(None),
            target_hit: AtomicBool::new(false),
            overflow_warned: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn with_proc_stat_path(mut self, path: &str) -> Self {
        self.proc_stat_path = path.to_string();
        self
    }

    pub fn target_hit(&self) -> bool {
        self.target_hit.load(Ordering::Relaxed)
    }

    /// Run one adjustment step. A no-op if `auto_rps` was not configured.
    pub fn tick(&self) -> Result<()> {
        let target_pct = match self.cfg.auto_rps {
            Some(p) => p as f64,
            None => return Ok(()),
        };

        let stat = read_host_stat(&self.proc_stat_path)?;
        let prev = {
            let mut last = self.last.lock().unwrap();
            last.replace(stat)
        };
        let prev = match prev {
            Some(p) => p,
            None => return Ok(()),
        };

        let d_total = stat.total.saturating_sub(prev.total);
        let d_idle = stat.idle.saturating_sub(prev.idle);
        if d_total == 0 {
            return Ok(());
        }

        let busy = 100.0 * (1.0 - (d_idle as f64 / d_total as f64));
        if busy <= 0.0 {
            return Ok(());
        }

        let delta = target_pct / busy;
        let r = self.cfg.requests_per_sec() as f64;

        let (damped_delta, growing) = if delta > 1.0 {
            let mut d = delta.min(3.0);
            if d < 1.2 {
                d = 1.0 + (d - 1.0) / 8.0;
            } else if d < 1.5 {
                d = 1.0 + (d - 1.0) / 4.0;
            }
            (d, true)
        } else if delta < 1.0 {
            let mut d = delta.max(0.3);
            if d > 0.9 {
                d = d + (1.0 - d) / 8.0;
            } else if d > 0.8 {
                d = d + (1.0 - d) / 4.0;
            }
            (d, false)
        } else {
            (1.0, false)
        };

        let new_r_f = if growing {
            (r * damped_delta).ceil()
        } else {
            (r * damped_delta).floor()
        };

        let new_r: u32 = if new_r_f >= OVERFLOW_LIMIT {
            if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "autoscaler target overflowed 2^31, holding previous rate of {}",
                    r as u32
                );
            }
            r as u32
        } else {
            new_r_f.max(0.0) as u32
        };

        self.cfg.requests_per_sec.store(new_r, Ordering::Relaxed);

        // "Close enough" is a property of the damped delta actually applied
        // to the rate, not the raw pre-damping delta: the innermost damping
        // bands ([1, 1.2) growing, (0.8, 1] shrinking) always produce a
        // damped value within 1/8 of 1.0, which is the crossing this flag is
        // meant to catch (§4.9).
        let close_enough = (damped_delta - 1.0).abs() < 1e-9
            || (growing && damped_delta < 1.05)
            || (!growing && damped_delta > 0.95);
        if close_enough && !self.target_hit.swap(true, Ordering::Relaxed) {
            self.rps_stats.clear();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawArgs;
    use clap::Parser;
    use std::io::Write;

    fn test_config(auto_rps: &str, rps: &str) -> Arc<Config> {
        let raw = RawArgs::parse_from(["schedbench", "-A", auto_rps, "-R", rps]);
        Arc::new(Config::from_args(raw).unwrap())
    }

    fn write_proc_stat(dir: &std::path::Path, name: &str, user: u64, idle: u64) -> String {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "cpu  {user} 0 0 {idle} 0 0 0 0 0 0").unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn parses_aggregate_cpu_line() {
        let dir = std::env::temp_dir();
        let path = write_proc_stat(&dir, "schedbench_test_stat_1", 1000, 9000);
        let stat = read_host_stat(&path).unwrap();
        assert_eq!(stat.idle, 9000);
        assert_eq!(stat.total, 10000);
        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_autoscale_parse_failure() {
        let err = read_host_stat("/nonexistent/schedbench/proc/stat").unwrap_err();
        assert!(matches!(err, BenchError::AutoscaleParseFailure(_)));
    }

    #[test]
    fn first_tick_only_snapshots_and_does_not_adjust() {
        let dir = std::env::temp_dir();
        let path = write_proc_stat(&dir, "schedbench_test_stat_2", 0, 0);
        let cfg = test_config("50", "10");
        let rps_stats = Arc::new(Histogram::new());
        let scaler = Autoscaler::new(cfg.clone(), rps_stats).with_proc_stat_path(&path);
        scaler.tick().unwrap();
        assert_eq!(cfg.requests_per_sec(), 10);
        assert!(!scaler.target_hit());
        fs::remove_file(path).ok();
    }

    #[test]
    fn busy_below_target_increases_rate() {
        let dir = std::env::temp_dir();
        let path = write_proc_stat(&dir, "schedbench_test_stat_3", 0, 0);
        let cfg = test_config("90", "10");
        let rps_stats = Arc::new(Histogram::new());
        let scaler = Autoscaler::new(cfg.clone(), rps_stats).with_proc_stat_path(&path);
        scaler.tick().unwrap();

        // Busy 10% over the next interval (far below the 90% target): delta
        // = 90/10 = 9, clamped to 3, dampened (>=1.5) -> undampened 3x.
        write_proc_stat(&dir, "schedbench_test_stat_3", 100, 900);
        scaler.tick().unwrap();
        assert!(cfg.requests_per_sec() > 10);
        fs::remove_file(path).ok();
    }

    #[test]
    fn busy_above_target_decreases_rate() {
        let dir = std::env::temp_dir();
        let path = write_proc_stat(&dir, "schedbench_test_stat_4", 0, 0);
        let cfg = test_config("10", "1000");
        let rps_stats = Arc::new(Histogram::new());
        let scaler = Autoscaler::new(cfg.clone(), rps_stats).with_proc_stat_path(&path);
        scaler.tick().unwrap();

        // Busy 90% against a 10% target: delta = 10/90 ~ 0.11, clamped to
        // 0.3.
        write_proc_stat(&dir, "schedbench_test_stat_4", 900, 100);
        scaler.tick().unwrap();
        assert!(cfg.requests_per_sec() < 1000);
        fs::remove_file(path).ok();
    }

    #[test]
    fn close_enough_is_judged_on_the_damped_delta_not_the_raw_one() {
        // target=50%, busy=44% -> raw delta = 50/44 ~= 1.136, which fails a
        // naive `delta < 1.05` check, but falls in the `[1.0, 1.2)` growing
        // damping band, so the *damped* delta (~1.017) is well within the
        // "close enough" band. A workload converging on target from this
        // side must still set target_hit and clear rps_stats.
        let dir = std::env::temp_dir();
        let path = write_proc_stat(&dir, "schedbench_test_stat_6", 0, 0);
        let cfg = test_config("50", "10");
        let rps_stats = Arc::new(Histogram::new());
        rps_stats.record(5);
        let scaler = Autoscaler::new(cfg.clone(), rps_stats.clone()).with_proc_stat_path(&path);
        scaler.tick().unwrap();

        write_proc_stat(&dir, "schedbench_test_stat_6", 440, 560);
        scaler.tick().unwrap();
        assert!(scaler.target_hit());
        assert_eq!(rps_stats.nr_samples(), 0);
        fs::remove_file(path).ok();
    }

    #[test]
    fn close_enough_sets_target_hit_once_and_clears_rps_stats() {
        let dir = std::env::temp_dir();
        let path = write_proc_stat(&dir, "schedbench_test_stat_5", 0, 0);
        let cfg = test_config("50", "10");
        let rps_stats = Arc::new(Histogram::new());
        rps_stats.record(5);
        let scaler = Autoscaler::new(cfg.clone(), rps_stats.clone()).with_proc_stat_path(&path);
        scaler.tick().unwrap();

        // Busy exactly at target: delta == 1.0 -> close enough.
        write_proc_stat(&dir, "schedbench_test_stat_5", 500, 500);
        scaler.tick().unwrap();
        assert!(scaler.target_hit());
        assert_eq!(rps_stats.nr_samples(), 0);
        fs::remove_file(path).ok();
    }

    #[test]
    fn disabled_auto_rps_is_a_no_op() {
        let raw = RawArgs::parse_from(["schedbench", "-R", "10"]);
        let cfg = Arc::new(Config::from_args(raw).unwrap());
        let rps_stats = Arc::new(Histogram::new());
        let scaler = Autoscaler::new(cfg.clone(), rps_stats);
        scaler.tick().unwrap();
        assert_eq!(cfg.requests_per_sec(), 10);
    }
}
