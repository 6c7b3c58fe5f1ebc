//! Output formatting: percentile tables, throughput lines, and the
//! end-of-run summary. Pure formatting over `Histogram`/`RunReport` data,
//! written directly to stderr/stdout with `eprintln!`/`println!`, matching
//! the teacher's own direct-`eprintln!` status reporting throughout
//! `system/performance/*.rs` rather than routing through a templating crate.

use std::sync::Arc;

use crate::histogram::Histogram;

pub const WAKEUP_PERCENTILES: [f64; 4] = [50.0, 90.0, 99.0, 99.9];
pub const WAKEUP_STAR: usize = 2;
pub const REQUEST_PERCENTILES: [f64; 4] = [50.0, 90.0, 99.0, 99.9];
pub const REQUEST_STAR: usize = 2;
pub const RPS_PERCENTILES: [f64; 3] = [20.0, 50.0, 90.0];
pub const RPS_STAR: usize = 1;

/// The structured end-of-run payload: aggregate histograms plus the derived
/// throughput figures the textual report is rendered from. Kept separate
/// from the live `Observer` state so tests can assert on it directly without
/// parsing stderr text.
pub struct RunReport {
    pub runtime_secs: u64,
    pub wakeup_hist: Histogram,
    pub request_hist: Histogram,
    pub rps_stats: Arc<Histogram>,
    pub total_loop_count: u64,
    pub pipe_mode: bool,
    pub pipe_bytes: u64,
    pub auto_rps: bool,
    pub final_requests_per_sec: u32,
}

impl RunReport {
    pub fn avg_rps(&self) -> f64 {
        if self.runtime_secs == 0 {
            0.0
        } else {
            self.total_loop_count as f64 / self.runtime_secs as f64
        }
    }

    pub fn pipe_ops_per_sec(&self) -> f64 {
        self.avg_rps()
    }

    pub fn pipe_mb_per_sec(&self) -> f64 {
        self.pipe_ops_per_sec() * self.pipe_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Print one percentile block: `<label> percentiles (<units>) runtime
/// <secs> (<N> total samples)` followed by one line per percentile (the
/// `star_idx`'th line prefixed with `* ` instead of two spaces), then
/// `min=<u>, max=<u>`.
pub fn print_percentiles(
    label: &str,
    units: &str,
    hist: &Histogram,
    runtime_secs: u64,
    plist: &[f64],
    star_idx: usize,
) {
    let nr = hist.nr_samples();
    eprintln!(
        "{label} percentiles ({units}) runtime {runtime_secs} ({nr} total samples)"
    );
    let results = hist.percentiles(plist);
    for (i, (value, count)) in results.iter().enumerate() {
        let marker = if i == star_idx { "*" } else { " " };
        eprintln!(" {marker} {:.1}th: {value} ({count} samples)", plist[i]);
    }
    eprintln!("  min={}, max={}", hist.min(), hist.max());
}

pub fn print_pipe_throughput(report: &RunReport) {
    eprintln!(
        "avg worker transfer: {:.2} ops/sec {:.2} MB/s",
        report.pipe_ops_per_sec(),
        report.pipe_mb_per_sec()
    );
}

pub fn print_end_of_run(report: &RunReport) {
    print_percentiles(
        "Wakeup Latencies",
        "usec",
        &report.wakeup_hist,
        report.runtime_secs,
        &WAKEUP_PERCENTILES,
        WAKEUP_STAR,
    );

    if report.pipe_mode {
        print_pipe_throughput(report);
        return;
    }

    print_percentiles(
        "Request Latencies",
        "usec",
        &report.request_hist,
        report.runtime_secs,
        &REQUEST_PERCENTILES,
        REQUEST_STAR,
    );

    if report.rps_stats.nr_samples() > 0 {
        print_percentiles(
            "RPS",
            "requests",
            &report.rps_stats,
            report.runtime_secs,
            &RPS_PERCENTILES,
            RPS_STAR,
        );
    }

    if report.auto_rps {
        eprintln!("final rps goal was {}", report.final_requests_per_sec);
    } else {
        eprintln!("average rps: {:.2}", report.avg_rps());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hist() -> Histogram {
        let h = Histogram::new();
        for v in 1..=100u64 {
            h.record(v);
        }
        h
    }

    #[test]
    fn avg_rps_divides_by_runtime() {
        let report = RunReport {
            runtime_secs: 10,
            wakeup_hist: sample_hist(),
            request_hist: sample_hist(),
            rps_stats: Arc::new(Histogram::new()),
            total_loop_count: 500,
            pipe_mode: false,
            pipe_bytes: 0,
            auto_rps: false,
            final_requests_per_sec: 0,
        };
        assert_eq!(report.avg_rps(), 50.0);
    }

    #[test]
    fn avg_rps_is_zero_for_zero_runtime() {
        let report = RunReport {
            runtime_secs: 0,
            wakeup_hist: sample_hist(),
            request_hist: sample_hist(),
            rps_stats: Arc::new(Histogram::new()),
            total_loop_count: 500,
            pipe_mode: false,
            pipe_bytes: 0,
            auto_rps: false,
            final_requests_per_sec: 0,
        };
        assert_eq!(report.avg_rps(), 0.0);
    }

    #[test]
    fn pipe_mb_per_sec_scales_with_pipe_bytes() {
        let report = RunReport {
            runtime_secs: 1,
            wakeup_hist: sample_hist(),
            request_hist: Histogram::new(),
            rps_stats: Arc::new(Histogram::new()),
            total_loop_count: 1024,
            pipe_mode: true,
            pipe_bytes: 1024,
            auto_rps: false,
            final_requests_per_sec: 0,
        };
        assert_eq!(report.pipe_mb_per_sec(), 1.0);
    }
}
