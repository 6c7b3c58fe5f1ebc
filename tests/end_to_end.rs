//! Black-box end-to-end tests: drive the binary's library entry point
//! (`Config` -> `Orchestrator::run`) through short, real runs covering each
//! pacing mode. These spawn real OS threads and sleep real wall-clock
//! seconds, same style as the teacher's own `tests/stressor_integration_tests.rs`.

use clap::Parser;
use schedbench::{Config, Orchestrator, RawArgs};
use std::sync::Arc;

fn run(args: &[&str]) -> schedbench::report::RunReport {
    let mut argv = vec!["schedbench"];
    argv.extend_from_slice(args);
    let raw = RawArgs::parse_from(argv);
    let cfg = Arc::new(Config::from_args(raw).expect("config should be valid"));
    Orchestrator::new(cfg).run().expect("run should not fail")
}

#[test]
fn classic_mode_small_run_records_wakeups_for_every_worker() {
    eprintln!("\n=== TEST: classic mode, 2 workers, 2s runtime ===");
    // -r 2 forces warmuptime to 0 (runtime < 30); -i 1 forces an interval
    // report mid-run.
    let report = run(&["-m", "1", "-t", "2", "-r", "2", "-n", "1", "-F", "16", "-i", "1"]);

    eprintln!(
        "[TEST] wakeup samples={} request samples={}",
        report.wakeup_hist.nr_samples(),
        report.request_hist.nr_samples()
    );
    // Each worker cycles through send_and_wait/do_work roughly once per
    // ~100us network sim, over 2s: comfortably >= 2 per worker.
    assert!(report.wakeup_hist.nr_samples() >= 4);
    assert!(report.request_hist.nr_samples() >= 4);
    assert!(!report.pipe_mode);
    eprintln!("[TEST] ✓ classic mode completed");
}

#[test]
fn calibrate_mode_skips_locking_and_reports_request_latencies() {
    eprintln!("\n=== TEST: calibration mode ===");
    let report = run(&["-C", "-r", "2", "-t", "2", "-F", "16", "-n", "1"]);

    assert!(report.request_hist.nr_samples() > 0, "calibration should still record request latencies");
    assert!(report.avg_rps() > 0.0, "end-of-run average rps should be reported in calibration mode");
    eprintln!(
        "[TEST] ✓ calibration mode completed, avg_rps={:.1}",
        report.avg_rps()
    );
}

#[test]
fn pipe_mode_reports_nonzero_transfer_and_skips_cpu_burn() {
    eprintln!("\n=== TEST: pipe mode, 4096 bytes ===");
    let report = run(&["-p", "4096", "-m", "1", "-t", "2", "-r", "2"]);

    assert!(report.pipe_mode);
    assert!(report.total_loop_count > 0, "pipe mode should still cycle workers");
    assert!(
        report.pipe_mb_per_sec() >= 0.0,
        "pipe throughput must be a well-formed non-negative number"
    );
    eprintln!(
        "[TEST] ✓ pipe mode completed, {:.3} MB/s over {} loops",
        report.pipe_mb_per_sec(),
        report.total_loop_count
    );
}

#[test]
fn rps_mode_paces_injection_without_unbounded_backlog() {
    eprintln!("\n=== TEST: RPS mode, target 100 req/s ===");
    let report = run(&["-R", "100", "-m", "1", "-t", "4", "-r", "2", "-F", "16", "-n", "1"]);

    assert!(!report.pipe_mode);
    assert!(report.request_hist.nr_samples() > 0, "RPS mode should have served some requests");
    eprintln!(
        "[TEST] ✓ RPS mode completed, {} requests served",
        report.request_hist.nr_samples()
    );
}

#[test]
fn auto_rps_mode_runs_without_error_and_reports_a_goal() {
    eprintln!("\n=== TEST: autoscaling RPS mode ===");
    // Autoscaling forces warmuptime to 0 regardless of -w; runtime 3s gives
    // the autoscaler a couple of 1s ticks to adjust the target.
    let report = run(&["-A", "50", "-R", "10", "-m", "1", "-t", "2", "-r", "3", "-F", "16", "-n", "1"]);

    assert!(report.auto_rps);
    eprintln!(
        "[TEST] ✓ autoscaling completed, final goal={} req/s",
        report.final_requests_per_sec
    );
}

#[test]
fn extra_positional_argument_is_rejected_by_config_parsing() {
    eprintln!("\n=== TEST: unexpected positional argument ===");
    let result = RawArgs::try_parse_from(["schedbench", "bogus-positional"]);
    assert!(result.is_err(), "a stray positional argument must be rejected");
    eprintln!("[TEST] ✓ extra argument rejected");
}
