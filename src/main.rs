//! CLI entry point: parse argv, build `Config`, run the `Orchestrator`,
//! print the end-of-run report, and map any fatal error to exit code 1 --
//! the same top-level error-to-exit-code convention the teacher's own
//! `main.rs` uses.

use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;

use schedbench::{report, Config, Orchestrator, RawArgs};

fn print_usage() {
    eprintln!(
        "schedbench - scheduler wakeup-latency and throughput benchmark\n\n\
         USAGE:\n    schedbench [OPTIONS]\n\n\
         OPTIONS:\n\
         \x20   -m, --message-threads <N>     number of message threads [default: 1]\n\
         \x20   -t, --threads <N>             worker threads per message thread [default: ceil(cpus/m)]\n\
         \x20   -r, --runtime <SECS>          total test runtime [default: 30]\n\
         \x20   -w, --warmuptime <SECS>       warmup period before first stat zero [default: 0]\n\
         \x20   -i, --intervaltime <SECS>     interval report cadence [default: 10]\n\
         \x20   -z, --zerotime <SECS>         periodic stat-reset cadence, 0 = never [default: 0]\n\
         \x20   -F, --cache_footprint <KB>    per-worker matrix cache footprint [default: 256]\n\
         \x20   -n, --operations <N>          matrix multiplies per request [default: 5]\n\
         \x20   -R, --rps <N>                 target requests/sec, enables RPS mode [default: 0]\n\
         \x20   -A, --auto-rps <PERCENT>      target host CPU-busy percent, enables autoscaling\n\
         \x20   -p, --pipe <BYTES>            pipe-mode transfer size, capped at 1 MiB\n\
         \x20   -C, --calibrate               calibration mode: no locking, pre-sleep excluded\n\
         \x20   -L, --no-locking              skip the per-CPU lock entirely\n\
         \x20       --help                    print this message"
    );
}

fn main() {
    env_logger::Builder::from_default_env().init();

    let argv: Vec<String> = std::env::args().collect();
    let raw = match RawArgs::try_parse_from(&argv) {
        Ok(raw) => raw,
        Err(e) => {
            match e.kind() {
                ErrorKind::UnknownArgument | ErrorKind::TooManyValues => {
                    eprintln!("Error Extra arguments");
                }
                _ => eprint!("{e}"),
            }
            std::process::exit(1);
        }
    };

    if raw.help {
        print_usage();
        std::process::exit(1);
    }

    let cfg = match Config::from_args(raw) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let orchestrator = Orchestrator::new(cfg);
    match orchestrator.run() {
        Ok(run_report) => {
            report::print_end_of_run(&run_report);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
