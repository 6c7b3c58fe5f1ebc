//! Builds the thread tree, starts it, runs the Observer on the calling
//! thread, then tears everything down and hands back the final report.
//!
//! Per §9's adopted redesign, each message thread owns a `Vec<Arc<WorkerState>>`
//! rather than the C source's flat slab with message-thread records
//! interleaved at stride `W+1`; a worker's path back to its message thread
//! is a plain `Arc`/`Arc` pair (`ParentLink::Classic`) resolved once at spawn
//! time. Grounded in the teacher's own parent/children composition in
//! `orchestrator/executor.rs`, which holds owned `Vec<...>` of child phase
//! records rather than an index-computed flat array.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::autoscaler::Autoscaler;
use crate::block_gate::BlockGate;
use crate::config::Config;
use crate::error::Result;
use crate::histogram::Histogram;
use crate::intake::IntakeList;
use crate::message_thread::{MessageThread, MessageThreadShared};
use crate::observer::Observer;
use crate::percpu::PerCpuLock;
use crate::report::RunReport;
use crate::rps_injector::RpsInjector;
use crate::worker::{ParentLink, Worker, WorkerState};

pub struct Orchestrator {
    pub cfg: Arc<Config>,
}

enum Fanout {
    Classic {
        shared: Arc<MessageThreadShared>,
        handle: JoinHandle<()>,
    },
    Rps {
        handle: JoinHandle<()>,
    },
}

impl Orchestrator {
    pub fn new(cfg: Arc<Config>) -> Self {
        Orchestrator { cfg }
    }

    pub fn run(self) -> Result<RunReport> {
        let cfg = self.cfg;
        let stopping = Arc::new(AtomicBool::new(false));
        let percpu = Arc::new(PerCpuLock::new(crate::percpu::cached_num_cpus()));
        let rps_stats = Arc::new(Histogram::new());
        let rps_mode = cfg.rps_mode();

        log::info!(
            "starting schedbench: {} message thread(s) x {} worker(s), runtime={}s, mode={}",
            cfg.message_threads,
            cfg.worker_threads,
            cfg.runtime_secs,
            if rps_mode {
                "rps"
            } else if cfg.pipe_mode() {
                "pipe"
            } else {
                "classic"
            }
        );

        let mut all_workers: Vec<Arc<WorkerState>> = Vec::new();
        let mut fanouts: Vec<Fanout> = Vec::new();
        let mut worker_handles: Vec<JoinHandle<()>> = Vec::new();

        for mt_index in 0..cfg.message_threads {
            let workers: Vec<Arc<WorkerState>> = (0..cfg.worker_threads)
                .map(|_| Arc::new(WorkerState::new(&cfg)))
                .collect();
            all_workers.extend(workers.iter().cloned());

            if rps_mode {
                let injector = RpsInjector::new(
                    workers.clone(),
                    cfg.clone(),
                    cfg.message_threads,
                    stopping.clone(),
                );

                for w in &workers {
                    let worker = Worker {
                        state: w.clone(),
                        cfg: cfg.clone(),
                        parent: ParentLink::Rps,
                        percpu: percpu.clone(),
                        stopping: stopping.clone(),
                    };
                    let handle = std::thread::Builder::new()
                        .name(format!("worker-{mt_index}"))
                        .spawn(move || worker.run())
                        .map_err(|e| crate::error::BenchError::SyscallFailure(e.to_string()))?;
                    worker_handles.push(handle);
                }

                let handle = std::thread::Builder::new()
                    .name(format!("rps-injector-{mt_index}"))
                    .spawn(move || injector.run())
                    .map_err(|e| crate::error::BenchError::SyscallFailure(e.to_string()))?;
                fanouts.push(Fanout::Rps { handle });
            } else {
                let intake: Arc<IntakeList<WorkerState>> = Arc::new(IntakeList::new());
                let gate = Arc::new(BlockGate::new());
                let shared = Arc::new(MessageThreadShared {
                    intake: intake.clone(),
                    gate: gate.clone(),
                });

                for w in &workers {
                    let worker = Worker {
                        state: w.clone(),
                        cfg: cfg.clone(),
                        parent: ParentLink::Classic {
                            intake: intake.clone(),
                            gate: gate.clone(),
                        },
                        percpu: percpu.clone(),
                        stopping: stopping.clone(),
                    };
                    let handle = std::thread::Builder::new()
                        .name(format!("worker-{mt_index}"))
                        .spawn(move || worker.run())
                        .map_err(|e| crate::error::BenchError::SyscallFailure(e.to_string()))?;
                    worker_handles.push(handle);
                }

                let mt = MessageThread {
                    shared: shared.clone(),
                    workers: workers.clone(),
                    cfg: cfg.clone(),
                    stopping: stopping.clone(),
                };
                let handle = std::thread::Builder::new()
                    .name(format!("message-thread-{mt_index}"))
                    .spawn(move || mt.run())
                    .map_err(|e| crate::error::BenchError::SyscallFailure(e.to_string()))?;
                fanouts.push(Fanout::Classic { shared, handle });
            }
        }

        let autoscaler = if cfg.auto_rps_mode() {
            Some(Autoscaler::new(cfg.clone(), rps_stats.clone()))
        } else {
            None
        };

        let observer = Observer {
            cfg: cfg.clone(),
            workers: all_workers,
            stopping: stopping.clone(),
            rps_stats,
            autoscaler,
        };
        let report = observer.run();

        for fanout in fanouts {
            match fanout {
                Fanout::Classic { shared, handle } => {
                    shared.gate.post();
                    let _ = handle.join();
                }
                Fanout::Rps { handle } => {
                    let _ = handle.join();
                }
            }
        }

        for handle in worker_handles {
            let _ = handle.join();
        }

        log::info!("schedbench run complete");
        Ok(report)
    }
}
