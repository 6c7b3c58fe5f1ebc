//! Classic-mode message thread: drains the worker intake list and wakes
//! everyone in one batch, using a single shared timestamp per drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::block_gate::BlockGate;
use crate::clock;
use crate::config::Config;
use crate::intake::{self, IntakeList};
use crate::worker::WorkerState;

/// Shared handle a worker's `ParentLink::Classic` points back at.
pub struct MessageThreadShared {
    pub intake: Arc<IntakeList<WorkerState>>,
    pub gate: Arc<BlockGate>,
}

pub struct MessageThread {
    pub shared: Arc<MessageThreadShared>,
    pub workers: Vec<Arc<WorkerState>>,
    pub cfg: Arc<Config>,
    pub stopping: Arc<AtomicBool>,
}

impl MessageThread {
    pub fn run(self) {
        let MessageThread {
            shared,
            workers: _workers,
            cfg,
            stopping,
        } = self;

        loop {
            shared.gate.arm();
            let drained = drain_and_wake(&shared, &cfg);

            if stopping.load(Ordering::Acquire) {
                // Guard against a worker that pushed between our drain above
                // and our observation of `stopping`: drain and wake once
                // more before exiting so nobody is left parked.
                drain_and_wake(&shared, &cfg);
                break;
            }

            if drained == 0 {
                shared.gate.wait(None);
            }
        }
    }
}

/// Drain the intake list, stamp every drained worker with a shared (or,
/// in pipe mode, per-worker) wake instant, and post each one's gate.
/// Returns the number of workers woken.
fn drain_and_wake(shared: &MessageThreadShared, cfg: &Config) -> usize {
    let head = shared.intake.drain();
    if head.is_null() {
        return 0;
    }

    let now = clock::now_us();
    let chain = unsafe { intake::chain_to_vec(head) };
    let count = chain.len();

    for ptr in chain {
        let worker: &WorkerState = unsafe { &*ptr };
        if cfg.pipe_mode() {
            worker.fill_pipe_page(0xa5);
            worker.wake_time_us.store(clock::now_us(), Ordering::Relaxed);
        } else {
            worker.wake_time_us.store(now, Ordering::Relaxed);
        }
        worker.gate.post();
    }

    count
}
