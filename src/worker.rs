//! Worker thread: the rendezvous client.
//!
//! A worker either pushes itself onto its message thread's intake list and
//! waits to be woken (classic mode), or drains its own request list that an
//! `RpsInjector` fills directly (RPS mode). Either way it ends up with one or
//! more units of "work" to execute, each timed independently into the
//! request histogram, while the rendezvous-to-resume gap is timed into the
//! wakeup histogram.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::block_gate::{BlockGate, WaitResult};
use crate::clock::{self, checked_delta_us};
use crate::config::Config;
use crate::cpu_burn::CpuBurnBuffer;
use crate::histogram::Histogram;
use crate::intake::{IntakeList, IntakeNode};
use crate::percpu::PerCpuLock;

const NETWORK_SIM_US: u64 = 100;

/// A single injected request token (RPS mode only). Owned by its current
/// holder: the injector until handed off, the worker thereafter, which frees
/// it once its latency is recorded.
pub struct Request {
    pub start_time_us: u64,
    next: AtomicPtr<Request>,
}

impl Request {
    pub fn new(start_time_us: u64) -> Self {
        Request {
            start_time_us,
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl IntakeNode for Request {
    fn next_ptr(&self) -> &AtomicPtr<Self> {
        &self.next
    }
}

/// Per-worker shared state: mutated by the worker's own thread plus its
/// message thread / RPS injector via atomics. Lives behind an `Arc` so a raw
/// pointer to it can ride a message thread's intake list without handing
/// away ownership (unlike `Request`, a `WorkerState` is never freed by the
/// list that carries it; the owning `Arc` keeps it alive for the test's
/// duration).
pub struct WorkerState {
    next: AtomicPtr<WorkerState>,
    pub gate: BlockGate,
    pub wakeup_hist: Histogram,
    pub request_hist: Histogram,
    pub loop_count: AtomicU64,
    pub runtime_us: AtomicU64,
    pub pending: AtomicU32,
    pub wake_time_us: AtomicU64,
    request_list: IntakeList<Request>,
    pipe_page: Mutex<Vec<u8>>,
    cpu_burn: Mutex<CpuBurnBuffer>,
}

impl IntakeNode for WorkerState {
    fn next_ptr(&self) -> &AtomicPtr<Self> {
        &self.next
    }
}

impl WorkerState {
    pub fn new(cfg: &Config) -> Self {
        let pipe_size = cfg.pipe_bytes.max(1) as usize;
        WorkerState {
            next: AtomicPtr::new(ptr::null_mut()),
            gate: BlockGate::new(),
            wakeup_hist: Histogram::new(),
            request_hist: Histogram::new(),
            loop_count: AtomicU64::new(0),
            runtime_us: AtomicU64::new(0),
            pending: AtomicU32::new(0),
            wake_time_us: AtomicU64::new(0),
            request_list: IntakeList::new(),
            pipe_page: Mutex::new(vec![0u8; pipe_size]),
            cpu_burn: Mutex::new(CpuBurnBuffer::new(cfg.cache_footprint_kb)),
        }
    }

    /// Push a request onto this worker's own LIFO request list (the
    /// `RpsInjector`'s handoff path).
    pub fn push_request(&self, req: *mut Request) {
        self.request_list.push(req);
    }

    fn touch_pipe_page(&self, bytes: u64) {
        let mut page = self.pipe_page.lock().unwrap();
        let n = (bytes as usize).min(page.len());
        for b in page.iter_mut().take(n) {
            *b = b.wrapping_add(1);
        }
    }

    /// The message thread's side of the pipe-mode touch: fill the worker's
    /// scratch page with a fill byte, simulating the receiver half of a pipe
    /// transfer (§4.7 step 3), mirroring the sender-side `touch_pipe_page`
    /// the worker itself performs before parking.
    pub fn fill_pipe_page(&self, fill_byte: u8) {
        let mut page = self.pipe_page.lock().unwrap();
        for b in page.iter_mut() {
            *b = fill_byte;
        }
    }
}

/// How a worker learns about its parent message thread, resolved at spawn
/// time (§4.11's adopted redesign: a back-reference rather than an
/// index-computed flat array).
pub enum ParentLink {
    /// Classic mode: push self onto the message thread's intake, then post
    /// its gate to ask for a wakeup.
    Classic {
        intake: Arc<IntakeList<WorkerState>>,
        gate: Arc<BlockGate>,
    },
    /// RPS mode: the injector pushes directly into this worker's own request
    /// list and posts this worker's gate; there is nothing to push upward.
    Rps,
}

/// One "unit of work" drained by `send_and_wait`: either the implicit
/// request of classic mode (no separate token exists) or an owned `Request`
/// from the RPS request list.
enum WorkItem {
    Implicit { start_time_us: u64 },
    Owned(Box<Request>),
}

pub struct Worker {
    pub state: Arc<WorkerState>,
    pub cfg: Arc<Config>,
    pub parent: ParentLink,
    pub percpu: Arc<PerCpuLock>,
    pub stopping: Arc<AtomicBool>,
}

impl Worker {
    pub fn run(self) {
        let Worker {
            state,
            cfg,
            parent,
            percpu,
            stopping,
        } = self;

        loop {
            let items = send_and_wait(&state, &cfg, &parent, &stopping);

            for item in items {
                let (start_time_us, owned) = match item {
                    WorkItem::Implicit { start_time_us } => (start_time_us, None),
                    WorkItem::Owned(boxed) => (boxed.start_time_us, Some(boxed)),
                };

                let work_start = if cfg.pipe_mode() {
                    clock::now_us()
                } else if cfg.calibrate_only {
                    // Calibration excludes the simulated-network sleep from
                    // the timed window entirely.
                    std::thread::sleep(std::time::Duration::from_micros(NETWORK_SIM_US));
                    clock::now_us()
                } else {
                    let ts = clock::now_us();
                    std::thread::sleep(std::time::Duration::from_micros(NETWORK_SIM_US));
                    ts
                };

                if !cfg.pipe_mode() {
                    do_work(&state, &cfg, &percpu);
                }

                let now = clock::now_us();
                if let Some(delta) = checked_delta_us(now, work_start) {
                    state.request_hist.record(delta);
                }
                state.loop_count.fetch_add(1, Ordering::Relaxed);
                if let Some(delta) = checked_delta_us(now, start_time_us) {
                    state.runtime_us.store(delta, Ordering::Relaxed);
                }

                drop(owned); // frees the Request token, if any
            }

            if stopping.load(Ordering::Acquire) {
                break;
            }
        }
    }
}

fn do_work(state: &WorkerState, cfg: &Config, percpu: &PerCpuLock) {
    if cfg.skip_locking {
        let mut buf = state.cpu_burn.lock().unwrap();
        buf.burn(cfg.operations);
    } else {
        let _guard = percpu.lock_this_cpu();
        let mut buf = state.cpu_burn.lock().unwrap();
        buf.burn(cfg.operations);
    }
}

fn send_and_wait(
    state: &Arc<WorkerState>,
    cfg: &Config,
    parent: &ParentLink,
    stopping: &Arc<AtomicBool>,
) -> Vec<WorkItem> {
    if cfg.pipe_mode() {
        state.touch_pipe_page(cfg.pipe_bytes);
    }

    state.gate.arm();
    let own_wake = clock::now_us();
    state.wake_time_us.store(own_wake, Ordering::Relaxed);

    let drained: Vec<WorkItem> = if matches!(parent, ParentLink::Rps) {
        state.pending.store(0, Ordering::Relaxed);
        let head = state.request_list.drain();
        if !head.is_null() {
            let mut chain = unsafe { crate::intake::chain_to_vec(head) };
            // Requests are pushed LIFO by the injector; reverse so workers
            // consume them in injection order (§4.3).
            chain.reverse();
            let items = chain
                .into_iter()
                .map(|p| WorkItem::Owned(unsafe { Box::from_raw(p) }))
                .collect::<Vec<_>>();
            // A drain that yields work means this wakeup was already
            // satisfied; flip straight back to RUNNING, no park needed.
            state.gate.post();
            items
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    if !drained.is_empty() {
        let now = clock::now_us();
        if let Some(delta) = checked_delta_us(now, state.wake_time_us.load(Ordering::Relaxed)) {
            state.wakeup_hist.record(delta);
        }
        return drained;
    }

    if let ParentLink::Classic { intake, gate } = parent {
        intake.push(Arc::as_ptr(state) as *mut WorkerState);
        gate.post();
    }

    if !stopping.load(Ordering::Acquire) {
        state.gate.wait(None);
    }

    let now = clock::now_us();
    let wakeup_ok =
        checked_delta_us(now, state.wake_time_us.load(Ordering::Relaxed)).map(|delta| {
            state.wakeup_hist.record(delta);
        });
    let _ = wakeup_ok;

    match parent {
        ParentLink::Classic { .. } => vec![WorkItem::Implicit {
            start_time_us: state.wake_time_us.load(Ordering::Relaxed),
        }],
        ParentLink::Rps => {
            // Stopping: woken only to exit, nothing was ever queued.
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Arc<Config> {
        use crate::config::RawArgs;
        use clap::Parser;
        let raw = RawArgs::parse_from(["schedbench", "-F", "16", "-n", "1"]);
        Arc::new(Config::from_args(raw).unwrap())
    }

    #[test]
    fn classic_mode_wakes_and_records_one_implicit_request() {
        let cfg = test_config();
        let state = Arc::new(WorkerState::new(&cfg));
        let intake = Arc::new(IntakeList::new());
        let gate = Arc::new(BlockGate::new());
        let stopping = Arc::new(AtomicBool::new(false));

        let parent = ParentLink::Classic {
            intake: intake.clone(),
            gate: gate.clone(),
        };

        let state2 = state.clone();
        let stopping2 = stopping.clone();
        let cfg2 = cfg.clone();
        let worker_thread = std::thread::spawn(move || {
            let items = send_and_wait(&state2, &cfg2, &parent, &stopping2);
            items.len()
        });

        // Wait until the worker pushes itself, then drain and post as the
        // message thread would.
        let mut head = ptr::null_mut();
        for _ in 0..1000 {
            head = intake.drain();
            if !head.is_null() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(!head.is_null());
        unsafe {
            (*head).wake_time_us.store(clock::now_us(), Ordering::Relaxed);
        }
        unsafe { (*head).gate.post() };

        let n = worker_thread.join().unwrap();
        assert_eq!(n, 1);
        assert_eq!(state.wakeup_hist.nr_samples(), 1);
    }

    #[test]
    fn fill_pipe_page_overwrites_every_byte() {
        let cfg = test_config();
        let state = WorkerState::new(&cfg);
        state.fill_pipe_page(0xa5);
        let page = state.pipe_page.lock().unwrap();
        assert!(page.iter().all(|&b| b == 0xa5));
    }

    #[test]
    fn rps_mode_fast_path_returns_without_parking() {
        let cfg = test_config();
        let state = Arc::new(WorkerState::new(&cfg));
        let stopping = Arc::new(AtomicBool::new(false));

        let req = Box::into_raw(Box::new(Request::new(clock::now_us())));
        state.push_request(req);

        let items = send_and_wait(&state, &cfg, &ParentLink::Rps, &stopping);
        assert_eq!(items.len(), 1);
        assert_eq!(state.wakeup_hist.nr_samples(), 1);
    }
}
