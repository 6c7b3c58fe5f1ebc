//! Per-CPU locking discipline.
//!
//! Guarantees at most one `CpuBurn` runs per physical CPU at a time. A thread
//! may migrate between reading its CPU id and acquiring the matching lock;
//! the post-acquisition re-check in `lock_this_cpu` is load-bearing (§9) --
//! without it, a migrated thread could hold a stale CPU's lock while a
//! different thread now runs on that CPU unguarded.
//!
//! `current_cpu()` is `libc::sched_getcpu()`. The teacher's
//! `stressor.rs::setup_stressor_environment` is in the same affinity-aware
//! neighborhood but only ever *pins* (`nix::sched::sched_setaffinity`/
//! `CpuSet`) -- it never queries which CPU a thread is currently on, so
//! `sched_getcpu()` itself has no teacher precedent; it is introduced fresh
//! here because the lock protocol (trylock, then re-verify identity) needs
//! to ask "where am I now", not just "pin me somewhere", per §4.4/§9.

use std::sync::Mutex;

use once_cell::sync::OnceCell;

static NUM_CPUS: OnceCell<usize> = OnceCell::new();

/// `num_cpus::get()`, cached after the first call. The count is queried
/// repeatedly during setup (default worker-thread count, per-CPU lock
/// sizing) and never changes for the process's lifetime.
pub fn cached_num_cpus() -> usize {
    *NUM_CPUS.get_or_init(|| num_cpus::get().max(1))
}

/// One mutex per logical CPU, sized to `num_cpus::get()` at construction.
pub struct PerCpuLock {
    locks: Vec<Mutex<()>>,
}

/// RAII guard: the held per-CPU mutex, released on drop.
pub struct CpuGuard<'a> {
    _guard: std::sync::MutexGuard<'a, ()>,
    pub cpu: usize,
}

impl PerCpuLock {
    pub fn new(num_cpus: usize) -> Self {
        let mut locks = Vec::with_capacity(num_cpus.max(1));
        for _ in 0..num_cpus.max(1) {
            locks.push(Mutex::new(()));
        }
        PerCpuLock { locks }
    }

    /// Acquire the lock for whichever CPU this thread is currently running
    /// on, re-verifying CPU identity after acquisition to defend against
    /// migration between the `getcpu()` read and the `trylock`.
    pub fn lock_this_cpu(&self) -> CpuGuard<'_> {
        loop {
            let cpu = current_cpu() % self.locks.len();
            let guard = loop {
                match self.locks[cpu].try_lock() {
                    Ok(g) => break g,
                    Err(_) => std::hint::spin_loop(),
                }
            };

            let cpu_after = current_cpu() % self.locks.len();
            if cpu_after == cpu {
                return CpuGuard { _guard: guard, cpu };
            }
            // Migrated mid-acquisition: drop this lock and retry on the CPU
            // we're actually on now.
            drop(guard);
        }
    }

    pub fn num_cpus(&self) -> usize {
        self.locks.len()
    }
}

/// The logical CPU this thread is currently scheduled on.
pub fn current_cpu() -> usize {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        0
    } else {
        cpu as usize
    }
}
