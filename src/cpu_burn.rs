//! Cache-footprint-sized matrix-multiply kernel.
//!
//! Grounded on the teacher's `stressor.rs::cpu_stressor_routine`: a naive
//! triple-loop matrix multiply with a `std::ptr::write_volatile` at the end
//! to block the optimizer from eliding the "dead" result. This crate keeps
//! that volatile-write discipline but works over `u64` wrapping arithmetic
//! rather than `f64`, per the spec's "machine-word integers," and has no
//! counterpart to the teacher's sin/cos filler loop.

/// Matrix side length for a target L1/L2 footprint: three `matrix_size *
/// matrix_size` word matrices must fit in `cache_footprint_kb` KiB.
pub fn matrix_size_for_footprint(cache_footprint_kb: usize) -> usize {
    let word_size = std::mem::size_of::<u64>();
    let total_words = (cache_footprint_kb * 1024) / 3 / word_size;
    (total_words as f64).sqrt().floor() as usize
}

/// Scratch buffer for one worker's `CpuBurn`: three adjacent `n * n`
/// matrices (A, B, C) seeded once at setup.
pub struct CpuBurnBuffer {
    n: usize,
    data: Vec<u64>,
}

impl CpuBurnBuffer {
    pub fn new(cache_footprint_kb: usize) -> Self {
        let n = matrix_size_for_footprint(cache_footprint_kb).max(1);
        let mut data = vec![0u64; n * n * 3];
        for (i, slot) in data.iter_mut().enumerate() {
            *slot = (i as u64).wrapping_mul(2654435761).wrapping_add(1);
        }
        CpuBurnBuffer { n, data }
    }

    pub fn matrix_size(&self) -> usize {
        self.n
    }

    /// Run `operations` naive triple-loop matrix multiplies `C = A * B`,
    /// wrapping on overflow. The result is written back into `C` with a
    /// volatile store so the loop cannot be optimized away as dead code.
    pub fn burn(&mut self, operations: u32) {
        let n = self.n;
        if n == 0 {
            return;
        }
        let (a, rest) = self.data.split_at_mut(n * n);
        let (b, c) = rest.split_at_mut(n * n);

        for _ in 0..operations {
            for i in 0..n {
                for j in 0..n {
                    let mut sum: u64 = 0;
                    for k in 0..n {
                        sum = sum.wrapping_add(a[i * n + k].wrapping_mul(b[k * n + j]));
                    }
                    unsafe {
                        std::ptr::write_volatile(&mut c[i * n + j], sum);
                    }
                }
            }
        }
    }
}
