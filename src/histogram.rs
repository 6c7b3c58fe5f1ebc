//! Logarithmic latency histogram.
//!
//! This is "mr axboe's magic latency histogram" (the same bucketing scheme
//! used by `fio`): 19 groups of 256 linear buckets each. Values below
//! `2*PLAT_VAL` are stored at full precision; larger values are bucketed
//! with a relative error bounded by `1/PLAT_VAL` by discarding their low
//! bits and keeping only the top `PLAT_BITS` bits plus a group offset.
//!
//! Buckets are atomics so `&Histogram` can be shared across the worker
//! thread that records samples and the observer thread that aggregates them,
//! without an outer lock (see §3 of the spec: "Histogram updates from any
//! thread use atomic add").

use std::sync::atomic::{AtomicU64, Ordering};

pub const PLAT_BITS: u32 = 8;
pub const PLAT_VAL: u32 = 1 << PLAT_BITS;
pub const PLAT_GROUP_NR: u32 = 19;
pub const PLAT_NR: usize = (PLAT_GROUP_NR * PLAT_VAL) as usize;

/// Map a sample value to its bucket index.
pub fn val_to_idx(val: u64) -> usize {
    let val = val.min(u32::MAX as u64) as u32;
    if val == 0 {
        return 0;
    }
    let msb = 31 - val.leading_zeros();
    if msb <= PLAT_BITS {
        return val as usize;
    }

    let error_bits = msb - PLAT_BITS;
    let base = (error_bits + 1) << PLAT_BITS;
    let offset = (PLAT_VAL - 1) & (val >> error_bits);

    let idx = (base + offset) as usize;
    idx.min(PLAT_NR - 1)
}

/// Map a bucket index back to the representative value of that bucket.
pub fn idx_to_val(idx: usize) -> u64 {
    assert!(idx < PLAT_NR, "bucket index {idx} out of range");

    if idx < (PLAT_VAL as usize) << 1 {
        return idx as u64;
    }

    let error_bits = (idx as u32 >> PLAT_BITS) - 1;
    let base: u64 = 1u64 << (error_bits + PLAT_BITS);
    let k = idx as u32 % PLAT_VAL;

    base + (((k as f64 + 0.5) * (1u64 << error_bits) as f64) as u64)
}

/// A latency histogram: 4864 atomic bucket counters plus min/max/count.
pub struct Histogram {
    buckets: Box<[AtomicU64]>,
    nr_samples: AtomicU64,
    // min/max are intentionally plain (non-atomic) u64s guarded only by a
    // racy read-compare-write, matching the C source's unguarded updates:
    // under contention they may slightly overestimate min / underestimate
    // max, which is an accepted approximation (§4.1).
    min: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        let buckets = (0..PLAT_NR).map(|_| AtomicU64::new(0)).collect();
        Histogram {
            buckets,
            nr_samples: AtomicU64::new(0),
            min: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record one sample, in the histogram's native unit (microseconds for
    /// wakeup/request latencies, requests/sec for the RPS histogram).
    pub fn record(&self, value: u64) {
        let max = self.max.load(Ordering::Relaxed);
        if value > max {
            self.max.store(value, Ordering::Relaxed);
        }
        let min = self.min.load(Ordering::Relaxed);
        if min == 0 || value < min {
            self.min.store(value, Ordering::Relaxed);
        }

        let idx = val_to_idx(value);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.nr_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nr_samples(&self) -> u64 {
        self.nr_samples.load(Ordering::Relaxed)
    }

    pub fn min(&self) -> u64 {
        self.min.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Zero every bucket and the min/max/count fields.
    pub fn clear(&self) {
        for b in self.buckets.iter() {
            b.store(0, Ordering::Relaxed);
        }
        self.nr_samples.store(0, Ordering::Relaxed);
        self.min.store(0, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }

    /// Fold `other`'s counts into `self`: bucket-wise sum, max of maxes, min
    /// of mins (ignoring a zero min, meaning "no samples").
    pub fn combine(&self, other: &Histogram) {
        for (d, s) in self.buckets.iter().zip(other.buckets.iter()) {
            let v = s.load(Ordering::Relaxed);
            if v != 0 {
                d.fetch_add(v, Ordering::Relaxed);
            }
        }
        self.nr_samples
            .fetch_add(other.nr_samples.load(Ordering::Relaxed), Ordering::Relaxed);

        let other_max = other.max.load(Ordering::Relaxed);
        if other_max > self.max.load(Ordering::Relaxed) {
            self.max.store(other_max, Ordering::Relaxed);
        }
        let other_min = other.min.load(Ordering::Relaxed);
        let self_min = self.min.load(Ordering::Relaxed);
        if other_min != 0 && (self_min == 0 || other_min < self_min) {
            self.min.store(other_min, Ordering::Relaxed);
        }
    }

    /// Snapshot the bucket counts, for use by the percentile calculator
    /// (kept separate from `record` so aggregation reads a single consistent
    /// vector rather than re-reading atomics mid-walk).
    fn snapshot(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    /// Compute `(value, count)` pairs for each percentile in `plist`
    /// (ascending, each in `(0, 100]`). `count` at index `j` is the number of
    /// samples newly crossed since the previous percentile's threshold (the
    /// first entry keeps its absolute cumulative count), matching the C
    /// source's `calc_percentiles`.
    pub fn percentiles(&self, plist: &[f64]) -> Vec<(u64, u64)> {
        if plist.is_empty() {
            return Vec::new();
        }
        let nr = self.nr_samples();
        let buckets = self.snapshot();

        let mut out: Vec<(u64, u64)> = Vec::with_capacity(plist.len());
        let mut sum: u64 = 0;
        let mut j = 0usize;

        'outer: for (i, count) in buckets.iter().enumerate() {
            sum += count;
            while (sum as f64) >= (plist[j] / 100.0 * nr as f64) {
                out.push((idx_to_val(i), sum));
                let is_last = j + 1 == plist.len();
                if is_last {
                    break 'outer;
                }
                j += 1;
            }
        }

        // If the loop exhausted all buckets without satisfying every
        // percentile (possible only with nr_samples == 0), fill the rest
        // with the final observed value/count.
        while out.len() < plist.len() {
            let (last_val, last_count) = out.last().copied().unwrap_or((0, 0));
            out.push((last_val, last_count));
        }

        let mut last = 0u64;
        for i in 1..out.len() {
            last += out[i - 1].1;
            out[i].1 -= last;
        }

        out
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
