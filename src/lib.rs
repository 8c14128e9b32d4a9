//! StripeMap: a fixed-size chained hash table with one lock per bucket, plus a
//! two-phase coordinator (bulk insert, barrier, bulk lookup) for measuring the
//! cost/benefit of lock striping against a single global lock.
//!
//! The table never resizes and never deletes. Lookups take no lock at all:
//! they are complete only because the coordinator joins every insert worker
//! before the lookup phase starts.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

// ================================================================================================
// ERRORS
// ================================================================================================

/// Configuration errors, rejected before any phase starts.
///
/// Everything else in this crate is fatal by design: allocation failure,
/// worker spawn failure, and worker panics abort the whole run. A one-shot
/// benchmark has no degraded mode to fall back to.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("bucket count must be at least 1")]
    InvalidBucketCount,
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
}

// ================================================================================================
// INTERNAL DATA STRUCTURES
// ================================================================================================

/// One chained entry. Never mutated after its pointer is published into a
/// bucket head, never freed before the owning map drops.
struct Entry {
    key: i64,
    val: i64,
    next: *const Entry,
}

/// One bucket: a stripe lock and the head of a newest-first entry chain.
///
/// The chain head is an atomic pointer rather than living inside the mutex so
/// that the lookup path can traverse without locking. Stores to `head` happen
/// only while `lock` is held; the `Release` store pairs with the `Acquire`
/// load in [`StripeMap::lookup`], so a published entry is always fully
/// initialized when a reader reaches it.
#[derive(Debug)]
struct Bucket {
    lock: Mutex<()>,
    head: AtomicPtr<Entry>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

// ================================================================================================
// STRIPED HASH TABLE
// ================================================================================================

/// Fixed-size chained hash table with one mutex per bucket.
///
/// Duplicate keys are permitted: `insert` prepends unconditionally, and
/// `lookup` returns the first match in traversal order, i.e. the most recent
/// insert of that key. The stripe count bounds mutation parallelism; with few
/// buckets, contention persists even with striping. That is the tunable this
/// crate exists to demonstrate, not a defect.
#[derive(Debug)]
pub struct StripeMap {
    buckets: Box<[Bucket]>,
}

impl StripeMap {
    /// Create a table with `bucket_count` buckets and stripe locks.
    ///
    /// The bucket array is allocated once and never resized. Rejects a zero
    /// bucket count before any worker can touch the table.
    pub fn with_buckets(bucket_count: usize) -> Result<Self, Error> {
        if bucket_count == 0 {
            return Err(Error::InvalidBucketCount);
        }
        let buckets: Box<[Bucket]> = (0..bucket_count).map(|_| Bucket::new()).collect();
        Ok(Self { buckets })
    }

    /// Number of buckets (stripes) in the table.
    #[inline(always)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index for a key: Euclidean `key mod bucket_count`, so negative
    /// keys land in range too.
    #[inline(always)]
    fn bucket_index(&self, key: i64) -> usize {
        key.rem_euclid(self.buckets.len() as i64) as usize
    }

    /// Insert a key/value pair.
    ///
    /// Acquires the target bucket's stripe lock, prepends a fresh entry, and
    /// releases the lock. Inserts into distinct buckets proceed in parallel;
    /// the bucket lock is the sole serialization point for its chain. Does not
    /// check for an existing entry with the same key.
    pub fn insert(&self, key: i64, val: i64) {
        let bucket = &self.buckets[self.bucket_index(key)];
        let _guard = bucket.lock.lock();

        // All stores to head happen under this lock, so Relaxed is enough to
        // read our own predecessor's store.
        let old_head = bucket.head.load(Ordering::Relaxed);
        let entry = Box::into_raw(Box::new(Entry {
            key,
            val,
            next: old_head,
        }));
        // Release-publish: the entry's fields are visible before its pointer.
        bucket.head.store(entry, Ordering::Release);
    }

    /// Look up a key without taking any lock.
    ///
    /// Traverses the bucket's chain and returns the value of the first entry
    /// with a matching key (the most recent insert of that key), or `None` if
    /// the chain ends.
    ///
    /// # Phase contract
    ///
    /// This path holds no lock. A lookup racing an in-flight insert is
    /// memory-safe (entries are release-published and never freed during the
    /// run) but is not guaranteed to observe it. Completeness, meaning every
    /// inserted key is found, holds only when no insert is in flight; the phase
    /// coordinator guarantees this by joining all insert workers before any
    /// lookup worker starts. Do not "fix" this with a per-bucket read lock; the
    /// lock-free read is the characteristic under measurement.
    pub fn lookup(&self, key: i64) -> Option<i64> {
        let bucket = &self.buckets[self.bucket_index(key)];
        let mut cur = bucket.head.load(Ordering::Acquire) as *const Entry;
        while !cur.is_null() {
            // SAFETY: cur was release-published by insert and entries are
            // immutable and live until the map drops.
            let entry = unsafe { &*cur };
            if entry.key == key {
                return Some(entry.val);
            }
            cur = entry.next;
        }
        None
    }

    /// Total number of entries, by chain traversal.
    pub fn len(&self) -> usize {
        (0..self.buckets.len()).map(|b| self.bucket_len(b)).sum()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chain length of a single bucket.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    pub fn bucket_len(&self, idx: usize) -> usize {
        self.iter_bucket(idx).count()
    }

    /// Iterate one bucket's `(key, val)` pairs in traversal order
    /// (newest insert first).
    ///
    /// Intended for verification after a phase has completed; like `lookup`
    /// it takes no lock and may miss in-flight inserts.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    pub fn iter_bucket(&self, idx: usize) -> BucketIter<'_> {
        BucketIter {
            cur: self.buckets[idx].head.load(Ordering::Acquire) as *const Entry,
            _map: self,
        }
    }
}

impl Drop for StripeMap {
    fn drop(&mut self) {
        // Exclusive access: reclaim every chain.
        for bucket in self.buckets.iter_mut() {
            let mut cur = *bucket.head.get_mut();
            while !cur.is_null() {
                // SAFETY: every non-null pointer reachable from a head came
                // from Box::into_raw in insert and is freed exactly once here.
                let entry = unsafe { Box::from_raw(cur) };
                cur = entry.next as *mut Entry;
            }
        }
    }
}

/// Iterator over one bucket's chain, newest-first.
pub struct BucketIter<'a> {
    cur: *const Entry,
    _map: &'a StripeMap,
}

impl Iterator for BucketIter<'_> {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        // SAFETY: chain entries outlive the shared borrow held by `_map`.
        let entry = unsafe { &*self.cur };
        self.cur = entry.next;
        Some((entry.key, entry.val))
    }
}

// ================================================================================================
// PHASE COORDINATOR
// ================================================================================================

/// Outcome of a lookup phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupStats {
    /// Miss count per worker, indexed by worker id.
    pub per_worker: Vec<u64>,
    /// Sum of all per-worker miss counts ("lost" keys).
    pub total_lost: u64,
}

/// Run the bulk-insert phase: `worker_count` fresh threads, worker `t`
/// inserting `keys[i]` with value `t` for every index `i` where
/// `i mod worker_count == t`.
///
/// Partitioning is by index position, not key value, so the bucket contention
/// pattern follows the key distribution. Returns only after every worker has
/// finished; that join is the phase barrier that makes a subsequent
/// [`run_lookup_phase`] complete. A worker panic or spawn failure propagates
/// and aborts the run.
pub fn run_insert_phase(
    table: &StripeMap,
    keys: &[i64],
    worker_count: usize,
) -> Result<(), Error> {
    if worker_count == 0 {
        return Err(Error::InvalidWorkerCount);
    }
    debug!(
        workers = worker_count,
        keys = keys.len(),
        buckets = table.bucket_count(),
        "insert phase start"
    );
    thread::scope(|s| {
        for t in 0..worker_count {
            s.spawn(move || {
                // Workers with t >= keys.len() iterate zero times.
                for i in (t..keys.len()).step_by(worker_count) {
                    table.insert(keys[i], t as i64);
                }
            });
        }
        // Scope exit joins every worker: the phase barrier.
    });
    debug!(inserted = keys.len(), "insert phase complete");
    Ok(())
}

/// Run the bulk-lookup phase with the same index-position partitioning as
/// [`run_insert_phase`]; each worker counts the keys it fails to find.
///
/// Misses are not errors: the lost count is the signal this benchmark exists
/// to surface. Each worker owns a private counter; counts are combined only
/// after all workers have joined.
pub fn run_lookup_phase(
    table: &StripeMap,
    keys: &[i64],
    worker_count: usize,
) -> Result<LookupStats, Error> {
    if worker_count == 0 {
        return Err(Error::InvalidWorkerCount);
    }
    debug!(
        workers = worker_count,
        keys = keys.len(),
        "lookup phase start"
    );
    let per_worker = thread::scope(|s| {
        let handles: Vec<_> = (0..worker_count)
            .map(|t| {
                s.spawn(move || {
                    let mut lost = 0u64;
                    for i in (t..keys.len()).step_by(worker_count) {
                        if table.lookup(keys[i]).is_none() {
                            lost += 1;
                        }
                    }
                    debug!(worker = t, lost, "lookup worker finished");
                    lost
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(lost) => lost,
                // Worker failure is fatal for the whole run.
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<u64>>()
    });
    let total_lost = per_worker.iter().sum();
    debug!(total_lost, "lookup phase complete");
    Ok(LookupStats {
        per_worker,
        total_lost,
    })
}
