//! Rotating Bucket Array
//!
//! A flat ring of bounded FIFO buckets with a rotating head. The head bucket is the current
//! highest-priority slot; a rank is mapped onto an offset from the head through a fixed linear
//! scale.
//!
//! Algorithm:
//! 1. Admission maps the rank to `offset` in `[0, B)` and targets `(head + offset) mod B`
//! 2. If the target is full, scan backward `target-1, target-2, ...` (mod B) down to the head and
//!    insert into the first bucket with room; drop only when every bucket in `[head, target]` is full.
//!    A full head target scans the whole ring
//! 3. Service rotates the head forward past empty buckets, then pops the head bucket's oldest item
//!
//! Rotation guarantees forward progress as the head drains, and the backward scan absorbs bursts
//! that would otherwise be dropped outright.
//!
//! Every call takes one exclusive lock that spans rank extraction, routing, mutation and counter
//! updates, so operations are atomic with respect to each other and the array can be shared
//! between threads behind an `Arc`. Diagnostics are computed under that lock but handed to the
//! observer after it is released, so a slow sink never extends the critical section.

use crate::bucket::Bucket;
use crate::config::{validate_shape, QueueConfig, RankScale, SchedulerKind};
use crate::error::ConfigError;
use crate::observer::{Diagnostics, QueueObserver};
use crate::rank::{checked_rank, Ranked};
use crate::scheduler::RankScheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Mutable state guarded by the array's lock.
#[derive(Debug)]
struct Ring<T> {
    buckets: Vec<Bucket<T>>,
    /// Items per bucket.
    occupancy: Vec<usize>,
    /// Set when a bucket reaches capacity, for O(1) admission checks.
    full: Vec<bool>,
    /// Current highest-priority bucket.
    head: usize,
    /// Items across all buckets.
    len: usize,
}

impl<T> Ring<T> {
    fn new(buckets: usize, capacity: usize) -> Self {
        Self {
            buckets: (0..buckets).map(|_| Bucket::new(capacity)).collect(),
            occupancy: vec![0; buckets],
            full: vec![false; buckets],
            head: 0,
            len: 0,
        }
    }

    fn size(&self) -> usize {
        self.buckets.len()
    }

    /// First bucket with room, scanning backward from `target` down to and including the head.
    ///
    /// When `target` is the head itself the scan wraps through every other bucket.
    fn slot_for(&self, target: usize) -> Option<usize> {
        if !self.full[target] {
            return Some(target);
        }
        let size = self.size();
        let mut index = target;
        loop {
            index = (index + size - 1) % size;
            if !self.full[index] {
                return Some(index);
            }
            if index == self.head {
                return None;
            }
        }
    }

    fn insert(&mut self, slot: usize, item: T, capacity: usize) {
        let stored = self.buckets[slot].push(item);
        debug_assert!(stored, "bucket {slot} accepted past its full flag");
        self.occupancy[slot] += 1;
        self.len += 1;
        if self.occupancy[slot] == capacity {
            self.full[slot] = true;
        }
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.occupancy.iter_mut().for_each(|count| *count = 0);
        self.full.iter_mut().for_each(|full| *full = false);
        self.head = 0;
        self.len = 0;
    }
}

/// Approximate priority queue backed by a ring of buckets with a rotating head.
#[derive(Debug)]
pub struct RotatingArray<T> {
    scale: RankScale,
    buckets: usize,
    capacity: usize,
    queue_id: u64,
    ring: Mutex<Ring<T>>,
    /// Observer slot, locked only after `ring` has been released.
    diagnostics: Mutex<Diagnostics>,
    /// Mirrors `Diagnostics::is_active` so the serve path can skip diagnostics without locking.
    observing: AtomicBool,
    count_inversions: bool,
}

impl<T> RotatingArray<T> {
    /// Build a ring of `buckets` buckets holding `capacity` items each.
    ///
    /// # Arguments
    /// * `buckets` - Number of buckets in the ring (B)
    /// * `capacity` - Per-bucket capacity (C)
    /// * `scale` - Rank domain spread over the `B` offsets
    ///
    /// # Errors
    /// Fails when `buckets` or `capacity` is zero, or when the scale is not a finite positive value.
    pub fn new(buckets: usize, capacity: usize, scale: RankScale) -> Result<Self, ConfigError> {
        Self::build(0, buckets, capacity, scale, Diagnostics::new(0, Default::default()))
    }

    /// Build a ring from a full queue configuration, including its diagnostics selection.
    pub fn from_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        Self::build(
            config.queue_id,
            config.buckets,
            config.capacity,
            config.scale,
            Diagnostics::new(config.queue_id, config.diagnostics),
        )
    }

    fn build(
        queue_id: u64,
        buckets: usize,
        capacity: usize,
        scale: RankScale,
        diagnostics: Diagnostics,
    ) -> Result<Self, ConfigError> {
        validate_shape(buckets, capacity)?;
        scale.validate()?;
        Ok(Self {
            scale,
            buckets,
            capacity,
            queue_id,
            ring: Mutex::new(Ring::new(buckets, capacity)),
            count_inversions: diagnostics.wants_inversions_once_attached(),
            diagnostics: Mutex::new(diagnostics),
            observing: AtomicBool::new(false),
        })
    }

    pub fn queue_id(&self) -> u64 {
        self.queue_id
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn scale(&self) -> RankScale {
        self.scale
    }

    /// Index of the bucket currently treated as highest priority.
    pub fn head(&self) -> usize {
        self.ring.lock().head
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().len == 0
    }

    /// Occupancy of every bucket, in index order.
    pub fn bucket_lens(&self) -> Vec<usize> {
        self.ring.lock().occupancy.clone()
    }

    /// Empty every bucket and move the head back to bucket 0.
    pub fn clear(&self) {
        self.ring.lock().clear();
    }

    pub fn attach_observer(&self, observer: Box<dyn QueueObserver>) {
        let mut diagnostics = self.diagnostics.lock();
        diagnostics.attach(observer);
        self.observing.store(diagnostics.is_active(), Ordering::Release);
    }

    pub fn detach_observer(&self) -> Option<Box<dyn QueueObserver>> {
        let mut diagnostics = self.diagnostics.lock();
        self.observing.store(false, Ordering::Release);
        diagnostics.detach()
    }
}

impl<T: Ranked> RotatingArray<T> {
    /// Place an item relative to the current head.
    ///
    /// # Returns
    /// `true` if the item was stored, `false` if the target bucket and every bucket between it and
    /// the head are full.
    ///
    /// # Panics
    /// Panics if the item's rank is not finite.
    pub fn admit(&self, item: T) -> bool {
        let mut guard = self.ring.lock();
        let ring = &mut *guard;

        let rank = checked_rank(&item);
        let offset = self.scale.offset(rank, self.buckets);
        let target = (ring.head + offset) % self.buckets;

        match ring.slot_for(target) {
            Some(slot) => {
                ring.insert(slot, item, self.capacity);
                true
            }
            None => {
                tracing::trace!(
                    queue_id = self.queue_id,
                    rank,
                    target,
                    head = ring.head,
                    "no bucket with room between target and head, dropping"
                );
                false
            }
        }
    }

    /// Remove and return the oldest item of the head bucket, rotating past empty buckets first.
    ///
    /// An attached observer is notified after the ring lock is released. Reports from concurrent
    /// serves may therefore reach the observer in a different order than the items left the ring.
    pub fn serve(&self) -> Option<T> {
        let (item, report) = {
            let mut guard = self.ring.lock();
            let ring = &mut *guard;

            if ring.len == 0 {
                return None;
            }
            while ring.occupancy[ring.head] == 0 {
                ring.head = (ring.head + 1) % self.buckets;
                tracing::trace!(queue_id = self.queue_id, head = ring.head, "head rotated");
            }

            let head = ring.head;
            let item = ring.buckets[head].pop()?;
            ring.occupancy[head] -= 1;
            ring.full[head] = false;
            ring.len -= 1;

            let report = self.observing.load(Ordering::Acquire).then(|| {
                let rank = item.rank();
                let inversions = self.count_inversions.then(|| {
                    ring.buckets[head]
                        .iter()
                        .filter(|resident| resident.rank() < rank)
                        .count()
                });
                (rank, head, inversions)
            });
            (item, report)
        };

        if let Some((rank, bucket, inversions)) = report {
            self.diagnostics.lock().served(rank, bucket, inversions, None);
        }
        Some(item)
    }

    /// Admit every item and return how many were accepted.
    pub fn admit_all<I: IntoIterator<Item = T>>(&self, items: I) -> usize {
        items
            .into_iter()
            .fold(0, |accepted, item| accepted + usize::from(self.admit(item)))
    }
}

impl<T: Ranked> RankScheduler<T> for RotatingArray<T> {
    fn admit(&mut self, item: T) -> bool {
        RotatingArray::admit(self, item)
    }

    fn serve(&mut self) -> Option<T> {
        RotatingArray::serve(self)
    }

    fn len(&self) -> usize {
        RotatingArray::len(self)
    }

    fn clear(&mut self) {
        RotatingArray::clear(self)
    }

    fn bucket_lens(&self) -> Vec<usize> {
        RotatingArray::bucket_lens(self)
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::RotatingArray
    }

    fn attach_observer(&mut self, observer: Box<dyn QueueObserver>) {
        RotatingArray::attach_observer(self, observer)
    }
}
