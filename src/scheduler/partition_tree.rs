//! Adaptive Partition Tree
//!
//! A fixed-shape binary tree over bucket indices. Leaves own one bounded FIFO bucket each; internal
//! nodes own exactly two children. Every node carries a `(lower, upper)` bound that tracks the ranks
//! recently routed beneath it, so the tree behaves as a self-organising classifier that steers items
//! of similar rank into the same bucket.
//!
//! Algorithm:
//! 1. Admission descends from the root. At an internal node the threshold is the midpoint of the
//!    node's bound; ranks at or below it go left, others go right
//! 2. At the leaf, a full bucket drops the item (no search elsewhere). Otherwise the item is
//!    appended and the leaf bound becomes `(rank, rank)`
//! 3. Walking back up, each ancestor recomputes `lower` as the midpoint of its left child's bound
//!    and `upper` as the midpoint of its right child's bound
//! 4. Service is a depth-first search, left child first, popping the head of the first non-empty
//!    bucket; the bounds along that path are recomputed on the way back
//!
//! Service order is by bucket index, so approximate priority only emerges because routing keeps
//! buckets roughly rank-sorted. Local inversions are expected and can be measured through the
//! observer hooks.
//!
//! Bounds start at zero. Until ranks have been observed, routing is biased towards one side; a
//! subtree that has never admitted anything routes left, so a fresh tree fills bucket 0 first.

use crate::bucket::Bucket;
use crate::config::{validate_shape, QueueConfig, SchedulerKind};
use crate::error::ConfigError;
use crate::observer::{Diagnostics, QueueObserver};
use crate::rank::{checked_rank, Ranked};
use crate::scheduler::RankScheduler;
use serde::{Deserialize, Serialize};

/// Adaptive estimate of the ranks routed beneath a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Degenerate bound covering a single rank.
    pub const fn point(rank: f64) -> Self {
        Self {
            lower: rank,
            upper: rank,
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

#[derive(Debug)]
struct Leaf<T> {
    index: usize,
    bound: Bound,
    observed: bool,
    bucket: Bucket<T>,
}

#[derive(Debug)]
struct Internal<T> {
    /// First bucket index covered by this subtree (fixed at build time).
    start: usize,
    /// Last bucket index covered by this subtree (fixed at build time).
    end: usize,
    bound: Bound,
    observed: bool,
    /// Items resident in the whole subtree, lets service skip empty halves.
    len: usize,
    left: Box<Node<T>>,
    right: Box<Node<T>>,
}

#[derive(Debug)]
enum Node<T> {
    Leaf(Leaf<T>),
    Internal(Internal<T>),
}

impl<T> Node<T> {
    /// Recursively bisect `[start, end]`.
    fn build(start: usize, end: usize, capacity: usize) -> Node<T> {
        if start == end {
            return Node::Leaf(Leaf {
                index: start,
                bound: Bound::default(),
                observed: false,
                bucket: Bucket::new(capacity),
            });
        }
        let mid = (start + end) / 2;
        let mut internal = Internal {
            start,
            end,
            bound: Bound::default(),
            observed: false,
            len: 0,
            left: Box::new(Node::build(start, mid, capacity)),
            right: Box::new(Node::build(mid + 1, end, capacity)),
        };
        internal.refresh();
        Node::Internal(internal)
    }

    fn bound(&self) -> Bound {
        match self {
            Node::Leaf(leaf) => leaf.bound,
            Node::Internal(internal) => internal.bound,
        }
    }

    fn observed(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.observed,
            Node::Internal(internal) => internal.observed,
        }
    }

    fn len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.bucket.len(),
            Node::Internal(internal) => internal.len,
        }
    }

    /// Route `item` to a leaf.
    ///
    /// # Returns
    /// `Ok(bucket)` with the accepting bucket index, or `Err(bucket)` with the index of the full
    /// bucket the item was routed to (the item is dropped).
    fn admit(&mut self, item: T, rank: f64) -> Result<usize, usize> {
        match self {
            Node::Leaf(leaf) => {
                if !leaf.bucket.push(item) {
                    return Err(leaf.index);
                }
                leaf.bound = Bound::point(rank);
                leaf.observed = true;
                Ok(leaf.index)
            }
            Node::Internal(internal) => {
                let child = if internal.routes_left(rank) {
                    &mut internal.left
                } else {
                    &mut internal.right
                };
                let accepted = child.admit(item, rank)?;
                internal.refresh();
                Ok(accepted)
            }
        }
    }

    /// Pop the head of the leftmost non-empty bucket, with that bucket's index.
    fn serve(&mut self) -> Option<(usize, T)> {
        match self {
            Node::Leaf(leaf) => leaf.bucket.pop().map(|item| (leaf.index, item)),
            Node::Internal(internal) => {
                if internal.len == 0 {
                    return None;
                }
                let served = match internal.left.serve() {
                    Some(served) => Some(served),
                    None => internal.right.serve(),
                };
                internal.refresh();
                served
            }
        }
    }

    fn peek(&self) -> Option<&T> {
        match self {
            Node::Leaf(leaf) => leaf.bucket.peek(),
            Node::Internal(internal) => {
                if internal.len == 0 {
                    return None;
                }
                internal.left.peek().or_else(|| internal.right.peek())
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Node::Leaf(leaf) => leaf.bucket.clear(),
            Node::Internal(internal) => {
                internal.left.clear();
                internal.right.clear();
                internal.len = 0;
            }
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf<T>>) {
        match self {
            Node::Leaf(leaf) => out.push(leaf),
            Node::Internal(internal) => {
                internal.left.collect_leaves(out);
                internal.right.collect_leaves(out);
            }
        }
    }

    /// Leaf owning bucket `index`, found by the same bisection used at build time.
    fn leaf(&self, index: usize) -> Option<&Leaf<T>> {
        match self {
            Node::Leaf(leaf) => (leaf.index == index).then_some(leaf),
            Node::Internal(internal) => {
                if index < internal.start || index > internal.end {
                    return None;
                }
                let mid = (internal.start + internal.end) / 2;
                if index <= mid {
                    internal.left.leaf(index)
                } else {
                    internal.right.leaf(index)
                }
            }
        }
    }
}

impl<T> Internal<T> {
    fn routes_left(&self, rank: f64) -> bool {
        // nothing was ever admitted below, so the bounds carry no information yet
        if !self.observed {
            return true;
        }
        rank <= self.bound.midpoint()
    }

    /// Re-derive this node's bound and occupancy from its children.
    fn refresh(&mut self) {
        self.bound = Bound::new(self.left.bound().midpoint(), self.right.bound().midpoint());
        self.observed = self.left.observed() || self.right.observed();
        self.len = self.left.len() + self.right.len();
    }
}

impl<T: Ranked> Leaf<T> {
    /// Items still waiting in this bucket with a rank strictly lower than `rank`.
    fn count_below(&self, rank: f64) -> usize {
        self.bucket.iter().filter(|item| item.rank() < rank).count()
    }
}

/// Approximate priority queue backed by an adaptive partition tree.
///
/// Operations take `&mut self` and do no locking: the intended caller is a single-threaded
/// event loop. Wrap the tree in [`crate::scheduler::Exclusive`] to share it between threads.
#[derive(Debug)]
pub struct PartitionTree<T> {
    root: Node<T>,
    buckets: usize,
    capacity: usize,
    diagnostics: Diagnostics,
}

impl<T> PartitionTree<T> {
    /// Build a tree with `buckets` leaves of `capacity` items each.
    ///
    /// # Errors
    /// [`ConfigError::ZeroBuckets`] or [`ConfigError::ZeroCapacity`] when either is zero.
    pub fn new(buckets: usize, capacity: usize) -> Result<Self, ConfigError> {
        Self::with_queue_id(0, buckets, capacity)
    }

    pub fn with_queue_id(queue_id: u64, buckets: usize, capacity: usize) -> Result<Self, ConfigError> {
        validate_shape(buckets, capacity)?;
        Ok(Self {
            root: Node::build(0, buckets - 1, capacity),
            buckets,
            capacity,
            diagnostics: Diagnostics::new(queue_id, Default::default()),
        })
    }

    /// Build a tree from a full queue configuration, including its diagnostics selection.
    ///
    /// Only the shape is checked; `config.scale` and `config.kind` are ignored.
    pub fn from_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        let mut tree = Self::with_queue_id(config.queue_id, config.buckets, config.capacity)?;
        tree.diagnostics = Diagnostics::new(config.queue_id, config.diagnostics);
        Ok(tree)
    }

    pub fn queue_id(&self) -> u64 {
        self.diagnostics.queue_id()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of resident items.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.len() == 0
    }

    /// The item the next [`PartitionTree::serve`] would return.
    pub fn peek(&self) -> Option<&T> {
        self.root.peek()
    }

    /// Empty every bucket. Bounds keep their learned values.
    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Current bound of every leaf, in bucket order.
    pub fn bounds(&self) -> Vec<Bound> {
        self.leaves().iter().map(|leaf| leaf.bound).collect()
    }

    /// Occupancy of every bucket, in bucket order.
    pub fn bucket_lens(&self) -> Vec<usize> {
        self.leaves().iter().map(|leaf| leaf.bucket.len()).collect()
    }

    /// Resident items in bucket order, FIFO order within a bucket.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.leaves().into_iter().flat_map(|leaf| leaf.bucket.iter())
    }

    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.iter().any(|resident| resident == item)
    }

    pub fn attach_observer(&mut self, observer: Box<dyn QueueObserver>) {
        self.diagnostics.attach(observer);
    }

    pub fn detach_observer(&mut self) -> Option<Box<dyn QueueObserver>> {
        self.diagnostics.detach()
    }

    fn leaves(&self) -> Vec<&Leaf<T>> {
        let mut leaves = Vec::with_capacity(self.buckets);
        self.root.collect_leaves(&mut leaves);
        leaves
    }
}

impl<T: Ranked> PartitionTree<T> {
    /// Route an item to a bucket.
    ///
    /// # Returns
    /// `true` if the item was stored, `false` if the bucket it was routed to is full. A dropped
    /// item is released immediately; counting drops is the caller's job.
    ///
    /// # Panics
    /// Panics if the item's rank is not finite.
    pub fn admit(&mut self, item: T) -> bool {
        let rank = checked_rank(&item);
        match self.root.admit(item, rank) {
            Ok(_) => true,
            Err(bucket) => {
                tracing::trace!(queue_id = self.queue_id(), rank, bucket, "bucket full, dropping");
                false
            }
        }
    }

    /// Remove and return the head of the lowest-index non-empty bucket.
    pub fn serve(&mut self) -> Option<T> {
        let (bucket, item) = self.root.serve()?;
        if self.diagnostics.is_active() {
            self.report_served(bucket, &item);
        }
        Some(item)
    }

    /// Admit every item and return how many were accepted.
    pub fn admit_all<I: IntoIterator<Item = T>>(&mut self, items: I) -> usize {
        items
            .into_iter()
            .fold(0, |accepted, item| accepted + usize::from(self.admit(item)))
    }

    fn report_served(&mut self, bucket: usize, item: &T) {
        let rank = item.rank();
        let inversions = if self.diagnostics.wants_inversions() {
            self.root.leaf(bucket).map(|leaf| leaf.count_below(rank))
        } else {
            None
        };
        let bounds = self.diagnostics.wants_bounds().then(|| self.bounds());
        self.diagnostics.served(rank, bucket, inversions, bounds.as_deref());
    }
}

impl<T: Ranked> RankScheduler<T> for PartitionTree<T> {
    fn admit(&mut self, item: T) -> bool {
        PartitionTree::admit(self, item)
    }

    fn serve(&mut self) -> Option<T> {
        PartitionTree::serve(self)
    }

    fn len(&self) -> usize {
        PartitionTree::len(self)
    }

    fn clear(&mut self) {
        PartitionTree::clear(self)
    }

    fn bucket_lens(&self) -> Vec<usize> {
        PartitionTree::bucket_lens(self)
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::PartitionTree
    }

    fn attach_observer(&mut self, observer: Box<dyn QueueObserver>) {
        PartitionTree::attach_observer(self, observer)
    }
}
