//! Metrics collection and reporting utilities.
//!
//! Schedulers push diagnostics through a [`ChannelObserver`](crate::observer::ChannelObserver) on
//! the serve path. The [`MetricsCollector`] owns the receiving end and folds pending events into
//! per-queue aggregates when drained, so the serve path never touches the aggregate lock.
//! Admission outcomes do not go through the channel: the owning caller reports each one with
//! [`MetricsCollector::record_admission`], which takes the aggregate lock once per call.

use crate::observer::DiagnosticEvent;
use crate::scheduler::Bound;
use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Events folded per lock acquisition while draining.
const DRAIN_BATCH: usize = 256;

/// Service statistics for one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketService {
    pub served: u64,
    pub min_rank: Option<f64>,
    pub max_rank: Option<f64>,
}

impl BucketService {
    fn record(&mut self, rank: f64) {
        self.served += 1;
        self.min_rank = Some(self.min_rank.map_or(rank, |min| min.min(rank)));
        self.max_rank = Some(self.max_rank.map_or(rank, |max| max.max(rank)));
    }
}

/// Rolling statistics for one queue.
#[derive(Debug, Clone, Default)]
struct QueueMetrics {
    admitted: u64,
    dropped: u64,
    served: u64,
    buckets: BTreeMap<usize, BucketService>,
    inversion_events: u64,
    inversions_total: u64,
    /// Inversions keyed by the integer part of the served rank.
    inversions_per_rank: BTreeMap<i64, u64>,
    bounds: Vec<Bound>,
}

impl QueueMetrics {
    fn apply(&mut self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::RankMapping { rank, bucket, .. } => {
                self.served += 1;
                self.buckets.entry(*bucket).or_default().record(*rank);
            }
            DiagnosticEvent::BoundSnapshot { bounds, .. } => {
                self.bounds.clone_from(bounds);
            }
            DiagnosticEvent::Inversions { rank, count, .. } => {
                self.inversion_events += 1;
                self.inversions_total += *count as u64;
                *self
                    .inversions_per_rank
                    .entry(rank.floor() as i64)
                    .or_default() += *count as u64;
            }
        }
    }

    fn snapshot(&self, queue_id: u64) -> MetricsSnapshot {
        let offered = self.admitted + self.dropped;
        MetricsSnapshot {
            queue_id,
            admitted: self.admitted,
            dropped: self.dropped,
            drop_rate: if offered == 0 {
                0.0
            } else {
                self.dropped as f64 / offered as f64
            },
            served: self.served,
            buckets: self.buckets.clone(),
            inversion_events: self.inversion_events,
            inversions_total: self.inversions_total,
            inversions_per_rank: self.inversions_per_rank.clone(),
            bounds: self.bounds.clone(),
        }
    }
}

/// Snapshot of one queue's metrics, emitted to external listeners (binary output, tests).
///
/// `served` and `buckets` are fed by rank-mapping diagnostics, `bounds` by bound snapshots and the
/// inversion fields by inversion diagnostics; a diagnostic that is disabled leaves its fields at
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub queue_id: u64,
    pub admitted: u64,
    pub dropped: u64,
    pub drop_rate: f64,
    pub served: u64,
    pub buckets: BTreeMap<usize, BucketService>,
    pub inversion_events: u64,
    pub inversions_total: u64,
    pub inversions_per_rank: BTreeMap<i64, u64>,
    pub bounds: Vec<Bound>,
}

/// Aggregates diagnostics from any number of queues.
pub struct MetricsCollector {
    events_rx: Receiver<DiagnosticEvent>,
    queues: Mutex<HashMap<u64, QueueMetrics>>,
}

impl MetricsCollector {
    /// Create a collector draining `events_rx`.
    ///
    /// # Arguments
    /// * `events_rx` - Receiving end paired with the observers attached to the queues
    pub fn new(events_rx: Receiver<DiagnosticEvent>) -> Self {
        Self {
            events_rx,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Record the outcome of one admission attempt.
    ///
    /// Takes the aggregate lock; the result is visible to [`MetricsCollector::snapshot`] without a
    /// [`MetricsCollector::drain`].
    pub fn record_admission(&self, queue_id: u64, accepted: bool) {
        let mut queues = self.queues.lock();
        let metrics = queues.entry(queue_id).or_default();
        if accepted {
            metrics.admitted += 1;
        } else {
            metrics.dropped += 1;
        }
    }

    /// Fold every pending event into the aggregates.
    ///
    /// Events are pulled in batches and the aggregate lock is taken once per batch.
    ///
    /// # Returns
    /// Number of events processed
    pub fn drain(&self) -> usize {
        let mut processed = 0;
        let mut batch = Vec::with_capacity(DRAIN_BATCH);
        loop {
            while batch.len() < DRAIN_BATCH {
                match self.events_rx.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            if batch.is_empty() {
                return processed;
            }
            {
                let mut queues = self.queues.lock();
                for event in &batch {
                    queues.entry(event.queue_id()).or_default().apply(event);
                }
            }
            processed += batch.len();
            batch.clear();
        }
    }

    /// Snapshot of one queue, `None` if nothing was ever recorded for it.
    pub fn snapshot(&self, queue_id: u64) -> Option<MetricsSnapshot> {
        self.queues
            .lock()
            .get(&queue_id)
            .map(|metrics| metrics.snapshot(queue_id))
    }

    /// Snapshots of every known queue, ordered by queue id.
    pub fn snapshots(&self) -> BTreeMap<u64, MetricsSnapshot> {
        self.queues
            .lock()
            .iter()
            .map(|(&queue_id, metrics)| (queue_id, metrics.snapshot(queue_id)))
            .collect()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("pending", &self.events_rx.len())
            .field("queues", &self.queues.lock().len())
            .finish()
    }
}
