//! Post-service diagnostics.
//!
//! Schedulers can carry an optional [`QueueObserver`]. After a successful serve, the scheduler
//! computes the diagnostics enabled in its [`DiagnosticsConfig`] and hands them to the observer.
//! Observers are pure sinks: nothing they do feeds back into admission or service decisions. When
//! no observer is attached, or every diagnostic is disabled, the serve path does no extra work.

use crate::config::DiagnosticsConfig;
use crate::scheduler::Bound;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sink for the diagnostics a queue reports after each successful serve.
///
/// Every method has an empty default so sinks only implement what they care about.
///
/// The rotating array calls its observer after releasing the ring lock, so an observer may call
/// `admit`, `len` or `head` on that array. It must not call `serve` on it: the observer slot is
/// still held and the nested report would wait on it forever. The partition tree calls its
/// observer from inside `serve(&mut self)`; behind [`crate::scheduler::Exclusive`] that runs under
/// the wrapper's lock.
pub trait QueueObserver: Send {
    /// The item with `rank` was served out of bucket `bucket`.
    fn rank_mapped(&mut self, _queue_id: u64, _rank: f64, _bucket: usize) {}

    /// Current `(lower, upper)` bound of every leaf, in bucket order.
    fn bounds_snapshot(&mut self, _queue_id: u64, _bounds: &[Bound]) {}

    /// `count` items with a rank strictly lower than `rank` are still waiting in the serving bucket.
    /// Only called with a non-zero count.
    fn inversions(&mut self, _queue_id: u64, _rank: f64, _count: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

/// One diagnostic, as forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiagnosticEvent {
    RankMapping {
        queue_id: u64,
        rank: f64,
        bucket: usize,
    },
    BoundSnapshot {
        queue_id: u64,
        bounds: Vec<Bound>,
    },
    Inversions {
        queue_id: u64,
        rank: f64,
        count: usize,
    },
}

impl DiagnosticEvent {
    pub fn queue_id(&self) -> u64 {
        match self {
            DiagnosticEvent::RankMapping { queue_id, .. }
            | DiagnosticEvent::BoundSnapshot { queue_id, .. }
            | DiagnosticEvent::Inversions { queue_id, .. } => *queue_id,
        }
    }
}

/// Observer forwarding events through a bounded lock-free channel.
///
/// Sending never blocks the serve path: when the channel is full the event is discarded and
/// counted in [`ChannelObserver::lost`].
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<DiagnosticEvent>,
    lost: Arc<AtomicU64>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end a collector should drain.
    ///
    /// # Arguments
    /// * `capacity` - Number of events buffered before new events are discarded
    pub fn bounded(capacity: usize) -> (Self, Receiver<DiagnosticEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                tx,
                lost: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Events discarded because the channel was full or disconnected.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    fn send(&self, event: DiagnosticEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let lost = self.lost.fetch_add(1, Ordering::Relaxed) + 1;
                // warn at 1, 2, 4, 8, ... lost events
                if lost.is_power_of_two() {
                    tracing::warn!(queue_id = event.queue_id(), lost, "diagnostics channel full");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.lost.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl QueueObserver for ChannelObserver {
    fn rank_mapped(&mut self, queue_id: u64, rank: f64, bucket: usize) {
        self.send(DiagnosticEvent::RankMapping {
            queue_id,
            rank,
            bucket,
        });
    }

    fn bounds_snapshot(&mut self, queue_id: u64, bounds: &[Bound]) {
        self.send(DiagnosticEvent::BoundSnapshot {
            queue_id,
            bounds: bounds.to_vec(),
        });
    }

    fn inversions(&mut self, queue_id: u64, rank: f64, count: usize) {
        self.send(DiagnosticEvent::Inversions {
            queue_id,
            rank,
            count,
        });
    }
}

/// Observer writing every diagnostic as a `tracing` debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl QueueObserver for TracingObserver {
    fn rank_mapped(&mut self, queue_id: u64, rank: f64, bucket: usize) {
        tracing::debug!(queue_id, rank, bucket, "rank mapping");
    }

    fn bounds_snapshot(&mut self, queue_id: u64, bounds: &[Bound]) {
        for (bucket, bound) in bounds.iter().enumerate() {
            tracing::debug!(queue_id, bucket, lower = bound.lower, upper = bound.upper, "queue bound");
        }
    }

    fn inversions(&mut self, queue_id: u64, rank: f64, count: usize) {
        tracing::debug!(queue_id, rank, count, "inversions");
    }
}

/// Observer slot embedded in every scheduler.
///
/// Holds the queue identifier, the enabled diagnostics, and the optional sink. The scheduler only
/// pays for a diagnostic when [`Diagnostics::is_active`] and friends say so.
pub(crate) struct Diagnostics {
    queue_id: u64,
    config: DiagnosticsConfig,
    observer: Option<Box<dyn QueueObserver>>,
}

impl Diagnostics {
    pub(crate) fn new(queue_id: u64, config: DiagnosticsConfig) -> Self {
        Self {
            queue_id,
            config,
            observer: None,
        }
    }

    pub(crate) fn queue_id(&self) -> u64 {
        self.queue_id
    }

    pub(crate) fn attach(&mut self, observer: Box<dyn QueueObserver>) {
        self.observer = Some(observer);
    }

    pub(crate) fn detach(&mut self) -> Option<Box<dyn QueueObserver>> {
        self.observer.take()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.observer.is_some() && self.config.any()
    }

    pub(crate) fn wants_bounds(&self) -> bool {
        self.observer.is_some() && self.config.bound_snapshots
    }

    pub(crate) fn wants_inversions(&self) -> bool {
        self.observer.is_some() && self.config.inversions
    }

    /// Whether inversion counts are enabled, regardless of an observer being attached yet.
    pub(crate) fn wants_inversions_once_attached(&self) -> bool {
        self.config.inversions
    }

    /// Report a completed serve. Each value is only passed on when enabled.
    pub(crate) fn served(
        &mut self,
        rank: f64,
        bucket: usize,
        inversions: Option<usize>,
        bounds: Option<&[Bound]>,
    ) {
        let queue_id = self.queue_id;
        let config = self.config;
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        if config.rank_mapping {
            observer.rank_mapped(queue_id, rank, bucket);
        }
        if let Some(bounds) = bounds.filter(|_| config.bound_snapshots) {
            observer.bounds_snapshot(queue_id, bounds);
        }
        if let Some(count) = inversions.filter(|&count| config.inversions && count > 0) {
            observer.inversions(queue_id, rank, count);
        }
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("queue_id", &self.queue_id)
            .field("config", &self.config)
            .field("attached", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::scheduler::PartitionTree;

    #[test]
    fn channel_observer_forwards_events() {
        let (mut observer, rx) = ChannelObserver::bounded(8);
        observer.rank_mapped(7, 1.5, 2);
        observer.inversions(7, 1.5, 3);
        observer.bounds_snapshot(7, &[Bound::new(0.5, 0.5)]);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            DiagnosticEvent::RankMapping {
                queue_id: 7,
                rank: 1.5,
                bucket: 2
            }
        );
        assert!(events.iter().all(|event| event.queue_id() == 7));
    }

    #[test]
    fn channel_observer_counts_lost_events() {
        let (mut observer, _rx) = ChannelObserver::bounded(1);
        observer.rank_mapped(0, 1.0, 0);
        observer.rank_mapped(0, 2.0, 0);
        observer.rank_mapped(0, 3.0, 0);
        assert_eq!(observer.lost(), 2);
    }

    #[test]
    fn diagnostics_filters_disabled_reports() {
        let (observer, rx) = ChannelObserver::bounded(16);
        let mut diagnostics = Diagnostics::new(
            1,
            DiagnosticsConfig {
                rank_mapping: false,
                bound_snapshots: false,
                inversions: true,
            },
        );
        assert!(!diagnostics.is_active());
        diagnostics.attach(Box::new(observer));
        assert!(diagnostics.is_active());
        assert!(diagnostics.wants_inversions());
        assert!(!diagnostics.wants_bounds());

        diagnostics.served(4.0, 1, Some(0), None);
        diagnostics.served(4.0, 1, Some(2), Some(&[Bound::default()]));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![DiagnosticEvent::Inversions {
                queue_id: 1,
                rank: 4.0,
                count: 2
            }]
        );
    }

    #[test]
    fn sink_observers_leave_serving_untouched() {
        let config = QueueConfig {
            buckets: 2,
            capacity: 2,
            diagnostics: DiagnosticsConfig::all(),
            ..QueueConfig::default()
        };
        let observers: [Box<dyn QueueObserver>; 2] =
            [Box::new(NoopObserver), Box::new(TracingObserver)];
        for observer in observers {
            let mut tree = PartitionTree::<f64>::from_config(&config).unwrap();
            tree.attach_observer(observer);
            assert_eq!(tree.admit_all([0.2, 0.8, 0.1]), 3);
            let served: Vec<f64> = std::iter::from_fn(|| tree.serve()).collect();
            assert_eq!(served, vec![0.2, 0.1, 0.8]);
            assert!(tree.detach_observer().is_some());
        }
    }
}
