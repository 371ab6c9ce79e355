//! Bucket-management algorithms and the common surface the owning port drives.

pub mod exclusive;
pub mod partition_tree;
pub mod rotating_array;

pub use crate::config::SchedulerKind;
pub use exclusive::Exclusive;
pub use partition_tree::{Bound, PartitionTree};
pub use rotating_array::RotatingArray;

use crate::config::QueueConfig;
use crate::error::ConfigError;
use crate::observer::QueueObserver;
use crate::rank::Ranked;

/// Admit/serve interface shared by every approximate priority scheduler.
///
/// A full bucket is not an error: `admit` returns `false` and the item is dropped. The caller owns
/// drop accounting.
pub trait RankScheduler<T: Ranked> {
    /// Take ownership of `item` if a bucket has room for it.
    fn admit(&mut self, item: T) -> bool;

    /// Hand back the next item in service order, or `None` when every bucket is empty.
    fn serve(&mut self) -> Option<T>;

    /// Items resident across all buckets.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    fn bucket_lens(&self) -> Vec<usize>;

    fn kind(&self) -> SchedulerKind;

    fn attach_observer(&mut self, observer: Box<dyn QueueObserver>);

    /// Admit every item and return how many were accepted.
    fn admit_all<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
        Self: Sized,
    {
        items
            .into_iter()
            .fold(0, |accepted, item| accepted + usize::from(self.admit(item)))
    }
}

impl<T: Ranked, S: RankScheduler<T> + ?Sized> RankScheduler<T> for Box<S> {
    fn admit(&mut self, item: T) -> bool {
        (**self).admit(item)
    }

    fn serve(&mut self) -> Option<T> {
        (**self).serve()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn bucket_lens(&self) -> Vec<usize> {
        (**self).bucket_lens()
    }

    fn kind(&self) -> SchedulerKind {
        (**self).kind()
    }

    fn attach_observer(&mut self, observer: Box<dyn QueueObserver>) {
        (**self).attach_observer(observer)
    }
}

/// Scheduler built from configuration, with its concrete type erased.
pub type BoxedScheduler<T> = Box<dyn RankScheduler<T> + Send>;

/// Build the scheduler selected by `config.kind`.
///
/// # Errors
/// Returns the validation error of `config` when it describes an impossible queue.
pub fn build<T>(config: &QueueConfig) -> Result<BoxedScheduler<T>, ConfigError>
where
    T: Ranked + Send + 'static,
{
    config.validate()?;
    let scheduler: BoxedScheduler<T> = match config.kind {
        SchedulerKind::PartitionTree => Box::new(PartitionTree::from_config(config)?),
        SchedulerKind::RotatingArray => Box::new(RotatingArray::from_config(config)?),
    };
    tracing::info!(
        queue_id = config.queue_id,
        kind = %config.kind,
        buckets = config.buckets,
        capacity = config.capacity,
        "scheduler built"
    );
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_selects_kind() {
        let tree: BoxedScheduler<f64> = build(&QueueConfig::default()).unwrap();
        assert_eq!(tree.kind(), SchedulerKind::PartitionTree);
        assert_eq!(tree.bucket_lens().len(), 8);

        let config = QueueConfig {
            kind: SchedulerKind::RotatingArray,
            buckets: 3,
            ..QueueConfig::default()
        };
        let ring: BoxedScheduler<f64> = build(&config).unwrap();
        assert_eq!(ring.kind(), SchedulerKind::RotatingArray);
        assert_eq!(ring.bucket_lens(), vec![0; 3]);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = QueueConfig {
            capacity: 0,
            ..QueueConfig::default()
        };
        assert!(matches!(
            build::<f64>(&config),
            Err(ConfigError::ZeroCapacity)
        ));
    }

    #[test]
    fn tree_ignores_rank_scale() {
        let config = QueueConfig {
            scale: crate::config::RankScale { max_rank: 0.0 },
            ..QueueConfig::default()
        };
        let tree: BoxedScheduler<f64> = build(&config).unwrap();
        assert_eq!(tree.kind(), SchedulerKind::PartitionTree);
        assert!(PartitionTree::<f64>::from_config(&config).is_ok());

        let config = QueueConfig {
            kind: SchedulerKind::RotatingArray,
            ..config
        };
        assert!(matches!(
            build::<f64>(&config),
            Err(ConfigError::InvalidRankScale(_))
        ));
    }

    #[test]
    fn boxed_scheduler_admits_all() {
        let mut scheduler: BoxedScheduler<f64> = build(&QueueConfig {
            buckets: 1,
            capacity: 2,
            ..QueueConfig::default()
        })
        .unwrap();
        assert_eq!(scheduler.admit_all([1.0, 2.0, 3.0]), 2);
        assert_eq!(scheduler.len(), 2);
        scheduler.clear();
        assert!(scheduler.is_empty());
    }
}
