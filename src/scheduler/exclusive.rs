//! Opt-in exclusive-lock mode.
//!
//! The partition tree does no locking of its own. When admit/serve may be called from more than one
//! thread, wrap it in [`Exclusive`]: each call holds one lock across the whole traversal, so routing
//! and every ancestor-bound update happen as one atomic unit and no other call can observe a tree
//! mid-update. This mirrors the locking discipline of the rotating array.

use crate::observer::QueueObserver;
use crate::rank::Ranked;
use crate::scheduler::RankScheduler;
use parking_lot::{Mutex, MutexGuard};

/// Scheduler shared between threads behind a single mutex.
#[derive(Debug, Default)]
pub struct Exclusive<S> {
    inner: Mutex<S>,
}

impl<S> Exclusive<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            inner: Mutex::new(scheduler),
        }
    }

    /// Hold the lock across several operations.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    pub fn admit<T>(&self, item: T) -> bool
    where
        T: Ranked,
        S: RankScheduler<T>,
    {
        self.inner.lock().admit(item)
    }

    pub fn serve<T>(&self) -> Option<T>
    where
        T: Ranked,
        S: RankScheduler<T>,
    {
        self.inner.lock().serve()
    }

    pub fn len<T>(&self) -> usize
    where
        T: Ranked,
        S: RankScheduler<T>,
    {
        self.inner.lock().len()
    }

    pub fn is_empty<T>(&self) -> bool
    where
        T: Ranked,
        S: RankScheduler<T>,
    {
        self.inner.lock().is_empty()
    }

    pub fn attach_observer<T>(&self, observer: Box<dyn QueueObserver>)
    where
        T: Ranked,
        S: RankScheduler<T>,
    {
        self.inner.lock().attach_observer(observer)
    }
}

impl<S> From<S> for Exclusive<S> {
    fn from(scheduler: S) -> Self {
        Self::new(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::PartitionTree;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_exclusive_tree_across_threads() {
        let shared = Arc::new(Exclusive::new(PartitionTree::<f64>::new(4, 1000).unwrap()));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let mut accepted = 0;
                    for i in 0..250 {
                        if shared.admit((worker * 250 + i) as f64) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();
        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let tree = shared.lock();
        assert_eq!(tree.len(), accepted);
        assert_eq!(tree.bucket_lens().iter().sum::<usize>(), accepted);
    }

    #[test]
    fn test_exclusive_guard_spans_operations() {
        let shared = Exclusive::new(PartitionTree::<f64>::new(2, 2).unwrap());
        {
            let mut tree = shared.lock();
            assert!(tree.admit(0.2));
            assert!(tree.admit(0.8));
        }
        assert_eq!(shared.len::<f64>(), 2);
        assert_eq!(shared.serve::<f64>(), Some(0.2));
        let tree = shared.into_inner();
        assert_eq!(tree.len(), 1);
    }
}
