//! Rank extraction shared by every scheduler.
//!
//! Schedulers never look inside the items they store. The only thing they need is a numeric rank,
//! where a lower value means the item should leave the queue earlier.

/// Capability required from every item admitted into a scheduler.
///
/// The returned rank must stay the same for as long as the item is resident in a queue, and it
/// must be a finite number.
pub trait Ranked {
    fn rank(&self) -> f64;
}

impl Ranked for f64 {
    fn rank(&self) -> f64 {
        *self
    }
}

impl Ranked for f32 {
    fn rank(&self) -> f64 {
        f64::from(*self)
    }
}

impl Ranked for u32 {
    fn rank(&self) -> f64 {
        f64::from(*self)
    }
}

impl Ranked for u64 {
    fn rank(&self) -> f64 {
        *self as f64
    }
}

impl<T: Ranked + ?Sized> Ranked for Box<T> {
    fn rank(&self) -> f64 {
        (**self).rank()
    }
}

/// Read an item's rank at the queue boundary.
///
/// # Panics
/// Panics if the rank is NaN or infinite. Such an item breaks the caller's contract and cannot be
/// routed, so it is rejected immediately instead of being silently treated as rank 0.
#[inline]
pub fn checked_rank<T: Ranked + ?Sized>(item: &T) -> f64 {
    let rank = item.rank();
    assert!(rank.is_finite(), "item rank must be finite, got {rank}");
    rank
}
