//! Packet representation carried through the output queue.

use crate::rank::Ranked;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static PACKET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Maximum payload size accounted for a single packet (standard Ethernet MTU).
pub const MAX_PACKET_SIZE: usize = 1500;

/// Work unit stored by the schedulers.
///
/// The rank is fixed when the packet is built, so it stays stable for the whole time the packet is
/// resident in a queue. The id is unique per process and increases with creation order, which lets
/// tests and the replay driver check service order without comparing payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: u64,
    pub flow_id: u64,
    rank: f64,
    len: usize,
}

impl Packet {
    /// Create a packet with the next process-wide id.
    ///
    /// # Arguments
    /// * `flow_id` - Flow the packet belongs to (only used for reporting)
    /// * `rank` - Scheduling rank, lower leaves the queue earlier
    /// * `len` - Payload length in bytes, capped at [`MAX_PACKET_SIZE`]
    pub fn new(flow_id: u64, rank: f64, len: usize) -> Packet {
        Packet {
            id: PACKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            flow_id,
            rank,
            len: len.min(MAX_PACKET_SIZE),
        }
    }

    /// Current payload length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Ranked for Packet {
    fn rank(&self) -> f64 {
        self.rank
    }
}
