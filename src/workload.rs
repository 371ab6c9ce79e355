//! Synthetic workloads and a replay driver.
//!
//! A workload is a seeded sequence of admit/serve operations. Replaying the same workload against
//! the same configuration always yields the same accept/drop outcomes and the same service order,
//! which is what the binary, the determinism tests and the benches rely on.

use crate::error::ConfigError;
use crate::metrics::MetricsCollector;
use crate::packet::{Packet, MAX_PACKET_SIZE};
use crate::rank::Ranked;
use crate::scheduler::RankScheduler;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One step of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Offer a packet with this rank.
    Admit(f64),
    /// Give the queue one service opportunity.
    Serve,
}

/// Parameters of a generated workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub seed: u64,
    /// Total number of operations.
    pub operations: usize,
    /// Probability that an operation is an admission rather than a serve.
    pub admit_ratio: f64,
    /// Ranks are drawn uniformly from `[0, max_rank)`.
    pub max_rank: f64,
    /// Packets are spread round-robin over this many flows.
    pub flows: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            operations: 10_000,
            admit_ratio: 0.6,
            max_rank: 1_000_000.0,
            flows: 4,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.admit_ratio) {
            return Err(ConfigError::InvalidAdmitRatio(self.admit_ratio));
        }
        if !self.max_rank.is_finite() || self.max_rank <= 0.0 {
            return Err(ConfigError::InvalidRankScale(self.max_rank));
        }
        Ok(())
    }

    /// Draw the operation sequence described by this configuration.
    pub fn generate(&self) -> Result<Vec<Op>, ConfigError> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let ops = (0..self.operations)
            .map(|_| {
                if rng.gen_bool(self.admit_ratio) {
                    Op::Admit(rng.gen_range(0.0..self.max_rank))
                } else {
                    Op::Serve
                }
            })
            .collect();
        Ok(ops)
    }
}

/// Outcome of replaying a workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Accept (`true`) or drop (`false`) for each admission, in order.
    pub outcomes: Vec<bool>,
    /// Ranks in the order they were served.
    pub served: Vec<f64>,
    /// Items still resident after the last operation.
    pub remaining: usize,
}

impl ReplayReport {
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|&&accepted| accepted).count()
    }

    pub fn dropped(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }

    /// Served items that left while an earlier-served item had a strictly higher rank, a coarse
    /// measure of how far service order drifted from exact priority.
    pub fn out_of_order(&self) -> usize {
        let mut highest = f64::NEG_INFINITY;
        let mut late = 0;
        for &rank in &self.served {
            if rank < highest {
                late += 1;
            }
            highest = highest.max(rank);
        }
        late
    }
}

/// Replay `ops` against `scheduler`.
///
/// # Arguments
/// * `scheduler` - Queue under test, driven sequentially
/// * `ops` - Operation sequence, usually from [`WorkloadConfig::generate`]
/// * `flows` - Number of flows packets are spread over (at least 1)
/// * `collector` - Optional sink for admission outcomes, keyed by `queue_id`
pub fn replay<S>(
    scheduler: &mut S,
    ops: &[Op],
    flows: u64,
    collector: Option<(&MetricsCollector, u64)>,
) -> ReplayReport
where
    S: RankScheduler<Packet> + ?Sized,
{
    replay_from(scheduler, ops, 0, flows, collector)
}

/// Replay a slice of a longer workload whose first operation sits at position `first_step`.
///
/// Flow ids follow the position in the whole workload, so replaying it chunk by chunk assigns the
/// same flows as a single [`replay`].
pub fn replay_from<S>(
    scheduler: &mut S,
    ops: &[Op],
    first_step: u64,
    flows: u64,
    collector: Option<(&MetricsCollector, u64)>,
) -> ReplayReport
where
    S: RankScheduler<Packet> + ?Sized,
{
    let flows = flows.max(1);
    let mut report = ReplayReport::default();
    for (step, op) in (first_step..).zip(ops) {
        match *op {
            Op::Admit(rank) => {
                let flow_id = step % flows;
                let accepted = scheduler.admit(Packet::new(flow_id, rank, MAX_PACKET_SIZE));
                if let Some((collector, queue_id)) = collector {
                    collector.record_admission(queue_id, accepted);
                }
                report.outcomes.push(accepted);
            }
            Op::Serve => {
                if let Some(packet) = scheduler.serve() {
                    report.served.push(packet.rank());
                }
            }
        }
    }
    report.remaining = scheduler.len();
    report
}
