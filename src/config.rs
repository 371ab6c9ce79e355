//! Queue configuration.
//!
//! Every knob that shapes a scheduler lives here so the binary, the tests and the benches build
//! queues the same way. Configurations can be written in code through `Default` plus struct update
//! syntax, or loaded from JSON.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bucket-management algorithm backing a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Self-tuning binary tree over bucket indices.
    #[default]
    PartitionTree,
    /// Flat ring of buckets with a rotating head.
    RotatingArray,
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SchedulerKind::PartitionTree => "partition_tree",
            SchedulerKind::RotatingArray => "rotating_array",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for SchedulerKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "tree" | "partition-tree" | "partition_tree" => Ok(SchedulerKind::PartitionTree),
            "array" | "ring" | "rotating-array" | "rotating_array" => {
                Ok(SchedulerKind::RotatingArray)
            }
            other => Err(ConfigError::Parse(format!("unknown scheduler kind `{other}`"))),
        }
    }
}

/// Linear mapping from a rank onto a bucket offset, used by the rotating array.
///
/// Ranks in `[0, max_rank]` are spread over offsets `0..=buckets-1`; anything outside the domain is
/// clamped to the nearest end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankScale {
    pub max_rank: f64,
}

impl Default for RankScale {
    fn default() -> Self {
        Self {
            max_rank: 1_000_000.0,
        }
    }
}

impl RankScale {
    pub fn new(max_rank: f64) -> Result<Self, ConfigError> {
        let scale = Self { max_rank };
        scale.validate()?;
        Ok(scale)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_rank.is_finite() || self.max_rank <= 0.0 {
            return Err(ConfigError::InvalidRankScale(self.max_rank));
        }
        Ok(())
    }

    /// Offset of `rank` from the head bucket, in `[0, buckets)`.
    ///
    /// # Arguments
    /// * `rank` - Finite rank of the item being admitted
    /// * `buckets` - Number of buckets in the ring (at least 1)
    pub fn offset(&self, rank: f64, buckets: usize) -> usize {
        let last = buckets.saturating_sub(1);
        let scaled = (rank * last as f64 / self.max_rank).floor();
        if scaled <= 0.0 {
            0
        } else if scaled >= last as f64 {
            last
        } else {
            scaled as usize
        }
    }
}

/// Which post-service diagnostics are computed and handed to an attached observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Report the bucket each served item came from.
    pub rank_mapping: bool,
    /// Report a snapshot of every leaf bound (tree only).
    pub bound_snapshots: bool,
    /// Report lower-ranked items left behind in the serving bucket.
    pub inversions: bool,
}

impl DiagnosticsConfig {
    pub fn all() -> Self {
        Self {
            rank_mapping: true,
            bound_snapshots: true,
            inversions: true,
        }
    }

    pub fn any(&self) -> bool {
        self.rank_mapping || self.bound_snapshots || self.inversions
    }
}

/// Full description of one output queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Identifier attached to every diagnostic event.
    pub queue_id: u64,
    pub kind: SchedulerKind,
    /// Number of FIFO buckets (B).
    pub buckets: usize,
    /// Capacity of each bucket in items (C).
    pub capacity: usize,
    /// Rank domain used by the rotating array.
    pub scale: RankScale,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_id: 0,
            kind: SchedulerKind::default(),
            buckets: 8,
            capacity: 10,
            scale: RankScale::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Reject configurations the selected scheduler cannot be built from.
    ///
    /// `scale` is only checked for the rotating array; the partition tree learns its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_shape(self.buckets, self.capacity)?;
        match self.kind {
            SchedulerKind::PartitionTree => Ok(()),
            SchedulerKind::RotatingArray => self.scale.validate(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: QueueConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

pub(crate) fn validate_shape(buckets: usize, capacity: usize) -> Result<(), ConfigError> {
    if buckets == 0 {
        return Err(ConfigError::ZeroBuckets);
    }
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_shape_is_rejected() {
        let config = QueueConfig {
            buckets: 0,
            ..QueueConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBuckets));

        let config = QueueConfig {
            capacity: 0,
            ..QueueConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn scale_only_matters_for_the_array() {
        let raw = r#"{ "kind": "partition_tree", "scale": { "max_rank": 0.0 } }"#;
        let config = QueueConfig::from_json_str(raw).unwrap();
        assert_eq!(config.scale.max_rank, 0.0);

        let config = QueueConfig {
            kind: SchedulerKind::RotatingArray,
            ..config
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRankScale(0.0)));
    }

    #[test]
    fn rank_scale_rejects_bad_domain() {
        assert!(RankScale::new(0.0).is_err());
        assert!(RankScale::new(-1.0).is_err());
        assert!(RankScale::new(f64::NAN).is_err());
        assert!(RankScale::new(10.0).is_ok());
    }

    #[test]
    fn rank_scale_offsets_and_clamps() {
        // default domain over eight buckets maps onto offsets 0..=7
        let scale = RankScale::default();
        assert_eq!(scale.offset(0.0, 8), 0);
        assert_eq!(scale.offset(500_000.0, 8), 3);
        assert_eq!(scale.offset(1_000_000.0, 8), 7);
        assert_eq!(scale.offset(5_000_000.0, 8), 7);
        assert_eq!(scale.offset(-3.0, 8), 0);

        let scale = RankScale::new(3.0).unwrap();
        assert_eq!(scale.offset(2.0, 4), 2);
        assert_eq!(scale.offset(2.9, 4), 2);

        // a single bucket always maps to offset 0
        assert_eq!(scale.offset(2.0, 1), 0);
    }

    #[test]
    fn parses_partial_json() {
        let config = QueueConfig::from_json_str(
            r#"{ "kind": "rotating_array", "buckets": 4, "diagnostics": { "inversions": true } }"#,
        )
        .unwrap();
        assert_eq!(config.kind, SchedulerKind::RotatingArray);
        assert_eq!(config.buckets, 4);
        assert_eq!(config.capacity, 10);
        assert!(config.diagnostics.inversions);
        assert!(!config.diagnostics.rank_mapping);
    }

    #[test]
    fn invalid_json_config_is_rejected() {
        assert!(matches!(
            QueueConfig::from_json_str(r#"{ "buckets": 0 }"#),
            Err(ConfigError::ZeroBuckets)
        ));
        assert!(matches!(
            QueueConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn scheduler_kind_from_str() {
        assert_eq!("tree".parse::<SchedulerKind>().unwrap(), SchedulerKind::PartitionTree);
        assert_eq!("Array".parse::<SchedulerKind>().unwrap(), SchedulerKind::RotatingArray);
        assert!("heap".parse::<SchedulerKind>().is_err());
    }
}
