//! Mastery module for Kioku
//!
//! Discrete proficiency levels, the per-word record, and the tracker that
//! applies the answer-scoring state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod item;
mod tracker;

pub use item::{MasteryItem, SessionResult, SESSION_HISTORY_CAP};
pub use tracker::{Answer, ItemMap, MasteryChange, MasteryTracker, MergeOutcome, MASTERY_KEY};

/// Proficiency stage of a single word, ordered by rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MasteryLevel {
    #[default]
    New,
    Weak,
    Learning,
    Almost,
    Mastered,
}

impl MasteryLevel {
    /// All levels in rank order
    pub const ALL: [MasteryLevel; 5] = [
        MasteryLevel::New,
        MasteryLevel::Weak,
        MasteryLevel::Learning,
        MasteryLevel::Almost,
        MasteryLevel::Mastered,
    ];

    /// Integer rank 0..=4
    pub fn rank(self) -> u8 {
        match self {
            MasteryLevel::New => 0,
            MasteryLevel::Weak => 1,
            MasteryLevel::Learning => 2,
            MasteryLevel::Almost => 3,
            MasteryLevel::Mastered => 4,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        Self::ALL.get(rank as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            MasteryLevel::New => "New",
            MasteryLevel::Weak => "Weak",
            MasteryLevel::Learning => "Learning",
            MasteryLevel::Almost => "Almost",
            MasteryLevel::Mastered => "Mastered",
        }
    }

    /// Base review interval in seconds before retention scaling
    ///
    /// `New` items are not schedulable and report 0.
    pub fn base_interval_secs(self) -> f64 {
        match self {
            MasteryLevel::New => 0.0,
            MasteryLevel::Weak => 3_600.0,
            MasteryLevel::Learning => 4.0 * 3_600.0,
            MasteryLevel::Almost => 24.0 * 3_600.0,
            MasteryLevel::Mastered => 7.0 * 24.0 * 3_600.0,
        }
    }

    /// Sort priority (lower is reviewed first). Weak words outrank unseen ones.
    pub fn base_priority(self) -> u8 {
        match self {
            MasteryLevel::Weak => 0,
            MasteryLevel::New => 1,
            MasteryLevel::Learning => 2,
            MasteryLevel::Almost => 3,
            MasteryLevel::Mastered => 4,
        }
    }

    /// One step down the ladder after an incorrect answer. Never below `Weak`.
    pub(crate) fn demoted(self) -> Self {
        match self {
            MasteryLevel::Mastered => MasteryLevel::Almost,
            MasteryLevel::Almost => MasteryLevel::Learning,
            MasteryLevel::Learning => MasteryLevel::Weak,
            MasteryLevel::Weak | MasteryLevel::New => MasteryLevel::Weak,
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MasteryLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown mastery level: {}", s))
    }
}

// Persisted as the integer rank so snapshots stay compact and stable
impl Serialize for MasteryLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.rank())
    }
}

impl<'de> Deserialize<'de> for MasteryLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rank = u8::deserialize(deserializer)?;
        MasteryLevel::from_rank(rank)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid mastery rank {}", rank)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        assert!(MasteryLevel::New < MasteryLevel::Weak);
        assert!(MasteryLevel::Weak < MasteryLevel::Learning);
        assert!(MasteryLevel::Learning < MasteryLevel::Almost);
        assert!(MasteryLevel::Almost < MasteryLevel::Mastered);
        assert_eq!(MasteryLevel::ALL.iter().max(), Some(&MasteryLevel::Mastered));
    }

    #[test]
    fn test_rank_roundtrip() {
        for level in MasteryLevel::ALL {
            assert_eq!(MasteryLevel::from_rank(level.rank()), Some(level));
        }
        assert_eq!(MasteryLevel::from_rank(5), None);
    }

    #[test]
    fn test_demotion_ladder() {
        assert_eq!(MasteryLevel::Mastered.demoted(), MasteryLevel::Almost);
        assert_eq!(MasteryLevel::Almost.demoted(), MasteryLevel::Learning);
        assert_eq!(MasteryLevel::Learning.demoted(), MasteryLevel::Weak);
        assert_eq!(MasteryLevel::Weak.demoted(), MasteryLevel::Weak);
        assert_eq!(MasteryLevel::New.demoted(), MasteryLevel::Weak);
    }

    #[test]
    fn test_weak_has_top_priority() {
        assert!(MasteryLevel::Weak.base_priority() < MasteryLevel::New.base_priority());
        assert_eq!(MasteryLevel::New.base_interval_secs(), 0.0);
        assert_eq!(MasteryLevel::Almost.base_interval_secs(), 86_400.0);
    }

    #[test]
    fn test_serde_as_rank() {
        let json = serde_json::to_string(&MasteryLevel::Almost).unwrap();
        assert_eq!(json, "3");

        let level: MasteryLevel = serde_json::from_str("1").unwrap();
        assert_eq!(level, MasteryLevel::Weak);

        assert!(serde_json::from_str::<MasteryLevel>("9").is_err());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("mastered".parse::<MasteryLevel>().unwrap(), MasteryLevel::Mastered);
        assert_eq!(" Weak ".parse::<MasteryLevel>().unwrap(), MasteryLevel::Weak);
        assert!("expert".parse::<MasteryLevel>().is_err());
    }
}
