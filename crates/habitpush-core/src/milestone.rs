//! Streak milestone detection.

use serde::{Deserialize, Serialize};

/// Streak lengths (in days) that earn a milestone notification.
pub const MILESTONES: [u32; 7] = [7, 14, 21, 30, 60, 90, 100];

/// Milestone reached by moving from `before` to `after`, if any.
///
/// Exact membership only: a bulk update that jumps 6 → 8 skips the 7-day
/// milestone and fires nothing.
pub fn crossed_milestone(before: u32, after: u32) -> Option<u32> {
    if before == after {
        return None;
    }
    MILESTONES.contains(&after).then_some(after)
}

/// Celebration tier, chosen by streak length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneTier {
    /// Below a week.
    Spark,
    /// 7 days or more.
    Star,
    /// 30 days or more.
    Trophy,
    /// 100 days or more.
    Century,
}

impl MilestoneTier {
    pub fn for_streak(streak: u32) -> Self {
        match streak {
            s if s >= 100 => MilestoneTier::Century,
            s if s >= 30 => MilestoneTier::Trophy,
            s if s >= 7 => MilestoneTier::Star,
            _ => MilestoneTier::Spark,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            MilestoneTier::Spark => "🔥",
            MilestoneTier::Star => "⭐",
            MilestoneTier::Trophy => "🏆",
            MilestoneTier::Century => "💯",
        }
    }
}
