//! Influence score.
//!
//! A fixed weighted sum over four activity metrics. The weights are tunable
//! through `[scoring]` but never derived from data.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_stars")]
    pub stars: f64,
    #[serde(default = "default_followers")]
    pub followers: f64,
    #[serde(default = "default_minor")]
    pub contributions: f64,
    #[serde(default = "default_minor")]
    pub activity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            stars: default_stars(),
            followers: default_followers(),
            contributions: default_minor(),
            activity: default_minor(),
        }
    }
}

fn default_stars() -> f64 {
    2.5
}
fn default_followers() -> f64 {
    2.0
}
fn default_minor() -> f64 {
    0.1
}

/// Inputs to the score, one per weighted term.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    pub stars_earned: u64,
    pub followers: u64,
    pub contributions: u64,
    pub recent_activity: u64,
}

impl ScoreWeights {
    pub fn score(&self, m: &Metrics) -> f64 {
        m.stars_earned as f64 * self.stars
            + m.followers as f64 * self.followers
            + m.contributions as f64 * self.contributions
            + m.recent_activity as f64 * self.activity
    }
}
