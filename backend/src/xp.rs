//! Rank and cosmetic XP awarded for completing runs.

use common::{CosXpGain, TrackType, XpGain};

/// What a completed run is worth.
pub trait XpFormula: Send + Sync {
    /// XP for holding `rank` on a leaderboard with `completions` entries.
    fn rank_xp(&self, rank: u32, completions: u32) -> i32;

    /// Cosmetic XP for finishing a track at all.
    fn completion_xp(&self, completion: &Completion) -> u32;

    /// The level a user with `xp` cosmetic XP is at, starting from 1.
    fn level_for_xp(&self, xp: u64) -> u32;

    /// The full award for a completion. `rank` is only set when the run
    /// gained a new rank.
    fn gain(&self, rank: Option<(u32, u32)>, completion: &Completion, old_xp: u64) -> XpGain {
        let rank_xp = rank
            .map(|(rank, completions)| self.rank_xp(rank, completions))
            .unwrap_or(0);
        let gain_xp = self.completion_xp(completion);
        let gain_lvl = self
            .level_for_xp(old_xp.saturating_add(u64::from(gain_xp)))
            .saturating_sub(self.level_for_xp(old_xp));

        XpGain {
            rank_xp,
            cos_xp: CosXpGain {
                gain_lvl,
                old_xp,
                gain_xp,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub track_type: TrackType,
    pub tier: u8,
    pub is_linear: bool,
    /// First time the user finished this track.
    pub is_unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankXpParams {
    pub formula_a: f64,
    pub formula_b: f64,
    pub wr_points: i32,
    pub rank_percentages: [f64; 10],
    pub group_point_pcts: Vec<f64>,
    pub group_scale_factors: Vec<f64>,
    pub group_exponents: Vec<f64>,
    pub group_min_sizes: Vec<i32>,
}

impl Default for RankXpParams {
    fn default() -> Self {
        Self {
            formula_a: 1000.0,
            formula_b: 50.0,
            wr_points: 500,
            rank_percentages: [1.0, 0.8, 0.75, 0.7, 0.65, 0.6, 0.55, 0.5, 0.45, 0.4],
            group_point_pcts: vec![0.1, 0.05, 0.025],
            group_scale_factors: vec![0.15, 0.2, 0.25],
            group_exponents: vec![0.5, 0.4, 0.3],
            group_min_sizes: vec![20, 30, 40],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CosXpParams {
    pub max_levels: u32,
    pub starting_value: f64,
    pub linear_scale_base_increase: f64,
    pub linear_scale_interval: f64,
    pub linear_scale_interval_multiplier: f64,
    pub static_scale_start: u32,
    pub static_scale_base_multiplier: f64,
    pub static_scale_interval: u32,
    pub static_scale_interval_multiplier: f64,
    pub unique_linear: f64,
    pub unique_staged: f64,
    pub repeat_linear: f64,
    pub repeat_staged: f64,
    pub repeat_stages: f64,
    pub repeat_bonus: f64,
}

impl Default for CosXpParams {
    fn default() -> Self {
        Self {
            max_levels: 500,
            starting_value: 20000.0,
            linear_scale_base_increase: 1000.0,
            linear_scale_interval: 10.0,
            linear_scale_interval_multiplier: 1.0,
            static_scale_start: 101,
            static_scale_base_multiplier: 1.5,
            static_scale_interval: 25,
            static_scale_interval_multiplier: 0.5,
            unique_linear: 2500.0,
            unique_staged: 2500.0,
            repeat_linear: 20.0,
            repeat_staged: 40.0,
            repeat_stages: 5.0,
            repeat_bonus: 40.0,
        }
    }
}

/// The standard formula. Ranks get `ceil(A / (rank + B))` points, the top 10
/// additionally a share of the WR points, and everyone below that a share
/// depending on which group they fall in. Group sizes grow with the number of
/// completions.
#[derive(Debug, Clone)]
pub struct DefaultXpFormula {
    rank: RankXpParams,
    cos: CosXpParams,
    /// Total cosmetic XP needed to reach each level, indexed by level.
    xp_for_levels: Vec<u64>,
}

impl Default for DefaultXpFormula {
    fn default() -> Self {
        Self::new(RankXpParams::default(), CosXpParams::default())
    }
}

impl DefaultXpFormula {
    pub fn new(rank: RankXpParams, cos: CosXpParams) -> Self {
        let mut xp_for_levels = vec![0; cos.max_levels as usize + 1];
        for level in 1..=cos.max_levels {
            let idx = level as usize;
            xp_for_levels[idx] = xp_for_levels[idx - 1] + xp_in_level(&cos, level);
        }

        Self {
            rank,
            cos,
            xp_for_levels,
        }
    }

    /// Cosmetic XP needed to go from `level - 1` to `level`.
    pub fn xp_in_level(&self, level: u32) -> Option<u64> {
        (1..=self.cos.max_levels)
            .contains(&level)
            .then(|| xp_in_level(&self.cos, level))
    }

    /// Total cosmetic XP needed to reach `level`.
    pub fn xp_for_level(&self, level: u32) -> Option<u64> {
        self.xp_for_levels.get(level as usize).copied()
    }
}

fn xp_in_level(cos: &CosXpParams, level: u32) -> u64 {
    let linear = |level: u32| {
        cos.linear_scale_base_increase
            * f64::from(level)
            * (cos.linear_scale_interval_multiplier
                * (f64::from(level) / cos.linear_scale_interval).ceil())
    };

    let xp = if level < cos.static_scale_start {
        cos.starting_value + linear(level)
    } else {
        let multiplier = if level >= cos.static_scale_start + cos.static_scale_interval {
            cos.static_scale_base_multiplier
                + f64::from((level - cos.static_scale_start) / cos.static_scale_interval)
                    * cos.static_scale_interval_multiplier
        } else {
            cos.static_scale_base_multiplier
        };
        linear(cos.static_scale_start - 1) * multiplier
    };

    xp as u64
}

fn initial_scale(tier: u8) -> f64 {
    let tier = f64::from(tier);
    tier * tier - tier + 10.0
}

impl XpFormula for DefaultXpFormula {
    fn rank_xp(&self, rank: u32, completions: u32) -> i32 {
        let params = &self.rank;
        let rank = rank.max(1);

        let mut xp = (params.formula_a / (f64::from(rank) + params.formula_b)).ceil() as i32;

        if rank <= 10 {
            let pct = params.rank_percentages[rank as usize - 1];
            xp += (pct * f64::from(params.wr_points)).ceil() as i32;
            return xp;
        }

        let mut offset = 11.0;
        let groups = params
            .group_point_pcts
            .iter()
            .zip(params.group_scale_factors.iter())
            .zip(params.group_exponents.iter())
            .zip(params.group_min_sizes.iter());
        for (((pct, scale), exponent), min_size) in groups {
            let size = (scale * f64::from(completions).powf(*exponent)).max(f64::from(*min_size));
            if f64::from(rank) < offset + size {
                xp += (f64::from(params.wr_points) * pct).ceil() as i32;
                break;
            }
            offset += size;
        }

        xp
    }

    fn completion_xp(&self, completion: &Completion) -> u32 {
        let cos = &self.cos;

        let xp = match completion.track_type {
            TrackType::Bonus => {
                let base = ((cos.unique_linear * initial_scale(3)
                    + cos.unique_linear * initial_scale(4))
                    / 2.0)
                    .ceil();
                if completion.is_unique {
                    base
                } else {
                    (base / cos.repeat_bonus).ceil()
                }
            }
            TrackType::Stage => {
                let base = cos.unique_staged * initial_scale(completion.tier);
                // Stages always count as repeats.
                (base / cos.repeat_staged / cos.repeat_stages).ceil()
            }
            TrackType::Main => {
                let (unique, repeat) = if completion.is_linear {
                    (cos.unique_linear, cos.repeat_linear)
                } else {
                    (cos.unique_staged, cos.repeat_staged)
                };
                let base = unique * initial_scale(completion.tier);
                if completion.is_unique {
                    base
                } else {
                    (base / repeat).ceil()
                }
            }
        };

        xp as u32
    }

    fn level_for_xp(&self, xp: u64) -> u32 {
        // Level 1 is free, level n needs `xp_for_level(n)` in total.
        let reached = self.xp_for_levels[1..].partition_point(|needed| *needed <= xp) as u32;
        reached.clamp(1, self.cos.max_levels)
    }
}
