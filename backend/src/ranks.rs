//! Personal best and world record bookkeeping.
//!
//! Deciding what a run is worth is a pure function of a leaderboard
//! snapshot ([`update_rank`]). Writing it back goes through a
//! [`LeaderboardStore`] that only accepts the write if the leaderboard did not
//! change since the snapshot was taken; the [`RankEngine`] retries on
//! conflicts a bounded number of times.

use chrono::{DateTime, Utc};
use common::bitflags::ActivityType;
use common::{LeaderboardKey, MapId, RunStats, UserId, XpGain};

use crate::maps::MapInfo;
use crate::validation::ProcessedRun;
use crate::xp::{Completion, XpFormula};

/// A user's entry on a leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Rank {
    pub user_id: UserId,
    pub run_id: uuid::Uuid,
    pub rank: u32,
    pub rank_xp: i32,
    pub time: f64,
    pub stats: RunStats,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload for the user's entry after a personal best.
#[derive(Debug, Clone, PartialEq)]
pub struct RankCreate {
    pub run_id: uuid::Uuid,
    pub rank: u32,
    pub rank_xp: i32,
    pub time: f64,
    pub stats: RunStats,
    pub created_at: DateTime<Utc>,
}

/// The state of one leaderboard as seen by a single submission.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardSnapshot {
    pub version: u64,
    pub existing_rank: Option<Rank>,
    /// Fastest time on the board, not counting the submitting user.
    pub world_record: Option<f64>,
    /// Number of ranks on the board, including the user's own.
    pub completions: u32,
    /// Where the candidate time would land: one more than the number of other
    /// users at least as fast.
    pub position: u32,
    pub user_cos_xp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsUpdateReturn {
    pub is_personal_best: bool,
    pub is_world_record: bool,
    pub existing_rank: Option<Rank>,
    pub rank_create: Option<RankCreate>,
    pub xp: XpGain,
    pub activity: Option<ActivityType>,
}

/// Decides whether `run` improves on the snapshot and what it is worth.
pub fn update_rank(
    snapshot: &LeaderboardSnapshot,
    run: &ProcessedRun,
    map: &MapInfo,
    xp: &dyn XpFormula,
) -> StatsUpdateReturn {
    let existing = snapshot.existing_rank.as_ref();

    // Ties keep the older run.
    let is_personal_best = existing.map_or(true, |rank| run.time < rank.time);
    let is_world_record =
        is_personal_best && snapshot.world_record.map_or(true, |wr| run.time < wr);

    let completions = if existing.is_some() {
        snapshot.completions
    } else {
        snapshot.completions + 1
    };

    let completion = Completion {
        track_type: run.track_type,
        tier: map.tier,
        is_linear: map.is_linear,
        is_unique: existing.is_none(),
    };
    let gain = xp.gain(
        is_personal_best.then_some((snapshot.position, completions)),
        &completion,
        snapshot.user_cos_xp,
    );

    let rank_create = is_personal_best.then(|| RankCreate {
        run_id: run.id,
        rank: snapshot.position,
        rank_xp: gain.rank_xp,
        time: run.time,
        stats: run.stats.clone(),
        created_at: run.submitted_at,
    });

    let activity = if is_world_record {
        Some(ActivityType::WrAchieved)
    } else if is_personal_best {
        Some(ActivityType::PbAchieved)
    } else {
        None
    };

    StatsUpdateReturn {
        is_personal_best,
        is_world_record,
        existing_rank: existing.cloned(),
        rank_create,
        xp: gain,
        activity,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankCommit {
    /// Version of the snapshot the update was computed from.
    pub version: u64,
    pub map_id: MapId,
    pub key: LeaderboardKey,
    pub user_id: UserId,
    pub rank: Option<RankCreate>,
    pub cos_xp_gain: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The leaderboard changed since the snapshot, nothing was written.
    Conflict,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("leaderboard store: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn snapshot(
        &self,
        map_id: MapId,
        key: LeaderboardKey,
        user_id: UserId,
        candidate_time: f64,
    ) -> Result<LeaderboardSnapshot, StoreError>;

    /// Writes the commit if the leaderboard is still at `commit.version`.
    /// Ranks shifted down by the new entry get their XP recomputed with `xp`.
    async fn commit(
        &self,
        commit: RankCommit,
        xp: &dyn XpFormula,
    ) -> Result<CommitOutcome, StoreError>;
}

#[derive(Debug, Default)]
struct Board {
    version: u64,
    /// Fastest first, ties ordered by submission.
    ranks: Vec<Rank>,
}

#[derive(Debug, Default)]
struct Leaderboards {
    boards: std::collections::HashMap<(MapId, LeaderboardKey), Board>,
    cos_xp: std::collections::HashMap<UserId, u64>,
}

/// Keeps every leaderboard in memory.
#[derive(Debug, Default)]
pub struct MemoryLeaderboards {
    inner: std::sync::Mutex<Leaderboards>,
}

impl MemoryLeaderboards {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Leaderboards> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// All ranks on a leaderboard, fastest first.
    pub fn ranks(&self, map_id: MapId, key: LeaderboardKey) -> Vec<Rank> {
        self.lock()
            .boards
            .get(&(map_id, key))
            .map(|board| board.ranks.clone())
            .unwrap_or_default()
    }

    pub fn cos_xp(&self, user_id: UserId) -> u64 {
        self.lock().cos_xp.get(&user_id).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl LeaderboardStore for MemoryLeaderboards {
    async fn snapshot(
        &self,
        map_id: MapId,
        key: LeaderboardKey,
        user_id: UserId,
        candidate_time: f64,
    ) -> Result<LeaderboardSnapshot, StoreError> {
        let inner = self.lock();
        let user_cos_xp = inner.cos_xp.get(&user_id).copied().unwrap_or(0);

        let board = match inner.boards.get(&(map_id, key)) {
            Some(board) => board,
            None => {
                return Ok(LeaderboardSnapshot {
                    version: 0,
                    existing_rank: None,
                    world_record: None,
                    completions: 0,
                    position: 1,
                    user_cos_xp,
                })
            }
        };

        let others = board.ranks.iter().filter(|r| r.user_id != user_id);
        let world_record = others.clone().map(|r| r.time).reduce(f64::min);
        let faster_or_equal = others.filter(|r| r.time <= candidate_time).count();

        Ok(LeaderboardSnapshot {
            version: board.version,
            existing_rank: board.ranks.iter().find(|r| r.user_id == user_id).cloned(),
            world_record,
            completions: board.ranks.len() as u32,
            position: faster_or_equal as u32 + 1,
            user_cos_xp,
        })
    }

    async fn commit(
        &self,
        commit: RankCommit,
        xp: &dyn XpFormula,
    ) -> Result<CommitOutcome, StoreError> {
        let mut inner = self.lock();

        let board = inner.boards.entry((commit.map_id, commit.key)).or_default();
        if board.version != commit.version {
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(create) = commit.rank {
            board.ranks.retain(|r| r.user_id != commit.user_id);

            let idx = board.ranks.partition_point(|r| r.time <= create.time);
            board.ranks.insert(
                idx,
                Rank {
                    user_id: commit.user_id,
                    run_id: create.run_id,
                    rank: create.rank,
                    rank_xp: create.rank_xp,
                    time: create.time,
                    stats: create.stats,
                    created_at: create.created_at,
                },
            );

            let completions = board.ranks.len() as u32;
            for (position, rank) in board.ranks.iter_mut().enumerate() {
                let position = position as u32 + 1;
                if rank.rank != position {
                    rank.rank = position;
                    rank.rank_xp = xp.rank_xp(position, completions);
                }
            }
        }
        board.version += 1;

        let total = inner.cos_xp.entry(commit.user_id).or_insert(0);
        *total = total.saturating_add(u64::from(commit.cos_xp_gain));

        Ok(CommitOutcome::Committed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RankUpdateError {
    #[error("leaderboard kept changing, gave up after {attempts} attempts")]
    ConcurrentUpdateExhausted { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Applies accepted runs to their leaderboard.
#[derive(Clone)]
pub struct RankEngine {
    store: std::sync::Arc<dyn LeaderboardStore>,
    xp: std::sync::Arc<dyn XpFormula>,
    max_attempts: u32,
}

impl RankEngine {
    pub fn new(
        store: std::sync::Arc<dyn LeaderboardStore>,
        xp: std::sync::Arc<dyn XpFormula>,
    ) -> Self {
        Self {
            store,
            xp,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[tracing::instrument(skip_all, fields(run = %run.id, leaderboard = %run.leaderboard()))]
    pub async fn submit(
        &self,
        run: &ProcessedRun,
        map: &MapInfo,
    ) -> Result<StatsUpdateReturn, RankUpdateError> {
        let key = run.leaderboard();

        for attempt in 1..=self.max_attempts {
            let snapshot = self
                .store
                .snapshot(run.map_id, key, run.user_id, run.time)
                .await?;
            let update = update_rank(&snapshot, run, map, self.xp.as_ref());

            let commit = RankCommit {
                version: snapshot.version,
                map_id: run.map_id,
                key,
                user_id: run.user_id,
                rank: update.rank_create.clone(),
                cos_xp_gain: update.xp.cos_xp.gain_xp,
            };

            match self.store.commit(commit, self.xp.as_ref()).await? {
                CommitOutcome::Committed => {
                    tracing::info!(
                        pb = update.is_personal_best,
                        wr = update.is_world_record,
                        "Updated leaderboard"
                    );
                    return Ok(update);
                }
                CommitOutcome::Conflict => {
                    tracing::debug!("Leaderboard changed during attempt {}, retrying", attempt);
                }
            }
        }

        tracing::error!("Giving up after {} conflicting attempts", self.max_attempts);
        Err(RankUpdateError::ConcurrentUpdateExhausted {
            attempts: self.max_attempts,
        })
    }
}
