//! The end of a run: validate the replay, keep it, update the leaderboard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CompletedRun, MapId, RankInfo, RunInfo, SteamId, UserId};

use crate::maps::MapCatalog;
use crate::ranks::{RankEngine, RankUpdateError, StatsUpdateReturn};
use crate::session::{RunSessions, SessionError};
use crate::storage::{ReplayStorage, StorageError};
use crate::validation::{ProcessedRun, RunValidationError, RunValidator, SubmissionContext};

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("map {0} does not exist")]
    UnknownMap(MapId),
    #[error(transparent)]
    Validation(#[from] RunValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rank(#[from] RankUpdateError),
    #[error("validation task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub struct RunSubmissions {
    sessions: Arc<RunSessions>,
    maps: Arc<MapCatalog>,
    validator: Arc<RunValidator>,
    storage: Box<dyn ReplayStorage>,
    ranks: RankEngine,
}

impl RunSubmissions {
    pub fn new(
        sessions: Arc<RunSessions>,
        maps: Arc<MapCatalog>,
        validator: RunValidator,
        storage: Box<dyn ReplayStorage>,
        ranks: RankEngine,
    ) -> Self {
        Self {
            sessions,
            maps,
            validator: Arc::new(validator),
            storage,
            ranks,
        }
    }

    /// Ends the user's session with the given replay.
    ///
    /// The session is consumed even if the run gets rejected. The replay is
    /// only written once the run passed validation.
    #[tracing::instrument(skip(self, replay), fields(bytes = replay.len()))]
    pub async fn submit(
        &self,
        user_id: UserId,
        steam_id: SteamId,
        session_id: u64,
        replay: axum::body::Bytes,
        now: DateTime<Utc>,
    ) -> Result<CompletedRun, SubmissionError> {
        let session = self.sessions.take(user_id, session_id)?;
        let map = self
            .maps
            .get(session.map_id)
            .ok_or(SubmissionError::UnknownMap(session.map_id))?;

        let validator = self.validator.clone();
        let task_map = map.clone();
        let task_replay = replay.clone();
        let run = tokio::task::spawn_blocking(move || {
            let ctx = SubmissionContext {
                session: &session,
                map: &task_map,
                steam_id,
                now,
            };
            validator.validate(&task_replay, &ctx)
        })
        .await??;

        self.storage.store(steam_id, run.id, replay).await?;

        let update = self.ranks.submit(&run, &map).await.map_err(|e| {
            tracing::error!("Replay for run {} stored but leaderboard not updated: {}", run.id, e);
            e
        })?;

        Ok(completed_run(&run, update))
    }
}

pub fn completed_run(run: &ProcessedRun, update: StatsUpdateReturn) -> CompletedRun {
    CompletedRun {
        is_new_world_record: update.is_world_record,
        is_new_personal_best: update.is_personal_best,
        run: RunInfo {
            id: run.id.to_string(),
            map_id: run.map_id,
            user_id: run.user_id,
            gamemode: run.gamemode,
            track_type: run.track_type,
            track_num: run.track_num,
            style: run.style,
            time: run.time,
            flags: run.flags,
            stats: run.stats.clone(),
        },
        rank: update.rank_create.map(|rank| RankInfo {
            rank: rank.rank,
            rank_xp: rank.rank_xp,
            time: rank.time,
            run_id: rank.run_id.to_string(),
        }),
        xp: update.xp,
    }
}
