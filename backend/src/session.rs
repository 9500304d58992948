//! Tracking of runs in progress.
//!
//! The game opens a session when the player leaves the start zone, reports a
//! timestamp for every segment and checkpoint it enters, and finally submits
//! the replay against the session. A user only ever has one session.

use chrono::{DateTime, Utc};
use common::{
    CreateRunSession, Gamemode, MapId, RunSessionInfo, Style, TrackType, UpdateRunSession, UserId,
};

use crate::maps::MapInfo;

/// Where and when a run entered a checkpoint. `tick` counts from the first
/// replay frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunSessionTimestamp {
    pub segment: u8,
    pub checkpoint: u8,
    pub tick: u32,
}

impl From<UpdateRunSession> for RunSessionTimestamp {
    fn from(value: UpdateRunSession) -> Self {
        Self {
            segment: value.segment,
            checkpoint: value.checkpoint,
            tick: value.tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSession {
    pub id: u64,
    pub user_id: UserId,
    pub map_id: MapId,
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    pub zone_num: u8,
    pub style: Style,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Oldest first.
    pub timestamps: Vec<RunSessionTimestamp>,
}

impl RunSession {
    pub fn info(&self) -> RunSessionInfo {
        RunSessionInfo {
            id: self.id,
            map_id: self.map_id,
            gamemode: self.gamemode,
            track_type: self.track_type,
            track_num: self.track_num,
            zone_num: self.zone_num,
            style: self.style,
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No run found")]
    NotFound,
    #[error("Invalid user")]
    WrongUser,
    #[error("Map does not exist")]
    UnknownMap,
    #[error("Map does not contain this track")]
    UnknownTrack,
    #[error("Individual zone runs are not supported")]
    IndividualZone,
    #[error("Timestamp already exists")]
    DuplicateTimestamp,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    sessions: std::collections::HashMap<u64, RunSession>,
    by_user: std::collections::HashMap<UserId, u64>,
}

impl State {
    fn remove(&mut self, id: u64) -> Option<RunSession> {
        let session = self.sessions.remove(&id)?;
        if self.by_user.get(&session.user_id) == Some(&id) {
            self.by_user.remove(&session.user_id);
        }
        Some(session)
    }
}

/// All open sessions. Every operation is a short critical section, so a
/// plain mutex is enough.
#[derive(Debug, Default)]
pub struct RunSessions {
    state: std::sync::Mutex<State>,
}

impl RunSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Opens a session, replacing whatever session the user had open.
    #[tracing::instrument(skip(self, request, map), fields(map_id = request.map_id))]
    pub fn create(
        &self,
        user_id: UserId,
        request: &CreateRunSession,
        map: Option<&MapInfo>,
        now: DateTime<Utc>,
    ) -> Result<RunSession, SessionError> {
        let map = map.ok_or(SessionError::UnknownMap)?;
        if map.id != request.map_id {
            return Err(SessionError::UnknownMap);
        }
        if request.zone_num != 0 {
            return Err(SessionError::IndividualZone);
        }
        if map
            .zones
            .segments_for(request.track_type, request.track_num)
            .map_or(true, |segments| segments.is_empty())
        {
            return Err(SessionError::UnknownTrack);
        }

        let mut state = self.lock();
        if let Some(previous) = state.by_user.get(&user_id).copied() {
            tracing::debug!("Replacing session {}", previous);
            state.remove(previous);
        }

        state.next_id += 1;
        let session = RunSession {
            id: state.next_id,
            user_id,
            map_id: request.map_id,
            gamemode: request.gamemode,
            track_type: request.track_type,
            track_num: request.track_num,
            zone_num: request.zone_num,
            style: request.style,
            created_at: now,
            last_update: now,
            timestamps: Vec::new(),
        };

        state.by_user.insert(user_id, session.id);
        state.sessions.insert(session.id, session.clone());

        Ok(session)
    }

    /// Records a checkpoint the run entered.
    pub fn add_timestamp(
        &self,
        user_id: UserId,
        session_id: u64,
        timestamp: RunSessionTimestamp,
        now: DateTime<Utc>,
    ) -> Result<RunSessionTimestamp, SessionError> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotFound)?;

        if session.user_id != user_id {
            return Err(SessionError::WrongUser);
        }
        if session.zone_num > 0 {
            return Err(SessionError::IndividualZone);
        }
        if session
            .timestamps
            .iter()
            .any(|t| t.segment == timestamp.segment && t.checkpoint == timestamp.checkpoint)
        {
            return Err(SessionError::DuplicateTimestamp);
        }

        session.timestamps.push(timestamp);
        session.last_update = now;

        Ok(timestamp)
    }

    /// Drops the user's open session.
    pub fn invalidate(&self, user_id: UserId) -> Result<(), SessionError> {
        let mut state = self.lock();
        let id = state
            .by_user
            .get(&user_id)
            .copied()
            .ok_or(SessionError::NotFound)?;
        state.remove(id);
        Ok(())
    }

    /// Removes the session for submission. A session can only be submitted
    /// once, whatever the outcome of the submission.
    pub fn take(&self, user_id: UserId, session_id: u64) -> Result<RunSession, SessionError> {
        let mut state = self.lock();
        match state.sessions.get(&session_id) {
            None => return Err(SessionError::NotFound),
            Some(session) if session.user_id != user_id => return Err(SessionError::WrongUser),
            Some(_) => {}
        }
        state.remove(session_id).ok_or(SessionError::NotFound)
    }

    pub fn get(&self, session_id: u64) -> Option<RunSession> {
        self.lock().sessions.get(&session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every session that has not seen an update for `idle`.
    /// Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>, idle: chrono::Duration) -> usize {
        let mut state = self.lock();
        let stale: Vec<u64> = state
            .sessions
            .values()
            .filter(|s| now - s.last_update > idle)
            .map(|s| s.id)
            .collect();

        for id in stale.iter() {
            state.remove(*id);
        }

        stale.len()
    }
}
