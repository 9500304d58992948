//! Validation of submitted runs.
//!
//! A submission moves through a fixed sequence of stages and is rejected at
//! the first check that fails:
//!
//! ```text
//! Received -> TimestampsChecked -> ReplayParsed -> MetadataChecked
//!          -> StatsChecked -> SyncedWithSubmission -> Accepted
//! ```
//!
//! Validation is a pure function of the replay bytes, the session, the map and
//! the current time, so validating the same submission twice gives the same
//! result.

use analysis::{Replay, ZoneCrossing};
use chrono::{DateTime, Utc};
use common::zones::MapZones;
use common::{BaseStats, Gamemode, MapId, RunStats, SteamId, Style, TrackType, UserId};

use crate::maps::MapInfo;
use crate::session::{RunSession, RunSessionTimestamp};

/// Why a run was rejected. The numeric values are sent to clients and must
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum RunValidationErrorType {
    BadTimestamps = 0,
    BadReplayFile = 1,
    BadMeta = 2,
    InvalidStats = 3,
    OutOfSync = 4,
    UnsupportedMode = 5,
    FuckyBehaviour = 6,
}

static MESSAGES: phf::Map<u8, &'static str> = phf::phf_map! {
    0_u8 => "Bad timestamps",
    1_u8 => "Bad replay file",
    2_u8 => "Bad metadata",
    3_u8 => "Invalid stats",
    4_u8 => "Out of sync",
    5_u8 => "Unsupported gamemode",
    6_u8 => "Fucky behaviour",
};

impl RunValidationErrorType {
    pub const ALL: [RunValidationErrorType; 7] = [
        RunValidationErrorType::BadTimestamps,
        RunValidationErrorType::BadReplayFile,
        RunValidationErrorType::BadMeta,
        RunValidationErrorType::InvalidStats,
        RunValidationErrorType::OutOfSync,
        RunValidationErrorType::UnsupportedMode,
        RunValidationErrorType::FuckyBehaviour,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn message(self) -> &'static str {
        MESSAGES.get(&self.code()).copied().unwrap_or("Unknown error")
    }
}

impl core::fmt::Display for RunValidationErrorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ValidationStage {
    Received,
    TimestampsChecked,
    ReplayParsed,
    MetadataChecked,
    StatsChecked,
    SyncedWithSubmission,
    Accepted,
}

/// A rejected submission.
///
/// `detail` is for the logs only, clients just get the kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} after {stage:?}: {detail}")]
pub struct RunValidationError {
    pub kind: RunValidationErrorType,
    /// The last stage the submission passed.
    pub stage: ValidationStage,
    pub detail: String,
}

impl RunValidationError {
    pub fn code(&self) -> u8 {
        self.kind.code()
    }

    pub fn body(&self) -> common::RunValidationErrorBody {
        common::RunValidationErrorBody {
            code: self.code(),
            message: format!("Run validation failed: {}", self.kind.message()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Relative difference allowed between claimed and recomputed stats.
    pub stats_tolerance: f64,
    /// Absolute difference that is always allowed, for values close to zero.
    pub stats_abs_tolerance: f64,
    /// Fastest believable 3D speed in units per second, unless the map sets
    /// its own.
    pub max_velocity: f64,
    pub allowed_gamemodes: Vec<Gamemode>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            stats_tolerance: 0.01,
            stats_abs_tolerance: 0.001,
            max_velocity: 10_000.0,
            allowed_gamemodes: Gamemode::ALL.to_vec(),
        }
    }
}

/// Everything known about a submission besides the replay itself.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionContext<'a> {
    pub session: &'a RunSession,
    pub map: &'a MapInfo,
    pub steam_id: SteamId,
    pub now: DateTime<Utc>,
}

/// An accepted run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRun {
    pub id: uuid::Uuid,
    pub map_id: MapId,
    pub user_id: UserId,
    pub steam_id: SteamId,
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    pub zone_num: u8,
    pub style: Style,
    pub ticks: u32,
    pub tick_interval: f64,
    /// Seconds.
    pub time: f64,
    pub flags: u32,
    /// Recomputed from the frames, not the values claimed by the replay.
    pub stats: RunStats,
    pub submitted_at: DateTime<Utc>,
}

impl ProcessedRun {
    pub fn leaderboard(&self) -> common::LeaderboardKey {
        common::LeaderboardKey::new(self.gamemode, self.track_type, self.track_num, self.style)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunValidator {
    config: ValidatorConfig,
}

struct Validation<'c, 'a> {
    config: &'c ValidatorConfig,
    ctx: &'c SubmissionContext<'a>,
    stage: ValidationStage,
}

impl<'c, 'a> Validation<'c, 'a> {
    fn advance(&mut self, stage: ValidationStage) {
        tracing::trace!(?stage, "Passed");
        self.stage = stage;
    }

    fn reject(&self, kind: RunValidationErrorType, detail: impl Into<String>) -> RunValidationError {
        RunValidationError {
            kind,
            stage: self.stage,
            detail: detail.into(),
        }
    }

    fn ensure(
        &self,
        passed: bool,
        kind: RunValidationErrorType,
        detail: impl FnOnce() -> String,
    ) -> Result<(), RunValidationError> {
        if passed {
            Ok(())
        } else {
            Err(self.reject(kind, detail()))
        }
    }

    fn timestamps(&self) -> Result<(), RunValidationError> {
        check_timestamps(self.ctx.session, &self.ctx.map.zones)
            .map_err(|detail| self.reject(RunValidationErrorType::BadTimestamps, detail))
    }

    fn metadata(&self, replay: &Replay) -> Result<(), RunValidationError> {
        use RunValidationErrorType::*;

        let ctx = self.ctx;
        let session = ctx.session;
        let header = &replay.header;

        self.ensure(
            self.config.allowed_gamemodes.contains(&session.gamemode),
            UnsupportedMode,
            || format!("{} runs are not accepted", session.gamemode),
        )?;
        self.ensure(
            i64::from(header.track_num) == i64::from(session.track_num),
            BadMeta,
            || format!("track {} instead of {}", header.track_num, session.track_num),
        )?;
        self.ensure(
            i64::from(header.zone_num) == i64::from(session.zone_num),
            BadMeta,
            || format!("zone {} instead of {}", header.zone_num, session.zone_num),
        )?;
        self.ensure(header.steam_id == ctx.steam_id, BadMeta, || {
            format!("recorded by {} instead of {}", header.steam_id, ctx.steam_id)
        })?;
        self.ensure(
            header.map_hash.eq_ignore_ascii_case(&ctx.map.hash),
            BadMeta,
            || format!("map hash {}", header.map_hash),
        )?;
        self.ensure(header.map_name == ctx.map.name, BadMeta, || {
            format!("map name {:?}", header.map_name)
        })?;
        self.ensure(header.run_ticks() > 0, BadTimestamps, || {
            format!("stop tick {} before start tick {}", header.stop_tick, header.start_tick)
        })?;

        let run_date = DateTime::parse_from_rfc3339(&header.run_date)
            .map_err(|e| self.reject(BadReplayFile, format!("run date {:?}: {}", header.run_date, e)))?
            .with_timezone(&Utc);
        self.ensure(run_date <= ctx.now, OutOfSync, || {
            format!("run date {} is in the future", run_date)
        })?;

        let expected = session.gamemode.tick_interval();
        self.ensure(header.tick_interval == expected, BadMeta, || {
            format!("tick interval {} instead of {}", header.tick_interval, expected)
        })?;

        let session_age = (ctx.now - session.created_at).num_milliseconds() as f64 / 1000.0;
        self.ensure(header.run_time() <= session_age, OutOfSync, || {
            format!("{}s run in a {}s old session", header.run_time(), session_age)
        })?;

        Ok(())
    }

    fn stats(&self, replay: &Replay) -> Result<RunStats, RunValidationError> {
        use RunValidationErrorType::*;

        let header = &replay.header;
        let frames = &replay.frames;
        let ticks = header.run_ticks();

        // Session ticks come from the client, aggregate only sees valid crossings.
        if let Some(late) = self.ctx.session.timestamps.iter().find(|t| t.tick as usize > frames.len()) {
            return Err(self.reject(
                BadTimestamps,
                format!("timestamp at tick {} of a {} frame replay", late.tick, frames.len()),
            ));
        }

        let crossings = zone_crossings(&self.ctx.session.timestamps, frames.len());
        let stats = analysis::aggregate(frames, &crossings, header.tick_interval).map_err(|e| {
            tracing::error!("Aggregating stats: {}", e);
            self.reject(InvalidStats, e.to_string())
        })?;

        self.ensure((frames.len() as i64 - ticks).abs() <= 1, InvalidStats, || {
            format!("{} frames for a {} tick run", frames.len(), ticks)
        })?;

        let computed = std::iter::once(&stats.overall).chain(stats.zones.iter().map(|z| &z.base_stats));
        for base in computed {
            sane(base).map_err(|detail| self.reject(InvalidStats, detail))?;
        }
        let claimed =
            std::iter::once(&replay.overall_stats).chain(replay.zone_stats.iter().map(|z| &z.base_stats));
        for base in claimed {
            self.ensure(base.to_array().iter().all(|v| v.is_finite()), InvalidStats, || {
                "claimed stats are not finite".to_owned()
            })?;
        }

        let claimed = &replay.overall_stats;
        self.ensure(i64::from(claimed.jumps) < ticks, FuckyBehaviour, || {
            format!("{} jumps in {} ticks", claimed.jumps, ticks)
        })?;
        self.ensure(i64::from(claimed.strafes) < ticks, FuckyBehaviour, || {
            format!("{} strafes in {} ticks", claimed.strafes, ticks)
        })?;

        let ceiling = self
            .ctx
            .map
            .zones
            .max_velocity
            .unwrap_or(self.config.max_velocity);
        self.ensure(stats.overall.vel_max_3d <= ceiling, FuckyBehaviour, || {
            format!("reached {} u/s", stats.overall.vel_max_3d)
        })?;

        Ok(stats)
    }

    fn sync(&self, replay: &Replay, stats: &RunStats) -> Result<(), RunValidationError> {
        use RunValidationErrorType::OutOfSync;

        self.ensure(replay.zone_stats.len() == stats.zones.len(), OutOfSync, || {
            format!(
                "{} zones claimed, {} recorded",
                replay.zone_stats.len(),
                stats.zones.len()
            )
        })?;

        self.compare("overall", &replay.overall_stats, &stats.overall)?;
        for (claimed, computed) in replay.zone_stats.iter().zip(stats.zones.iter()) {
            self.ensure(claimed.zone_num == computed.zone_num, OutOfSync, || {
                format!("zone {} claimed as {}", computed.zone_num, claimed.zone_num)
            })?;
            self.compare(&format!("zone {}", claimed.zone_num), &claimed.base_stats, &computed.base_stats)?;
        }

        Ok(())
    }

    fn compare(&self, what: &str, claimed: &BaseStats, computed: &BaseStats) -> Result<(), RunValidationError> {
        let fields = claimed.to_array().into_iter().zip(computed.to_array());
        for (name, (claimed, computed)) in BaseStats::FIELD_NAMES.iter().zip(fields) {
            let allowed = (computed.abs() * self.config.stats_tolerance).max(self.config.stats_abs_tolerance);
            self.ensure((claimed - computed).abs() <= allowed, RunValidationErrorType::OutOfSync, || {
                format!("{} {}: claimed {}, recomputed {}", what, name, claimed, computed)
            })?;
        }
        Ok(())
    }
}

fn sane(stats: &BaseStats) -> Result<(), String> {
    if !stats.to_array().iter().all(|v| v.is_finite()) {
        return Err("stats are not finite".to_owned());
    }
    let ratio = 0.0..=1.0;
    if !ratio.contains(&stats.avg_strafe_sync) || !ratio.contains(&stats.avg_strafe_sync2) {
        return Err(format!(
            "strafe sync {} / {} out of range",
            stats.avg_strafe_sync, stats.avg_strafe_sync2
        ));
    }
    if stats.enter_time < 0.0 || stats.total_time < stats.enter_time {
        return Err(format!(
            "entered at {} with a total of {}",
            stats.enter_time, stats.total_time
        ));
    }
    Ok(())
}

/// A v7 id timestamped with `now`. The random part is the name based v5
/// (SHA-1) digest of the replay and the session, so validating the same
/// submission again yields the same id on any build.
fn run_id(replay_bytes: &[u8], ctx: &SubmissionContext<'_>) -> uuid::Uuid {
    let replay_digest = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, replay_bytes);

    let mut name = [0_u8; 12];
    name[..8].copy_from_slice(&ctx.session.id.to_le_bytes());
    name[8..].copy_from_slice(&ctx.session.user_id.to_le_bytes());
    let digest = uuid::Uuid::new_v5(&replay_digest, &name);

    let mut seed = [0_u8; 10];
    seed.copy_from_slice(&digest.as_bytes()[6..]);

    let millis = u64::try_from(ctx.now.timestamp_millis()).unwrap_or(0);
    uuid::Builder::from_unix_timestamp_millis(millis, &seed).into_uuid()
}

/// Splits the run at every timestamp. The first timestamp is the start zone
/// and opens zone 1 at the first frame, every later one opens the next zone.
/// The last zone runs to the end of the replay.
pub fn zone_crossings(timestamps: &[RunSessionTimestamp], frame_count: usize) -> Vec<ZoneCrossing> {
    let starts = timestamps
        .iter()
        .enumerate()
        .map(|(i, t)| if i == 0 { 0 } else { t.tick as usize });
    let ends = timestamps
        .iter()
        .skip(1)
        .map(|t| t.tick as usize)
        .chain(std::iter::once(frame_count));

    starts
        .zip(ends)
        .enumerate()
        .map(|(i, (start_tick, end_tick))| ZoneCrossing {
            zone_num: i as i32 + 1,
            start_tick,
            end_tick,
        })
        .collect()
}

/// Checks the session's timestamps follow the zone layout of its track.
///
/// The first timestamp of a main track run is the start zone, checkpoint 0
/// of the first segment.
pub fn check_timestamps(session: &RunSession, zones: &MapZones) -> Result<(), String> {
    zones.check_volume_references().map_err(|e| e.to_string())?;

    let segments = zones
        .segments_for(session.track_type, session.track_num)
        .ok_or_else(|| format!("{} track {} does not exist", session.track_type.name(), session.track_num))?;
    if segments.is_empty() {
        return Err(format!("{} track {} has no segments", session.track_type.name(), session.track_num));
    }

    let timestamps = &session.timestamps;
    if timestamps.windows(2).any(|w| w[1].tick < w[0].tick) {
        return Err("timestamps go back in time".to_owned());
    }

    if session.track_type != TrackType::Main {
        let segment = match segments {
            [segment] => segment,
            _ => return Err("stage and bonus tracks have a single segment".to_owned()),
        };

        let mut prev_cp = None;
        for timestamp in timestamps.iter() {
            if timestamp.segment != 0 {
                return Err(format!("segment {} on a single segment track", timestamp.segment));
            }
            check_checkpoint(segment, prev_cp, timestamp.checkpoint)?;
            prev_cp = Some(timestamp.checkpoint);
        }
        return match prev_cp {
            Some(last) => check_last_checkpoint(segment, last),
            None => Ok(()),
        };
    }

    let ordered = zones.tracks.main.segments_ordered;
    // Segment and checkpoint of the last timestamp.
    let mut current: Option<(u8, u8)> = None;
    let mut completed = vec![];

    for timestamp in timestamps.iter() {
        let segment = segment_at(segments, timestamp.segment)?;

        if let Some((seg, cp)) = current {
            if seg == timestamp.segment {
                check_checkpoint(segment, Some(cp), timestamp.checkpoint)?;
                current = Some((seg, timestamp.checkpoint));
                continue;
            }
        }

        if timestamp.checkpoint != 0 {
            return Err(format!("entered segment {} outside its start", timestamp.segment));
        }
        if completed.contains(&timestamp.segment) {
            return Err(format!("segment {} entered twice", timestamp.segment));
        }
        let expected = match current {
            Some((seg, cp)) => {
                check_last_checkpoint(segment_at(segments, seg)?, cp)?;
                completed.push(seg);
                u16::from(seg) + 1
            }
            None => 0,
        };
        if ordered && u16::from(timestamp.segment) != expected {
            return Err(format!("segment {} out of order", timestamp.segment));
        }

        current = Some((timestamp.segment, 0));
    }

    let (seg, cp) = current.ok_or_else(|| "run has no start zone timestamp".to_owned())?;
    // Finishing in the end zone completes the last segment.
    check_last_checkpoint(segment_at(segments, seg)?, cp)?;
    completed.push(seg);

    if completed.len() != segments.len() {
        return Err(format!(
            "visited {} of {} segments",
            completed.len(),
            segments.len()
        ));
    }

    Ok(())
}

fn segment_at(segments: &[common::zones::Segment], index: u8) -> Result<&common::zones::Segment, String> {
    segments
        .get(usize::from(index))
        .ok_or_else(|| format!("segment {} does not exist", index))
}

fn check_checkpoint(segment: &common::zones::Segment, prev: Option<u8>, checkpoint: u8) -> Result<(), String> {
    if usize::from(checkpoint) >= segment.checkpoints.len() {
        return Err(format!("checkpoint {} does not exist", checkpoint));
    }
    let in_order = match prev {
        Some(prev) if segment.checkpoints_required => u16::from(checkpoint) == u16::from(prev) + 1,
        Some(prev) => checkpoint > prev,
        None => !segment.checkpoints_required || checkpoint == 0,
    };
    if !in_order {
        return Err(match prev {
            Some(prev) => format!("checkpoint {} after checkpoint {}", checkpoint, prev),
            None => format!("started at checkpoint {}", checkpoint),
        });
    }
    Ok(())
}

fn check_last_checkpoint(segment: &common::zones::Segment, last: u8) -> Result<(), String> {
    if segment.checkpoints_required && usize::from(last) + 1 != segment.checkpoints.len() {
        return Err(format!("skipped checkpoints after {}", last));
    }
    Ok(())
}

impl RunValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Runs every check on a submission. CPU bound, call it from a blocking
    /// task.
    #[tracing::instrument(skip_all, fields(session = ctx.session.id, user = ctx.session.user_id, map = ctx.map.id))]
    pub fn validate(
        &self,
        replay_bytes: &[u8],
        ctx: &SubmissionContext<'_>,
    ) -> Result<ProcessedRun, RunValidationError> {
        let result = self.run_stages(replay_bytes, ctx);

        match &result {
            Ok(run) => tracing::info!("Accepted run {} in {}s", run.id, run.time),
            Err(e) => tracing::warn!(kind = ?e.kind, code = e.code(), "Rejected run: {}", e),
        }

        result
    }

    fn run_stages(
        &self,
        replay_bytes: &[u8],
        ctx: &SubmissionContext<'_>,
    ) -> Result<ProcessedRun, RunValidationError> {
        let mut validation = Validation {
            config: &self.config,
            ctx,
            stage: ValidationStage::Received,
        };

        validation.timestamps()?;
        validation.advance(ValidationStage::TimestampsChecked);

        let replay = analysis::decode(replay_bytes)
            .map_err(|e| validation.reject(RunValidationErrorType::BadReplayFile, e.to_string()))?;
        validation.advance(ValidationStage::ReplayParsed);

        validation.metadata(&replay)?;
        validation.advance(ValidationStage::MetadataChecked);

        let stats = validation.stats(&replay)?;
        validation.advance(ValidationStage::StatsChecked);

        validation.sync(&replay, &stats)?;
        validation.advance(ValidationStage::SyncedWithSubmission);

        let session = ctx.session;
        let header = &replay.header;
        let ticks = u32::try_from(header.run_ticks()).map_err(|_| {
            validation.reject(RunValidationErrorType::BadTimestamps, "run is too long")
        })?;

        let id = run_id(replay_bytes, ctx);

        validation.advance(ValidationStage::Accepted);

        Ok(ProcessedRun {
            id,
            map_id: ctx.map.id,
            user_id: session.user_id,
            steam_id: ctx.steam_id,
            gamemode: session.gamemode,
            track_type: session.track_type,
            track_num: session.track_num,
            zone_num: session.zone_num,
            style: session.style,
            ticks,
            tick_interval: header.tick_interval,
            time: f64::from(ticks) * header.tick_interval,
            flags: header.run_flags,
            stats,
            submitted_at: ctx.now,
        })
    }
}
