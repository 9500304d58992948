#![allow(dead_code)]

use analysis::codec::{FORMAT_VERSION, REPLAY_MAGIC};
use analysis::{Replay, ReplayHeader, RunFrame};
use backend::maps::MapInfo;
use backend::session::{RunSession, RunSessionTimestamp};
use chrono::{DateTime, TimeZone, Utc};
use common::{Gamemode, TrackType};

pub const MAP_ID: u32 = 1;
pub const MAP_NAME: &str = "surf_utopia";
pub const MAP_HASH: &str = "0123456789abcdef0123456789abcdef01234567";
pub const USER_ID: u32 = 7;
pub const STEAM_ID: u64 = 76561198000000001;
pub const SURF_TICK: f64 = 0.015;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap()
}

fn square() -> serde_json::Value {
    serde_json::json!({
        "points": [[0.0, 0.0], [0.0, 64.0], [64.0, 64.0], [64.0, 0.0]],
        "bottom": 0.0,
        "height": 128.0,
    })
}

fn segment(checkpoints: &[usize]) -> serde_json::Value {
    let checkpoints: Vec<_> = checkpoints
        .iter()
        .map(|i| serde_json::json!({ "volumeIndex": i }))
        .collect();
    serde_json::json!({ "checkpoints": checkpoints, "checkpointsOrdered": true })
}

/// Two stages and one bonus.
pub fn zones() -> serde_json::Value {
    serde_json::json!({
        "formatVersion": 1,
        "volumes": [square(), square(), square(), square()],
        "tracks": {
            "main": {
                "zones": {
                    "segments": [segment(&[0, 1]), segment(&[1, 2])],
                    "end": { "volumeIndex": 3 },
                },
            },
            "bonuses": [
                {
                    "zones": {
                        "segments": [segment(&[2])],
                        "end": { "volumeIndex": 3 },
                    },
                },
            ],
        },
    })
}

pub fn map_with(zones: serde_json::Value) -> MapInfo {
    serde_json::from_value(serde_json::json!({
        "id": MAP_ID,
        "name": MAP_NAME,
        "hash": MAP_HASH,
        "tier": 3,
        "zones": zones,
    }))
    .unwrap()
}

pub fn map() -> MapInfo {
    map_with(zones())
}

pub fn session(
    track_type: TrackType,
    track_num: u16,
    timestamps: Vec<RunSessionTimestamp>,
) -> RunSession {
    RunSession {
        id: 1,
        user_id: USER_ID,
        map_id: MAP_ID,
        gamemode: Gamemode::Surf,
        track_type,
        track_num,
        zone_num: 0,
        style: 0,
        created_at: now() - chrono::Duration::minutes(2),
        last_update: now(),
        timestamps,
    }
}

pub fn ts(segment: u8, checkpoint: u8, tick: u32) -> RunSessionTimestamp {
    RunSessionTimestamp {
        segment,
        checkpoint,
        tick,
    }
}

/// A main track run leaving the start zone and entering the second stage
/// halfway.
pub fn main_session() -> RunSession {
    session(TrackType::Main, 1, vec![ts(0, 0, 0), ts(1, 0, 50)])
}

/// Runs straight along X at 10 units per tick.
pub fn frames(count: usize) -> Vec<RunFrame> {
    frames_with_step(count, 10.0)
}

pub fn frames_with_step(count: usize, step: f32) -> Vec<RunFrame> {
    (0..count)
        .map(|i| RunFrame {
            eye_angle_y: 90.0,
            pos_x: i as f32 * step,
            pos_z: 64.0,
            view_offset: 64.0,
            ..Default::default()
        })
        .collect()
}

/// A replay whose claimed stats match what the server recomputes.
pub fn replay(session: &RunSession, frames: Vec<RunFrame>) -> Replay {
    let crossings = backend::validation::zone_crossings(&session.timestamps, frames.len());
    let stats = analysis::aggregate(&frames, &crossings, SURF_TICK).unwrap();

    Replay {
        magic: REPLAY_MAGIC,
        version: FORMAT_VERSION,
        header: ReplayHeader {
            map_name: MAP_NAME.to_owned(),
            map_hash: MAP_HASH.to_owned(),
            player_name: "player".to_owned(),
            steam_id: STEAM_ID,
            tick_interval: SURF_TICK,
            run_flags: 0,
            run_date: "2024-05-01T12:00:00Z".to_owned(),
            start_tick: 0,
            stop_tick: frames.len() as i32,
            track_num: i32::from(session.track_num),
            zone_num: i32::from(session.zone_num),
        },
        overall_stats: stats.overall,
        zone_stats: stats.zones,
        frames,
    }
}

pub fn encode(replay: &Replay) -> Vec<u8> {
    analysis::encode(replay).unwrap()
}
