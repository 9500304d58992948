mod support;

use backend::validation::{
    check_timestamps, zone_crossings, RunValidationErrorType, RunValidator, SubmissionContext,
    ValidationStage, ValidatorConfig,
};
use common::{Gamemode, TrackType};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use support::*;

fn ctx<'a>(session: &'a backend::session::RunSession, map: &'a backend::maps::MapInfo) -> SubmissionContext<'a> {
    SubmissionContext {
        session,
        map,
        steam_id: STEAM_ID,
        now: now(),
    }
}

fn rejection(
    bytes: &[u8],
    session: &backend::session::RunSession,
    map: &backend::maps::MapInfo,
) -> RunValidationErrorType {
    RunValidator::default()
        .validate(bytes, &ctx(session, map))
        .unwrap_err()
        .kind
}

#[test]
fn error_codes() {
    let codes: Vec<u8> = RunValidationErrorType::ALL.iter().map(|k| k.code()).collect();
    assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(RunValidationErrorType::FuckyBehaviour.message(), "Fucky behaviour");
}

#[test]
#[traced_test]
fn accepts_a_clean_run() {
    let session = main_session();
    let map = map();
    let bytes = encode(&replay(&session, frames(100)));

    let run = RunValidator::default().validate(&bytes, &ctx(&session, &map)).unwrap();

    assert_eq!(run.ticks, 100);
    assert!((run.time - 1.5).abs() < 1e-9);
    assert_eq!(run.user_id, USER_ID);
    assert_eq!(run.steam_id, STEAM_ID);
    assert_eq!(run.leaderboard().to_string(), "1-0-1-0");
    assert_eq!(run.stats.zones.len(), 2);
    assert_eq!(run.stats.zones[1].zone_num, 2);
    assert_eq!(run.id.get_version_num(), 7);
    assert_eq!(run.submitted_at, now());

    assert!(logs_contain("Accepted run"));
}

#[test]
fn validation_is_idempotent() {
    let session = main_session();
    let map = map();
    let validator = RunValidator::default();

    let bytes = encode(&replay(&session, frames(100)));
    let first = validator.validate(&bytes, &ctx(&session, &map));
    let second = validator.validate(&bytes, &ctx(&session, &map));
    assert_eq!(first, second);

    // The id is tied to the session the replay was submitted for.
    let mut other = main_session();
    other.id += 1;
    let third = RunValidator::default().validate(&bytes, &ctx(&other, &map)).unwrap();
    assert_ne!(first.unwrap().id, third.id);

    let mut bad = replay(&session, frames(100));
    bad.header.tick_interval = 0.01;
    let bytes = encode(&bad);
    let first = validator.validate(&bytes, &ctx(&session, &map)).unwrap_err();
    let second = validator.validate(&bytes, &ctx(&session, &map)).unwrap_err();
    assert_eq!(first, second);
}

#[test]
fn stop_before_start() {
    let session = main_session();
    let mut replay = replay(&session, frames(100));
    replay.header.start_tick = 100;
    replay.header.stop_tick = 50;

    let err = RunValidator::default()
        .validate(&encode(&replay), &ctx(&session, &map()))
        .unwrap_err();
    assert_eq!(err.kind, RunValidationErrorType::BadTimestamps);
    assert_eq!(err.code(), 0);
    assert_eq!(err.stage, ValidationStage::ReplayParsed);
}

#[test]
fn tick_interval_must_match_gamemode() {
    let mut session = main_session();
    session.gamemode = Gamemode::Ahop;
    let mut replay = replay(&session, frames(100));
    replay.header.tick_interval = 0.01;

    let err = RunValidator::default()
        .validate(&encode(&replay), &ctx(&session, &map()))
        .unwrap_err();
    assert_eq!(err.kind, RunValidationErrorType::BadMeta);
    assert_eq!(
        err.body(),
        common::RunValidationErrorBody {
            code: 2,
            message: "Run validation failed: Bad metadata".to_owned(),
        }
    );
}

#[test]
fn garbage_replay() {
    let session = main_session();
    let err = RunValidator::default()
        .validate(b"definitely not a replay file", &ctx(&session, &map()))
        .unwrap_err();

    assert_eq!(err.kind, RunValidationErrorType::BadReplayFile);
    assert_eq!(err.stage, ValidationStage::TimestampsChecked);
}

#[test]
fn unsupported_gamemode() {
    let session = main_session();
    let map = map();
    let bytes = encode(&replay(&session, frames(100)));

    let validator = RunValidator::new(ValidatorConfig {
        allowed_gamemodes: vec![Gamemode::Bhop],
        ..Default::default()
    });
    let err = validator.validate(&bytes, &ctx(&session, &map)).unwrap_err();
    assert_eq!(err.kind, RunValidationErrorType::UnsupportedMode);
    assert_eq!(err.code(), 5);
}

#[test]
fn metadata_must_match_session() {
    let session = main_session();
    let map = map();

    let mut other_map = replay(&session, frames(100));
    other_map.header.map_hash = "f".repeat(40);
    assert_eq!(
        rejection(&encode(&other_map), &session, &map),
        RunValidationErrorType::BadMeta
    );

    let mut other_track = replay(&session, frames(100));
    other_track.header.track_num = 2;
    assert_eq!(
        rejection(&encode(&other_track), &session, &map),
        RunValidationErrorType::BadMeta
    );

    let mut other_player = replay(&session, frames(100));
    other_player.header.steam_id += 1;
    assert_eq!(
        rejection(&encode(&other_player), &session, &map),
        RunValidationErrorType::BadMeta
    );

    let mut shouting = replay(&session, frames(100));
    shouting.header.map_hash = MAP_HASH.to_uppercase();
    assert!(RunValidator::default()
        .validate(&encode(&shouting), &ctx(&session, &map))
        .is_ok());
}

#[test]
fn run_date() {
    let session = main_session();
    let map = map();

    let mut future = replay(&session, frames(100));
    future.header.run_date = "2024-05-01T13:00:00Z".to_owned();
    assert_eq!(
        rejection(&encode(&future), &session, &map),
        RunValidationErrorType::OutOfSync
    );

    let mut unparsable = replay(&session, frames(100));
    unparsable.header.run_date = "yesterday".to_owned();
    assert_eq!(
        rejection(&encode(&unparsable), &session, &map),
        RunValidationErrorType::BadReplayFile
    );
}

#[test]
fn run_longer_than_session() {
    let mut session = main_session();
    session.created_at = now() - chrono::Duration::seconds(1);

    let bytes = encode(&replay(&session, frames(100)));
    assert_eq!(
        rejection(&bytes, &session, &map()),
        RunValidationErrorType::OutOfSync
    );
}

#[test]
fn frame_count_must_match_ticks() {
    let session = main_session();
    let mut replay = replay(&session, frames(100));
    replay.header.stop_tick = 150;

    assert_eq!(
        rejection(&encode(&replay), &session, &map()),
        RunValidationErrorType::InvalidStats
    );
}

#[test]
#[traced_test]
fn timestamps_past_the_replay() {
    let session = session(TrackType::Main, 1, vec![ts(0, 0, 0), ts(1, 0, 500)]);
    let bytes = encode(&replay(&session, frames(600)));
    let short = {
        let mut replay = analysis::decode(&bytes).unwrap();
        replay.frames.truncate(100);
        replay.header.stop_tick = 100;
        encode(&replay)
    };

    let err = RunValidator::default()
        .validate(&short, &ctx(&session, &map()))
        .unwrap_err();
    assert_eq!(err.kind, RunValidationErrorType::BadTimestamps);
    assert_eq!(err.stage, ValidationStage::MetadataChecked);
    assert!(!logs_contain("Aggregating stats"));
}

#[test]
fn tampered_stats() {
    let session = main_session();
    let map = map();

    let mut faster = replay(&session, frames(100));
    faster.overall_stats.vel_max_3d *= 2.0;
    assert_eq!(
        rejection(&encode(&faster), &session, &map),
        RunValidationErrorType::OutOfSync
    );

    let mut renumbered = replay(&session, frames(100));
    renumbered.zone_stats[1].zone_num = 5;
    assert_eq!(
        rejection(&encode(&renumbered), &session, &map),
        RunValidationErrorType::OutOfSync
    );

    let mut missing_zone = replay(&session, frames(100));
    missing_zone.zone_stats.pop();
    assert_eq!(
        rejection(&encode(&missing_zone), &session, &map),
        RunValidationErrorType::OutOfSync
    );
}

#[test]
fn fucky_behaviour() {
    let session = main_session();

    let mut jumpy = replay(&session, frames(100));
    jumpy.overall_stats.jumps = 100;
    assert_eq!(
        rejection(&encode(&jumpy), &session, &map()),
        RunValidationErrorType::FuckyBehaviour
    );

    let bytes = encode(&replay(&session, frames_with_step(100, 1000.0)));
    assert_eq!(
        rejection(&bytes, &session, &map()),
        RunValidationErrorType::FuckyBehaviour
    );

    // Normal speed, but the map is slow.
    let mut zones = zones();
    zones["maxVelocity"] = serde_json::json!(100.0);
    let bytes = encode(&replay(&session, frames(100)));
    assert_eq!(
        rejection(&bytes, &session, &map_with(zones)),
        RunValidationErrorType::FuckyBehaviour
    );
}

#[test]
fn bad_session_timestamps() {
    let session = session(TrackType::Main, 1, vec![ts(0, 0, 0), ts(1, 0, 50), ts(1, 1, 40)]);
    let err = RunValidator::default()
        .validate(&[], &ctx(&session, &map()))
        .unwrap_err();

    assert_eq!(err.kind, RunValidationErrorType::BadTimestamps);
    assert_eq!(err.stage, ValidationStage::Received);
}

#[test]
fn crossings_from_timestamps() {
    assert_eq!(zone_crossings(&[], 10), vec![]);

    let ranges = |timestamps: &[_]| -> Vec<_> {
        zone_crossings(timestamps, 10)
            .iter()
            .map(|c| (c.zone_num, c.start_tick, c.end_tick))
            .collect()
    };
    assert_eq!(
        ranges(&[ts(0, 0, 0), ts(1, 0, 4), ts(2, 0, 7)]),
        vec![(1, 0, 4), (2, 4, 7), (3, 7, 10)]
    );
    // Leaving the start zone late still counts the frames spent in it.
    assert_eq!(ranges(&[ts(0, 0, 3), ts(1, 0, 6)]), vec![(1, 0, 6), (2, 6, 10)]);
}

#[test]
fn main_track_timestamps() {
    let map = map();
    let check = |timestamps| check_timestamps(&session(TrackType::Main, 1, timestamps), &map.zones);

    assert_eq!(check(vec![ts(0, 0, 0), ts(1, 0, 10)]), Ok(()));
    assert_eq!(
        check(vec![ts(0, 0, 0), ts(0, 1, 5), ts(1, 0, 10), ts(1, 1, 20)]),
        Ok(())
    );
    assert_eq!(check(vec![ts(0, 0, 0), ts(0, 1, 10), ts(1, 0, 10)]), Ok(()));

    // Never hit the start zone.
    assert!(check(vec![]).is_err());
    assert!(check(vec![ts(1, 0, 10)]).is_err());
    assert!(check(vec![ts(0, 1, 5), ts(1, 0, 10)]).is_err());
    // Never left the first stage.
    assert!(check(vec![ts(0, 0, 0)]).is_err());
    // Start zone twice.
    assert!(check(vec![ts(0, 0, 0), ts(0, 0, 5), ts(1, 0, 10)]).is_err());
    // Entered the second stage through its checkpoint.
    assert!(check(vec![ts(0, 0, 0), ts(1, 1, 10)]).is_err());
    // Back to the first stage.
    assert!(check(vec![ts(0, 0, 0), ts(1, 0, 10), ts(0, 0, 20)]).is_err());
    // Checkpoint that does not exist.
    assert!(check(vec![ts(0, 0, 0), ts(0, 2, 5), ts(1, 0, 10)]).is_err());
    // Same checkpoint twice.
    assert!(check(vec![ts(0, 0, 0), ts(0, 1, 5), ts(0, 1, 6), ts(1, 0, 10)]).is_err());
    // Segment that does not exist.
    assert!(check(vec![ts(0, 0, 0), ts(1, 0, 10), ts(2, 0, 20)]).is_err());
}

#[test]
fn unordered_segments_start_anywhere() {
    let mut zones = zones();
    zones["tracks"]["main"]["segmentsOrdered"] = serde_json::json!(false);
    let map = map_with(zones);
    let check = |timestamps| check_timestamps(&session(TrackType::Main, 1, timestamps), &map.zones);

    assert_eq!(check(vec![ts(1, 0, 0), ts(0, 0, 10)]), Ok(()));
    assert!(check(vec![ts(1, 0, 0), ts(1, 1, 5)]).is_err());
}

#[test]
fn required_checkpoints() {
    let mut zones = zones();
    zones["tracks"]["main"]["zones"]["segments"][0]["checkpointsRequired"] = serde_json::json!(true);
    let map = map_with(zones);
    let check = |timestamps| check_timestamps(&session(TrackType::Main, 1, timestamps), &map.zones);

    assert_eq!(check(vec![ts(0, 0, 0), ts(0, 1, 5), ts(1, 0, 10)]), Ok(()));
    assert!(check(vec![ts(0, 0, 0), ts(1, 0, 10)]).is_err());
}

#[test]
fn main_track_without_segments() {
    let mut zones = zones();
    zones["tracks"]["main"]["zones"]["segments"] = serde_json::json!([]);
    let map = map_with(zones);

    for timestamps in [vec![], vec![ts(0, 0, 0)], vec![ts(0, 0, 0), ts(1, 0, 50)]] {
        let session = session(TrackType::Main, 1, timestamps);
        let err = check_timestamps(&session, &map.zones).unwrap_err();
        assert!(err.contains("no segments"), "{}", err);
    }

    let session = main_session();
    let bytes = encode(&replay(&session, frames(100)));
    assert_eq!(
        rejection(&bytes, &session, &map),
        RunValidationErrorType::BadTimestamps
    );
}

#[test]
fn stage_and_bonus_timestamps() {
    let map = map();

    assert_eq!(
        check_timestamps(&session(TrackType::Stage, 2, vec![ts(0, 1, 5)]), &map.zones),
        Ok(())
    );
    assert_eq!(
        check_timestamps(&session(TrackType::Bonus, 1, vec![]), &map.zones),
        Ok(())
    );
    assert!(check_timestamps(&session(TrackType::Bonus, 1, vec![ts(1, 0, 5)]), &map.zones).is_err());
    assert!(check_timestamps(&session(TrackType::Bonus, 2, vec![]), &map.zones).is_err());
    assert!(check_timestamps(&session(TrackType::Stage, 3, vec![]), &map.zones).is_err());
}

#[test]
fn unresolved_zone_volume() {
    let mut zones = zones();
    zones["tracks"]["main"]["zones"]["end"]["volumeIndex"] = serde_json::json!(9);
    let map = map_with(zones);

    let err = check_timestamps(&main_session(), &map.zones).unwrap_err();
    assert!(err.contains("9"), "{}", err);
}
