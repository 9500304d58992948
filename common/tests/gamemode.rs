use common::bitflags::{self, buttons, run_flags, ActivityType};
use common::gamemode::{leaderboard_name, Gamemode, LeaderboardKey, TrackType};
use pretty_assertions::assert_eq;

#[test]
fn every_gamemode_has_tables() {
    for gamemode in Gamemode::ALL {
        let interval = gamemode.tick_interval();
        assert!(interval.is_finite() && interval > 0.0, "{:?}", gamemode);
        assert_ne!(gamemode.name(), "Unknown");
        assert_eq!(Gamemode::try_from(gamemode as u8), Ok(gamemode));
    }
}

#[test]
fn tick_intervals() {
    assert_eq!(Gamemode::Ahop.tick_interval(), 0.015);
    assert_eq!(Gamemode::Surf.tick_interval(), 0.015);
    assert_eq!(Gamemode::Bhop.tick_interval(), 0.01);
    assert_eq!(Gamemode::ClimbKzt.tick_interval(), 0.0078125);
}

#[test]
fn unknown_gamemode() {
    assert!(Gamemode::try_from(0).is_err());
    assert!(Gamemode::try_from(14).is_err());
    assert!(serde_json::from_str::<Gamemode>("200").is_err());
    assert_eq!(serde_json::from_str::<Gamemode>("9").unwrap(), Gamemode::Ahop);
    assert_eq!(serde_json::to_string(&Gamemode::Bhop).unwrap(), "2");
}

#[test]
fn incompatibility_is_checked_both_ways() {
    assert!(Gamemode::Surf.mutually_incompatible(Gamemode::Bhop));
    assert!(Gamemode::ClimbMom.mutually_incompatible(Gamemode::Ahop));
    assert!(!Gamemode::Surf.mutually_incompatible(Gamemode::Rj));
    assert!(!Gamemode::Bhop.mutually_incompatible(Gamemode::BhopHl1));
    assert!(!Gamemode::DefragCpm.mutually_incompatible(Gamemode::Surf));
}

#[test]
fn leaderboard_key_packing() {
    let key = LeaderboardKey::new(Gamemode::Conc, TrackType::Bonus, 513, 7);
    assert_eq!(LeaderboardKey::from_packed(key.packed()), Ok(key));
    assert_eq!(key.to_string(), "10-2-513-7");

    let mut seen = std::collections::HashSet::new();
    for gamemode in Gamemode::ALL {
        for track_type in [TrackType::Main, TrackType::Stage, TrackType::Bonus] {
            for track_num in [0, 1, 2, 255, 256, u16::MAX] {
                for style in [0, 1, 256, u16::MAX] {
                    let key = LeaderboardKey::new(gamemode, track_type, track_num, style);
                    assert!(seen.insert(key.packed()), "collision for {:?}", key);
                }
            }
        }
    }
}

#[test]
fn leaderboard_names() {
    assert_eq!(
        LeaderboardKey::new(Gamemode::Surf, TrackType::Main, 1, 0).display_name(),
        "Surf main track"
    );
    assert_eq!(leaderboard_name(TrackType::Bonus, 2, None), "bonus 2");
}

#[test]
fn flag_helpers() {
    let flags = bitflags::add(run_flags::NONE, run_flags::SIDEWAYS);
    assert!(bitflags::has(flags, run_flags::SIDEWAYS));
    assert!(!bitflags::has(flags, run_flags::W_ONLY));

    let flags = bitflags::toggle(flags, run_flags::W_ONLY);
    assert!(bitflags::has(flags, run_flags::SIDEWAYS | run_flags::W_ONLY));

    let flags = bitflags::remove(flags, run_flags::SIDEWAYS);
    assert_eq!(flags, run_flags::W_ONLY);

    assert!(bitflags::has(buttons::JUMP | buttons::DUCK, buttons::JUMP));
}

#[test]
fn activity_filters() {
    assert!(ActivityType::WrAchieved.matches(0));
    assert!(ActivityType::WrAchieved.matches(ActivityType::WrAchieved.bits() | ActivityType::PbAchieved.bits()));
    assert!(!ActivityType::PbAchieved.matches(ActivityType::WrAchieved.bits()));
}
