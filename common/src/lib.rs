pub mod bitflags;
pub mod gamemode;
pub mod stats;
pub mod zones;

pub use gamemode::{Gamemode, LeaderboardKey, LeaderboardType, Style, TrackType};
pub use stats::{BaseStats, ZoneStats};

pub type UserId = u32;
pub type MapId = u32;
pub type SteamId = u64;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub overall: BaseStats,
    pub zones: Vec<ZoneStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosXpGain {
    pub gain_lvl: u32,
    #[serde(rename = "oldXP")]
    pub old_xp: u64,
    #[serde(rename = "gainXP")]
    pub gain_xp: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct XpGain {
    #[serde(rename = "rankXP")]
    pub rank_xp: i32,
    #[serde(rename = "cosXP")]
    pub cos_xp: CosXpGain,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub id: String,
    pub map_id: MapId,
    pub user_id: UserId,
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    pub style: Style,
    pub time: f64,
    pub flags: u32,
    pub stats: RunStats,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankInfo {
    pub rank: u32,
    #[serde(rename = "rankXP")]
    pub rank_xp: i32,
    pub time: f64,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRun {
    pub is_new_world_record: bool,
    pub is_new_personal_best: bool,
    pub run: RunInfo,
    pub rank: Option<RankInfo>,
    pub xp: XpGain,
}

/// Body returned when a submitted run is rejected.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunValidationErrorBody {
    pub code: u8,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunSession {
    pub map_id: MapId,
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    #[serde(default)]
    pub zone_num: u8,
    #[serde(default)]
    pub style: Style,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UpdateRunSession {
    pub segment: u8,
    pub checkpoint: u8,
    pub tick: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSessionInfo {
    pub id: u64,
    pub map_id: MapId,
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    pub zone_num: u8,
    pub style: Style,
    pub created_at: String,
}
