use common::{BaseStats, ZoneStats};

/// A decoded replay file. Built once by [`crate::decode`] and never changed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Replay {
    pub magic: u32,
    pub version: u32,
    pub header: ReplayHeader,
    /// What the client claims about the whole run.
    pub overall_stats: BaseStats,
    /// What the client claims about every zone of the run.
    pub zone_stats: Vec<ZoneStats>,
    pub frames: Vec<RunFrame>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayHeader {
    pub map_name: String,
    /// SHA-1 of the map file the run was recorded on, lowercase or uppercase hex.
    pub map_hash: String,
    pub player_name: String,
    #[serde(rename = "steamID")]
    pub steam_id: u64,
    pub tick_interval: f64,
    pub run_flags: u32,
    /// RFC 3339 timestamp as written by the client.
    pub run_date: String,
    pub start_tick: i32,
    pub stop_tick: i32,
    pub track_num: i32,
    pub zone_num: i32,
}

impl ReplayHeader {
    /// Ticks between the run start and stop, negative if the header is bogus.
    pub fn run_ticks(&self) -> i64 {
        i64::from(self.stop_tick) - i64::from(self.start_tick)
    }

    /// Run time in seconds according to the header.
    pub fn run_time(&self) -> f64 {
        self.run_ticks() as f64 * self.tick_interval
    }
}

/// One simulation tick worth of player state.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunFrame {
    pub eye_angle_x: f32,
    pub eye_angle_y: f32,
    pub eye_angle_z: f32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    pub view_offset: f32,
    pub buttons: u32,
}

impl RunFrame {
    /// Eye angles are pitch/yaw/roll, so the yaw is the Y component.
    pub fn yaw(&self) -> f64 {
        f64::from(self.eye_angle_y)
    }

    pub fn position(&self) -> [f64; 3] {
        [
            f64::from(self.pos_x),
            f64::from(self.pos_y),
            f64::from(self.pos_z),
        ]
    }
}
