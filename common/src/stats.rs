/// Movement statistics over a stretch of a run.
///
/// Times are seconds since the start of the run, velocities are units per
/// second.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStats {
    pub jumps: u32,
    pub strafes: u32,
    pub avg_strafe_sync: f64,
    pub avg_strafe_sync2: f64,
    pub enter_time: f64,
    pub total_time: f64,
    #[serde(rename = "velAvg3D")]
    pub vel_avg_3d: f64,
    #[serde(rename = "velAvg2D")]
    pub vel_avg_2d: f64,
    #[serde(rename = "velMax3D")]
    pub vel_max_3d: f64,
    #[serde(rename = "velMax2D")]
    pub vel_max_2d: f64,
    #[serde(rename = "velEnter3D")]
    pub vel_enter_3d: f64,
    #[serde(rename = "velEnter2D")]
    pub vel_enter_2d: f64,
    #[serde(rename = "velExit3D")]
    pub vel_exit_3d: f64,
    #[serde(rename = "velExit2D")]
    pub vel_exit_2d: f64,
}

impl BaseStats {
    pub const FIELD_COUNT: usize = 14;

    /// The fields in wire order.
    pub fn to_array(&self) -> [f64; Self::FIELD_COUNT] {
        [
            f64::from(self.jumps),
            f64::from(self.strafes),
            self.avg_strafe_sync,
            self.avg_strafe_sync2,
            self.enter_time,
            self.total_time,
            self.vel_avg_3d,
            self.vel_avg_2d,
            self.vel_max_3d,
            self.vel_max_2d,
            self.vel_enter_3d,
            self.vel_enter_2d,
            self.vel_exit_3d,
            self.vel_exit_2d,
        ]
    }

    pub const FIELD_NAMES: [&'static str; Self::FIELD_COUNT] = [
        "jumps",
        "strafes",
        "avgStrafeSync",
        "avgStrafeSync2",
        "enterTime",
        "totalTime",
        "velAvg3D",
        "velAvg2D",
        "velMax3D",
        "velMax2D",
        "velEnter3D",
        "velEnter2D",
        "velExit3D",
        "velExit2D",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStats {
    pub zone_num: i32,
    pub base_stats: BaseStats,
}
