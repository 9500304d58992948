//! Gamemodes, track types and the leaderboard identity derived from them.

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Gamemode {
    Surf = 1,
    Bhop = 2,
    BhopHl1 = 3,
    ClimbMom = 4,
    ClimbKzt = 5,
    Climb16 = 6,
    Rj = 7,
    Sj = 8,
    Ahop = 9,
    Conc = 10,
    DefragCpm = 11,
    DefragVq3 = 12,
    DefragVtg = 13,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value {value}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: u8,
}

// Seconds per tick, as written by the game build for each mode.
static TICK_INTERVALS: phf::Map<u8, f64> = phf::phf_map! {
    1_u8 => 0.015,
    2_u8 => 0.01,
    3_u8 => 0.01,
    4_u8 => 0.0078125,
    5_u8 => 0.0078125,
    6_u8 => 0.01,
    7_u8 => 0.015,
    8_u8 => 0.015,
    9_u8 => 0.015,
    10_u8 => 0.01,
    11_u8 => 0.008,
    12_u8 => 0.008,
    13_u8 => 0.008,
};

static NAMES: phf::Map<u8, &'static str> = phf::phf_map! {
    1_u8 => "Surf",
    2_u8 => "Bhop",
    3_u8 => "Bhop (HL1)",
    4_u8 => "Climb (Momentum)",
    5_u8 => "Climb (KZT)",
    6_u8 => "Climb (1.6)",
    7_u8 => "Rocket Jump",
    8_u8 => "Sticky Jump",
    9_u8 => "Ahop",
    10_u8 => "Conc",
    11_u8 => "Defrag (CPM)",
    12_u8 => "Defrag (VQ3)",
    13_u8 => "Defrag (Vintage)",
};

// Movement rulesets whose maps make no sense in each other. Only surf, bhop,
// climb and ahop exclude one another; the weapon/defrag modes exclude nothing.
static INCOMPATIBLE: phf::Map<u8, &'static [u8]> = phf::phf_map! {
    1_u8 => &[2, 3, 4, 5, 6, 9],
    2_u8 => &[1, 4, 5, 6, 9],
    3_u8 => &[1, 4, 5, 6, 9],
    4_u8 => &[1, 2, 3, 9],
    5_u8 => &[1, 2, 3, 9],
    6_u8 => &[1, 2, 3, 9],
    7_u8 => &[],
    8_u8 => &[],
    9_u8 => &[1, 2, 3, 4, 5, 6],
    10_u8 => &[],
    11_u8 => &[],
    12_u8 => &[],
    13_u8 => &[],
};

impl Gamemode {
    pub const ALL: [Gamemode; 13] = [
        Gamemode::Surf,
        Gamemode::Bhop,
        Gamemode::BhopHl1,
        Gamemode::ClimbMom,
        Gamemode::ClimbKzt,
        Gamemode::Climb16,
        Gamemode::Rj,
        Gamemode::Sj,
        Gamemode::Ahop,
        Gamemode::Conc,
        Gamemode::DefragCpm,
        Gamemode::DefragVq3,
        Gamemode::DefragVtg,
    ];

    /// The fixed tick interval (seconds per tick) the game runs this mode at.
    pub fn tick_interval(self) -> f64 {
        // Every variant has an entry, see `every_gamemode_has_tables` in the tests.
        TICK_INTERVALS.get(&(self as u8)).copied().unwrap_or(f64::NAN)
    }

    pub fn name(self) -> &'static str {
        NAMES.get(&(self as u8)).copied().unwrap_or("Unknown")
    }

    /// True if `self` lists `other` as incompatible.
    pub fn excludes(self, other: Gamemode) -> bool {
        INCOMPATIBLE
            .get(&(self as u8))
            .map(|list| list.contains(&(other as u8)))
            .unwrap_or(false)
    }

    /// Both modes exclude each other.
    pub fn mutually_incompatible(self, other: Gamemode) -> bool {
        self.excludes(other) && other.excludes(self)
    }
}

impl TryFrom<u8> for Gamemode {
    type Error = UnknownValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Gamemode::ALL
            .into_iter()
            .find(|g| *g as u8 == value)
            .ok_or(UnknownValue {
                kind: "gamemode",
                value,
            })
    }
}

impl From<Gamemode> for u8 {
    fn from(value: Gamemode) -> Self {
        value as u8
    }
}

impl core::fmt::Display for Gamemode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TrackType {
    Main = 0,
    Stage = 1,
    Bonus = 2,
}

impl TrackType {
    pub fn name(self) -> &'static str {
        match self {
            TrackType::Main => "Main",
            TrackType::Stage => "Stage",
            TrackType::Bonus => "Bonus",
        }
    }
}

impl TryFrom<u8> for TrackType {
    type Error = UnknownValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TrackType::Main),
            1 => Ok(TrackType::Stage),
            2 => Ok(TrackType::Bonus),
            value => Err(UnknownValue {
                kind: "track type",
                value,
            }),
        }
    }
}

impl From<TrackType> for u8 {
    fn from(value: TrackType) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum LeaderboardType {
    Ranked = 0,
    Unranked = 1,
    Hidden = 2,
    InSubmission = 3,
}

impl TryFrom<u8> for LeaderboardType {
    type Error = UnknownValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LeaderboardType::Ranked),
            1 => Ok(LeaderboardType::Unranked),
            2 => Ok(LeaderboardType::Hidden),
            3 => Ok(LeaderboardType::InSubmission),
            value => Err(UnknownValue {
                kind: "leaderboard type",
                value,
            }),
        }
    }
}

impl From<LeaderboardType> for u8 {
    fn from(value: LeaderboardType) -> Self {
        value as u8
    }
}

/// Movement style modifier. `0` is the unmodified style.
pub type Style = u16;

/// Identity of a leaderboard within a map.
///
/// Not stored anywhere, always derived from its components. Two keys with the
/// same components are the same leaderboard, and [`LeaderboardKey::packed`]
/// is stable across processes, so it can be used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LeaderboardKey {
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    pub style: Style,
}

impl LeaderboardKey {
    pub fn new(gamemode: Gamemode, track_type: TrackType, track_num: u16, style: Style) -> Self {
        Self {
            gamemode,
            track_type,
            track_num,
            style,
        }
    }

    /// `gamemode:8 | track_type:8 | track_num:16 | style:16`, most significant first.
    pub fn packed(&self) -> u64 {
        (u64::from(self.gamemode as u8) << 40)
            | (u64::from(self.track_type as u8) << 32)
            | (u64::from(self.track_num) << 16)
            | u64::from(self.style)
    }

    pub fn from_packed(value: u64) -> Result<Self, UnknownValue> {
        Ok(Self {
            gamemode: Gamemode::try_from((value >> 40) as u8)?,
            track_type: TrackType::try_from((value >> 32) as u8)?,
            track_num: (value >> 16) as u16,
            style: value as u16,
        })
    }

    /// Human readable name, e.g. `Surf main track` or `Bhop bonus 2`.
    pub fn display_name(&self) -> String {
        leaderboard_name(self.track_type, self.track_num, Some(self.gamemode))
    }
}

impl core::fmt::Display for LeaderboardKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.gamemode as u8, self.track_type as u8, self.track_num, self.style
        )
    }
}

pub fn leaderboard_name(track_type: TrackType, track_num: u16, gamemode: Option<Gamemode>) -> String {
    let mut name = match gamemode {
        Some(gm) => format!("{} ", gm.name()),
        None => String::new(),
    };
    name.push_str(&track_type.name().to_lowercase());
    match track_type {
        TrackType::Main => name.push_str(" track"),
        _ => name.push_str(&format!(" {}", track_num)),
    }
    name
}
