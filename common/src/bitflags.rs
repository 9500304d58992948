//! Plain integer flag sets.
//!
//! Flags travel as raw integers over the wire and in replay files, so they are
//! kept as a fixed-width integer with named bit constants rather than a
//! dedicated type per set.

pub fn has(flags: u32, check: u32) -> bool {
    flags & check == check
}

pub fn add(flags: u32, add: u32) -> u32 {
    flags | add
}

pub fn remove(flags: u32, remove: u32) -> u32 {
    flags & !remove
}

pub fn toggle(flags: u32, toggle: u32) -> u32 {
    flags ^ toggle
}

/// Bits of the `runFlags` replay header field.
pub mod run_flags {
    pub const NONE: u32 = 0;
    pub const BACKWARDS: u32 = 1 << 0;
    pub const LOW_GRAVITY: u32 = 1 << 1;
    pub const SIDEWAYS: u32 = 1 << 2;
    pub const HALF_SIDEWAYS: u32 = 1 << 3;
    pub const W_ONLY: u32 = 1 << 4;
    pub const A_ONLY: u32 = 1 << 5;
    pub const D_ONLY: u32 = 1 << 6;
}

/// Input button bits of a replay frame, matching the engine's `IN_*` values.
pub mod buttons {
    pub const ATTACK: u32 = 1 << 0;
    pub const JUMP: u32 = 1 << 1;
    pub const DUCK: u32 = 1 << 2;
    pub const FORWARD: u32 = 1 << 3;
    pub const BACK: u32 = 1 << 4;
    pub const USE: u32 = 1 << 5;
    pub const LEFT: u32 = 1 << 7;
    pub const RIGHT: u32 = 1 << 8;
    pub const MOVELEFT: u32 = 1 << 9;
    pub const MOVERIGHT: u32 = 1 << 10;
}

/// Kinds of activity emitted to followers, also used as a filter bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum ActivityType {
    All = 0,
    MapUploaded = 1 << 0,
    MapApproved = 1 << 1,
    PbAchieved = 1 << 2,
    WrAchieved = 1 << 3,
    ReviewMade = 1 << 4,
    UserJoined = 1 << 5,
}

impl ActivityType {
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Whether a subscriber filter lets this activity through. `0` lets
    /// everything through.
    pub fn matches(self, filter: u32) -> bool {
        filter == ActivityType::All.bits() || has(filter, self.bits())
    }
}
