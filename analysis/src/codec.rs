//! Binary encoding of replay files.
//!
//! Little-endian throughout, strings carry a `u32` byte length in front of
//! their UTF-8 bytes. The layout is
//!
//! ```text
//! magic u32 | version u32
//! map name str | map hash [u8; 40] | player name str | steam id u64
//! tick interval f64 | run flags u32 | run date str
//! start tick i32 | stop tick i32 | track num i32 | zone num i32
//! overall stats 14 x f64
//! zone count u32 | zone count x (zone num i32 | 14 x f64)
//! frames 8 x 4 bytes, up to the end of the buffer
//! ```

use common::{BaseStats, ZoneStats};

use crate::replay::{Replay, ReplayHeader, RunFrame};

/// `"MOMR"` packed with [`magic_from_tag`].
pub const REPLAY_MAGIC: u32 = 0x524D_4F4D;
pub const FORMAT_VERSION: u32 = 1;

pub const MAP_HASH_LEN: usize = 40;
/// Magic, version, the three string prefixes, the hash, steam id, tick
/// interval, run flags and the four trailing ints.
pub const HEADER_MIN_SIZE: usize = 4 + 4 + 4 + MAP_HASH_LEN + 4 + 8 + 8 + 4 + 4 + 4 * 4;
pub const STATS_SIZE: usize = BaseStats::FIELD_COUNT * 8;
pub const ZONE_STATS_SIZE: usize = 4 + STATS_SIZE;
pub const FRAME_SIZE: usize = 8 * 4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("replay is {len} bytes, shorter than the {HEADER_MIN_SIZE} byte header")]
    TooShort { len: usize },
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("{section} needs {needed} bytes but only {remaining} remain")]
    Truncated {
        section: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("invalid {field}")]
    InvalidString { field: &'static str },
    #[error("{field} is not a valid count: {value}")]
    InvalidStats { field: &'static str, value: f64 },
    #[error("{remaining} bytes left over after the last whole frame")]
    TrailingFrameBytes { remaining: usize },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("map hash must be {MAP_HASH_LEN} hex characters, got {0:?}")]
    BadMapHash(String),
    #[error("{field} is too long to encode")]
    TooLong { field: &'static str },
}

/// Packs a 4 character tag into an integer, first character in the lowest
/// byte. `None` for anything that is not exactly 4 ASCII characters.
pub fn magic_from_tag(tag: &str) -> Option<u32> {
    let bytes: [u8; 4] = tag.as_bytes().try_into().ok()?;
    if !bytes.is_ascii() {
        return None;
    }
    Some(u32::from_le_bytes(bytes))
}

struct Reader<'b> {
    buf: &'b [u8],
}

impl<'b> Reader<'b> {
    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, section: &'static str, needed: usize) -> Result<&'b [u8], DecodeError> {
        if needed > self.buf.len() {
            return Err(DecodeError::Truncated {
                section,
                needed,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(needed);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, section: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(section, N)?);
        Ok(out)
    }

    fn u32(&mut self, section: &'static str) -> Result<u32, DecodeError> {
        self.array(section).map(u32::from_le_bytes)
    }

    fn i32(&mut self, section: &'static str) -> Result<i32, DecodeError> {
        self.array(section).map(i32::from_le_bytes)
    }

    fn u64(&mut self, section: &'static str) -> Result<u64, DecodeError> {
        self.array(section).map(u64::from_le_bytes)
    }

    fn f32(&mut self, section: &'static str) -> Result<f32, DecodeError> {
        self.array(section).map(f32::from_le_bytes)
    }

    fn f64(&mut self, section: &'static str) -> Result<f64, DecodeError> {
        self.array(section).map(f64::from_le_bytes)
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u32(field)? as usize;
        let raw = self.take(field, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidString { field })
    }

    fn map_hash(&mut self) -> Result<String, DecodeError> {
        let raw = self.take("map hash", MAP_HASH_LEN)?;
        if !raw.iter().all(u8::is_ascii_hexdigit) {
            return Err(DecodeError::InvalidString { field: "map hash" });
        }
        // All ascii, so this cannot fail.
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidString { field: "map hash" })
    }

    fn stats(&mut self, section: &'static str) -> Result<BaseStats, DecodeError> {
        let mut raw = [0.0; BaseStats::FIELD_COUNT];
        for value in raw.iter_mut() {
            *value = self.f64(section)?;
        }

        Ok(BaseStats {
            jumps: count(BaseStats::FIELD_NAMES[0], raw[0])?,
            strafes: count(BaseStats::FIELD_NAMES[1], raw[1])?,
            avg_strafe_sync: raw[2],
            avg_strafe_sync2: raw[3],
            enter_time: raw[4],
            total_time: raw[5],
            vel_avg_3d: raw[6],
            vel_avg_2d: raw[7],
            vel_max_3d: raw[8],
            vel_max_2d: raw[9],
            vel_enter_3d: raw[10],
            vel_enter_2d: raw[11],
            vel_exit_3d: raw[12],
            vel_exit_2d: raw[13],
        })
    }

    fn frame(&mut self) -> Result<RunFrame, DecodeError> {
        Ok(RunFrame {
            eye_angle_x: self.f32("frame")?,
            eye_angle_y: self.f32("frame")?,
            eye_angle_z: self.f32("frame")?,
            pos_x: self.f32("frame")?,
            pos_y: self.f32("frame")?,
            pos_z: self.f32("frame")?,
            view_offset: self.f32("frame")?,
            buttons: self.u32("frame")?,
        })
    }
}

fn count(field: &'static str, value: f64) -> Result<u32, DecodeError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Ok(value as u32)
    } else {
        Err(DecodeError::InvalidStats { field, value })
    }
}

/// Parses a replay file.
///
/// Never reads past the end of `buf` and never allocates more than the
/// buffer could possibly hold, whatever the length prefixes claim.
pub fn decode(buf: &[u8]) -> Result<Replay, DecodeError> {
    if buf.len() < HEADER_MIN_SIZE {
        return Err(DecodeError::TooShort { len: buf.len() });
    }

    let mut reader = Reader { buf };

    let magic = reader.u32("magic")?;
    if magic != REPLAY_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let version = reader.u32("version")?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let header = ReplayHeader {
        map_name: reader.string("map name")?,
        map_hash: reader.map_hash()?,
        player_name: reader.string("player name")?,
        steam_id: reader.u64("steam id")?,
        tick_interval: reader.f64("tick interval")?,
        run_flags: reader.u32("run flags")?,
        run_date: reader.string("run date")?,
        start_tick: reader.i32("start tick")?,
        stop_tick: reader.i32("stop tick")?,
        track_num: reader.i32("track num")?,
        zone_num: reader.i32("zone num")?,
    };

    let overall_stats = reader.stats("overall stats")?;

    let zone_count = reader.u32("zone stats")? as usize;
    let needed = zone_count.saturating_mul(ZONE_STATS_SIZE);
    if needed > reader.remaining() {
        return Err(DecodeError::Truncated {
            section: "zone stats",
            needed,
            remaining: reader.remaining(),
        });
    }
    let mut zone_stats = Vec::with_capacity(zone_count);
    for _ in 0..zone_count {
        zone_stats.push(ZoneStats {
            zone_num: reader.i32("zone stats")?,
            base_stats: reader.stats("zone stats")?,
        });
    }

    let leftover = reader.remaining() % FRAME_SIZE;
    if leftover != 0 {
        return Err(DecodeError::TrailingFrameBytes {
            remaining: leftover,
        });
    }
    let frame_count = reader.remaining() / FRAME_SIZE;
    let mut frames = Vec::with_capacity(frame_count);
    for _ in 0..frame_count {
        frames.push(reader.frame()?);
    }

    tracing::trace!(
        "Decoded replay of {:?} with {} zones and {} frames",
        header.map_name,
        zone_stats.len(),
        frames.len()
    );

    Ok(Replay {
        magic,
        version,
        header,
        overall_stats,
        zone_stats,
        frames,
    })
}

fn put_string(out: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), EncodeError> {
    let len = u32::try_from(value.len()).map_err(|_| EncodeError::TooLong { field })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_stats(out: &mut Vec<u8>, stats: &BaseStats) {
    for value in stats.to_array() {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Writes a replay in the layout [`decode`] reads.
///
/// `magic` and `version` are written as they are, so broken files can be
/// produced on purpose.
pub fn encode(replay: &Replay) -> Result<Vec<u8>, EncodeError> {
    let header = &replay.header;
    if header.map_hash.len() != MAP_HASH_LEN
        || !header.map_hash.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(EncodeError::BadMapHash(header.map_hash.clone()));
    }
    let zone_count =
        u32::try_from(replay.zone_stats.len()).map_err(|_| EncodeError::TooLong { field: "zone stats" })?;

    let mut out = Vec::with_capacity(
        HEADER_MIN_SIZE
            + header.map_name.len()
            + header.player_name.len()
            + header.run_date.len()
            + STATS_SIZE
            + 4
            + replay.zone_stats.len() * ZONE_STATS_SIZE
            + replay.frames.len() * FRAME_SIZE,
    );

    out.extend_from_slice(&replay.magic.to_le_bytes());
    out.extend_from_slice(&replay.version.to_le_bytes());

    put_string(&mut out, "map name", &header.map_name)?;
    out.extend_from_slice(header.map_hash.as_bytes());
    put_string(&mut out, "player name", &header.player_name)?;
    out.extend_from_slice(&header.steam_id.to_le_bytes());
    out.extend_from_slice(&header.tick_interval.to_le_bytes());
    out.extend_from_slice(&header.run_flags.to_le_bytes());
    put_string(&mut out, "run date", &header.run_date)?;
    for value in [
        header.start_tick,
        header.stop_tick,
        header.track_num,
        header.zone_num,
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }

    put_stats(&mut out, &replay.overall_stats);

    out.extend_from_slice(&zone_count.to_le_bytes());
    for zone in replay.zone_stats.iter() {
        out.extend_from_slice(&zone.zone_num.to_le_bytes());
        put_stats(&mut out, &zone.base_stats);
    }

    for frame in replay.frames.iter() {
        for value in [
            frame.eye_angle_x,
            frame.eye_angle_y,
            frame.eye_angle_z,
            frame.pos_x,
            frame.pos_y,
            frame.pos_z,
            frame.view_offset,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&frame.buttons.to_le_bytes());
    }

    Ok(out)
}
