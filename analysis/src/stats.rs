//! Recomputes movement statistics from raw replay frames.
//!
//! The stats embedded in a replay are only claims made by the client, this is
//! what they get checked against.

use common::bitflags::{self, buttons};
use common::{BaseStats, RunStats, ZoneStats};

use crate::replay::RunFrame;

/// The frames `[start_tick, end_tick)` a run spent in one zone, as ticks
/// relative to the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneCrossing {
    pub zone_num: i32,
    pub start_tick: usize,
    pub end_tick: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregateError {
    #[error("tick interval must be positive, got {0}")]
    InvalidTickInterval(f64),
    #[error("zone crossing {index} {reason}")]
    InvalidZoneCrossings { index: usize, reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrafeDir {
    Left,
    Right,
}

fn strafe_dir(frame: &RunFrame) -> Option<StrafeDir> {
    let left = bitflags::has(frame.buttons, buttons::MOVELEFT);
    let right = bitflags::has(frame.buttons, buttons::MOVERIGHT);
    match (left, right) {
        (true, false) => Some(StrafeDir::Left),
        (false, true) => Some(StrafeDir::Right),
        _ => None,
    }
}

/// Yaw change wrapped into (-180, 180].
fn yaw_delta(from: f64, to: f64) -> f64 {
    let delta = (to - from + 180.0).rem_euclid(360.0) - 180.0;
    if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

/// Everything about a single frame the stats are built from. Each entry only
/// looks at the frame before it, plus the frame after it for jumps.
#[derive(Debug, Clone, Copy, Default)]
struct FrameSample {
    vel_2d: f64,
    vel_3d: f64,
    has_prev: bool,
    airborne: bool,
    synced: bool,
    jump: bool,
    strafe: bool,
}

fn sample_frames(frames: &[RunFrame], tick_interval: f64) -> Vec<FrameSample> {
    let mut samples = Vec::with_capacity(frames.len());
    let mut last_dir = None;

    for (i, frame) in frames.iter().enumerate() {
        let dir = strafe_dir(frame);
        let strafe = match dir {
            Some(d) if last_dir != Some(d) => {
                last_dir = Some(d);
                true
            }
            _ => false,
        };

        let Some(prev) = i.checked_sub(1).map(|p| &frames[p]) else {
            samples.push(FrameSample {
                strafe,
                ..Default::default()
            });
            continue;
        };

        let [x0, y0, z0] = prev.position();
        let [x1, y1, z1] = frame.position();
        let (dx, dy, dz) = (x1 - x0, y1 - y0, z1 - z0);
        let vel_2d = (dx * dx + dy * dy).sqrt() / tick_interval;
        let vel_3d = (dx * dx + dy * dy + dz * dz).sqrt() / tick_interval;

        let yaw = yaw_delta(prev.yaw(), frame.yaw());
        let synced = match dir {
            Some(StrafeDir::Left) => yaw > 0.0,
            Some(StrafeDir::Right) => yaw < 0.0,
            None => false,
        };

        let pressed = bitflags::has(frame.buttons, buttons::JUMP)
            && !bitflags::has(prev.buttons, buttons::JUMP);
        let takes_off = frames
            .get(i + 1)
            .map(|next| f64::from(next.pos_z) - z1 > 0.0)
            .unwrap_or(false);
        let jump = pressed && dz <= 0.0 && takes_off;

        samples.push(FrameSample {
            vel_2d,
            vel_3d,
            has_prev: true,
            airborne: dz != 0.0,
            synced,
            jump,
            strafe,
        });
    }

    samples
}

fn ratio(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.0
    } else {
        f64::from(num) / f64::from(den)
    }
}

fn range_stats(samples: &[FrameSample], start: usize, end: usize, tick_interval: f64) -> BaseStats {
    let range = &samples[start..end];

    let mut stats = BaseStats {
        enter_time: start as f64 * tick_interval,
        total_time: end as f64 * tick_interval,
        ..Default::default()
    };

    let (Some(first), Some(last)) = (range.first(), range.last()) else {
        return stats;
    };

    let mut airborne = 0;
    let mut synced_airborne = 0;
    let mut with_prev = 0;
    let mut synced = 0;
    let mut sum_2d = 0.0;
    let mut sum_3d = 0.0;

    for sample in range {
        stats.jumps += u32::from(sample.jump);
        stats.strafes += u32::from(sample.strafe);

        sum_2d += sample.vel_2d;
        sum_3d += sample.vel_3d;
        stats.vel_max_2d = stats.vel_max_2d.max(sample.vel_2d);
        stats.vel_max_3d = stats.vel_max_3d.max(sample.vel_3d);

        if sample.has_prev {
            with_prev += 1;
            synced += u32::from(sample.synced);
        }
        if sample.airborne {
            airborne += 1;
            synced_airborne += u32::from(sample.synced);
        }
    }

    stats.avg_strafe_sync = ratio(synced_airborne, airborne);
    stats.avg_strafe_sync2 = ratio(synced, with_prev);

    stats.vel_avg_2d = sum_2d / range.len() as f64;
    stats.vel_avg_3d = sum_3d / range.len() as f64;
    stats.vel_enter_2d = first.vel_2d;
    stats.vel_enter_3d = first.vel_3d;
    stats.vel_exit_2d = last.vel_2d;
    stats.vel_exit_3d = last.vel_3d;

    stats
}

fn check_crossings(crossings: &[ZoneCrossing], frame_count: usize) -> Result<(), AggregateError> {
    let mut prev_end = 0;
    for (index, crossing) in crossings.iter().enumerate() {
        let bad = |reason| AggregateError::InvalidZoneCrossings { index, reason };

        if crossing.start_tick > crossing.end_tick {
            return Err(bad("ends before it starts"));
        }
        if crossing.end_tick > frame_count {
            return Err(bad("ends after the last frame"));
        }
        if crossing.start_tick < prev_end {
            return Err(bad("overlaps or precedes the previous crossing"));
        }
        prev_end = crossing.end_tick;
    }
    Ok(())
}

/// Computes the overall and per zone stats of a run.
///
/// Deterministic, and each frame's contribution depends only on itself, the
/// frame before and (for jumps) the frame after. Zone stats are cut out of
/// the same per frame samples as the overall stats, so zone counts add up to
/// at most the overall counts.
pub fn aggregate(
    frames: &[RunFrame],
    crossings: &[ZoneCrossing],
    tick_interval: f64,
) -> Result<RunStats, AggregateError> {
    if !(tick_interval.is_finite() && tick_interval > 0.0) {
        return Err(AggregateError::InvalidTickInterval(tick_interval));
    }
    check_crossings(crossings, frames.len())?;

    let _span = tracing::debug_span!("aggregate", frames = frames.len(), zones = crossings.len()).entered();

    let samples = sample_frames(frames, tick_interval);

    let mut overall = range_stats(&samples, 0, samples.len(), tick_interval);
    overall.enter_time = 0.0;

    let zones = crossings
        .iter()
        .map(|crossing| {
            let base_stats = range_stats(&samples, crossing.start_tick, crossing.end_tick, tick_interval);
            tracing::trace!("Zone {}: {:?}", crossing.zone_num, base_stats);
            ZoneStats {
                zone_num: crossing.zone_num,
                base_stats,
            }
        })
        .collect();

    Ok(RunStats { overall, zones })
}
