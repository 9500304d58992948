//! Map zone geometry as loaded from a map's zone file.
//!
//! This model is only ever read by the run pipeline. A track is a list of
//! segments, each with checkpoint zones, plus a terminal end zone. Zones do
//! not own their geometry, they point into [`MapZones::volumes`] by index.

use crate::gamemode::TrackType;

pub const CURRENT_ZONE_FORMAT_VERSION: u32 = 1;

pub const MAX_COORD: f64 = 65536.0;
pub const MIN_COORD: f64 = -MAX_COORD;

pub const MAX_ZONE_REGION_POINTS: usize = 64;

pub const MAX_TRACK_SEGMENTS: usize = 255;
pub const MAX_STAGE_TRACKS: usize = MAX_TRACK_SEGMENTS;
pub const MAX_BONUS_TRACKS: usize = 255;

/// Includes the segment start zone.
pub const MAX_SEGMENT_CHECKPOINTS: usize = 255;

/// One start per main segment, the main end, and a start/end for every stage.
pub const MAX_ZONES_ALL_TRACKS: usize = MAX_TRACK_SEGMENTS + 1 + MAX_STAGE_TRACKS * 2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ZoneValidationError {
    #[error("bad format version {0}")]
    BadFormatVersion(u32),
    #[error("the main track has no segments")]
    NoMainSegments,
    #[error("track {track} has too many segments")]
    TooManySegments { track: String },
    #[error("track {track} segment {segment} {reason}")]
    BadSegment {
        track: String,
        segment: usize,
        reason: &'static str,
    },
    #[error("{track} does not have a checkpoint to use as a stage track end")]
    BadStageEnd { track: String },
    #[error("too many bonus tracks")]
    TooManyBonuses,
    #[error("bonus {bonus} track {reason}")]
    BadBonus { bonus: usize, reason: &'static str },
    #[error("too many zones in total")]
    TooManyZones,
    #[error("zone in {track} references volume {index} but only {available} volumes exist")]
    UnresolvedVolume {
        track: String,
        index: usize,
        available: usize,
    },
    #[error("volume {index} {reason}")]
    BadVolume { index: usize, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapZones {
    pub format_version: u32,
    #[serde(default)]
    pub data_timestamp: u64,
    #[serde(default)]
    pub max_velocity: Option<f64>,
    pub volumes: Vec<Volume>,
    pub tracks: MapTracks,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MapTracks {
    pub main: MainTrack,
    #[serde(default)]
    pub bonuses: Vec<BonusTrack>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainTrack {
    pub zones: TrackZones,
    #[serde(default)]
    pub stages_end_at_stage_starts: bool,
    #[serde(default = "default_true")]
    pub segments_ordered: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusTrack {
    #[serde(default)]
    pub zones: Option<TrackZones>,
    #[serde(default)]
    pub defrag_modifiers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackZones {
    pub segments: Vec<Segment>,
    pub end: Zone,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub checkpoints: Vec<Zone>,
    #[serde(default)]
    pub cancel: Vec<Zone>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub limit_start_ground_speed: bool,
    #[serde(default)]
    pub checkpoints_required: bool,
    #[serde(default)]
    pub checkpoints_ordered: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub volume_index: usize,
    #[serde(default)]
    pub filtername: Option<String>,
}

/// A polygon extruded upwards from `bottom` by `height`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Volume {
    pub points: Vec<[f64; 2]>,
    pub bottom: f64,
    pub height: f64,
}

fn default_true() -> bool {
    true
}

impl MapZones {
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn bonus_count(&self) -> usize {
        self.tracks.bonuses.len()
    }

    /// Stage tracks only exist when the main track is split into segments.
    pub fn stage_count(&self) -> usize {
        let segments = self.tracks.main.zones.segments.len();
        if segments > 1 {
            segments
        } else {
            0
        }
    }

    pub fn volume(&self, zone: &Zone) -> Option<&Volume> {
        self.volumes.get(zone.volume_index)
    }

    /// The segments a run on the given track passes through.
    ///
    /// Main is track 1, stages and bonuses are numbered from 1. Defrag
    /// modifier bonuses reuse the main track's geometry.
    pub fn segments_for(&self, track_type: TrackType, track_num: u16) -> Option<&[Segment]> {
        let main = &self.tracks.main.zones.segments;
        match track_type {
            TrackType::Main if track_num == 1 => Some(main.as_slice()),
            TrackType::Main => None,
            TrackType::Stage => {
                let index = usize::from(track_num).checked_sub(1)?;
                if index >= self.stage_count() {
                    return None;
                }
                main.get(index..=index)
            }
            TrackType::Bonus => {
                let index = usize::from(track_num).checked_sub(1)?;
                let bonus = self.tracks.bonuses.get(index)?;
                match &bonus.zones {
                    Some(zones) => Some(zones.segments.as_slice()),
                    None => Some(main.as_slice()),
                }
            }
        }
    }

    /// Every zone of every track resolves into `volumes`.
    pub fn check_volume_references(&self) -> Result<(), ZoneValidationError> {
        let available = self.volumes.len();
        let check = |zone: &Zone, track: &str| {
            if self.volume(zone).is_some() {
                Ok(())
            } else {
                Err(ZoneValidationError::UnresolvedVolume {
                    track: track.to_owned(),
                    index: zone.volume_index,
                    available,
                })
            }
        };

        let mut tracks = vec![("Main".to_owned(), &self.tracks.main.zones)];
        for (i, bonus) in self.tracks.bonuses.iter().enumerate() {
            if let Some(zones) = &bonus.zones {
                tracks.push((format!("Bonus {}", i + 1), zones));
            }
        }

        for (name, zones) in tracks {
            check(&zones.end, &name)?;
            for segment in zones.segments.iter() {
                for zone in segment.checkpoints.iter().chain(segment.cancel.iter()) {
                    check(zone, &name)?;
                }
            }
        }

        Ok(())
    }

    /// Full structural validation of a zone file.
    pub fn validate(&self) -> Result<(), ZoneValidationError> {
        if self.format_version != CURRENT_ZONE_FORMAT_VERSION {
            return Err(ZoneValidationError::BadFormatVersion(self.format_version));
        }

        let main = &self.tracks.main;
        let main_segments = main.zones.segments.len();
        if main_segments == 0 {
            return Err(ZoneValidationError::NoMainSegments);
        }

        let mut total_zones = validate_track(&main.zones, "Main")?;

        if main_segments > 1 && !main.stages_end_at_stage_starts {
            for (i, segment) in main.zones.segments.iter().enumerate() {
                // The last checkpoint doubles as the stage end, so it has to exist
                // and be reached in order.
                if segment.checkpoints.len() < 2 || !segment.checkpoints_ordered {
                    return Err(ZoneValidationError::BadStageEnd {
                        track: format!("Stage {}", i + 1),
                    });
                }
            }
        }
        // Each stage contributes its own start and end.
        total_zones += self.stage_count() * 2;

        if self.tracks.bonuses.len() > MAX_BONUS_TRACKS {
            return Err(ZoneValidationError::TooManyBonuses);
        }

        for (i, bonus) in self.tracks.bonuses.iter().enumerate() {
            let number = i + 1;
            match (&bonus.zones, bonus.defrag_modifiers) {
                (Some(_), Some(_)) | (None, None) => {
                    return Err(ZoneValidationError::BadBonus {
                        bonus: number,
                        reason: "must specify exactly one of zones or defragModifiers",
                    });
                }
                (Some(zones), None) => {
                    if zones.segments.len() != 1 {
                        return Err(ZoneValidationError::BadBonus {
                            bonus: number,
                            reason: "must have a single segment",
                        });
                    }
                    total_zones += validate_track(zones, &format!("Bonus {}", number))?;
                }
                (None, Some(_)) => {
                    if main_segments > 1 {
                        return Err(ZoneValidationError::BadBonus {
                            bonus: number,
                            reason: "uses defrag modifiers but the main track has several segments",
                        });
                    }
                }
            }
        }

        if total_zones > MAX_ZONES_ALL_TRACKS {
            return Err(ZoneValidationError::TooManyZones);
        }

        for (index, volume) in self.volumes.iter().enumerate() {
            validate_volume(index, volume)?;
        }

        self.check_volume_references()
    }
}

fn validate_track(zones: &TrackZones, name: &str) -> Result<usize, ZoneValidationError> {
    if zones.segments.len() > MAX_TRACK_SEGMENTS {
        return Err(ZoneValidationError::TooManySegments {
            track: name.to_owned(),
        });
    }

    let mut count = 1;
    for (i, segment) in zones.segments.iter().enumerate() {
        let bad = |reason| ZoneValidationError::BadSegment {
            track: name.to_owned(),
            segment: i + 1,
            reason,
        };

        if segment.checkpoints.is_empty() {
            return Err(bad("has no checkpoints"));
        }
        if segment.checkpoints.len() > MAX_SEGMENT_CHECKPOINTS {
            return Err(bad("has too many checkpoints"));
        }
        count += segment.checkpoints.len() + segment.cancel.len();
    }

    Ok(count)
}

fn validate_volume(index: usize, volume: &Volume) -> Result<(), ZoneValidationError> {
    let bad = |reason| ZoneValidationError::BadVolume { index, reason };

    if volume.points.len() < 3 {
        return Err(bad("has fewer than 3 points"));
    }
    if volume.points.len() > MAX_ZONE_REGION_POINTS {
        return Err(bad("has too many points"));
    }
    let in_range = |v: f64| v.is_finite() && (MIN_COORD..=MAX_COORD).contains(&v);
    if !volume.points.iter().flatten().copied().all(in_range) || !in_range(volume.bottom) {
        return Err(bad("has a coordinate out of bounds"));
    }
    if !(volume.height.is_finite() && volume.height > 0.0) {
        return Err(bad("has a non-positive height"));
    }

    Ok(())
}
