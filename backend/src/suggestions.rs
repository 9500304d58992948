//! Checks leaderboard suggestions against a map's zones.
//!
//! The same rules apply to what a submitter suggests, what reviewers suggest
//! and the final set of leaderboards an approver picks, with small differences
//! per [`SuggestionType`].

use common::gamemode::leaderboard_name;
use common::zones::MapZones;
use common::{Gamemode, LeaderboardType, TrackType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SuggestionType {
    Submission,
    Approval,
    Review,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub gamemode: Gamemode,
    pub track_type: TrackType,
    pub track_num: u16,
    #[serde(default)]
    pub tier: Option<u8>,
    #[serde(default)]
    pub gameplay_rating: Option<u8>,
    #[serde(rename = "type", default)]
    pub leaderboard_type: Option<LeaderboardType>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SuggestionValidationError(pub String);

fn fail<T>(message: String) -> Result<T, SuggestionValidationError> {
    Err(SuggestionValidationError(message))
}

fn valid_rating(value: u8) -> bool {
    (1..=10).contains(&value)
}

pub fn validate_suggestions(
    suggestions: &[Suggestion],
    zones: &MapZones,
    kind: SuggestionType,
) -> Result<(), SuggestionValidationError> {
    let mut has_main_track = false;

    for (idx, sugg) in suggestions.iter().enumerate() {
        let name = leaderboard_name(sugg.track_type, sugg.track_num, Some(sugg.gamemode));

        for (idx2, other) in suggestions.iter().enumerate() {
            if idx == idx2
                || sugg.track_type != other.track_type
                || sugg.track_num != other.track_num
            {
                continue;
            }

            if sugg.gamemode == other.gamemode {
                return fail(format!("Duplicate suggestion for {}", name));
            }

            // Only two way incompatibilities are rejected, a mode excluding
            // another on its own could still be a valid secondary mode.
            if sugg.gamemode.mutually_incompatible(other.gamemode) {
                return fail(format!(
                    "Incompatible gamemodes {} and {} on {}",
                    sugg.gamemode.name(),
                    other.gamemode.name(),
                    leaderboard_name(sugg.track_type, sugg.track_num, None)
                ));
            }
        }

        match sugg.track_type {
            TrackType::Main if sugg.track_num == 1 => has_main_track = true,
            TrackType::Main => {
                return fail("Only one main track allowed, must be track 1".to_string())
            }
            TrackType::Stage => {
                return fail("Suggestions should not include stage tracks".to_string())
            }
            TrackType::Bonus => {}
        }

        let hidden_approval = kind == SuggestionType::Approval
            && sugg.leaderboard_type == Some(LeaderboardType::Hidden);
        match (kind, sugg.tier) {
            _ if hidden_approval => {
                if sugg.tier.is_some() {
                    return fail(format!("Hidden leaderboard {} has a tier", name));
                }
            }
            (SuggestionType::Review, None) => {}
            (_, Some(tier)) if valid_rating(tier) => {}
            (_, tier) => {
                let tier = tier.map_or_else(|| "none".to_string(), |t| t.to_string());
                return fail(format!("Invalid tier {} for {}", tier, name));
            }
        }

        if let Some(rating) = sugg.gameplay_rating {
            if !valid_rating(rating) {
                return fail(format!("Invalid gameplay rating {} for {}", rating, name));
            }
        }

        let type_ok = match (kind, sugg.leaderboard_type) {
            (SuggestionType::Review, None) => true,
            (_, Some(LeaderboardType::Ranked | LeaderboardType::Unranked)) => true,
            (SuggestionType::Approval, Some(LeaderboardType::Hidden)) => true,
            _ => false,
        };
        if !type_ok {
            let given = sugg
                .leaderboard_type
                .map_or_else(|| "none".to_string(), |t| format!("{:?}", t));
            return fail(format!("Invalid leaderboard type {} for {}", given, name));
        }
    }

    let bonus_count = zones.bonus_count() as u16;

    if matches!(kind, SuggestionType::Submission | SuggestionType::Approval) {
        if !has_main_track {
            return fail("Missing main track".to_string());
        }

        for bonus in 1..=bonus_count {
            if !suggestions
                .iter()
                .any(|s| s.track_type == TrackType::Bonus && s.track_num == bonus)
            {
                return fail(format!("Bonus track {} has no suggestions", bonus));
            }
        }
    }

    if kind == SuggestionType::Approval {
        let tracks = std::iter::once((TrackType::Main, 1))
            .chain((1..=bonus_count).map(|num| (TrackType::Bonus, num)));
        for (track_type, track_num) in tracks {
            let listed = suggestions.iter().any(|s| {
                s.track_type == track_type
                    && s.track_num == track_num
                    && matches!(
                        s.leaderboard_type,
                        Some(LeaderboardType::Ranked | LeaderboardType::Unranked)
                    )
            });
            if !listed {
                return fail(format!(
                    "Missing non-hidden leaderboards for {}",
                    leaderboard_name(track_type, track_num, None)
                ));
            }
        }
    }

    for sugg in suggestions.iter().filter(|s| s.track_type == TrackType::Bonus) {
        if sugg.track_num == 0 || sugg.track_num > bonus_count {
            return fail(format!(
                "Suggestion refers to bonus track ({}) that does not exist",
                sugg.track_num
            ));
        }
    }

    Ok(())
}
