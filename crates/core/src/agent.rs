//! Agent Affective State
//!
//! Tracks the remote tutor's mood as reported by inbound frames. The agent is
//! an external collaborator; this module only models the two attributes the
//! client renders: an emotion label and a sulking intensity.

use serde::{Deserialize, Serialize};
use std::fmt;

// --- Emotion ---

/// Emotion label attached to an agent turn.
///
/// Labels arrive as free-form strings; anything unrecognised collapses to
/// [`Emotion::Neutral`] so newer server vocabularies never break the client.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Excited,
    Cheerful,
    Strict,
    Concerned,
    Sulking,
    Angry,
}

impl Emotion {
    /// Parses a wire label, defaulting to `Neutral` for absent, empty, or unknown values.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim).unwrap_or_default() {
            "happy" => Emotion::Happy,
            "excited" => Emotion::Excited,
            "cheerful" => Emotion::Cheerful,
            "strict" => Emotion::Strict,
            "concerned" => Emotion::Concerned,
            "sulking" => Emotion::Sulking,
            "angry" => Emotion::Angry,
            _ => Emotion::Neutral,
        }
    }

    /// The wire label for this emotion.
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Excited => "excited",
            Emotion::Cheerful => "cheerful",
            Emotion::Strict => "strict",
            Emotion::Concerned => "concerned",
            Emotion::Sulking => "sulking",
            Emotion::Angry => "angry",
        }
    }

    /// Vietnamese display text shown next to the agent's name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Emotion::Neutral => "Bình thường",
            Emotion::Happy => "Vui vẻ",
            Emotion::Excited => "Phấn khích",
            Emotion::Cheerful => "Vui tươi",
            Emotion::Strict => "Nghiêm khắc",
            Emotion::Concerned => "Lo lắng",
            Emotion::Sulking => "Đang dỗi",
            Emotion::Angry => "Giận dữ",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Sulking Level ---

/// Mood intensity of the agent, 0 (neutral) to 3 (most negative).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct SulkingLevel(u8);

impl SulkingLevel {
    pub const MAX: u8 = 3;

    /// Builds a level from raw wire input. Absent or zero input yields 0;
    /// anything outside `0..=3` is clamped into range.
    pub fn from_raw(raw: Option<i64>) -> Self {
        let level = raw.unwrap_or(0).clamp(0, i64::from(Self::MAX));
        Self(level as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Short description of the mood at this level.
    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "Hơi dỗi",
            2 => "Đang dỗi",
            3 => "Rất giận",
            _ => "Vui vẻ",
        }
    }
}

impl fmt::Display for SulkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Agent State ---

/// Current affective state of the remote agent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentState {
    pub emotion: Emotion,
    pub sulking_level: SulkingLevel,
}

impl AgentState {
    /// Builds a state from raw wire fields, applying the neutral/0 defaults.
    pub fn from_wire(emotion: Option<&str>, sulking_level: Option<i64>) -> Self {
        Self {
            emotion: Emotion::from_label(emotion),
            sulking_level: SulkingLevel::from_raw(sulking_level),
        }
    }
}
