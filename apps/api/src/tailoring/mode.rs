//! Tailoring modes — the closed set of strategies a job can request.
//!
//! The mode selects the prompt and temperature and also keys the daily quota,
//! so every mode maps to one usage counter column.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TailoringMode {
    Basic,
    Personalized,
    Aggressive,
    CoverLetter,
    Linkedin,
    Interview,
}

impl TailoringMode {
    pub const ALL: [TailoringMode; 6] = [
        TailoringMode::Basic,
        TailoringMode::Personalized,
        TailoringMode::Aggressive,
        TailoringMode::CoverLetter,
        TailoringMode::Linkedin,
        TailoringMode::Interview,
    ];

    /// Wire name, as accepted in requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            TailoringMode::Basic => "basic",
            TailoringMode::Personalized => "personalized",
            TailoringMode::Aggressive => "aggressive",
            TailoringMode::CoverLetter => "coverLetter",
            TailoringMode::Linkedin => "linkedin",
            TailoringMode::Interview => "interview",
        }
    }

    /// Column in `usage_counters` holding today's count for this mode.
    pub fn counter_column(&self) -> &'static str {
        match self {
            TailoringMode::Basic => "basic_count",
            TailoringMode::Personalized => "personalized_count",
            TailoringMode::Aggressive => "aggressive_count",
            TailoringMode::CoverLetter => "cover_letter_count",
            TailoringMode::Linkedin => "linkedin_count",
            TailoringMode::Interview => "interview_count",
        }
    }

    /// Position of this mode in per-mode arrays (counters, limits).
    pub(crate) fn slot(&self) -> usize {
        match self {
            TailoringMode::Basic => 0,
            TailoringMode::Personalized => 1,
            TailoringMode::Aggressive => 2,
            TailoringMode::CoverLetter => 3,
            TailoringMode::Linkedin => 4,
            TailoringMode::Interview => 5,
        }
    }
}

impl fmt::Display for TailoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl FromStr for TailoringMode {
    type Err = UnknownMode;

    /// Accepts the camelCase wire names plus their snake_case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "basic" => Ok(TailoringMode::Basic),
            "personalized" => Ok(TailoringMode::Personalized),
            "aggressive" => Ok(TailoringMode::Aggressive),
            "coverLetter" | "cover_letter" => Ok(TailoringMode::CoverLetter),
            "linkedin" => Ok(TailoringMode::Linkedin),
            "interview" => Ok(TailoringMode::Interview),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_round_trips_through_its_wire_name() {
        for mode in TailoringMode::ALL {
            assert_eq!(mode.as_str().parse::<TailoringMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_snake_case_cover_letter_is_accepted() {
        assert_eq!(
            "cover_letter".parse::<TailoringMode>(),
            Ok(TailoringMode::CoverLetter)
        );
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = "shouty".parse::<TailoringMode>().unwrap_err();
        assert_eq!(err, UnknownMode("shouty".to_string()));
    }

    #[test]
    fn test_slots_are_distinct() {
        let mut slots: Vec<usize> = TailoringMode::ALL.iter().map(|m| m.slot()).collect();
        slots.sort();
        slots.dedup();
        assert_eq!(slots.len(), TailoringMode::ALL.len());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&TailoringMode::CoverLetter).unwrap();
        assert_eq!(json, "\"coverLetter\"");
    }
}
