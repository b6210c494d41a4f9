use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::tailoring::mode::TailoringMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "free" => Some(Tier::Free),
            "premium" => Some(Tier::Premium),
            _ => None,
        }
    }
}

/// Daily caps per `(tier, mode)`. `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsTable {
    free: [Option<u32>; 6],
    premium: [Option<u32>; 6],
}

impl Default for LimitsTable {
    fn default() -> Self {
        let mut free = [None; 6];
        free[TailoringMode::Basic.slot()] = Some(5);
        free[TailoringMode::Personalized.slot()] = Some(3);
        free[TailoringMode::Aggressive.slot()] = Some(2);
        free[TailoringMode::CoverLetter.slot()] = Some(3);
        free[TailoringMode::Linkedin.slot()] = Some(2);
        free[TailoringMode::Interview.slot()] = Some(2);
        Self {
            free,
            premium: [None; 6],
        }
    }
}

impl LimitsTable {
    pub fn limit(&self, tier: Tier, mode: TailoringMode) -> Option<u32> {
        match tier {
            Tier::Free => self.free[mode.slot()],
            Tier::Premium => self.premium[mode.slot()],
        }
    }

    #[cfg(test)]
    pub fn with_limit(mut self, tier: Tier, mode: TailoringMode, limit: Option<u32>) -> Self {
        match tier {
            Tier::Free => self.free[mode.slot()] = limit,
            Tier::Premium => self.premium[mode.slot()] = limit,
        }
        self
    }
}

/// Outcome of one quota consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow { used: u32, limit: Option<u32> },
    Deny { used: u32, limit: u32 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allow { .. })
    }
}

/// One user's counters for a single calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageCounters {
    pub user_id: Uuid,
    pub tier: Tier,
    pub counts: [u32; 6],
    pub reset_date: NaiveDate,
}

impl UsageCounters {
    pub fn new(user_id: Uuid, tier: Tier, today: NaiveDate) -> Self {
        Self {
            user_id,
            tier,
            counts: [0; 6],
            reset_date: today,
        }
    }

    pub fn count(&self, mode: TailoringMode) -> u32 {
        self.counts[mode.slot()]
    }

    /// Zeroes every counter when `today` is a new day. Returns whether it did.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.reset_date == today {
            return false;
        }
        self.counts = [0; 6];
        self.reset_date = today;
        true
    }

    /// Read-check-increment for one mode. The caller must hold whatever lock
    /// or row lock makes this atomic for the user.
    pub fn apply_consume(
        &mut self,
        mode: TailoringMode,
        limits: &LimitsTable,
        today: NaiveDate,
    ) -> QuotaDecision {
        self.roll_over(today);
        let used = self.counts[mode.slot()];
        match limits.limit(self.tier, mode) {
            Some(limit) if used >= limit => QuotaDecision::Deny { used, limit },
            limit => {
                self.counts[mode.slot()] = used + 1;
                QuotaDecision::Allow {
                    used: used + 1,
                    limit,
                }
            }
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageCountersRow {
    pub user_id: Uuid,
    pub tier: String,
    pub basic_count: i32,
    pub personalized_count: i32,
    pub aggressive_count: i32,
    pub cover_letter_count: i32,
    pub linkedin_count: i32,
    pub interview_count: i32,
    pub reset_date: NaiveDate,
}

impl From<UsageCountersRow> for UsageCounters {
    fn from(row: UsageCountersRow) -> Self {
        let mut counts = [0u32; 6];
        counts[TailoringMode::Basic.slot()] = row.basic_count.max(0) as u32;
        counts[TailoringMode::Personalized.slot()] = row.personalized_count.max(0) as u32;
        counts[TailoringMode::Aggressive.slot()] = row.aggressive_count.max(0) as u32;
        counts[TailoringMode::CoverLetter.slot()] = row.cover_letter_count.max(0) as u32;
        counts[TailoringMode::Linkedin.slot()] = row.linkedin_count.max(0) as u32;
        counts[TailoringMode::Interview.slot()] = row.interview_count.max(0) as u32;
        UsageCounters {
            user_id: row.user_id,
            // Unknown tiers get the restrictive table.
            tier: Tier::parse(&row.tier).unwrap_or(Tier::Free),
            counts,
            reset_date: row.reset_date,
        }
    }
}

/// Per-mode view of today's usage, returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ModeUsage {
    pub mode: TailoringMode,
    pub used: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub user_id: Uuid,
    pub tier: Tier,
    pub reset_date: NaiveDate,
    pub modes: Vec<ModeUsage>,
}

impl UsageSummary {
    pub fn from_counters(counters: &UsageCounters, limits: &LimitsTable) -> Self {
        let modes = TailoringMode::ALL
            .iter()
            .map(|&mode| {
                let used = counters.count(mode);
                let limit = limits.limit(counters.tier, mode);
                ModeUsage {
                    mode,
                    used,
                    limit,
                    remaining: limit.map(|l| l.saturating_sub(used)),
                }
            })
            .collect();
        Self {
            user_id: counters.user_id,
            tier: counters.tier,
            reset_date: counters.reset_date,
            modes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_premium_is_unbounded_by_default() {
        let limits = LimitsTable::default();
        for mode in TailoringMode::ALL {
            assert_eq!(limits.limit(Tier::Premium, mode), None);
            assert!(limits.limit(Tier::Free, mode).is_some());
        }
    }

    #[test]
    fn test_consume_until_limit_then_deny() {
        let limits = LimitsTable::default().with_limit(Tier::Free, TailoringMode::Basic, Some(2));
        let mut counters = UsageCounters::new(Uuid::nil(), Tier::Free, day(1));

        assert_eq!(
            counters.apply_consume(TailoringMode::Basic, &limits, day(1)),
            QuotaDecision::Allow {
                used: 1,
                limit: Some(2)
            }
        );
        assert!(counters
            .apply_consume(TailoringMode::Basic, &limits, day(1))
            .is_allowed());
        assert_eq!(
            counters.apply_consume(TailoringMode::Basic, &limits, day(1)),
            QuotaDecision::Deny { used: 2, limit: 2 }
        );
        // Denial does not increment.
        assert_eq!(counters.count(TailoringMode::Basic), 2);
    }

    #[test]
    fn test_modes_are_counted_independently() {
        let limits = LimitsTable::default().with_limit(Tier::Free, TailoringMode::Basic, Some(1));
        let mut counters = UsageCounters::new(Uuid::nil(), Tier::Free, day(1));
        assert!(counters
            .apply_consume(TailoringMode::Basic, &limits, day(1))
            .is_allowed());
        assert!(counters
            .apply_consume(TailoringMode::Interview, &limits, day(1))
            .is_allowed());
        assert!(!counters
            .apply_consume(TailoringMode::Basic, &limits, day(1))
            .is_allowed());
    }

    #[test]
    fn test_new_day_zeroes_all_counters() {
        let limits = LimitsTable::default();
        let mut counters = UsageCounters::new(Uuid::nil(), Tier::Free, day(1));
        counters.counts = [5, 3, 2, 3, 2, 2];

        assert_eq!(
            counters.apply_consume(TailoringMode::Aggressive, &limits, day(2)),
            QuotaDecision::Allow {
                used: 1,
                limit: Some(2)
            }
        );
        assert_eq!(counters.reset_date, day(2));
        assert_eq!(counters.counts, [0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_summary_reports_remaining() {
        let limits = LimitsTable::default();
        let mut counters = UsageCounters::new(Uuid::nil(), Tier::Free, day(1));
        counters.apply_consume(TailoringMode::Basic, &limits, day(1));

        let summary = UsageSummary::from_counters(&counters, &limits);
        let basic = summary
            .modes
            .iter()
            .find(|m| m.mode == TailoringMode::Basic)
            .unwrap();
        assert_eq!(basic.used, 1);
        assert_eq!(basic.remaining, Some(4));
    }

    #[test]
    fn test_unknown_tier_in_row_is_treated_as_free() {
        let row = UsageCountersRow {
            user_id: Uuid::nil(),
            tier: "platinum".to_string(),
            basic_count: 1,
            personalized_count: 0,
            aggressive_count: 0,
            cover_letter_count: 0,
            linkedin_count: 0,
            interview_count: -4,
            reset_date: day(1),
        };
        let counters = UsageCounters::from(row);
        assert_eq!(counters.tier, Tier::Free);
        assert_eq!(counters.count(TailoringMode::Basic), 1);
        assert_eq!(counters.count(TailoringMode::Interview), 0);
    }
}
