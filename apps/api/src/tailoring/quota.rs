//! Per-user daily quota, keyed by tailoring mode and scaled by tier.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::usage::{LimitsTable, QuotaDecision, Tier, UsageSummary};
use crate::tailoring::mode::TailoringMode;
use crate::tailoring::store::{StoreError, UsageStore};

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn UsageStore>,
    limits: Arc<LimitsTable>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn UsageStore>, limits: LimitsTable) -> Self {
        Self {
            store,
            limits: Arc::new(limits),
        }
    }

    /// Consumes one unit of today's (UTC) allowance for `mode`.
    pub async fn consume(
        &self,
        user_id: Uuid,
        mode: TailoringMode,
    ) -> Result<QuotaDecision, StoreError> {
        self.consume_on(user_id, mode, Utc::now().date_naive()).await
    }

    /// Same as `consume`, against an explicit calendar day.
    pub async fn consume_on(
        &self,
        user_id: Uuid,
        mode: TailoringMode,
        today: NaiveDate,
    ) -> Result<QuotaDecision, StoreError> {
        let decision = self
            .store
            .consume(user_id, mode, &self.limits, today)
            .await?;
        match decision {
            QuotaDecision::Allow { used, limit } => info!(
                "Quota allow: user {user_id} {mode} {used}/{}",
                limit.map_or_else(|| "unbounded".to_string(), |l| l.to_string())
            ),
            QuotaDecision::Deny { used, limit } => {
                warn!("Quota exceeded: user {user_id} {mode} {used}/{limit}")
            }
        }
        Ok(decision)
    }

    pub async fn usage(&self, user_id: Uuid) -> Result<UsageSummary, StoreError> {
        let counters = self
            .store
            .counters(user_id, Utc::now().date_naive())
            .await?;
        Ok(UsageSummary::from_counters(&counters, &self.limits))
    }

    pub async fn set_tier(&self, user_id: Uuid, tier: Tier) -> Result<(), StoreError> {
        self.store
            .set_tier(user_id, tier, Utc::now().date_naive())
            .await?;
        info!("User {user_id} moved to {} tier", tier.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tailoring::store::MemoryUsageStore;

    fn ledger() -> QuotaLedger {
        QuotaLedger::new(Arc::new(MemoryUsageStore::new()), LimitsTable::default())
    }

    #[tokio::test]
    async fn test_limit_boundary_and_day_rollover() {
        let ledger = ledger();
        let user_id = Uuid::new_v4();
        let mode = TailoringMode::Personalized;
        let limit = LimitsTable::default().limit(Tier::Free, mode).unwrap();
        let day1 = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let day2 = day1.succ_opt().unwrap();

        for _ in 0..limit - 1 {
            assert!(ledger.consume_on(user_id, mode, day1).await.unwrap().is_allowed());
        }
        assert_eq!(
            ledger.consume_on(user_id, mode, day1).await.unwrap(),
            QuotaDecision::Allow {
                used: limit,
                limit: Some(limit)
            }
        );
        assert_eq!(
            ledger.consume_on(user_id, mode, day1).await.unwrap(),
            QuotaDecision::Deny { used: limit, limit }
        );
        assert_eq!(
            ledger.consume_on(user_id, mode, day2).await.unwrap(),
            QuotaDecision::Allow {
                used: 1,
                limit: Some(limit)
            }
        );
    }

    #[tokio::test]
    async fn test_users_do_not_share_counters() {
        let ledger = ledger();
        let mode = TailoringMode::Aggressive;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        while ledger.consume(a, mode).await.unwrap().is_allowed() {}
        assert!(ledger.consume(b, mode).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_premium_user_is_never_denied() {
        let ledger = ledger();
        let user_id = Uuid::new_v4();
        ledger.set_tier(user_id, Tier::Premium).await.unwrap();
        for _ in 0..50 {
            assert!(ledger
                .consume(user_id, TailoringMode::Aggressive)
                .await
                .unwrap()
                .is_allowed());
        }
        let usage = ledger.usage(user_id).await.unwrap();
        assert_eq!(usage.tier, Tier::Premium);
        assert!(usage.modes.iter().all(|m| m.limit.is_none()));
    }
}
