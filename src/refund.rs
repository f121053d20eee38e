// Cancellation refund tiers

use crate::model::RefundStatus;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

// Applies when days-until-start is at least `min_days`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundTier {
    pub min_days: i64,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundPolicy {
    // Ordered by `min_days`, longest notice first
    pub tiers: Vec<RefundTier>,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                RefundTier { min_days: 31, percentage: 100 },
                RefundTier { min_days: 15, percentage: 75 },
                RefundTier { min_days: 8, percentage: 50 },
                RefundTier { min_days: 4, percentage: 25 },
            ],
        }
    }
}

impl RefundPolicy {
    pub fn percentage(&self, days_until_start: i64) -> u32 {
        self.tiers
            .iter()
            .find(|tier| days_until_start >= tier.min_days)
            .map_or(0, |tier| tier.percentage)
    }

    // Tiers must shrink in both notice and percentage
    pub fn validate(&self) -> Result<(), String> {
        for tier in &self.tiers {
            if tier.percentage > 100 {
                return Err(format!("tier at {} days refunds {}%", tier.min_days, tier.percentage));
            }
        }
        for pair in self.tiers.windows(2) {
            if pair[0].min_days <= pair[1].min_days || pair[0].percentage < pair[1].percentage {
                return Err(format!(
                    "tiers out of order: {} days/{}% before {} days/{}%",
                    pair[0].min_days, pair[0].percentage, pair[1].min_days, pair[1].percentage
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefundQuote {
    pub days_until_start: i64,
    pub percentage: u32,
    pub amount: Money,
    pub status: RefundStatus,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationRefundCalculator {
    policy: RefundPolicy,
}

impl CancellationRefundCalculator {
    pub fn new(policy: RefundPolicy) -> Self {
        Self { policy }
    }

    // ceil((start - now) / 1 day)
    pub fn days_until_start(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let seconds = (start - now).num_seconds();
        let days = seconds / SECONDS_PER_DAY;
        if seconds % SECONDS_PER_DAY > 0 {
            days + 1
        } else {
            days
        }
    }

    pub fn compute(&self, start: DateTime<Utc>, now: DateTime<Utc>, paid: Money) -> RefundQuote {
        let days_until_start = Self::days_until_start(start, now);
        let percentage = self.policy.percentage(days_until_start);
        let amount = paid.percent(percentage);
        let status = if amount.is_zero() {
            RefundStatus::NotApplicable
        } else {
            RefundStatus::Pending
        };

        RefundQuote {
            days_until_start,
            percentage,
            amount,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use test_case::test_case;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap()
    }

    #[test_case(45, 100; "#1 well ahead")]
    #[test_case(31, 100; "#2 just above thirty")]
    #[test_case(30, 75; "#3 exactly thirty")]
    #[test_case(15, 75; "#4 exactly fifteen")]
    #[test_case(14, 50; "#5 exactly fourteen")]
    #[test_case(8, 50; "#6 exactly eight")]
    #[test_case(7, 25; "#7 exactly seven")]
    #[test_case(4, 25; "#8 exactly four")]
    #[test_case(3, 0; "#9 exactly three")]
    #[test_case(0, 0; "#10 day of start")]
    #[test_case(-2, 0; "#11 already started")]
    fn test_refund_tiers(days: i64, expected_pct: u32) {
        let calculator = CancellationRefundCalculator::default();
        let now = start() - Duration::days(days);

        let quote = calculator.compute(start(), now, Money::from_major(1_000));
        assert_eq!(quote.days_until_start, days);
        assert_eq!(quote.percentage, expected_pct);
        assert_eq!(quote.amount, Money::from_major(10 * expected_pct as i64));
    }

    #[test]
    fn test_partial_days_round_up() {
        let now = start() - Duration::days(30) + Duration::hours(1);
        assert_eq!(CancellationRefundCalculator::days_until_start(start(), now), 30);

        let now = start() - Duration::days(30) - Duration::hours(1);
        assert_eq!(CancellationRefundCalculator::days_until_start(start(), now), 31);
        let quote = CancellationRefundCalculator::default().compute(start(), now, Money::from_major(200));
        assert_eq!(quote.percentage, 100);
    }

    #[test]
    fn test_ten_days_before_thousand_dollar_booking() {
        let now = start() - Duration::days(10);
        let quote = CancellationRefundCalculator::default().compute(start(), now, Money::from_major(1_000));
        assert_eq!(quote.amount, Money::from_major(500));
        assert_eq!(quote.status, RefundStatus::Pending);
    }

    #[test]
    fn test_zero_refund_is_not_applicable() {
        let now = start() - Duration::days(2);
        let quote = CancellationRefundCalculator::default().compute(start(), now, Money::from_major(1_000));
        assert_eq!(quote.amount, Money::ZERO);
        assert_eq!(quote.status, RefundStatus::NotApplicable);
    }

    #[test]
    fn test_refund_rounds_to_minor_unit() {
        let now = start() - Duration::days(5);
        let quote = CancellationRefundCalculator::default().compute(start(), now, Money::from_minor(9_999));
        // 25% of 99.99
        assert_eq!(quote.amount, Money::from_minor(2_500));
    }

    #[test]
    fn test_policy_validation() {
        assert!(RefundPolicy::default().validate().is_ok());

        let unordered = RefundPolicy {
            tiers: vec![
                RefundTier { min_days: 8, percentage: 50 },
                RefundTier { min_days: 15, percentage: 75 },
            ],
        };
        assert!(unordered.validate().is_err());

        let generous = RefundPolicy {
            tiers: vec![RefundTier { min_days: 1, percentage: 120 }],
        };
        assert!(generous.validate().is_err());
    }
}
