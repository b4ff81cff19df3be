//! Staleness-gated detail refresh
//!
//! A detail record younger than the TTL is fresh and skipped; one aged
//! exactly the TTL or more is stale and re-scraped. URLs that keep failing
//! back off exponentially (capped) instead of being retried on every run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive failure bookkeeping for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub last_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Missing or stale record: enqueue for scraping.
    Scrape,
    /// Record updated within the TTL.
    Fresh,
    /// Recent failures; try again after `until`.
    BackingOff { until: DateTime<Utc> },
}

impl RefreshDecision {
    pub fn should_scrape(self) -> bool {
        matches!(self, Self::Scrape)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub ttl: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::days(7),
            backoff_base: Duration::hours(6),
            backoff_max: Duration::days(7),
        }
    }
}

impl RefreshPolicy {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// `true` while `now - last_updated_at < ttl`.
    pub fn is_fresh(&self, last_updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_updated_at) < self.ttl
    }

    /// Backoff window after `consecutive_failures` failures in a row.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::zero();
        }
        let exponent = (consecutive_failures - 1).min(20);
        let factor = 1_i32 << exponent;
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }

    pub fn decide(
        &self,
        last_updated_at: Option<DateTime<Utc>>,
        failures: Option<FailureState>,
        now: DateTime<Utc>,
    ) -> RefreshDecision {
        if let Some(updated) = last_updated_at {
            if self.is_fresh(updated, now) {
                return RefreshDecision::Fresh;
            }
        }

        if let Some(state) = failures.filter(|s| s.consecutive_failures > 0) {
            let until = state.last_failed_at + self.backoff_for(state.consecutive_failures);
            if now < until {
                return RefreshDecision::BackingOff { until };
            }
        }

        RefreshDecision::Scrape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn missing_record_is_always_scraped() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.decide(None, None, now()), RefreshDecision::Scrape);
    }

    #[rstest]
    #[case(Duration::zero(), RefreshDecision::Fresh)]
    #[case(Duration::days(6), RefreshDecision::Fresh)]
    #[case(Duration::days(7) - Duration::seconds(1), RefreshDecision::Fresh)]
    #[case(Duration::days(7), RefreshDecision::Scrape)]
    #[case(Duration::days(7) + Duration::seconds(1), RefreshDecision::Scrape)]
    #[case(Duration::days(30), RefreshDecision::Scrape)]
    fn ttl_boundary_is_inclusive(#[case] age: Duration, #[case] expected: RefreshDecision) {
        let policy = RefreshPolicy::with_ttl(Duration::days(7));
        assert_eq!(policy.decide(Some(now() - age), None, now()), expected);
    }

    #[rstest]
    #[case(1, Duration::hours(6))]
    #[case(2, Duration::hours(12))]
    #[case(3, Duration::hours(24))]
    #[case(6, Duration::days(7))]
    #[case(40, Duration::days(7))]
    fn backoff_doubles_and_caps(#[case] failures: u32, #[case] expected: Duration) {
        assert_eq!(RefreshPolicy::default().backoff_for(failures), expected);
    }

    #[test]
    fn failing_url_backs_off_then_retries() {
        let policy = RefreshPolicy::default();
        let state = FailureState {
            consecutive_failures: 2,
            last_failed_at: now() - Duration::hours(3),
        };
        assert_eq!(
            policy.decide(None, Some(state), now()),
            RefreshDecision::BackingOff {
                until: now() + Duration::hours(9)
            }
        );
        assert_eq!(
            policy.decide(None, Some(state), now() + Duration::hours(9)),
            RefreshDecision::Scrape
        );
    }

    #[test]
    fn fresh_record_wins_over_failure_state() {
        let policy = RefreshPolicy::default();
        let state = FailureState {
            consecutive_failures: 1,
            last_failed_at: now() - Duration::days(30),
        };
        assert_eq!(
            policy.decide(Some(now() - Duration::days(1)), Some(state), now()),
            RefreshDecision::Fresh
        );
    }

    #[test]
    fn zero_failures_never_back_off() {
        let policy = RefreshPolicy::default();
        let state = FailureState {
            consecutive_failures: 0,
            last_failed_at: now(),
        };
        assert!(policy.decide(None, Some(state), now()).should_scrape());
    }
}
