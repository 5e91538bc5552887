use crate::domain::RateLimitKind;
use crate::port::ThrottleSignal;

const MILLIS_PER_MINUTE: i64 = 60 * 1_000;
const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1_000;

/// Turns a throttle signal into a concrete resume time.
///
/// Minute-scoped limits clear at the next minute boundary, daily limits at
/// the next UTC midnight. When the ESP names a wait the policy honors it
/// instead of computing a boundary. A small margin is always added so the
/// resumed pass lands inside the fresh window instead of on its edge.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    minute_margin_millis: i64,
    daily_margin_millis: i64,
    /// Waits longer than this are treated as daily limits even when the
    /// response body does not say so.
    daily_threshold_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            minute_margin_millis: 500,
            daily_margin_millis: 60_000,
            daily_threshold_secs: 3_600,
        }
    }
}

impl BackoffPolicy {
    /// Decide which limit window the ESP closed on us.
    pub fn classify(&self, signal: &ThrottleSignal) -> RateLimitKind {
        if let Some(detail) = &signal.detail {
            let lowered = detail.to_lowercase();
            if lowered.contains("daily")
                || lowered.contains("per day")
                || lowered.contains("quota")
            {
                return RateLimitKind::Daily;
            }
        }
        match signal.retry_after_secs {
            Some(secs) if secs > self.daily_threshold_secs => RateLimitKind::Daily,
            _ => RateLimitKind::Minute,
        }
    }

    /// Epoch millis at which a parked job becomes claimable again.
    pub fn retry_at_millis(
        &self,
        kind: RateLimitKind,
        signal: &ThrottleSignal,
        now_millis: i64,
    ) -> i64 {
        match kind {
            RateLimitKind::Minute => match signal.retry_after_secs {
                Some(secs) => now_millis + (secs as i64) * 1_000 + self.minute_margin_millis,
                None => next_boundary(now_millis, MILLIS_PER_MINUTE) + self.minute_margin_millis,
            },
            RateLimitKind::Daily => match signal.retry_after_secs {
                Some(secs) => now_millis + (secs as i64) * 1_000 + self.daily_margin_millis,
                None => next_boundary(now_millis, MILLIS_PER_DAY) + self.daily_margin_millis,
            },
        }
    }
}

fn next_boundary(now_millis: i64, period_millis: i64) -> i64 {
    now_millis - now_millis.rem_euclid(period_millis) + period_millis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(retry_after_secs: Option<u64>, detail: Option<&str>) -> ThrottleSignal {
        ThrottleSignal {
            retry_after_secs,
            detail: detail.map(str::to_string),
        }
    }

    #[test]
    fn test_classify_defaults_to_minute() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.classify(&signal(None, None)),
            RateLimitKind::Minute
        );
        assert_eq!(
            policy.classify(&signal(Some(30), Some("burst exceeded"))),
            RateLimitKind::Minute
        );
    }

    #[test]
    fn test_classify_daily_from_detail_text() {
        let policy = BackoffPolicy::default();
        for detail in [
            "Daily limit reached",
            "throttled: segment creations per day",
            "Quota exceeded for today",
        ] {
            assert_eq!(
                policy.classify(&signal(Some(10), Some(detail))),
                RateLimitKind::Daily,
                "detail: {detail}"
            );
        }
    }

    #[test]
    fn test_classify_daily_from_long_retry_after() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.classify(&signal(Some(7_200), None)),
            RateLimitKind::Daily
        );
        assert_eq!(
            policy.classify(&signal(Some(3_600), None)),
            RateLimitKind::Minute
        );
    }

    #[test]
    fn test_minute_retry_honors_header() {
        let policy = BackoffPolicy::default();
        let now = 1_700_000_000_000;
        let at = policy.retry_at_millis(RateLimitKind::Minute, &signal(Some(60), None), now);
        assert_eq!(at, now + 60_000 + 500);
    }

    #[test]
    fn test_minute_retry_without_header_uses_next_boundary() {
        let policy = BackoffPolicy::default();
        // 1_700_000_100_000 is a minute boundary; the clock sits 20s past it.
        let now = 1_700_000_100_000 + 20_000;
        let at = policy.retry_at_millis(RateLimitKind::Minute, &signal(None, None), now);
        assert_eq!(at, 1_700_000_100_000 + 60_000 + 500);
        assert!(at > now);
    }

    #[test]
    fn test_daily_retry_without_header_uses_next_utc_day() {
        let policy = BackoffPolicy::default();
        // 2023-11-14T22:13:20Z.
        let now = 1_700_000_000_000;
        let at = policy.retry_at_millis(RateLimitKind::Daily, &signal(None, None), now);
        let next_midnight = 1_700_006_400_000;
        assert_eq!(at, next_midnight + 60_000);
    }

    #[test]
    fn test_daily_retry_honors_header_with_daily_margin() {
        let policy = BackoffPolicy::default();
        let now = 1_700_000_000_000;
        let at = policy.retry_at_millis(RateLimitKind::Daily, &signal(Some(7_200), None), now);
        assert_eq!(at, now + 7_200_000 + 60_000);
    }

    #[test]
    fn test_boundary_exactly_on_edge_moves_a_full_period() {
        assert_eq!(next_boundary(120_000, 60_000), 180_000);
        assert_eq!(next_boundary(120_001, 60_000), 180_000);
        assert_eq!(next_boundary(179_999, 60_000), 180_000);
    }
}
