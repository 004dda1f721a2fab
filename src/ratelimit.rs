//! Sliding one-hour-window rate limiting over the operation log.
//!
//! The window is derived, not stored: every check recomputes the count of
//! still-charged operations in the trailing 60 minutes. Denial happens before
//! outcomes are known — the ceiling throttles *attempted* mutating
//! throughput, not successes.

use chrono::{DateTime, Utc};

use crate::oplog::OperationLog;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateCheck {
    /// Whether the operation may be admitted.
    pub allowed: bool,
    /// Denial reason, present iff `allowed` is false. Includes the current
    /// window count and the ceiling.
    pub reason: Option<String>,
}

impl RateCheck {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }
}

/// Check whether one more mutating operation fits in the sliding window.
///
/// Pure function of the log and the given clock reading; no mutation.
pub fn check_rate_limit(log: &OperationLog, max_per_hour: usize, now: DateTime<Utc>) -> RateCheck {
    let count = log.window_count(now);
    if count >= max_per_hour {
        return RateCheck {
            allowed: false,
            reason: Some(format!(
                "Rate limit exceeded: {count}/{max_per_hour} operations in the last hour"
            )),
        };
    }
    RateCheck::allow()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-08-29T12:00:00Z".parse().unwrap()
    }

    fn fill(log: &mut OperationLog, n: usize, at: DateTime<Utc>) {
        for i in 0..n {
            log.append_pending(format!("req-{i}"), Some("tools/call".to_string()), None, at);
        }
    }

    #[test]
    fn test_allows_under_ceiling() {
        let mut log = OperationLog::new();
        fill(&mut log, 99, t0());
        let check = check_rate_limit(&log, 100, t0());
        assert!(check.allowed);
        assert!(check.reason.is_none());
    }

    #[test]
    fn test_denies_at_ceiling_with_reason() {
        let mut log = OperationLog::new();
        fill(&mut log, 100, t0());
        let check = check_rate_limit(&log, 100, t0());
        assert!(!check.allowed);
        assert_eq!(
            check.reason.unwrap(),
            "Rate limit exceeded: 100/100 operations in the last hour"
        );
    }

    #[test]
    fn test_window_slides() {
        let mut log = OperationLog::new();
        fill(&mut log, 100, t0());
        // 61 minutes later the window is empty again.
        let later = t0() + chrono::Duration::minutes(61);
        assert!(check_rate_limit(&log, 100, later).allowed);
    }

    #[test]
    fn test_failed_operations_refund_capacity() {
        let mut log = OperationLog::new();
        fill(&mut log, 3, t0());
        assert!(!check_rate_limit(&log, 3, t0()).allowed);

        // One failure frees one slot immediately.
        log.correlate("req-0", true, t0());
        assert!(check_rate_limit(&log, 3, t0()).allowed);
    }

    #[test]
    fn test_id_reuse_after_failure_cannot_bypass_ceiling() {
        let mut log = OperationLog::new();
        log.append_pending("x".to_string(), Some("tools/call".to_string()), None, t0());
        log.correlate("x", true, t0());
        assert!(check_rate_limit(&log, 2, t0()).allowed);

        // Retries under the failed id are fresh attempts and fill the window
        // like any others, even when they succeed.
        log.append_pending("x".to_string(), Some("tools/call".to_string()), None, t0());
        log.correlate("x", false, t0());
        log.append_pending("x".to_string(), Some("tools/call".to_string()), None, t0());
        log.correlate("x", false, t0());
        assert!(!check_rate_limit(&log, 2, t0()).allowed);
    }

    #[test]
    fn test_successes_keep_consuming() {
        let mut log = OperationLog::new();
        fill(&mut log, 3, t0());
        log.correlate("req-0", false, t0());
        log.correlate("req-1", false, t0());
        // Completed successes still count (once each); window stays full.
        assert!(!check_rate_limit(&log, 3, t0()).allowed);
    }

    #[test]
    fn test_denial_before_outcomes_known() {
        let mut log = OperationLog::new();
        // All pending, nothing correlated — still denied at the ceiling.
        fill(&mut log, 5, t0());
        let check = check_rate_limit(&log, 5, t0());
        assert!(!check.allowed);
        assert_eq!(
            check.reason.unwrap(),
            "Rate limit exceeded: 5/5 operations in the last hour"
        );
    }
}
