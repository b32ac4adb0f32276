//! Donor eligibility (cooldown since last donation).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum number of calendar days between two donations.
pub const DONATION_COOLDOWN_DAYS: i64 = 90;

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Eligibility {
    /// Whether the donor may donate today
    pub eligible: bool,
    /// Days until the cooldown ends (0 when eligible)
    pub days_remaining: u32,
}

impl Eligibility {
    /// Not eligible yet, but will be within `window_days`.
    pub fn eligible_within(&self, window_days: u32) -> bool {
        !self.eligible && self.days_remaining > 0 && self.days_remaining <= window_days
    }
}

/// Compute eligibility from the last donation date.
///
/// Donors who never donated are eligible. A donation dated after `today`
/// counts as a negative gap and keeps the donor in cooldown.
pub fn check_eligibility(last_donation_date: Option<NaiveDate>, today: NaiveDate) -> Eligibility {
    let Some(last) = last_donation_date else {
        return Eligibility {
            eligible: true,
            days_remaining: 0,
        };
    };

    let days_since = (today - last).num_days();
    let remaining = (DONATION_COOLDOWN_DAYS - days_since).max(0);

    Eligibility {
        eligible: days_since >= DONATION_COOLDOWN_DAYS,
        days_remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_never_donated_is_eligible() {
        let result = check_eligibility(None, today());
        assert!(result.eligible);
        assert_eq!(result.days_remaining, 0);
    }

    #[test]
    fn test_95_days_ago_is_eligible() {
        let result = check_eligibility(Some(today() - Duration::days(95)), today());
        assert!(result.eligible);
        assert_eq!(result.days_remaining, 0);
    }

    #[test]
    fn test_40_days_ago_waits_50_more() {
        let result = check_eligibility(Some(today() - Duration::days(40)), today());
        assert!(!result.eligible);
        assert_eq!(result.days_remaining, 50);
    }

    #[test]
    fn test_boundary_at_exactly_90_days() {
        let result = check_eligibility(Some(today() - Duration::days(90)), today());
        assert!(result.eligible);
        assert_eq!(result.days_remaining, 0);

        let result = check_eligibility(Some(today() - Duration::days(89)), today());
        assert!(!result.eligible);
        assert_eq!(result.days_remaining, 1);
    }

    #[test]
    fn test_donation_today() {
        let result = check_eligibility(Some(today()), today());
        assert!(!result.eligible);
        assert_eq!(result.days_remaining, 90);
    }

    #[test]
    fn test_eligible_within_window() {
        let soon = check_eligibility(Some(today() - Duration::days(85)), today());
        assert!(soon.eligible_within(7));

        let later = check_eligibility(Some(today() - Duration::days(40)), today());
        assert!(!later.eligible_within(7));

        let already = check_eligibility(None, today());
        assert!(!already.eligible_within(7));
    }
}
