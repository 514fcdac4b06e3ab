//! # Membership Status Resolver
//!
//! Derives the lifecycle status and the start/join dates of a migrated
//! membership. The status is computed once, at creation time; the CRM's own
//! status evaluator takes over afterwards.
//!
//! The grace window is exactly one calendar month before `today`:
//!
//! | end date                              | status  |
//! |---------------------------------------|---------|
//! | absent, or `end >= today`             | Current |
//! | `today - 1 month <= end < today`      | Grace   |
//! | `end < today - 1 month`               | Expired |

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipStatus {
    Current,
    Grace,
    Expired,
}

impl MembershipStatus {
    pub const ALL: [MembershipStatus; 3] = [
        MembershipStatus::Current,
        MembershipStatus::Grace,
        MembershipStatus::Expired,
    ];

    /// Name of the status in the CRM's MembershipStatus table
    pub fn name(&self) -> &'static str {
        match self {
            MembershipStatus::Current => "Current",
            MembershipStatus::Grace => "Grace",
            MembershipStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a membership ending on `end_date`, as seen on `today`
pub fn resolve_status(end_date: Option<NaiveDate>, today: NaiveDate) -> MembershipStatus {
    let Some(end_date) = end_date else {
        return MembershipStatus::Current;
    };
    if end_date >= today {
        return MembershipStatus::Current;
    }
    if end_date >= grace_start(today) {
        MembershipStatus::Grace
    } else {
        MembershipStatus::Expired
    }
}

/// First day of the grace window: one calendar month before `today`
pub fn grace_start(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(1))
        .unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipDates {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub join_date: NaiveDate,
    pub status: MembershipStatus,
}

/// Start, join and status for a new membership.
///
/// Without an explicit start the membership starts one year before its end
/// date, or on `default_start` when it never ends. The join date is the start
/// date unless the start lies in the future, in which case it is `today`.
pub fn derive_dates(
    explicit_start: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    default_start: NaiveDate,
    today: NaiveDate,
) -> MembershipDates {
    let start_date = explicit_start.unwrap_or_else(|| match end_date {
        Some(end) => one_year_before(end),
        None => default_start,
    });
    let join_date = if start_date < today { start_date } else { today };

    MembershipDates {
        start_date,
        end_date,
        join_date,
        status: resolve_status(end_date, today),
    }
}

fn one_year_before(date: NaiveDate) -> NaiveDate {
    date.checked_sub_months(Months::new(12))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_absent_end_date_is_current() {
        assert_eq!(resolve_status(None, d(2018, 10, 2)), MembershipStatus::Current);
    }

    #[test]
    fn test_status_boundaries() {
        let today = d(2018, 10, 2);
        assert_eq!(resolve_status(Some(d(2018, 10, 3)), today), MembershipStatus::Current);
        assert_eq!(resolve_status(Some(today), today), MembershipStatus::Current);
        assert_eq!(resolve_status(Some(d(2018, 10, 1)), today), MembershipStatus::Grace);
        assert_eq!(resolve_status(Some(d(2018, 9, 2)), today), MembershipStatus::Grace);
        assert_eq!(resolve_status(Some(d(2018, 9, 1)), today), MembershipStatus::Expired);
    }

    #[test]
    fn test_end_date_of_today_is_current() {
        let today = d(2018, 10, 2);
        assert_eq!(resolve_status(Some(today), today), MembershipStatus::Current);
        let dates = derive_dates(None, Some(today), d(2018, 1, 1), today);
        assert_eq!(dates.status, MembershipStatus::Current);
    }

    #[test]
    fn test_grace_window_starts_one_month_back() {
        let today = d(2018, 10, 2);
        assert_eq!(grace_start(today), d(2018, 9, 2));
        assert_eq!(resolve_status(Some(d(2018, 9, 2)), today), MembershipStatus::Grace);
        assert_eq!(resolve_status(Some(d(2018, 9, 1)), today), MembershipStatus::Expired);
    }

    #[test]
    fn test_grace_uses_calendar_months() {
        // March 31st minus one month clamps to the end of February
        assert_eq!(grace_start(d(2018, 3, 31)), d(2018, 2, 28));
        assert_eq!(
            resolve_status(Some(d(2018, 2, 28)), d(2018, 3, 31)),
            MembershipStatus::Grace
        );
        assert_eq!(
            resolve_status(Some(d(2018, 2, 27)), d(2018, 3, 31)),
            MembershipStatus::Expired
        );
    }

    #[test]
    fn test_start_defaults_to_one_year_before_end() {
        let dates = derive_dates(None, Some(d(2019, 6, 30)), d(2018, 1, 1), d(2018, 10, 2));
        assert_eq!(dates.start_date, d(2018, 6, 30));
        assert_eq!(dates.join_date, d(2018, 6, 30));
        assert_eq!(dates.status, MembershipStatus::Current);
    }

    #[test]
    fn test_start_defaults_to_constant_without_end() {
        let dates = derive_dates(None, None, d(2018, 1, 1), d(2018, 10, 2));
        assert_eq!(dates.start_date, d(2018, 1, 1));
        assert_eq!(dates.end_date, None);
    }

    #[test]
    fn test_future_start_joins_today() {
        let today = d(2018, 10, 2);
        let dates = derive_dates(None, Some(d(2020, 1, 1)), d(2018, 1, 1), today);
        assert_eq!(dates.start_date, d(2019, 1, 1));
        assert_eq!(dates.join_date, today);
    }

    #[test]
    fn test_explicit_start_wins() {
        let dates = derive_dates(
            Some(d(1999, 5, 1)),
            Some(d(2019, 6, 30)),
            d(2018, 1, 1),
            d(2018, 10, 2),
        );
        assert_eq!(dates.start_date, d(1999, 5, 1));
        assert_eq!(dates.join_date, d(1999, 5, 1));
    }
}
