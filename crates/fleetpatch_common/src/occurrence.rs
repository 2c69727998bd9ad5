//! Patch-window occurrence arithmetic.
//!
//! All computation is naive wall-clock math in the target timezone; the
//! timezone name itself travels as an opaque label on the emitted
//! schedule. "Now" is derived from a configured fixed UTC offset.

use crate::policy::PatchPolicy;
use chrono::{
    Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc,
};

/// Compute the next occurrence of a policy's (weekday, hour) window at or
/// after `now`.
///
/// `delta_days = (target_weekday - now.weekday()) mod 7` lands on the next
/// matching weekday; when that is today and the hour has already passed,
/// the occurrence slips a full week. Same-day scheduling is valid when the
/// hour is still ahead.
pub fn next_occurrence(policy: &PatchPolicy, now: NaiveDateTime) -> NaiveDateTime {
    let delta_days = (policy.weekday.num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);

    // Hour is range-checked at parse time.
    let window_time = NaiveTime::from_hms_opt(policy.hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut candidate = (now.date() + Duration::days(delta_days)).and_time(window_time);

    if candidate < now {
        candidate += Duration::days(7);
    }

    candidate
}

/// Roll an existing schedule's start forward for a reconciliation run:
/// tomorrow relative to `run_date`, at the stored hour and minute, seconds
/// zeroed.
///
/// The configuration being reconciled was already created on the correct
/// weekday, so a one-day nudge per run keeps it pending until it fires.
pub fn roll_forward(stored_start: NaiveDateTime, run_date: NaiveDate) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(stored_start.hour(), stored_start.minute(), 0)
        .unwrap_or(NaiveTime::MIN);
    (run_date + Duration::days(1)).and_time(time)
}

/// Current wall-clock time at a fixed UTC offset, in minutes east.
pub fn wall_clock_now(utc_offset_minutes: i32) -> NaiveDateTime {
    match FixedOffset::east_opt(utc_offset_minutes * 60) {
        Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
        None => Utc::now().naive_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PatchPolicy;
    use chrono::Weekday;

    fn policy(weekday: Weekday, hour: u32) -> PatchPolicy {
        PatchPolicy {
            variant: crate::policy::PolicyVariant::Routine,
            weekday,
            hour,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_sunday_to_wednesday_is_three_days() {
        // 2021-06-06 was a Sunday.
        let now = at(2021, 6, 6, 10, 0);
        let next = next_occurrence(&policy(Weekday::Wed, 3), now);
        assert_eq!(next, at(2021, 6, 9, 3, 0));
    }

    #[test]
    fn test_same_day_window_already_passed_slips_a_week() {
        // 2021-06-09 was a Wednesday; 03:00 already behind us at 04:00.
        let now = at(2021, 6, 9, 4, 0);
        let next = next_occurrence(&policy(Weekday::Wed, 3), now);
        assert_eq!(next, at(2021, 6, 16, 3, 0));
    }

    #[test]
    fn test_same_day_window_still_ahead_is_today() {
        let now = at(2021, 6, 9, 2, 59);
        let next = next_occurrence(&policy(Weekday::Wed, 3), now);
        assert_eq!(next, at(2021, 6, 9, 3, 0));
    }

    #[test]
    fn test_exact_window_instant_counts_as_today() {
        let now = at(2021, 6, 9, 3, 0);
        let next = next_occurrence(&policy(Weekday::Wed, 3), now);
        assert_eq!(next, now);
    }

    #[test]
    fn test_monotonicity_and_weekday_hour_match() {
        let days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        for day in days {
            for hour in [0, 3, 12, 22, 23] {
                for now_hour in [0, 5, 11, 23] {
                    let now = at(2024, 2, 29, now_hour, 17);
                    let next = next_occurrence(&policy(day, hour), now);
                    assert!(next >= now);
                    assert_eq!(next.weekday(), day);
                    assert_eq!(next.hour(), hour);
                    assert_eq!(next.minute(), 0);
                }
            }
        }
    }

    #[test]
    fn test_periodicity_is_exactly_seven_days() {
        let p = policy(Weekday::Fri, 22);
        let now = at(2023, 11, 14, 9, 30);
        let first = next_occurrence(&p, now);
        let second = next_occurrence(&p, first + Duration::seconds(1));
        assert_eq!(second, first + Duration::days(7));
    }

    #[test]
    fn test_roll_forward_is_tomorrow_at_stored_time() {
        let stored = at(2021, 6, 9, 3, 15);
        let run_date = NaiveDate::from_ymd_opt(2021, 6, 20).unwrap();
        let rolled = roll_forward(stored, run_date);
        assert_eq!(rolled, at(2021, 6, 21, 3, 15));
    }

    #[test]
    fn test_roll_forward_zeroes_seconds() {
        let stored = NaiveDate::from_ymd_opt(2021, 6, 9)
            .unwrap()
            .and_hms_opt(3, 15, 42)
            .unwrap();
        let run_date = NaiveDate::from_ymd_opt(2021, 6, 20).unwrap();
        let rolled = roll_forward(stored, run_date);
        assert_eq!(rolled.second(), 0);
        assert_eq!(rolled.minute(), 15);
    }

    #[test]
    fn test_roll_forward_crosses_month_boundary() {
        let stored = at(2021, 1, 4, 22, 0);
        let run_date = NaiveDate::from_ymd_opt(2021, 6, 30).unwrap();
        let rolled = roll_forward(stored, run_date);
        assert_eq!(rolled, at(2021, 7, 1, 22, 0));
    }
}
