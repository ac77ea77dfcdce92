use crate::domain::models::{parse_weekday, RecurrenceRule, RuleKind, WeekOrdinal};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

/// Computes the next calendar date matching `rule`, strictly after the
/// reference point.
///
/// When prior occurrence deadlines exist, the latest of them replaces the
/// reference so chained generation advances monotonically instead of
/// re-deriving the same date from the template. The reference's time-of-day
/// is preserved onto the result. Invalid or incomplete rule parameters yield
/// `None`; callers treat that as "no recurrence possible".
pub fn next_occurrence_date(
    rule: &RecurrenceRule,
    reference: DateTime<Utc>,
    prior_occurrence_deadlines: &[DateTime<Utc>],
) -> Option<DateTime<Utc>> {
    let base = prior_occurrence_deadlines
        .iter()
        .copied()
        .max()
        .unwrap_or(reference);
    let base_date = base.date_naive();

    let next_date = match rule.kind {
        RuleKind::None => return None,
        RuleKind::Daily => base_date + Duration::days(1),
        RuleKind::Interval => {
            let interval = rule.interval_days.filter(|days| *days >= 1).unwrap_or(1);
            base_date + Duration::days(interval)
        }
        RuleKind::Weekly => next_weekly(base_date, &rule.weekdays)?,
        RuleKind::MonthlyByDate => {
            let day_of_month = rule.day_of_month.filter(|day| (1..=31).contains(day))?;
            let (year, month) = month_after(base_date.year(), base_date.month());
            NaiveDate::from_ymd_opt(year, month, day_of_month.min(days_in_month(year, month)))?
        }
        RuleKind::MonthlyByWeekday => next_monthly_weekday(base_date, rule)?,
    };

    Some(Utc.from_utc_datetime(&next_date.and_time(base.time())))
}

fn next_weekly(base_date: NaiveDate, weekdays: &[String]) -> Option<NaiveDate> {
    let allowed: Vec<Weekday> = weekdays
        .iter()
        .filter_map(|day| parse_weekday(day))
        .collect();
    if allowed.is_empty() {
        return None;
    }

    (1..=7)
        .map(|offset| base_date + Duration::days(offset))
        .find(|candidate| allowed.contains(&candidate.weekday()))
}

fn next_monthly_weekday(base_date: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    let weekday = rule.weekday.as_deref().and_then(parse_weekday)?;
    let ordinal = rule.week_ordinal?;

    let (year, month) = month_after(base_date.year(), base_date.month());
    let candidate = weekday_of_month(year, month, weekday, ordinal)?;
    if candidate > base_date {
        return Some(candidate);
    }

    // Guard against same-day recomputation.
    let (year, month) = month_after(year, month);
    weekday_of_month(year, month, weekday, ordinal)
}

/// The nth (or last) `weekday` of the given month. An nth that would run past
/// the end of the month falls back to that month's last such weekday; `last`
/// never spills into the following month.
fn weekday_of_month(
    year: i32,
    month: u32,
    weekday: Weekday,
    ordinal: WeekOrdinal,
) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset =
        (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    let first_day = 1 + offset;
    let last_day = days_in_month(year, month);

    let day = match ordinal.nth() {
        Some(n) => {
            let nth_day = first_day + 7 * (n - 1);
            if nth_day <= last_day {
                nth_day
            } else {
                last_weekday_occurrence(first_day, last_day)
            }
        }
        None => last_weekday_occurrence(first_day, last_day),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn last_weekday_occurrence(first_day: u32, last_day: u32) -> u32 {
    first_day + 7 * ((last_day - first_day) / 7)
}

fn month_after(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = month_after(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn rule(kind: RuleKind) -> RecurrenceRule {
        RecurrenceRule {
            kind,
            ..RecurrenceRule::none()
        }
    }

    #[test]
    fn none_rule_never_recurs() {
        assert_eq!(
            next_occurrence_date(&rule(RuleKind::None), fixed_time("2025-01-15T09:00:00Z"), &[]),
            None
        );
    }

    #[test]
    fn daily_advances_one_day_preserving_time() {
        let next = next_occurrence_date(
            &rule(RuleKind::Daily),
            fixed_time("2025-01-15T09:30:00Z"),
            &[],
        )
        .expect("next date");
        assert_eq!(next, fixed_time("2025-01-16T09:30:00Z"));
    }

    #[test]
    fn interval_defaults_to_one_day_when_invalid() {
        let mut interval_rule = rule(RuleKind::Interval);
        interval_rule.interval_days = Some(0);
        let next = next_occurrence_date(
            &interval_rule,
            fixed_time("2025-01-15T09:00:00Z"),
            &[],
        )
        .expect("next date");
        assert_eq!(next.date_naive(), date("2025-01-16"));

        interval_rule.interval_days = Some(10);
        let next = next_occurrence_date(
            &interval_rule,
            fixed_time("2025-01-15T09:00:00Z"),
            &[],
        )
        .expect("next date");
        assert_eq!(next.date_naive(), date("2025-01-25"));
    }

    #[test]
    fn weekly_finds_the_next_listed_weekday() {
        let mut weekly = rule(RuleKind::Weekly);
        weekly.weekdays = vec!["mon".to_string(), "wed".to_string(), "fri".to_string()];

        // 2025-01-15 is a Wednesday; the next listed day is Friday the 17th.
        let next = next_occurrence_date(&weekly, fixed_time("2025-01-15T08:00:00Z"), &[])
            .expect("next date");
        assert_eq!(next.date_naive(), date("2025-01-17"));
    }

    #[test]
    fn weekly_iteration_only_lands_on_listed_weekdays() {
        let mut weekly = rule(RuleKind::Weekly);
        weekly.weekdays = vec!["mon".to_string(), "wed".to_string(), "fri".to_string()];

        let mut current = fixed_time("2025-01-15T08:00:00Z");
        for _ in 0..12 {
            current = next_occurrence_date(&weekly, current, &[]).expect("next date");
            let weekday = current.date_naive().weekday();
            assert!(matches!(
                weekday,
                Weekday::Mon | Weekday::Wed | Weekday::Fri
            ));
        }
    }

    #[test]
    fn weekly_with_no_valid_weekdays_returns_none() {
        let mut weekly = rule(RuleKind::Weekly);
        assert_eq!(
            next_occurrence_date(&weekly, fixed_time("2025-01-15T08:00:00Z"), &[]),
            None
        );
        weekly.weekdays = vec!["someday".to_string()];
        assert_eq!(
            next_occurrence_date(&weekly, fixed_time("2025-01-15T08:00:00Z"), &[]),
            None
        );
    }

    #[test]
    fn monthly_by_date_clamps_to_month_length() {
        let mut monthly = rule(RuleKind::MonthlyByDate);
        monthly.day_of_month = Some(31);

        // January reference in a leap year: February caps at the 29th.
        let next = next_occurrence_date(&monthly, fixed_time("2024-01-31T10:00:00Z"), &[])
            .expect("next date");
        assert_eq!(next.date_naive(), date("2024-02-29"));

        // Non-leap year caps at the 28th.
        let next = next_occurrence_date(&monthly, fixed_time("2025-01-31T10:00:00Z"), &[])
            .expect("next date");
        assert_eq!(next.date_naive(), date("2025-02-28"));
    }

    #[test]
    fn monthly_by_date_rejects_out_of_range_days() {
        let mut monthly = rule(RuleKind::MonthlyByDate);
        monthly.day_of_month = Some(0);
        assert_eq!(
            next_occurrence_date(&monthly, fixed_time("2025-01-15T10:00:00Z"), &[]),
            None
        );
        monthly.day_of_month = None;
        assert_eq!(
            next_occurrence_date(&monthly, fixed_time("2025-01-15T10:00:00Z"), &[]),
            None
        );
    }

    #[test]
    fn monthly_by_weekday_last_monday_stays_in_february() {
        let mut monthly = rule(RuleKind::MonthlyByWeekday);
        monthly.weekday = Some("mon".to_string());
        monthly.week_ordinal = Some(WeekOrdinal::Last);

        let next = next_occurrence_date(&monthly, fixed_time("2025-01-20T10:00:00Z"), &[])
            .expect("next date");
        // Last Monday of February 2025.
        assert_eq!(next.date_naive(), date("2025-02-24"));
    }

    #[test]
    fn monthly_by_weekday_first_of_month() {
        let mut monthly = rule(RuleKind::MonthlyByWeekday);
        monthly.weekday = Some("fri".to_string());
        monthly.week_ordinal = Some(WeekOrdinal::First);

        let next = next_occurrence_date(&monthly, fixed_time("2025-01-15T10:00:00Z"), &[])
            .expect("next date");
        assert_eq!(next.date_naive(), date("2025-02-07"));
    }

    #[test]
    fn monthly_by_weekday_requires_weekday_and_ordinal() {
        let mut monthly = rule(RuleKind::MonthlyByWeekday);
        assert_eq!(
            next_occurrence_date(&monthly, fixed_time("2025-01-15T10:00:00Z"), &[]),
            None
        );
        monthly.weekday = Some("mon".to_string());
        assert_eq!(
            next_occurrence_date(&monthly, fixed_time("2025-01-15T10:00:00Z"), &[]),
            None
        );
    }

    #[test]
    fn latest_prior_deadline_replaces_the_reference() {
        let daily = rule(RuleKind::Daily);
        let prior = vec![
            fixed_time("2025-02-01T07:00:00Z"),
            fixed_time("2025-02-10T07:00:00Z"),
            fixed_time("2025-02-05T07:00:00Z"),
        ];

        let next = next_occurrence_date(&daily, fixed_time("2025-01-15T09:00:00Z"), &prior)
            .expect("next date");
        assert_eq!(next, fixed_time("2025-02-11T07:00:00Z"));
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
    }

    // Feature: recurrence, Property 1: weekly results always land on a listed
    // weekday, strictly after the reference
    proptest! {
        #[test]
        fn property1_weekly_results_match_the_weekday_set(
            day_offset in 0i64..730,
            weekday_bits in 1u8..128
        ) {
            let names = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
            let weekdays: Vec<String> = names
                .iter()
                .enumerate()
                .filter(|(index, _)| weekday_bits & (1 << index) != 0)
                .map(|(_, name)| name.to_string())
                .collect();

            let mut weekly = rule(RuleKind::Weekly);
            weekly.weekdays = weekdays.clone();
            let reference = fixed_time("2024-01-01T12:00:00Z") + Duration::days(day_offset);

            let next = next_occurrence_date(&weekly, reference, &[]).expect("next date");
            prop_assert!(next > reference);
            prop_assert!((next - reference).num_days() <= 7);

            let allowed: Vec<Weekday> =
                weekdays.iter().filter_map(|day| parse_weekday(day)).collect();
            prop_assert!(allowed.contains(&next.date_naive().weekday()));
        }
    }

    // Feature: recurrence, Property 2: monthly-by-weekday never spills into a
    // later month than the one it targets
    proptest! {
        #[test]
        fn property2_monthly_by_weekday_stays_in_target_month(
            day_offset in 0i64..730,
            weekday_index in 0usize..7,
            ordinal_index in 0usize..5
        ) {
            let names = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
            let ordinals = [
                WeekOrdinal::First,
                WeekOrdinal::Second,
                WeekOrdinal::Third,
                WeekOrdinal::Fourth,
                WeekOrdinal::Last,
            ];

            let mut monthly = rule(RuleKind::MonthlyByWeekday);
            monthly.weekday = Some(names[weekday_index].to_string());
            monthly.week_ordinal = Some(ordinals[ordinal_index]);

            let reference = fixed_time("2024-01-01T12:00:00Z") + Duration::days(day_offset);
            let next = next_occurrence_date(&monthly, reference, &[]).expect("next date");
            let next_date = next.date_naive();

            prop_assert!(next > reference);
            prop_assert_eq!(
                next_date.weekday(),
                parse_weekday(names[weekday_index]).expect("valid weekday")
            );

            let months_ahead = (next_date.year() - reference.date_naive().year()) * 12
                + next_date.month() as i32
                - reference.date_naive().month() as i32;
            prop_assert!(months_ahead >= 1 && months_ahead <= 2);
        }
    }
}
