use crate::domain::models::Task;
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Inclusive date range during which a task is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityWindow {
    pub visible_from: NaiveDate,
    pub visible_until: NaiveDate,
}

impl VisibilityWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.visible_from <= day && day <= self.visible_until
    }
}

/// Null, zero, or negative durations all mean a single-day window.
pub fn effective_duration_days(duration_days: Option<i64>) -> i64 {
    match duration_days {
        Some(duration) if duration >= 1 => duration,
        _ => 1,
    }
}

/// Computes the visibility window for a task.
///
/// A deadline anchors the window at its end: the task surfaces
/// `duration_days - 1` days before the deadline's calendar date. Without a
/// deadline, a start date anchors the window at its beginning. Tasks with
/// neither are legacy always-visible tasks and get no window.
pub fn compute_visibility(
    deadline: Option<DateTime<Utc>>,
    duration_days: Option<i64>,
    start_date: Option<NaiveDate>,
) -> Option<VisibilityWindow> {
    let span = Duration::days(effective_duration_days(duration_days) - 1);

    if let Some(deadline) = deadline {
        let visible_until = deadline.date_naive();
        return Some(VisibilityWindow {
            visible_from: visible_until - span,
            visible_until,
        });
    }

    if let Some(start) = start_date {
        return Some(VisibilityWindow {
            visible_from: start,
            visible_until: start + span,
        });
    }

    None
}

/// The single pre-save hook: overwrites the task's stored window from its
/// current anchor fields. Every repository write path goes through this, so
/// stale windows cannot survive a deadline or start-date edit.
pub fn apply_visibility(task: &mut Task) {
    match compute_visibility(task.deadline, task.duration_days, task.start_date) {
        Some(window) => {
            let mut visible_until = window.visible_until;
            if let Some(cutoff) = task.superseded_on.and_then(|day| day.pred_opt()) {
                visible_until = visible_until.min(cutoff);
            }
            task.visible_from = Some(window.visible_from);
            task.visible_until = Some(visible_until);
        }
        None => {
            task.visible_from = None;
            task.visible_until = None;
        }
    }
}
