use crate::domain::models::{Task, TaskPriority};
use chrono::{Duration, NaiveDate};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Inclusive date range, typically one rendered month or week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let mut current = self.start;
        std::iter::from_fn(move || {
            if current > self.end {
                return None;
            }
            let day = current;
            current += Duration::days(1);
            Some(day)
        })
    }
}

/// A task paired with the part of its window that falls inside the queried
/// range. Open-ended tasks are clamped to the range itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarTask {
    pub task: Task,
    pub span_start: NaiveDate,
    pub span_end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayEntry {
    pub task: Task,
    /// 0-based position of this day inside the task's clamped span.
    pub day_index: i64,
    pub total_days: i64,
    pub is_first: bool,
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub entries: Vec<DayEntry>,
}

/// Tasks whose visibility window intersects the range, for one owner.
///
/// Templates never appear; their occurrences do. A missing bound is treated
/// as open on that side, so legacy tasks with no window at all intersect
/// every range. Completed tasks are excluded unless asked for.
pub fn tasks_in_range(
    tasks: &[Task],
    range: DateRange,
    owner_id: &str,
    include_completed: bool,
) -> Vec<CalendarTask> {
    tasks
        .iter()
        .filter(|task| task.owner_id == owner_id)
        .filter(|task| !task.is_template())
        .filter(|task| include_completed || !task.is_done())
        // Closing a superseded occurrence can leave it with a window that
        // ends before it starts; such an empty window is never shown.
        .filter(|task| {
            task.visible_from
                .zip(task.visible_until)
                .map(|(from, until)| from <= until)
                .unwrap_or(true)
        })
        .filter(|task| {
            let starts_in_time = task.visible_from.map(|from| from <= range.end).unwrap_or(true);
            let ends_in_time = task
                .visible_until
                .map(|until| until >= range.start)
                .unwrap_or(true);
            starts_in_time && ends_in_time
        })
        .map(|task| CalendarTask {
            task: task.clone(),
            span_start: task.visible_from.unwrap_or(range.start).max(range.start),
            span_end: task.visible_until.unwrap_or(range.end).min(range.end),
        })
        .collect()
}

/// Expands range results into one group per day, each task appearing on every
/// day of its clamped span with its position within that span. Days with no
/// tasks still get a (empty) group so the caller can render a full grid.
pub fn group_by_day(calendar_tasks: &[CalendarTask], range: DateRange) -> Vec<DayGroup> {
    let mut by_day: HashMap<NaiveDate, Vec<DayEntry>> = HashMap::new();

    for entry in calendar_tasks {
        let total_days = (entry.span_end - entry.span_start).num_days() + 1;
        for day_index in 0..total_days {
            let date = entry.span_start + Duration::days(day_index);
            by_day.entry(date).or_default().push(DayEntry {
                task: entry.task.clone(),
                day_index,
                total_days,
                is_first: day_index == 0,
                is_last: day_index == total_days - 1,
            });
        }
    }

    range
        .days()
        .map(|date| DayGroup {
            date,
            entries: by_day.remove(&date).unwrap_or_default(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    Pending,
    Done,
    Pinned,
    High,
    Medium,
    Low,
}

pub fn filter_tasks(tasks: &[Task], filter: TaskFilter) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| match filter {
            TaskFilter::All => true,
            TaskFilter::Pending => !task.is_done(),
            TaskFilter::Done => task.is_done(),
            TaskFilter::Pinned => task.pinned,
            TaskFilter::High => task.priority == TaskPriority::High,
            TaskFilter::Medium => task.priority == TaskPriority::Medium,
            TaskFilter::Low => task.priority == TaskPriority::Low,
        })
        .cloned()
        .collect()
}

/// List ordering: pinned first, then open before done, then by priority,
/// newest first within a tier.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| {
        (
            !task.pinned,
            task.is_done(),
            task.priority,
            Reverse(task.created_at),
        )
    });
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadlineBuckets {
    pub today: Vec<Task>,
    pub tomorrow: Vec<Task>,
    pub this_week: Vec<Task>,
    pub later: Vec<Task>,
    pub no_deadline: Vec<Task>,
}

/// Buckets tasks by how soon their deadline falls, relative to `today`.
/// Overdue tasks land in the today bucket so they stay in front of the user.
pub fn bucket_by_deadline(tasks: &[Task], today: NaiveDate) -> DeadlineBuckets {
    let tomorrow = today + Duration::days(1);
    let week_end = today + Duration::days(7);

    let mut buckets = DeadlineBuckets::default();
    for task in tasks {
        match task.deadline.map(|deadline| deadline.date_naive()) {
            None => buckets.no_deadline.push(task.clone()),
            Some(due) if due <= today => buckets.today.push(task.clone()),
            Some(due) if due == tomorrow => buckets.tomorrow.push(task.clone()),
            Some(due) if due <= week_end => buckets.this_week.push(task.clone()),
            Some(_) => buckets.later.push(task.clone()),
        }
    }
    buckets
}
