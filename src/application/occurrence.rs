use crate::domain::models::{Task, TaskStatus};
use crate::domain::recurrence::next_occurrence_date;
use crate::domain::visibility::compute_visibility;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Lifecycle orchestration for recurring templates.
///
/// Occurrences are generated lazily, one at a time: a template gets a new
/// occurrence only when no non-completed occurrence currently covers today.
/// Calls for the same template are serialized through a per-template lock so
/// two concurrent refreshes cannot both observe "no active occurrence" and
/// each create one.
pub struct OccurrenceManager<R: TaskRepository> {
    repository: Arc<R>,
    now_provider: NowProvider,
    template_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: TaskRepository> OccurrenceManager<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            now_provider: Arc::new(Utc::now),
            template_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn today(&self) -> NaiveDate {
        (self.now_provider)().date_naive()
    }

    fn template_lock(&self, template_id: &str) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut locks = self
            .template_locks
            .lock()
            .map_err(|error| EngineError::LockPoisoned(format!("template lock table: {error}")))?;
        Ok(Arc::clone(
            locks
                .entry(template_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// The occurrence of `template` whose window covers today and which is
    /// not completed. At most one should exist; if the stored data disagrees,
    /// the earliest-starting one wins and the anomaly is logged.
    pub fn find_active_occurrence<'a>(
        &self,
        template: &Task,
        tasks: &'a [Task],
    ) -> Option<&'a Task> {
        let today = self.today();
        let covering: Vec<&Task> = tasks
            .iter()
            .filter(|task| {
                task.id != template.id
                    && task.template_id.as_deref() == Some(template.id.as_str())
                    && !task.is_done()
                    && window_covers(task, today)
            })
            .collect();

        if covering.len() > 1 {
            log::warn!(
                "template {} has {} non-completed occurrences covering {today}; keeping the earliest",
                template.id,
                covering.len()
            );
        }
        covering.into_iter().min_by_key(|task| task.visible_from)
    }

    /// Next deadline the template's rule produces, advancing from the latest
    /// sibling occurrence when any exist.
    pub fn next_occurrence_date_for(
        &self,
        template: &Task,
        tasks: &[Task],
    ) -> Option<DateTime<Utc>> {
        let rule = template.recurrence_rule.as_ref()?;
        let prior: Vec<DateTime<Utc>> = tasks
            .iter()
            .filter(|task| {
                task.id != template.id
                    && task.template_id.as_deref() == Some(template.id.as_str())
            })
            .filter_map(|task| task.deadline)
            .collect();
        let reference = template.deadline.unwrap_or_else(|| (self.now_provider)());
        next_occurrence_date(rule, reference, &prior)
    }

    /// Shortens an occurrence's window so it ends before `before_date`. The
    /// closure is recorded on the task itself and survives later re-saves;
    /// an already-earlier closure is never extended.
    pub fn close_previous_occurrence(
        &self,
        occurrence: &Task,
        before_date: NaiveDate,
    ) -> Result<Task, EngineError> {
        let mut closed = occurrence.clone();
        closed.superseded_on = Some(match occurrence.superseded_on {
            Some(existing) => existing.min(before_date),
            None => before_date,
        });
        let closed = self.repository.upsert_task(&closed)?;
        log::debug!(
            "closed occurrence {} at {:?} (superseded on {before_date})",
            closed.id,
            closed.visible_until
        );
        Ok(closed)
    }

    /// Central entry point, invoked on every task-list refresh for a
    /// template. Returns the active occurrence, creating it first if needed;
    /// `None` when the rule cannot produce a next date.
    ///
    /// Repeated calls with no elapsed time are no-ops: the existing active
    /// occurrence is returned unchanged. On a repository failure the template
    /// is left without an active occurrence and the previous occurrence
    /// untouched; the next refresh retries from scratch.
    pub fn ensure_active_occurrence(&self, template: &Task) -> Result<Option<Task>, EngineError> {
        if !template.is_template() {
            return Err(EngineError::InvalidTask(format!(
                "task {} is not a recurring template",
                template.id
            )));
        }

        let lock = self.template_lock(&template.id)?;
        let _guard = lock
            .lock()
            .map_err(|error| EngineError::LockPoisoned(format!("template {}: {error}", template.id)))?;

        let siblings = self
            .repository
            .tasks_for_template(&template.owner_id, &template.id)?;

        if let Some(active) = self.find_active_occurrence(template, &siblings) {
            return Ok(Some(active.clone()));
        }

        let Some(rule) = template.recurrence_rule.as_ref() else {
            return Ok(None);
        };
        let Some(mut next_deadline) = self.next_occurrence_date_for(template, &siblings) else {
            return Ok(None);
        };
        let Some(mut window) = compute_visibility(Some(next_deadline), template.duration_days, None)
        else {
            return Ok(None);
        };

        // A rule that has fallen behind the clock (stale deadline, app not
        // refreshed for a while) must not emit one occurrence per missed
        // period: advance until the candidate's window reaches today, then
        // create that single occurrence.
        let today = self.today();
        while window.visible_until < today {
            let Some(advanced) = next_occurrence_date(rule, next_deadline, &[]) else {
                return Ok(None);
            };
            next_deadline = advanced;
            let Some(caught_up) =
                compute_visibility(Some(next_deadline), template.duration_days, None)
            else {
                return Ok(None);
            };
            window = caught_up;
        }

        let to_close: Vec<&Task> = siblings
            .iter()
            .filter(|task| {
                !task.is_done()
                    && task
                        .visible_until
                        .map(|until| until >= window.visible_from)
                        .unwrap_or(false)
            })
            .collect();

        let occurrence = Task {
            id: next_id("task"),
            owner_id: template.owner_id.clone(),
            title: template.title.clone(),
            description: template.description.clone(),
            category: template.category.clone(),
            priority: template.priority,
            pinned: template.pinned,
            deadline: Some(next_deadline),
            duration_days: template.duration_days,
            start_date: None,
            visible_from: None,
            visible_until: None,
            status: TaskStatus::Pending,
            recurrence_rule: None,
            template_id: Some(template.id.clone()),
            superseded_on: None,
            created_at: (self.now_provider)(),
        };

        // The previous occurrence is only shortened once the replacement is
        // confirmed persisted; a failed insert leaves everything as it was.
        let created = self.repository.upsert_task(&occurrence)?;
        for previous in to_close {
            self.close_previous_occurrence(previous, window.visible_from)?;
        }

        log::debug!(
            "created occurrence {} for template {} due {next_deadline}",
            created.id,
            template.id
        );
        Ok(Some(created))
    }
}

fn window_covers(task: &Task, day: NaiveDate) -> bool {
    match (task.visible_from, task.visible_until) {
        (Some(from), Some(until)) => from <= day && day <= until,
        _ => false,
    }
}
