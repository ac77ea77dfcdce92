use crate::domain::models::{RecurrenceRule, Task, TaskPriority, TaskStatus};
use crate::domain::visibility::apply_visibility;
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Owner-scoped task store. Every method takes the acting owner; writes
/// against a task held by a different owner are an ownership violation, never
/// a silent skip.
pub trait TaskRepository: Send + Sync {
    fn load_tasks(&self, owner_id: &str) -> Result<Vec<Task>, EngineError>;
    /// The occurrences generated from one template, without scanning the
    /// owner's whole task set.
    fn tasks_for_template(
        &self,
        owner_id: &str,
        template_id: &str,
    ) -> Result<Vec<Task>, EngineError>;
    fn upsert_task(&self, task: &Task) -> Result<Task, EngineError>;
    fn delete_task(&self, task_id: &str, owner_id: &str) -> Result<bool, EngineError>;
}

/// Validates and recomputes the visibility window before any write. Both
/// repository implementations funnel through this, so no write path can
/// persist a stale window.
fn prepare_for_save(task: &Task) -> Result<Task, EngineError> {
    let mut stored = task.clone();
    stored.validate().map_err(EngineError::InvalidTask)?;
    apply_visibility(&mut stored);
    Ok(stored)
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, EngineError> {
        self.tasks
            .lock()
            .map_err(|error| EngineError::LockPoisoned(format!("task store: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn load_tasks(&self, owner_id: &str) -> Result<Vec<Task>, EngineError> {
        let tasks = self.lock()?;
        let mut owned: Vec<Task> = tasks
            .values()
            .filter(|task| task.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    fn tasks_for_template(
        &self,
        owner_id: &str,
        template_id: &str,
    ) -> Result<Vec<Task>, EngineError> {
        let tasks = self.lock()?;
        Ok(tasks
            .values()
            .filter(|task| {
                task.owner_id == owner_id && task.template_id.as_deref() == Some(template_id)
            })
            .cloned()
            .collect())
    }

    fn upsert_task(&self, task: &Task) -> Result<Task, EngineError> {
        let stored = prepare_for_save(task)?;
        let mut tasks = self.lock()?;
        if let Some(existing) = tasks.get(&stored.id) {
            if existing.owner_id != stored.owner_id {
                return Err(EngineError::OwnershipViolation(format!(
                    "task {} belongs to another owner",
                    stored.id
                )));
            }
        }
        tasks.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn delete_task(&self, task_id: &str, owner_id: &str) -> Result<bool, EngineError> {
        let mut tasks = self.lock()?;
        match tasks.get(task_id) {
            None => Ok(false),
            Some(existing) if existing.owner_id != owner_id => {
                Err(EngineError::OwnershipViolation(format!(
                    "task {task_id} belongs to another owner"
                )))
            }
            Some(_) => {
                tasks.remove(task_id);
                Ok(true)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }

    fn owner_of(&self, connection: &Connection, task_id: &str) -> Result<Option<String>, EngineError> {
        let owner: Option<String> = connection
            .query_row(
                "SELECT owner_id FROM tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn load_tasks(&self, owner_id: &str) -> Result<Vec<Task>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, owner_id, title, description, category, priority, pinned, deadline,
                    duration_days, start_date, visible_from, visible_until, status,
                    recurrence_rule, template_id, superseded_on, created_at
             FROM tasks WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = statement.query_map(params![owner_id], raw_task_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_raw(row?)?);
        }
        Ok(tasks)
    }

    fn tasks_for_template(
        &self,
        owner_id: &str,
        template_id: &str,
    ) -> Result<Vec<Task>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, owner_id, title, description, category, priority, pinned, deadline,
                    duration_days, start_date, visible_from, visible_until, status,
                    recurrence_rule, template_id, superseded_on, created_at
             FROM tasks WHERE owner_id = ?1 AND template_id = ?2",
        )?;
        let rows = statement.query_map(params![owner_id, template_id], raw_task_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_raw(row?)?);
        }
        Ok(tasks)
    }

    fn upsert_task(&self, task: &Task) -> Result<Task, EngineError> {
        let stored = prepare_for_save(task)?;
        let connection = self.connect()?;

        if let Some(existing_owner) = self.owner_of(&connection, &stored.id)? {
            if existing_owner != stored.owner_id {
                return Err(EngineError::OwnershipViolation(format!(
                    "task {} belongs to another owner",
                    stored.id
                )));
            }
        }

        let recurrence_json = stored
            .recurrence_rule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        connection.execute(
            "INSERT INTO tasks (id, owner_id, title, description, category, priority, pinned,
                                deadline, duration_days, start_date, visible_from, visible_until,
                                status, recurrence_rule, template_id, superseded_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               description = excluded.description,
               category = excluded.category,
               priority = excluded.priority,
               pinned = excluded.pinned,
               deadline = excluded.deadline,
               duration_days = excluded.duration_days,
               start_date = excluded.start_date,
               visible_from = excluded.visible_from,
               visible_until = excluded.visible_until,
               status = excluded.status,
               recurrence_rule = excluded.recurrence_rule,
               template_id = excluded.template_id,
               superseded_on = excluded.superseded_on,
               created_at = excluded.created_at",
            params![
                stored.id,
                stored.owner_id,
                stored.title,
                stored.description,
                stored.category,
                stored.priority.as_str(),
                stored.pinned,
                stored.deadline.map(|value| value.to_rfc3339()),
                stored.duration_days,
                stored.start_date.map(|value| value.format(DATE_FORMAT).to_string()),
                stored.visible_from.map(|value| value.format(DATE_FORMAT).to_string()),
                stored.visible_until.map(|value| value.format(DATE_FORMAT).to_string()),
                stored.status.as_str(),
                recurrence_json,
                stored.template_id,
                stored.superseded_on.map(|value| value.format(DATE_FORMAT).to_string()),
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(stored)
    }

    fn delete_task(&self, task_id: &str, owner_id: &str) -> Result<bool, EngineError> {
        let connection = self.connect()?;
        match self.owner_of(&connection, task_id)? {
            None => Ok(false),
            Some(existing_owner) if existing_owner != owner_id => {
                Err(EngineError::OwnershipViolation(format!(
                    "task {task_id} belongs to another owner"
                )))
            }
            Some(_) => {
                connection.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
                Ok(true)
            }
        }
    }
}

struct RawTaskRow {
    id: String,
    owner_id: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    priority: String,
    pinned: bool,
    deadline: Option<String>,
    duration_days: Option<i64>,
    start_date: Option<String>,
    visible_from: Option<String>,
    visible_until: Option<String>,
    status: String,
    recurrence_rule: Option<String>,
    template_id: Option<String>,
    superseded_on: Option<String>,
    created_at: String,
}

fn raw_task_row(row: &Row<'_>) -> rusqlite::Result<RawTaskRow> {
    Ok(RawTaskRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        pinned: row.get(6)?,
        deadline: row.get(7)?,
        duration_days: row.get(8)?,
        start_date: row.get(9)?,
        visible_from: row.get(10)?,
        visible_until: row.get(11)?,
        status: row.get(12)?,
        recurrence_rule: row.get(13)?,
        template_id: row.get(14)?,
        superseded_on: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn task_from_raw(raw: RawTaskRow) -> Result<Task, EngineError> {
    let recurrence_rule: Option<RecurrenceRule> = raw
        .recurrence_rule
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(Task {
        priority: TaskPriority::parse(&raw.priority).ok_or_else(|| {
            EngineError::InvalidTask(format!("unknown priority '{}'", raw.priority))
        })?,
        status: TaskStatus::parse(&raw.status).ok_or_else(|| {
            EngineError::InvalidTask(format!("unknown status '{}'", raw.status))
        })?,
        deadline: parse_optional_datetime(raw.deadline.as_deref(), "deadline")?,
        start_date: parse_optional_date(raw.start_date.as_deref(), "start_date")?,
        visible_from: parse_optional_date(raw.visible_from.as_deref(), "visible_from")?,
        visible_until: parse_optional_date(raw.visible_until.as_deref(), "visible_until")?,
        superseded_on: parse_optional_date(raw.superseded_on.as_deref(), "superseded_on")?,
        created_at: parse_datetime(&raw.created_at, "created_at")?,
        id: raw.id,
        owner_id: raw.owner_id,
        title: raw.title,
        description: raw.description,
        category: raw.category,
        pinned: raw.pinned,
        duration_days: raw.duration_days,
        recurrence_rule,
        template_id: raw.template_id,
    })
}

fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| EngineError::InvalidTask(format!("invalid {field} '{value}': {error}")))
}

fn parse_optional_datetime(
    value: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    value.map(|raw| parse_datetime(raw, field)).transpose()
}

fn parse_optional_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, EngineError> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|error| {
                EngineError::InvalidTask(format!("invalid {field} '{raw}': {error}"))
            })
        })
        .transpose()
}
