use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Declared high-to-low so the derived `Ord` matches display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    None,
    Daily,
    Interval,
    Weekly,
    MonthlyByDate,
    MonthlyByWeekday,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeekOrdinal {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl WeekOrdinal {
    /// 1-based week number, or `None` for `Last`.
    pub fn nth(self) -> Option<u32> {
        match self {
            Self::First => Some(1),
            Self::Second => Some(2),
            Self::Third => Some(3),
            Self::Fourth => Some(4),
            Self::Last => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookaheadUnit {
    Days,
    Weeks,
    Months,
}

/// Advisory generation horizon carried over from stored rules. The engine
/// generates occurrences lazily, one at a time, and never reads this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lookahead {
    pub unit: LookaheadUnit,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_ordinal: Option<WeekOrdinal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead: Option<Lookahead>,
}

impl RecurrenceRule {
    pub fn none() -> Self {
        Self {
            kind: RuleKind::None,
            interval_days: None,
            weekdays: Vec::new(),
            day_of_month: None,
            weekday: None,
            week_ordinal: None,
            lookahead: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.kind {
            RuleKind::None | RuleKind::Daily => Ok(()),
            RuleKind::Interval => {
                if let Some(interval) = self.interval_days {
                    if interval < 1 {
                        return Err("rule.interval_days must be >= 1".to_string());
                    }
                }
                Ok(())
            }
            RuleKind::Weekly => {
                if !self.weekdays.iter().any(|day| parse_weekday(day).is_some()) {
                    return Err("rule.weekdays must contain at least one weekday".to_string());
                }
                Ok(())
            }
            RuleKind::MonthlyByDate => match self.day_of_month {
                Some(1..=31) => Ok(()),
                _ => Err("rule.day_of_month must be between 1 and 31".to_string()),
            },
            RuleKind::MonthlyByWeekday => {
                let weekday_valid = self
                    .weekday
                    .as_deref()
                    .and_then(parse_weekday)
                    .is_some();
                if !weekday_valid {
                    return Err("rule.weekday must name a weekday".to_string());
                }
                if self.week_ordinal.is_none() {
                    return Err("rule.week_ordinal is required".to_string());
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub pinned: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub duration_days: Option<i64>,
    pub start_date: Option<NaiveDate>,
    /// Derived fields, recomputed on every save; never hand-edited.
    pub visible_from: Option<NaiveDate>,
    pub visible_until: Option<NaiveDate>,
    pub status: TaskStatus,
    pub recurrence_rule: Option<RecurrenceRule>,
    /// Set on occurrences only: the id of the template that generated them.
    pub template_id: Option<String>,
    /// First day a superseding occurrence takes over. The visibility hook
    /// clamps `visible_until` to the day before, so a closed window stays
    /// closed across later edits and re-saves.
    pub superseded_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// A template carries a rule with a kind other than `none`. Templates are
    /// never shown on the calendar; their occurrences are.
    pub fn is_template(&self) -> bool {
        self.recurrence_rule
            .as_ref()
            .map(|rule| rule.kind != RuleKind::None)
            .unwrap_or(false)
    }

    pub fn is_occurrence(&self) -> bool {
        self.template_id.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.owner_id, "task.owner_id")?;
        validate_non_empty(&self.title, "task.title")?;
        if let Some(duration) = self.duration_days {
            if duration < 1 {
                return Err("task.duration_days must be >= 1".to_string());
            }
        }
        if self.is_template() && self.is_occurrence() {
            return Err("task cannot be both a template and an occurrence".to_string());
        }
        if let Some(rule) = &self.recurrence_rule {
            rule.validate()?;
        }
        Ok(())
    }
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
