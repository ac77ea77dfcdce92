pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::calendar::{
    bucket_by_deadline, filter_tasks, group_by_day, sort_tasks, tasks_in_range, CalendarTask,
    DateRange, DayEntry, DayGroup, DeadlineBuckets, TaskFilter,
};
pub use application::occurrence::{NowProvider, OccurrenceManager};
pub use domain::models::{
    parse_weekday, Lookahead, LookaheadUnit, RecurrenceRule, RuleKind, Task, TaskPriority,
    TaskStatus, WeekOrdinal,
};
pub use domain::recurrence::next_occurrence_date;
pub use domain::visibility::{apply_visibility, compute_visibility, VisibilityWindow};
pub use infrastructure::error::EngineError;
pub use infrastructure::storage::initialize_database;
pub use infrastructure::task_repository::{
    InMemoryTaskRepository, SqliteTaskRepository, TaskRepository,
};
