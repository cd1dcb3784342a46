//! Study tasks with deadlines.
//!
//! A task's due date bounds the goal planned for it, and open tasks are
//! planned in urgency order.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::StudyGoal;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// A piece of coursework to plan study time for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl StudyTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            module_id: None,
            priority: TaskPriority::None,
            due_at: None,
            completed: false,
        }
    }

    #[must_use]
    pub fn due(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    /// Goal of `total` study time between `from` and the due date, titled
    /// after the task.
    pub fn goal(
        &self,
        total: Duration,
        from: DateTime<Utc>,
        granularity: Duration,
    ) -> Result<StudyGoal, ValidationError> {
        if self.completed {
            return Err(ValidationError::InvalidValue {
                field: "completed".to_string(),
                message: format!("task '{}' is already done", self.id),
            });
        }
        let due_at = self.due_at.ok_or_else(|| ValidationError::InvalidValue {
            field: "due_at".to_string(),
            message: format!("task '{}' has no due date", self.id),
        })?;

        let mut goal = StudyGoal::new(total, from, due_at, granularity).with_title(self.title.clone());
        if let Some(module_id) = &self.module_id {
            goal = goal.with_module(module_id.clone());
        }
        goal.validate()?;
        Ok(goal)
    }
}

/// Open tasks first, then earliest due date (undated last), then highest
/// priority, then id.
pub fn cmp_urgency(a: &StudyTask, b: &StudyTask) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then_with(|| match (a.due_at, b.due_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 17, 0, 0).unwrap()
    }

    #[test]
    fn test_due_date_bounds_goal() {
        let task = StudyTask::new("t1", "Essay draft").due(day(14)).with_module("EN201");
        let goal = task
            .goal(Duration::hours(3), day(10), Duration::minutes(45))
            .unwrap();
        assert_eq!(goal.latest_end, day(14));
        assert_eq!(goal.title.as_deref(), Some("Essay draft"));
        assert_eq!(goal.module_id.as_deref(), Some("EN201"));
    }

    #[test]
    fn test_goal_needs_open_task_with_future_due_date() {
        let undated = StudyTask::new("t1", "Reading");
        assert!(undated.goal(Duration::hours(1), day(10), Duration::minutes(30)).is_err());

        let overdue = StudyTask::new("t2", "Lab report").due(day(9));
        assert!(matches!(
            overdue.goal(Duration::hours(1), day(10), Duration::minutes(30)),
            Err(ValidationError::InvalidTimeRange { .. })
        ));

        let mut done = StudyTask::new("t3", "Quiz").due(day(12));
        done.completed = true;
        assert!(done.goal(Duration::hours(1), day(10), Duration::minutes(30)).is_err());
    }

    #[test]
    fn test_urgency_order() {
        let mut tasks = vec![
            StudyTask::new("undated", "A").with_priority(TaskPriority::High),
            StudyTask::new("later", "B").due(day(20)),
            StudyTask::new("soon-low", "C").due(day(12)).with_priority(TaskPriority::Low),
            StudyTask::new("soon-high", "D").due(day(12)).with_priority(TaskPriority::High),
        ];
        tasks[1].completed = true;
        tasks.sort_by(cmp_urgency);

        let order: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, ["soon-high", "soon-low", "undated", "later"]);
    }

    #[test]
    fn test_priority_parses_from_snake_case() {
        let task: StudyTask =
            serde_json::from_str(r#"{"id": "t9", "title": "Revise", "priority": "medium"}"#).unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.due_at.is_none());
    }
}
