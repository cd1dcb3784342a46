//! Study-session scheduler.
//!
//! Places study blocks into the free time around existing commitments:
//! - Busy intervals come from every non-deleted event in the goal's range
//! - Free gaps are filled earliest first, one block of the session
//!   granularity at a time, until the goal is met or the range runs out
//!
//! Proposals never overlap each other or a busy interval, by construction.
//! The scheduler never writes; accepting a proposal is an ordinary upsert.

mod task;
mod window;

pub use task::{cmp_urgency, StudyTask, TaskPriority};
pub use window::{merge_busy, BusyInterval, ScheduleWindow};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::event::{Event, EventCategory};
use crate::storage::{LocalStore, SchedulerSettings};

/// How much study time to place, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyGoal {
    #[serde(with = "minutes")]
    pub total_duration: Duration,
    pub earliest_start: DateTime<Utc>,
    pub latest_end: DateTime<Utc>,
    #[serde(with = "minutes")]
    pub session_granularity: Duration,
    /// Falls back to the configured default session title
    pub title: Option<String>,
    pub module_id: Option<String>,
    /// Stamped as `last_modified` on every proposal
    pub requested_at: DateTime<Utc>,
}

impl StudyGoal {
    pub fn new(
        total_duration: Duration,
        earliest_start: DateTime<Utc>,
        latest_end: DateTime<Utc>,
        session_granularity: Duration,
    ) -> Self {
        Self {
            total_duration,
            earliest_start,
            latest_end,
            session_granularity,
            title: None,
            module_id: None,
            requested_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    #[must_use]
    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = at;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.latest_end <= self.earliest_start {
            return Err(ValidationError::InvalidTimeRange {
                start: self.earliest_start,
                end: self.latest_end,
            });
        }
        if self.total_duration <= Duration::zero() {
            return Err(ValidationError::InvalidValue {
                field: "total_duration".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.session_granularity <= Duration::zero() {
            return Err(ValidationError::InvalidValue {
                field: "session_granularity".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Proposals plus how far they fall short of the goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub proposals: Vec<Event>,
    #[serde(with = "minutes")]
    pub requested: Duration,
    #[serde(with = "minutes")]
    pub placed: Duration,
    #[serde(with = "minutes")]
    pub unmet: Duration,
}

/// Durations on the wire are whole minutes.
mod minutes {
    use chrono::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_minutes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = i64::deserialize(deserializer)?;
        Duration::try_minutes(minutes)
            .ok_or_else(|| D::Error::custom(format!("{minutes} minutes is out of range")))
    }
}

impl ProposalSummary {
    pub fn new(goal: &StudyGoal, proposals: Vec<Event>) -> Self {
        let placed = proposals
            .iter()
            .fold(Duration::zero(), |total, e| total + e.duration());
        let unmet = (goal.total_duration - placed).max(Duration::zero());
        Self {
            proposals,
            requested: goal.total_duration,
            placed,
            unmet,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.unmet == Duration::zero()
    }
}

/// Greedy earliest-first study planner.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: SchedulerSettings) -> Self {
        Self { settings }
    }

    /// A goal over `[earliest_start, latest_end)` using the configured granularity.
    pub fn goal(
        &self,
        total_duration: Duration,
        earliest_start: DateTime<Utc>,
        latest_end: DateTime<Utc>,
    ) -> StudyGoal {
        StudyGoal::new(
            total_duration,
            earliest_start,
            latest_end,
            self.default_granularity(),
        )
    }

    fn default_granularity(&self) -> Duration {
        Duration::minutes(i64::from(self.settings.default_granularity_min))
    }

    /// Plan `per_task` study time for every open, dated task, most urgent
    /// first. Sessions proposed for one task are busy time for the next.
    /// Tasks that cannot be planned (done, undated, already due) are skipped.
    pub fn plan_tasks(
        &self,
        store: &LocalStore,
        owner_id: &str,
        tasks: &[StudyTask],
        per_task: Duration,
        from: DateTime<Utc>,
        requested_at: DateTime<Utc>,
    ) -> Result<Vec<(StudyTask, ProposalSummary)>> {
        let mut ordered: Vec<&StudyTask> = tasks.iter().collect();
        ordered.sort_by(|a, b| cmp_urgency(a, b));

        let mut accepted: Vec<Event> = Vec::new();
        let mut plans = Vec::new();
        for task in ordered {
            let goal = match task.goal(per_task, from, self.default_granularity()) {
                Ok(goal) => goal.requested_at(requested_at),
                Err(reason) => {
                    tracing::debug!(task = %task.id, %reason, "task skipped");
                    continue;
                }
            };
            let mut events = store.query(owner_id, goal.earliest_start, goal.latest_end)?;
            events.extend(accepted.iter().cloned());
            let proposals = self.propose(owner_id, &goal, &events)?;
            accepted.extend(proposals.iter().cloned());
            plans.push((task.clone(), ProposalSummary::new(&goal, proposals)));
        }
        Ok(plans)
    }

    /// Propose study sessions for `owner_id` around `events`.
    ///
    /// May return less than the goal (or nothing) when the range is too full.
    pub fn propose(&self, owner_id: &str, goal: &StudyGoal, events: &[Event]) -> Result<Vec<Event>> {
        goal.validate()?;

        let window = ScheduleWindow::build(owner_id, goal.earliest_start, goal.latest_end, events);
        let title = goal
            .title
            .clone()
            .unwrap_or_else(|| self.settings.default_session_title.clone());

        let mut remaining = goal.total_duration;
        let mut proposals = Vec::new();

        'gaps: for gap in window.free_gaps() {
            let mut cursor = gap.start;
            while remaining > Duration::zero() {
                let block = goal.session_granularity.min(remaining);
                let end = cursor + block;
                if end > gap.end {
                    continue 'gaps;
                }

                let mut session = Event::new(
                    owner_id,
                    title.clone(),
                    cursor,
                    end,
                    EventCategory::StudySession,
                    goal.requested_at,
                );
                session.module_id = goal.module_id.clone();
                proposals.push(session);

                remaining = remaining - block;
                cursor = end;
            }
            break;
        }

        tracing::debug!(
            owner = owner_id,
            proposals = proposals.len(),
            unmet_min = remaining.num_minutes(),
            "study sessions proposed"
        );
        Ok(proposals)
    }

    /// Propose against the owner's current events in the store.
    pub fn plan(&self, store: &LocalStore, owner_id: &str, goal: &StudyGoal) -> Result<ProposalSummary> {
        goal.validate()?;
        let events = store.query(owner_id, goal.earliest_start, goal.latest_end)?;
        let proposals = self.propose(owner_id, goal, &events)?;
        Ok(ProposalSummary::new(goal, proposals))
    }
}
