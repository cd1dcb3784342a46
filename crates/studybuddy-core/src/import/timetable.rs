//! Weekly module timetable expanded into dated occurrences.

use std::path::Path;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{CalendarImporter, ExternalEvent};
use crate::error::{Result, ValidationError};
use crate::event::EventCategory;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// One weekly recurring slot, e.g. "CS101 lecture, Mondays 09:00-10:30".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableSlot {
    pub slot_id: String,
    pub module_id: String,
    pub title: String,
    /// 1 = Sunday .. 7 = Saturday
    pub day_of_week: u8,
    /// Minutes from midnight (UTC)
    pub start_min: u32,
    pub end_min: u32,
}

impl TimetableSlot {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.slot_id.trim().is_empty() {
            return Err(invalid("slot_id", "must not be empty".to_string()));
        }
        if !(1..=7).contains(&self.day_of_week) {
            return Err(invalid(
                "day_of_week",
                format!("{} is not in 1 (Sunday) ..= 7 (Saturday)", self.day_of_week),
            ));
        }
        if self.end_min <= self.start_min || self.end_min > MINUTES_PER_DAY {
            return Err(invalid(
                "end_min",
                format!(
                    "slot {} runs {}..{}, expected start < end <= {MINUTES_PER_DAY}",
                    self.slot_id, self.start_min, self.end_min
                ),
            ));
        }
        Ok(())
    }

    fn falls_on(&self, date: NaiveDate) -> bool {
        date.weekday().number_from_sunday() == u32::from(self.day_of_week)
    }

    fn occurrence(&self, date: NaiveDate) -> ExternalEvent {
        let midnight = date.and_time(chrono::NaiveTime::MIN).and_utc();
        ExternalEvent {
            external_id: format!("timetable:{}:{}", self.slot_id, date.format("%Y-%m-%d")),
            title: self.title.clone(),
            start: midnight + Duration::minutes(i64::from(self.start_min)),
            end: midnight + Duration::minutes(i64::from(self.end_min)),
            category: EventCategory::FixedCommitment,
            module_id: Some(self.module_id.clone()),
            last_modified: None,
        }
    }
}

fn invalid(field: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

/// A validated set of weekly slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTimetable {
    slots: Vec<TimetableSlot>,
}

impl WeeklyTimetable {
    pub fn new(slots: Vec<TimetableSlot>) -> Result<Self> {
        for slot in &slots {
            slot.validate()?;
        }
        Ok(Self { slots })
    }

    /// Load a JSON array of slots.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let slots: Vec<TimetableSlot> = serde_json::from_str(&content)?;
        Self::new(slots)
    }

    pub fn slots(&self) -> &[TimetableSlot] {
        &self.slots
    }
}

impl CalendarImporter for WeeklyTimetable {
    fn name(&self) -> &str {
        "timetable"
    }

    fn fetch<'a>(
        &'a self,
        _owner_id: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Box<dyn Iterator<Item = ExternalEvent> + 'a>> {
        let first = start.date_naive();
        let last = end.date_naive();

        let days = first.iter_days().take_while(move |day| *day <= last);
        Ok(Box::new(days.flat_map(move |day| {
            self.slots
                .iter()
                .filter(move |slot| slot.falls_on(day))
                .map(move |slot| slot.occurrence(day))
                .filter(move |e| e.start < end && start < e.end)
        })))
    }
}
