//! Field-level merge of two concurrent edits to the same event.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::Event;

/// A user-editable field of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    Title,
    Start,
    End,
    Category,
    Module,
}

pub type FieldSet = BTreeSet<EventField>;

/// Fields of `other` that differ from `base`.
pub fn changed_fields(base: &Event, other: &Event) -> FieldSet {
    let mut fields = FieldSet::new();
    if base.title != other.title {
        fields.insert(EventField::Title);
    }
    if base.start != other.start {
        fields.insert(EventField::Start);
    }
    if base.end != other.end {
        fields.insert(EventField::End);
    }
    if base.category != other.category {
        fields.insert(EventField::Category);
    }
    if base.module_id != other.module_id {
        fields.insert(EventField::Module);
    }
    fields
}

/// Overlay the fields `local` touched onto `remote`.
///
/// Only valid when the two sides touched disjoint field sets; the caller
/// decides that. The result keeps the remote revision and source and carries
/// the later of the two edit timestamps.
pub fn merge(local: &Event, remote: &Event, local_touched: &FieldSet) -> Event {
    let mut merged = remote.clone();
    for field in local_touched {
        match field {
            EventField::Title => merged.title = local.title.clone(),
            EventField::Start => merged.start = local.start,
            EventField::End => merged.end = local.end,
            EventField::Category => merged.category = local.category,
            EventField::Module => merged.module_id = local.module_id.clone(),
        }
    }
    merged.last_modified = std::cmp::max(local.last_modified, remote.last_modified);
    merged.deleted = false;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventCategory;
    use chrono::{TimeZone, Utc};

    fn base() -> Event {
        let t = |h| Utc.with_ymd_and_hms(2025, 3, 10, h, 0, 0).unwrap();
        Event::new("owner-1", "Algorithms", t(9), t(10), EventCategory::StudySession, t(0))
    }

    #[test]
    fn test_changed_fields_reports_only_differences() {
        let base = base();
        let mut edited = base.clone();
        edited.title = "Algorithms II".to_string();
        edited.module_id = Some("CS2040".to_string());

        let fields = changed_fields(&base, &edited);
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec![EventField::Title, EventField::Module]
        );
        assert!(changed_fields(&base, &base).is_empty());
    }

    #[test]
    fn test_merge_combines_disjoint_edits() {
        let base = base();

        let mut local = base.clone();
        local.title = "Graphs".to_string();
        local.last_modified = base.last_modified + chrono::Duration::minutes(5);

        let mut remote = base.clone();
        remote.end = base.end + chrono::Duration::minutes(30);
        remote.revision = 4;
        remote.last_modified = base.last_modified + chrono::Duration::minutes(2);

        let touched = changed_fields(&base, &local);
        let merged = merge(&local, &remote, &touched);

        assert_eq!(merged.title, "Graphs");
        assert_eq!(merged.end, remote.end);
        assert_eq!(merged.revision, 4);
        assert_eq!(merged.last_modified, local.last_modified);
    }
}
