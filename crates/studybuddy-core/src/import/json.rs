use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{CalendarImporter, ExternalEvent};
use crate::error::Result;

/// Reads a JSON array of external events from a file.
///
/// The file is read on every `fetch`, so edits between runs are picked up.
#[derive(Debug, Clone)]
pub struct JsonImporter {
    path: PathBuf,
}

impl JsonImporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<ExternalEvent>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl CalendarImporter for JsonImporter {
    fn name(&self) -> &str {
        "json"
    }

    fn fetch<'a>(
        &'a self,
        _owner_id: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Box<dyn Iterator<Item = ExternalEvent> + 'a>> {
        let events = self.read()?;
        Ok(Box::new(
            events
                .into_iter()
                .filter(move |e| e.start < end && start < e.end),
        ))
    }
}
