use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::{BrainError, Result};

pub type NoteId = i64;

/// A stored note. Chunks of a long input are notes too, linked by `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub parent_id: Option<NoteId>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub favorite: bool,
    /// Whether the note currently has a stored embedding
    #[serde(skip)]
    pub embedded: bool,
}

impl Note {
    /// Tags in their stored, comma-delimited form
    pub fn tags_text(&self) -> String {
        self.tags.join(",")
    }
}

/// Inclusive timestamp range; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Whole-day bounds: `start` at midnight, `end` through 23:59:59.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        let start = start.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| Utc.from_utc_datetime(&dt));
        let end = end
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
            .map(|dt| Utc.from_utc_datetime(&dt));
        Self::new(start, end)
    }

    pub fn validate(&self) -> Result<()> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Err(BrainError::Validation(format!(
                "time range start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Structured predicates shared by listing and ranked search
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Every tag must substring-match the stored tag text (case-insensitive)
    pub tags: Vec<String>,
    pub range: TimeRange,
}

impl Scope {
    pub fn new(tags: &[String], range: TimeRange) -> Self {
        Self {
            tags: split_tags(&tags.join(",")),
            range,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.range.is_unbounded()
    }

    pub fn matches(&self, note: &Note) -> bool {
        let stored = note.tags_text().to_lowercase();
        self.tags.iter().all(|t| stored.contains(&t.to_lowercase())) && self.range.contains(note.timestamp)
    }
}

/// Filter for `list`: optional body substring plus a scope
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub text: Option<String>,
    pub scope: Scope,
}

impl NoteFilter {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    /// Lowercased body needle, `None` when absent or blank
    pub fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

/// Normalize user tag input ("Animals, demo,,x") into a deduplicated lowercase list.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(|t| t.trim().to_lowercase()) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(micros: i64) -> DateTime<Utc> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}
