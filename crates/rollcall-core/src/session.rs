//! Per-session attendance records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::types::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Absent,
    Present,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Present => "Present",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub status: AttendanceStatus,
    /// First time the identity was seen; set together with `Present`.
    pub timestamp: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub const ABSENT: AttendanceRecord = AttendanceRecord {
        status: AttendanceStatus::Absent,
        timestamp: None,
    };

    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present
    }
}

/// Result of a `mark_present` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyPresent,
    /// Name is not part of this session.
    Unknown,
}

/// Attendance for one capture session.
///
/// The key set is fixed at construction. Records only move from Absent to
/// Present, once.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    order: Vec<String>,
    records: HashMap<String, AttendanceRecord>,
    excluded: BTreeSet<String>,
}

impl SessionStore {
    /// One Absent record per distinct name. Later duplicates are ignored.
    pub fn new(roster: &[Identity]) -> Self {
        let mut order = Vec::with_capacity(roster.len());
        let mut records = HashMap::with_capacity(roster.len());
        for identity in roster {
            if records
                .insert(identity.name.clone(), AttendanceRecord::ABSENT)
                .is_some()
            {
                tracing::warn!(name = %identity.name, "duplicate identity in session roster; ignoring");
                continue;
            }
            order.push(identity.name.clone());
        }
        Self {
            order,
            records,
            excluded: BTreeSet::new(),
        }
    }

    pub fn mark_present(&mut self, name: &str, time: DateTime<Utc>) -> MarkOutcome {
        let Some(record) = self.records.get_mut(name) else {
            return MarkOutcome::Unknown;
        };
        if record.is_present() {
            return MarkOutcome::AlreadyPresent;
        }
        *record = AttendanceRecord {
            status: AttendanceStatus::Present,
            timestamp: Some(time),
        };
        MarkOutcome::Marked
    }

    pub fn record(&self, name: &str) -> Option<AttendanceRecord> {
        self.records.get(name).copied()
    }

    /// Snapshot of every record, in session order.
    pub fn all_records(&self) -> Vec<(String, AttendanceRecord)> {
        self.order
            .iter()
            .filter_map(|name| self.records.get(name).map(|r| (name.clone(), *r)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.records.values().filter(|r| r.is_present()).count()
    }

    /// Mark an identity as excluded from matching. Its record stays.
    pub fn exclude(&mut self, name: &str) -> bool {
        self.records.contains_key(name) && self.excluded.insert(name.to_string())
    }

    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }
}
