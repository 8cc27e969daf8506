//! CSV attendance report.

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

use crate::session::{AttendanceRecord, AttendanceStatus, SessionStore};
use crate::types::Identity;

pub const REPORT_FILE_NAME: &str = "attendance_report.csv";
pub const REPORT_CONTENT_TYPE: &str = "text/csv;charset=utf-8";
pub const REPORT_HEADER: &str = "Student Name,Status,Timestamp";
pub const TIMESTAMP_PLACEHOLDER: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub name: String,
    pub status: AttendanceStatus,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReportRow {
    pub fn timestamp_text(&self) -> String {
        self.timestamp
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| TIMESTAMP_PLACEHOLDER.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceReport {
    rows: Vec<ReportRow>,
}

impl AttendanceReport {
    /// One row per roster identity, in roster order. Identities the session
    /// never saw (or does not know) are reported Absent.
    pub fn build(session: &SessionStore, roster: &[Identity]) -> Self {
        let mut seen = std::collections::HashSet::new();
        let rows = roster
            .iter()
            .filter(|identity| seen.insert(identity.name.as_str()))
            .map(|identity| {
                let record = session
                    .record(&identity.name)
                    .unwrap_or(AttendanceRecord::ABSENT);
                ReportRow {
                    name: identity.name.clone(),
                    status: record.status,
                    timestamp: record.timestamp,
                }
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(REPORT_HEADER.len() + 1 + self.rows.len() * 48);
        out.push_str(REPORT_HEADER);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&quote(&row.name));
            out.push(',');
            out.push_str(&quote(row.status.as_str()));
            out.push(',');
            out.push_str(&quote(&row.timestamp_text()));
            out.push('\n');
        }
        out
    }

    /// Write the report as `attendance_report.csv` inside `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        std::fs::write(&path, self.to_csv())?;
        tracing::info!(path = %path.display(), rows = self.rows.len(), "attendance report written");
        Ok(path)
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
