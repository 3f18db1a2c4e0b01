use chrono::{DateTime, Utc};
use tracing::info;

use crate::pipeline::Outcome;

/// Running totals of what happened to inbound messages since startup.
#[derive(Debug, Clone)]
pub struct IngestStats {
    pub started_at: DateTime<Utc>,
    pub received: u64,

    // outcomes
    pub stored: u64,
    pub skipped: u64,
    pub ignored: u64,
    pub duplicates: u64,
    pub end_of_trip: u64,
    pub statuses_deleted: u64,

    // failures
    pub malformed: u64,
    pub failed: u64,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            received: 0,
            stored: 0,
            skipped: 0,
            ignored: 0,
            duplicates: 0,
            end_of_trip: 0,
            statuses_deleted: 0,
            malformed: 0,
            failed: 0,
        }
    }
}

impl IngestStats {
    pub fn record(&mut self, outcome: &Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Stored { .. } => self.stored += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::EndOfTrip { deleted } => {
                self.end_of_trip += 1;
                self.statuses_deleted += deleted;
            }
        }
    }

    pub fn record_malformed(&mut self) {
        self.received += 1;
        self.malformed += 1;
    }

    pub fn record_failed(&mut self) {
        self.received += 1;
        self.failed += 1;
    }

    /// Share of received messages that produced a status row, in percent.
    pub fn stored_pct(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            (self.stored as f64 / self.received as f64) * 100.0
        }
    }

    pub fn log_summary(&self, cleanup_in_progress: bool) {
        info!(
            received = self.received,
            stored = self.stored,
            stored_pct = format!("{:.1}", self.stored_pct()),
            skipped = self.skipped,
            ignored = self.ignored,
            duplicates = self.duplicates,
            end_of_trip = self.end_of_trip,
            statuses_deleted = self.statuses_deleted,
            malformed = self.malformed,
            failed = self.failed,
            cleanup_in_progress,
            "Ingest summary"
        );
    }
}
