//! Processing of one inbound message, start to finish.
//!
//! Messages must be fed strictly one at a time. The duplicate filter inside
//! [`LocationResolver`] compares each position with the previous one on its
//! channel, which only means something for a single ordered stream.

use tracing::{Instrument, debug, error, warn};

use crate::error::IngestError;
use crate::location::{LocationResolver, Resolution};
use crate::payload::parse_event;
use crate::stats::IngestStats;
use crate::status::VehicleStatus;
use crate::topic::Topic;
use crate::writer::{PersistenceWriter, WriteOutcome};

/// What became of a message that was processed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stored { stop_id: i64, status_id: i64 },
    /// Stop rows were written but the status row was not.
    Skipped,
    /// Event type the pipeline does not store.
    Ignored,
    Duplicate,
    EndOfTrip { deleted: u64 },
}

pub struct IngestionPipeline {
    resolver: LocationResolver,
    writer: PersistenceWriter,
    stats: IngestStats,
}

impl IngestionPipeline {
    pub fn new(resolver: LocationResolver, writer: PersistenceWriter) -> Self {
        Self {
            resolver,
            writer,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Processes one message, logging and counting the result. Never fails:
    /// a bad message is dropped and the next one is processed normally.
    pub async fn handle(&mut self, topic: &str, payload: &[u8]) -> Option<Outcome> {
        let span = tracing::debug_span!("message", topic);
        let result = self.process(topic, payload).instrument(span).await;

        match result {
            Ok(outcome) => {
                self.stats.record(&outcome);
                Some(outcome)
            }
            Err(IngestError::MalformedMessage(reason)) => {
                warn!(topic, %reason, "Dropping malformed message");
                self.stats.record_malformed();
                None
            }
            Err(e @ IngestError::Persistence(_)) => {
                error!(topic, error = %e, "Dropping message after store failure");
                self.stats.record_failed();
                None
            }
        }
    }

    /// Runs the pipeline for one message and reports what happened.
    ///
    /// # Errors
    ///
    /// [`IngestError::MalformedMessage`] for an unparseable topic or payload,
    /// [`IngestError::Persistence`] if a store operation fails. Rows written
    /// before the failing step are kept.
    pub async fn process(&mut self, topic: &str, payload: &[u8]) -> Result<Outcome, IngestError> {
        let topic = Topic::parse(topic)?;

        if topic.is_end_of_trip() {
            let deleted = self.writer.end_trip(topic.vehicle_number).await?;
            debug!(vehicle_number = topic.vehicle_number, deleted, "Trip ended");
            return Ok(Outcome::EndOfTrip { deleted });
        }

        let Some(status) = VehicleStatus::classify(&topic.event_type) else {
            debug!(event_type = %topic.event_type, "Unhandled event type");
            return Ok(Outcome::Ignored);
        };

        let event = parse_event(payload, &topic.event_type, status)?;

        let location = match self
            .resolver
            .resolve(topic.vehicle_number, &topic.next_stop, &event, status)
            .await?
        {
            Resolution::Resolved(location) => location,
            Resolution::Duplicate => return Ok(Outcome::Duplicate),
        };

        let outcome = match self.writer.write(&topic, &event, status, &location).await? {
            WriteOutcome::Stored { stop_id, status_id } => Outcome::Stored { stop_id, status_id },
            WriteOutcome::Skipped { .. } => Outcome::Skipped,
        };
        Ok(outcome)
    }
}
