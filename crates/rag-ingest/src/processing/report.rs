//! Per-object states and run-level progress accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one object within a run
///
/// `Failed` is not a state here: a failure is reported as an outcome carrying
/// the last state the object reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    Discovered,
    Deduped,
    Extracted,
    Chunked,
    Submitted,
    Done,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::Deduped => "deduped",
            Self::Extracted => "extracted",
            Self::Chunked => "chunked",
            Self::Submitted => "submitted",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Dedup decision for one object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Identity already stored
    Skip,
    /// Identity not stored
    New,
    /// No usable identity
    Unidentified,
}

/// Terminal result for one object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ObjectOutcome {
    /// Identity already stored, nothing done
    Skipped,
    /// No identity, so it cannot be deduplicated
    Unidentified,
    /// Format is out of scope for vectorization
    UnsupportedFormat,
    /// Extraction produced no text
    Empty,
    /// Records inserted
    Ingested { chunks: usize },
    /// Would be ingested (dry run)
    WouldIngest,
    /// Per-object failure; `stage` is the last state reached
    Failed { stage: ObjectState, error: String },
}

/// Failure details kept for the final summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFailure {
    pub key: String,
    pub stage: ObjectState,
    pub error: String,
}

/// Counters for one pipeline run
///
/// Only failures are kept per key; everything else is counted so the report
/// stays small however many objects the store holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages: usize,
    pub listed: usize,
    pub skipped: usize,
    pub unidentified: usize,
    pub unsupported: usize,
    pub empty: usize,
    pub ingested: usize,
    pub would_ingest: usize,
    pub chunks_inserted: usize,
    pub failures: Vec<ObjectFailure>,
}

impl RunReport {
    /// Start a new report
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            pages: 0,
            listed: 0,
            skipped: 0,
            unidentified: 0,
            unsupported: 0,
            empty: 0,
            ingested: 0,
            would_ingest: 0,
            chunks_inserted: 0,
            failures: Vec::new(),
        }
    }

    /// Count one object's terminal outcome
    pub fn record(&mut self, key: &str, outcome: &ObjectOutcome) {
        self.listed += 1;
        match outcome {
            ObjectOutcome::Skipped => self.skipped += 1,
            ObjectOutcome::Unidentified => self.unidentified += 1,
            ObjectOutcome::UnsupportedFormat => self.unsupported += 1,
            ObjectOutcome::Empty => self.empty += 1,
            ObjectOutcome::Ingested { chunks } => {
                self.ingested += 1;
                self.chunks_inserted += chunks;
            }
            ObjectOutcome::WouldIngest => self.would_ingest += 1,
            ObjectOutcome::Failed { stage, error } => self.failures.push(ObjectFailure {
                key: key.to_string(),
                stage: *stage,
                error: error.clone(),
            }),
        }
    }

    /// Mark the run finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Wall-clock duration, if finished
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} objects in {} pages: {} ingested ({} chunks), {} skipped, {} unsupported, {} empty, {} unidentified, {} failed",
            self.listed,
            self.pages,
            self.ingested,
            self.chunks_inserted,
            self.skipped,
            self.unsupported,
            self.empty,
            self.unidentified,
            self.failed()
        )?;
        if self.would_ingest > 0 {
            write!(f, ", {} would be ingested", self.would_ingest)?;
        }
        if let Some(secs) = self.elapsed_secs() {
            write!(f, " in {:.1}s", secs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_outcomes() {
        let mut report = RunReport::start();
        report.record("a.pdf", &ObjectOutcome::Ingested { chunks: 3 });
        report.record("b.pdf", &ObjectOutcome::Ingested { chunks: 2 });
        report.record("c.pdf", &ObjectOutcome::Skipped);
        report.record("d.png", &ObjectOutcome::UnsupportedFormat);
        report.record(
            "e.pdf",
            &ObjectOutcome::Failed {
                stage: ObjectState::Deduped,
                error: "boom".to_string(),
            },
        );
        report.finish();

        assert_eq!(report.listed, 5);
        assert_eq!(report.ingested, 2);
        assert_eq!(report.chunks_inserted, 5);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].key, "e.pdf");
        assert!(report.elapsed_secs().is_some());
        assert!(report.to_string().starts_with("5 objects in 0 pages: 2 ingested (5 chunks)"));
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(ObjectOutcome::Failed {
            stage: ObjectState::Chunked,
            error: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["stage"], "chunked");
    }
}
