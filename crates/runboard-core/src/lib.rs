pub mod store;
pub mod view;
pub mod wire;

pub use store::{MergeSummary, ObserverId, RunStateStore, StoreObserver, StoreSnapshot};
pub use view::SortedView;
pub use wire::{decode_frame, FrameError, RunsFrame, DEFAULT_MAX_FRAME_BYTES};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{btree_map, BTreeMap};

/// One execution of a job, as last reported by the server.
///
/// A record is always replaced wholesale; fields the server omits are not
/// carried over from an earlier version of the same run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub run_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub job_id: String,
    /// State exactly as the server spelled it; see [`RunRecord::run_state`].
    pub state: String,
    #[serde(default)]
    pub meta: RunMeta,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, job_id: impl Into<String>, state: RunState) -> Self {
        Self {
            run_id: run_id.into(),
            job_id: job_id.into(),
            state: state.as_str().to_string(),
            meta: RunMeta::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_schedule_time(mut self, schedule_time: impl Into<String>) -> Self {
        self.meta.schedule_time = Some(schedule_time.into());
        self
    }

    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.meta.start_time = Some(start_time.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.meta.elapsed = Some(elapsed);
        self
    }

    pub fn run_state(&self) -> RunState {
        RunState::from(self.state.as_str())
    }

    pub fn schedule_time(&self) -> Option<&str> {
        self.meta.schedule_time.as_deref()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Seconds since the run started; absent until the run has measurable time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Known execution states. Labels the dashboard does not recognize map to
/// `Unknown` and are still shown as sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    New,
    Scheduled,
    Waiting,
    Starting,
    Running,
    Succeeded,
    Failed,
    Error,
    Skipped,
    Unknown,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::New => "new",
            RunState::Scheduled => "scheduled",
            RunState::Waiting => "waiting",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Error => "error",
            RunState::Skipped => "skipped",
            RunState::Unknown => "unknown",
        }
    }
}

impl From<&str> for RunState {
    fn from(label: &str) -> Self {
        match label {
            "new" => RunState::New,
            "scheduled" => RunState::Scheduled,
            "waiting" => RunState::Waiting,
            "starting" => RunState::Starting,
            "running" => RunState::Running,
            "succeeded" | "success" => RunState::Succeeded,
            "failed" | "failure" => RunState::Failed,
            "error" => RunState::Error,
            "skipped" => RunState::Skipped,
            _ => RunState::Unknown,
        }
    }
}

/// A partial update: zero or more complete run records keyed by run id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaBatch {
    runs: BTreeMap<String, RunRecord>,
}

impl DeltaBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from records; a later record for the same run id wins.
    pub fn from_records(records: impl IntoIterator<Item = RunRecord>) -> Self {
        let mut batch = Self::new();
        for record in records {
            batch.insert(record);
        }
        batch
    }

    pub fn insert(&mut self, record: RunRecord) -> Option<RunRecord> {
        self.runs.insert(record.run_id.clone(), record)
    }

    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.values()
    }

    pub fn run_ids(&self) -> impl Iterator<Item = &str> {
        self.runs.keys().map(String::as_str)
    }

    /// Validates a keyed mapping as received on the wire.
    pub fn try_from_map(runs: BTreeMap<String, RunRecord>) -> Result<Self, FrameError> {
        for (key, record) in &runs {
            if key != &record.run_id {
                return Err(FrameError::KeyMismatch {
                    key: key.clone(),
                    run_id: record.run_id.clone(),
                });
            }
            if let Some(elapsed) = record.meta.elapsed {
                if !elapsed.is_finite() || elapsed < 0.0 {
                    return Err(FrameError::InvalidElapsed {
                        run_id: key.clone(),
                        elapsed,
                    });
                }
            }
        }
        Ok(Self { runs })
    }
}

impl IntoIterator for DeltaBatch {
    type Item = (String, RunRecord);
    type IntoIter = btree_map::IntoIter<String, RunRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.runs.into_iter()
    }
}

/// Accepts ids sent either as strings or as bare numbers.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_record_keeps_unknown_fields_and_defaults_meta() {
        let record: RunRecord = serde_json::from_str(
            r#"{
                "run_id": "r7",
                "job_id": 42,
                "state": "success",
                "times": {"schedule": "2026-02-07T21:00:00Z"},
                "args": {"date": "2026-02-07"}
            }"#,
        )
        .expect("parse run");

        assert_eq!(record.job_id, "42");
        assert_eq!(record.state, "success");
        assert_eq!(record.run_state(), RunState::Succeeded);
        assert_eq!(record.meta, RunMeta::default());
        assert!(record.extra.contains_key("times"));
        assert!(record.extra.contains_key("args"));
    }

    #[test]
    fn run_meta_separates_known_and_extra_keys() {
        let meta: RunMeta = serde_json::from_str(
            r#"{"schedule_time":"t0","elapsed":1.5,"pid":4312,"hostname":"worker-1"}"#,
        )
        .expect("parse meta");

        assert_eq!(meta.schedule_time.as_deref(), Some("t0"));
        assert_eq!(meta.start_time, None);
        assert_eq!(meta.elapsed, Some(1.5));
        assert_eq!(meta.extra.len(), 2);
    }

    #[test]
    fn run_state_accepts_scheduler_aliases() {
        assert_eq!(RunState::from("failure"), RunState::Failed);
        assert_eq!(RunState::from("succeeded"), RunState::Succeeded);
        assert_eq!(RunState::from("retrying"), RunState::Unknown);
        assert_eq!(RunState::from("Running"), RunState::Unknown);
    }

    #[test]
    fn delta_batch_rejects_key_mismatch_and_negative_elapsed() {
        let mut runs = BTreeMap::new();
        runs.insert("r1".to_string(), RunRecord::new("r2", "j1", RunState::Running));
        assert!(matches!(
            DeltaBatch::try_from_map(runs),
            Err(FrameError::KeyMismatch { .. })
        ));

        let mut runs = BTreeMap::new();
        runs.insert(
            "r1".to_string(),
            RunRecord::new("r1", "j1", RunState::Running).with_elapsed(-0.5),
        );
        assert!(matches!(
            DeltaBatch::try_from_map(runs),
            Err(FrameError::InvalidElapsed { .. })
        ));
    }

    #[test]
    fn delta_batch_from_records_keeps_last_duplicate() {
        let batch = DeltaBatch::from_records([
            RunRecord::new("r1", "j1", RunState::Scheduled),
            RunRecord::new("r1", "j1", RunState::Running),
        ]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get("r1").map(RunRecord::run_state), Some(RunState::Running));
    }
}
