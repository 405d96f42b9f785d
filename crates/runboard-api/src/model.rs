use runboard_core::deserialize_id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Full job document; the server decides which fields it carries.
pub type JobRecord = BTreeMap<String, Value>;

/// One row of the job list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    #[serde(deserialize_with = "deserialize_id")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_str: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl JobSummary {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            program_str: None,
            schedule_str: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn program(&self) -> &str {
        self.program_str.as_deref().unwrap_or_default()
    }

    pub fn schedule(&self) -> &str {
        self.schedule_str.as_deref().unwrap_or_default()
    }
}
