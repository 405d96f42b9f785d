use crate::{DeltaBatch, RunRecord};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Initial frames can carry every known run, so the cap is generous.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// One frame pushed by the runs-live endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunsFrame {
    pub runs: BTreeMap<String, RunRecord>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("run keyed as '{key}' carries run_id '{run_id}'")]
    KeyMismatch { key: String, run_id: String },
    #[error("run '{run_id}' has invalid elapsed time {elapsed}")]
    InvalidElapsed { run_id: String, elapsed: f64 },
}

pub fn decode_frame(bytes: &[u8], max_frame_bytes: usize) -> Result<DeltaBatch, FrameError> {
    let mut raw = bytes;
    if raw.ends_with(b"\n") {
        raw = &raw[..raw.len() - 1];
    }
    if raw.ends_with(b"\r") {
        raw = &raw[..raw.len() - 1];
    }
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    let frame: RunsFrame =
        serde_json::from_slice(raw).map_err(|err| FrameError::Decode(err.to_string()))?;
    DeltaBatch::try_from_map(frame.runs)
}
