use crate::store::{RunStateStore, StoreSnapshot};
use crate::RunRecord;
use std::cmp::Ordering;

/// Runs ordered by `meta.schedule_time`, earliest first.
///
/// Ties keep the store's run id order; runs without a schedule time go last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedView {
    runs: Vec<RunRecord>,
}

impl SortedView {
    pub fn compute(store: &RunStateStore) -> Self {
        Self::from_records(store.records())
    }

    pub fn compute_snapshot(snapshot: &StoreSnapshot) -> Self {
        Self::from_records(snapshot.records())
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RunRecord>) -> Self {
        let mut runs: Vec<RunRecord> = records.into_iter().cloned().collect();
        runs.sort_by(|left, right| compare_schedule(left, right));
        Self { runs }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RunRecord> {
        self.runs.iter()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn position(&self, run_id: &str) -> Option<usize> {
        self.runs.iter().position(|run| run.run_id == run_id)
    }

    pub fn run_ids(&self) -> Vec<&str> {
        self.runs.iter().map(|run| run.run_id.as_str()).collect()
    }

    pub fn into_runs(self) -> Vec<RunRecord> {
        self.runs
    }
}

fn compare_schedule(left: &RunRecord, right: &RunRecord) -> Ordering {
    match (left.schedule_time(), right.schedule_time()) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
