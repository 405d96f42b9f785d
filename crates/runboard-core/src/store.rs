//! Authoritative run table for one live view.
//!
//! The store is mutated only through [`RunStateStore::merge`]; observers see
//! it by shared reference after every merge and cannot change it.

use crate::{DeltaBatch, RunRecord};
use std::collections::BTreeMap;
use std::fmt;

pub type StoreObserver = Box<dyn FnMut(&RunStateStore) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
}

#[derive(Default)]
pub struct RunStateStore {
    runs: BTreeMap<String, RunRecord>,
    observers: Vec<(ObserverId, StoreObserver)>,
    next_observer: u64,
    revision: u64,
}

impl fmt::Debug for RunStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunStateStore")
            .field("runs", &self.runs.len())
            .field("observers", &self.observers.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl RunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the record of every run in `batch`, inserting unknown runs.
    ///
    /// Runs not mentioned in the batch are left untouched; nothing is ever
    /// evicted. Observers are notified exactly once, even for an empty batch.
    pub fn merge(&mut self, batch: DeltaBatch) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for (run_id, record) in batch {
            if self.runs.insert(run_id, record).is_some() {
                summary.replaced += 1;
            } else {
                summary.inserted += 1;
            }
        }
        self.revision += 1;
        self.notify();
        summary
    }

    pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&RunStateStore) + Send + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            runs: self.runs.clone(),
            revision: self.revision,
        }
    }

    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Records in run id order.
    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.values()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of merges applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn notify(&mut self) {
        let mut observers = std::mem::take(&mut self.observers);
        for (_, observer) in observers.iter_mut() {
            observer(&*self);
        }
        self.observers = observers;
    }
}

/// Point-in-time copy of the store; later merges do not show up here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    runs: BTreeMap<String, RunRecord>,
    revision: u64,
}

impl StoreSnapshot {
    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.values()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn run(run_id: &str, state: RunState, schedule_time: &str) -> RunRecord {
        RunRecord::new(run_id, "job-a", state).with_schedule_time(schedule_time)
    }

    #[test]
    fn last_write_wins_across_interleaved_batches() {
        let mut store = RunStateStore::new();
        store.merge(DeltaBatch::from_records([
            run("r1", RunState::Scheduled, "t1"),
            run("r2", RunState::Scheduled, "t2"),
        ]));
        store.merge(DeltaBatch::from_records([run("r2", RunState::Running, "t2")]));
        store.merge(DeltaBatch::from_records([
            run("r1", RunState::Running, "t1"),
            run("r3", RunState::Waiting, "t3"),
        ]));
        store.merge(DeltaBatch::from_records([run("r1", RunState::Failed, "t1")
            .with_elapsed(4.0)]));

        assert_eq!(store.get("r1"), Some(&run("r1", RunState::Failed, "t1").with_elapsed(4.0)));
        assert_eq!(store.get("r2").map(RunRecord::run_state), Some(RunState::Running));
        assert_eq!(store.get("r3").map(RunRecord::run_state), Some(RunState::Waiting));
    }

    #[test]
    fn replacement_drops_fields_missing_from_the_new_record() {
        let mut store = RunStateStore::new();
        store.merge(DeltaBatch::from_records([run("r1", RunState::Running, "t0")
            .with_start_time("t0")
            .with_elapsed(1.0)]));
        store.merge(DeltaBatch::from_records([RunRecord::new(
            "r1",
            "job-a",
            RunState::Error,
        )]));

        let record = store.get("r1").expect("r1 present");
        assert_eq!(record.meta.start_time, None);
        assert_eq!(record.meta.elapsed, None);
    }

    #[test]
    fn merging_the_same_batch_twice_is_idempotent() {
        let batch = DeltaBatch::from_records([
            run("r1", RunState::Running, "t1"),
            run("r2", RunState::Succeeded, "t0"),
        ]);
        let mut once = RunStateStore::new();
        once.merge(batch.clone());
        let mut twice = RunStateStore::new();
        let first = twice.merge(batch.clone());
        let second = twice.merge(batch);

        assert_eq!(first, MergeSummary { inserted: 2, replaced: 0 });
        assert_eq!(second, MergeSummary { inserted: 0, replaced: 2 });
        assert_eq!(
            once.records().collect::<Vec<_>>(),
            twice.records().collect::<Vec<_>>()
        );
    }

    #[test]
    fn runs_are_never_evicted() {
        let mut store = RunStateStore::new();
        store.merge(DeltaBatch::from_records([run("old", RunState::Running, "t0")]));
        for idx in 0..25 {
            store.merge(DeltaBatch::from_records([run(
                &format!("r{idx}"),
                RunState::Scheduled,
                "t1",
            )]));
            store.merge(DeltaBatch::new());
        }

        assert_eq!(store.len(), 26);
        assert_eq!(store.get("old").map(RunRecord::run_state), Some(RunState::Running));
    }

    #[test]
    fn observers_fire_once_per_merge_including_empty_batches() {
        let mut store = RunStateStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let id = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        store.merge(DeltaBatch::from_records([run("r1", RunState::Running, "t0")]));
        store.merge(DeltaBatch::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.merge(DeltaBatch::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn observer_sees_post_merge_contents() {
        let mut store = RunStateStore::new();
        let sizes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = sizes.clone();
        store.subscribe(move |store| {
            sink.lock().expect("sizes lock").push((store.len(), store.revision()));
        });

        store.merge(DeltaBatch::from_records([run("r1", RunState::Running, "t0")]));
        store.merge(DeltaBatch::from_records([run("r2", RunState::Running, "t0")]));

        assert_eq!(*sizes.lock().expect("sizes lock"), vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut store = RunStateStore::new();
        store.merge(DeltaBatch::from_records([run("r1", RunState::Running, "t0")]));
        let snapshot = store.snapshot();
        store.merge(DeltaBatch::from_records([
            run("r1", RunState::Succeeded, "t0"),
            run("r2", RunState::Scheduled, "t1"),
        ]));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.revision(), 1);
        assert_eq!(snapshot.get("r1").map(RunRecord::run_state), Some(RunState::Running));
        assert_eq!(store.snapshot().len(), 2);
    }
}
