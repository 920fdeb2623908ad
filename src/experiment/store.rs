//! Persistence boundary for experiments.
//!
//! The relational store behind this trait is out of scope here — only the
//! interface an executor and an HTTP handler need is. [`InMemoryExperimentStore`]
//! is the only implementation; it is sufficient for a single-process API
//! server and for tests, and keeps the rest of the crate decoupled from any
//! particular database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::NotFoundError;
use crate::experiment::Experiment;

/// CRUD surface an experiment executor and API layer need against durable
/// storage.
pub trait ExperimentStore: Send + Sync {
    /// Inserts a new experiment and returns its assigned id.
    fn insert(&self, experiment: Experiment) -> u64;
    /// Replaces the stored record for `experiment.id`.
    fn update(&self, experiment: Experiment);
    /// Fetches a single experiment by id.
    fn get(&self, id: u64) -> Result<Experiment, NotFoundError>;
    /// Lists all experiments, most recently created first.
    fn list(&self) -> Vec<Experiment>;
    /// Removes an experiment, returning an error if it does not exist.
    fn delete(&self, id: u64) -> Result<(), NotFoundError>;
}

/// A process-local, mutex-guarded experiment registry.
#[derive(Default)]
pub struct InMemoryExperimentStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    next_id: u64,
    experiments: HashMap<u64, Experiment>,
}

impl InMemoryExperimentStore {
    /// Creates an empty store, wrapped for sharing across worker threads.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(InMemoryState {
                next_id: 1,
                experiments: HashMap::new(),
            }),
        })
    }
}

impl ExperimentStore for InMemoryExperimentStore {
    fn insert(&self, mut experiment: Experiment) -> u64 {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        let id = state.next_id;
        state.next_id += 1;
        experiment.id = id;
        state.experiments.insert(id, experiment);
        id
    }

    fn update(&self, experiment: Experiment) {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        state.experiments.insert(experiment.id, experiment);
    }

    fn get(&self, id: u64) -> Result<Experiment, NotFoundError> {
        let state = self.inner.lock().expect("store mutex poisoned");
        state.experiments.get(&id).cloned().ok_or(NotFoundError {
            resource: "experiment".to_string(),
            id,
        })
    }

    fn list(&self) -> Vec<Experiment> {
        let state = self.inner.lock().expect("store mutex poisoned");
        let mut experiments: Vec<Experiment> = state.experiments.values().cloned().collect();
        experiments.sort_by(|a, b| b.id.cmp(&a.id));
        experiments
    }

    fn delete(&self, id: u64) -> Result<(), NotFoundError> {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        state
            .experiments
            .remove(&id)
            .map(|_| ())
            .ok_or(NotFoundError {
                resource: "experiment".to_string(),
                id,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::experiment::ExperimentStatus;

    fn sample_experiment() -> Experiment {
        Experiment {
            id: 0,
            name: "test".to_string(),
            config: SimulationConfig::baseline(),
            num_replicas: 10,
            max_workers: 2,
            status: ExperimentStatus::Pending,
            progress_pct: 0,
            replicas: Vec::new(),
            aggregates: None,
            error_message: None,
            seed_base: 42,
            started_at_unix_ms: None,
            ended_at_unix_ms: None,
            duration_secs: None,
        }
    }

    #[test]
    fn insert_assigns_incrementing_ids() {
        let store = InMemoryExperimentStore::new();
        let a = store.insert(sample_experiment());
        let b = store.insert(sample_experiment());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn get_missing_returns_not_found() {
        let store = InMemoryExperimentStore::new();
        assert!(store.get(999).is_err());
    }

    #[test]
    fn update_then_get_round_trips() {
        let store = InMemoryExperimentStore::new();
        let id = store.insert(sample_experiment());
        let mut experiment = store.get(id).unwrap();
        experiment.status = ExperimentStatus::Running;
        store.update(experiment);
        assert_eq!(store.get(id).unwrap().status, ExperimentStatus::Running);
    }

    #[test]
    fn delete_removes_and_reports_missing_on_second_call() {
        let store = InMemoryExperimentStore::new();
        let id = store.insert(sample_experiment());
        assert!(store.delete(id).is_ok());
        assert!(store.delete(id).is_err());
    }

    #[test]
    fn list_orders_most_recent_first() {
        let store = InMemoryExperimentStore::new();
        let a = store.insert(sample_experiment());
        let b = store.insert(sample_experiment());
        let ids: Vec<u64> = store.list().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, a]);
    }
}
