//! Worker lifecycle and execution orchestration
//!
//! Drives the register, poll, execute, report loop against the
//! coordinator. One work package at a time is fanned out across the
//! compute pool in contiguous pair chunks; results accumulate in a shared
//! batch that is flushed asynchronously. A background heartbeat keeps the
//! registration alive and is the only path to the terminal Dead state.

pub mod batch;
pub mod benchmark;
pub mod client;
pub mod heartbeat;
pub mod wire;

use std::sync::{mpsc, Arc};
use std::thread;

use parking_lot::RwLock;

use crate::config::WorkerConfig;
use crate::engines::compute::{AlignmentEngine, EngineOptions};
use crate::engines::core::parallel;

use batch::ResultBatch;
use client::{ClientError, CoordinatorClient};
use wire::{Alignment, AlignmentRecord, CapabilityReport, WorkPackage, WorkResult, WorkerId};

/// Worker operation result type
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Error types for worker orchestration
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("work package {package} references unknown sequence {sequence}")]
    MalformedPackage { package: String, sequence: String },
}

/// Lifecycle states of one worker process.
///
/// `Dead` is terminal; it is only reached through a heartbeat rejection or
/// an explicit shutdown, and every loop observes it cooperatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Registering,
    Polling,
    Executing,
    Dead,
}

/// Identity and lifecycle state shared between the main loop, the chunk
/// tasks, and the heartbeat thread.
pub struct WorkerState {
    id: RwLock<Option<WorkerId>>,
    status: RwLock<WorkerStatus>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            id: RwLock::new(None),
            status: RwLock::new(WorkerStatus::Idle),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.read()
    }

    pub fn is_dead(&self) -> bool {
        self.status() == WorkerStatus::Dead
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.id.read().clone()
    }

    /// Move to a new status. Dead is terminal and never left.
    pub(crate) fn set_status(&self, status: WorkerStatus) {
        let mut current = self.status.write();
        if *current != WorkerStatus::Dead {
            *current = status;
        }
    }

    pub(crate) fn set_worker_id(&self, worker: WorkerId) {
        *self.id.write() = Some(worker);
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Executed,
    Aborted,
    NoWork,
    TransportError,
}

/// Owns the worker lifecycle and turns work packages into result batches.
pub struct WorkerOrchestrator<C: CoordinatorClient> {
    client: Arc<C>,
    config: WorkerConfig,
    state: Arc<WorkerState>,
}

impl<C: CoordinatorClient + 'static> WorkerOrchestrator<C> {
    pub fn new(client: C, config: WorkerConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
            state: Arc::new(WorkerState::new()),
        }
    }

    pub fn state(&self) -> Arc<WorkerState> {
        Arc::clone(&self.state)
    }

    /// Register, start the heartbeat, and poll for work until Dead.
    pub fn run(&self, report: CapabilityReport) {
        let worker = self.register(&report);
        let heartbeat = heartbeat::spawn(
            Arc::clone(&self.client),
            Arc::clone(&self.state),
            self.config.heartbeat_interval,
        );

        self.state.set_status(WorkerStatus::Polling);
        log::info!("worker {} registered; waiting for work", worker.id);

        while !self.state.is_dead() {
            match self.poll_once(&worker) {
                PollOutcome::Executed | PollOutcome::Aborted => {}
                PollOutcome::NoWork => thread::sleep(self.config.no_work_delay),
                PollOutcome::TransportError => thread::sleep(self.config.poll_retry),
            }
        }

        log::info!("worker is dead; stopping poll loop");
        if heartbeat.join().is_err() {
            log::error!("heartbeat thread panicked");
        }
    }

    /// Register with the coordinator, retrying indefinitely on failure.
    fn register(&self, report: &CapabilityReport) -> WorkerId {
        self.state.set_status(WorkerStatus::Registering);
        loop {
            match self.client.register(report) {
                Ok(worker) => {
                    self.state.set_worker_id(worker.clone());
                    return worker;
                }
                Err(error) => {
                    log::warn!(
                        "registration failed, retrying in {:?}: {}",
                        self.config.register_backoff,
                        error
                    );
                    thread::sleep(self.config.register_backoff);
                }
            }
        }
    }

    /// One poll attempt, executing the package if one is handed out.
    pub(crate) fn poll_once(&self, worker: &WorkerId) -> PollOutcome {
        match self.client.poll_work(worker) {
            Err(error) => {
                log::warn!("failed to poll for work: {}", error);
                PollOutcome::TransportError
            }
            Ok(None) => {
                log::debug!("no work available");
                PollOutcome::NoWork
            }
            Ok(Some(package)) => {
                self.state.set_status(WorkerStatus::Executing);
                let outcome = match self.execute_package(worker, package) {
                    Ok(()) => PollOutcome::Executed,
                    Err(error) => {
                        log::error!("aborted package execution: {}", error);
                        PollOutcome::Aborted
                    }
                };
                self.state.set_status(WorkerStatus::Polling);
                outcome
            }
        }
    }

    /// Execute one package: resolve and validate sequences, fan the pairs
    /// out across the compute pool, batch and flush results.
    pub(crate) fn execute_package(
        &self,
        worker: &WorkerId,
        mut package: WorkPackage,
    ) -> WorkerResult<()> {
        let scoring = package.scoring();
        self.resolve_sequences(worker, &mut package)?;

        // Every pair must resolve before any alignment runs; a missing id
        // aborts the package with zero partial submissions.
        let mut work_items = Vec::with_capacity(package.pairs.len());
        for pair in &package.pairs {
            let query = package.sequences.get(&pair.query).ok_or_else(|| {
                WorkerError::MalformedPackage {
                    package: package.id.clone(),
                    sequence: pair.query.clone(),
                }
            })?;
            let target = package.sequences.get(&pair.target).ok_or_else(|| {
                WorkerError::MalformedPackage {
                    package: package.id.clone(),
                    sequence: pair.target.clone(),
                }
            })?;
            work_items.push((pair, query.as_str(), target.as_str()));
        }

        let lanes = parallel::available_lanes(self.config.reserved_lanes);
        let chunk_count = lanes.min(work_items.len()).max(1);
        let chunks = parallel::partition(work_items.len(), chunk_count);
        let engine = AlignmentEngine::new(EngineOptions {
            lanes: (lanes / chunk_count).max(1),
            memory_budget: self.config.memory_budget,
        });

        let results = ResultBatch::new(self.config.batch_size);
        let (flush_tx, flush_rx) = mpsc::channel::<Vec<AlignmentRecord>>();

        let flusher = {
            let client = Arc::clone(&self.client);
            let package_id = package.id.clone();
            thread::spawn(move || {
                for records in flush_rx {
                    let count = records.len();
                    let batch = WorkResult {
                        alignments: records,
                    };
                    match client.submit_results(&package_id, &batch) {
                        Ok(()) => log::debug!("submitted batch of {} records", count),
                        Err(error) => {
                            log::warn!("failed to submit batch of {} records: {}", count, error)
                        }
                    }
                }
            })
        };

        log::info!(
            "executing package {} with {} pairs across {} chunks",
            package.id,
            work_items.len(),
            chunks.len()
        );

        let pool = parallel::compute_pool(lanes);
        pool.scope(|scope| {
            for chunk in &chunks {
                let items = &work_items[chunk.clone()];
                let flush_tx = flush_tx.clone();
                let results = &results;
                let engine = &engine;
                let state = &self.state;
                let scoring = &scoring;

                scope.spawn(move |_| {
                    for &(pair, query, target) in items {
                        if state.is_dead() {
                            break;
                        }

                        let record = match engine.align(query, target, scoring) {
                            Ok(result) => {
                                AlignmentRecord::success(pair.clone(), Alignment::from(&result))
                            }
                            Err(error) => {
                                log::error!(
                                    "alignment failed for pair ({}, {}): {}",
                                    pair.query,
                                    pair.target,
                                    error
                                );
                                AlignmentRecord::failure(pair.clone(), error.to_string())
                            }
                        };

                        if let Some(full) = results.push(record) {
                            let _ = flush_tx.send(full);
                        }
                    }
                });
            }
        });

        // All chunk tasks have joined; flush the final partial batch.
        let rest = results.drain();
        if !rest.is_empty() {
            let _ = flush_tx.send(rest);
        }
        drop(flush_tx);
        if flusher.join().is_err() {
            log::error!("result flusher thread panicked");
        }

        Ok(())
    }

    /// Fetch the sequences of a package that arrived without inlined data.
    fn resolve_sequences(
        &self,
        worker: &WorkerId,
        package: &mut WorkPackage,
    ) -> WorkerResult<()> {
        if !package.sequences.is_empty() {
            return Ok(());
        }

        let mut fetched = 0usize;
        for pair in &package.pairs {
            for id in [&pair.query, &pair.target] {
                if !package.sequences.contains_key(id) {
                    let sequence = self.client.fetch_sequence(&package.id, id, worker)?;
                    package.sequences.insert(id.clone(), sequence);
                    fetched += 1;
                }
            }
        }

        if fetched > 0 {
            log::debug!("fetched {} sequences for package {}", fetched, package.id);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::wire::{QueryTargetPair, Sequence, SequenceId};

    enum PollScript {
        Package(WorkPackage),
        Fail,
    }

    #[derive(Default)]
    struct MockInner {
        register_failures: usize,
        register_attempts: usize,
        polls: VecDeque<PollScript>,
        submitted: Vec<WorkResult>,
        heartbeat_fail_once: bool,
        heartbeat_reject: bool,
        remote_sequences: HashMap<SequenceId, Sequence>,
    }

    /// Scripted in-memory coordinator.
    #[derive(Default)]
    pub(crate) struct MockCoordinator {
        inner: Mutex<MockInner>,
    }

    impl MockCoordinator {
        fn transport_error() -> ClientError {
            ClientError::UnexpectedStatus(503)
        }

        fn fail_registrations(&self, count: usize) {
            self.inner.lock().register_failures = count;
        }

        fn register_attempts(&self) -> usize {
            self.inner.lock().register_attempts
        }

        fn queue_package(&self, package: WorkPackage) {
            self.inner.lock().polls.push_back(PollScript::Package(package));
        }

        fn queue_poll_failure(&self) {
            self.inner.lock().polls.push_back(PollScript::Fail);
        }

        fn add_remote_sequence(&self, id: &str, sequence: &str) {
            self.inner
                .lock()
                .remote_sequences
                .insert(id.to_string(), sequence.to_string());
        }

        pub(crate) fn fail_next_heartbeat(&self) {
            self.inner.lock().heartbeat_fail_once = true;
        }

        pub(crate) fn reject_heartbeats(&self) {
            self.inner.lock().heartbeat_reject = true;
        }

        fn submitted_batch_sizes(&self) -> Vec<usize> {
            self.inner
                .lock()
                .submitted
                .iter()
                .map(|batch| batch.alignments.len())
                .collect()
        }

        fn submitted_records(&self) -> Vec<AlignmentRecord> {
            self.inner
                .lock()
                .submitted
                .iter()
                .flat_map(|batch| batch.alignments.clone())
                .collect()
        }
    }

    impl CoordinatorClient for MockCoordinator {
        fn register(&self, _report: &CapabilityReport) -> client::ClientResult<WorkerId> {
            let mut inner = self.inner.lock();
            inner.register_attempts += 1;
            if inner.register_failures > 0 {
                inner.register_failures -= 1;
                return Err(Self::transport_error());
            }
            Ok(WorkerId {
                id: "w1".to_string(),
            })
        }

        fn poll_work(&self, _worker: &WorkerId) -> client::ClientResult<Option<WorkPackage>> {
            match self.inner.lock().polls.pop_front() {
                Some(PollScript::Package(package)) => Ok(Some(package)),
                Some(PollScript::Fail) => Err(Self::transport_error()),
                None => Ok(None),
            }
        }

        fn fetch_sequence(
            &self,
            _package_id: &str,
            sequence: &SequenceId,
            _worker: &WorkerId,
        ) -> client::ClientResult<Sequence> {
            self.inner
                .lock()
                .remote_sequences
                .get(sequence)
                .cloned()
                .ok_or(ClientError::UnexpectedStatus(404))
        }

        fn submit_results(
            &self,
            _package_id: &str,
            results: &WorkResult,
        ) -> client::ClientResult<()> {
            self.inner.lock().submitted.push(results.clone());
            Ok(())
        }

        fn heartbeat(&self, _worker: &WorkerId) -> client::ClientResult<()> {
            let mut inner = self.inner.lock();
            if inner.heartbeat_reject {
                return Err(ClientError::UnknownWorker);
            }
            if inner.heartbeat_fail_once {
                inner.heartbeat_fail_once = false;
                return Err(Self::transport_error());
            }
            Ok(())
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            poll_retry: Duration::from_millis(1),
            no_work_delay: Duration::from_millis(1),
            heartbeat_interval: Duration::from_millis(1),
            register_backoff: Duration::from_millis(1),
            batch_size: 3,
            ..WorkerConfig::default()
        }
    }

    fn pair(query: &str, target: &str) -> QueryTargetPair {
        QueryTargetPair {
            query: query.to_string(),
            target: target.to_string(),
        }
    }

    fn package(pairs: Vec<QueryTargetPair>, sequences: &[(&str, &str)]) -> WorkPackage {
        WorkPackage {
            id: "p1".to_string(),
            job_id: "j1".to_string(),
            match_score: 2,
            mismatch_penalty: 1,
            gap_penalty: 1,
            pairs,
            sequences: sequences
                .iter()
                .map(|(id, sequence)| (id.to_string(), sequence.to_string()))
                .collect(),
        }
    }

    fn worker() -> WorkerId {
        WorkerId {
            id: "w1".to_string(),
        }
    }

    #[test]
    fn test_register_retries_until_success() {
        let client = MockCoordinator::default();
        client.fail_registrations(2);
        let orchestrator = WorkerOrchestrator::new(client, test_config());

        let registered = orchestrator.register(&CapabilityReport {
            benchmark_result: 1,
            cpu_cores: 1,
        });

        assert_eq!(registered.id, "w1");
        assert_eq!(orchestrator.client.register_attempts(), 3);
        assert_eq!(orchestrator.state.worker_id(), Some(registered));
    }

    #[test]
    fn test_execute_package_submits_every_pair() {
        let orchestrator = WorkerOrchestrator::new(MockCoordinator::default(), test_config());
        let pairs: Vec<_> = (0..7).map(|_| pair("q1", "t1")).collect();
        let work = package(pairs, &[("q1", "ACGTACGT"), ("t1", "ACGTTCGT")]);

        orchestrator.execute_package(&worker(), work).unwrap();

        let records = orchestrator.client.submitted_records();
        assert_eq!(records.len(), 7);
        assert!(records.iter().all(|record| record.alignment.is_some()));

        let sizes = orchestrator.client.submitted_batch_sizes();
        assert!(sizes.iter().all(|&size| size <= 3));
        assert_eq!(sizes.iter().sum::<usize>(), 7);
    }

    #[test]
    fn test_malformed_package_aborts_without_submitting() {
        let orchestrator = WorkerOrchestrator::new(MockCoordinator::default(), test_config());
        let work = package(
            vec![pair("q1", "t1"), pair("q1", "missing")],
            &[("q1", "ACGT"), ("t1", "ACGT")],
        );

        let error = orchestrator.execute_package(&worker(), work).unwrap_err();
        assert!(matches!(
            error,
            WorkerError::MalformedPackage { ref sequence, .. } if sequence == "missing"
        ));
        assert!(orchestrator.client.submitted_records().is_empty());

        // The worker stays able to poll and execute the next package.
        orchestrator
            .client
            .queue_package(package(vec![pair("q1", "t1")], &[("q1", "A"), ("t1", "A")]));
        assert_eq!(orchestrator.poll_once(&worker()), PollOutcome::Executed);
        assert_eq!(orchestrator.client.submitted_records().len(), 1);
        assert_eq!(orchestrator.state.status(), WorkerStatus::Polling);
    }

    #[test]
    fn test_per_pair_failure_is_recorded_distinctly() {
        let orchestrator = WorkerOrchestrator::new(MockCoordinator::default(), test_config());
        let work = package(
            vec![pair("q1", "t1"), pair("empty", "empty")],
            &[("q1", "ACGT"), ("t1", "ACGT"), ("empty", "")],
        );

        orchestrator.execute_package(&worker(), work).unwrap();

        let records = orchestrator.client.submitted_records();
        assert_eq!(records.len(), 2);
        let failed: Vec<_> = records
            .iter()
            .filter(|record| record.error.is_some())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].pair, pair("empty", "empty"));
    }

    #[test]
    fn test_lazy_sequences_are_fetched() {
        let client = MockCoordinator::default();
        client.add_remote_sequence("q1", "AA");
        client.add_remote_sequence("t1", "ATA");
        let orchestrator = WorkerOrchestrator::new(client, test_config());

        let work = package(vec![pair("q1", "t1")], &[]);
        orchestrator.execute_package(&worker(), work).unwrap();

        let records = orchestrator.client.submitted_records();
        assert_eq!(records.len(), 1);
        let alignment = records[0].alignment.as_ref().unwrap();
        assert_eq!(alignment.query_alignment, "A-A");
        assert_eq!(alignment.target_alignment, "ATA");
    }

    #[test]
    fn test_lazy_fetch_failure_aborts_the_package() {
        let orchestrator = WorkerOrchestrator::new(MockCoordinator::default(), test_config());
        let work = package(vec![pair("q1", "t1")], &[]);

        let error = orchestrator.execute_package(&worker(), work).unwrap_err();
        assert!(matches!(error, WorkerError::Client(_)));
        assert!(orchestrator.client.submitted_records().is_empty());
    }

    #[test]
    fn test_poll_outcomes() {
        let orchestrator = WorkerOrchestrator::new(MockCoordinator::default(), test_config());
        assert_eq!(orchestrator.poll_once(&worker()), PollOutcome::NoWork);

        orchestrator.client.queue_poll_failure();
        assert_eq!(orchestrator.poll_once(&worker()), PollOutcome::TransportError);
    }

    #[test]
    fn test_dead_worker_issues_no_new_pairs() {
        let orchestrator = WorkerOrchestrator::new(MockCoordinator::default(), test_config());
        orchestrator.state.set_status(WorkerStatus::Dead);

        let work = package(vec![pair("q1", "t1")], &[("q1", "ACGT"), ("t1", "ACGT")]);
        orchestrator.execute_package(&worker(), work).unwrap();
        assert!(orchestrator.client.submitted_records().is_empty());
    }

    #[test]
    fn test_dead_status_is_terminal() {
        let state = WorkerState::new();
        state.set_status(WorkerStatus::Dead);
        state.set_status(WorkerStatus::Polling);
        assert_eq!(state.status(), WorkerStatus::Dead);
    }
}
