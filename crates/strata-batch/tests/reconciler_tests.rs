//! End-to-end reconciler scenarios against the in-memory clients.

use std::sync::Arc;

use chrono::{Duration, Utc};

use strata_batch::clients::memory::{
    InMemoryClusterClient, InMemoryJobLogStream, InMemoryMetricsClient, InMemoryQueueClient,
    InMemorySpecStore, InMemoryStateStore,
};
use strata_batch::clients::{
    ContainerTermination, StateStore, WorkerBatch, WorkerContainer, WorkerPod,
};
use strata_batch::config::ReconcilerConfig;
use strata_batch::queue::{QueueMetrics, QueueUrl, expected_queue_url};
use strata_batch::reconciler::{Clients, Reconciler};
use strata_batch::spec::BatchJobSpec;
use strata_batch::state::{JobState, JobStatus, LIVENESS_PHASE};
use strata_core::JobKey;

const QUEUE_URL_BASE: &str = "https://queue.strata.local/jobs";

struct World {
    state_store: Arc<InMemoryStateStore>,
    queues: Arc<InMemoryQueueClient>,
    cluster: Arc<InMemoryClusterClient>,
    specs: Arc<InMemorySpecStore>,
    batch_metrics: Arc<InMemoryMetricsClient>,
    log_stream: Arc<InMemoryJobLogStream>,
    reconciler: Reconciler,
}

fn world() -> World {
    let state_store = Arc::new(InMemoryStateStore::new());
    let queues = Arc::new(InMemoryQueueClient::new());
    let cluster = Arc::new(InMemoryClusterClient::new());
    let specs = Arc::new(InMemorySpecStore::new());
    let batch_metrics = Arc::new(InMemoryMetricsClient::new());
    let log_stream = Arc::new(InMemoryJobLogStream::new());

    let clients = Clients {
        state_store: state_store.clone(),
        queues: queues.clone(),
        cluster: cluster.clone(),
        specs: specs.clone(),
        batch_metrics: batch_metrics.clone(),
        log_stream: log_stream.clone(),
    };
    let reconciler = Reconciler::new(ReconcilerConfig::new(QUEUE_URL_BASE), clients);

    World {
        state_store,
        queues,
        cluster,
        specs,
        batch_metrics,
        log_stream,
        reconciler,
    }
}

fn job_key() -> JobKey {
    JobKey::new("image-classifier", "job1")
}

/// A running-state record old enough to be past every grace window.
fn running_state(key: &JobKey) -> JobState {
    let now = Utc::now();
    let mut state = JobState::new(key.clone(), JobStatus::Running, now - Duration::seconds(60));
    state
        .last_updated
        .insert("enqueuing".to_string(), now - Duration::seconds(90));
    state
}

impl World {
    fn seed_queue(&self, key: &JobKey, age_secs: i64) -> QueueUrl {
        let url = expected_queue_url(QUEUE_URL_BASE, key);
        self.queues
            .insert_queue(url.clone(), Utc::now() - Duration::seconds(age_secs));
        url
    }

    fn seed_batch(&self, key: &JobKey, active: u32, succeeded: u32, failed: u32) {
        self.cluster.insert_batch(WorkerBatch {
            api_name: key.api_name.clone(),
            job_id: key.id.clone(),
            active,
            succeeded,
            failed,
        });
    }

    fn seed_spec(&self, key: &JobKey, workers: u32, total: u64, timeout_secs: Option<u64>) {
        self.specs.insert_spec(
            key.id.clone(),
            BatchJobSpec {
                workers,
                total_batch_count: total,
                timeout_secs,
                start_time: Utc::now() - Duration::seconds(300),
            },
        );
    }
}

fn terminated_pod(status: &str, exit_code: i32, reason: &str) -> WorkerPod {
    WorkerPod {
        name: "worker-0".to_string(),
        status: status.to_string(),
        containers: vec![WorkerContainer {
            last_termination: None,
            termination: Some(ContainerTermination {
                exit_code,
                reason: reason.to_string(),
            }),
        }],
    }
}

#[tokio::test]
async fn happy_path_succeeds_on_the_second_pass() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    let url = world.seed_queue(&key, 600);
    world.seed_batch(&key, 0, 4, 0);
    world.seed_spec(&key, 4, 1000, None);
    world.batch_metrics.set_succeeded_count(key.id.clone(), 1000);

    // Pass 1: first observation of the empty queue defers the decision.
    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.reconciler.is_deferred(&key.id));
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Running));
    assert!(world.queues.contains(&url));

    // Pass 2: the agreement held, so the job succeeds and runtime goes.
    world.reconciler.reconcile_once().await.unwrap();
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Succeeded));
    assert!(!world.reconciler.is_deferred(&key.id));
    assert!(!world.queues.contains(&url));
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("completed successfully"))
    );
}

#[tokio::test]
async fn lagging_success_metrics_resolve_to_completed_with_failures() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 0, 4, 0);
    world.seed_spec(&key, 4, 1000, None);
    world.batch_metrics.set_succeeded_count(key.id.clone(), 995);

    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.reconciler.is_deferred(&key.id));
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Running));

    world.reconciler.reconcile_once().await.unwrap();
    assert_eq!(
        world.state_store.status_of(&key),
        Some(JobStatus::CompletedWithFailures)
    );
    assert!(!world.cluster.contains_batch(&key.id));
}

#[tokio::test]
async fn oom_killed_worker_classifies_worker_oom_in_one_pass() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 3, 0, 1);
    world.seed_spec(&key, 4, 1000, None);
    world
        .cluster
        .insert_pods(key.id.clone(), vec![terminated_pod("failed", 137, "OOMKilled")]);

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::WorkerOom));
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("ran out of memory"))
    );
}

#[tokio::test]
async fn failed_worker_with_termination_detail_classifies_worker_error() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 3, 0, 1);
    world.seed_spec(&key, 4, 1000, None);
    world
        .cluster
        .insert_pods(key.id.clone(), vec![terminated_pod("failed", 1, "Error")]);

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::WorkerError));
    let lines = world.log_stream.lines_for(&key);
    assert!(lines.iter().any(|line| {
        line.contains("at least one worker had status failed")
            && line.contains("for reason error")
            && line.contains("(exit_code=1)")
    }));
}

#[tokio::test]
async fn failed_worker_without_detail_reports_unknown_reason() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 3, 0, 1);
    world.seed_spec(&key, 4, 1000, None);

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::WorkerError));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("workers were killed for unknown reason"))
    );
}

#[tokio::test]
async fn job_past_its_timeout_is_timed_out_in_one_pass() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 4, 0, 0);
    // Started 300s ago with a 60s timeout.
    world.seed_spec(&key, 4, 1000, Some(60));

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::TimedOut));
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("timeout of 60 seconds"))
    );
}

#[tokio::test]
async fn missing_queue_past_grace_is_an_unexpected_error() {
    let mut world = world();
    let key = job_key();

    // Queue is absent; the enqueuing stamp is 45s old against a 30s grace.
    let now = Utc::now();
    let mut state = JobState::new(key.clone(), JobStatus::Running, now - Duration::seconds(45));
    state
        .last_updated
        .insert("enqueuing".to_string(), now - Duration::seconds(45));
    world.state_store.insert_job(state);
    world.seed_batch(&key, 4, 0, 0);

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(
        world.state_store.status_of(&key),
        Some(JobStatus::UnexpectedError)
    );
    // Runtime teardown happens in the same pass.
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("was not found"))
    );
}

#[tokio::test]
async fn missing_queue_within_grace_is_left_alone() {
    let mut world = world();
    let key = job_key();

    let now = Utc::now();
    let mut state = JobState::new(key.clone(), JobStatus::Running, now);
    state.last_updated.insert("enqueuing".to_string(), now - Duration::seconds(10));
    world.state_store.insert_job(state);
    world.seed_batch(&key, 4, 0, 0);

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Running));
    assert!(world.cluster.contains_batch(&key.id));
}

#[tokio::test]
async fn stale_enqueuing_liveness_fails_the_enqueue() {
    let mut world = world();
    let key = job_key();

    let now = Utc::now();
    let mut state = JobState::new(key.clone(), JobStatus::Enqueuing, now - Duration::seconds(120));
    state
        .last_updated
        .insert(LIVENESS_PHASE.to_string(), now - Duration::seconds(120));
    world.state_store.insert_job(state);
    world.seed_queue(&key, 600);

    world.reconciler.reconcile_once().await.unwrap();

    assert_eq!(
        world.state_store.status_of(&key),
        Some(JobStatus::EnqueueFailed)
    );
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("enqueuing liveness check failed"))
    );
}

#[tokio::test]
async fn nonempty_queue_with_no_active_workers_confirms_across_two_passes() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    let url = world.seed_queue(&key, 600);
    world.queues.set_metrics(
        &url,
        QueueMetrics {
            visible: 5,
            in_flight: 0,
        },
    );
    world.seed_batch(&key, 0, 4, 0);
    world.seed_spec(&key, 4, 1000, None);

    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.reconciler.is_deferred(&key.id));
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Running));

    world.reconciler.reconcile_once().await.unwrap();
    assert_eq!(
        world.state_store.status_of(&key),
        Some(JobStatus::UnexpectedError)
    );
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("metrics indicate that job is still in progress"))
    );
}

#[tokio::test]
async fn empty_queue_with_missing_workers_is_bounded_to_two_cycles() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    // Queue drained but only 3 of 4 workers exited cleanly.
    world.seed_batch(&key, 0, 3, 0);
    world.seed_spec(&key, 4, 1000, None);
    world.batch_metrics.set_succeeded_count(key.id.clone(), 1000);

    // The deferred path re-enters at most once: pass 1 defers, pass 2
    // commits the unexpected-error classification.
    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.reconciler.is_deferred(&key.id));
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Running));

    world.reconciler.reconcile_once().await.unwrap();
    assert_eq!(
        world.state_store.status_of(&key),
        Some(JobStatus::UnexpectedError)
    );
    assert!(!world.reconciler.is_deferred(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("queue is empty but cluster state"))
    );
}

#[tokio::test]
async fn orphan_batch_is_deleted_in_one_pass() {
    let mut world = world();
    let key = JobKey::new("image-classifier", "orphan");

    world.seed_batch(&key, 2, 0, 0);

    world.reconciler.reconcile_once().await.unwrap();

    assert!(!world.cluster.contains_batch(&key.id));
    assert_eq!(world.cluster.deleted_batches(), vec![key]);
}

#[tokio::test]
async fn orphan_queue_is_deleted_only_past_the_creation_grace() {
    let mut world = world();
    let fresh_key = JobKey::new("image-classifier", "fresh");
    let stale_key = JobKey::new("image-classifier", "stale");

    let fresh_url = world.seed_queue(&fresh_key, 10);
    let stale_url = world.seed_queue(&stale_key, 60);

    world.reconciler.reconcile_once().await.unwrap();

    // The fresh queue may belong to a submission still in flight.
    assert!(world.queues.contains(&fresh_url));
    assert!(!world.queues.contains(&stale_url));
}

#[tokio::test]
async fn orphan_batches_and_queues_are_cleaned_in_the_same_pass() {
    let mut world = world();
    let batch_key = JobKey::new("image-classifier", "batchorphan");
    let queue_key = JobKey::new("image-classifier", "queueorphan");

    world.seed_batch(&batch_key, 1, 0, 0);
    let batch_queue_url = world.seed_queue(&batch_key, 600);
    let orphan_queue_url = world.seed_queue(&queue_key, 600);

    world.reconciler.reconcile_once().await.unwrap();

    assert!(!world.cluster.contains_batch(&batch_key.id));
    assert!(!world.queues.contains(&batch_queue_url));
    assert!(!world.queues.contains(&orphan_queue_url));
}

#[tokio::test]
async fn terminal_status_is_never_rewritten() {
    let mut world = world();
    let key = job_key();

    let mut state = running_state(&key);
    state.status = JobStatus::Succeeded;
    world.state_store.insert_job(state);
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 0, 4, 0);

    // Recovers the crashed prior pass: marker and runtime go, status stays.
    world.reconciler.reconcile_once().await.unwrap();

    assert!(!world.state_store.has_marker(&key));
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(world.state_store.status_writes().is_empty());
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Succeeded));

    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.state_store.status_writes().is_empty());
}

#[tokio::test]
async fn unreadable_state_record_tears_the_job_down() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_orphan_marker(key.clone());
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 2, 0, 0);

    world.reconciler.reconcile_once().await.unwrap();

    assert!(!world.state_store.has_marker(&key));
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("terminating job and cleaning up job resources"))
    );
}

#[tokio::test]
async fn failed_spec_download_tears_the_job_down() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 4, 0, 0);
    // No spec object seeded.

    world.reconciler.reconcile_once().await.unwrap();

    assert!(!world.state_store.has_marker(&key));
    assert!(!world.cluster.contains_batch(&key.id));
    assert!(
        world
            .log_stream
            .lines_for(&key)
            .iter()
            .any(|line| line.contains("terminating job and cleaning up job resources"))
    );
}

#[tokio::test]
async fn deferred_set_is_pruned_to_in_progress_jobs() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 0, 4, 0);
    world.seed_spec(&key, 4, 1000, None);
    world.batch_metrics.set_succeeded_count(key.id.clone(), 1000);

    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.reconciler.is_deferred(&key.id));

    // The job leaves the in-progress set out-of-band (e.g. manual stop).
    world.state_store.delete_in_progress_marker(&key).await.unwrap();

    world.reconciler.reconcile_once().await.unwrap();
    assert!(!world.reconciler.is_deferred(&key.id));
}

#[tokio::test]
async fn cached_spec_is_evicted_after_the_job_leaves_in_progress() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 0, 4, 0);
    world.seed_spec(&key, 4, 1000, None);
    world.batch_metrics.set_succeeded_count(key.id.clone(), 1000);

    world.reconciler.reconcile_once().await.unwrap();
    assert!(world.reconciler.has_cached_spec(&key.id));

    // Pass 2 finalizes; pass 3 reaps the marker; pass 4 evicts the cache.
    world.reconciler.reconcile_once().await.unwrap();
    world.reconciler.reconcile_once().await.unwrap();
    assert!(!world.state_store.has_marker(&key));

    world.reconciler.reconcile_once().await.unwrap();
    assert!(!world.reconciler.has_cached_spec(&key.id));
}

#[tokio::test]
async fn finalization_is_idempotent_across_crashed_passes() {
    let mut world = world();
    let key = job_key();

    world.state_store.insert_job(running_state(&key));
    world.seed_queue(&key, 600);
    world.seed_batch(&key, 0, 4, 0);
    world.seed_spec(&key, 4, 1000, None);
    world.batch_metrics.set_succeeded_count(key.id.clone(), 1000);

    world.reconciler.reconcile_once().await.unwrap();
    world.reconciler.reconcile_once().await.unwrap();
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Succeeded));

    // Re-running terminal recovery passes changes nothing observable.
    world.reconciler.reconcile_once().await.unwrap();
    world.reconciler.reconcile_once().await.unwrap();
    assert_eq!(world.state_store.status_of(&key), Some(JobStatus::Succeeded));
    assert_eq!(
        world.state_store.status_writes(),
        vec![(key.clone(), JobStatus::Succeeded)]
    );
}
