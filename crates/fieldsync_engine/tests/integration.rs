//! End-to-end tests for the sync engine over an in-memory store.

use fieldsync_engine::{
    BackgroundScheduler, BackgroundTask, ConnectivityMonitor, MockRemote, PhotoAck, RemoteAck,
    RemoteStore, SyncConfig, SyncOrchestrator, SyncOutcome, SyncResult,
};
use fieldsync_store::{
    BlobRef, FindingStatus, InMemoryBackend, JournalBackend, LocalStore, NewFinding, NewPhoto,
    StoreError, StoreResult, SyncState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn open_store() -> Arc<LocalStore> {
    Arc::new(LocalStore::open(Arc::new(InMemoryBackend::new()) as Arc<dyn JournalBackend>).unwrap())
}

fn capture_finding(store: &LocalStore) -> Uuid {
    store
        .enqueue_finding(NewFinding {
            inspection_id: Uuid::new_v4(),
            checklist_item_id: Uuid::new_v4(),
            status: FindingStatus::Fail,
            response: Some("door latch broken".into()),
            notes: None,
        })
        .unwrap()
        .local_id
}

fn capture_photo(store: &LocalStore) -> Uuid {
    store
        .enqueue_photo(NewPhoto {
            inspection_id: Uuid::new_v4(),
            checklist_item_id: None,
            blob: BlobRef::new("f00d", 128),
            caption: Some("latch close-up".into()),
        })
        .unwrap()
        .local_id
}

fn quick_config() -> SyncConfig {
    SyncConfig::new()
        .with_request_timeout(Duration::from_secs(2))
        .with_reconnect_debounce(Duration::from_millis(10))
        .with_poll_interval(Duration::from_millis(50))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn orchestrator(
    store: Arc<LocalStore>,
    remote: Arc<MockRemote>,
    online: bool,
) -> Arc<SyncOrchestrator> {
    init_tracing();
    Arc::new(SyncOrchestrator::new(
        store,
        remote,
        ConnectivityMonitor::new(online),
        quick_config(),
    ))
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let store = open_store();
    capture_finding(&store);
    capture_finding(&store);
    capture_photo(&store);
    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), Arc::clone(&remote), true);

    let first = orch.sync_now().await.report().unwrap();
    assert_eq!(first.findings_synced, 2);
    assert_eq!(first.photos_uploaded, 1);

    let second = orch.sync_now().await.report().unwrap();
    assert_eq!(second.findings_synced, 0);
    assert_eq!(second.photos_uploaded, 0);
    assert!(second.errors.is_empty());

    // Each record hit the remote exactly once across both passes.
    assert_eq!(remote.finding_calls(), 2);
    assert_eq!(remote.photo_calls(), 1);
}

#[tokio::test]
async fn partial_failure_is_isolated() {
    let store = open_store();
    let rejected = capture_finding(&store);
    let ok_a = capture_finding(&store);
    let ok_b = capture_finding(&store);
    let remote = Arc::new(MockRemote::new());
    remote.fail_record(rejected, "inspection closed on server", false);
    let orch = orchestrator(Arc::clone(&store), remote, true);

    let report = orch.sync_now().await.report().unwrap();
    assert_eq!(report.findings_synced, 2);
    assert_eq!(report.errors.len(), 1);

    for id in [ok_a, ok_b] {
        assert_eq!(store.finding(id).unwrap().sync_state, SyncState::Synced);
    }
    let parked = store.finding(rejected).unwrap();
    assert_eq!(parked.sync_state, SyncState::Error);
    assert!(parked.last_error.is_some());
}

#[tokio::test]
async fn retry_ceiling_is_bounded() {
    let store = open_store();
    let flaky = capture_finding(&store);
    let remote = Arc::new(MockRemote::new());
    remote.fail_record(flaky, "503 service unavailable", true);
    let orch = orchestrator(Arc::clone(&store), remote, true);

    // The default quick_config ceiling is 5; pass 6 times.
    for _ in 0..6 {
        orch.sync_now().await.report().unwrap();
    }

    let record = store.finding(flaky).unwrap();
    assert_eq!(record.sync_state, SyncState::Error);
    assert_eq!(record.retry_count, 5);
}

/// Remote that holds every call open for a while, so two triggers overlap.
struct SlowRemote {
    inner: MockRemote,
    delay: Duration,
}

#[async_trait::async_trait]
impl RemoteStore for SlowRemote {
    async fn upsert_finding(
        &self,
        finding: &fieldsync_store::PendingFinding,
    ) -> SyncResult<RemoteAck> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert_finding(finding).await
    }

    async fn upload_photo(&self, photo: &fieldsync_store::PendingPhoto) -> SyncResult<PhotoAck> {
        tokio::time::sleep(self.delay).await;
        self.inner.upload_photo(photo).await
    }
}

#[tokio::test]
async fn concurrent_triggers_run_one_pass() {
    let store = open_store();
    capture_finding(&store);
    let remote = Arc::new(SlowRemote {
        inner: MockRemote::new(),
        delay: Duration::from_millis(20),
    });
    let orch = Arc::new(SyncOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        ConnectivityMonitor::new(true),
        quick_config(),
    ));

    let (a, b) = tokio::join!(orch.sync_now(), orch.sync_now());

    let suppressed = usize::from(a.was_suppressed()) + usize::from(b.was_suppressed());
    assert_eq!(suppressed, 1, "exactly one trigger must be suppressed");

    let report = a.report().or(b.report()).unwrap();
    assert_eq!(report.findings_synced, 1);
    assert_eq!(remote.inner.finding_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_edge_triggers_a_pass() {
    let store = open_store();
    capture_finding(&store);
    let remote = Arc::new(MockRemote::new());
    remote.set_online(false);
    let orch = orchestrator(Arc::clone(&store), Arc::clone(&remote), false);
    orch.start();

    // Still offline: nothing should have moved.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.unsynced_counts(), (1, 0));

    remote.set_online(true);
    orch.connectivity().set_online(true);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while store.unsynced_counts() != (0, 0) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "reconnect did not trigger a sync pass"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    orch.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_burst_collapses_to_one_pass() {
    let store = open_store();
    capture_finding(&store);
    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), Arc::clone(&remote), false);
    orch.start();

    // Flap the signal faster than the debounce window.
    for _ in 0..4 {
        orch.connectivity().set_online(true);
        orch.connectivity().set_online(false);
    }
    orch.connectivity().set_online(true);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while store.unsynced_counts() != (0, 0) {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Settle, then confirm the record was upserted exactly once.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.finding_calls(), 1);

    orch.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_retriggers_sync_for_pending_work() {
    let store = open_store();
    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), Arc::clone(&remote), true);
    orch.start();

    // Work arrives after startup; only the poll can pick it up.
    capture_finding(&store);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while store.unsynced_counts() != (0, 0) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "poll did not trigger a sync pass"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    orch.shutdown();
}

#[tokio::test]
async fn status_reflects_the_store() {
    let store = open_store();
    let f1 = capture_finding(&store);
    capture_finding(&store);
    capture_photo(&store);
    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), remote, true);

    let before = orch.status();
    assert_eq!(before.pending_changes, 3);
    assert!(before.is_online);
    assert!(!before.is_syncing);
    assert!(before.last_synced_at.is_none());

    let inspection = store.finding(f1).unwrap().inspection_id;
    assert!(orch.inspection_has_pending(inspection));

    orch.sync_now().await.report().unwrap();

    let after = orch.status();
    assert_eq!(after.pending_changes, 0);
    assert!(after.last_synced_at.is_some());
    assert!(!orch.inspection_has_pending(inspection));

    // A second pass may not move last_synced_at backwards.
    orch.sync_now().await.report().unwrap();
    assert!(orch.status().last_synced_at.unwrap() >= after.last_synced_at.unwrap());
}

#[tokio::test]
async fn aborted_pass_does_not_advance_last_sync() {
    let store = open_store();
    capture_finding(&store);
    let remote = Arc::new(MockRemote::new());
    remote.set_online(false);
    let orch = orchestrator(Arc::clone(&store), Arc::clone(&remote), true);

    let report = orch.sync_now().await.report().unwrap();
    assert!(report.aborted);
    assert!(orch.status().last_synced_at.is_none());
    assert_eq!(orch.status().pending_changes, 1);
}

/// Scheduler that records the task so the test can play the platform.
#[derive(Default)]
struct RecordingScheduler {
    task: Mutex<Option<BackgroundTask>>,
}

impl BackgroundScheduler for RecordingScheduler {
    fn register(&self, task: BackgroundTask) -> SyncResult<()> {
        *self.task.lock() = Some(task);
        Ok(())
    }
}

#[tokio::test]
async fn background_task_runs_a_pass() {
    let store = open_store();
    capture_finding(&store);
    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), remote, true);

    let scheduler = RecordingScheduler::default();
    orch.register_background_sync(&scheduler).unwrap();

    // Second registration is refused.
    assert!(orch.register_background_sync(&scheduler).is_err());

    // The platform decides to run the task.
    let task = scheduler.task.lock().clone().unwrap();
    task().await;

    assert_eq!(store.unsynced_counts(), (0, 0));
}

#[tokio::test]
async fn durable_queue_survives_restart_then_syncs() {
    let backend = Arc::new(InMemoryBackend::new());
    {
        let store = Arc::new(
            LocalStore::open(Arc::clone(&backend) as Arc<dyn JournalBackend>).unwrap(),
        );
        capture_finding(&store);
        capture_finding(&store);
        // Process dies before any pass runs.
    }

    let store = Arc::new(
        LocalStore::open(
            Arc::new(InMemoryBackend::with_data(backend.data())) as Arc<dyn JournalBackend>
        )
        .unwrap(),
    );
    assert_eq!(store.unsynced_counts(), (2, 0));

    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), remote, true);
    let report = orch.sync_now().await.report().unwrap();
    assert_eq!(report.findings_synced, 2);
    assert_eq!(store.unsynced_counts(), (0, 0));
}

/// Backend whose writes start failing on demand, modeling a full or
/// failing disk under a live store.
struct BrokenWriteBackend {
    inner: InMemoryBackend,
    fail_writes: AtomicBool,
}

impl JournalBackend for BrokenWriteBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&self, data: &[u8]) -> StoreResult<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.append(data)
    }

    fn sync(&self) -> StoreResult<()> {
        self.inner.sync()
    }

    fn size(&self) -> StoreResult<u64> {
        self.inner.size()
    }

    fn replace(&self, data: &[u8]) -> StoreResult<()> {
        self.inner.replace(data)
    }
}

#[tokio::test]
async fn store_failure_becomes_a_report_not_a_panic() {
    let backend = Arc::new(BrokenWriteBackend {
        inner: InMemoryBackend::new(),
        fail_writes: AtomicBool::new(false),
    });
    let store = Arc::new(
        LocalStore::open(Arc::clone(&backend) as Arc<dyn JournalBackend>).unwrap(),
    );
    capture_finding(&store);
    backend.fail_writes.store(true, Ordering::SeqCst);

    let remote = Arc::new(MockRemote::new());
    let orch = orchestrator(Arc::clone(&store), Arc::clone(&remote), true);

    let outcome = orch.sync_now().await;
    assert!(!outcome.was_suppressed());
    let report = outcome.report().unwrap();
    assert_eq!(report.findings_synced, 0);
    assert!(report.aborted);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("disk full"));

    // The flag was released and nothing reached the remote.
    assert!(!orch.is_syncing());
    assert_eq!(remote.finding_calls(), 0);
}

#[tokio::test]
async fn outcome_when_suppressed_has_no_report() {
    let outcome = SyncOutcome::AlreadySyncing;
    assert!(outcome.was_suppressed());
    assert!(outcome.report().is_none());
}
