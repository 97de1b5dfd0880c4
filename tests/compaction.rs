//! End-to-end compaction over the in-memory store: a clerk, a controller
//! stub, and a journal holding eight records across three keys.

use std::{future::Future, path::Path, pin::Pin, sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use inkpress::{
    Clerk, ClerkOptions, CompactRequest, JournalConfig, JournalController, JournalFile,
    JournalKey, JournalStore, JournalValue, JournalWriter, KeyKind, LedgerKey, LedgerSnapshot,
    LedgerView, ManifestEntry, ManifestSlice, ReloadStrategy, Sqn, StrategyMap, Tag,
    codec,
    journal::mem::{MemFile, MemStore},
    manifest::ControllerError,
};

fn ledger_key(name: &str) -> LedgerKey {
    LedgerKey::new(Tag::OBJECT, name.to_string())
}

fn standard(sqn: Sqn, key: &str, object: &str) -> (JournalKey, Bytes) {
    (
        JournalKey::new(sqn, KeyKind::Standard, ledger_key(key)),
        codec::encode_value(&JournalValue::Standard {
            object: Bytes::copy_from_slice(object.as_bytes()),
            deltas: vec![],
        }),
    )
}

async fn seal(store: &MemStore, path: &str, records: &[(JournalKey, Bytes)]) -> Arc<MemFile> {
    let mut writer = store.open_writer(Path::new(path)).await.expect("writer");
    writer.mput(records).await.expect("mput");
    let sealed = writer.complete().await.expect("seal");
    store.open_reader(&sealed).await.expect("reader")
}

/// SQNs 1..8: Key1 at 1,4,5,6,7,8; Key2 at 2; Key3 at 3.
async fn eight_record_source(store: &MemStore) -> Arc<MemFile> {
    let keys = ["Key1", "Key2", "Key3", "Key1", "Key1", "Key1", "Key1", "Key1"];
    let records: Vec<_> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| standard(i as Sqn + 1, key, &format!("Value{}", i + 1)))
        .collect();
    seal(store, "/journal/000000000001.cdb", &records).await
}

fn snapshot() -> LedgerView {
    let ledger: LedgerSnapshot = [
        (ledger_key("Key1"), 8),
        (ledger_key("Key2"), 2),
        (ledger_key("Key3"), 3),
    ]
    .into_iter()
    .collect();
    LedgerView::new(Arc::new(ledger), 9)
}

/// Controller stub: applies deltas by keeping the write tip and replacing
/// everything behind it with the slice.
struct TipController {
    manifest: Mutex<Vec<ManifestEntry<MemFile>>>,
    manifest_sqn: Mutex<Sqn>,
    consumed: Mutex<Vec<Vec<Sqn>>>,
    completed: Notify,
}

impl TipController {
    fn new(manifest: Vec<ManifestEntry<MemFile>>) -> Self {
        Self {
            manifest: Mutex::new(manifest),
            manifest_sqn: Mutex::new(0),
            consumed: Mutex::new(Vec::new()),
            completed: Notify::new(),
        }
    }

    fn compacted_entries(&self) -> Vec<ManifestEntry<MemFile>> {
        self.manifest.lock().iter().skip(1).cloned().collect()
    }
}

impl JournalController<MemFile> for TipController {
    fn get_manifest(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ManifestEntry<MemFile>>, ControllerError>> + Send + '_>>
    {
        Box::pin(async move { Ok(self.manifest.lock().clone()) })
    }

    fn update_manifest(
        &self,
        slice: ManifestSlice<MemFile>,
        consumed: Vec<ManifestEntry<MemFile>>,
    ) -> Pin<Box<dyn Future<Output = Result<Sqn, ControllerError>> + Send + '_>> {
        Box::pin(async move {
            let mut manifest = self.manifest.lock();
            let head = manifest.first().cloned().expect("manifest has a write tip");
            let mut next = vec![head];
            next.extend(slice);
            *manifest = next;
            self.consumed
                .lock()
                .push(consumed.iter().map(|entry| entry.start_sqn).collect());
            let mut sqn = self.manifest_sqn.lock();
            *sqn += 1;
            Ok(*sqn)
        })
    }

    fn compaction_complete(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.completed.notify_one();
        })
    }
}

struct Harness {
    store: MemStore,
    source: Arc<MemFile>,
    controller: Arc<TipController>,
    clerk: Clerk,
    worker: tokio::task::JoinHandle<()>,
}

async fn harness(strategy: ReloadStrategy) -> Harness {
    let config = JournalConfig::new("/journal");
    let store = MemStore::new(config.clone());
    let tip = seal(&store, "/journal/000000001000.cdb", &[standard(1000, "Tip", "tip")]).await;
    let source = eight_record_source(&store).await;
    let controller = Arc::new(TipController::new(vec![
        ManifestEntry::new(1000, tip.filename().to_path_buf(), tip),
        ManifestEntry::new(1, source.filename().to_path_buf(), Arc::clone(&source)),
    ]));
    let options = ClerkOptions::new(store.clone(), Arc::clone(&controller), config)
        .with_reload_strategy(StrategyMap::new(strategy));
    let (clerk, worker) = Clerk::spawn(options);
    Harness {
        store,
        source,
        controller,
        clerk,
        worker,
    }
}

async fn run_job(h: &Harness) {
    let request = CompactRequest::from_view(snapshot()).with_timeout(Duration::from_secs(60));
    h.clerk.compact(request).await.expect("queue job");
    h.controller.completed.notified().await;
}

async fn shutdown(h: Harness) {
    h.clerk.stop().await;
    h.worker.await.expect("worker joins");
}

#[tokio::test]
async fn recover_strategy_drops_superseded_records() {
    let h = harness(ReloadStrategy::Recover).await;
    run_job(&h).await;

    let compacted = h.controller.compacted_entries();
    assert_eq!(compacted.len(), 1);
    let output = &compacted[0];
    assert_eq!(output.start_sqn, 2, "first surviving SQN names the file");
    assert_eq!(output.file.first_key().await.expect("first key").sqn, 2);

    assert_eq!(output.file.keycheck(&ledger_key("Key1"), 8), Some(KeyKind::Standard));
    assert!(output.file.keycheck(&ledger_key("Key1"), 7).is_none());
    assert!(output.file.keycheck(&ledger_key("Key1"), 1).is_none());
    match output.file.lookup(&ledger_key("Key2"), 2) {
        Some(JournalValue::Standard { object, deltas }) => {
            assert_eq!(&object[..], b"Value2");
            assert!(deltas.is_empty());
        }
        other => panic!("expected Key2@2 standard value, got {other:?}"),
    }
    shutdown(h).await;
}

#[tokio::test]
async fn retain_strategy_keeps_superseded_keys_as_deltas() {
    let h = harness(ReloadStrategy::Retain).await;
    run_job(&h).await;

    let compacted = h.controller.compacted_entries();
    assert_eq!(compacted.len(), 1);
    let output = &compacted[0];
    assert_eq!(output.start_sqn, 1, "superseded head record survives as deltas");
    assert_eq!(output.file.len(), 8);

    for sqn in [1, 4, 5, 6, 7] {
        assert_eq!(
            output.file.keycheck(&ledger_key("Key1"), sqn),
            Some(KeyKind::KeyDeltas),
            "Key1@{sqn} must stay queryable"
        );
        assert!(matches!(
            output.file.lookup(&ledger_key("Key1"), sqn),
            Some(JournalValue::KeyDeltas(_))
        ));
    }
    assert_eq!(output.file.keycheck(&ledger_key("Key1"), 8), Some(KeyKind::Standard));
    match output.file.lookup(&ledger_key("Key2"), 2) {
        Some(JournalValue::Standard { object, .. }) => assert_eq!(&object[..], b"Value2"),
        other => panic!("expected Key2@2 verbatim, got {other:?}"),
    }
    shutdown(h).await;
}

#[tokio::test]
async fn consumed_sources_are_scheduled_for_deletion() {
    let h = harness(ReloadStrategy::Recover).await;
    run_job(&h).await;
    shutdown_and_check_delete(h).await;
}

async fn shutdown_and_check_delete(h: Harness) {
    // Stop/join first: delete_pending is signalled after the completion
    // notification, so only the worker's exit orders us behind it.
    let source = Arc::clone(&h.source);
    let controller = Arc::clone(&h.controller);
    shutdown(h).await;
    assert!(source.is_delete_pending());
    assert_eq!(source.delete_manifest_sqn(), Some(1));
    assert_eq!(controller.consumed.lock().as_slice(), &[vec![1]]);
}

#[tokio::test]
async fn recompacting_fresh_output_is_a_no_op() {
    let h = harness(ReloadStrategy::Retain).await;
    run_job(&h).await;
    let after_first = h.controller.compacted_entries();
    assert_eq!(after_first.len(), 1);

    // Same ledger view, second job: the rewritten file scores above target
    // and the planner finds nothing positive.
    run_job(&h).await;
    let after_second = h.controller.compacted_entries();
    assert_eq!(after_second.len(), 1);
    assert_eq!(after_second[0].filename, after_first[0].filename);
    assert_eq!(
        h.controller.consumed.lock().len(),
        1,
        "second job must not publish a delta"
    );
    assert_eq!(h.store.file_count(), 3, "tip, source, and one output");
    shutdown(h).await;
}
