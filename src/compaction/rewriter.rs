//! Run rewrite with destination rollover.
//!
//! Source files are processed in ascending `low_sqn` order and their
//! positions in ascending order, so survivors stream out in ascending SQN
//! and the manifest slice is appended in non-decreasing `start_sqn` order.
//! When a destination reaches its size limit it is sealed, its manifest
//! entry recorded, and the same survivors are retried on a fresh file.

use bytes::Bytes;

use super::{
    BATCH_SIZE, Candidate,
    error::CompactionError,
    filter::{self, Verdict},
};
use crate::{
    codec::{self, JournalKey, StrategyMap},
    journal::{
        JournalConfig, JournalFile, JournalStore, JournalWriter, WriteOutcome, compact_filename,
    },
    ledger::LedgerView,
    manifest::{ManifestEntry, ManifestSlice},
    observability::log_warn,
};

/// Output of rewriting one run.
#[derive(Debug)]
pub struct RewriteOutput<F> {
    /// Manifest entries for the destination files, in append order.
    pub slice: ManifestSlice<F>,
    /// False once any corrupt record was seen; the consumed sources must
    /// then be kept for forensic recovery.
    pub prompt_delete: bool,
}

/// Rewrite every record of `run` through the retention filter into fresh
/// destination files.
///
/// Corrupt records are dropped (clearing `prompt_delete`) but never fail
/// the job; any read or write error is fatal and leaves already-written
/// destinations orphaned for external cleanup.
pub async fn rewrite_run<S: JournalStore>(
    store: &S,
    config: &JournalConfig,
    run: &[Candidate<S::File>],
    strategies: &StrategyMap,
    ledger: &LedgerView,
) -> Result<RewriteOutput<S::File>, CompactionError> {
    let mut slice: ManifestSlice<S::File> = Vec::new();
    let mut prompt_delete = true;
    let mut active: Option<S::Writer> = None;

    for candidate in run {
        let positions = candidate.file.get_positions(None).await?;
        for batch in positions.chunks(BATCH_SIZE) {
            let records = candidate.file.fetch_records(batch).await?;
            let mut survivors: Vec<(JournalKey, Bytes)> = Vec::with_capacity(records.len());
            for record in &records {
                match filter::classify(record, strategies, ledger.oracle.as_ref(), ledger.max_sqn)
                {
                    Verdict::KeepOriginal => {
                        survivors.push((record.key.clone(), record.value.clone()));
                    }
                    Verdict::KeepCompacted(key, value) => {
                        survivors.push((key, codec::encode_value(&value)));
                    }
                    Verdict::Drop => {}
                    Verdict::Corrupt => {
                        prompt_delete = false;
                        log_warn!(
                            component = "rewriter",
                            event = "corrupt_record",
                            file = %candidate.filename.display(),
                            sqn = record.key.sqn,
                            position = record.position,
                        );
                    }
                }
            }
            if survivors.is_empty() {
                continue;
            }
            loop {
                if let Some(writer) = active.as_mut() {
                    match writer.mput(&survivors).await? {
                        WriteOutcome::Ok => break,
                        WriteOutcome::Roll => {
                            if let Some(full) = active.take() {
                                slice.push(seal(store, full).await?);
                            }
                        }
                    }
                } else {
                    let path = compact_filename(&config.root, survivors[0].0.sqn);
                    active = Some(store.open_writer(&path).await?);
                }
            }
        }
    }

    if let Some(last) = active.take() {
        slice.push(seal(store, last).await?);
    }
    Ok(RewriteOutput {
        slice,
        prompt_delete,
    })
}

/// Seal a destination: close it, reopen read-only, and derive its manifest
/// entry from its first key.
async fn seal<S: JournalStore>(
    store: &S,
    writer: S::Writer,
) -> Result<ManifestEntry<S::File>, CompactionError> {
    let path = writer.complete().await?;
    let file = store.open_reader(&path).await?;
    let first = file.first_key().await?;
    Ok(ManifestEntry::new(first.sqn, path, file))
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use super::*;
    use crate::{
        codec::{JournalValue, KeyKind, LedgerKey, ReloadStrategy, Sqn, Tag},
        journal::mem::{MemFile, MemStore},
        ledger::LedgerSnapshot,
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

    async fn source_file(
        store: &MemStore,
        path: &str,
        records: &[(JournalKey, Bytes)],
    ) -> Arc<MemFile> {
        let mut writer = store.open_writer(Path::new(path)).await.expect("writer");
        writer.mput(records).await.expect("mput");
        let sealed = writer.complete().await.expect("seal");
        store.open_reader(&sealed).await.expect("reader")
    }

    fn candidate(low_sqn: Sqn, file: Arc<MemFile>) -> Candidate<MemFile> {
        let filename = file.filename().to_path_buf();
        Candidate::new(low_sqn, filename, file, 0.0)
    }

    fn view(entries: &[(&str, Sqn)], max_sqn: Sqn) -> LedgerView {
        let snapshot: LedgerSnapshot = entries
            .iter()
            .map(|&(key, sqn)| (ledger_key(key), sqn))
            .collect();
        LedgerView::new(Arc::new(snapshot), max_sqn)
    }

    #[tokio::test]
    async fn small_size_limit_rolls_into_ordered_entries() {
        // Two rewrite batches (40 records, batch size 32); the second one
        // pushes the destination past the limit and must roll.
        let config = JournalConfig::new("/journal").with_max_file_bytes(600);
        let store = MemStore::new(config.clone());
        let records: Vec<_> = (1..=40)
            .map(|sqn| standard(sqn, &format!("k{sqn}"), "Value"))
            .collect();
        let file = source_file(&store, "/journal/src.cdb", &records).await;
        let ledger = view(
            &records
                .iter()
                .map(|(key, _)| {
                    (
                        std::str::from_utf8(&key.ledger_key.key).expect("utf8"),
                        key.sqn,
                    )
                })
                .collect::<Vec<_>>(),
            50,
        );

        let out = rewrite_run(
            &store,
            &config,
            &[candidate(1, file)],
            &StrategyMap::default(),
            &ledger,
        )
        .await
        .expect("rewrite");

        assert!(out.prompt_delete);
        assert!(out.slice.len() >= 2, "expected a roll, got {} files", out.slice.len());
        assert!(
            out.slice.windows(2).all(|w| w[0].start_sqn <= w[1].start_sqn),
            "start_sqn must be non-decreasing"
        );
        let total: usize = out.slice.iter().map(|entry| entry.file.len()).sum();
        assert_eq!(total, 40, "no survivor may be lost across rolls");
    }

    #[tokio::test]
    async fn corrupt_record_is_omitted_and_clears_prompt_delete() {
        let config = JournalConfig::new("/journal");
        let store = MemStore::new(config.clone());
        let records = vec![
            standard(1, "k1", "Value1"),
            standard(2, "k2", "Value2"),
            standard(3, "k3", "Value3"),
        ];
        let file = source_file(&store, "/journal/src.cdb", &records).await;
        file.corrupt_value_at(1);
        let ledger = view(&[("k1", 1), ("k2", 2), ("k3", 3)], 10);

        let out = rewrite_run(
            &store,
            &config,
            &[candidate(1, file)],
            &StrategyMap::default(),
            &ledger,
        )
        .await
        .expect("rewrite");

        assert!(!out.prompt_delete);
        assert_eq!(out.slice.len(), 1);
        let dest = &out.slice[0].file;
        assert_eq!(dest.len(), 2);
        assert!(dest.keycheck(&ledger_key("k2"), 2).is_none());
    }

    #[tokio::test]
    async fn fully_dropped_run_returns_an_empty_slice() {
        let config = JournalConfig::new("/journal");
        let store = MemStore::new(config.clone());
        let records = vec![standard(1, "k1", "old"), standard(2, "k1", "older")];
        let file = source_file(&store, "/journal/src.cdb", &records).await;
        // Ledger has moved past both records.
        let ledger = view(&[("k1", 9)], 10);

        let out = rewrite_run(
            &store,
            &config,
            &[candidate(1, file)],
            &StrategyMap::new(ReloadStrategy::Recover),
            &ledger,
        )
        .await
        .expect("rewrite");

        assert!(out.slice.is_empty());
        assert!(out.prompt_delete);
        assert_eq!(store.file_count(), 1, "only the source remains");
    }
}
