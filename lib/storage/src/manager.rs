use crate::memory::MemoryStore;
use crate::snapshot::{ArtifactDescription, ModelArtifact};
use crate::wal::CaseLog;
use anyhow::{bail, Context};
use fraudx_core::{EmbeddingStore, Error, Result, StoreHit, StoredCase, Vector};
use fraudx_schema::FittedEncoderState;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CASE_LOG_FILE: &str = "cases.jsonl";
const QUARANTINE_FILE: &str = "quarantine.jsonl";
const MODEL_FILE: &str = "model.bin.gz";

/// Outcome of re-embedding stored cases under a new fitted state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReembedReport {
    pub kept: usize,
    /// Cases that no longer encode, moved to `quarantine.jsonl` unchanged
    pub quarantined: usize,
}

/// Case store and model artifact under one data directory.
///
/// Cases live in memory and are made durable through the case log before
/// they become visible to queries.
pub struct StorageManager {
    data_dir: PathBuf,
    store: MemoryStore,
    log_path: PathBuf,
    /// Held for every write to the log or the store
    log: Mutex<CaseLog>,
}

impl StorageManager {
    /// Open (or create) a data directory and replay its case log.
    pub fn open<P: AsRef<Path>>(data_dir: P, embedding_dim: usize) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let log_path = data_dir.join(CASE_LOG_FILE);
        let store = MemoryStore::new(embedding_dim);
        let mut skipped = 0;
        for case in CaseLog::replay(&log_path)? {
            match store.insert(case) {
                Ok(()) => {}
                Err(Error::DuplicateCase(id)) => {
                    warn!(merchant_id = %id, "Ignoring duplicate case in log");
                    skipped += 1;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("replaying case log {}", log_path.display()));
                }
            }
        }
        let log = CaseLog::open(&log_path)?;

        info!(
            data_dir = %data_dir.display(),
            cases = store.len(),
            skipped,
            "Opened case store"
        );

        Ok(Self {
            data_dir,
            store,
            log_path,
            log: Mutex::new(log),
        })
    }

    /// Re-embed the logged cases of a data directory nobody has open.
    ///
    /// Embeddings from a previous fit are meaningless under a new one.
    /// Callers must hold the directory's [`DataDirLock`](crate::DataDirLock).
    pub fn reembed<P: AsRef<Path>>(
        data_dir: P,
        state: &FittedEncoderState,
    ) -> anyhow::Result<ReembedReport> {
        let data_dir = data_dir.as_ref();
        let log_path = data_dir.join(CASE_LOG_FILE);
        let cases = CaseLog::replay(&log_path)?;
        if cases.is_empty() {
            return Ok(ReembedReport::default());
        }

        let (rebuilt, report) = reembed_cases(data_dir, cases, state)?;
        CaseLog::rewrite(&log_path, &rebuilt)?;
        Ok(report)
    }

    /// Re-embed every stored case of this open store with `state`, then hand
    /// `state` to `publish`.
    ///
    /// Rewrites the log, reopens the append handle on the new file, swaps the
    /// in-memory cases and publishes, all under the write lock. A concurrent
    /// [`put_with`](Self::put_with) therefore builds its case either before
    /// the re-embed or after the new state is live.
    pub fn reembed_in_place<F>(
        &self,
        state: FittedEncoderState,
        publish: F,
    ) -> anyhow::Result<ReembedReport>
    where
        F: FnOnce(FittedEncoderState) -> anyhow::Result<()>,
    {
        if state.embedding_dim() != self.store.dim() {
            bail!(
                "fitted state produces {}-wide embeddings, store holds {}",
                state.embedding_dim(),
                self.store.dim()
            );
        }

        let mut log = self.log.lock();
        let (rebuilt, report) = reembed_cases(&self.data_dir, self.store.cases(), &state)?;
        CaseLog::rewrite(&self.log_path, &rebuilt)?;
        *log = CaseLog::open(&self.log_path)?;
        self.store.replace_all(rebuilt)?;
        publish(state)?;
        Ok(report)
    }

    /// Build a case and store it under the write lock.
    ///
    /// Use this when `build` embeds with the serving state, so the case
    /// cannot slip in between a re-embed and the publish that follows it.
    pub fn put_with<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce() -> Result<StoredCase>,
    {
        let log = self.log.lock();
        let case = build()?;
        self.append_and_insert(&log, case)
    }

    fn append_and_insert(&self, log: &CaseLog, case: StoredCase) -> Result<()> {
        self.store.validate(&case)?;
        log.append(&case)
            .map_err(|e| Error::StoreUnavailable(format!("case log append failed: {}", e)))?;
        self.store.insert(case)
    }

    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn model_path(&self) -> PathBuf {
        Self::model_path_in(&self.data_dir)
    }

    /// Where the model artifact of `data_dir` lives
    pub fn model_path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(MODEL_FILE)
    }

    pub fn case_log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn quarantine_path(&self) -> PathBuf {
        self.data_dir.join(QUARANTINE_FILE)
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.store
    }

    pub fn has_model(&self) -> bool {
        self.model_path().exists()
    }

    pub fn save_model(&self, state: &FittedEncoderState) -> anyhow::Result<ArtifactDescription> {
        ModelArtifact::from_state(state).save(self.model_path())
    }

    /// The saved artifact, or `None` when nothing has been fitted yet
    pub fn load_model(&self) -> anyhow::Result<Option<ModelArtifact>> {
        let path = self.model_path();
        if !path.exists() {
            return Ok(None);
        }
        ModelArtifact::load(path).map(Some)
    }
}

/// Re-embed `cases`; the ones that fail are appended to the quarantine log
/// with their labels intact.
fn reembed_cases(
    data_dir: &Path,
    cases: Vec<StoredCase>,
    state: &FittedEncoderState,
) -> anyhow::Result<(Vec<StoredCase>, ReembedReport)> {
    let mut rebuilt = Vec::with_capacity(cases.len());
    let mut failed = Vec::new();
    for mut case in cases {
        match state.assemble(&case.application) {
            Ok(embedding) => {
                case.embedding = embedding;
                rebuilt.push(case);
            }
            Err(e) => {
                warn!(
                    merchant_id = %case.merchant_id,
                    error = %e,
                    "Quarantining case that no longer encodes"
                );
                failed.push(case);
            }
        }
    }

    if !failed.is_empty() {
        let quarantine = CaseLog::open(data_dir.join(QUARANTINE_FILE))?;
        for case in &failed {
            quarantine.append(case)?;
        }
    }

    let report = ReembedReport {
        kept: rebuilt.len(),
        quarantined: failed.len(),
    };
    info!(kept = report.kept, quarantined = report.quarantined, "Re-embedded stored cases");
    Ok((rebuilt, report))
}

impl EmbeddingStore for StorageManager {
    fn put(&self, case: StoredCase) -> Result<()> {
        let log = self.log.lock();
        self.append_and_insert(&log, case)
    }

    fn query_nearest(
        &self,
        embedding: &Vector,
        similarity_floor: f32,
        limit: usize,
    ) -> Result<Vec<StoreHit>> {
        self.store.query_nearest(embedding, similarity_floor, limit)
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraudx_core::{
        ApplicationRecord, FeatureGroup, FieldSpec, ModelConfig, SearchConfig, Thresholds,
        TransformerKind,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn case(id: &str, embedding: Vec<f32>) -> StoredCase {
        let application = ApplicationRecord::new().with("email", format!("{}@x.com", id));
        StoredCase::new(id, Vector::new(embedding), application)
    }

    /// `email` is required, so a case without one no longer encodes
    fn fitted(weight: f64) -> FittedEncoderState {
        let config = ModelConfig {
            name: "merchants".to_string(),
            description: None,
            fields: vec![FieldSpec::string("email")],
            feature_groups: vec![
                FeatureGroup::new("contact", ["email"], TransformerKind::hash()).with_weight(weight)
            ],
            embedding_dim: 2,
            similarity_thresholds: Thresholds::default(),
            reducer: None,
            search: SearchConfig::default(),
        };
        let corpus = [ApplicationRecord::new().with("email", "z@x.com")];
        FittedEncoderState::fit(&config, &corpus).unwrap()
    }

    #[test]
    fn test_cases_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let manager = StorageManager::open(dir.path(), 2).unwrap();
            manager.put(case("m1", vec![1.0, 0.0])).unwrap();
            manager
                .put(case("m2", vec![0.0, 1.0]).with_fraud_reason("mule account"))
                .unwrap();
        }

        let manager = StorageManager::open(dir.path(), 2).unwrap();
        assert_eq!(manager.len(), 2);
        let hits = manager.query_nearest(&Vector::new(vec![0.1, 1.0]), 0.6, 5).unwrap();
        assert_eq!(hits[0].merchant_id, "m2");
        assert_eq!(hits[0].fraud_reason.as_deref(), Some("mule account"));
    }

    #[test]
    fn test_rejected_case_is_not_logged() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::open(dir.path(), 2).unwrap();
        manager.put(case("m1", vec![1.0, 0.0])).unwrap();

        assert!(matches!(
            manager.put(case("m1", vec![0.0, 1.0])),
            Err(Error::DuplicateCase(_))
        ));
        assert!(matches!(
            manager.put(case("m2", vec![1.0])),
            Err(Error::InvalidDimension { .. })
        ));
        assert_eq!(CaseLog::replay(manager.case_log_path()).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_with_other_width_fails() {
        let dir = TempDir::new().unwrap();
        StorageManager::open(dir.path(), 2)
            .unwrap()
            .put(case("m1", vec![1.0, 0.0]))
            .unwrap();
        assert!(StorageManager::open(dir.path(), 3).is_err());
    }

    #[test]
    fn test_reembed_quarantines_cases_that_no_longer_encode() {
        let state = fitted(1.0);
        let dir = TempDir::new().unwrap();
        {
            let manager = StorageManager::open(dir.path(), 2).unwrap();
            manager.put(case("m1", vec![9.0, 9.0])).unwrap();
            let no_email =
                StoredCase::new("m2", Vector::new(vec![1.0, 1.0]), ApplicationRecord::new());
            manager.put(no_email.with_fraud_reason("bust-out")).unwrap();
        }

        let report = StorageManager::reembed(dir.path(), &state).unwrap();
        assert_eq!(report, ReembedReport { kept: 1, quarantined: 1 });

        let manager = StorageManager::open(dir.path(), 2).unwrap();
        let stored = manager.memory().get("m1").unwrap();
        assert_eq!(stored.embedding, state.assemble(&stored.application).unwrap());
        assert!(manager.memory().get("m2").is_none());

        let quarantined = CaseLog::replay(manager.quarantine_path()).unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].merchant_id, "m2");
        assert_eq!(quarantined[0].fraud_reason.as_deref(), Some("bust-out"));
    }

    #[test]
    fn test_reembed_in_place_keeps_store_and_log_in_step() {
        let old = fitted(1.0);
        let new = fitted(2.0);
        let dir = TempDir::new().unwrap();
        {
            let manager = StorageManager::open(dir.path(), 2).unwrap();
            let application = ApplicationRecord::new().with("email", "m1@x.com");
            let embedding = old.assemble(&application).unwrap();
            manager.put(StoredCase::new("m1", embedding, application)).unwrap();

            let report = manager.reembed_in_place(fitted(2.0), |_| Ok(())).unwrap();
            assert_eq!(report.kept, 1);

            let stored = manager.memory().get("m1").unwrap();
            assert_eq!(stored.embedding, new.assemble(&stored.application).unwrap());

            // Appends after the swap must reach the rewritten log
            manager.put(case("m3", vec![0.0, 1.0])).unwrap();
        }

        let manager = StorageManager::open(dir.path(), 2).unwrap();
        assert!(manager.memory().contains("m3"));
        let stored = manager.memory().get("m1").unwrap();
        assert_eq!(stored.embedding, new.assemble(&stored.application).unwrap());
    }

    #[test]
    fn test_reembed_in_place_rejects_other_width() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::open(dir.path(), 3).unwrap();
        manager.put(case("m1", vec![1.0, 0.0, 0.0])).unwrap();

        let mut published = false;
        let result = manager.reembed_in_place(fitted(1.0), |_| {
            published = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!published);
        assert_eq!(manager.memory().get("m1").unwrap().embedding.dim(), 3);
    }

    #[test]
    fn test_put_waits_for_publish_during_reembed() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::open(dir.path(), 2).unwrap();
        manager.put(case("m1", vec![1.0, 0.0])).unwrap();

        let published = AtomicBool::new(false);
        let (locked_tx, locked_rx) = mpsc::channel();
        let (manager, published) = (&manager, &published);
        std::thread::scope(|s| {
            s.spawn(move || {
                manager
                    .reembed_in_place(fitted(2.0), |state| {
                        // The swapped cases are visible before the state goes live
                        let stored = manager.memory().get("m1").unwrap();
                        let expected = state.assemble(&stored.application).unwrap();
                        assert_eq!(stored.embedding, expected);
                        locked_tx.send(()).unwrap();
                        std::thread::sleep(Duration::from_millis(20));
                        published.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
            });

            locked_rx.recv().unwrap();
            manager
                .put_with(|| {
                    assert!(published.load(Ordering::SeqCst));
                    Ok(case("m2", vec![0.0, 1.0]))
                })
                .unwrap();
        });

        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_no_model_yet() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::open(dir.path(), 2).unwrap();
        assert!(!manager.has_model());
        assert!(manager.load_model().unwrap().is_none());
    }
}
