//! Directory copy flow.
//!
//! A complete `TransferFlow` that copies one source directory tree into a
//! destination directory. The factory takes the destination as its override,
//! so a batch of N workers copies the same source into N distinct targets.
//!
//! Individual file errors are counted in the flow's TransferState and do NOT
//! stop the flow.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::flow::{FlowFactory, TransferFlow};
use crate::fs_ops::{self, CopyItem};
use crate::model::{FlowPhase, OverwritePolicy, TransferState};
use crate::orchestrator::join_failure;
use crate::progress::{ProgressCallback, ProgressSink};

/// Builds directory copy flows that all read from the same source.
#[derive(Debug, Clone)]
pub struct DirectoryCopyFactory {
    source: PathBuf,
    /// `source` with symlinks and relative segments resolved
    resolved_source: PathBuf,
    overwrite: OverwritePolicy,
}

impl DirectoryCopyFactory {
    /// Create a factory for `source`, which must be an existing directory.
    pub fn new(source: impl Into<PathBuf>, overwrite: OverwritePolicy) -> Result<Self, EngineError> {
        let source = source.into();
        check_source(&source)?;
        let resolved_source = fs_ops::resolve_path(&source).map_err(|e| EngineError::SourceAccessDenied {
            path: source.clone(),
            source: e,
        })?;
        Ok(DirectoryCopyFactory {
            source,
            resolved_source,
            overwrite,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl FlowFactory for DirectoryCopyFactory {
    /// Destination directory of the flow
    type Override = PathBuf;

    fn create(&self, destination: PathBuf) -> Result<Box<dyn TransferFlow>, EngineError> {
        if destination.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath {
                path: destination,
                reason: "Destination path is empty".to_string(),
            });
        }
        let resolved = fs_ops::resolve_path(&destination).map_err(|e| EngineError::InvalidPath {
            path: destination.clone(),
            reason: format!("Destination cannot be resolved: {}", e),
        })?;
        if resolved.starts_with(&self.resolved_source) {
            return Err(EngineError::InvalidPath {
                path: destination,
                reason: "Destination must not be inside the source".to_string(),
            });
        }

        Ok(Box::new(DirectoryCopyFlow {
            id: Uuid::new_v4(),
            source: self.source.clone(),
            destination,
            overwrite: self.overwrite,
        }))
    }
}

fn check_source(source: &Path) -> Result<(), EngineError> {
    match std::fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::InvalidPath {
            path: source.to_path_buf(),
            reason: "Source must be a directory".to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: source.to_path_buf(),
        }),
        Err(e) => Err(EngineError::SourceAccessDenied {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

/// Copies a directory tree into one destination.
#[derive(Debug)]
pub struct DirectoryCopyFlow {
    id: Uuid,
    source: PathBuf,
    destination: PathBuf,
    overwrite: OverwritePolicy,
}

enum ItemOutcome {
    Copied(u64),
    Skipped,
    Failed(EngineError),
}

impl DirectoryCopyFlow {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Plan and copy the whole tree; runs on a blocking thread.
    fn copy_tree(&self, progress: &dyn ProgressCallback, cancel: &CancellationToken) -> Result<(), EngineError> {
        let mut state = TransferState {
            phase: FlowPhase::Planning,
            ..Default::default()
        };
        progress.on_progress(state.clone());

        check_source(&self.source)?;
        fs_ops::ensure_dir_exists(&self.destination)?;
        let items = fs_ops::enumerate_tree(&self.source, &self.destination)?;
        debug!("Flow {}: planned {} items", self.id, items.len());

        state.total_count = Some(items.len() as u64);
        state.phase = FlowPhase::Transferring;
        progress.on_progress(state.clone());

        for item in &items {
            if cancel.is_cancelled() {
                warn!(
                    "Flow {}: cancelled after {} of {} items",
                    self.id,
                    state.processed_count(),
                    items.len()
                );
                return Err(EngineError::Cancelled);
            }

            match self.transfer_item(item) {
                ItemOutcome::Copied(bytes) => {
                    state.current_count += 1;
                    state.bytes_transferred += bytes;
                }
                ItemOutcome::Skipped => state.skipped_count += 1,
                ItemOutcome::Failed(e) => {
                    warn!("{}: {}", item.source_path.display(), e);
                    state.error_count += 1;
                }
            }
            progress.on_progress(state.clone());
        }

        state.phase = FlowPhase::Completed;
        progress.on_progress(state);
        Ok(())
    }

    fn transfer_item(&self, item: &CopyItem) -> ItemOutcome {
        if !fs_ops::should_copy(item, self.overwrite) {
            return ItemOutcome::Skipped;
        }

        if item.is_dir {
            if let Err(e) = fs_ops::ensure_dir_exists(&item.destination_path) {
                return ItemOutcome::Failed(e);
            }
            return match &item.enumeration_error {
                Some(message) => ItemOutcome::Failed(EngineError::flow(message.clone())),
                None => ItemOutcome::Copied(0),
            };
        }

        match fs_ops::copy_file_with_metadata(&item.source_path, &item.destination_path) {
            Ok(bytes) => ItemOutcome::Copied(bytes),
            Err(e) => ItemOutcome::Failed(e),
        }
    }
}

#[async_trait]
impl TransferFlow for DirectoryCopyFlow {
    fn label(&self) -> String {
        self.destination.display().to_string()
    }

    async fn run(self: Box<Self>, progress: ProgressSink, cancel: CancellationToken) -> Result<(), EngineError> {
        debug!(
            "Flow {}: copying {} -> {} (overwrite: {})",
            self.id,
            self.source.display(),
            self.destination.display(),
            self.overwrite
        );
        tokio::task::spawn_blocking(move || self.copy_tree(progress.as_ref(), &cancel))
            .await
            .unwrap_or_else(|e| Err(join_failure(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;
    use crate::model::BatchStatus;
    use crate::orchestrator::{run_batch, run_batch_with, BatchOptions};
    use std::fs;
    use std::sync::{Arc, Mutex};

    /// Source tree: a.txt (5 bytes), b.txt (3 bytes), sub/ and sub/c.txt (4 bytes).
    fn make_source(root: &Path) -> PathBuf {
        let src = root.join("src");
        fs::create_dir_all(src.join("sub")).expect("Failed to create src dirs");
        fs::write(src.join("a.txt"), b"hello").expect("Failed to write a.txt");
        fs::write(src.join("b.txt"), b"abc").expect("Failed to write b.txt");
        fs::write(src.join("sub").join("c.txt"), b"data").expect("Failed to write c.txt");
        src
    }

    fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<TransferState>>>) {
        let states = Arc::new(Mutex::new(Vec::new()));
        let captured = states.clone();
        let sink: ProgressSink = Arc::new(move |state: TransferState| {
            captured.lock().unwrap().push(state);
        });
        (sink, states)
    }

    #[test]
    fn test_factory_rejects_missing_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = DirectoryCopyFactory::new(temp_dir.path().join("nope"), OverwritePolicy::Skip);
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_factory_rejects_file_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").expect("Failed to write file");

        let result = DirectoryCopyFactory::new(&file, OverwritePolicy::Skip);
        assert!(matches!(result, Err(EngineError::InvalidPath { .. })));
    }

    #[test]
    fn test_factory_rejects_bad_destinations() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");

        assert!(factory.create(PathBuf::new()).is_err());
        assert!(factory.create(src.join("inner")).is_err());
        assert!(factory.create(temp_dir.path().join("dst")).is_ok());
    }

    #[test]
    fn test_factory_rejects_destination_reaching_source_indirectly() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        fs::create_dir(temp_dir.path().join("other")).expect("Failed to create dir");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");

        let through_parent = temp_dir.path().join("other").join("..").join("src").join("inner");
        assert!(matches!(
            factory.create(through_parent),
            Err(EngineError::InvalidPath { .. })
        ));
        assert!(factory.create(src.join(".").join("sub").join("new")).is_err());
        assert!(factory.create(temp_dir.path().join("other").join("dst")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_factory_rejects_destination_behind_symlink() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&src, &link).expect("Failed to create symlink");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");

        assert!(factory.create(link.join("out")).is_err());
    }

    #[tokio::test]
    async fn test_flow_copies_tree_and_reports_progress() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let dst = temp_dir.path().join("dst");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");
        let (sink, states) = recording_sink();

        let flow = factory.create(dst.clone()).expect("flow");
        flow.run(sink, CancellationToken::new()).await.expect("copy should succeed");

        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(dst.join("sub").join("c.txt")).unwrap(), "data");

        let states = states.lock().unwrap();
        assert_eq!(states.first().unwrap().phase, FlowPhase::Planning);
        let last = states.last().unwrap();
        assert_eq!(last.phase, FlowPhase::Completed);
        assert_eq!(last.total_count, Some(4));
        assert_eq!(last.current_count, 4);
        assert_eq!(last.error_count, 0);
        assert_eq!(last.bytes_transferred, 12);

        // Counters never go backwards.
        for pair in states.windows(2) {
            assert!(pair[1].current_count >= pair[0].current_count);
            assert!(pair[1].error_count >= pair[0].error_count);
        }
    }

    #[tokio::test]
    async fn test_skip_policy_counts_skipped_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(&dst).expect("Failed to create dst");
        fs::write(dst.join("a.txt"), b"existing").expect("Failed to write existing file");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");
        let (sink, states) = recording_sink();

        factory
            .create(dst.clone())
            .expect("flow")
            .run(sink, CancellationToken::new())
            .await
            .expect("copy should succeed");

        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "existing");
        let last = states.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.skipped_count, 1);
        assert_eq!(last.current_count, 3);
    }

    #[tokio::test]
    async fn test_file_errors_are_counted_not_raised() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let dst = temp_dir.path().join("dst");
        // A directory where a.txt should go makes that one copy fail.
        fs::create_dir_all(dst.join("a.txt")).expect("Failed to create blocking dir");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Overwrite).expect("valid source");
        let (sink, states) = recording_sink();

        factory
            .create(dst.clone())
            .expect("flow")
            .run(sink, CancellationToken::new())
            .await
            .expect("flow completes despite a failed file");

        let last = states.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.error_count, 1);
        assert_eq!(last.current_count, 3);
        assert_eq!(fs::read_to_string(dst.join("b.txt")).unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_cancelled_flow_stops_early() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (sink, states) = recording_sink();

        let result = factory
            .create(temp_dir.path().join("dst"))
            .expect("flow")
            .run(sink, cancel)
            .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(states.lock().unwrap().last().unwrap().current_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_copies_into_every_worker_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let out = temp_dir.path().join("out");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");

        let report = run_batch(3, |i| out.join(format!("worker-{}", i)), &factory)
            .await
            .expect("batch should succeed");

        assert_eq!(report.total_content_count, 12);
        assert_eq!(report.total_error_count, 0);
        assert_eq!(report.status, BatchStatus::Completed);
        for i in 1..=3 {
            let copied = out.join(format!("worker-{}", i)).join("sub").join("c.txt");
            assert_eq!(fs::read_to_string(copied).unwrap(), "data");
        }
    }

    #[tokio::test]
    async fn test_batch_with_cancelled_token_is_partial() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let out = temp_dir.path().join("out");
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_batch_with(
            2,
            |i| out.join(format!("w{}", i)),
            &factory,
            BatchOptions::default().with_cancel(cancel),
        )
        .await
        .expect("cancellation is not a failure");

        assert!(report.is_partial());
        assert_eq!(report.total_content_count, 0);
    }

    #[tokio::test]
    async fn test_batch_factory_error_is_configuration_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = make_source(temp_dir.path());
        let factory = DirectoryCopyFactory::new(&src, OverwritePolicy::Skip).expect("valid source");

        let result = run_batch(2, |_| PathBuf::new(), &factory).await;

        let err = result.expect_err("empty destination is rejected");
        assert!(err.is_configuration());
        assert!(matches!(err, BatchError::FlowConstruction { worker: 1, .. }));
    }
}
