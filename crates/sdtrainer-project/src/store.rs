//! Serialized access to `project.json`.
//!
//! A [`ProjectStore`] owns one worker thread per project. Every read, write, and
//! read-modify-write is a job on the worker's queue, so jobs run one at a time in
//! submission order and concurrent callers never interleave their updates.

use crate::error::{ProjectError, ProjectResult};
use crate::layout::ProjectLayout;
use crate::meta::{read_or_create, write_meta_file, ProjectMeta, ProjectMetaPatch};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Box<dyn FnOnce(&Worker) + Send>;

struct Worker {
    layout: ProjectLayout,
    revision: Arc<AtomicU64>,
}

impl Worker {
    fn read(&self) -> ProjectResult<ProjectMeta> {
        read_or_create(&self.layout.meta_file())
    }

    fn write(&self, meta: &ProjectMeta) -> ProjectResult<u64> {
        write_meta_file(&self.layout.meta_file(), meta)?;
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(revision, path = %self.layout.meta_file().display(), "project metadata written");
        Ok(revision)
    }

    fn modify<F, R>(&self, f: F) -> ProjectResult<R>
    where
        F: FnOnce(&ProjectLayout, &mut ProjectMeta) -> ProjectResult<R>,
    {
        let mut meta = self.read()?;
        let before = meta.clone();
        let out = f(&self.layout, &mut meta)?;
        if meta != before {
            self.write(&meta)?;
        }
        Ok(out)
    }
}

/// Handle to the single writer of a project's metadata. Cheap to clone.
#[derive(Clone)]
pub struct ProjectStore {
    layout: ProjectLayout,
    tx: mpsc::UnboundedSender<Job>,
    revision: Arc<AtomicU64>,
}

impl std::fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectStore")
            .field("root", &self.layout.root())
            .field("revision", &self.revision())
            .finish()
    }
}

impl ProjectStore {
    /// Start the worker for the project at `layout`.
    ///
    /// The worker exits once every handle has been dropped.
    pub fn open(layout: ProjectLayout) -> ProjectResult<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let revision = Arc::new(AtomicU64::new(0));
        let worker = Worker {
            layout: layout.clone(),
            revision: Arc::clone(&revision),
        };

        std::thread::Builder::new()
            .name("project-store".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(|| job(&worker))).is_err() {
                        error!(root = %worker.layout.root().display(), "project store job panicked");
                    }
                }
                debug!(root = %worker.layout.root().display(), "project store worker stopped");
            })?;

        Ok(Self { layout, tx, revision })
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Number of writes performed through this store.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    async fn submit<F, R>(&self, f: F) -> ProjectResult<R>
    where
        F: FnOnce(&Worker) -> ProjectResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: Job = Box::new(move |worker| {
            let _ = reply.send(f(worker));
        });
        self.tx.send(job).map_err(|_| ProjectError::StoreClosed)?;
        rx.await.map_err(|_| ProjectError::StoreClosed)?
    }

    /// Load the metadata, creating a default document if absent.
    pub async fn read(&self) -> ProjectResult<ProjectMeta> {
        self.submit(|w| w.read()).await
    }

    /// Overwrite the whole document. Returns the new revision.
    pub async fn write(&self, meta: ProjectMeta) -> ProjectResult<u64> {
        self.submit(move |w| w.write(&meta)).await
    }

    /// Shallow merge of top-level keys. Returns the merged document.
    pub async fn update(&self, patch: ProjectMetaPatch) -> ProjectResult<ProjectMeta> {
        self.modify(move |_, meta| {
            patch.apply(meta);
            Ok(meta.clone())
        })
        .await
    }

    /// Run `f` against a fresh copy of the metadata and persist it if it changed.
    ///
    /// `f` runs on the worker thread, so it may do blocking file work.
    /// When `f` fails nothing is written.
    pub async fn modify<F, R>(&self, f: F) -> ProjectResult<R>
    where
        F: FnOnce(&ProjectLayout, &mut ProjectMeta) -> ProjectResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.submit(move |w| w.modify(f)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{DatasetFolder, ProjectParam};

    fn store() -> (tempfile::TempDir, ProjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::open(ProjectLayout::new(dir.path())).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_read_creates_file() {
        let (dir, store) = store();
        let meta = store.read().await.unwrap();
        assert_eq!(meta, ProjectMeta::default());
        assert!(dir.path().join("project.json").is_file());
    }

    #[tokio::test]
    async fn test_unchanged_modify_does_not_write() {
        let (_dir, store) = store();
        store.read().await.unwrap();
        store.modify(|_, _| Ok(())).await.unwrap();
        assert_eq!(store.revision(), 0);

        store
            .update(ProjectMetaPatch {
                params: Some(ProjectParam { width: 640, height: 640 }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.revision(), 1);
        assert_eq!(store.read().await.unwrap().params.width, 640);
    }

    #[tokio::test]
    async fn test_failed_modify_leaves_file_untouched() {
        let (_dir, store) = store();
        let result: ProjectResult<()> = store
            .modify(|_, meta| {
                meta.params.width = 1;
                Err(ProjectError::NotOpen)
            })
            .await;
        assert!(matches!(result, Err(ProjectError::NotOpen)));
        assert_eq!(store.read().await.unwrap().params.width, 512);
    }

    #[tokio::test]
    async fn test_concurrent_modifies_do_not_lose_updates() {
        let (_dir, store) = store();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .modify(move |_, meta| {
                        meta.dataset.push(DatasetFolder {
                            name: format!("f{i}"),
                            step: i,
                            images: vec![],
                        });
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let meta = store.read().await.unwrap();
        assert_eq!(meta.dataset.len(), 32);
        assert_eq!(store.revision(), 32);
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_worker_alive() {
        let (_dir, store) = store();
        let result: ProjectResult<()> = store.modify(|_, _| panic!("boom")).await;
        assert!(matches!(result, Err(ProjectError::StoreClosed)));
        assert!(store.read().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_file_is_reported() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("project.json"), "[1,2]").unwrap();
        assert!(matches!(store.read().await, Err(ProjectError::InvalidMeta { .. })));
    }
}
