//! Recording [`Runtime`] double for unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use deploy_backend_common::{Context, RuntimeError};

use crate::runtime::{BuildInput, BuildOutput, Links, RunInput, Runtime};
use crate::worker::{LogStream, Worker};

/// Runtime claiming every tag that starts with `prefix`.
pub(crate) struct StubRuntime {
    name: String,
    prefix: String,
    errors: Vec<String>,
    rebuild_paths: HashSet<PathBuf>,
    seen_links: Mutex<Vec<Links>>,
    seen_files: Mutex<Vec<Vec<PathBuf>>>,
    builds: AtomicUsize,
    runs: AtomicUsize,
}

impl StubRuntime {
    pub(crate) fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            errors: Vec::new(),
            rebuild_paths: HashSet::new(),
            seen_links: Mutex::new(Vec::new()),
            seen_files: Mutex::new(Vec::new()),
            builds: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    /// Report these diagnostics from every build.
    pub(crate) fn with_errors(mut self, errors: &[&str]) -> Self {
        self.errors = errors.iter().map(ToString::to_string).collect();
        self
    }

    pub(crate) fn with_rebuild_path(mut self, path: &str) -> Self {
        self.rebuild_paths.insert(PathBuf::from(path));
        self
    }

    pub(crate) fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Links passed to the most recent build.
    pub(crate) fn last_links(&self) -> Option<Links> {
        self.seen_links.lock().last().cloned()
    }

    /// Directory entries present when the most recent build started.
    pub(crate) fn last_files(&self) -> Option<Vec<PathBuf>> {
        self.seen_files.lock().last().cloned()
    }
}

#[async_trait]
impl Runtime for StubRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, runtime: &str) -> bool {
        runtime.starts_with(&self.prefix)
    }

    async fn build(&self, _ctx: &Context, input: &BuildInput) -> Result<BuildOutput, RuntimeError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.seen_links.lock().push(input.links.clone());

        let out = input.out();
        let files = std::fs::read_dir(&out)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        self.seen_files.lock().push(files);

        std::fs::write(out.join("bundle.js"), b"// built")?;

        Ok(BuildOutput {
            out: PathBuf::from("/somewhere/else"),
            handler: "bundle.handler".to_string(),
            errors: self.errors.clone(),
        })
    }

    async fn run(&self, _ctx: &Context, input: &RunInput) -> Result<Box<dyn Worker>, RuntimeError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubWorker::new(&input.worker_id)))
    }

    fn should_rebuild(&self, _function_id: &str, path: &Path) -> bool {
        self.rebuild_paths.contains(path)
    }
}

/// Worker that does nothing.
pub(crate) struct StubWorker {
    worker_id: String,
}

impl StubWorker {
    pub(crate) fn new(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
        }
    }
}

#[async_trait]
impl Worker for StubWorker {
    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    async fn stop(&self) {}

    fn logs(&self) -> LogStream {
        LogStream::closed()
    }
}
