//! Runtime abstraction and the data passed through builds and runs.
//!
//! A [`Runtime`] compiles and executes functions for one language toolchain.
//! Implementations are held by the [`RuntimeRegistry`](crate::RuntimeRegistry),
//! which picks one per request by its runtime tag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use deploy_backend_common::{Context, RuntimeError};

use crate::worker::Worker;

/// Directory under the project root that holds generated files.
pub const WORKING_DIR: &str = ".deploy";

/// Directory under the working dir that holds build outputs.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Link name to link value.
pub type Links = BTreeMap<String, serde_json::Value>;

/// A function as declared by the project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Unique function identifier. Names the artifact directory.
    #[serde(rename = "functionID", alias = "functionId")]
    pub function_id: String,

    /// Runtime tag, e.g. `nodejs20.x`.
    pub runtime: String,

    /// Handler reference, e.g. `src/api.handler`.
    pub handler: String,

    /// Names of the links this function may see.
    #[serde(default)]
    pub links: Vec<String>,

    /// Runtime-specific settings.
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Paths of the project being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
    working_dir: PathBuf,
    artifacts_dir: String,
}

impl Project {
    /// Create a project rooted at `root` with the default working dir.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            working_dir: root.join(WORKING_DIR),
            root,
            artifacts_dir: ARTIFACTS_DIR.to_string(),
        }
    }

    /// Use `dir` as the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Use `name` as the artifacts directory under the working dir.
    #[must_use]
    pub fn with_artifacts_dir(mut self, name: impl Into<String>) -> Self {
        self.artifacts_dir = name.into();
        self
    }

    pub fn path_root(&self) -> &Path {
        &self.root
    }

    pub fn path_working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn path_artifacts(&self) -> PathBuf {
        self.working_dir.join(&self.artifacts_dir)
    }
}

/// Input to a build.
#[derive(Debug, Clone)]
pub struct BuildInput {
    pub function: FunctionSpec,
    pub project: Project,

    /// All link values known to the caller. The pipeline narrows this to the
    /// function's declared links before the runtime sees it.
    pub links: Links,

    /// Development build (source maps, no minification).
    pub dev: bool,
}

impl BuildInput {
    /// Canonical output directory: `<working dir>/artifacts/<function id>`.
    pub fn out(&self) -> PathBuf {
        self.project.path_artifacts().join(&self.function.function_id)
    }
}

/// Result of a build.
///
/// A build can succeed and still carry `errors`; callers must check both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// Artifact directory.
    pub out: PathBuf,

    /// Entry point within `out`, e.g. `index.handler`.
    pub handler: String,

    /// Non-fatal diagnostics collected during compilation.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BuildOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Input to a run.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub project: Project,

    /// Address of the local runtime server workers connect back to.
    pub server: String,
    pub function_id: String,
    pub worker_id: String,

    /// Runtime tag used to pick the implementation.
    pub runtime: String,
    pub build: BuildOutput,

    /// Extra environment for the worker process.
    pub env: Vec<(String, String)>,
}

/// A language runtime.
///
/// `matches` must be deterministic; the registry calls it for every lookup.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns `true` if this runtime handles `runtime` tags like this one.
    fn matches(&self, runtime: &str) -> bool;

    /// Compile a function into `input.out()`, which exists and is empty.
    async fn build(&self, ctx: &Context, input: &BuildInput) -> Result<BuildOutput, RuntimeError>;

    /// Start a worker for a built function.
    async fn run(&self, ctx: &Context, input: &RunInput) -> Result<Box<dyn Worker>, RuntimeError>;

    /// Returns `true` if a change to `path` affects the last build of
    /// `function_id`.
    fn should_rebuild(&self, function_id: &str, path: &Path) -> bool;
}
