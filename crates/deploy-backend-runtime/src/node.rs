//! Node.js runtime.
//!
//! Builds bundle the handler's source file with an esbuild-compatible CLI
//! into `<out>/index.mjs`. The function's links are written next to the
//! bundle as `links.json`. The bundler's metafile lists every source file
//! that went into the bundle; those inputs drive [`Runtime::should_rebuild`].
//!
//! Workers run `node <out>/index.mjs` with the function and worker identity
//! in the environment.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use deploy_backend_common::{Context, NodeConfig, RuntimeError};

use crate::runtime::{BuildInput, BuildOutput, RunInput, Runtime};
use crate::worker::{ProcessWorker, Worker};

/// Bundle file name inside the artifact directory.
pub const ENTRY_FILE: &str = "index.mjs";

/// Link values file name inside the artifact directory.
pub const LINKS_FILE: &str = "links.json";

const METAFILE: &str = "metafile.json";

/// Source extensions tried, in order, when resolving a handler.
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Subset of the esbuild metafile we read.
#[derive(Debug, Deserialize)]
struct Metafile {
    #[serde(default)]
    inputs: BTreeMap<String, serde_json::Value>,
}

/// Source files of one function's last successful build.
#[derive(Debug, Clone)]
struct BuildInputs {
    /// Directory the bundler ran in. Metafile paths are relative to it.
    root: PathBuf,
    files: HashSet<PathBuf>,
}

impl BuildInputs {
    fn contains(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.files.contains(relative)
    }
}

/// Runtime for `nodejs*` / `node*` tags.
pub struct NodeRuntime {
    config: NodeConfig,

    /// Function id to its bundle inputs.
    inputs: DashMap<String, BuildInputs>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            inputs: DashMap::new(),
        }
    }

    /// Split `src/api.handler` into the source file and the export name.
    fn resolve_handler(root: &Path, handler: &str) -> Result<(PathBuf, String), String> {
        let (module, export) = handler
            .rsplit_once('.')
            .filter(|(module, export)| !module.is_empty() && !export.is_empty())
            .ok_or_else(|| format!("Invalid handler \"{handler}\", expected <file>.<export>"))?;

        SOURCE_EXTENSIONS
            .iter()
            .map(|ext| root.join(format!("{module}.{ext}")))
            .find(|candidate| candidate.is_file())
            .map(|file| (file, export.to_string()))
            .ok_or_else(|| format!("Could not find file for handler \"{handler}\""))
    }

    fn bundler_command(&self, input: &BuildInput, source: &Path, out: &Path) -> Command {
        let mut command = Command::new(&self.config.bundler);
        command
            .arg(source)
            .arg("--bundle")
            .arg("--platform=node")
            .arg("--format=esm")
            .arg(format!("--outfile={}", out.join(ENTRY_FILE).display()))
            .arg(format!("--metafile={}", out.join(METAFILE).display()));

        if input.dev {
            command.arg("--sourcemap");
        } else {
            command.arg("--minify");
        }

        command
            .args(&self.config.extra_args)
            .current_dir(input.project.path_root())
            .kill_on_drop(true);
        command
    }

    /// Remember the bundle inputs from the metafile. A missing or unreadable
    /// metafile forgets the function so it is never rebuilt on stale data.
    async fn record_inputs(&self, function_id: &str, root: &Path, metafile: &Path) {
        let parsed = match tokio::fs::read(metafile).await {
            Ok(bytes) => serde_json::from_slice::<Metafile>(&bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(meta) => {
                let files: HashSet<PathBuf> = meta.inputs.into_keys().map(PathBuf::from).collect();
                debug!(function_id, inputs = files.len(), "Recorded bundle inputs");
                self.inputs.insert(
                    function_id.to_string(),
                    BuildInputs {
                        root: root.to_path_buf(),
                        files,
                    },
                );
            }
            Err(e) => {
                warn!(function_id, error = %e, "Failed to read bundler metafile");
                self.inputs.remove(function_id);
            }
        }
    }
}

#[async_trait]
impl Runtime for NodeRuntime {
    fn name(&self) -> &str {
        "node"
    }

    fn matches(&self, runtime: &str) -> bool {
        runtime.starts_with("node")
    }

    async fn build(&self, _ctx: &Context, input: &BuildInput) -> Result<BuildOutput, RuntimeError> {
        let out = input.out();
        let function_id = input.function.function_id.as_str();
        let root = input.project.path_root();

        let (source, export) = match Self::resolve_handler(root, &input.function.handler) {
            Ok(resolved) => resolved,
            Err(message) => {
                self.inputs.remove(function_id);
                return Ok(BuildOutput {
                    out,
                    handler: input.function.handler.clone(),
                    errors: vec![message],
                });
            }
        };

        let links = serde_json::to_vec_pretty(&input.links)
            .map_err(|e| RuntimeError::invalid_input(format!("links are not serializable: {e}")))?;
        tokio::fs::write(out.join(LINKS_FILE), links).await?;

        debug!(
            function_id,
            source = %source.display(),
            bundler = %self.config.bundler,
            "Bundling function"
        );
        let output = self
            .bundler_command(input, &source, &out)
            .output()
            .await
            .map_err(|e| {
                RuntimeError::build_failed(format!("failed to run {}: {e}", self.config.bundler))
            })?;

        let handler = format!("index.{export}");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut errors: Vec<String> = stderr
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToString::to_string)
                .collect();
            if errors.is_empty() {
                errors.push(format!("{} exited with {}", self.config.bundler, output.status));
            }

            self.inputs.remove(function_id);
            return Ok(BuildOutput {
                out,
                handler,
                errors,
            });
        }

        self.record_inputs(function_id, root, &out.join(METAFILE))
            .await;

        Ok(BuildOutput {
            out,
            handler,
            errors: Vec::new(),
        })
    }

    async fn run(&self, _ctx: &Context, input: &RunInput) -> Result<Box<dyn Worker>, RuntimeError> {
        let entry = input.build.out.join(ENTRY_FILE);

        let mut command = Command::new(&self.config.node);
        command
            .arg(&entry)
            .current_dir(&input.build.out)
            .envs(input.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("FUNCTION_ID", &input.function_id)
            .env("WORKER_ID", &input.worker_id)
            .env("RUNTIME_SERVER", &input.server);

        let worker = ProcessWorker::spawn(&input.worker_id, command)?;
        info!(
            function_id = %input.function_id,
            worker_id = %input.worker_id,
            entry = %entry.display(),
            "Node worker started"
        );

        Ok(Box::new(worker))
    }

    fn should_rebuild(&self, function_id: &str, path: &Path) -> bool {
        self.inputs
            .get(function_id)
            .is_some_and(|inputs| inputs.contains(path))
    }
}

impl std::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRuntime")
            .field("config", &self.config)
            .field("tracked_functions", &self.inputs.len())
            .finish()
    }
}
