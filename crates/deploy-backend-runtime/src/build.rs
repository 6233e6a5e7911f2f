//! Build pipeline.
//!
//! [`RuntimeRegistry::build`] owns the artifact directory. For every build it:
//!
//! 1. resolves the runtime for the function's tag
//! 2. wipes and recreates `<working dir>/artifacts/<function id>`
//! 3. narrows the link map to the links the function declares
//! 4. delegates compilation to the runtime
//! 5. reports the canonical directory as the output path
//!
//! Builds of the same function must not run concurrently; callers serialize
//! them per function id.

use std::io;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use deploy_backend_common::{Context, RuntimeError};

use crate::registry::RuntimeRegistry;
use crate::runtime::{BuildInput, BuildOutput, Links};

impl RuntimeRegistry {
    /// Build a function into its artifact directory.
    ///
    /// Diagnostics from the toolchain come back in [`BuildOutput::errors`]
    /// on an `Ok` result.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RuntimeNotFound`] if no runtime matches,
    /// [`RuntimeError::InvalidInput`] for an unusable function id, the I/O
    /// error from preparing the directory, or the runtime's own error.
    pub async fn build(&self, ctx: &Context, input: BuildInput) -> Result<BuildOutput, RuntimeError> {
        let runtime = input.function.runtime.clone();
        let function_id = input.function.function_id.clone();
        let start = Instant::now();

        info!(runtime = %runtime, function_id = %function_id, "building function");
        let result = self.build_function(ctx, input).await;
        info!(
            runtime = %runtime,
            function_id = %function_id,
            duration_ms = start.elapsed().as_millis(),
            success = result.is_ok(),
            "function built"
        );

        result
    }

    async fn build_function(
        &self,
        ctx: &Context,
        mut input: BuildInput,
    ) -> Result<BuildOutput, RuntimeError> {
        let runtime = self
            .resolve(&input.function.runtime)
            .ok_or_else(|| RuntimeError::runtime_not_found(&input.function.runtime))?;

        validate_function_id(&input.function.function_id)?;
        ctx.check(RuntimeError::Cancelled)?;

        let out = input.out();
        reset_dir(&out).await?;

        input.links = narrow_links(
            &input.function.function_id,
            &input.function.links,
            &input.links,
        );

        let mut output = ctx
            .run(RuntimeError::Cancelled, runtime.build(ctx, &input))
            .await?;
        output.out = out;

        if output.has_errors() {
            warn!(
                function_id = %input.function.function_id,
                errors = output.errors.len(),
                "Build finished with errors"
            );
        }

        Ok(output)
    }
}

/// Remove `dir` with everything in it, then recreate it empty.
async fn reset_dir(dir: &Path) -> Result<(), RuntimeError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed previous artifacts"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// Keep only the declared links. Declared names with no known value are
/// passed as `null`.
fn narrow_links(function_id: &str, declared: &[String], all: &Links) -> Links {
    declared
        .iter()
        .map(|name| {
            let value = all.get(name).cloned().unwrap_or_else(|| {
                warn!(function_id, link = %name, "Declared link has no value");
                serde_json::Value::Null
            });
            (name.clone(), value)
        })
        .collect()
}

/// The function id becomes a single directory name.
fn validate_function_id(function_id: &str) -> Result<(), RuntimeError> {
    if function_id.is_empty() {
        return Err(RuntimeError::invalid_input("function id must not be empty"));
    }
    if function_id == "." || function_id == ".." {
        return Err(RuntimeError::invalid_input(format!(
            "function id must not be '{function_id}'"
        )));
    }
    if function_id.contains(['/', '\\']) {
        return Err(RuntimeError::invalid_input(format!(
            "function id must not contain path separators: {function_id}"
        )));
    }
    Ok(())
}
