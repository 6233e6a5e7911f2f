//! Worker lifecycle: starting workers and deciding on rebuilds.

use std::path::Path;

use tracing::{debug, info};

use deploy_backend_common::{Context, RuntimeError};

use crate::registry::RuntimeRegistry;
use crate::runtime::RunInput;
use crate::worker::Worker;

impl RuntimeRegistry {
    /// Start a worker for a built function.
    ///
    /// The caller owns the returned worker and must stop it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RuntimeNotFound`] if no runtime matches, or
    /// the runtime's own error.
    pub async fn run(&self, ctx: &Context, input: &RunInput) -> Result<Box<dyn Worker>, RuntimeError> {
        info!(
            runtime = %input.runtime,
            function_id = %input.function_id,
            worker_id = %input.worker_id,
            "running function"
        );

        let runtime = self
            .resolve(&input.runtime)
            .ok_or_else(|| RuntimeError::runtime_not_found(&input.runtime))?;

        ctx.run(RuntimeError::Cancelled, runtime.run(ctx, input)).await
    }

    /// Returns `true` if a change to `path` should trigger a rebuild of
    /// `function_id`. Unknown runtimes never trigger rebuilds.
    pub fn should_rebuild(&self, runtime: &str, function_id: &str, path: &Path) -> bool {
        info!(
            runtime,
            function_id,
            file = %path.display(),
            "checking if function should be rebuilt"
        );

        match self.resolve(runtime) {
            Some(r) => r.should_rebuild(function_id, path),
            None => {
                debug!(runtime, "No runtime for tag, skipping rebuild");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::fake::StubRuntime;
    use crate::runtime::{BuildOutput, Project};

    fn run_input(runtime: &str) -> RunInput {
        RunInput {
            project: Project::new("/srv/app"),
            server: "127.0.0.1:13557".into(),
            function_id: "Api".into(),
            worker_id: "worker-1".into(),
            runtime: runtime.into(),
            build: BuildOutput {
                out: PathBuf::from("/srv/app/.deploy/artifacts/Api"),
                handler: "index.handler".into(),
                errors: Vec::new(),
            },
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_run_delegates_to_runtime() {
        let stub = StubRuntime::new("stub", "stub").arc();
        let mut registry = RuntimeRegistry::new();
        registry.register(stub.clone());

        let worker = registry
            .run(&Context::new(), &run_input("stub1"))
            .await
            .unwrap();

        assert_eq!(worker.worker_id(), "worker-1");
        assert_eq!(stub.runs(), 1);
        worker.stop().await;
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_run_unknown_runtime() {
        let registry = RuntimeRegistry::new();

        let result = registry.run(&Context::new(), &run_input("cobol85")).await;

        match result {
            Err(err) => assert!(err.is_not_found()),
            Ok(_) => panic!("expected RuntimeNotFound"),
        }
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let mut registry = RuntimeRegistry::new();
        registry.register(StubRuntime::new("stub", "stub").arc());
        let ctx = Context::new();
        ctx.cancel();

        let result = registry.run(&ctx, &run_input("stub1")).await;

        assert!(matches!(result, Err(RuntimeError::Cancelled)));
    }

    #[test]
    fn test_should_rebuild_unknown_runtime_is_false() {
        let registry = RuntimeRegistry::new();

        assert!(!registry.should_rebuild("cobol85", "Api", Path::new("src/api.ts")));
    }

    #[test]
    fn test_should_rebuild_delegates() {
        let mut registry = RuntimeRegistry::new();
        registry.register(
            StubRuntime::new("stub", "stub")
                .with_rebuild_path("src/api.ts")
                .arc(),
        );

        assert!(registry.should_rebuild("stub1", "Api", Path::new("src/api.ts")));
        assert!(!registry.should_rebuild("stub1", "Api", Path::new("README.md")));
    }
}
