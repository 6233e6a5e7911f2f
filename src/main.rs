//! deploy-backend CLI entry point.
//!
//! Wires the Cloudflare state backend and the runtime registry into a small
//! command line tool for bootstrapping state, moving blobs, and building or
//! running functions locally.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deploy_backend_common::{ConfigFile, Context};
use deploy_backend_provider::{BlobKey, CloudflareHome, CloudflareProvider, ProviderEnv};
use deploy_backend_runtime::{
    BuildInput, BuildOutput, FunctionSpec, Links, Project, RunInput, RuntimeRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "deploy-backend", version, about)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true, env = "DEPLOY_BACKEND_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or adopt the state bucket.
    Bootstrap(Target),

    /// Read, write or delete a state blob.
    #[command(subcommand)]
    State(StateCommand),

    /// Read or set the stage passphrase.
    #[command(subcommand)]
    Passphrase(PassphraseCommand),

    /// Build a function into its artifact directory.
    Build(FunctionArgs),

    /// Build a function, run it, and stream its logs until Ctrl+C.
    Dev {
        #[command(flatten)]
        function: FunctionArgs,

        /// Address workers use to reach the local runtime server.
        #[arg(long, default_value = "127.0.0.1:13557")]
        server: String,
    },
}

#[derive(Debug, Args)]
struct Target {
    #[arg(long, env = "DEPLOY_BACKEND_APP")]
    app: String,

    #[arg(long, env = "DEPLOY_BACKEND_STAGE")]
    stage: String,
}

#[derive(Debug, Args)]
struct BlobArgs {
    #[command(flatten)]
    target: Target,

    /// Blob kind (first key segment).
    #[arg(long, default_value = "state")]
    kind: String,
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    /// Write the blob to stdout.
    Get(BlobArgs),

    /// Store a blob read from `--file` or stdin.
    Put {
        #[command(flatten)]
        blob: BlobArgs,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Delete the blob. Succeeds if it does not exist.
    Remove(BlobArgs),
}

#[derive(Debug, Subcommand)]
enum PassphraseCommand {
    Get(Target),
    Set {
        #[command(flatten)]
        target: Target,

        #[arg(long, env = "DEPLOY_BACKEND_PASSPHRASE", hide_env_values = true)]
        value: String,
    },
}

#[derive(Debug, Args)]
struct FunctionArgs {
    #[arg(long)]
    function_id: String,

    /// Runtime tag, e.g. `nodejs20.x`.
    #[arg(long)]
    runtime: String,

    /// Handler, e.g. `src/api.handler`.
    #[arg(long)]
    handler: String,

    /// Declared link name. Repeatable.
    #[arg(long = "link")]
    links: Vec<String>,

    /// JSON object holding every link value.
    #[arg(long)]
    links_file: Option<PathBuf>,

    /// Project root.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Production build (minified, no source maps).
    #[arg(long)]
    release: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ConfigFile::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let token = CancellationToken::new();
    let ctx = Context::with_token(token.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    match cli.command {
        Command::Bootstrap(target) => {
            let home = open_home(&ctx, &config, &target).await?;
            info!(bucket = home.bucket(), "State backend ready");
        }
        Command::State(command) => state(&ctx, &config, command).await?,
        Command::Passphrase(command) => passphrase(&ctx, &config, command).await?,
        Command::Build(args) => {
            let registry = RuntimeRegistry::with_defaults(&config.backend.node);
            let project = project(&config, &args.root)?;
            let output = build(&ctx, &registry, &project, &args).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            if output.has_errors() {
                bail!("build of {} reported {} error(s)", args.function_id, output.errors.len());
            }
        }
        Command::Dev { function, server } => dev(&ctx, &config, &function, server).await?,
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,deploy_backend=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn open_home(
    ctx: &Context,
    config: &ConfigFile,
    target: &Target,
) -> anyhow::Result<CloudflareHome> {
    let provider = CloudflareProvider::init(
        ctx,
        &target.app,
        &target.stage,
        &config.provider,
        &ProviderEnv::from_process(),
        &config.backend.provider,
    )
    .await
    .context("Failed to initialize Cloudflare provider")?;

    let mut home = CloudflareHome::new(provider, &config.backend.state);
    home.bootstrap(ctx)
        .await
        .context("Failed to bootstrap state bucket")?;
    Ok(home)
}

async fn state(ctx: &Context, config: &ConfigFile, command: StateCommand) -> anyhow::Result<()> {
    match command {
        StateCommand::Get(blob) => {
            let home = open_home(ctx, config, &blob.target).await?;
            let key = blob_key(&blob)?;
            match home.get(ctx, &key).await? {
                Some(data) => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
                None => warn!(key = %key, "Blob does not exist"),
            }
        }
        StateCommand::Put { blob, file } => {
            let home = open_home(ctx, config, &blob.target).await?;
            let key = blob_key(&blob)?;
            let data = match file {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut data = Vec::new();
                    tokio::io::stdin().read_to_end(&mut data).await?;
                    data
                }
            };
            let size = data.len();
            home.put(ctx, &key, data).await?;
            info!(key = %key, size, "Blob stored");
        }
        StateCommand::Remove(blob) => {
            let home = open_home(ctx, config, &blob.target).await?;
            let key = blob_key(&blob)?;
            home.remove(ctx, &key).await?;
            info!(key = %key, "Blob removed");
        }
    }
    Ok(())
}

fn blob_key(blob: &BlobArgs) -> anyhow::Result<BlobKey> {
    Ok(BlobKey::new(
        blob.kind.as_str(),
        blob.target.app.as_str(),
        blob.target.stage.as_str(),
    )?)
}

async fn passphrase(
    ctx: &Context,
    config: &ConfigFile,
    command: PassphraseCommand,
) -> anyhow::Result<()> {
    match command {
        PassphraseCommand::Get(target) => {
            let home = open_home(ctx, config, &target).await?;
            let value = home
                .get_passphrase(ctx, &target.app, &target.stage)
                .await?;
            println!("{value}");
        }
        PassphraseCommand::Set { target, value } => {
            let home = open_home(ctx, config, &target).await?;
            home.set_passphrase(ctx, &target.app, &target.stage, &value)
                .await?;
            info!(app = %target.app, stage = %target.stage, "Passphrase stored");
        }
    }
    Ok(())
}

async fn read_links(path: Option<&Path>) -> anyhow::Result<Links> {
    let Some(path) = path else {
        return Ok(Links::new());
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} must hold a JSON object of link values", path.display()))
}

/// The project both `build` and `dev` operate on, rooted at an absolute path.
fn project(config: &ConfigFile, root: &Path) -> anyhow::Result<Project> {
    let root = std::path::absolute(root)
        .with_context(|| format!("Invalid project root {}", root.display()))?;
    Ok(Project::new(root).with_artifacts_dir(&config.backend.build.artifacts_dir))
}

async fn build(
    ctx: &Context,
    registry: &RuntimeRegistry,
    project: &Project,
    args: &FunctionArgs,
) -> anyhow::Result<BuildOutput> {
    let input = BuildInput {
        function: FunctionSpec {
            function_id: args.function_id.clone(),
            runtime: args.runtime.clone(),
            handler: args.handler.clone(),
            links: args.links.clone(),
            properties: serde_json::Value::Null,
        },
        project: project.clone(),
        links: read_links(args.links_file.as_deref()).await?,
        dev: !args.release,
    };

    registry
        .build(ctx, input)
        .await
        .with_context(|| format!("Failed to build {}", args.function_id))
}

async fn dev(
    ctx: &Context,
    config: &ConfigFile,
    args: &FunctionArgs,
    server: String,
) -> anyhow::Result<()> {
    let registry = RuntimeRegistry::with_defaults(&config.backend.node);
    let project = project(config, &args.root)?;
    let output = build(ctx, &registry, &project, args).await?;
    if output.has_errors() {
        for error in &output.errors {
            eprintln!("{error}");
        }
        bail!("build of {} failed", args.function_id);
    }

    let input = RunInput {
        project,
        server,
        function_id: args.function_id.clone(),
        worker_id: uuid::Uuid::new_v4().to_string(),
        runtime: args.runtime.clone(),
        build: output,
        env: Vec::new(),
    };
    let worker = registry
        .run(ctx, &input)
        .await
        .with_context(|| format!("Failed to start {}", args.function_id))?;
    let mut logs = worker.logs();

    loop {
        tokio::select! {
            line = logs.next_line() => match line {
                Some(line) => println!("{line}"),
                None => break,
            },
            () = ctx.cancelled() => break,
        }
    }

    worker.stop().await;
    Ok(())
}
