mod output;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;
use wsync_config::{Config, Target};
use wsync_library::sync::{SyncEvent, SyncFile, sync, task_detail};
use wsync_library::{BackendGateway, Context, get_file_tree, store_file};
use wsync_storage::BackendHandle;
use wsync_storage::backend::LocalBackend;
use wsync_store::models::{Environment, TaskQuery, TaskStatus};
use wsync_store::{Database, Repository};

/// Turn an `exn` error tree into a report, keeping every frame.
trait Report<T> {
    fn report(self) -> Result<T>;
}
impl<T, E: std::error::Error + Send + Sync + 'static> Report<T> for std::result::Result<T, exn::Exn<E>> {
    fn report(self) -> Result<T> {
        self.map_err(|err| miette::miette!("{err:?}"))
    }
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (TOML, YAML or JSON). Defaults to the platform config directory.
    #[arg(short, long, global = true, env = "WSYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Log debug events (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage users.
    #[command(subcommand)]
    User(UserCommand),
    /// Manage workspaces.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Store a local file inside a workspace.
    Put {
        workspace: i64,
        /// Path inside the workspace.
        path: String,
        /// Local file to read the bytes from.
        file: PathBuf,
        #[arg(long)]
        actor: i64,
    },
    /// Show the file tree of a workspace.
    Tree {
        workspace: i64,
        #[arg(long)]
        json: bool,
    },
    /// Synchronize workspace files to an environment.
    Sync {
        workspace: i64,
        environment: Environment,
        /// Paths to synchronize; every file of the workspace if omitted.
        paths: Vec<String>,
        #[arg(long)]
        actor: i64,
    },
    /// List sync tasks, newest first.
    Tasks(TaskFilters),
    /// Show one sync task with its per-file outcomes.
    Task { id: i64 },
}

#[derive(Subcommand)]
enum UserCommand {
    Add { username: String },
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    Add {
        name: String,
        #[arg(long)]
        creator: i64,
    },
    List,
}

#[derive(Args)]
struct TaskFilters {
    #[arg(long)]
    workspace: Option<i64>,
    /// Substring of the workspace name.
    #[arg(long)]
    workspace_name: Option<String>,
    /// Substring of a contained file name.
    #[arg(long)]
    file_name: Option<String>,
    /// Substring of a contained file path.
    #[arg(long)]
    file_path: Option<String>,
    /// Username of a contained file's modifier.
    #[arg(long)]
    modifier: Option<String>,
    #[arg(long, value_parser = parse_status)]
    status: Option<TaskStatus>,
    /// Created at or after (RFC 3339).
    #[arg(long, value_parser = parse_time)]
    since: Option<OffsetDateTime>,
    /// Created at or before (RFC 3339).
    #[arg(long, value_parser = parse_time)]
    until: Option<OffsetDateTime>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    page_size: u32,
}
impl From<TaskFilters> for TaskQuery {
    fn from(filters: TaskFilters) -> Self {
        Self {
            workspace_id: filters.workspace,
            workspace_name: filters.workspace_name,
            file_name: filters.file_name,
            file_path: filters.file_path,
            modifier_name: filters.modifier,
            status: filters.status,
            start_time: filters.since,
            end_time: filters.until,
            page: filters.page,
            page_size: filters.page_size,
        }
    }
}

fn parse_status(value: &str) -> std::result::Result<TaskStatus, String> {
    value.parse().map_err(|_| format!("expected one of success, partial_success, failed; got {value:?}"))
}

fn parse_time(value: &str) -> std::result::Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref()).report().wrap_err("could not load configuration")?;
    if let Some(parent) = config.database.parent() {
        tokio::fs::create_dir_all(parent).await.into_diagnostic()?;
    }
    let db = Database::connect_for_sync(&config.database, config.sync.concurrency).await.report()?;
    let ctx = context(&config, Repository::from(&db)).await?;
    let result = run(cli.command, &ctx).await;
    db.close().await;
    result
}

async fn context(config: &Config, repo: Repository) -> Result<Context> {
    let staging = LocalBackend::new("staging", &config.staging).report()?;
    let mut gateway = BackendGateway::new();
    for (name, target) in config.environments.iter() {
        let environment: Environment = name.parse().into_diagnostic()?;
        gateway = gateway.with_target(environment, backend(name, target).await?);
    }
    if config.sync.dry_run {
        tracing::info!("dry run: uploads are recorded but not performed");
        gateway = gateway.read_only();
    }
    Ok(Context::new(repo, Arc::new(staging), Arc::new(gateway)).with_concurrency(config.sync.concurrency))
}

async fn backend(name: &str, target: &Target) -> Result<BackendHandle> {
    Ok(match target {
        Target::Local { path } => Arc::new(LocalBackend::new(name, path).report()?),
        #[cfg(feature = "s3")]
        Target::S3 { bucket, prefix, region, endpoint, key_id, key_secret } => Arc::new(
            wsync_storage::backend::S3Backend::new(
                name,
                bucket,
                prefix.clone(),
                region,
                endpoint.as_deref(),
                key_id,
                key_secret,
            )
            .await
            .report()?,
        ),
        #[cfg(not(feature = "s3"))]
        Target::S3 { .. } => miette::bail!("environment {name} targets S3, which this build does not support"),
    })
}

async fn run(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::User(UserCommand::Add { username }) => {
            let user = ctx.repo.create_user(&username).await.report()?;
            println!("created user {} ({})", user.id, user.username);
        },
        Command::Workspace(WorkspaceCommand::Add { name, creator }) => {
            let workspace = ctx.repo.create_workspace(&name, creator).await.report()?;
            println!("created workspace {} ({})", workspace.id, workspace.name);
        },
        Command::Workspace(WorkspaceCommand::List) => {
            for workspace in ctx.repo.list_workspaces().await.report()? {
                println!("{:>6}  {}", workspace.id, workspace.name);
            }
        },
        Command::Put { workspace, path, file, actor } => {
            let content = tokio::fs::read(&file).await.into_diagnostic().wrap_err_with(|| file.display().to_string())?;
            let record = store_file(ctx, workspace, &path, &content, actor).await.report()?;
            println!("stored {} ({} bytes, {})", record.path, record.size, record.fingerprint);
        },
        Command::Tree { workspace, json } => {
            let forest = get_file_tree(&ctx.repo, workspace).await.report()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forest).into_diagnostic()?);
            } else {
                print!("{}", output::tree(&forest));
            }
        },
        Command::Sync { workspace, environment, paths, actor } => {
            let files = if paths.is_empty() {
                ctx.repo.list_records(workspace).await.report()?.iter().map(SyncFile::from).collect()
            } else {
                let mut files = Vec::with_capacity(paths.len());
                for path in &paths {
                    files.push(SyncFile::from(&ctx.repo.get_record(workspace, path).await.report()?));
                }
                files
            };
            let mut events = pin!(sync(ctx, workspace, environment, files, actor));
            let mut started = false;
            while let Some(event) = events.next().await {
                match event {
                    Ok(SyncEvent::Started(task)) => {
                        started = true;
                        println!("task {} started: {} files", task.id, task.total_files);
                    },
                    Ok(SyncEvent::Synced(record)) => println!("{}", output::outcome(&record)),
                    Ok(SyncEvent::Complete(task)) => println!("{}", output::summary(&task)),
                    // The file was attempted but its outcome could not be recorded.
                    Err(err) if started => tracing::error!(error = ?err, "sync outcome not recorded"),
                    Err(err) => return Err(err).report(),
                }
            }
        },
        Command::Tasks(filters) => {
            let page = ctx.repo.query_tasks(&filters.into()).await.report()?;
            print!("{}", output::tasks(&page));
        },
        Command::Task { id } => {
            let detail = task_detail(ctx, id).await.report()?;
            println!("{}", serde_json::to_string_pretty(&detail).into_diagnostic()?);
        },
    }
    Ok(())
}
