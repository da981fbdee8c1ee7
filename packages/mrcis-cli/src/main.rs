//! `mrcis` binary (§6 CLI surface): `serve`, `init`, `status`, `reindex`.
//! Exit codes: 0 success, 1 runtime failure, 2 configuration error.

mod config_loader;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use mrcis_core::config::Transport;
use mrcis_core::embedding::OpenAiEmbeddingClient;
use mrcis_orchestration::MrcisService;

#[derive(Parser)]
#[command(name = "mrcis", about = "Multi-repository code intelligence service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    Sse,
}

#[derive(Subcommand)]
enum Commands {
    /// Start runtime then serve.
    Serve {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,
    },
    /// Create schema, validate repository paths.
    Init {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print repository status.
    Status {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(long)]
        repository: Option<String>,
    },
    /// Mark files pending; enqueue.
    Reindex {
        repository: String,
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve { config, transport } => run_serve(config, transport),
        Commands::Init { config } => run_init(config),
        Commands::Status { config, repository } => run_status(config, repository),
        Commands::Reindex { repository, config, force } => run_reindex(repository, config, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            if e.downcast_ref::<mrcis_core::CoreError>().map(|e| matches!(e.kind, mrcis_core::ErrorKind::Config)).unwrap_or(false) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<mrcis_core::config::Config> {
    config_loader::load(config_path.as_deref())
}

fn tokio_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn run_serve(config_path: Option<PathBuf>, transport_arg: Option<TransportArg>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(arg) = transport_arg {
        config.server.transport = match arg {
            TransportArg::Stdio => Transport::Stdio,
            TransportArg::Sse => Transport::Sse,
        };
    }
    let _guard = logging::init(&config.logging);

    let runtime = tokio_runtime()?;
    runtime.block_on(async move {
        let embedder = Arc::new(OpenAiEmbeddingClient::new(config.embedding.clone())?);
        let worker_count = num_cpus::get().clamp(1, 4);
        let resolution_interval = std::time::Duration::from_secs(config.indexing.resolution_interval_seconds);
        let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);

        let service = MrcisService::open(&config, embedder)?;
        service.start(worker_count, resolution_interval, config.indexing.watch_debounce_ms).await;

        tracing::info!("mrcis service started, awaiting shutdown signal");
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");

        service.stop(shutdown_timeout).await;
        Ok::<(), anyhow::Error>(())
    })
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let data_dir = PathBuf::from(&config.storage.data_directory);
    std::fs::create_dir_all(&data_dir)?;
    let state_path = data_dir.join(&config.storage.state_db_name);
    let vector_path = data_dir.join(format!("{}.db", config.storage.vector_table_name));

    let state = mrcis_storage::StateStore::open(state_path.to_string_lossy().as_ref())?;
    let _vectors = mrcis_storage::VectorStore::open(vector_path.to_string_lossy().as_ref(), config.embedding.dimensions)?;
    let report = state.recover()?;

    let repo_roots = Arc::new(dashmap::DashMap::new());
    let reconciler = mrcis_orchestration::ConfigReconciler::new(Arc::new(state));
    let reconcile = reconciler.reconcile(&config.repositories, &repo_roots)?;

    println!(
        "initialized {} (requeued {} in-flight files, enqueued {} pending); repositories added={} unchanged={} orphaned={}",
        data_dir.display(),
        report.requeued_processing,
        report.enqueued_pending,
        reconcile.added.len(),
        reconcile.unchanged.len(),
        reconcile.removed.len(),
    );
    Ok(())
}

fn run_status(config_path: Option<PathBuf>, repository: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let data_dir = PathBuf::from(&config.storage.data_directory);
    let state_path = data_dir.join(&config.storage.state_db_name);
    let state = mrcis_storage::StateStore::open(state_path.to_string_lossy().as_ref())?;

    let repos = match &repository {
        Some(name) => state.get_repository_by_name(name)?.into_iter().collect::<Vec<_>>(),
        None => state.list_repositories()?,
    };

    if repos.is_empty() {
        println!("no matching repositories");
        return Ok(());
    }

    for repo in repos {
        let pending = state.count_pending_files(&repo.id)?;
        let failed = state.count_failed_files(&repo.id)?;
        let indexed = state.count_indexed_files(&repo.id)?;
        println!(
            "{} [{:?}] files: indexed={indexed} pending_files={pending} failed_files={failed} entities={} relations={}",
            repo.name, repo.status, repo.counts.entities, repo.counts.relations
        );
        if let Some(err) = &repo.error_message {
            println!("  last error: {err}");
        }
    }
    Ok(())
}

fn run_reindex(repository: String, config_path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let data_dir = PathBuf::from(&config.storage.data_directory);
    let state_path = data_dir.join(&config.storage.state_db_name);
    let state = mrcis_storage::StateStore::open(state_path.to_string_lossy().as_ref())?;

    let Some(repo) = state.get_repository_by_name(&repository)? else {
        anyhow::bail!("unknown repository: {repository}");
    };

    if force {
        let marked = state.mark_repository_files_pending(&repo.id, true)?;
        println!("marked {marked} files pending");
    }
    let enqueued = state.enqueue_pending_files(&repo.id)?;
    println!("enqueued {enqueued} files for repository {repository}");
    Ok(())
}
