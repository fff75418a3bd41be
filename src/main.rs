//! Batch summarizer worker and job submission CLI

use anyhow::{Context, Result};
use batch_summarizer::{
    handle_shutdown, logging, Job, JobProcessor, JobStore, ModelProvider, RedisJobStore,
    S3ObjectStore, Worker, WorkerConfig,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "summarizer-worker", version, about = "Batch summarization of S3 text objects")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379", global = true)]
    redis_url: String,
    #[arg(long, env = "QUEUE_NAMESPACE", default_value = "summarizer", global = true)]
    namespace: String,
    #[arg(long, env = "JOB_RETENTION_SECS", default_value_t = 3600, global = true)]
    retention_secs: u64,
}

impl StoreArgs {
    fn connect(&self) -> Result<Arc<dyn JobStore>> {
        let store = RedisJobStore::new(
            &self.redis_url,
            Some(self.namespace.clone()),
            Some(Duration::from_secs(self.retention_secs)),
        )
        .context("Failed to configure Redis job store")?;
        Ok(Arc::new(store))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consume jobs from the queue until interrupted
    Worker(WorkerArgs),
    /// Validate and enqueue a job; prints its id
    Submit(SubmitArgs),
    /// Print a job's status, benchmark and result set as JSON
    Status { job_id: String },
}

#[derive(Debug, Args)]
struct WorkerArgs {
    #[arg(long, env = "MODEL_PROVIDER", default_value = "together")]
    provider: ModelProvider,
    #[arg(long, env = "MODEL_ID", default_value = batch_summarizer::config::DEFAULT_MODEL_ID)]
    model_id: String,
    #[arg(long, env = "TOGETHER_ENDPOINT", default_value = batch_summarizer::model_runner::together::DEFAULT_ENDPOINT)]
    together_endpoint: String,
    #[arg(long, env = "TOGETHER_API_KEY", hide_env_values = true)]
    together_api_key: Option<String>,
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,
    #[arg(long, env = "MAX_OUTPUT_TOKENS", default_value_t = 1500)]
    max_output_tokens: u32,
    #[arg(long, env = "TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,
    #[arg(long, env = "MAX_CHUNK_TOKENS", default_value_t = 8000)]
    max_chunk_tokens: usize,
    #[arg(long, env = "MIN_TEXT_CHARS", default_value_t = 50)]
    min_text_chars: usize,
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 5)]
    retry_attempts: u32,
    #[arg(long, env = "OUTPUT_DIR", default_value = "summaries")]
    output_dir: String,
    /// Extensions of eligible objects
    #[arg(long, env = "EXTENSIONS", value_delimiter = ',', default_value = "txt,log,md")]
    extensions: Vec<String>,
    /// Object keys never processed
    #[arg(long = "deny", env = "DENY_KEYS", value_delimiter = ',')]
    deny_list: Vec<String>,
    /// Re-summarize objects even when a summary output already exists.
    /// Reused outputs still count toward a job's --max-files
    #[arg(long, env = "NO_SKIP_EXISTING")]
    no_skip_existing: bool,
    /// Start listing after the newest summary output, so a capped job
    /// moves past objects an earlier run already summarized
    #[arg(long, env = "RESUME_FROM_CHECKPOINT")]
    resume_from_checkpoint: bool,
    #[arg(long, env = "DEQUEUE_TIMEOUT_SECS", default_value_t = 5)]
    dequeue_timeout_secs: u64,
}

impl WorkerArgs {
    fn into_config(self, store: &StoreArgs) -> WorkerConfig {
        let defaults = WorkerConfig::default();
        WorkerConfig {
            redis_url: store.redis_url.clone(),
            namespace: store.namespace.clone(),
            retention: Duration::from_secs(store.retention_secs),
            dequeue_timeout: Duration::from_secs(self.dequeue_timeout_secs),
            provider: self.provider,
            model_id: self.model_id,
            together_endpoint: self.together_endpoint,
            together_api_key: self.together_api_key,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            params: batch_summarizer::GenerationParams {
                max_tokens: self.max_output_tokens,
                temperature: self.temperature,
                ..defaults.params.clone()
            },
            max_chunk_tokens: self.max_chunk_tokens,
            min_text_chars: self.min_text_chars,
            retry_attempts: self.retry_attempts,
            output_dir: self.output_dir,
            skip_existing: !self.no_skip_existing,
            resume_from_checkpoint: self.resume_from_checkpoint,
            extensions: self.extensions,
            deny_list: self.deny_list.into_iter().collect(),
            ..defaults
        }
    }
}

#[derive(Debug, Args)]
struct SubmitArgs {
    #[arg(long)]
    bucket: String,
    #[arg(long, default_value = "")]
    prefix: String,
    /// Listed objects to process, including ones whose summary is reused.
    /// Re-running a capped job covers the same first objects unless the
    /// worker runs with --resume-from-checkpoint
    #[arg(long, default_value_t = batch_summarizer::config::DEFAULT_MAX_FILES)]
    max_files: usize,
    #[arg(long, default_value_t = batch_summarizer::config::DEFAULT_MAX_WORKERS)]
    max_workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format == LogFormat::Json);

    match cli.command {
        Command::Worker(args) => run_worker(args.into_config(&cli.store)).await,
        Command::Submit(args) => submit(&cli.store, args).await,
        Command::Status { job_id } => status(&cli.store, &job_id).await,
    }
}

async fn run_worker(config: WorkerConfig) -> Result<()> {
    info!(
        "Starting worker v{} (provider={}, model={}, redis={})",
        batch_summarizer::VERSION,
        config.provider,
        config.model_id,
        config.redis_url
    );

    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let objects = Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&aws)));
    let jobs: Arc<dyn JobStore> = Arc::new(
        RedisJobStore::new(&config.redis_url, Some(config.namespace.clone()), Some(config.retention))
            .context("Failed to configure Redis job store")?,
    );
    let model = config.build_model(&aws)?;

    let processor = JobProcessor::new(objects, jobs.clone(), model, &config);
    let worker = Worker::new(jobs.clone(), processor, config.dequeue_timeout);
    let shutdown = CancellationToken::new();

    let signals = {
        let jobs = jobs.clone();
        let active = worker.active_job();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            handle_shutdown(jobs.as_ref(), &active, &shutdown).await;
        })
    };

    let processed = worker.run(shutdown).await;
    signals.abort();

    info!("Worker exited after {} jobs", processed);
    Ok(())
}

async fn submit(store: &StoreArgs, args: SubmitArgs) -> Result<()> {
    let job = Job::new(args.bucket, args.prefix, args.max_files, args.max_workers)
        .context("Invalid job")?;
    store.connect()?.enqueue(&job).await.context("Failed to enqueue job")?;

    info!("Enqueued job {} for s3://{}/{}", job.id, job.bucket, job.prefix);
    println!("{}", job.id);
    Ok(())
}

async fn status(store: &StoreArgs, job_id: &str) -> Result<()> {
    let jobs = store.connect()?;
    let status = jobs.get_status(job_id).await?;
    if status.is_none() {
        warn!("No status recorded for job {}", job_id);
    }

    let report = json!({
        "job_id": job_id,
        "job": jobs.get_job(job_id).await?,
        "status": status,
        "benchmark_secs": jobs.get_benchmark(job_id).await?.map(|d| d.as_secs_f64()),
        "results": jobs.get_result(job_id).await?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
