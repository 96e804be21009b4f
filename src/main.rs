use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use motorstats_cache::InMemoryCacheStore;
use motorstats_config::{AppConfig, ChannelKind};
use motorstats_engine::{
  ChannelNotifier, DataSource, EmptySource, EngineSettings, ExecutionEvent, ExecutionNotifier,
  HttpDataSource, NoopNotifier, RunContext, TemplateGenerator, WorkflowEngine,
};
use motorstats_publisher::{
  Channel, ChannelClient, ChannelHandler, FanOutPublisher, LogClient, WebhookClient,
};
use motorstats_store::SqliteStore;
use motorstats_trigger::{
  Credential, Schedule, TriggerBoundary, TriggerRequest, TriggerRunner,
};
use motorstats_workflow::{Entity, Period, RunId};

/// Motorstats - monthly vehicle statistics, blog posts and announcements
#[derive(Parser)]
#[command(name = "motorstats")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the JSON configuration file (defaults apply when omitted)
  #[arg(long, global = true, env = "MOTORSTATS_CONFIG")]
  config: Option<PathBuf>,

  /// Path to the data directory (default: ~/.motorstats)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Shared secret presented to the trigger boundary
  #[arg(long, global = true, env = "MOTORSTATS_TRIGGER_SECRET", hide_env_values = true)]
  secret: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Trigger a workflow run and wait for it to settle
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Continue a suspended or interrupted run
  Resume { run_id: RunId },

  /// Abort a run, keeping its succeeded steps
  Cancel { run_id: RunId },

  /// Show a run and its step log
  Status { run_id: RunId },

  /// List recent runs, newest first
  Runs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },

  /// Run the schedule and trigger runner until interrupted
  Serve,
}

#[derive(Subcommand)]
enum RunTarget {
  /// Pull source data for an entity and write about its newest month
  DataRefresh {
    entity: Entity,

    /// Month to refresh (YYYY-MM); the newest month in the source otherwise
    #[arg(long)]
    month: Option<Period>,
  },

  /// Write and announce a post for stored data
  ContentPublish {
    #[arg(long)]
    month: Period,

    #[arg(long)]
    data_type: Entity,
  },

  /// Invalidate the cached views of an entity
  CacheRegenerate {
    #[arg(long)]
    data_type: Entity,

    #[arg(long)]
    month: Option<Period>,
  },
}

impl RunTarget {
  fn into_request(self) -> TriggerRequest {
    match self {
      RunTarget::DataRefresh { entity, month } => TriggerRequest::data_refresh(entity, month),
      RunTarget::ContentPublish { month, data_type } => {
        TriggerRequest::content_publish(month, data_type)
      }
      RunTarget::CacheRegenerate { data_type, month } => {
        TriggerRequest::cache_regenerate(data_type, month)
      }
    }
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let Some(command) = cli.command else {
    println!("motorstats - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".motorstats"),
  };

  let config = match &cli.config {
    Some(path) => AppConfig::load(path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None => AppConfig::default(),
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_command(command, config, data_dir, cli.secret).await })
}

async fn run_command(
  command: Commands,
  config: AppConfig,
  data_dir: PathBuf,
  secret: Option<String>,
) -> Result<()> {
  let store = open_store(&data_dir).await?;
  let (sender, mut events) = mpsc::unbounded_channel();
  let notifier: Arc<dyn ExecutionNotifier> = match &command {
    // Nobody waits on a served run; progress goes to the log.
    Commands::Serve => Arc::new(NoopNotifier),
    _ => Arc::new(ChannelNotifier::new(sender)),
  };
  let engine = build_engine(&config, store, notifier)?;

  match command {
    Commands::Run { target } => {
      let (boundary, credential) = trigger_boundary(engine.clone(), &config, secret);
      let response = boundary
        .trigger(&credential, target.into_request())
        .await
        .context("trigger rejected")?;
      eprintln!("Started run: {}", response.run_id);

      wait_for_settled(&mut events, &response.run_id).await?;
      let view = boundary
        .status(&credential, &response.run_id)
        .await
        .context("failed to load run status")?;
      println!("{}", serde_json::to_string_pretty(&view)?);
    }
    Commands::Resume { run_id } => {
      let report = engine
        .resume(&run_id)
        .await
        .with_context(|| format!("failed to resume run {}", run_id))?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Commands::Cancel { run_id } => {
      engine
        .cancel(&run_id)
        .await
        .with_context(|| format!("failed to cancel run {}", run_id))?;
      eprintln!("Cancelled run: {}", run_id);
    }
    Commands::Status { run_id } => {
      let (boundary, credential) = trigger_boundary(engine, &config, secret);
      let view = boundary
        .status(&credential, &run_id)
        .await
        .with_context(|| format!("failed to load run {}", run_id))?;
      println!("{}", serde_json::to_string_pretty(&view)?);
    }
    Commands::Runs { limit } => {
      let runs = engine.list_runs(limit).await.context("failed to list runs")?;
      println!("{}", serde_json::to_string_pretty(&runs)?);
    }
    Commands::Serve => serve(&config, engine).await?,
  }

  Ok(())
}

async fn open_store(data_dir: &Path) -> Result<Arc<SqliteStore>> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_path = data_dir.join("motorstats.db");
  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open database: {}", db_path.display()))?;
  store.migrate().await.context("failed to run migrations")?;
  Ok(Arc::new(store))
}

fn build_engine(
  config: &AppConfig,
  store: Arc<SqliteStore>,
  notifier: Arc<dyn ExecutionNotifier>,
) -> Result<WorkflowEngine> {
  let source: Arc<dyn DataSource> = match &config.data_source.base_url {
    Some(url) => Arc::new(HttpDataSource::new(url.clone())),
    None => Arc::new(EmptySource),
  };

  let ctx = RunContext::new(
    store.clone(),
    store,
    Arc::new(InMemoryCacheStore::new()),
    source,
    Arc::new(TemplateGenerator::new()),
    build_publisher(config)?,
  )
  .with_notifier(notifier)
  .with_settings(EngineSettings::from(config));

  Ok(WorkflowEngine::new(ctx))
}

fn build_publisher(config: &AppConfig) -> Result<FanOutPublisher> {
  let mut handlers = Vec::with_capacity(config.channels.len());
  for channel in &config.channels {
    let client: Arc<dyn ChannelClient> = match channel.kind {
      ChannelKind::Webhook => {
        let url = channel
          .url
          .clone()
          .with_context(|| format!("webhook channel '{}' has no url", channel.channel))?;
        Arc::new(WebhookClient::new(url, channel.token.clone()))
      }
      ChannelKind::Log => Arc::new(LogClient::new(channel.channel.clone())),
    };
    handlers.push(ChannelHandler::new(
      Channel::from(channel.channel.as_str()),
      client,
    ));
  }
  Ok(FanOutPublisher::new(handlers))
}

/// The boundary plus the credential this process presents to it.
///
/// When the config names no credentials the secret from the command line
/// becomes the boundary's shared secret.
fn trigger_boundary(
  engine: WorkflowEngine,
  config: &AppConfig,
  secret: Option<String>,
) -> (TriggerBoundary, Credential) {
  let mut trigger = config.trigger.clone();
  if !trigger.has_credentials() {
    trigger.shared_secret = secret.clone();
  }
  let credential = Credential::SharedSecret(secret.unwrap_or_default());
  (TriggerBoundary::new(engine, &trigger), credential)
}

async fn wait_for_settled(
  events: &mut mpsc::UnboundedReceiver<ExecutionEvent>,
  run_id: &RunId,
) -> Result<()> {
  while let Some(event) = events.recv().await {
    if event.run_id() != run_id {
      continue;
    }
    match &event {
      ExecutionEvent::StepSucceeded { step, .. } => eprintln!("  {} succeeded", step),
      ExecutionEvent::StepSkipped { step, reason, .. } => {
        eprintln!("  {} skipped ({:?})", step, reason)
      }
      ExecutionEvent::StepRetrying {
        step,
        attempt,
        error,
        ..
      } => eprintln!("  {} attempt {} failed: {}", step, attempt, error),
      _ => {}
    }
    if event.is_settled() {
      return Ok(());
    }
  }
  bail!("engine stopped before run {} settled", run_id)
}

async fn serve(config: &AppConfig, engine: WorkflowEngine) -> Result<()> {
  let cancel = CancellationToken::new();
  let runner = TriggerRunner::new(engine);
  let schedule = Schedule::from(&config.schedule);

  let schedule_task = tokio::spawn(schedule.run(runner.sender(), cancel.clone()));
  let runner_task = tokio::spawn(runner.start(cancel.clone()));

  info!(channels = config.channels.len(), "serve_started");
  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for Ctrl-C")?;
  info!("serve_stopping");
  cancel.cancel();

  schedule_task.await.context("schedule task panicked")?;
  runner_task.await.context("runner task panicked")?;
  Ok(())
}
